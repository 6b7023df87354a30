use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::{info, warn};
use walkdir::WalkDir;

use vndk_common::{ByteView, Interner};
use vndk_elf::Elf;
use vndk_linker::{
    basename, is_high_level_ndk_lib, BannedAction, BannedLibDict, ElfLinker, GenericRefs, LibIdx,
    Partition,
};

type CliResult = Result<i32, Box<dyn std::error::Error>>;

fn graph_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("system")
            .long("system")
            .action(ArgAction::Append)
            .value_name("DIR")
            .value_parser(value_parser!(PathBuf))
            .help("path to system partition contents"),
    )
    .arg(
        Arg::new("vendor")
            .long("vendor")
            .action(ArgAction::Append)
            .value_name("DIR")
            .value_parser(value_parser!(PathBuf))
            .help("path to vendor partition contents"),
    )
    .arg(
        Arg::new("system-dir-as-vendor")
            .long("system-dir-as-vendor")
            .action(ArgAction::Append)
            .value_name("SUBDIR")
            .help("sub directory of the system partition that holds vendor files"),
    )
    .arg(
        Arg::new("vendor-dir-as-system")
            .long("vendor-dir-as-system")
            .action(ArgAction::Append)
            .value_name("SUBDIR")
            .help("sub directory of the vendor partition that holds system files"),
    )
    .arg(
        Arg::new("load-extra-deps")
            .long("load-extra-deps")
            .action(ArgAction::Append)
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf))
            .help("load extra module dependencies"),
    )
}

fn cli() -> Command {
    Command::new("vndk-tool")
        .about("Computes VNDK library sets from system and vendor partition images")
        .subcommand(
            Command::new("elfdump").about("Dump the ELF .dynamic section").arg(
                Arg::new("path")
                    .required(true)
                    .value_name("PATH")
                    .value_parser(value_parser!(PathBuf))
                    .help("path to an ELF file"),
            ),
        )
        .subcommand(
            Command::new("create-generic-ref")
                .about("Create generic reference symbol files")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf))
                        .help("directory tree to index"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .required(true)
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .help("output directory"),
                ),
        )
        .subcommand(graph_args(
            Command::new("vndk")
                .about("Compute the VNDK library sets")
                .arg(
                    Arg::new("load-generic-refs")
                        .long("load-generic-refs")
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf))
                        .help("compare with generic reference symbols"),
                )
                .arg(
                    Arg::new("warn-incorrect-partition")
                        .long("warn-incorrect-partition")
                        .action(ArgAction::SetTrue)
                        .help("warn about libraries with cross-partition usages only"),
                )
                .arg(
                    Arg::new("warn-high-level-ndk-deps")
                        .long("warn-high-level-ndk-deps")
                        .action(ArgAction::SetTrue)
                        .help("warn when the VNDK depends on high-level NDK libraries"),
                )
                .arg(
                    Arg::new("warn-banned-vendor-lib-deps")
                        .long("warn-banned-vendor-lib-deps")
                        .action(ArgAction::SetTrue)
                        .help("warn when a vendor binary depends on a banned library"),
                )
                .arg(
                    Arg::new("ban-vendor-lib-dep")
                        .long("ban-vendor-lib-dep")
                        .action(ArgAction::Append)
                        .value_name("NAME")
                        .help("library that must not be used by vendor binaries"),
                ),
        ))
        .subcommand(graph_args(
            Command::new("deps")
                .about("Print binary dependencies for debugging")
                .arg(
                    Arg::new("revert")
                        .long("revert")
                        .action(ArgAction::SetTrue)
                        .help("print usage dependencies"),
                )
                .arg(
                    Arg::new("leaf")
                        .long("leaf")
                        .action(ArgAction::SetTrue)
                        .help("print binaries without dependencies or usages"),
                ),
        ))
        .subcommand(graph_args(
            Command::new("deps-closure")
                .about("Find the transitive closure of dependencies")
                .arg(
                    Arg::new("lib")
                        .required(true)
                        .action(ArgAction::Append)
                        .value_name("LIB")
                        .help("root set of the shared libraries"),
                )
                .arg(
                    Arg::new("exclude-lib")
                        .long("exclude-lib")
                        .action(ArgAction::Append)
                        .value_name("PATH")
                        .help("libraries to be excluded"),
                )
                .arg(
                    Arg::new("exclude-ndk")
                        .long("exclude-ndk")
                        .action(ArgAction::SetTrue)
                        .help("exclude NDK libraries"),
                ),
        ))
        .subcommand(graph_args(
            Command::new("sp-hal")
                .about("Find same-process HALs")
                .arg(
                    Arg::new("closure")
                        .long("closure")
                        .action(ArgAction::SetTrue)
                        .help("show the dependency closure"),
                ),
        ))
}

fn build_graph(matches: &ArgMatches) -> io::Result<ElfLinker> {
    let paths = |id: &str| -> Vec<PathBuf> {
        matches
            .get_many::<PathBuf>(id)
            .unwrap_or_default()
            .cloned()
            .collect()
    };
    let subdirs = |id: &str| -> Vec<String> {
        matches
            .get_many::<String>(id)
            .unwrap_or_default()
            .cloned()
            .collect()
    };

    ElfLinker::create(
        &paths("system"),
        &subdirs("system-dir-as-vendor"),
        &paths("vendor"),
        &subdirs("vendor-dir-as-system"),
        &paths("load-extra-deps"),
    )
}

fn cmd_elfdump(matches: &ArgMatches) -> CliResult {
    let path = matches.get_one::<PathBuf>("path").unwrap();

    let view = match ByteView::open(path) {
        Ok(view) => view,
        Err(err) => {
            eprintln!("error: {}: {}", path.display(), err);
            return Ok(1);
        }
    };

    let mut interner = Interner::new();
    match Elf::parse(&view, &mut interner) {
        Ok(elf) => {
            elf.dump(&mut io::stdout().lock())?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("error: {}: Bad ELF file ({})", path.display(), err);
            Ok(1)
        }
    }
}

fn cmd_create_generic_ref(matches: &ArgMatches) -> CliResult {
    let root = matches.get_one::<PathBuf>("dir").unwrap();
    let output = matches.get_one::<PathBuf>("output").unwrap();

    let mut interner = Interner::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };

        let Ok(view) = ByteView::open(path) else {
            continue;
        };
        if !Elf::peek(&view) {
            continue;
        }
        let Ok(elf) = Elf::parse(&view, &mut interner) else {
            continue;
        };

        info!("processing {}", rel.display());

        let mut out_path = output.join(rel).into_os_string();
        out_path.push(".sym");
        let out_path = PathBuf::from(out_path);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(&out_path)?);
        elf.dump_exported_symbols(&mut writer)?;
        writer.flush()?;
    }

    Ok(0)
}

fn warn_incorrect_partition_lib_set(graph: &ElfLinker, partition: Partition, message: &str) {
    for &lib in graph.partition_libs(partition).values() {
        let node = graph.node(lib);
        if node.users.is_empty() {
            continue;
        }
        if node
            .users
            .iter()
            .all(|&user| graph.node(user).partition != partition)
        {
            warn!("{}: {}", node.path, message);
        }
    }
}

fn warn_incorrect_partition(graph: &ElfLinker) {
    warn_incorrect_partition_lib_set(
        graph,
        Partition::Vendor,
        "this is a vendor library with framework-only usages",
    );
    warn_incorrect_partition_lib_set(
        graph,
        Partition::System,
        "this is a framework library with vendor-only usages",
    );
}

fn warn_banned_vendor_lib_deps(graph: &ElfLinker, banned_libs: &BannedLibDict) {
    for &lib in graph.partition_libs(Partition::Vendor).values() {
        let node = graph.node(lib);
        for &dep in &node.deps {
            let dep_path = &graph.node(dep).path;
            if let Some(banned) = banned_libs.get(basename(dep_path)) {
                warn!(
                    "{}: vendor binary depends on banned {} (reason: {})",
                    node.path, dep_path, banned.reason
                );
            }
        }
    }
}

fn warn_high_level_ndk_deps<'a>(
    graph: &ElfLinker,
    lib_sets: impl IntoIterator<Item = &'a BTreeSet<LibIdx>>,
) {
    for lib_set in lib_sets {
        for &lib in lib_set {
            let node = graph.node(lib);
            for &dep in &node.deps {
                let dep_path = &graph.node(dep).path;
                if is_high_level_ndk_lib(dep_path) {
                    warn!("{}: VNDK is using high-level NDK {}", node.path, dep_path);
                }
            }
        }
    }
}

fn check_ndk_extensions(graph: &ElfLinker, generic_refs: &GenericRefs) {
    for lib_set in [graph.lib32(), graph.lib64()] {
        for &lib in lib_set.values() {
            let node = graph.node(lib);
            if node.is_ndk && !generic_refs.is_equivalent_lib(node) {
                warn!("{}: NDK library should not be extended", node.path);
            }
        }
    }
}

fn cmd_vndk(matches: &ArgMatches) -> CliResult {
    let mut graph = build_graph(matches)?;

    let generic_refs = match matches.get_one::<PathBuf>("load-generic-refs") {
        Some(dir) => Some(GenericRefs::create_from_dir(dir, graph.interner_mut())?),
        None => None,
    };
    if let Some(refs) = &generic_refs {
        check_ndk_extensions(&graph, refs);
    }

    let banned_libs = match matches.get_many::<String>("ban-vendor-lib-dep") {
        None => BannedLibDict::create_default(),
        Some(names) => {
            let mut dict = BannedLibDict::new();
            for name in names {
                dict.add(name, "user-banned", BannedAction::Warn);
            }
            dict
        }
    };

    if matches.get_flag("warn-incorrect-partition") {
        warn_incorrect_partition(&graph);
    }
    if matches.get_flag("warn-banned-vendor-lib-deps") {
        warn_banned_vendor_lib_deps(&graph, &banned_libs);
    }

    let vndk = graph.compute_vndk_libs(generic_refs.as_ref(), &banned_libs);

    if matches.get_flag("warn-high-level-ndk-deps") {
        warn_high_level_ndk_deps(
            &graph,
            [
                &vndk.extra_vndk_core,
                &vndk.vndk_core,
                &vndk.vndk_indirect,
                &vndk.vndk_fwk_ext,
                &vndk.vndk_vnd_ext,
            ],
        );
    }

    vndk.write_report(&graph, &mut io::stdout().lock())?;
    Ok(0)
}

fn cmd_deps(matches: &ArgMatches) -> CliResult {
    let graph = build_graph(matches)?;
    let revert = matches.get_flag("revert");
    let leaf = matches.get_flag("leaf");

    let mut results: Vec<(&str, Vec<&str>)> = Vec::new();
    for partition in [Partition::System, Partition::Vendor] {
        for (path, &lib) in graph.partition_libs(partition) {
            let node = graph.node(lib);
            let assoc_libs = if revert { &node.users } else { &node.deps };
            results.push((path.as_str(), graph.sorted_paths(assoc_libs.iter().copied())));
        }
    }
    results.sort();

    let mut stdout = io::stdout().lock();
    for (name, assoc_paths) in results {
        if leaf {
            if assoc_paths.is_empty() {
                writeln!(stdout, "{name}")?;
            }
        } else {
            writeln!(stdout, "{name}")?;
            for path in assoc_paths {
                writeln!(stdout, "\t{path}")?;
            }
        }
    }
    Ok(0)
}

fn cmd_deps_closure(matches: &ArgMatches) -> CliResult {
    let graph = build_graph(matches)?;

    let report_error = |path: &str| eprintln!("error: no such lib: {path}");
    let root_libs = graph.map_paths_to_libs(
        matches.get_many::<String>("lib").unwrap_or_default(),
        report_error,
    );
    let excluded_libs = graph.map_paths_to_libs(
        matches.get_many::<String>("exclude-lib").unwrap_or_default(),
        report_error,
    );
    let exclude_ndk = matches.get_flag("exclude-ndk");

    let closure = graph.compute_closure(&root_libs, |lib| {
        (exclude_ndk && graph.node(lib).is_ndk) || excluded_libs.contains(&lib)
    });

    let mut stdout = io::stdout().lock();
    for path in graph.sorted_paths(closure.iter().copied()) {
        writeln!(stdout, "{path}")?;
    }
    Ok(0)
}

fn cmd_sp_hal(matches: &ArgMatches) -> CliResult {
    let graph = build_graph(matches)?;

    let mut sp_hals = graph.compute_sp_hals();
    if matches.get_flag("closure") {
        sp_hals = graph.compute_closure(&sp_hals, |lib| graph.node(lib).is_ndk);
    }

    let mut stdout = io::stdout().lock();
    for path in graph.sorted_paths(sp_hals.iter().copied()) {
        writeln!(stdout, "{path}")?;
    }
    Ok(0)
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    let result = match matches.subcommand() {
        Some(("elfdump", sub)) => cmd_elfdump(sub),
        Some(("create-generic-ref", sub)) => cmd_create_generic_ref(sub),
        Some(("vndk", sub)) => cmd_vndk(sub),
        Some(("deps", sub)) => cmd_deps(sub),
        Some(("deps-closure", sub)) => cmd_deps_closure(sub),
        Some(("sp-hal", sub)) => cmd_sp_hal(sub),
        _ => {
            let _ = cli().print_help();
            process::exit(1);
        }
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}
