//! The cross-partition library dependency graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use vndk_common::{ByteView, Interner, Symbol};
use vndk_elf::{Elf, ElfClass};

use crate::ndk::is_ndk_lib;
use crate::resolve::Resolver;

/// One `SRC_PATH: DST_PATH` line in an extra-deps file.
static EXTRA_DEP_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:]*):\s*(.*)$").unwrap());

/// The partition a library resides in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Partition {
    /// The framework (`/system`) partition.
    System,
    /// The vendor (`/vendor`) partition.
    Vendor,
}

impl Partition {
    /// Number of partitions.
    pub const COUNT: usize = 2;

    /// The on-device root directory name of this partition.
    pub fn name(self) -> &'static str {
        match self {
            Partition::System => "system",
            Partition::Vendor => "vendor",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Index of a library node in the graph arena.
///
/// `deps`, `users` and the symbol maps store these instead of references, so
/// cyclic `DT_NEEDED` chains need no ownership tricks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibIdx(u32);

impl LibIdx {
    pub(crate) fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Returns the base name of a canonical library path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A shared library inserted into the graph, together with everything the
/// resolver and classifier learn about it.
#[derive(Debug)]
pub struct LibNode {
    /// The partition the library is assigned to.
    pub partition: Partition,
    /// Canonical on-device path (`/system/...` or `/vendor/...`).
    pub path: String,
    /// The parsed dynamic linking view.
    pub elf: Elf,
    /// Whether the base name belongs to the known NDK library sets.
    pub is_ndk: bool,
    /// Libraries this node links against.
    pub deps: BTreeSet<LibIdx>,
    /// Libraries that link against this node.
    pub users: BTreeSet<LibIdx>,
    /// Resolved imported symbols and the node that provides each.
    pub linked_symbols: BTreeMap<Symbol, LibIdx>,
    /// Imported symbols no resolved dependency exports.
    pub unresolved_symbols: BTreeSet<Symbol>,
    /// Users that consume symbols absent from the generic reference.
    ///
    /// Only populated when a generic reference is loaded.
    pub extended_symbol_users: BTreeSet<LibIdx>,
}

/// The per-word-size library graphs of one device image.
///
/// Libraries are held in an arena and indexed by canonical path, once per
/// word size and once per partition. 32-bit and 64-bit libraries never link
/// to each other; the two word-size maps are resolved independently.
#[derive(Debug, Default)]
pub struct ElfLinker {
    pub(crate) nodes: Vec<LibNode>,
    pub(crate) lib32: BTreeMap<String, LibIdx>,
    pub(crate) lib64: BTreeMap<String, LibIdx>,
    pub(crate) lib_pt: [BTreeMap<String, LibIdx>; Partition::COUNT],
    interner: Interner,
}

impl ElfLinker {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans partition roots, loads extra deps and resolves everything.
    ///
    /// `system_dirs_as_vendor` / `vendor_dirs_as_system` name subdirectories
    /// (relative to the scanned roots) whose contents belong to the opposite
    /// partition.
    pub fn create(
        system_dirs: &[PathBuf],
        system_dirs_as_vendor: &[String],
        vendor_dirs: &[PathBuf],
        vendor_dirs_as_system: &[String],
        extra_deps: &[PathBuf],
    ) -> io::Result<Self> {
        let mut graph = ElfLinker::new();

        for dir in system_dirs {
            graph.add_libs_in_dir(Partition::System, dir, system_dirs_as_vendor);
        }
        for dir in vendor_dirs {
            graph.add_libs_in_dir(Partition::Vendor, dir, vendor_dirs_as_system);
        }
        for path in extra_deps {
            graph.load_extra_deps(path)?;
        }

        graph.resolve_deps();
        Ok(graph)
    }

    /// Inserts a library and returns its node index.
    ///
    /// The node lands in the word-size map matching `elf.ei_class` and in
    /// the index of `partition`. Inserting the same path twice replaces the
    /// earlier entry; inputs are assumed unique.
    pub fn add(&mut self, partition: Partition, path: impl Into<String>, elf: Elf) -> LibIdx {
        let path = path.into();
        let idx = LibIdx(self.nodes.len() as u32);
        let class = elf.ei_class;

        self.nodes.push(LibNode {
            partition,
            is_ndk: is_ndk_lib(&path),
            path: path.clone(),
            elf,
            deps: BTreeSet::new(),
            users: BTreeSet::new(),
            linked_symbols: BTreeMap::new(),
            unresolved_symbols: BTreeSet::new(),
            extended_symbol_users: BTreeSet::new(),
        });

        let lib_set = match class {
            ElfClass::Elf32 => &mut self.lib32,
            ElfClass::Elf64 => &mut self.lib64,
        };
        lib_set.insert(path.clone(), idx);
        self.lib_pt[partition.index()].insert(path, idx);
        idx
    }

    /// Returns the node behind an index.
    pub fn node(&self, idx: LibIdx) -> &LibNode {
        &self.nodes[idx.as_usize()]
    }

    pub(crate) fn node_mut(&mut self, idx: LibIdx) -> &mut LibNode {
        &mut self.nodes[idx.as_usize()]
    }

    /// The 32-bit libraries, indexed by canonical path.
    pub fn lib32(&self) -> &BTreeMap<String, LibIdx> {
        &self.lib32
    }

    /// The 64-bit libraries, indexed by canonical path.
    pub fn lib64(&self) -> &BTreeMap<String, LibIdx> {
        &self.lib64
    }

    /// The libraries of one partition, indexed by canonical path.
    pub fn partition_libs(&self, partition: Partition) -> &BTreeMap<String, LibIdx> {
        &self.lib_pt[partition.index()]
    }

    /// The interner the scanner feeds symbol names through.
    ///
    /// Callers that load further symbol sets (e.g. a generic reference)
    /// should reuse it so equal names keep sharing one allocation.
    pub fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    /// Adds a dependency edge between two paths in every word-size map that
    /// contains both endpoints.
    pub fn add_dep(&mut self, src_path: &str, dst_path: &str) {
        let mut edges = Vec::new();
        for lib_set in [&self.lib32, &self.lib64] {
            if let (Some(&src), Some(&dst)) = (lib_set.get(src_path), lib_set.get(dst_path)) {
                edges.push((src, dst));
            }
        }
        for (src, dst) in edges {
            self.link(src, dst);
        }
    }

    fn link(&mut self, src: LibIdx, dst: LibIdx) {
        self.nodes[src.as_usize()].deps.insert(dst);
        self.nodes[dst.as_usize()].users.insert(src);
    }

    /// Looks up a canonical path in the 32-bit map, then the 64-bit map.
    pub fn map_path_to_lib(&self, path: &str) -> Option<LibIdx> {
        self.lib32
            .get(path)
            .or_else(|| self.lib64.get(path))
            .copied()
    }

    /// Looks up several canonical paths, reporting the ones that miss.
    pub fn map_paths_to_libs<I, S, F>(&self, paths: I, mut report_bad: F) -> BTreeSet<LibIdx>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&str),
    {
        let mut result = BTreeSet::new();
        for path in paths {
            let path = path.as_ref();
            match self.map_path_to_lib(path) {
                Some(lib) => {
                    result.insert(lib);
                }
                None => report_bad(path),
            }
        }
        result
    }

    /// Scans a host directory tree as the contents of `partition`.
    ///
    /// Every readable regular file that parses as an ELF shared object is
    /// inserted under its canonical on-device path; everything else is
    /// skipped. Files below one of `alter_subdirs` keep the scanned
    /// partition's path prefix but are tagged with the opposite partition.
    pub fn add_libs_in_dir(&mut self, partition: Partition, root: &Path, alter_subdirs: &[String]) {
        let alter_partition = match partition {
            Partition::System => Partition::Vendor,
            Partition::Vendor => Partition::System,
        };

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping unreadable directory entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let view = match ByteView::open(path) {
                Ok(view) => view,
                Err(err) => {
                    debug!("{}: cannot open: {err}", path.display());
                    continue;
                }
            };
            if !Elf::peek(&view) {
                continue;
            }
            let elf = match Elf::parse(&view, &mut self.interner) {
                Ok(elf) => elf,
                Err(err) => {
                    debug!("{}: not a usable shared object: {err}", path.display());
                    continue;
                }
            };

            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let target = if alter_subdirs.iter().any(|sub| rel.starts_with(sub)) {
                alter_partition
            } else {
                partition
            };

            // The canonical path always carries the scanned partition's
            // prefix; only the partition tag is altered.
            let mut device_path = String::from("/");
            device_path.push_str(partition.name());
            for component in rel.components() {
                device_path.push('/');
                device_path.push_str(&component.as_os_str().to_string_lossy());
            }

            self.add(target, device_path, elf);
        }
    }

    /// Loads `SRC_PATH: DST_PATH` lines as extra dependency edges.
    ///
    /// Lines that do not match the grammar are ignored.
    pub fn load_extra_deps(&mut self, path: &Path) -> io::Result<()> {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if let Some(captures) = EXTRA_DEP_LINE.captures(&line) {
                let (src, dst) = (captures[1].to_owned(), captures[2].to_owned());
                self.add_dep(&src, &dst);
            }
        }
        Ok(())
    }

    /// Resolves `DT_NEEDED` entries and imported symbols for both word sizes.
    ///
    /// Each word-size map is resolved against itself with its own default
    /// search path. Missing dependencies are logged with every candidate
    /// path that was tried and leave the importing symbols unresolved.
    pub fn resolve_deps(&mut self) {
        Self::resolve_lib_set(
            &mut self.nodes,
            &self.lib32,
            &["/system/lib", "/vendor/lib"],
        );
        Self::resolve_lib_set(
            &mut self.nodes,
            &self.lib64,
            &["/system/lib64", "/vendor/lib64"],
        );
    }

    fn resolve_lib_set(
        nodes: &mut [LibNode],
        lib_set: &BTreeMap<String, LibIdx>,
        default_search_path: &[&str],
    ) {
        let resolver = Resolver::new(lib_set, default_search_path);

        for &lib in lib_set.values() {
            let node = &nodes[lib.as_usize()];
            let lib_path = node.path.clone();
            let dt_needed = node.elf.dt_needed.clone();
            let dt_rpath = node.elf.dt_rpath.clone();
            let dt_runpath = node.elf.dt_runpath.clone();

            // Resolve needed libraries in file order.
            let mut imported_libs = Vec::new();
            for name in &dt_needed {
                match resolver.resolve(name, &dt_rpath, &dt_runpath) {
                    Some(dep) => {
                        nodes[lib.as_usize()].deps.insert(dep);
                        nodes[dep.as_usize()].users.insert(lib);
                        imported_libs.push(dep);
                    }
                    None => {
                        let candidates = resolver.candidates(name, &dt_rpath, &dt_runpath);
                        warn!(
                            "{lib_path}: missing needed library {name} (tried: {})",
                            candidates.join(", ")
                        );
                    }
                }
            }

            // Link each imported symbol to the first resolved dependency
            // that exports it, in DT_NEEDED order.
            let imported_symbols: Vec<Symbol> =
                nodes[lib.as_usize()].elf.imported_symbols.iter().cloned().collect();
            for symbol in imported_symbols {
                let provider = imported_libs
                    .iter()
                    .copied()
                    .find(|&dep| nodes[dep.as_usize()].elf.exported_symbols.contains(&symbol));
                match provider {
                    Some(dep) => {
                        nodes[lib.as_usize()].linked_symbols.insert(symbol, dep);
                    }
                    None => {
                        nodes[lib.as_usize()].unresolved_symbols.insert(symbol);
                    }
                }
            }
        }
    }

    /// Returns the canonical paths of `libs`, sorted ascending.
    pub fn sorted_paths(&self, libs: impl IntoIterator<Item = LibIdx>) -> Vec<&str> {
        let mut paths: Vec<&str> = libs
            .into_iter()
            .map(|lib| self.node(lib).path.as_str())
            .collect();
        paths.sort_unstable();
        paths
    }

    /// Returns `libs` sorted by canonical path ascending.
    pub(crate) fn sorted_by_path(&self, libs: impl IntoIterator<Item = LibIdx>) -> Vec<LibIdx> {
        let mut libs: Vec<LibIdx> = libs.into_iter().collect();
        libs.sort_by(|a, b| self.node(*a).path.cmp(&self.node(*b).path));
        libs
    }
}
