use std::fs;

use similar_asserts::assert_eq;

use vndk_elf::ElfClass;
use vndk_linker::{ElfLinker, Partition};
use vndk_testutils::{write_file, ElfImage};

#[test]
fn test_create_scans_and_resolves() {
    let tmp = tempfile::tempdir().unwrap();
    let system = tmp.path().join("system");
    let vendor = tmp.path().join("vendor");

    write_file(
        &system,
        "lib/libdl.so",
        &ElfImage::new32().export("dlopen").export("dlclose").build(),
    )
    .unwrap();
    write_file(
        &system,
        "lib/libc.so",
        &ElfImage::new32()
            .needed("libdl.so")
            .export("fopen")
            .import("dlopen")
            .build(),
    )
    .unwrap();
    write_file(
        &system,
        "lib64/libdl.so",
        &ElfImage::new64().export("dlopen").build(),
    )
    .unwrap();
    write_file(
        &vendor,
        "lib/libegl.so",
        &ElfImage::new32().needed("libc.so").import("fopen").build(),
    )
    .unwrap();
    // Non-ELF files are skipped.
    write_file(&system, "etc/hosts", b"127.0.0.1 localhost\n").unwrap();

    let graph = ElfLinker::create(
        &[system],
        &[],
        &[vendor],
        &[],
        &[],
    )
    .unwrap();

    assert_eq!(
        graph.lib32().keys().collect::<Vec<_>>(),
        vec![
            "/system/lib/libc.so",
            "/system/lib/libdl.so",
            "/vendor/lib/libegl.so"
        ]
    );
    assert_eq!(
        graph.lib64().keys().collect::<Vec<_>>(),
        vec!["/system/lib64/libdl.so"]
    );

    // DT_NEEDED resolution across partitions.
    let libc = graph.map_path_to_lib("/system/lib/libc.so").unwrap();
    let libdl = graph.map_path_to_lib("/system/lib/libdl.so").unwrap();
    let libegl = graph.map_path_to_lib("/vendor/lib/libegl.so").unwrap();

    assert!(graph.node(libc).deps.contains(&libdl));
    assert!(graph.node(libegl).deps.contains(&libc));
    assert_eq!(graph.node(libc).linked_symbols["dlopen"], libdl);
    assert_eq!(graph.node(libegl).linked_symbols["fopen"], libc);

    // The word-size maps stay disjoint.
    for (_, &lib) in graph.lib32() {
        assert_eq!(graph.node(lib).elf.ei_class, ElfClass::Elf32);
    }
    for (_, &lib) in graph.lib64() {
        assert_eq!(graph.node(lib).elf.ei_class, ElfClass::Elf64);
    }
}

#[test]
fn test_alter_subdirs_retag_the_partition() {
    let tmp = tempfile::tempdir().unwrap();
    let system = tmp.path().join("system");

    write_file(&system, "lib/libsys.so", &ElfImage::new32().build()).unwrap();
    write_file(&system, "vendor/lib/libvnd.so", &ElfImage::new32().build()).unwrap();

    let mut graph = ElfLinker::new();
    graph.add_libs_in_dir(Partition::System, &system, &["vendor".to_owned()]);

    // The canonical path keeps the scanned prefix; only the tag changes.
    let libsys = graph.map_path_to_lib("/system/lib/libsys.so").unwrap();
    assert_eq!(graph.node(libsys).partition, Partition::System);

    let libvnd = graph.map_path_to_lib("/system/vendor/lib/libvnd.so").unwrap();
    assert_eq!(graph.node(libvnd).partition, Partition::Vendor);
    assert_eq!(graph.partition_libs(Partition::Vendor).len(), 1);
}

#[test]
fn test_load_extra_deps() {
    let tmp = tempfile::tempdir().unwrap();
    let system = tmp.path().join("system");

    write_file(&system, "lib/liba.so", &ElfImage::new32().build()).unwrap();
    write_file(&system, "lib/libb.so", &ElfImage::new32().build()).unwrap();

    let deps_file = tmp.path().join("extra.deps");
    fs::write(
        &deps_file,
        "/system/lib/liba.so: /system/lib/libb.so\n\
         this line is ignored\n",
    )
    .unwrap();

    let graph = ElfLinker::create(
        &[system],
        &[],
        &[],
        &[],
        &[deps_file],
    )
    .unwrap();

    let liba = graph.map_path_to_lib("/system/lib/liba.so").unwrap();
    let libb = graph.map_path_to_lib("/system/lib/libb.so").unwrap();
    assert!(graph.node(liba).deps.contains(&libb));
    assert!(graph.node(libb).users.contains(&liba));
}
