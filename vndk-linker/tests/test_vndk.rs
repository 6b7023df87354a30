mod common;

use std::collections::BTreeSet;

use similar_asserts::assert_eq;

use vndk_elf::ElfClass;
use vndk_linker::{BannedLibDict, GenericRefs, Partition};

use crate::common::{normal_graph, paths_of, GraphBuilder};

#[test]
fn test_compute_vndk_libs_without_generic_refs() {
    let mut gb = normal_graph();

    let vndk = gb.graph.compute_vndk_libs(None, &BannedLibDict::new());
    let graph = &gb.graph;

    assert_eq!(
        paths_of(graph, &vndk.vndk_core),
        vec!["/system/lib/libcutils.so", "/system/lib64/libcutils.so"]
    );
    assert!(vndk.extra_system_libs.is_empty());
    assert!(vndk.extra_vendor_libs.is_empty());
    assert!(vndk.extra_vndk_core.is_empty());
    assert!(vndk.vndk_indirect.is_empty());
    assert!(vndk.vndk_fwk_ext.is_empty());
    assert!(vndk.vndk_vnd_ext.is_empty());

    assert_eq!(vndk.system_libs.len(), 10);
    assert_eq!(vndk.vendor_libs.len(), 2);
}

#[test]
fn test_compute_sp_hals() {
    let mut gb = GraphBuilder::new();

    // HIDL SP-HAL implementations.
    gb.add_multilib(Partition::System, "gralloc.default", &[], &[], &[], Some("hw"));
    gb.add_multilib(Partition::System, "gralloc.chipset", &[], &[], &[], Some("hw"));
    gb.add_multilib(
        Partition::System,
        "android.hardware.graphics.mapper@2.0-impl",
        &[],
        &[],
        &[],
        Some("hw"),
    );

    // NDK loaders must not be considered SP-HALs.
    for name in ["libvulkan", "libEGL", "libGLESv1_CM", "libGLESv2", "libGLESv3"] {
        gb.add_multilib(Partition::System, name, &[], &[], &[], None);
    }

    // OpenGL implementation.
    for name in [
        "libEGL_chipset",
        "libGLESv1_CM_chipset",
        "libGLESv2_chipset",
        "libGLESv3_chipset",
    ] {
        gb.add_multilib(Partition::Vendor, name, &[], &[], &[], Some("egl"));
    }

    // RenderScript implementation.
    gb.add_multilib(Partition::Vendor, "libRSDriver_chipset", &[], &[], &[], None);
    gb.add_multilib(Partition::Vendor, "libPVRRS", &[], &[], &[], None);

    // Vulkan implementation.
    gb.add_multilib(Partition::Vendor, "vulkan.chipset", &[], &[], &[], Some("hw"));

    // Unrelated libraries.
    gb.add_multilib(Partition::System, "libfoo", &[], &[], &[], None);
    gb.add_multilib(Partition::Vendor, "libfoo", &[], &[], &[], None);

    gb.resolve();

    let graph = &gb.graph;
    let sp_hals: BTreeSet<&str> = paths_of(graph, &graph.compute_sp_hals())
        .into_iter()
        .collect();

    for lib_dir in ["lib", "lib64"] {
        // HIDL SP-HAL implementations.
        assert!(sp_hals.contains(format!("/system/{lib_dir}/hw/gralloc.default.so").as_str()));
        assert!(sp_hals.contains(format!("/system/{lib_dir}/hw/gralloc.chipset.so").as_str()));
        assert!(sp_hals.contains(
            format!("/system/{lib_dir}/hw/android.hardware.graphics.mapper@2.0-impl.so").as_str()
        ));

        // NDK loaders.
        for name in ["libvulkan", "libEGL", "libGLESv1_CM", "libGLESv2", "libGLESv3"] {
            assert!(!sp_hals.contains(format!("/system/{lib_dir}/{name}.so").as_str()));
        }

        // OpenGL implementations.
        for name in [
            "libEGL_chipset",
            "libGLESv1_CM_chipset",
            "libGLESv2_chipset",
            "libGLESv3_chipset",
        ] {
            assert!(sp_hals.contains(format!("/vendor/{lib_dir}/egl/{name}.so").as_str()));
        }

        // RenderScript and Vulkan implementations.
        assert!(sp_hals.contains(format!("/vendor/{lib_dir}/libRSDriver_chipset.so").as_str()));
        assert!(sp_hals.contains(format!("/vendor/{lib_dir}/libPVRRS.so").as_str()));
        assert!(sp_hals.contains(format!("/vendor/{lib_dir}/hw/vulkan.chipset.so").as_str()));

        // Unrelated libraries.
        assert!(!sp_hals.contains(format!("/system/{lib_dir}/libfoo.so").as_str()));
        assert!(!sp_hals.contains(format!("/vendor/{lib_dir}/libfoo.so").as_str()));
    }
}

#[test]
fn test_compute_closure_with_ndk_exclusion() {
    let gb = normal_graph();
    let graph = &gb.graph;

    let libcutils = graph.map_path_to_lib("/system/lib/libcutils.so").unwrap();
    let roots = BTreeSet::from([libcutils]);

    // libdl and libm are low-level NDK and stop the walk; libc is reached
    // through libcutils.
    let closure = graph.compute_closure(&roots, |lib| graph.node(lib).is_ndk);
    assert_eq!(
        paths_of(graph, &closure),
        vec!["/system/lib/libc.so", "/system/lib/libcutils.so"]
    );
}

#[test]
fn test_compute_closure_laws() {
    let gb = normal_graph();
    let graph = &gb.graph;

    let libegl = graph.map_path_to_lib("/vendor/lib64/libEGL.so").unwrap();
    let roots = BTreeSet::from([libegl]);

    let closure = graph.compute_closure(&roots, |_| false);
    assert!(closure.is_superset(&roots));

    let again = graph.compute_closure(&closure, |_| false);
    assert_eq!(closure, again);
}

#[test]
fn test_partition_correction() {
    let mut gb = GraphBuilder::new();

    gb.add_lib(
        Partition::Vendor,
        ElfClass::Elf32,
        "libV",
        &[],
        &["v_sym"],
        &[],
        None,
    );
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libS",
        &["libV.so"],
        &["s_sym"],
        &["v_sym"],
        None,
    );
    // Depends on libS only, but must migrate along with it.
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libS2",
        &["libS.so"],
        &[],
        &["s_sym"],
        None,
    );
    gb.resolve();

    let graph = &gb.graph;
    let (system_libs, vendor_libs) =
        graph.compute_corrected_system_vendor_libs(&BTreeSet::new());

    assert!(system_libs.is_empty());
    assert_eq!(
        paths_of(graph, &vendor_libs),
        vec![
            "/system/lib/libS.so",
            "/system/lib/libS2.so",
            "/vendor/lib/libV.so"
        ]
    );
}

#[test]
fn test_partition_correction_ignores_sp_hals() {
    let mut gb = GraphBuilder::new();

    let sp_hal = gb.add_lib(
        Partition::Vendor,
        ElfClass::Elf32,
        "libEGL_chipset",
        &[],
        &[],
        &[],
        Some("egl"),
    );
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libS",
        &["libEGL_chipset.so"],
        &[],
        &[],
        Some("egl"),
    );
    gb.graph
        .add_dep("/system/lib/egl/libS.so", "/vendor/lib/egl/libEGL_chipset.so");

    let graph = &gb.graph;
    let (system_libs, vendor_libs) =
        graph.compute_corrected_system_vendor_libs(&BTreeSet::from([sp_hal]));

    assert_eq!(paths_of(graph, &system_libs), vec!["/system/lib/egl/libS.so"]);
    assert_eq!(
        paths_of(graph, &vendor_libs),
        vec!["/vendor/lib/egl/libEGL_chipset.so"]
    );
}

#[test]
fn test_banned_libs_are_not_vndk() {
    let mut gb = normal_graph();

    let mut banned = BannedLibDict::new();
    banned.add("libcutils.so", "forbidden", vndk_linker::BannedAction::Warn);

    let vndk = gb.graph.compute_vndk_libs(None, &banned);
    assert!(vndk.vndk_core.is_empty());
}

#[test]
fn test_compute_vndk_libs_with_generic_refs() {
    let mut gb = GraphBuilder::new();

    // Reference-equal, cleanly customized: becomes VNDK-core.
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libvndk",
        &[],
        &["vndk_a"],
        &[],
        None,
    );
    // Superset of the reference; the extra symbol is consumed by vendor code.
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libvndk_ext",
        &[],
        &["ext_a", "ext_b"],
        &[],
        None,
    );
    // Unknown to the reference.
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libnew",
        &[],
        &["new_a"],
        &[],
        None,
    );
    // Misses a reference symbol.
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libmod",
        &[],
        &["m_a"],
        &[],
        None,
    );
    gb.add_lib(
        Partition::Vendor,
        ElfClass::Elf32,
        "libvnd",
        &["libvndk.so", "libvndk_ext.so", "libnew.so", "libmod.so"],
        &[],
        &["vndk_a", "ext_b", "new_a", "m_a"],
        None,
    );
    gb.resolve();

    let mut refs = GenericRefs::new();
    refs.add(
        "/system/lib/libvndk.so",
        ["vndk_a"].iter().map(|s| gb.interner.intern(s)).collect(),
    );
    refs.add(
        "/system/lib/libvndk_ext.so",
        ["ext_a"].iter().map(|s| gb.interner.intern(s)).collect(),
    );
    refs.add(
        "/system/lib/libmod.so",
        ["m_a", "m_b"].iter().map(|s| gb.interner.intern(s)).collect(),
    );

    let vndk = gb.graph.compute_vndk_libs(Some(&refs), &BannedLibDict::new());
    let graph = &gb.graph;

    assert_eq!(paths_of(graph, &vndk.vndk_core), vec!["/system/lib/libvndk.so"]);
    assert_eq!(
        paths_of(graph, &vndk.extra_system_libs),
        vec!["/system/lib/libnew.so"]
    );
    assert_eq!(
        paths_of(graph, &vndk.extra_vendor_libs),
        vec!["/system/lib/libnew.so"]
    );
    assert_eq!(
        paths_of(graph, &vndk.vndk_vnd_ext),
        vec!["/system/lib/libvndk_ext.so"]
    );
    assert!(vndk.vndk_fwk_ext.is_empty());
    assert!(vndk.extra_vndk_core.is_empty());
    assert!(vndk.vndk_indirect.is_empty());

    // The modified library is diagnosed and not classified anywhere.
    let libmod = graph.map_path_to_lib("/system/lib/libmod.so").unwrap();
    for set in [
        &vndk.vndk_core,
        &vndk.vndk_indirect,
        &vndk.vndk_fwk_ext,
        &vndk.vndk_vnd_ext,
        &vndk.extra_system_libs,
        &vndk.extra_vendor_libs,
        &vndk.extra_vndk_core,
    ] {
        assert!(!set.contains(&libmod));
    }

    // The vendor-side extension also joins the vendor partition.
    let libvndk_ext = graph.map_path_to_lib("/system/lib/libvndk_ext.so").unwrap();
    assert!(vndk.vendor_libs.contains(&libvndk_ext));
    assert!(vndk.system_libs.contains(&libmod));
}

#[test]
fn test_vndk_indirect_closure() {
    let mut gb = GraphBuilder::new();

    // libutils is pulled in only through libcutils.
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libutils",
        &[],
        &["utils_sym"],
        &[],
        None,
    );
    gb.add_lib(
        Partition::System,
        ElfClass::Elf32,
        "libcutils",
        &["libutils.so"],
        &["cutils_sym"],
        &["utils_sym"],
        None,
    );
    gb.add_lib(
        Partition::Vendor,
        ElfClass::Elf32,
        "libhw",
        &["libcutils.so"],
        &[],
        &["cutils_sym"],
        None,
    );
    gb.resolve();

    let vndk = gb.graph.compute_vndk_libs(None, &BannedLibDict::new());
    let graph = &gb.graph;

    assert_eq!(
        paths_of(graph, &vndk.vndk_core),
        vec!["/system/lib/libcutils.so"]
    );
    assert_eq!(
        paths_of(graph, &vndk.vndk_indirect),
        vec!["/system/lib/libutils.so"]
    );
}

#[test]
fn test_report_format() {
    let mut gb = normal_graph();

    let vndk = gb.graph.compute_vndk_libs(None, &BannedLibDict::new());

    let mut out = Vec::new();
    vndk.write_report(&gb.graph, &mut out).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "vndk-core: /system/lib/libcutils.so\n\
         vndk-core: /system/lib64/libcutils.so\n"
    );
}
