#![allow(dead_code)]

use std::collections::BTreeSet;

use vndk_common::Interner;
use vndk_elf::{Elf, ElfClass, ElfData};
use vndk_linker::{ElfLinker, LibIdx, Partition};

/// Builds graphs from forged ELF records, one `add_lib` call per library.
pub struct GraphBuilder {
    pub graph: ElfLinker,
    pub interner: Interner,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder {
            graph: ElfLinker::new(),
            interner: Interner::new(),
        }
    }

    fn lib_dir(class: ElfClass) -> &'static str {
        match class {
            ElfClass::Elf32 => "lib",
            ElfClass::Elf64 => "lib64",
        }
    }

    pub fn add_lib(
        &mut self,
        partition: Partition,
        class: ElfClass,
        name: &str,
        dt_needed: &[&str],
        exported: &[&str],
        imported: &[&str],
        extra_dir: Option<&str>,
    ) -> LibIdx {
        let mut elf = Elf::new(class, ElfData::LittleEndian);
        elf.dt_needed = dt_needed.iter().map(|s| s.to_string()).collect();
        elf.exported_symbols = exported.iter().map(|s| self.interner.intern(s)).collect();
        elf.imported_symbols = imported.iter().map(|s| self.interner.intern(s)).collect();

        let path = match extra_dir {
            Some(dir) => format!(
                "/{}/{}/{}/{}.so",
                partition.name(),
                Self::lib_dir(class),
                dir,
                name
            ),
            None => format!("/{}/{}/{}.so", partition.name(), Self::lib_dir(class), name),
        };
        self.graph.add(partition, path, elf)
    }

    pub fn add_multilib(
        &mut self,
        partition: Partition,
        name: &str,
        dt_needed: &[&str],
        exported: &[&str],
        imported: &[&str],
        extra_dir: Option<&str>,
    ) {
        for class in [ElfClass::Elf32, ElfClass::Elf64] {
            self.add_lib(partition, class, name, dt_needed, exported, imported, extra_dir);
        }
    }

    pub fn resolve(&mut self) {
        self.graph.resolve_deps();
    }
}

/// The six-library multi-arch fixture shared by several tests.
pub fn normal_graph() -> GraphBuilder {
    let mut gb = GraphBuilder::new();

    gb.add_multilib(
        Partition::System,
        "libdl",
        &[],
        &["dlclose", "dlopen", "dlsym"],
        &[],
        None,
    );

    gb.add_multilib(Partition::System, "libm", &[], &["cos", "sin"], &[], None);

    gb.add_multilib(
        Partition::System,
        "libc",
        &["libdl.so", "libm.so"],
        &["fclose", "fopen", "fread"],
        &["dlclose", "dlopen", "cos", "sin"],
        None,
    );

    gb.add_multilib(
        Partition::System,
        "libRS",
        &["libdl.so"],
        &["rsContextCreate"],
        &["dlclose", "dlopen", "dlsym"],
        None,
    );

    gb.add_multilib(
        Partition::System,
        "libcutils",
        &["libc.so", "libdl.so"],
        &[],
        &["dlclose", "dlopen", "fclose", "fopen"],
        None,
    );

    gb.add_multilib(
        Partition::Vendor,
        "libEGL",
        &["libc.so", "libcutils.so", "libdl.so"],
        &["eglGetDisplay"],
        &["fclose", "fopen"],
        None,
    );

    gb.resolve();
    gb
}

pub fn paths_of<'g>(graph: &'g ElfLinker, libs: &BTreeSet<LibIdx>) -> Vec<&'g str> {
    graph.sorted_paths(libs.iter().copied())
}
