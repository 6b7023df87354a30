//! The generic reference: baseline exported-symbol sets per library.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use vndk_common::{Interner, Symbol};

use crate::graph::LibNode;

/// How a live library compares to its generic reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibCategory {
    /// The reference has no entry for this path.
    NewLib,
    /// Exports exactly the reference symbols.
    ExportEqual,
    /// Exports a proper superset of the reference symbols.
    ExportSuperSet,
    /// Misses or renames reference symbols.
    Modified,
}

/// Baseline exported-symbol sets, keyed by canonical library path.
///
/// Built once from a tree of `.sym` files and immutable afterwards.
#[derive(Debug, Default)]
pub struct GenericRefs {
    refs: BTreeMap<String, BTreeSet<Symbol>>,
}

impl GenericRefs {
    /// Creates an empty reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `.sym` file below `root`.
    ///
    /// The file's path relative to `root`, with the `.sym` suffix dropped
    /// and a leading `/`, becomes the library's canonical path; the file
    /// contains one exported symbol per line.
    pub fn create_from_dir(root: &Path, interner: &mut Interner) -> io::Result<Self> {
        let mut refs = GenericRefs::new();

        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };

            let mut lib_path = String::new();
            for component in rel.components() {
                lib_path.push('/');
                lib_path.push_str(&component.as_os_str().to_string_lossy());
            }
            let Some(lib_path) = lib_path.strip_suffix(".sym") else {
                continue;
            };

            let content = fs::read_to_string(path)?;
            let symbols = content
                .lines()
                .map(|line| interner.intern(line.trim()))
                .collect();
            refs.add(lib_path, symbols);
        }

        Ok(refs)
    }

    /// Registers the reference symbol set of one library path.
    pub fn add(&mut self, path: impl Into<String>, symbols: BTreeSet<Symbol>) {
        self.refs.insert(path.into(), symbols);
    }

    /// Returns the reference symbols of a canonical path.
    pub fn get(&self, path: &str) -> Option<&BTreeSet<Symbol>> {
        self.refs.get(path)
    }

    /// Number of registered libraries.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns `true` if no library is registered.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Compares a live library against its reference entry.
    pub fn classify(&self, lib: &LibNode) -> LibCategory {
        let Some(ref_symbols) = self.refs.get(&lib.path) else {
            return LibCategory::NewLib;
        };
        let exported = &lib.elf.exported_symbols;
        if exported == ref_symbols {
            LibCategory::ExportEqual
        } else if exported.is_superset(ref_symbols) {
            LibCategory::ExportSuperSet
        } else {
            LibCategory::Modified
        }
    }

    /// Returns `true` if the library exports exactly its reference symbols.
    pub fn is_equivalent_lib(&self, lib: &LibNode) -> bool {
        self.classify(lib) == LibCategory::ExportEqual
    }
}
