//! The VNDK classification passes.

use std::collections::BTreeSet;
use std::io;

use tracing::{error, warn};

use crate::banned::BannedLibDict;
use crate::generic_refs::{GenericRefs, LibCategory};
use crate::graph::{basename, ElfLinker, LibIdx, LibNode, Partition};
use crate::sp_hal::is_sp_hal;

/// The classification produced by [`ElfLinker::compute_vndk_libs`].
///
/// The seven category sets drive the report; `system_libs` / `vendor_libs`
/// carry the corrected partition assignment (libraries may migrate from
/// system to vendor, and extension libraries may be added to both sides).
#[derive(Debug, Default)]
pub struct VndkSets {
    /// Libraries absent from the reference, required on both partitions.
    pub extra_system_libs: BTreeSet<LibIdx>,
    /// Vendor-side copies of the libraries in `extra_system_libs`.
    pub extra_vendor_libs: BTreeSet<LibIdx>,
    /// Extensively customized VNDK-core libraries kept framework-only.
    pub extra_vndk_core: BTreeSet<LibIdx>,
    /// System libraries vendor code links against, used unmodified.
    pub vndk_core: BTreeSet<LibIdx>,
    /// Dependencies pulled in transitively by `vndk_core`.
    pub vndk_indirect: BTreeSet<LibIdx>,
    /// Extension libraries consumed on the framework side.
    pub vndk_fwk_ext: BTreeSet<LibIdx>,
    /// Extension libraries consumed on the vendor side.
    pub vndk_vnd_ext: BTreeSet<LibIdx>,
    /// Final system-partition membership.
    pub system_libs: BTreeSet<LibIdx>,
    /// Final vendor-partition membership.
    pub vendor_libs: BTreeSet<LibIdx>,
}

impl VndkSets {
    /// Writes the `category: path` report in its fixed category order,
    /// paths sorted ascending within each category.
    pub fn write_report<W: io::Write>(&self, graph: &ElfLinker, writer: &mut W) -> io::Result<()> {
        let categories: [(&str, &BTreeSet<LibIdx>); 7] = [
            ("extra-system-lib", &self.extra_system_libs),
            ("extra-vendor-lib", &self.extra_vendor_libs),
            ("extra-vndk-core", &self.extra_vndk_core),
            ("vndk-core", &self.vndk_core),
            ("vndk-indirect", &self.vndk_indirect),
            ("vndk-fwk-ext", &self.vndk_fwk_ext),
            ("vndk-vnd-ext", &self.vndk_vnd_ext),
        ];
        for (category, libs) in categories {
            for path in graph.sorted_paths(libs.iter().copied()) {
                writeln!(writer, "{category}: {path}")?;
            }
        }
        Ok(())
    }
}

impl ElfLinker {
    /// Returns every library whose canonical path matches the same-process
    /// HAL patterns, across both partitions.
    pub fn compute_sp_hals(&self) -> BTreeSet<LibIdx> {
        let mut sp_hals = BTreeSet::new();
        for lib_set in &self.lib_pt {
            for &lib in lib_set.values() {
                if is_sp_hal(&self.node(lib).path) {
                    sp_hals.insert(lib);
                }
            }
        }
        sp_hals
    }

    /// Libraries whose ABI is stable between framework and vendor across
    /// releases. The set must come from configuration; none is defined yet.
    pub fn compute_vndk_stable_libs(&self) -> BTreeSet<LibIdx> {
        BTreeSet::new()
    }

    /// Orders `libs` so that associated nodes (within `libs`) come before
    /// the nodes that reference them. Ties break by canonical path.
    fn assoc_first_order<F>(&self, libs: &BTreeSet<LibIdx>, assoc: F) -> Vec<LibIdx>
    where
        F: Fn(&LibNode) -> &BTreeSet<LibIdx>,
    {
        struct Walk<'g, F> {
            graph: &'g ElfLinker,
            assoc: F,
            visited: BTreeSet<LibIdx>,
            order: Vec<LibIdx>,
        }

        impl<F: Fn(&LibNode) -> &BTreeSet<LibIdx>> Walk<'_, F> {
            fn visit(&mut self, libs: &BTreeSet<LibIdx>, lib: LibIdx) {
                if !self.visited.insert(lib) {
                    return;
                }
                let assoc_libs = (self.assoc)(self.graph.node(lib))
                    .iter()
                    .copied()
                    .filter(|assoc_lib| libs.contains(assoc_lib));
                for next in self.graph.sorted_by_path(assoc_libs) {
                    self.visit(libs, next);
                }
                self.order.push(lib);
            }
        }

        let mut walk = Walk {
            graph: self,
            assoc,
            visited: BTreeSet::new(),
            order: Vec::new(),
        };
        for lib in self.sorted_by_path(libs.iter().copied()) {
            walk.visit(libs, lib);
        }
        walk.order
    }

    /// Reassigns system libraries that depend on non-SP-HAL vendor
    /// libraries to the vendor partition.
    ///
    /// System nodes are visited dependencies-first so that a migrated
    /// dependency pulls its users along. Returns the corrected
    /// (system, vendor) membership sets; node tags are not touched.
    pub fn compute_corrected_system_vendor_libs(
        &self,
        sp_hals: &BTreeSet<LibIdx>,
    ) -> (BTreeSet<LibIdx>, BTreeSet<LibIdx>) {
        let system_all: BTreeSet<LibIdx> = self
            .partition_libs(Partition::System)
            .values()
            .copied()
            .collect();
        let mut vendor_libs: BTreeSet<LibIdx> = self
            .partition_libs(Partition::Vendor)
            .values()
            .copied()
            .collect();
        let mut system_libs = BTreeSet::new();

        for lib in self.assoc_first_order(&system_all, |node| &node.deps) {
            let node = self.node(lib);
            let vendor_deps = self.sorted_paths(
                node.deps
                    .iter()
                    .copied()
                    .filter(|dep| vendor_libs.contains(dep) && !sp_hals.contains(dep)),
            );
            if vendor_deps.is_empty() {
                system_libs.insert(lib);
            } else {
                warn!(
                    "{}: system library must not depend on vendor libraries ({}); \
                     assuming it belongs in the vendor partition instead",
                    node.path,
                    vendor_deps.join(", ")
                );
                vendor_libs.insert(lib);
            }
        }

        (system_libs, vendor_libs)
    }

    /// Records, for every system library, which users consume symbols that
    /// are absent from the library's generic reference entry.
    ///
    /// A library without a reference entry counts every user as extended.
    pub fn compute_extended_symbol_users(&mut self, generic_refs: &GenericRefs) {
        let system_libs: Vec<LibIdx> = self
            .partition_libs(Partition::System)
            .values()
            .copied()
            .collect();

        for lib in system_libs {
            let users = self.node(lib).users.clone();
            let extended = match generic_refs.get(&self.node(lib).path) {
                None => users,
                Some(ref_symbols) => users
                    .into_iter()
                    .filter(|&user| {
                        self.node(user)
                            .linked_symbols
                            .iter()
                            .any(|(symbol, &provider)| {
                                provider == lib && !ref_symbols.contains(symbol)
                            })
                    })
                    .collect(),
            };
            self.node_mut(lib).extended_symbol_users = extended;
        }
    }

    /// Transitive closure of `roots` over `deps`.
    ///
    /// The roots are always included; an edge into an excluded node is
    /// skipped. Terminates on cyclic graphs.
    pub fn compute_closure<F>(&self, roots: &BTreeSet<LibIdx>, mut is_excluded: F) -> BTreeSet<LibIdx>
    where
        F: FnMut(LibIdx) -> bool,
    {
        let mut closure = roots.clone();
        let mut stack: Vec<LibIdx> = roots.iter().copied().collect();
        while let Some(lib) = stack.pop() {
            for &dep in &self.node(lib).deps {
                if is_excluded(dep) {
                    continue;
                }
                if closure.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        closure
    }

    /// Runs the full VNDK classification.
    ///
    /// Without a generic reference, every VNDK candidate becomes VNDK-core.
    /// With one, candidates are sorted by their reference category and the
    /// extension sets are derived from the extended-symbol users.
    pub fn compute_vndk_libs(
        &mut self,
        generic_refs: Option<&GenericRefs>,
        banned_libs: &BannedLibDict,
    ) -> VndkSets {
        if let Some(refs) = generic_refs {
            self.compute_extended_symbol_users(refs);
        }
        let graph = &*self;

        let sp_hals = graph.compute_sp_hals();
        let vndk_stable = graph.compute_vndk_stable_libs();
        let (mut system_libs, mut vendor_libs) =
            graph.compute_corrected_system_vendor_libs(&sp_hals);

        let is_not_vndk = |lib: LibIdx| {
            let node = graph.node(lib);
            node.is_ndk || banned_libs.get(basename(&node.path)).is_some()
        };

        // VNDK candidates: system libraries with at least one vendor user.
        let mut vndk_candidates = BTreeSet::new();
        for &lib in &system_libs {
            if is_not_vndk(lib) {
                continue;
            }
            let has_vendor_user = graph
                .node(lib)
                .users
                .iter()
                .any(|&user| graph.node(user).partition == Partition::Vendor);
            if has_vendor_user {
                vndk_candidates.insert(lib);
            }
        }

        let mut vndk_core = BTreeSet::new();
        let mut vndk_customized_candidates = BTreeSet::new();
        let mut vndk_extended_candidates = BTreeSet::new();
        let mut extra_vndk_core = BTreeSet::new();
        let mut extra_system_libs = BTreeSet::new();
        let mut extra_vendor_libs = BTreeSet::new();
        let mut vndk_fwk_ext = BTreeSet::new();
        let mut vndk_vnd_ext = BTreeSet::new();

        match generic_refs {
            None => vndk_core = vndk_candidates,
            Some(refs) => {
                for lib in graph.sorted_by_path(vndk_candidates.iter().copied()) {
                    match refs.classify(graph.node(lib)) {
                        LibCategory::NewLib => {
                            // Not part of the reference: the library must be
                            // present on both sides.
                            system_libs.insert(lib);
                            vendor_libs.insert(lib);
                            extra_system_libs.insert(lib);
                            extra_vendor_libs.insert(lib);
                        }
                        LibCategory::ExportEqual => {
                            vndk_customized_candidates.insert(lib);
                        }
                        LibCategory::ExportSuperSet => {
                            vndk_extended_candidates.insert(lib);
                        }
                        LibCategory::Modified => {
                            error!(
                                "{}: vndk library must not be modified",
                                graph.node(lib).path
                            );
                        }
                    }
                }
            }
        }

        // Reference-equal candidates: carefully customized ones become
        // VNDK-core, extensively customized ones stay framework-only.
        for lib in graph.sorted_by_path(vndk_customized_candidates.iter().copied()) {
            system_libs.insert(lib);
            if graph.node(lib).extended_symbol_users.is_empty() {
                vndk_core.insert(lib);
            } else {
                extra_vndk_core.insert(lib);
                vndk_fwk_ext.insert(lib);
            }
        }

        // Superset candidates follow their extended-symbol users, visited
        // users-first so earlier decisions propagate.
        for lib in graph.assoc_first_order(&vndk_extended_candidates, |node| &node.users) {
            let mut has_system_users = false;
            let mut has_vendor_users = false;
            for user in &graph.node(lib).extended_symbol_users {
                if system_libs.contains(user) {
                    has_system_users = true;
                }
                if vendor_libs.contains(user) {
                    has_vendor_users = true;
                }
            }
            if has_system_users {
                system_libs.insert(lib);
                vndk_fwk_ext.insert(lib);
            }
            if has_vendor_users {
                vendor_libs.insert(lib);
                vndk_vnd_ext.insert(lib);
            }
        }

        let mut vndk_indirect = graph.compute_closure(&vndk_core, |lib| {
            is_not_vndk(lib) || vendor_libs.contains(&lib)
        });
        vndk_indirect.retain(|lib| !vndk_core.contains(lib));

        let is_not_ext = |lib: LibIdx| {
            is_not_vndk(lib)
                || vndk_core.contains(&lib)
                || vndk_indirect.contains(&lib)
                || vndk_stable.contains(&lib)
                || sp_hals.contains(&lib)
        };
        let vndk_fwk_ext = graph.compute_closure(&vndk_fwk_ext, &is_not_ext);
        let vndk_vnd_ext = graph.compute_closure(&vndk_vnd_ext, &is_not_ext);

        VndkSets {
            extra_system_libs,
            extra_vendor_libs,
            extra_vndk_core,
            vndk_core,
            vndk_indirect,
            vndk_fwk_ext,
            vndk_vnd_ext,
            system_libs,
            vendor_libs,
        }
    }
}
