//! Link resolution and VNDK classification for shared-library trees.
//!
//! The entry point is [`ElfLinker`]: scan one or more partition roots into a
//! per-word-size dependency graph, resolve `DT_NEEDED` entries and imported
//! symbols, then run [`ElfLinker::compute_vndk_libs`] to partition the
//! framework libraries into the VNDK categories.
//!
//! All diagnostics (missing dependencies, partition violations, modified
//! VNDK libraries) are emitted as `tracing` events; the report itself is
//! produced by [`VndkSets::write_report`].

mod banned;
mod generic_refs;
mod graph;
mod ndk;
mod resolve;
mod sp_hal;
mod vndk;

pub use crate::banned::{BannedAction, BannedLib, BannedLibDict};
pub use crate::generic_refs::{GenericRefs, LibCategory};
pub use crate::graph::{basename, ElfLinker, LibIdx, LibNode, Partition};
pub use crate::ndk::{is_high_level_ndk_lib, is_ndk_lib, NDK_HIGH_LEVEL, NDK_LOW_LEVEL};
pub use crate::resolve::Resolver;
pub use crate::vndk::VndkSets;
