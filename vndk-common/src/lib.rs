//! Common functionality for the VNDK definition toolkit.
//!
//! This crate exposes two key types:
//!
//!  - [`ByteView`]: Gives access to binary data in-memory or on the file system.
//!  - [`Interner`]: Hash-consing store for dynamic [`Symbol`] names.

#![warn(missing_docs)]

mod byteview;
mod intern;

pub use crate::byteview::*;
pub use crate::intern::*;
