use thiserror::Error;

/// An error encountered while decoding an ELF image.
///
/// Every variant names the structural check that failed. The directory
/// scanner treats all of these as "not a usable shared object" and skips the
/// file; only `elfdump` surfaces them to the user.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ElfError {
    /// The buffer does not start with `\x7fELF`.
    #[error("bad magic")]
    BadMagic,

    /// The class byte is neither ELFCLASS32 nor ELFCLASS64.
    #[error("unknown word size")]
    UnknownClass,

    /// The data byte is neither ELFDATA2LSB nor ELFDATA2MSB.
    #[error("unknown endianness")]
    UnknownEndian,

    /// The header declares a zero section-header entry size.
    #[error("no section header table")]
    NoSectionTable,

    /// The image has no `.dynamic` section.
    #[error("no .dynamic section")]
    NoDynamic,

    /// The image has no `.dynstr` section.
    #[error("no .dynstr section")]
    NoDynstr,

    /// A computed file offset is out of range.
    #[error("bad offset")]
    BadOffset,

    /// A fixed-size structure extends past the end of the buffer.
    #[error("truncated {0}")]
    TruncatedStruct(&'static str),
}
