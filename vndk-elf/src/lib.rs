//! A minimal reader for the dynamic linking view of ELF shared objects.
//!
//! Only the pieces of an image that matter for link-time analysis are
//! decoded: the identification bytes, the machine id, and the `.dynamic`,
//! `.dynstr` and `.dynsym` sections. Program headers, relocations and debug
//! information are never touched. Both word sizes and both byte orders are
//! supported; multi-byte fields are decoded with the endianness declared in
//! the identification bytes.
//!
//! # Example
//!
//! ```no_run
//! use vndk_common::{ByteView, Interner};
//! use vndk_elf::Elf;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut interner = Interner::new();
//!     let view = ByteView::open("/system/lib64/libc.so")?;
//!     let elf = Elf::parse(&view, &mut interner)?;
//!     println!("{} needed libraries", elf.dt_needed.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod error;
mod reader;

pub use crate::error::ElfError;

use std::collections::BTreeSet;
use std::fmt;
use std::io;

use vndk_common::{Interner, Symbol};

/// The word size of an ELF object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElfClass {
    /// 32-bit object (ELFCLASS32).
    Elf32,
    /// 64-bit object (ELFCLASS64).
    Elf64,
}

impl ElfClass {
    /// Returns the word size as a short string, `"32"` or `"64"`.
    pub fn name(self) -> &'static str {
        match self {
            ElfClass::Elf32 => "32",
            ElfClass::Elf64 => "64",
        }
    }
}

impl fmt::Display for ElfClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The byte order of an ELF object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElfData {
    /// Two's complement little-endian (ELFDATA2LSB).
    LittleEndian,
    /// Two's complement big-endian (ELFDATA2MSB).
    BigEndian,
}

impl ElfData {
    /// Returns the human readable name of the byte order.
    pub fn name(self) -> &'static str {
        match self {
            ElfData::LittleEndian => "Little-Endian",
            ElfData::BigEndian => "Big-Endian",
        }
    }
}

impl fmt::Display for ElfData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The dynamic linking view of one shared object.
///
/// All strings are copied out of the input buffer during parsing; symbol
/// names are interned through the caller-supplied [`Interner`]. The record
/// is never mutated after parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Elf {
    /// Word size of the object.
    pub ei_class: ElfClass,
    /// Byte order of the object.
    pub ei_data: ElfData,
    /// Machine id from the file header (`EM_ARM`, `EM_AARCH64`, ...).
    pub e_machine: u16,
    /// `DT_RPATH` search directories, split on `:`, in file order.
    pub dt_rpath: Vec<String>,
    /// `DT_RUNPATH` search directories, split on `:`, in file order.
    pub dt_runpath: Vec<String>,
    /// Base names of needed libraries, in file order.
    pub dt_needed: Vec<String>,
    /// Names of defined dynamic symbols with non-local binding.
    pub exported_symbols: BTreeSet<Symbol>,
    /// Names of undefined dynamic symbols.
    pub imported_symbols: BTreeSet<Symbol>,
}

impl Elf {
    /// Creates an empty record with the given identification.
    pub fn new(ei_class: ElfClass, ei_data: ElfData) -> Self {
        Elf {
            ei_class,
            ei_data,
            e_machine: 0,
            dt_rpath: Vec::new(),
            dt_runpath: Vec::new(),
            dt_needed: Vec::new(),
            exported_symbols: BTreeSet::new(),
            imported_symbols: BTreeSet::new(),
        }
    }

    /// Tests whether the buffer could contain an ELF object.
    pub fn peek(data: &[u8]) -> bool {
        data.get(..4) == Some(reader::ELF_MAGIC)
    }

    /// Parses the dynamic linking view out of an ELF image.
    ///
    /// Symbol names are interned through `interner`; nothing in the returned
    /// record borrows from `data`.
    pub fn parse(data: &[u8], interner: &mut Interner) -> Result<Self, ElfError> {
        reader::parse(data, interner)
    }

    /// Returns `true` for 32-bit objects.
    pub fn is_32bit(&self) -> bool {
        self.ei_class == ElfClass::Elf32
    }

    /// Returns `true` for 64-bit objects.
    pub fn is_64bit(&self) -> bool {
        self.ei_class == ElfClass::Elf64
    }

    /// Returns the well-known name of the machine id, or its decimal value.
    pub fn machine_name(&self) -> String {
        match self.e_machine {
            0 => "EM_NONE".into(),
            3 => "EM_386".into(),
            8 => "EM_MIPS".into(),
            40 => "EM_ARM".into(),
            62 => "EM_X86_64".into(),
            183 => "EM_AARCH64".into(),
            other => other.to_string(),
        }
    }

    /// Writes the parsed record as tab-separated `elfdump` lines.
    ///
    /// Dynamic entries keep file order; symbols are sorted by name.
    pub fn dump<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "EI_CLASS\t{}", self.ei_class)?;
        writeln!(writer, "EI_DATA\t\t{}", self.ei_data)?;
        writeln!(writer, "E_MACHINE\t{}", self.machine_name())?;
        for dt_rpath in &self.dt_rpath {
            writeln!(writer, "DT_RPATH\t{dt_rpath}")?;
        }
        for dt_runpath in &self.dt_runpath {
            writeln!(writer, "DT_RUNPATH\t{dt_runpath}")?;
        }
        for dt_needed in &self.dt_needed {
            writeln!(writer, "DT_NEEDED\t{dt_needed}")?;
        }
        for symbol in &self.exported_symbols {
            writeln!(writer, "EXP_SYMBOL\t{symbol}")?;
        }
        for symbol in &self.imported_symbols {
            writeln!(writer, "IMP_SYMBOL\t{symbol}")?;
        }
        Ok(())
    }

    /// Writes the exported symbols, one per line, sorted by name.
    ///
    /// This is the `.sym` format consumed by the generic reference loader.
    pub fn dump_exported_symbols<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        for symbol in &self.exported_symbols {
            writeln!(writer, "{symbol}")?;
        }
        Ok(())
    }
}
