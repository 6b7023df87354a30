//! The ELF image decoder.

use std::collections::HashMap;

use scroll::{Endian, Pread};

use vndk_common::Interner;

use crate::{Elf, ElfClass, ElfData, ElfError};

pub(crate) const ELF_MAGIC: &[u8] = b"\x7fELF";

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;

const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

const DT_NEEDED: i64 = 1;
const DT_RPATH: i64 = 15;
const DT_RUNPATH: i64 = 29;

const SHN_UNDEF: u16 = 0;
const STB_LOCAL: u8 = 0;

/// File header fields the reader cares about.
struct Header {
    e_machine: u16,
    e_shoff: usize,
    e_shentsize: usize,
    e_shnum: usize,
    e_shstrndx: usize,
}

/// Section header fields the reader cares about.
struct SectionHeader {
    sh_name: u32,
    sh_offset: usize,
    sh_size: usize,
    sh_entsize: usize,
}

struct SymEntry {
    st_name: u32,
    st_info: u8,
    st_shndx: u16,
}

impl SymEntry {
    fn binding(&self) -> u8 {
        self.st_info >> 4
    }
}

/// Endian- and class-aware field access into the raw image.
struct Reader<'d> {
    data: &'d [u8],
    class: ElfClass,
    endian: Endian,
}

impl<'d> Reader<'d> {
    fn u8(&self, offset: usize, what: &'static str) -> Result<u8, ElfError> {
        self.data
            .pread_with::<u8>(offset, self.endian)
            .map_err(|_| ElfError::TruncatedStruct(what))
    }

    fn u16(&self, offset: usize, what: &'static str) -> Result<u16, ElfError> {
        self.data
            .pread_with::<u16>(offset, self.endian)
            .map_err(|_| ElfError::TruncatedStruct(what))
    }

    fn u32(&self, offset: usize, what: &'static str) -> Result<u32, ElfError> {
        self.data
            .pread_with::<u32>(offset, self.endian)
            .map_err(|_| ElfError::TruncatedStruct(what))
    }

    fn u64(&self, offset: usize, what: &'static str) -> Result<u64, ElfError> {
        self.data
            .pread_with::<u64>(offset, self.endian)
            .map_err(|_| ElfError::TruncatedStruct(what))
    }

    /// Reads a class-sized address or offset field as `usize`.
    fn addr(&self, offset: usize, what: &'static str) -> Result<usize, ElfError> {
        match self.class {
            ElfClass::Elf32 => Ok(self.u32(offset, what)? as usize),
            ElfClass::Elf64 => usize::try_from(self.u64(offset, what)?).map_err(|_| ElfError::BadOffset),
        }
    }

    fn header(&self) -> Result<Header, ElfError> {
        const WHAT: &str = "ELF header";
        match self.class {
            ElfClass::Elf32 => Ok(Header {
                e_machine: self.u16(18, WHAT)?,
                e_shoff: self.addr(32, WHAT)?,
                e_shentsize: self.u16(46, WHAT)? as usize,
                e_shnum: self.u16(48, WHAT)? as usize,
                e_shstrndx: self.u16(50, WHAT)? as usize,
            }),
            ElfClass::Elf64 => Ok(Header {
                e_machine: self.u16(18, WHAT)?,
                e_shoff: self.addr(40, WHAT)?,
                e_shentsize: self.u16(58, WHAT)? as usize,
                e_shnum: self.u16(60, WHAT)? as usize,
                e_shstrndx: self.u16(62, WHAT)? as usize,
            }),
        }
    }

    fn section_header(&self, offset: usize) -> Result<SectionHeader, ElfError> {
        const WHAT: &str = "section header";
        match self.class {
            ElfClass::Elf32 => Ok(SectionHeader {
                sh_name: self.u32(offset, WHAT)?,
                sh_offset: self.addr(offset + 16, WHAT)?,
                sh_size: self.addr(offset + 20, WHAT)?,
                sh_entsize: self.addr(offset + 36, WHAT)?,
            }),
            ElfClass::Elf64 => Ok(SectionHeader {
                sh_name: self.u32(offset, WHAT)?,
                sh_offset: self.addr(offset + 24, WHAT)?,
                sh_size: self.addr(offset + 32, WHAT)?,
                sh_entsize: self.addr(offset + 56, WHAT)?,
            }),
        }
    }

    fn dyn_entry(&self, offset: usize) -> Result<(i64, u64), ElfError> {
        const WHAT: &str = ".dynamic entry";
        match self.class {
            ElfClass::Elf32 => {
                let d_tag = self.u32(offset, WHAT)? as i32 as i64;
                let d_val = self.u32(offset + 4, WHAT)? as u64;
                Ok((d_tag, d_val))
            }
            ElfClass::Elf64 => {
                let d_tag = self.u64(offset, WHAT)? as i64;
                let d_val = self.u64(offset + 8, WHAT)?;
                Ok((d_tag, d_val))
            }
        }
    }

    fn sym_entry(&self, offset: usize) -> Result<SymEntry, ElfError> {
        const WHAT: &str = "symbol entry";
        match self.class {
            ElfClass::Elf32 => Ok(SymEntry {
                st_name: self.u32(offset, WHAT)?,
                st_info: self.u8(offset + 12, WHAT)?,
                st_shndx: self.u16(offset + 14, WHAT)?,
            }),
            ElfClass::Elf64 => Ok(SymEntry {
                st_name: self.u32(offset, WHAT)?,
                st_info: self.u8(offset + 4, WHAT)?,
                st_shndx: self.u16(offset + 6, WHAT)?,
            }),
        }
    }

    /// Extracts the NUL-terminated string at `offset`.
    ///
    /// Unterminated strings are clamped at the end of the buffer; offsets
    /// past the end yield the empty string.
    fn cstr(&self, offset: usize) -> String {
        let Some(slice) = self.data.get(offset..) else {
            return String::new();
        };
        let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        String::from_utf8_lossy(&slice[..end]).into_owned()
    }
}

/// Computes a string-table offset, clamping overflow to "past the end".
fn str_offset(base: usize, index: u64) -> usize {
    base.saturating_add(usize::try_from(index).unwrap_or(usize::MAX))
}

pub(crate) fn parse(data: &[u8], interner: &mut Interner) -> Result<Elf, ElfError> {
    if data.get(..4) != Some(ELF_MAGIC) {
        return Err(ElfError::BadMagic);
    }

    let class = match data.get(EI_CLASS) {
        Some(&ELFCLASS32) => ElfClass::Elf32,
        Some(&ELFCLASS64) => ElfClass::Elf64,
        _ => return Err(ElfError::UnknownClass),
    };

    let ei_data = match data.get(EI_DATA) {
        Some(&ELFDATA2LSB) => ElfData::LittleEndian,
        Some(&ELFDATA2MSB) => ElfData::BigEndian,
        _ => return Err(ElfError::UnknownEndian),
    };

    let endian = match ei_data {
        ElfData::LittleEndian => Endian::Little,
        ElfData::BigEndian => Endian::Big,
    };

    let reader = Reader { data, class, endian };

    let header = reader.header()?;
    if header.e_shentsize == 0 {
        return Err(ElfError::NoSectionTable);
    }

    // Locate the section-header string table.
    let shstrtab_shdr_off = header
        .e_shoff
        .checked_add(header.e_shstrndx * header.e_shentsize)
        .ok_or(ElfError::BadOffset)?;
    let shstrtab = reader.section_header(shstrtab_shdr_off)?;

    // Index the section headers by name.
    let mut sections = HashMap::new();
    let mut shdr_off = header.e_shoff;
    for _ in 0..header.e_shnum {
        let shdr = reader.section_header(shdr_off)?;
        let name = reader.cstr(shstrtab.sh_offset.saturating_add(shdr.sh_name as usize));
        sections.insert(name, shdr);
        shdr_off = shdr_off.checked_add(header.e_shentsize).ok_or(ElfError::BadOffset)?;
    }

    let dynamic = sections.get(".dynamic").ok_or(ElfError::NoDynamic)?;
    let dynstr = sections.get(".dynstr").ok_or(ElfError::NoDynstr)?;

    let mut elf = Elf::new(class, ei_data);
    elf.e_machine = header.e_machine;

    // Walk the .dynamic entries at their declared size. A zero entry size
    // would never advance.
    if dynamic.sh_entsize == 0 {
        return Err(ElfError::BadOffset);
    }
    let dynamic_end = dynamic
        .sh_offset
        .checked_add(dynamic.sh_size)
        .ok_or(ElfError::BadOffset)?;
    let mut ent_off = dynamic.sh_offset;
    while ent_off < dynamic_end {
        let (d_tag, d_val) = reader.dyn_entry(ent_off)?;
        match d_tag {
            DT_NEEDED => {
                let name = reader.cstr(str_offset(dynstr.sh_offset, d_val));
                elf.dt_needed.push(name);
            }
            DT_RPATH => {
                let paths = reader.cstr(str_offset(dynstr.sh_offset, d_val));
                elf.dt_rpath.extend(paths.split(':').map(String::from));
            }
            DT_RUNPATH => {
                let paths = reader.cstr(str_offset(dynstr.sh_offset, d_val));
                elf.dt_runpath.extend(paths.split(':').map(String::from));
            }
            _ => {}
        }
        ent_off = ent_off.saturating_add(dynamic.sh_entsize);
    }

    // Classify the dynamic symbols, skipping the null entry.
    if let Some(dynsym) = sections.get(".dynsym") {
        if dynsym.sh_entsize == 0 {
            return Err(ElfError::BadOffset);
        }
        let dynsym_end = dynsym
            .sh_offset
            .checked_add(dynsym.sh_size)
            .ok_or(ElfError::BadOffset)?;
        let mut ent_off = dynsym
            .sh_offset
            .checked_add(dynsym.sh_entsize)
            .ok_or(ElfError::BadOffset)?;
        while ent_off < dynsym_end {
            let sym = reader.sym_entry(ent_off)?;
            let name = reader.cstr(str_offset(dynstr.sh_offset, sym.st_name as u64));
            let name = interner.intern(&name);
            if sym.st_shndx == SHN_UNDEF {
                elf.imported_symbols.insert(name);
            } else if sym.binding() != STB_LOCAL {
                elf.exported_symbols.insert(name);
            }
            ent_off = ent_off.saturating_add(dynsym.sh_entsize);
        }
    }

    Ok(elf)
}
