//! Test helpers shared by the toolkit crates.
//!
//! The main export is [`ElfImage`], a builder that emits small but fully
//! self-consistent ELF images: file header, `.dynsym`, `.dynstr`,
//! `.dynamic`, `.shstrtab` and the section header table. Both word sizes
//! and byte orders are supported so parser tests can cover all four
//! layouts without binary fixtures.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

const SHT_STRTAB: u32 = 3;
const SHT_DYNAMIC: u32 = 6;
const SHT_DYNSYM: u32 = 11;

const DT_NEEDED: u64 = 1;
const DT_RPATH: u64 = 15;
const DT_RUNPATH: u64 = 29;

/// st_info for a global function symbol: binding GLOBAL (1), type FUNC (2).
const STB_GLOBAL_STT_FUNC: u8 = 0x12;

/// A string table under construction.
struct StrTab {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StrTab {
    fn new() -> Self {
        StrTab {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }

    fn add(&mut self, string: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(string) {
            return offset;
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(string.as_bytes());
        self.data.push(0);
        self.offsets.insert(string.to_owned(), offset);
        offset
    }
}

/// Builder for synthetic ELF shared-object images.
///
/// ```
/// use vndk_testutils::ElfImage;
///
/// let image = ElfImage::new64()
///     .needed("libc.so")
///     .export("foo")
///     .import("malloc")
///     .build();
/// assert_eq!(&image[..4], b"\x7fELF");
/// ```
#[derive(Clone, Debug)]
pub struct ElfImage {
    class64: bool,
    little_endian: bool,
    machine: u16,
    dt_needed: Vec<String>,
    dt_rpath: Vec<String>,
    dt_runpath: Vec<String>,
    exported: Vec<String>,
    imported: Vec<String>,
    dynsym_name: &'static str,
    dynstr_name: &'static str,
    dynamic_name: &'static str,
    zero_shentsize: bool,
}

impl ElfImage {
    fn new(class64: bool) -> Self {
        ElfImage {
            class64,
            little_endian: true,
            machine: 183,
            dt_needed: Vec::new(),
            dt_rpath: Vec::new(),
            dt_runpath: Vec::new(),
            exported: Vec::new(),
            imported: Vec::new(),
            dynsym_name: ".dynsym",
            dynstr_name: ".dynstr",
            dynamic_name: ".dynamic",
            zero_shentsize: false,
        }
    }

    /// Starts a little-endian 32-bit image (machine defaults to EM_AARCH64).
    pub fn new32() -> Self {
        Self::new(false)
    }

    /// Starts a little-endian 64-bit image (machine defaults to EM_AARCH64).
    pub fn new64() -> Self {
        Self::new(true)
    }

    /// Switches the image to big-endian encoding.
    pub fn big_endian(mut self) -> Self {
        self.little_endian = false;
        self
    }

    /// Sets the machine id.
    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// Appends a `DT_NEEDED` entry.
    pub fn needed(mut self, name: &str) -> Self {
        self.dt_needed.push(name.to_owned());
        self
    }

    /// Appends a `DT_RPATH` entry (may contain `:`-separated directories).
    pub fn rpath(mut self, path: &str) -> Self {
        self.dt_rpath.push(path.to_owned());
        self
    }

    /// Appends a `DT_RUNPATH` entry (may contain `:`-separated directories).
    pub fn runpath(mut self, path: &str) -> Self {
        self.dt_runpath.push(path.to_owned());
        self
    }

    /// Adds a defined global symbol to `.dynsym`.
    pub fn export(mut self, name: &str) -> Self {
        self.exported.push(name.to_owned());
        self
    }

    /// Adds an undefined symbol to `.dynsym`.
    pub fn import(mut self, name: &str) -> Self {
        self.imported.push(name.to_owned());
        self
    }

    /// Renames `.dynsym` so a reader looking it up by name will not find it.
    pub fn without_dynsym(mut self) -> Self {
        self.dynsym_name = ".hidden.dynsym";
        self
    }

    /// Renames `.dynstr` so a reader looking it up by name will not find it.
    pub fn without_dynstr(mut self) -> Self {
        self.dynstr_name = ".hidden.dynstr";
        self
    }

    /// Renames `.dynamic` so a reader looking it up by name will not find it.
    pub fn without_dynamic(mut self) -> Self {
        self.dynamic_name = ".hidden.dynamic";
        self
    }

    /// Declares a zero section-header entry size in the file header.
    pub fn zero_shentsize(mut self) -> Self {
        self.zero_shentsize = true;
        self
    }

    fn push_u16(&self, buf: &mut Vec<u8>, value: u16) {
        if self.little_endian {
            buf.extend_from_slice(&value.to_le_bytes());
        } else {
            buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn push_u32(&self, buf: &mut Vec<u8>, value: u32) {
        if self.little_endian {
            buf.extend_from_slice(&value.to_le_bytes());
        } else {
            buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn push_u64(&self, buf: &mut Vec<u8>, value: u64) {
        if self.little_endian {
            buf.extend_from_slice(&value.to_le_bytes());
        } else {
            buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    /// Writes a class-sized address/offset field.
    fn push_word(&self, buf: &mut Vec<u8>, value: u64) {
        if self.class64 {
            self.push_u64(buf, value);
        } else {
            self.push_u32(buf, value as u32);
        }
    }

    fn push_sym(&self, buf: &mut Vec<u8>, name: u32, info: u8, shndx: u16) {
        if self.class64 {
            self.push_u32(buf, name);
            buf.push(info);
            buf.push(0); // st_other
            self.push_u16(buf, shndx);
            self.push_u64(buf, 0); // st_value
            self.push_u64(buf, 0); // st_size
        } else {
            self.push_u32(buf, name);
            self.push_u32(buf, 0); // st_value
            self.push_u32(buf, 0); // st_size
            buf.push(info);
            buf.push(0); // st_other
            self.push_u16(buf, shndx);
        }
    }

    fn push_dyn(&self, buf: &mut Vec<u8>, tag: u64, val: u64) {
        self.push_word(buf, tag);
        self.push_word(buf, val);
    }

    #[allow(clippy::too_many_arguments)]
    fn push_shdr(
        &self,
        buf: &mut Vec<u8>,
        name: u32,
        sh_type: u32,
        offset: u64,
        size: u64,
        link: u32,
        info: u32,
        entsize: u64,
    ) {
        self.push_u32(buf, name);
        self.push_u32(buf, sh_type);
        self.push_word(buf, 0); // sh_flags
        self.push_word(buf, 0); // sh_addr
        self.push_word(buf, offset);
        self.push_word(buf, size);
        self.push_u32(buf, link);
        self.push_u32(buf, info);
        self.push_word(buf, 0); // sh_addralign
        self.push_word(buf, entsize);
    }

    /// Emits the image.
    pub fn build(&self) -> Vec<u8> {
        let ehsize: usize = if self.class64 { 64 } else { 52 };
        let sym_entsize: usize = if self.class64 { 24 } else { 16 };
        let dyn_entsize: usize = if self.class64 { 16 } else { 8 };
        let sh_entsize: usize = if self.class64 { 64 } else { 40 };

        // Build .dynstr and record the offsets the other sections refer to.
        let mut dynstr = StrTab::new();
        let needed_offs: Vec<u32> = self.dt_needed.iter().map(|s| dynstr.add(s)).collect();
        let rpath_offs: Vec<u32> = self.dt_rpath.iter().map(|s| dynstr.add(s)).collect();
        let runpath_offs: Vec<u32> = self.dt_runpath.iter().map(|s| dynstr.add(s)).collect();
        let export_offs: Vec<u32> = self.exported.iter().map(|s| dynstr.add(s)).collect();
        let import_offs: Vec<u32> = self.imported.iter().map(|s| dynstr.add(s)).collect();

        // .dynsym: null entry, then defined globals, then undefined imports.
        let mut dynsym = Vec::new();
        dynsym.resize(sym_entsize, 0);
        for &name in &export_offs {
            self.push_sym(&mut dynsym, name, STB_GLOBAL_STT_FUNC, 1);
        }
        for &name in &import_offs {
            self.push_sym(&mut dynsym, name, STB_GLOBAL_STT_FUNC, 0);
        }

        // .dynamic, terminated by DT_NULL.
        let mut dynamic = Vec::new();
        for &off in &needed_offs {
            self.push_dyn(&mut dynamic, DT_NEEDED, off as u64);
        }
        for &off in &rpath_offs {
            self.push_dyn(&mut dynamic, DT_RPATH, off as u64);
        }
        for &off in &runpath_offs {
            self.push_dyn(&mut dynamic, DT_RUNPATH, off as u64);
        }
        self.push_dyn(&mut dynamic, 0, 0);

        // .shstrtab must be complete before the layout is fixed.
        let mut shstrtab = StrTab::new();
        let dynsym_name = shstrtab.add(self.dynsym_name);
        let dynstr_name = shstrtab.add(self.dynstr_name);
        let dynamic_name = shstrtab.add(self.dynamic_name);
        let shstrtab_name = shstrtab.add(".shstrtab");

        // Sections are laid out back to back; the parser never checks
        // alignment.
        let dynsym_off = ehsize;
        let dynstr_off = dynsym_off + dynsym.len();
        let dynamic_off = dynstr_off + dynstr.data.len();
        let shstrtab_off = dynamic_off + dynamic.len();
        let shoff = shstrtab_off + shstrtab.data.len();

        let mut buf = Vec::new();

        // e_ident
        buf.extend_from_slice(b"\x7fELF");
        buf.push(if self.class64 { 2 } else { 1 });
        buf.push(if self.little_endian { 1 } else { 2 });
        buf.push(1); // EI_VERSION
        buf.resize(16, 0);

        self.push_u16(&mut buf, 3); // e_type: ET_DYN
        self.push_u16(&mut buf, self.machine);
        self.push_u32(&mut buf, 1); // e_version
        self.push_word(&mut buf, 0); // e_entry
        self.push_word(&mut buf, 0); // e_phoff
        self.push_word(&mut buf, shoff as u64);
        self.push_u32(&mut buf, 0); // e_flags
        self.push_u16(&mut buf, ehsize as u16);
        self.push_u16(&mut buf, 0); // e_phentsize
        self.push_u16(&mut buf, 0); // e_phnum
        let declared_shentsize = if self.zero_shentsize { 0 } else { sh_entsize };
        self.push_u16(&mut buf, declared_shentsize as u16);
        self.push_u16(&mut buf, 5); // e_shnum
        self.push_u16(&mut buf, 4); // e_shstrndx
        debug_assert_eq!(buf.len(), ehsize);

        buf.extend_from_slice(&dynsym);
        buf.extend_from_slice(&dynstr.data);
        buf.extend_from_slice(&dynamic);
        buf.extend_from_slice(&shstrtab.data);

        // Section header table: null, .dynsym, .dynstr, .dynamic, .shstrtab.
        buf.resize(buf.len() + sh_entsize, 0);
        self.push_shdr(
            &mut buf,
            dynsym_name,
            SHT_DYNSYM,
            dynsym_off as u64,
            dynsym.len() as u64,
            2,
            1,
            sym_entsize as u64,
        );
        self.push_shdr(
            &mut buf,
            dynstr_name,
            SHT_STRTAB,
            dynstr_off as u64,
            dynstr.data.len() as u64,
            0,
            0,
            0,
        );
        self.push_shdr(
            &mut buf,
            dynamic_name,
            SHT_DYNAMIC,
            dynamic_off as u64,
            dynamic.len() as u64,
            2,
            0,
            dyn_entsize as u64,
        );
        self.push_shdr(
            &mut buf,
            shstrtab_name,
            SHT_STRTAB,
            shstrtab_off as u64,
            shstrtab.data.len() as u64,
            0,
            0,
            0,
        );

        buf
    }
}

/// Writes `bytes` to `root/rel`, creating parent directories.
pub fn write_file<P: AsRef<Path>>(root: P, rel: &str, bytes: &[u8]) -> io::Result<()> {
    let path = root.as_ref().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
