use std::fs;
use std::path::Path;

use goblin::{elf, Object};

use crate::backends::{take_terminated, ImageReader, ReadError, ReadResult};

/// One section of the image, placed at its virtual address.
#[derive(Debug, Clone)]
struct MappedSection {
    name: String,
    start: u64,
    virtual_size: u64,
    file_offset: u64,
    file_size: u64,
}

impl MappedSection {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr - self.start < self.virtual_size
    }
}

/// PE or ELF image loaded from disk and addressed by virtual address.
///
/// Bytes that a section occupies in memory but not in the file (`.bss`, or
/// the tail of a PE section whose virtual size exceeds its raw size) read as
/// zero.
#[derive(Debug, Clone)]
pub struct ImageFile {
    data: Vec<u8>,
    sections: Vec<MappedSection>,
}

fn collect_sections(bytes: &[u8]) -> ReadResult<Vec<MappedSection>> {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => Ok(elf
            .section_headers
            .iter()
            .filter(|sh| sh.sh_flags & u64::from(elf::section_header::SHF_ALLOC) != 0)
            .filter(|sh| sh.sh_size > 0)
            .map(|sh| MappedSection {
                name: elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("").to_string(),
                start: sh.sh_addr,
                virtual_size: sh.sh_size,
                file_offset: sh.sh_offset,
                file_size: if sh.sh_type == elf::section_header::SHT_NOBITS {
                    0
                } else {
                    sh.sh_size
                },
            })
            .collect()),
        Ok(Object::PE(pe)) => {
            let image_base = pe.image_base as u64;
            Ok(pe
                .sections
                .iter()
                .map(|sec| {
                    let raw = u64::from(sec.size_of_raw_data);
                    let virtual_size =
                        if sec.virtual_size == 0 { raw } else { u64::from(sec.virtual_size) };
                    MappedSection {
                        name: sec.name().unwrap_or_default().to_string(),
                        start: image_base + u64::from(sec.virtual_address),
                        virtual_size,
                        file_offset: u64::from(sec.pointer_to_raw_data),
                        file_size: raw.min(virtual_size),
                    }
                })
                .filter(|sec| sec.virtual_size > 0)
                .collect())
        }
        Ok(_) => Err(ReadError::Parse("only PE and ELF images are supported".into())),
        Err(err) => Err(ReadError::Parse(err.to_string())),
    }
}

impl ImageFile {
    /// Read and parse an image file.
    pub fn open(path: &Path) -> ReadResult<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Parse an image already held in memory.
    pub fn from_bytes(data: Vec<u8>) -> ReadResult<Self> {
        let sections = collect_sections(&data)?;
        tracing::debug!(sections = sections.len(), "Mapped image sections");
        Ok(Self { data, sections })
    }

    /// Names of the mapped sections, in header order.
    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    fn section_for(&self, addr: u64) -> ReadResult<&MappedSection> {
        self.sections.iter().find(|s| s.contains(addr)).ok_or(ReadError::Unmapped { addr })
    }

    /// Materialize `len` bytes of `section` starting `offset` bytes in.
    fn view(&self, section: &MappedSection, offset: u64, len: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len as usize);
        for i in offset..offset + len {
            let byte = if i < section.file_size {
                usize::try_from(section.file_offset + i)
                    .ok()
                    .and_then(|pos| self.data.get(pos).copied())
                    .unwrap_or(0)
            } else {
                0
            };
            out.push(byte);
        }
        out
    }

    /// Read a null-terminated run starting `offset` bytes into `section`.
    ///
    /// The terminator is searched for in the file bytes directly; at most a
    /// few zero bytes past the file data are appended.
    fn read_terminated(
        &self,
        section: &MappedSection,
        offset: u64,
        addr: u64,
        wide: bool,
    ) -> ReadResult<Vec<u8>> {
        let in_file: &[u8] = if offset < section.file_size {
            let start = usize::try_from(section.file_offset + offset).unwrap_or(usize::MAX);
            let end = usize::try_from(section.file_offset + section.file_size)
                .unwrap_or(usize::MAX)
                .min(self.data.len());
            self.data.get(start..end).unwrap_or(&[])
        } else {
            &[]
        };
        if let Ok(found) = take_terminated(in_file, addr, wide) {
            return Ok(found);
        }

        let consumed = offset + in_file.len() as u64;
        let zeros = section.virtual_size.saturating_sub(consumed).min(4) as usize;
        let mut padded = Vec::with_capacity(in_file.len() + zeros);
        padded.extend_from_slice(in_file);
        padded.resize(in_file.len() + zeros, 0);
        take_terminated(&padded, addr, wide)
    }
}

impl ImageReader for ImageFile {
    fn read(&self, addr: u64, size: Option<u64>, wide: bool) -> ReadResult<Vec<u8>> {
        let section = self.section_for(addr)?;
        let offset = addr - section.start;
        let available = section.virtual_size - offset;
        match size {
            Some(size) if size > available => Err(ReadError::OutOfRange { addr, size }),
            Some(size) => Ok(self.view(section, offset, size)),
            None => self.read_terminated(section, offset, addr, wide),
        }
    }
}
