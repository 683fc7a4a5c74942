//! The program header and whole-binary layout: `ProgramHeader`
//! (`versionString`/`size`/`startAddress`/`dataOffset`/`textOffset`/
//! `FFIDeclOffset`), six `u64`-sized quantities (16-byte version word pair,
//! then four 8-byte fields) — 56 bytes total, per spec §6's header table
//! summed field-by-field (the table's own "fixed 48 bytes" summary
//! undercounts its own fields by one `u64`; see `DESIGN.md`'s `scatha_asm`
//! entry for the field-by-field total).
pub const HEADER_SIZE: usize = 56;

/// `Program.h`'s `GlobalProgID`: every version word pair must start with
/// this value to be recognized as a Scatha binary.
pub const MAGIC: u64 = 0x5CBF;

/// Current format version, stored as the version word pair's second `u64`.
pub const VERSION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub total_size: u64,
    pub start_address: u64,
    pub data_offset: u64,
    pub text_offset: u64,
    pub ffi_decl_offset: u64,
}

impl ProgramHeader {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out.extend_from_slice(&self.start_address.to_le_bytes());
        out.extend_from_slice(&self.data_offset.to_le_bytes());
        out.extend_from_slice(&self.text_offset.to_le_bytes());
        out.extend_from_slice(&self.ffi_decl_offset.to_le_bytes());
    }

    pub fn read_from(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated { have: bytes.len(), need: HEADER_SIZE });
        }
        let read_u64 = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().expect("checked length"));
        let magic = read_u64(0);
        if magic != MAGIC {
            return Err(HeaderError::BadMagic { found: magic });
        }
        Ok(Self {
            total_size: read_u64(16),
            start_address: read_u64(24),
            data_offset: read_u64(32),
            text_offset: read_u64(40),
            ffi_decl_offset: read_u64(48),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("truncated program header: have {have} bytes, need {need}")]
    Truncated { have: usize, need: usize },
    #[error("bad magic number: found {found:#x}, expected {MAGIC:#x}")]
    BadMagic { found: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_through_bytes() {
        let header = ProgramHeader { total_size: 256, start_address: 56, data_offset: 56, text_offset: 88, ffi_decl_offset: 200 };
        let mut bytes = Vec::new();
        header.write_to(&mut bytes);
        assert_eq!(bytes.len(), HEADER_SIZE);
        let back = ProgramHeader::read_from(&bytes).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0] = 0xAB;
        assert!(matches!(ProgramHeader::read_from(&bytes), Err(HeaderError::BadMagic { .. })));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(ProgramHeader::read_from(&[0u8; 10]), Err(HeaderError::Truncated { .. })));
    }
}
