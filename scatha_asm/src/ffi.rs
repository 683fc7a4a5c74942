//! FFI declaration list encoding (spec §6 "Binary format" / "Foreign-function
//! bridging"), grounded on `examples/original_source/include/svm/Program.h`'s
//! `FFIType`/`FFIDecl`/`FFILibDecl` and its decl-format grammar comment.
//!
//! The VM resolves a foreign call to an actual native function; this crate
//! only describes the shape hosts register against (name, signature,
//! `(slot, index)`), never attempting dynamic loading — spec.md directs
//! that bridging stays with the VM.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfiType {
    Void,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Pointer,
    Struct(Vec<FfiType>),
}

impl FfiType {
    fn kind_byte(&self) -> u8 {
        match self {
            FfiType::Void => 0,
            FfiType::Int8 => 1,
            FfiType::Int16 => 2,
            FfiType::Int32 => 3,
            FfiType::Int64 => 4,
            FfiType::Float => 5,
            FfiType::Double => 6,
            FfiType::Pointer => 7,
            FfiType::Struct(_) => 8,
        }
    }

    pub fn is_trivial(&self) -> bool {
        !matches!(self, FfiType::Struct(_))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.kind_byte());
        if let FfiType::Struct(elems) = self {
            out.extend_from_slice(&(elems.len() as u16).to_le_bytes());
            for e in elems {
                e.encode(out);
            }
        }
    }

    fn decode(bytes: &[u8], at: &mut usize) -> Result<Self, FfiError> {
        let kind = *bytes.get(*at).ok_or(FfiError::Truncated)?;
        *at += 1;
        let ty = match kind {
            0 => FfiType::Void,
            1 => FfiType::Int8,
            2 => FfiType::Int16,
            3 => FfiType::Int32,
            4 => FfiType::Int64,
            5 => FfiType::Float,
            6 => FfiType::Double,
            7 => FfiType::Pointer,
            8 => {
                let n = u16::from_le_bytes(bytes.get(*at..*at + 2).ok_or(FfiError::Truncated)?.try_into().unwrap());
                *at += 2;
                let mut elems = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    elems.push(Self::decode(bytes, at)?);
                }
                FfiType::Struct(elems)
            }
            other => return Err(FfiError::UnknownTypeKind(other)),
        };
        Ok(ty)
    }
}

/// One foreign function's declared signature and its `(slot, index)`
/// address within the host's FFI table (spec §6 `call-ext slot, index`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfiFunctionDecl {
    pub name: String,
    pub argument_types: Vec<FfiType>,
    pub return_type: FfiType,
    pub index: u32,
}

impl FfiFunctionDecl {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_cstr(&self.name, out);
        out.push(self.argument_types.len() as u8);
        for arg in &self.argument_types {
            arg.encode(out);
        }
        self.return_type.encode(out);
        out.extend_from_slice(&self.index.to_le_bytes());
    }

    fn decode(bytes: &[u8], at: &mut usize) -> Result<Self, FfiError> {
        let name = decode_cstr(bytes, at)?;
        let argc = *bytes.get(*at).ok_or(FfiError::Truncated)?;
        *at += 1;
        let mut argument_types = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            argument_types.push(FfiType::decode(bytes, at)?);
        }
        let return_type = FfiType::decode(bytes, at)?;
        let index = u32::from_le_bytes(bytes.get(*at..*at + 4).ok_or(FfiError::Truncated)?.try_into().unwrap());
        *at += 4;
        Ok(Self { name, argument_types, return_type, index })
    }
}

/// One foreign library's declarations, addressed by its slot index into the
/// `library-list` (spec §6 `call-ext slot, index, reg-offset`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FfiLibraryDecl {
    pub name: String,
    pub functions: Vec<FfiFunctionDecl>,
}

impl FfiLibraryDecl {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_cstr(&self.name, out);
        out.extend_from_slice(&(self.functions.len() as u32).to_le_bytes());
        for f in &self.functions {
            f.encode(out);
        }
    }

    fn decode(bytes: &[u8], at: &mut usize) -> Result<Self, FfiError> {
        let name = decode_cstr(bytes, at)?;
        let count = u32::from_le_bytes(bytes.get(*at..*at + 4).ok_or(FfiError::Truncated)?.try_into().unwrap());
        *at += 4;
        let mut functions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            functions.push(FfiFunctionDecl::decode(bytes, at)?);
        }
        Ok(Self { name, functions })
    }
}

/// Encodes the whole `library-list`: `u32` library count followed by each
/// library's declaration (spec §6).
pub fn encode_ffi_decls(libs: &[FfiLibraryDecl]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(libs.len() as u32).to_le_bytes());
    for lib in libs {
        lib.encode(&mut out);
    }
    out
}

pub fn decode_ffi_decls(bytes: &[u8]) -> Result<Vec<FfiLibraryDecl>, FfiError> {
    let mut at = 0usize;
    let count = u32::from_le_bytes(bytes.get(at..at + 4).ok_or(FfiError::Truncated)?.try_into().unwrap());
    at += 4;
    let mut libs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        libs.push(FfiLibraryDecl::decode(bytes, &mut at)?);
    }
    Ok(libs)
}

fn encode_cstr(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn decode_cstr(bytes: &[u8], at: &mut usize) -> Result<String, FfiError> {
    let start = *at;
    let nul = bytes[start..].iter().position(|&b| b == 0).ok_or(FfiError::UnterminatedString)?;
    let s = std::str::from_utf8(&bytes[start..start + nul]).map_err(|_| FfiError::InvalidUtf8)?.to_owned();
    *at = start + nul + 1;
    Ok(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FfiError {
    #[error("truncated FFI declaration list")]
    Truncated,
    #[error("unterminated string in FFI declaration list")]
    UnterminatedString,
    #[error("invalid UTF-8 in FFI declaration list")]
    InvalidUtf8,
    #[error("unknown FFI type kind byte {0}")]
    UnknownTypeKind(u8),
}

impl fmt::Display for FfiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfiType::Struct(elems) => {
                write!(f, "struct{{")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "}}")
            }
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_library_with_a_struct_argument() {
        let libs = vec![FfiLibraryDecl {
            name: "libm".into(),
            functions: vec![FfiFunctionDecl {
                name: "hypot".into(),
                argument_types: vec![FfiType::Double, FfiType::Struct(vec![FfiType::Int32, FfiType::Int32])],
                return_type: FfiType::Double,
                index: 3,
            }],
        }];
        let bytes = encode_ffi_decls(&libs);
        let back = decode_ffi_decls(&bytes).unwrap();
        assert_eq!(libs, back);
    }

    #[test]
    fn empty_library_list_round_trips() {
        let bytes = encode_ffi_decls(&[]);
        assert_eq!(decode_ffi_decls(&bytes).unwrap(), Vec::new());
    }

    #[test]
    fn trivial_types_report_is_trivial_true() {
        assert!(FfiType::Int32.is_trivial());
        assert!(!FfiType::Struct(vec![]).is_trivial());
    }
}
