//! Debug-info producer (spec §4.9, §6 "Debug-info JSON"): a JSON-equivalent
//! document pairing a source-file list, a byte-offset → (file, line,
//! column) map, and a function-name → (begin, end) range list, indexed by
//! disassembled instruction order. Grounded on
//! `examples/original_source/src/scathadb/Model/` and `Model/SourceDebugInfo.h`'s
//! offset-to-source mapping, encoded with `serde_json` the way
//! `seen_ir/src/simple_codegen.rs` builds up its output incrementally —
//! here by pushing tuples as instructions and functions are emitted.

use serde::{Deserialize, Serialize};

/// One instruction's source-location entry: `(file index, byte offset,
/// line, column)`.
pub type SourceMapEntry = (u32, u64, u32, u32);

/// `(function name, begin offset, end offset)` in the text section.
pub type FunctionRange = (String, u64, u64);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub files: Vec<String>,
    pub sourcemap: Vec<SourceMapEntry>,
    pub functions: Vec<FunctionRange>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `path` into `files`, returning its index (existing entries
    /// are reused rather than duplicated).
    pub fn intern_file(&mut self, path: impl Into<String>) -> u32 {
        let path = path.into();
        if let Some(i) = self.files.iter().position(|f| f == &path) {
            return i as u32;
        }
        self.files.push(path);
        (self.files.len() - 1) as u32
    }

    pub fn record_instruction(&mut self, file: u32, offset: u64, line: u32, column: u32) {
        self.sourcemap.push((file, offset, line, column));
    }

    pub fn record_function(&mut self, name: impl Into<String>, begin: u64, end: u64) {
        self.functions.push((name.into(), begin, end));
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_file_twice_reuses_its_index() {
        let mut info = DebugInfo::new();
        let a = info.intern_file("main.sn");
        let b = info.intern_file("main.sn");
        assert_eq!(a, b);
        assert_eq!(info.files.len(), 1);
    }

    #[test]
    fn round_trips_through_json() {
        let mut info = DebugInfo::new();
        let f = info.intern_file("main.sn");
        info.record_instruction(f, 56, 3, 5);
        info.record_function("main", 56, 120);

        let json = info.to_json().unwrap();
        assert!(json.contains("main.sn"));
        let back = DebugInfo::from_json(&json).unwrap();
        assert_eq!(info, back);
    }
}
