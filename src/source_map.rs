//! Assembly listings: the mapping between memory locations and source lines.

use std::fmt;

use itertools::Itertools;

use crate::compiler::CompileTarget;
use crate::object::{Header, Modification};
use crate::symbolic::Node;

/// One line of an assembly listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub line: usize,
    pub location: u32,
    pub bytes: Vec<u8>,
    pub source: String,
}

/// Wraps a compilation target and records, for each source line, the location and the bytes
/// it assembled to.
#[derive(Debug, Clone)]
pub struct SourceMap<T> {
    compiled: T,
    entries: Vec<ListingEntry>,
}

impl<T> SourceMap<T> {
    /// Returns the source line which defined the byte at the given memory location.
    pub fn get_source_line(&self, addr: u32) -> Option<&ListingEntry> {
        self.entries
            .iter()
            .find(|entry| addr >= entry.location && addr < entry.location + entry.bytes.len() as u32)
    }

    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    pub fn into_inner(self) -> T {
        self.compiled
    }
}

impl<T: CompileTarget> CompileTarget for SourceMap<T> {
    fn create(header: Header) -> Self {
        SourceMap {
            compiled: T::create(header),
            entries: Vec::new(),
        }
    }

    fn push_node(&mut self, node: &Node, bytes: &[u8]) {
        self.compiled.push_node(node, bytes);

        self.entries.push(ListingEntry {
            line: node.line,
            location: node.location,
            bytes: bytes.to_vec(),
            source: node.source.clone(),
        });
    }

    fn push_modification(&mut self, modification: Modification) {
        self.compiled.push_modification(modification);
    }

    fn finish(self, entry: u32) -> Self {
        SourceMap {
            compiled: self.compiled.finish(entry),
            entries: self.entries,
        }
    }
}

/// Prints the listing as `line location bytes source`, one source line per row.
impl<T> fmt::Display for SourceMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            let bytes = entry.bytes.iter().map(|byte| format!("{:02X}", byte)).join("");

            writeln!(
                f,
                "{:>4}  {:06X}  {:<8}  {}",
                entry.line, entry.location, bytes, entry.source
            )?;
        }

        Ok(())
    }
}

#[test]
fn test_listing() {
    let source = "PROG START 1000\n  LDA #5\n  BYTE X'0A0B'\n  END PROG\n";

    let program = crate::symbolic::Program::parse(source).unwrap();
    let listing = program.compile_with_listing().unwrap();

    assert_eq!(listing.entries().len(), 4);
    assert_eq!(listing.get_source_line(0x1002).map(|e| e.line), Some(2));
    assert_eq!(listing.get_source_line(0x1004).map(|e| e.source.as_str()), Some("  BYTE X'0A0B'"));
    assert_eq!(listing.get_source_line(0x1005), None);

    let text = listing.to_string();
    assert!(text.contains("   2  001000  010005    "));
    assert_eq!(listing.into_inner().entry, 0x1000);
}
