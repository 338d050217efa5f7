//! Reading and writing SIC/XE object files.
//!
//! An object file is a sequence of ASCII records, one per line:
//!
//! ```text
//! HPROG  00100000000F      header: name, start address, length
//! T0010000C0100051900...   text: start address, byte count, bytes
//! M00100105+PROG           modification: address, half-byte count, optional symbol
//! E001000                  end: first instruction to execute
//! ```

mod parser;
mod program;

pub use self::parser::{ErrorKind, ParseError};
pub use self::program::{Header, Modification, Program, Record, Sign, Text, MAX_TEXT_LENGTH};
