//! Parsing SIC/XE symbolic assembly.
//!
//! Source is processed one line at a time by [parser::parse_line] and collected into a
//! [Program], which holds located [Node]s and the symbol table after the first pass.

pub mod ast;
pub mod parser;
pub mod program;
mod token;

pub use self::ast::{Node, Operand, Value};
pub use self::program::Program;
