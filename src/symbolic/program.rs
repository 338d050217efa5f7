//! The parse pass: assigns locations to source lines and builds the symbol table.

use slog::{debug, o, trace, warn, Discard, Logger};

use crate::error::{AsmError, AsmErrorKind};
use crate::instruction::{Directive, Mnemonic};
use crate::object;
use crate::source_map::SourceMap;
use crate::symbol_table::{Symbol, SymbolTable};
use crate::word::MEMORY_SIZE;

use super::ast::{Node, Operand, Value};
use super::parser::{self, Statement};

/// A parsed assembly program whose symbol references are not resolved yet.
#[derive(Debug, Clone)]
pub struct Program {
    /// Program name from `START`, at most 6 characters.
    pub name: String,

    /// Load address from `START`.
    pub start: u32,

    /// Highest location reached minus the start address.
    pub length: u32,

    /// Operand of `END`, if one was given.
    pub entry: Option<Value>,

    /// Location of the first machine instruction.
    pub first_instruction: Option<u32>,

    pub nodes: Vec<Node>,
    pub symbol_table: SymbolTable,
}

struct State {
    location: u32,
    highest: u32,
    base: Option<Value>,
}

impl Program {
    /// Parses assembly source.
    pub fn parse(source: &str) -> Result<Program, AsmError> {
        Program::parse_with_logger(source, None)
    }

    pub fn parse_with_logger<L>(source: &str, logger: L) -> Result<Program, AsmError>
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger
            .into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("stage" => "parse"));

        let mut program = Program {
            name: String::new(),
            start: 0,
            length: 0,
            entry: None,
            first_instruction: None,
            nodes: Vec::new(),
            symbol_table: SymbolTable::new(),
        };

        let mut state = State {
            location: 0,
            highest: 0,
            base: None,
        };

        for (index, text) in source.lines().enumerate() {
            let line = index + 1;

            let statement = match parser::parse_line(text) {
                Ok(Some(statement)) => statement,
                Ok(None) => continue,
                Err(kind) => return Err(AsmError::new(line, text, kind)),
            };

            let is_end = statement.mnemonic == Mnemonic::Directive(Directive::End);

            program
                .push_statement(&mut state, line, text, statement, &logger)
                .map_err(|kind| AsmError::new(line, text, kind))?;

            if is_end {
                debug!(logger, "end of program"; "line" => line);
                break;
            }
        }

        program.length = state.highest - program.start;

        debug!(logger, "parsed program";
            "name" => &program.name,
            "start" => format!("{:06X}", program.start),
            "length" => format!("{:06X}", program.length),
            "nodes" => program.nodes.len());

        Ok(program)
    }

    /// Looks up a value that must be known during the parse pass.
    fn constant(&self, value: &Value) -> Result<Symbol, AsmErrorKind> {
        match value {
            Value::Symbol(name) => self
                .symbol_table
                .resolve(name)
                .ok_or_else(|| AsmErrorKind::ForwardReference(name.clone())),
            other => other
                .resolved()
                .ok_or_else(|| AsmErrorKind::UndefinedSymbol(other.to_string())),
        }
    }

    fn define(&mut self, line: usize, label: &str, symbol: Symbol) -> Result<(), AsmErrorKind> {
        self.symbol_table
            .define(line, label, symbol)
            .map_err(|err| AsmErrorKind::DuplicateLabel {
                label: label.to_string(),
                previous_line: err.previous_line,
            })
    }

    fn push_statement(
        &mut self,
        state: &mut State,
        line: usize,
        text: &str,
        statement: Statement,
        logger: &Logger,
    ) -> Result<(), AsmErrorKind> {
        let Statement {
            label,
            mnemonic,
            extended,
            operand,
        } = statement;

        if let Operand::Start { name, address } = &operand {
            if !self.nodes.is_empty() {
                return Err(AsmErrorKind::MisplacedStart);
            }

            self.name = name.clone().unwrap_or_default();
            self.start = *address;
            state.location = *address;
            state.highest = *address;

            debug!(logger, "program start"; "name" => &self.name, "address" => format!("{:06X}", address));
        }

        let length = match (mnemonic, &operand) {
            (Mnemonic::Instruction(op), _) => op.format().len(extended),
            (Mnemonic::Directive(Directive::Byte), Operand::Bytes(bytes)) => bytes.len() as u32,
            (Mnemonic::Directive(Directive::Byte), _) => 1,
            (Mnemonic::Directive(Directive::Word), _) => 3,
            (Mnemonic::Directive(dir @ Directive::Resb), Operand::Value(count))
            | (Mnemonic::Directive(dir @ Directive::Resw), Operand::Value(count)) => {
                let count = self.constant(count)?.value as i64;
                let unit = if dir == Directive::Resw { 3 } else { 1 };

                if count < 0 || count * unit > MEMORY_SIZE as i64 {
                    return Err(AsmErrorKind::ValueOutOfRange { value: count, bits: 20 });
                }

                (count * unit) as u32
            }
            (Mnemonic::Directive(_), _) => 0,
        };

        match (mnemonic, label) {
            (Mnemonic::Directive(Directive::Equ), None) => return Err(AsmErrorKind::EquWithoutLabel),
            (Mnemonic::Directive(Directive::Equ), Some(label)) => match &operand {
                Operand::Here => self.define(line, label, Symbol::relative(state.location as i32))?,
                Operand::Value(Value::Symbol(target)) => match self.symbol_table.resolve(target) {
                    Some(symbol) => self.define(line, label, symbol)?,
                    None => self
                        .symbol_table
                        .define_alias(line, label, target)
                        .map_err(|err| AsmErrorKind::DuplicateLabel {
                            label: label.to_string(),
                            previous_line: err.previous_line,
                        })?,
                },
                Operand::Value(value) => {
                    let symbol = self.constant(value)?;
                    self.define(line, label, Symbol::absolute(symbol.value))?
                }
                _ => return Err(AsmErrorKind::MissingOperand("a value")),
            },
            (_, Some(label)) => self.define(line, label, Symbol::relative(state.location as i32))?,
            (_, None) => (),
        }

        let node = Node {
            line,
            source: text.trim_end().to_string(),
            label: label.map(str::to_string),
            mnemonic,
            extended,
            operand,
            location: state.location,
            length,
            base: state.base.clone(),
        };

        trace!(logger, "node";
            "line" => line,
            "location" => format!("{:06X}", node.location),
            "mnemonic" => %node.mnemonic,
            "length" => length);

        match (mnemonic, &node.operand) {
            (Mnemonic::Instruction(_), _) => {
                if self.first_instruction.is_none() {
                    self.first_instruction = Some(node.location);
                }
            }
            (Mnemonic::Directive(Directive::Base), Operand::Value(value)) => {
                state.base = Some(value.clone());
            }
            (Mnemonic::Directive(Directive::NoBase), _) => state.base = None,
            (Mnemonic::Directive(Directive::Ltorg), _) => {
                warn!(logger, "literal pools are not supported, LTORG ignored"; "line" => line);
            }
            (Mnemonic::Directive(Directive::End), Operand::Value(value)) => {
                self.entry = Some(value.clone());
            }
            _ => (),
        }

        let next = match (mnemonic, &node.operand) {
            (Mnemonic::Directive(Directive::Org), Operand::Value(value)) => {
                self.constant(value)?.value as i64
            }
            _ => node.location as i64 + node.length as i64,
        };

        if next < 0 || next > MEMORY_SIZE as i64 {
            return Err(AsmErrorKind::AddressOutOfRange {
                mnemonic: mnemonic.to_string(),
                target: next,
            });
        }

        state.location = next as u32;
        state.highest = state.highest.max(state.location);

        self.nodes.push(node);

        Ok(())
    }

    /// Resolves symbols and produces the object program.
    pub fn compile(self) -> Result<object::Program, AsmError> {
        crate::compiler::compile(self)
    }

    /// Like [Program::compile], but keeps the listing of the assembled program.
    pub fn compile_with_listing(self) -> Result<SourceMap<object::Program>, AsmError> {
        crate::compiler::compile(self)
    }
}

#[test]
fn test_locations() {
    let program = Program::parse(
        r#"
COPY    START   1000
FIRST   STL     RETADR
        +JSUB   RDREC
        CLEAR   X
BUF     RESB    4096
RETADR  RESW    1
LEN     EQU     *
        RSUB
RDREC   BYTE    C'EOF'
        END     FIRST
"#,
    )
    .unwrap();

    assert_eq!(program.name, "COPY");
    assert_eq!(program.start, 0x1000);

    let table = &program.symbol_table;
    assert_eq!(table.resolve("FIRST"), Some(Symbol::relative(0x1000)));
    assert_eq!(table.resolve("BUF"), Some(Symbol::relative(0x1009)));
    assert_eq!(table.resolve("RETADR"), Some(Symbol::relative(0x2009)));
    assert_eq!(table.resolve("LEN"), Some(Symbol::relative(0x200C)));
    assert_eq!(table.resolve("RDREC"), Some(Symbol::relative(0x200F)));

    assert_eq!(program.length, 0x1012);
    assert_eq!(program.first_instruction, Some(0x1000));
    assert_eq!(program.entry, Some(Value::Symbol("FIRST".into())));
}

#[test]
fn test_equ() {
    let program = Program::parse(
        r#"
MAXLEN  EQU     4096
ALIAS   EQU     LATER
LATER   EQU     MAXLEN
        LDA     #MAXLEN
"#,
    )
    .unwrap();

    assert_eq!(program.symbol_table.resolve("MAXLEN"), Some(Symbol::absolute(4096)));
    assert_eq!(program.symbol_table.resolve("LATER"), Some(Symbol::absolute(4096)));
    assert_eq!(program.symbol_table.resolve("ALIAS"), None);
    assert_eq!(program.length, 3);

    let err = Program::parse("  EQU 5").unwrap_err();
    assert_eq!(err.kind, AsmErrorKind::EquWithoutLabel);
}

#[test]
fn test_parse_errors_have_lines() {
    let err = Program::parse("A LDA #1\nA LDA #2\n").unwrap_err();

    assert_eq!(err.line, 2);
    assert_eq!(err.source, "A LDA #2");
    assert_eq!(
        err.kind,
        AsmErrorKind::DuplicateLabel { label: "A".into(), previous_line: 1 },
    );

    let err = Program::parse("  LDA #1\n  START 1000\n").unwrap_err();
    assert_eq!(err.kind, AsmErrorKind::MisplacedStart);

    let err = Program::parse("  RESW COUNT\nCOUNT EQU 3\n").unwrap_err();
    assert_eq!(err.kind, AsmErrorKind::ForwardReference("COUNT".into()));
}

#[test]
fn test_org() {
    let program = Program::parse(
        r#"
        START   0
TABLE   RESW    10
        ORG     TABLE
FIELD1  RESW    1
FIELD2  RESB    2
        ORG     TABLE+0
"#,
    );

    // `TABLE+0` is not an expression.
    assert!(program.is_err());

    let program = Program::parse(
        r#"
        START   0
TABLE   RESW    10
        ORG     TABLE
FIELD1  RESW    1
FIELD2  RESB    2
"#,
    )
    .unwrap();

    assert_eq!(program.symbol_table.resolve("FIELD2"), Some(Symbol::relative(3)));
    assert_eq!(program.length, 30);
}
