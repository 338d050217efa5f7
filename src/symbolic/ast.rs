//! Instruction nodes and their encoding into machine code.

use std::fmt;

use crate::error::AsmErrorKind;
use crate::instruction::{
    AddressField, AddressingMode, Directive, Format, Mnemonic, OpCode, Register, TargetMode,
};
use crate::object::Modification;
use crate::symbol_table::{Symbol, SymbolTable};
use crate::word;

/// A numeric operand or a reference to a symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A numeric literal. Literals are absolute.
    Number(i32),

    /// A reference that has not been resolved yet.
    Symbol(String),

    /// A reference after symbol resolution.
    Resolved {
        name: String,
        symbol: Symbol,
    },
}

impl Value {
    /// Returns the value if it is known.
    pub fn resolved(&self) -> Option<Symbol> {
        match self {
            Value::Number(num) => Some(Symbol::absolute(*num)),
            Value::Symbol(_) => None,
            Value::Resolved { symbol, .. } => Some(*symbol),
        }
    }

    /// Substitutes the value of a symbol reference from the symbol table.
    pub fn resolve(&mut self, table: &SymbolTable) -> Result<(), AsmErrorKind> {
        if let Value::Symbol(name) = self {
            let symbol = table
                .resolve(name)
                .ok_or_else(|| AsmErrorKind::UndefinedSymbol(name.clone()))?;

            let name = std::mem::take(name);
            *self = Value::Resolved { name, symbol };
        }

        Ok(())
    }

    fn require(&self) -> Result<Symbol, AsmErrorKind> {
        self.resolved()
            .ok_or_else(|| AsmErrorKind::UndefinedSymbol(self.to_string()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Number(num) => write!(f, "{}", num),
            Value::Symbol(name) | Value::Resolved { name, .. } => write!(f, "{}", name),
        }
    }
}

/// Operand of a source line, shaped by the mnemonic's format family.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Register(Register),
    RegisterCount(Register, u8),
    RegisterPair(Register, Register),

    /// Four-bit immediate of `SVC`.
    Number(u8),

    Memory {
        mode: AddressingMode,
        value: Value,
        indexed: bool,
    },

    /// Operand of `WORD`, a scalar `BYTE`, `EQU`, `ORG`, `BASE`, `END`, `RESB` and `RESW`.
    Value(Value),

    /// Contents of a `BYTE C'..'` or `BYTE X'..'`.
    Bytes(Vec<u8>),

    /// `START [name] [address]`
    Start {
        name: Option<String>,
        address: u32,
    },

    /// `EQU *`
    Here,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Register(r) => write!(f, "{}", r),
            Operand::RegisterCount(r, n) => write!(f, "{},{}", r, n),
            Operand::RegisterPair(r1, r2) => write!(f, "{},{}", r1, r2),
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Memory { mode, value, indexed } => {
                write!(f, "{}{}", mode.prefix(), value)?;

                if *indexed {
                    write!(f, ",X")?;
                }

                Ok(())
            }
            Operand::Value(value) => write!(f, "{}", value),
            Operand::Bytes(bytes) => {
                write!(f, "X'")?;

                for byte in bytes {
                    write!(f, "{:02X}", byte)?;
                }

                write!(f, "'")
            }
            Operand::Start { name, address } => {
                if let Some(name) = name {
                    write!(f, "{} ", name)?;
                }

                write!(f, "{:X}", address)
            }
            Operand::Here => write!(f, "*"),
        }
    }
}

/// One source line after the parse pass.
///
/// The length of a node is fixed when it is created. Only symbol references are filled in later.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// 1-based line number.
    pub line: usize,
    pub source: String,
    pub label: Option<String>,
    pub mnemonic: Mnemonic,

    /// `true` if the mnemonic had the `+` prefix.
    pub extended: bool,
    pub operand: Operand,

    /// Address of the first byte of the node.
    pub location: u32,
    pub length: u32,

    /// Operand of the `BASE` directive in effect, `None` after `NOBASE`.
    pub base: Option<Value>,
}

impl Node {
    /// Returns the instruction format, or `None` for directives.
    pub fn format(&self) -> Option<Format> {
        match self.mnemonic {
            Mnemonic::Instruction(op) => Some(op.format()),
            Mnemonic::Directive(_) => None,
        }
    }

    /// Resolves all symbol references of the node.
    pub fn resolve(&mut self, table: &SymbolTable) -> Result<(), AsmErrorKind> {
        match &mut self.operand {
            Operand::Memory { value, .. } | Operand::Value(value) => value.resolve(table)?,
            _ => (),
        }

        if let Some(base) = &mut self.base {
            base.resolve(table)?;
        }

        Ok(())
    }

    /// Encodes the node into machine code. Directives and reservations produce no bytes.
    pub fn encode(&self) -> Result<Vec<u8>, AsmErrorKind> {
        let op = match self.mnemonic {
            Mnemonic::Directive(directive) => return self.encode_directive(directive),
            Mnemonic::Instruction(op) => op,
        };

        let code = op.as_byte();

        match &self.operand {
            Operand::None if op.format() == Format::One => Ok(vec![code]),
            Operand::None => Ok(AddressField {
                mode: AddressingMode::Simple,
                indexed: false,
                target: TargetMode::Direct,
                extended: self.extended,
                displacement: 0,
            }
            .encode(op)),
            Operand::Register(r) => Ok(vec![code, r.index() << 4]),
            Operand::RegisterPair(r1, r2) => Ok(vec![code, r1.index() << 4 | r2.index()]),
            Operand::RegisterCount(r, n) => Ok(vec![code, r.index() << 4 | (n - 1)]),
            Operand::Number(n) => Ok(vec![code, n << 4]),
            Operand::Memory { mode, value, indexed } => {
                self.encode_memory(op, *mode, value, *indexed)
            }
            _ => Err(AsmErrorKind::MissingOperand("an instruction operand")),
        }
    }

    fn encode_directive(&self, directive: Directive) -> Result<Vec<u8>, AsmErrorKind> {
        match (directive, &self.operand) {
            (Directive::Byte, Operand::Bytes(bytes)) => Ok(bytes.clone()),
            (Directive::Byte, Operand::Value(value)) => {
                let value = value.require()?.value as i64;

                if !word::is_byte(value) {
                    return Err(AsmErrorKind::ValueOutOfRange { value, bits: 8 });
                }

                Ok(vec![value as u8])
            }
            (Directive::Word, Operand::Value(value)) => {
                let value = value.require()?.value as i64;

                if !word::is_word(value) {
                    return Err(AsmErrorKind::ValueOutOfRange { value, bits: 24 });
                }

                Ok(word::word_to_bytes(value).to_vec())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn encode_memory(
        &self,
        op: OpCode,
        mode: AddressingMode,
        value: &Value,
        indexed: bool,
    ) -> Result<Vec<u8>, AsmErrorKind> {
        let symbol = value.require()?;
        let target = symbol.value as i64;

        let out_of_range = || {
            if mode == AddressingMode::Immediate && symbol.absolute {
                AsmErrorKind::ValueOutOfRange {
                    value: target,
                    bits: if self.extended { 20 } else { 12 },
                }
            } else {
                AsmErrorKind::AddressOutOfRange {
                    mnemonic: op.mnemonic().to_string(),
                    target,
                }
            }
        };

        let (target_mode, displacement) = if self.extended {
            if target < 0 || target > 0xF_FFFF {
                return Err(out_of_range());
            }

            (TargetMode::Direct, target)
        } else if symbol.absolute {
            if target < 0 || target > 0xFFF {
                return Err(out_of_range());
            }

            (TargetMode::Direct, target)
        } else {
            let pc_displacement = target - (self.location + self.length) as i64;

            if pc_displacement >= -2048 && pc_displacement <= 2047 {
                (TargetMode::PcRelative, pc_displacement)
            } else {
                let base = match &self.base {
                    Some(base) => base.require()?.value as i64,
                    None => return Err(out_of_range()),
                };

                let base_displacement = target - base;

                if base_displacement < 0 || base_displacement > 0xFFF {
                    return Err(out_of_range());
                }

                (TargetMode::BaseRelative, base_displacement)
            }
        };

        Ok(AddressField {
            mode,
            indexed,
            target: target_mode,
            extended: self.extended,
            displacement: displacement as u32,
        }
        .encode(op))
    }

    /// Returns the modification record needed to relocate this node, if any.
    ///
    /// Extended instructions and words that hold a relative address must be patched when the
    /// program is loaded somewhere else than its start address.
    pub fn modification(&self) -> Option<Modification> {
        let (value, address, half_bytes) = match (&self.mnemonic, &self.operand) {
            (Mnemonic::Instruction(_), Operand::Memory { value, .. }) if self.extended => {
                (value, self.location + 1, 5)
            }
            (Mnemonic::Directive(Directive::Word), Operand::Value(value)) => (value, self.location, 6),
            _ => return None,
        };

        match value.resolved() {
            Some(symbol) if !symbol.absolute => Some(Modification {
                address,
                half_bytes,
                symbol: None,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
fn node(mnemonic: &str, extended: bool, operand: Operand, location: u32) -> Node {
    let mnemonic = Mnemonic::parse(mnemonic).unwrap();
    let length = match mnemonic {
        Mnemonic::Instruction(op) => op.format().len(extended),
        Mnemonic::Directive(Directive::Word) => 3,
        Mnemonic::Directive(_) => 0,
    };

    Node {
        line: 1,
        source: String::new(),
        label: None,
        mnemonic,
        extended,
        operand,
        location,
        length,
        base: None,
    }
}

#[cfg(test)]
fn memory(mode: AddressingMode, value: i32, absolute: bool) -> Operand {
    Operand::Memory {
        mode,
        value: Value::Resolved {
            name: "SYM".into(),
            symbol: Symbol { value, absolute },
        },
        indexed: false,
    }
}

#[test]
fn test_encode_immediate_and_simple() {
    let lda = node("LDA", false, Operand::Memory {
        mode: AddressingMode::Immediate,
        value: Value::Number(5),
        indexed: false,
    }, 0x1000);
    assert_eq!(lda.encode(), Ok(vec![0x01, 0x00, 0x05]));

    let sta = node("STA", false, memory(AddressingMode::Simple, 0x100C, false), 0x1006);
    assert_eq!(sta.encode(), Ok(vec![0x0F, 0x20, 0x03]));

    let rsub = node("RSUB", false, Operand::None, 0x1009);
    assert_eq!(rsub.encode(), Ok(vec![0x4F, 0x00, 0x00]));
}

#[test]
fn test_encode_pc_relative_boundary() {
    // 2047 bytes past the next instruction.
    let j = node("J", false, memory(AddressingMode::Simple, 3 + 2047, false), 0);
    assert_eq!(j.encode(), Ok(vec![0x3F, 0x27, 0xFF]));

    let j = node("J", false, memory(AddressingMode::Simple, 3 + 2048, false), 0);
    assert!(matches!(j.encode(), Err(AsmErrorKind::AddressOutOfRange { .. })));

    let mut j = node("J", false, memory(AddressingMode::Simple, 3 + 2048, false), 0);
    j.base = Some(Value::Number(2048));
    assert_eq!(j.encode(), Ok(vec![0x3F, 0x40, 0x03]));

    // Backwards.
    let j = node("J", false, memory(AddressingMode::Simple, 0, false), 0x800 - 3);
    assert_eq!(j.encode(), Ok(vec![0x3F, 0x28, 0x00]));
}

#[test]
fn test_encode_extended_and_registers() {
    let jsub = node("JSUB", true, memory(AddressingMode::Simple, 0x1036, false), 0x1000);
    assert_eq!(jsub.encode(), Ok(vec![0x4B, 0x10, 0x10, 0x36]));
    assert_eq!(
        jsub.modification(),
        Some(Modification { address: 0x1001, half_bytes: 5, symbol: None }),
    );

    let ldt = node("LDT", true, memory(AddressingMode::Immediate, 4096, true), 0);
    assert_eq!(ldt.encode(), Ok(vec![0x75, 0x10, 0x10, 0x00]));
    assert_eq!(ldt.modification(), None);

    let compr = node("COMPR", false, Operand::RegisterPair(Register::A, Register::S), 0);
    assert_eq!(compr.encode(), Ok(vec![0xA0, 0x04]));

    let shift = node("SHIFTL", false, Operand::RegisterCount(Register::T, 4), 0);
    assert_eq!(shift.encode(), Ok(vec![0xA4, 0x53]));

    let clear = node("CLEAR", false, Operand::Register(Register::X), 0);
    assert_eq!(clear.encode(), Ok(vec![0xB4, 0x10]));
}

#[test]
fn test_encode_data() {
    let word = node("WORD", false, Operand::Value(Value::Number(-1)), 0);
    assert_eq!(word.encode(), Ok(vec![0xFF, 0xFF, 0xFF]));

    let word = node("WORD", false, Operand::Value(Value::Number(1 << 24)), 0);
    assert_eq!(word.encode(), Err(AsmErrorKind::ValueOutOfRange { value: 1 << 24, bits: 24 }));

    let immediate = node("LDA", false, memory(AddressingMode::Immediate, 4096, true), 0);
    assert_eq!(immediate.encode(), Err(AsmErrorKind::ValueOutOfRange { value: 4096, bits: 12 }));
}
