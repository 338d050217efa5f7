//! Types for representing instructions, registers and their encodings.
//!
//! This module holds the single opcode table shared by the assembler, the object file tooling
//! and the emulator, together with the bit-level algebra of the format 3 and 4 address field.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;

/// Shape of the operands of a format 2 instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterOperands {
    /// A single register. (`CLEAR A`)
    Register,

    /// A register and a shift count between 1 and 16. (`SHIFTL A,4`)
    RegisterCount,

    /// Two registers. (`ADDR S,A`)
    RegisterPair,

    /// A four-bit number. (`SVC 2`)
    Number,
}

/// Shape of the operands of a format 3 or 4 instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryOperands {
    /// The instruction takes no operand. (`RSUB`)
    None,

    /// A single, possibly indexed memory operand. (`LDA @PTR`, `STCH BUF,X`)
    Address,
}

/// Instruction format family as recorded in the opcode table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    /// One byte, no operands.
    One,

    /// Two bytes, register operands packed in the second byte.
    Two(RegisterOperands),

    /// Three bytes, or four with the extended (`+`) prefix.
    Three(MemoryOperands),
}

impl Format {
    /// Encoded length of an instruction of this format in bytes.
    pub fn len(&self, extended: bool) -> u32 {
        match self {
            Format::One => 1,
            Format::Two(_) => 2,
            Format::Three(_) if extended => 4,
            Format::Three(_) => 3,
        }
    }
}

const F1: Format = Format::One;
const F2R: Format = Format::Two(RegisterOperands::Register);
const F2RN: Format = Format::Two(RegisterOperands::RegisterCount);
const F2RR: Format = Format::Two(RegisterOperands::RegisterPair);
const F2N: Format = Format::Two(RegisterOperands::Number);
const F3: Format = Format::Three(MemoryOperands::None);
const F3M: Format = Format::Three(MemoryOperands::Address);

macro_rules! opcodes {
    ( $( $variant:ident = $byte:literal, $format:expr, $supported:literal; )* ) => {
        /// Instructions of the SIC/XE instruction architecture.
        #[allow(non_camel_case_types)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $( $variant, )*
        }

        impl OpCode {
            /// Every instruction of the architecture in table order.
            pub const ALL: &'static [OpCode] = &[ $( OpCode::$variant, )* ];

            /// The opcode byte with the `ni` bits cleared.
            pub fn as_byte(&self) -> u8 {
                match self {
                    $( OpCode::$variant => $byte, )*
                }
            }

            /// The assembler mnemonic of the instruction.
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( OpCode::$variant => stringify!($variant), )*
                }
            }

            pub fn format(&self) -> Format {
                match self {
                    $( OpCode::$variant => $format, )*
                }
            }

            /// Returns `false` for instructions the emulator rejects with
            /// [NotImplemented](crate::emulator::SimError::NotImplemented).
            pub fn is_supported(&self) -> bool {
                match self {
                    $( OpCode::$variant => $supported, )*
                }
            }
        }
    };
}

opcodes! {
    ADD    = 0x18, F3M, true;
    ADDF   = 0x58, F3M, false;
    ADDR   = 0x90, F2RR, true;
    AND    = 0x40, F3M, true;
    CLEAR  = 0xB4, F2R, true;
    COMP   = 0x28, F3M, true;
    COMPF  = 0x88, F3M, false;
    COMPR  = 0xA0, F2RR, true;
    DIV    = 0x24, F3M, true;
    DIVF   = 0x64, F3M, false;
    DIVR   = 0x9C, F2RR, true;
    FIX    = 0xC4, F1,  false;
    FLOAT  = 0xC0, F1,  false;
    HIO    = 0xF4, F1,  false;
    J      = 0x3C, F3M, true;
    JEQ    = 0x30, F3M, true;
    JGT    = 0x34, F3M, true;
    JLT    = 0x38, F3M, true;
    JSUB   = 0x48, F3M, true;
    LDA    = 0x00, F3M, true;
    LDB    = 0x68, F3M, true;
    LDCH   = 0x50, F3M, true;
    LDF    = 0x70, F3M, true;
    LDL    = 0x08, F3M, true;
    LDS    = 0x6C, F3M, true;
    LDT    = 0x74, F3M, true;
    LDX    = 0x04, F3M, true;
    LPS    = 0xD0, F3M, false;
    MUL    = 0x20, F3M, true;
    MULF   = 0x60, F3M, false;
    MULR   = 0x98, F2RR, true;
    NORM   = 0xC8, F1,  false;
    OR     = 0x44, F3M, true;
    RD     = 0xD8, F3M, true;
    RMO    = 0xAC, F2RR, true;
    RSUB   = 0x4C, F3,  true;
    SHIFTL = 0xA4, F2RN, true;
    SHIFTR = 0xA8, F2RN, true;
    SIO    = 0xF0, F1,  false;
    SSK    = 0xEC, F3M, false;
    STA    = 0x0C, F3M, true;
    STB    = 0x78, F3M, true;
    STCH   = 0x54, F3M, true;
    STF    = 0x80, F3M, true;
    STI    = 0xD4, F3M, false;
    STL    = 0x14, F3M, true;
    STS    = 0x7C, F3M, true;
    STSW   = 0xE8, F3M, true;
    STT    = 0x84, F3M, true;
    STX    = 0x10, F3M, true;
    SUB    = 0x1C, F3M, true;
    SUBF   = 0x5C, F3M, false;
    SUBR   = 0x94, F2RR, true;
    SVC    = 0xB0, F2N, false;
    TD     = 0xE0, F3M, true;
    TIO    = 0xF8, F1,  false;
    TIX    = 0x2C, F3M, true;
    TIXR   = 0xB8, F2R, true;
    WD     = 0xDC, F3M, true;
}

lazy_static! {
    static ref OPCODES_BY_MNEMONIC: HashMap<&'static str, OpCode> = OpCode::ALL
        .iter()
        .map(|op| (op.mnemonic(), *op))
        .collect();

    static ref OPCODES_BY_BYTE: HashMap<u8, OpCode> = OpCode::ALL
        .iter()
        .map(|op| (op.as_byte(), *op))
        .collect();
}

impl OpCode {
    /// Finds the instruction whose opcode byte is exactly `byte`.
    ///
    /// Format 3 and 4 opcodes must have their `ni` bits masked off before the lookup.
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        OPCODES_BY_BYTE.get(&byte).copied()
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<OpCode> {
        OPCODES_BY_MNEMONIC.get(mnemonic).copied()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Assembler directives. These produce no machine instructions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Directive {
    Start,
    End,
    Org,
    Base,
    NoBase,
    Equ,
    Ltorg,

    /// Emits one byte, or a character or hexadecimal literal.
    Byte,

    /// Emits one 24-bit word.
    Word,

    /// Reserves a number of bytes.
    Resb,

    /// Reserves a number of words.
    Resw,
}

impl Directive {
    pub const ALL: &'static [Directive] = &[
        Directive::Start,
        Directive::End,
        Directive::Org,
        Directive::Base,
        Directive::NoBase,
        Directive::Equ,
        Directive::Ltorg,
        Directive::Byte,
        Directive::Word,
        Directive::Resb,
        Directive::Resw,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Directive::Start => "START",
            Directive::End => "END",
            Directive::Org => "ORG",
            Directive::Base => "BASE",
            Directive::NoBase => "NOBASE",
            Directive::Equ => "EQU",
            Directive::Ltorg => "LTORG",
            Directive::Byte => "BYTE",
            Directive::Word => "WORD",
            Directive::Resb => "RESB",
            Directive::Resw => "RESW",
        }
    }

    /// Returns `true` for the directives that define or reserve storage.
    pub fn is_storage(&self) -> bool {
        match self {
            Directive::Byte | Directive::Word | Directive::Resb | Directive::Resw => true,
            _ => false,
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Directive> {
        Directive::ALL.iter().find(|d| d.mnemonic() == mnemonic).copied()
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Anything that can appear in the mnemonic column of a source line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Instruction(OpCode),
    Directive(Directive),
}

impl Mnemonic {
    pub fn parse(word: &str) -> Option<Mnemonic> {
        OpCode::from_mnemonic(word)
            .map(Mnemonic::Instruction)
            .or_else(|| Directive::from_mnemonic(word).map(Mnemonic::Directive))
    }

    /// Returns the known mnemonic closest to `word`, if one is close enough to be a likely typo.
    pub fn suggest(word: &str) -> Option<&'static str> {
        let upper = word.to_uppercase();

        OpCode::ALL
            .iter()
            .map(|op| op.mnemonic())
            .chain(Directive::ALL.iter().map(|d| d.mnemonic()))
            .map(|candidate| (edit_distance::edit_distance(&upper, candidate), candidate))
            .filter(|(distance, _)| *distance <= 2)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mnemonic::Instruction(op) => fmt::Display::fmt(op, f),
            Mnemonic::Directive(dir) => fmt::Display::fmt(dir, f),
        }
    }
}

/// Error returned by [lookup] for mnemonics that are not in the opcode table.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownMnemonic {
    pub mnemonic: String,

    /// The closest known mnemonic, if any.
    pub suggestion: Option<&'static str>,
}

impl fmt::Display for UnknownMnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown mnemonic '{}'", self.mnemonic)?;

        if let Some(suggestion) = self.suggestion {
            write!(f, " (did you mean '{}'?)", suggestion)?;
        }

        Ok(())
    }
}

/// Looks up the opcode byte and format family of an instruction mnemonic.
pub fn lookup(mnemonic: &str) -> Result<(u8, Format), UnknownMnemonic> {
    OpCode::from_mnemonic(mnemonic)
        .map(|op| (op.as_byte(), op.format()))
        .ok_or_else(|| UnknownMnemonic {
            mnemonic: mnemonic.to_string(),
            suggestion: Mnemonic::suggest(mnemonic),
        })
}

/// Registers of the SIC/XE machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    A,
    X,
    L,
    B,
    S,
    T,
    F,
    PC,
    SW,
}

impl Register {
    pub const ALL: [Register; 9] = [
        Register::A,
        Register::X,
        Register::L,
        Register::B,
        Register::S,
        Register::T,
        Register::F,
        Register::PC,
        Register::SW,
    ];

    /// Register number as used in format 2 instructions.
    pub fn index(&self) -> u8 {
        match self {
            Register::A => 0,
            Register::X => 1,
            Register::L => 2,
            Register::B => 3,
            Register::S => 4,
            Register::T => 5,
            Register::F => 6,
            Register::PC => 8,
            Register::SW => 9,
        }
    }

    pub fn from_index(index: u8) -> Option<Register> {
        Register::ALL.iter().find(|r| r.index() == index).copied()
    }

    /// Width of the register in bits.
    pub fn width(&self) -> u32 {
        match self {
            Register::F => 48,
            _ => 24,
        }
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Register, ()> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Register::A),
            "X" => Ok(Register::X),
            "L" => Ok(Register::L),
            "B" => Ok(Register::B),
            "S" => Ok(Register::S),
            "T" => Ok(Register::T),
            "F" => Ok(Register::F),
            "PC" => Ok(Register::PC),
            "SW" => Ok(Register::SW),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Register::A => "A",
            Register::X => "X",
            Register::L => "L",
            Register::B => "B",
            Register::S => "S",
            Register::T => "T",
            Register::F => "F",
            Register::PC => "PC",
            Register::SW => "SW",
        };

        write!(f, "{}", name)
    }
}

/// The `ni` bits of a format 3 or 4 instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressingMode {
    /// `ni = 00`: SIC compatible instruction with a 15-bit address.
    Sic,

    /// `ni = 01`: The target address is the operand. (`#`)
    Immediate,

    /// `ni = 10`: The target address holds the address of the operand. (`@`)
    Indirect,

    /// `ni = 11`: The target address holds the operand.
    Simple,
}

impl AddressingMode {
    pub fn bits(&self) -> u8 {
        match self {
            AddressingMode::Sic => 0b00,
            AddressingMode::Immediate => 0b01,
            AddressingMode::Indirect => 0b10,
            AddressingMode::Simple => 0b11,
        }
    }

    /// Extracts the mode from the low two bits of the first instruction byte.
    pub fn from_bits(byte: u8) -> AddressingMode {
        match byte & 0b11 {
            0b00 => AddressingMode::Sic,
            0b01 => AddressingMode::Immediate,
            0b10 => AddressingMode::Indirect,
            _ => AddressingMode::Simple,
        }
    }

    /// The source prefix selecting this mode.
    pub fn prefix(&self) -> &'static str {
        match self {
            AddressingMode::Immediate => "#",
            AddressingMode::Indirect => "@",
            _ => "",
        }
    }
}

/// How the displacement of a format 3 instruction is turned into the target address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TargetMode {
    /// `bp = 00`
    Direct,

    /// `bp = 01`: signed 12-bit displacement from the program counter.
    PcRelative,

    /// `bp = 10`: unsigned 12-bit displacement from the base register.
    BaseRelative,
}

pub const FLAG_INDEXED: u8 = 0x80;
pub const FLAG_BASE: u8 = 0x40;
pub const FLAG_PC: u8 = 0x20;
pub const FLAG_EXTENDED: u8 = 0x10;

/// Error for the reserved `bp = 11` combination.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InvalidTargetMode;

impl TargetMode {
    /// Decodes the `b` and `p` flags from the second byte of an instruction.
    pub fn from_flags(byte: u8) -> Result<TargetMode, InvalidTargetMode> {
        match (byte & FLAG_BASE != 0, byte & FLAG_PC != 0) {
            (false, false) => Ok(TargetMode::Direct),
            (false, true) => Ok(TargetMode::PcRelative),
            (true, false) => Ok(TargetMode::BaseRelative),
            (true, true) => Err(InvalidTargetMode),
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            TargetMode::Direct => 0,
            TargetMode::PcRelative => FLAG_PC,
            TargetMode::BaseRelative => FLAG_BASE,
        }
    }
}

/// The address part of a format 3 or 4 instruction before packing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddressField {
    pub mode: AddressingMode,
    pub indexed: bool,
    pub target: TargetMode,
    pub extended: bool,

    /// 12-bit displacement for format 3, 20-bit address for format 4.
    /// Only the low bits are packed.
    pub displacement: u32,
}

impl AddressField {
    /// Packs the instruction into 3 or 4 bytes, most significant byte first.
    pub fn encode(&self, opcode: OpCode) -> Vec<u8> {
        let first = opcode.as_byte() | self.mode.bits();

        let mut flags = self.target.flags();

        if self.indexed {
            flags |= FLAG_INDEXED;
        }

        if self.extended {
            let address = self.displacement & 0xF_FFFF;

            vec![
                first,
                flags | FLAG_EXTENDED | (address >> 16) as u8,
                (address >> 8) as u8,
                address as u8,
            ]
        } else {
            let displacement = self.displacement & 0xFFF;

            vec![
                first,
                flags | (displacement >> 8) as u8,
                displacement as u8,
            ]
        }
    }
}

#[test]
fn test_lookup() {
    assert_eq!(lookup("LDA"), Ok((0x00, Format::Three(MemoryOperands::Address))));
    assert_eq!(lookup("COMPR"), Ok((0xA0, Format::Two(RegisterOperands::RegisterPair))));
    assert_eq!(lookup("FIX"), Ok((0xC4, Format::One)));
    assert_eq!(lookup("RSUB"), Ok((0x4C, Format::Three(MemoryOperands::None))));

    let err = lookup("LDAA").unwrap_err();
    assert_eq!(err.suggestion, Some("LDA"));
    assert!(lookup("FOOBARBAZ").unwrap_err().suggestion.is_none());
}

#[test]
fn test_opcode_table_is_unique() {
    assert_eq!(OpCode::ALL.len(), 59);

    for op in OpCode::ALL {
        assert_eq!(OpCode::from_byte(op.as_byte()), Some(*op));
        assert_eq!(OpCode::from_mnemonic(op.mnemonic()), Some(*op));
        assert_eq!(op.as_byte() & 0b11, 0, "{} has ni bits set", op);
    }
}

#[test]
fn test_register_ids() {
    assert_eq!(Register::from_index(8), Some(Register::PC));
    assert_eq!(Register::from_index(7), None);
    assert_eq!("sw".parse(), Ok(Register::SW));
    assert_eq!(Register::F.width(), 48);
}

#[test]
fn test_address_field_packing() {
    let field = AddressField {
        mode: AddressingMode::Simple,
        indexed: true,
        target: TargetMode::PcRelative,
        extended: false,
        displacement: (-3i32) as u32,
    };

    assert_eq!(field.encode(OpCode::STCH), vec![0x57, 0xAF, 0xFD]);

    let field = AddressField {
        mode: AddressingMode::Simple,
        indexed: false,
        target: TargetMode::Direct,
        extended: true,
        displacement: 0x01036,
    };

    assert_eq!(field.encode(OpCode::JSUB), vec![0x4B, 0x10, 0x10, 0x36]);
    assert_eq!(TargetMode::from_flags(0x60), Err(InvalidTargetMode));
}
