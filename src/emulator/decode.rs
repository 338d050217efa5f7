//! Decoding machine code into instructions.

use std::fmt;

use super::error::SimError;
use super::memory::Memory;
use crate::instruction::{
    AddressingMode, Format, MemoryOperands, OpCode, Register, RegisterOperands, TargetMode,
    FLAG_EXTENDED, FLAG_INDEXED,
};
use crate::word;

/// Operands of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// Format 1 and `RSUB`.
    None,

    /// The two register nibbles of a format 2 instruction.
    Registers(u8, u8),

    /// Format 3, format 4 and SIC instructions.
    Memory {
        mode: AddressingMode,
        indexed: bool,
        target: TargetMode,
        extended: bool,

        /// 12-bit displacement, 15-bit SIC address or 20-bit format 4 address.
        displacement: u32,
    },
}

/// An instruction decoded from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the first byte.
    pub address: u32,
    pub opcode: OpCode,
    pub length: u32,
    pub operands: Operands,
}

impl Instruction {
    /// The address of the following instruction.
    pub fn next(&self) -> u32 {
        self.address + self.length
    }

    /// The first register nibble as a register.
    pub fn r1(&self) -> Result<Register, SimError> {
        match self.operands {
            Operands::Registers(r1, _) => Register::from_index(r1).ok_or(SimError::InvalidRegister(r1)),
            _ => Err(SimError::InvalidRegister(0)),
        }
    }

    /// The second register nibble as a register.
    pub fn r2(&self) -> Result<Register, SimError> {
        match self.operands {
            Operands::Registers(_, r2) => Register::from_index(r2).ok_or(SimError::InvalidRegister(r2)),
            _ => Err(SimError::InvalidRegister(0)),
        }
    }
}

/// Decodes the instruction at `address`.
///
/// The first byte is tried as a format 1 opcode, then as a format 2 opcode and finally, with
/// the addressing mode bits masked off, as a format 3 or 4 opcode.
pub fn decode(memory: &Memory, address: u32) -> Result<Instruction, SimError> {
    let first = memory.get_byte(address)?;

    let exact = OpCode::from_byte(first);

    if let Some(opcode) = exact.filter(|op| op.format() == Format::One) {
        return Ok(Instruction {
            address,
            opcode,
            length: 1,
            operands: Operands::None,
        });
    }

    if let Some(opcode) = exact.filter(|op| matches!(op.format(), Format::Two(_))) {
        let registers = memory.get_byte(address + 1)?;

        return Ok(Instruction {
            address,
            opcode,
            length: 2,
            operands: Operands::Registers(registers >> 4, registers & 0x0F),
        });
    }

    let opcode = OpCode::from_byte(first & 0xFC)
        .filter(|op| matches!(op.format(), Format::Three(_)))
        .ok_or(SimError::UnknownOpcode { address, byte: first })?;

    let bytes = memory.read(address, 3)?;
    let flags = bytes[1];
    let mode = AddressingMode::from_bits(first);
    let indexed = flags & FLAG_INDEXED != 0;

    if mode == AddressingMode::Sic {
        let displacement = (flags as u32 & 0x7F) << 8 | bytes[2] as u32;

        return Ok(Instruction {
            address,
            opcode,
            length: 3,
            operands: Operands::Memory {
                mode,
                indexed,
                target: TargetMode::Direct,
                extended: false,
                displacement,
            },
        });
    }

    let target =
        TargetMode::from_flags(flags).map_err(|_| SimError::InvalidAddressingFormat { address })?;
    let extended = flags & FLAG_EXTENDED != 0;

    let (length, displacement) = if extended {
        if target != TargetMode::Direct {
            return Err(SimError::InvalidAddressingFormat { address });
        }

        let bytes = memory.read(address, 4)?;
        let displacement =
            (flags as u32 & 0x0F) << 16 | (bytes[2] as u32) << 8 | bytes[3] as u32;

        (4, displacement)
    } else {
        (3, (flags as u32 & 0x0F) << 8 | bytes[2] as u32)
    };

    Ok(Instruction {
        address,
        opcode,
        length,
        operands: Operands::Memory {
            mode,
            indexed,
            target,
            extended,
            displacement,
        },
    })
}

fn register_name(id: u8) -> String {
    match Register::from_index(id) {
        Some(register) => register.to_string(),
        None => format!("?{}", id),
    }
}

/// Disassembly. Addresses are printed in hexadecimal, relative addresses with the register
/// they are relative to.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.opcode.format(), self.operands) {
            (Format::Two(shape), Operands::Registers(r1, r2)) => {
                write!(f, "{} ", self.opcode)?;

                match shape {
                    RegisterOperands::Register => write!(f, "{}", register_name(r1)),
                    RegisterOperands::RegisterPair => {
                        write!(f, "{},{}", register_name(r1), register_name(r2))
                    }
                    RegisterOperands::RegisterCount => {
                        write!(f, "{},{}", register_name(r1), r2 + 1)
                    }
                    RegisterOperands::Number => write!(f, "{}", r1),
                }
            }
            (Format::Three(MemoryOperands::None), Operands::Memory { extended, .. }) => {
                if extended {
                    write!(f, "+")?;
                }

                write!(f, "{}", self.opcode)
            }
            (_, Operands::Memory { mode, indexed, target, extended, displacement }) => {
                if extended {
                    write!(f, "+")?;
                }

                write!(f, "{} {}", self.opcode, mode.prefix())?;

                match target {
                    TargetMode::Direct => write!(f, "0x{:X}", displacement)?,
                    TargetMode::PcRelative => {
                        let displacement = word::sign_extend(displacement as u64, 12);

                        if displacement < 0 {
                            write!(f, "-0x{:X}(PC)", -displacement)?;
                        } else {
                            write!(f, "0x{:X}(PC)", displacement)?;
                        }
                    }
                    TargetMode::BaseRelative => write!(f, "0x{:X}(B)", displacement)?,
                }

                if indexed {
                    write!(f, ",X")?;
                }

                Ok(())
            }
            _ => write!(f, "{}", self.opcode),
        }
    }
}

#[cfg(test)]
fn memory_with(address: u32, bytes: &[u8]) -> Memory {
    let mut memory = Memory::new();
    memory.write(address, bytes).unwrap();
    memory
}

#[test]
fn test_decode_formats() {
    let memory = memory_with(0, &[0xC4, 0xA0, 0x04, 0x03, 0xA0, 0x03, 0x4B, 0x10, 0x10, 0x36]);

    let fix = decode(&memory, 0).unwrap();
    assert_eq!((fix.opcode, fix.length), (OpCode::FIX, 1));

    let compr = decode(&memory, 1).unwrap();
    assert_eq!(compr.opcode, OpCode::COMPR);
    assert_eq!(compr.to_string(), "COMPR A,S");

    let lda = decode(&memory, 3).unwrap();
    assert_eq!(lda.opcode, OpCode::LDA);
    assert_eq!(
        lda.operands,
        Operands::Memory {
            mode: AddressingMode::Simple,
            indexed: true,
            target: TargetMode::PcRelative,
            extended: false,
            displacement: 3,
        }
    );
    assert_eq!(lda.to_string(), "LDA 0x3(PC),X");

    let jsub = decode(&memory, 6).unwrap();
    assert_eq!((jsub.opcode, jsub.length), (OpCode::JSUB, 4));
    assert_eq!(jsub.to_string(), "+JSUB 0x1036");
}

#[test]
fn test_decode_sic_and_errors() {
    // ni = 00 with the high bit of the address field used as the index flag.
    let memory = memory_with(0, &[0x00, 0xFF, 0xFF]);
    let lda = decode(&memory, 0).unwrap();
    assert!(matches!(
        lda.operands,
        Operands::Memory { mode: AddressingMode::Sic, indexed: true, displacement: 0x7FFF, .. }
    ));

    let memory = memory_with(0, &[0x03, 0x60, 0x00]);
    assert!(matches!(decode(&memory, 0), Err(SimError::InvalidAddressingFormat { address: 0 })));

    let memory = memory_with(0, &[0x03, 0x30, 0x00, 0x00]);
    assert!(matches!(decode(&memory, 0), Err(SimError::InvalidAddressingFormat { .. })));

    let memory = memory_with(0x10, &[0xFF, 0x00, 0x00]);
    assert!(matches!(decode(&memory, 0x10), Err(SimError::UnknownOpcode { address: 0x10, byte: 0xFF })));

    let memory = memory_with(0, &[0x4F, 0x00, 0x00]);
    assert_eq!(decode(&memory, 0).unwrap().to_string(), "RSUB");
}
