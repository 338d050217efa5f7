use std::fmt;

use super::error::{Location, SimError};
use crate::instruction::Register;
use crate::word;

/// Result of the latest comparison, kept in bits 7..6 of the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCode {
    Less,
    Equal,
    Greater,
}

const CONDITION_MASK: u64 = 0xC0;

impl ConditionCode {
    pub fn bits(&self) -> u64 {
        match self {
            ConditionCode::Less => 0x00,
            ConditionCode::Equal => 0x40,
            ConditionCode::Greater => 0x80,
        }
    }

    /// Returns `None` for the unused pattern `11`.
    pub fn from_bits(sw: u64) -> Option<ConditionCode> {
        match sw & CONDITION_MASK {
            0x00 => Some(ConditionCode::Less),
            0x40 => Some(ConditionCode::Equal),
            0x80 => Some(ConditionCode::Greater),
            _ => None,
        }
    }

    pub fn from_ordering(ordering: std::cmp::Ordering) -> ConditionCode {
        match ordering {
            std::cmp::Ordering::Less => ConditionCode::Less,
            std::cmp::Ordering::Equal => ConditionCode::Equal,
            std::cmp::Ordering::Greater => ConditionCode::Greater,
        }
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConditionCode::Less => write!(f, "LT"),
            ConditionCode::Equal => write!(f, "EQ"),
            ConditionCode::Greater => write!(f, "GT"),
        }
    }
}

fn mask(register: Register) -> u64 {
    (1u64 << register.width()) - 1
}

/// The register file of the processor.
///
/// Values are stored truncated to the width of the register and read back sign-extended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    registers: [u64; 10],
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Returns the value of the register as a signed number.
    pub fn get(&self, register: Register) -> i64 {
        word::sign_extend(self.get_unsigned(register), register.width())
    }

    /// Returns the raw bits of the register.
    pub fn get_unsigned(&self, register: Register) -> u64 {
        self.registers[register.index() as usize]
    }

    /// Writes a register. Values outside of the signed and unsigned range of the register are
    /// rejected and leave the register unchanged.
    pub fn set(&mut self, register: Register, value: i64) -> Result<(), SimError> {
        let fits = match register {
            Register::F => word::is_double_word(value),
            _ => word::is_word(value),
        };

        if !fits {
            return Err(SimError::ValueOutOfRange {
                location: Location::Register(register),
                value,
            });
        }

        self.set_wrapping(register, value);

        Ok(())
    }

    /// Writes the low bits of `value` that fit in the register.
    pub fn set_wrapping(&mut self, register: Register, value: i64) {
        self.registers[register.index() as usize] = value as u64 & mask(register);
    }

    /// Returns the value `value` would have after being written to `register`.
    pub fn wrap(register: Register, value: i64) -> i64 {
        word::sign_extend(value as u64 & mask(register), register.width())
    }

    pub fn pc(&self) -> u32 {
        self.get_unsigned(Register::PC) as u32
    }

    pub fn set_pc(&mut self, address: u32) {
        self.set_wrapping(Register::PC, address as i64);
    }

    pub fn condition_code(&self) -> Option<ConditionCode> {
        ConditionCode::from_bits(self.get_unsigned(Register::SW))
    }

    pub fn set_condition_code(&mut self, cc: ConditionCode) {
        let sw = self.get_unsigned(Register::SW) & !CONDITION_MASK | cc.bits();
        self.set_wrapping(Register::SW, sw as i64);
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for register in Register::ALL.iter() {
            let digits = register.width() as usize / 4;

            write!(
                f,
                "{:>2}: {:0width$X} ({})",
                register.to_string(),
                self.get_unsigned(*register),
                self.get(*register),
                width = digits,
            )?;

            if *register == Register::SW {
                if let Some(cc) = self.condition_code() {
                    write!(f, " CC={}", cc)?;
                }
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

#[test]
fn test_register_width() {
    let mut context = Context::new();

    assert!(context.set(Register::A, 1 << 24).is_err());
    assert_eq!(context.get(Register::A), 0);

    context.set(Register::A, (1 << 24) - 1).unwrap();
    assert_eq!(context.get(Register::A), -1);
    assert_eq!(context.get_unsigned(Register::A), 0xFF_FFFF);

    context.set(Register::A, -(1 << 23)).unwrap();
    assert!(context.set(Register::A, -(1 << 23) - 1).is_err());

    context.set(Register::F, (1 << 48) - 1).unwrap();
    assert_eq!(context.get(Register::F), -1);
    context.set(Register::F, 1 << 40).unwrap();
    assert_eq!(context.get(Register::F), 1 << 40);
    assert!(context.set(Register::F, 1 << 48).is_err());
}

#[test]
fn test_condition_code() {
    let mut context = Context::new();
    context.set(Register::SW, 0x123).unwrap();

    context.set_condition_code(ConditionCode::Greater);
    assert_eq!(context.get_unsigned(Register::SW), 0x1A3);
    assert_eq!(context.condition_code(), Some(ConditionCode::Greater));

    context.set_condition_code(ConditionCode::Equal);
    assert_eq!(context.condition_code(), Some(ConditionCode::Equal));
}
