use std::fmt;

use super::error::{Location, SimError};
use crate::word::{self, MEMORY_SIZE};

/// The byte addressed main memory of the machine.
///
/// Every access is bounds checked as a whole: a word that would extend past the last byte fails
/// without touching the bytes that do fit.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Memory {
        Memory::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let used = self.bytes.iter().filter(|byte| **byte != 0).count();
        write!(f, "Memory {{ size: {}, non_zero: {} }}", self.bytes.len(), used)
    }
}

impl Memory {
    pub fn new() -> Memory {
        Memory {
            bytes: vec![0; MEMORY_SIZE as usize],
        }
    }

    fn range(&self, address: u32, length: u32) -> Result<std::ops::Range<usize>, SimError> {
        let start = address as usize;
        let end = start + length as usize;

        if end > self.bytes.len() {
            return Err(SimError::AddressOutOfRange {
                address: address as i64,
                length,
            });
        }

        Ok(start..end)
    }

    pub fn read(&self, address: u32, length: u32) -> Result<&[u8], SimError> {
        let range = self.range(address, length)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), SimError> {
        let range = self.range(address, data.len() as u32)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn get_byte(&self, address: u32) -> Result<u8, SimError> {
        Ok(self.read(address, 1)?[0])
    }

    pub fn set_byte(&mut self, address: u32, value: u8) -> Result<(), SimError> {
        self.write(address, &[value])
    }

    /// Reads the 24-bit word at `address`, sign-extended.
    pub fn get_word(&self, address: u32) -> Result<i32, SimError> {
        let bytes = self.read(address, 3)?;
        Ok(word::bytes_to_word([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn set_word(&mut self, address: u32, value: i64) -> Result<(), SimError> {
        if !word::is_word(value) {
            return Err(SimError::ValueOutOfRange {
                location: Location::Memory(address),
                value,
            });
        }

        self.write(address, &word::word_to_bytes(value))
    }

    /// Reads the 48-bit value at `address`, sign-extended.
    pub fn get_double(&self, address: u32) -> Result<i64, SimError> {
        let raw = self
            .read(address, 6)?
            .iter()
            .fold(0u64, |acc, byte| acc << 8 | *byte as u64);

        Ok(word::sign_extend(raw, 48))
    }

    pub fn set_double(&mut self, address: u32, value: i64) -> Result<(), SimError> {
        if !word::is_double_word(value) {
            return Err(SimError::ValueOutOfRange {
                location: Location::Memory(address),
                value,
            });
        }

        let raw = value as u64 & word::DOUBLE_WORD_MASK;
        let mut bytes = [0u8; 6];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (raw >> (8 * (5 - i))) as u8;
        }

        self.write(address, &bytes)
    }
}

#[test]
fn test_word_access() {
    let mut memory = Memory::new();

    memory.set_word(0x100, -1).unwrap();
    assert_eq!(memory.read(0x100, 3).unwrap(), &[0xFF, 0xFF, 0xFF]);
    assert_eq!(memory.get_word(0x100).unwrap(), -1);

    memory.set_word(0x103, 0xFF_FFFF).unwrap();
    assert_eq!(memory.get_word(0x103).unwrap(), -1);

    assert!(matches!(
        memory.set_word(0x100, 1 << 24),
        Err(SimError::ValueOutOfRange { location: Location::Memory(0x100), .. })
    ));

    memory.set_double(0x200, -2).unwrap();
    assert_eq!(memory.get_double(0x200).unwrap(), -2);
    assert_eq!(memory.get_byte(0x205).unwrap(), 0xFE);
}

#[test]
fn test_bounds() {
    let mut memory = Memory::new();
    let last = MEMORY_SIZE - 1;

    memory.set_byte(last, 0xAB).unwrap();
    assert_eq!(memory.get_byte(last).unwrap(), 0xAB);

    // The word would straddle the end of memory.
    assert!(matches!(
        memory.set_word(last - 1, 0x123456),
        Err(SimError::AddressOutOfRange { length: 3, .. })
    ));
    assert_eq!(memory.get_byte(last - 1).unwrap(), 0);
    assert_eq!(memory.get_byte(last).unwrap(), 0xAB);

    assert!(memory.get_byte(MEMORY_SIZE).is_err());
    assert!(memory.get_word(u32::max_value()).is_err());
}
