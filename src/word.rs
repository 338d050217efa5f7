//! Conversions between integers and the 8, 24 and 48-bit two's complement representations
//! used by the machine and the object file format.

use std::fmt;

/// Smallest value accepted for a 24-bit word.
pub const WORD_MIN: i64 = -(1 << 23);

/// Largest value accepted for a 24-bit word. Values above `2^23 - 1` are
/// accepted as unsigned bit patterns.
pub const WORD_MAX: i64 = (1 << 24) - 1;

pub const WORD_MASK: u32 = 0xFF_FFFF;

pub const DOUBLE_WORD_MIN: i64 = -(1 << 47);
pub const DOUBLE_WORD_MAX: i64 = (1 << 48) - 1;
pub const DOUBLE_WORD_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Size of the machine memory in bytes.
pub const MEMORY_SIZE: u32 = 1 << 20;

#[derive(Clone, Debug, PartialEq)]
pub enum CodecError {
    /// The text contains characters that are not hexadecimal digits.
    InvalidDigits(String),

    /// The text has the wrong number of hexadecimal digits.
    WrongWidth {
        expected: usize,
        got: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::InvalidDigits(text) => write!(f, "'{}' is not a hexadecimal number", text),
            CodecError::WrongWidth { expected, got } => {
                write!(f, "expected {} hexadecimal digits, got {}", expected, got)
            }
        }
    }
}

pub fn is_byte(value: i64) -> bool {
    value >= -128 && value <= 255
}

pub fn is_word(value: i64) -> bool {
    value >= WORD_MIN && value <= WORD_MAX
}

pub fn is_double_word(value: i64) -> bool {
    value >= DOUBLE_WORD_MIN && value <= DOUBLE_WORD_MAX
}

pub fn is_address(value: i64) -> bool {
    value >= 0 && value < MEMORY_SIZE as i64
}

/// Interprets the low `bits` bits of `value` as a two's complement number.
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Formats `value` as six uppercase hexadecimal digits in two's complement.
pub fn encode_word(value: i64) -> String {
    format!("{:06X}", value as u64 & WORD_MASK as u64)
}

/// Formats `value` as two uppercase hexadecimal digits in two's complement.
pub fn encode_byte(value: i64) -> String {
    format!("{:02X}", value as u64 & 0xFF)
}

fn decode_hex(text: &str, width: usize) -> Result<u64, CodecError> {
    if text.len() != width {
        return Err(CodecError::WrongWidth {
            expected: width,
            got: text.len(),
        });
    }

    if !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidDigits(text.to_string()));
    }

    u64::from_str_radix(text, 16).map_err(|_| CodecError::InvalidDigits(text.to_string()))
}

/// Parses six hexadecimal digits as a signed 24-bit word.
pub fn decode_word(text: &str) -> Result<i32, CodecError> {
    Ok(sign_extend(decode_hex(text, 6)?, 24) as i32)
}

/// Parses two hexadecimal digits as a byte.
pub fn decode_byte(text: &str) -> Result<u8, CodecError> {
    Ok(decode_hex(text, 2)? as u8)
}

/// Splits a word into its three big-endian bytes.
pub fn word_to_bytes(value: i64) -> [u8; 3] {
    let raw = value as u64 & WORD_MASK as u64;
    [(raw >> 16) as u8, (raw >> 8) as u8, raw as u8]
}

pub fn bytes_to_word(bytes: [u8; 3]) -> i32 {
    let raw = (bytes[0] as u64) << 16 | (bytes[1] as u64) << 8 | bytes[2] as u64;
    sign_extend(raw, 24) as i32
}

#[test]
fn test_encode_word() {
    assert_eq!(encode_word(8), "000008");
    assert_eq!(encode_word(-1), "FFFFFF");
    assert_eq!(encode_word(-(1 << 23)), "800000");
    assert_eq!(encode_byte(-2), "FE");
    assert_eq!(encode_byte(0x4F), "4F");
}

#[test]
fn test_word_round_trip() {
    let samples = [WORD_MIN, WORD_MIN + 1, -4096, -1, 0, 1, 2047, 0x12345, (1 << 23) - 1];

    for value in samples.iter() {
        assert_eq!(decode_word(&encode_word(*value)), Ok(*value as i32));
    }

    for value in (WORD_MIN..(1 << 23)).step_by(4099) {
        assert_eq!(decode_word(&encode_word(value)), Ok(value as i32));
    }
}

#[test]
fn test_decode_errors() {
    assert_eq!(decode_word("12345"), Err(CodecError::WrongWidth { expected: 6, got: 5 }));
    assert_eq!(decode_word("12345G"), Err(CodecError::InvalidDigits("12345G".into())));
    assert_eq!(decode_byte("ff"), Ok(0xFF));
}

#[test]
fn test_widths() {
    assert!(is_word(WORD_MAX));
    assert!(!is_word(WORD_MAX + 1));
    assert!(is_word(WORD_MIN));
    assert!(!is_word(WORD_MIN - 1));
    assert!(is_double_word(1 << 47));
    assert!(!is_double_word(1 << 48));
    assert_eq!(bytes_to_word(word_to_bytes(-5)), -5);
}
