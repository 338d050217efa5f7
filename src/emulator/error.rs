use std::fmt;
use std::io;

use crate::instruction::Register;

/// A place that holds a value in the emulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(Register),
    Memory(u32),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Location::Register(register) => write!(f, "register {}", register),
            Location::Memory(address) => write!(f, "address {:06X}", address),
        }
    }
}

/// Failure of a device operation.
#[derive(Debug)]
pub enum DeviceError {
    NotReadable(u8),
    NotWritable(u8),
    Io { device: u8, source: io::Error },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceError::NotReadable(device) => write!(f, "device {:02X} cannot be read from", device),
            DeviceError::NotWritable(device) => write!(f, "device {:02X} cannot be written to", device),
            DeviceError::Io { device, source } => write!(f, "device {:02X}: {}", device, source),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error that aborted the execution of an instruction or the loading of a program.
///
/// The machine state is left as it was before the failing instruction.
#[derive(Debug)]
pub enum SimError {
    /// A format 2 instruction or a command referred to a register id that does not exist.
    InvalidRegister(u8),

    ValueOutOfRange { location: Location, value: i64 },

    /// `length` bytes starting at `address` do not fit in the memory.
    AddressOutOfRange { address: i64, length: u32 },

    DivisionByZero { address: u32 },

    /// The instruction is valid but its execution is not supported.
    NotImplemented(&'static str),

    /// `RSUB` with no active subroutine call while returning to the loader is disabled.
    EmptyCallStack { address: u32 },

    UnknownOpcode { address: u32, byte: u8 },

    /// The `b` and `p` flags are both set, or set on a format 4 instruction.
    InvalidAddressingFormat { address: u32 },

    /// A modification record that refers to a symbol of another program.
    UnsupportedModification(String),

    /// The configured maximum number of steps was executed.
    StepLimit(u64),

    Device(DeviceError),
}

impl From<DeviceError> for SimError {
    fn from(err: DeviceError) -> SimError {
        SimError::Device(err)
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::InvalidRegister(id) => write!(f, "invalid register id {}", id),
            SimError::ValueOutOfRange { location, value } => {
                write!(f, "value {} does not fit in {}", value, location)
            }
            SimError::AddressOutOfRange { address, length: 1 } => {
                write!(f, "address {:X} is out of range", address)
            }
            SimError::AddressOutOfRange { address, length } => write!(
                f,
                "{} bytes at address {:X} are out of range",
                length, address
            ),
            SimError::DivisionByZero { address } => {
                write!(f, "division by zero at {:06X}", address)
            }
            SimError::NotImplemented(mnemonic) => {
                write!(f, "instruction {} is not implemented", mnemonic)
            }
            SimError::EmptyCallStack { address } => {
                write!(f, "RSUB at {:06X} with an empty call stack", address)
            }
            SimError::UnknownOpcode { address, byte } => {
                write!(f, "unknown opcode {:02X} at {:06X}", byte, address)
            }
            SimError::InvalidAddressingFormat { address } => {
                write!(f, "invalid addressing flags in instruction at {:06X}", address)
            }
            SimError::UnsupportedModification(symbol) => write!(
                f,
                "modification record refers to external symbol {}",
                symbol
            ),
            SimError::StepLimit(steps) => write!(f, "step limit of {} reached", steps),
            SimError::Device(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Device(err) => Some(err),
            _ => None,
        }
    }
}
