//! Error types shared by the assembler and the object file reader.

use std::fmt::{self, Display};

use itertools::Itertools;
use nom::error::ErrorKind;

use crate::instruction::UnknownMnemonic;

/// Reason an assembly run was aborted.
#[derive(Clone, Debug, PartialEq)]
pub enum AsmErrorKind {
    UnknownMnemonic(UnknownMnemonic),

    /// The label was already defined on `previous_line`.
    DuplicateLabel {
        label: String,
        previous_line: usize,
    },

    EquWithoutLabel,

    /// Program names are limited to six characters.
    NameTooLong(String),

    MalformedLiteral(String),

    UndefinedSymbol(String),

    /// The target of a memory operand can not be reached with any addressing mode
    /// available to the instruction.
    AddressOutOfRange {
        mnemonic: String,
        target: i64,
    },

    /// A data value does not fit in the storage reserved for it.
    ValueOutOfRange {
        value: i64,
        bits: u32,
    },

    /// The `+` prefix was used on an instruction that is not format 3.
    ExtendedNotAllowed(String),

    InvalidRegister(String),

    UnexpectedToken {
        found: String,
        expected: &'static str,
    },

    MissingOperand(&'static str),

    /// The symbol must be defined before the line that uses it.
    ForwardReference(String),

    MisplacedStart,
}

impl Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AsmErrorKind::UnknownMnemonic(err) => Display::fmt(err, f),
            AsmErrorKind::DuplicateLabel { label, previous_line } => {
                write!(f, "label '{}' already defined on line {}", label, previous_line)
            }
            AsmErrorKind::EquWithoutLabel => write!(f, "EQU requires a label"),
            AsmErrorKind::NameTooLong(name) => {
                write!(f, "program name '{}' is longer than 6 characters", name)
            }
            AsmErrorKind::MalformedLiteral(lit) => write!(f, "malformed literal '{}'", lit),
            AsmErrorKind::UndefinedSymbol(sym) => write!(f, "undefined symbol '{}'", sym),
            AsmErrorKind::AddressOutOfRange { mnemonic, target } => write!(
                f,
                "target address 0x{:X} of {} is out of range for every addressing mode",
                target, mnemonic
            ),
            AsmErrorKind::ValueOutOfRange { value, bits } => {
                write!(f, "value {} does not fit in {} bits", value, bits)
            }
            AsmErrorKind::ExtendedNotAllowed(mnemonic) => {
                write!(f, "{} can not be used in extended format", mnemonic)
            }
            AsmErrorKind::InvalidRegister(name) => write!(f, "invalid register '{}'", name),
            AsmErrorKind::UnexpectedToken { found, expected } => {
                write!(f, "expected {}, found '{}'", expected, found)
            }
            AsmErrorKind::MissingOperand(expected) => write!(f, "missing operand: expected {}", expected),
            AsmErrorKind::ForwardReference(sym) => {
                write!(f, "symbol '{}' must be defined before it is used here", sym)
            }
            AsmErrorKind::MisplacedStart => write!(f, "START must be the first statement"),
        }
    }
}

/// An assembly error together with the source line that caused it.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmError {
    /// 1-based line number.
    pub line: usize,
    pub source: String,
    pub kind: AsmErrorKind,
}

impl AsmError {
    pub fn new(line: usize, source: &str, kind: AsmErrorKind) -> AsmError {
        AsmError {
            line,
            source: source.trim_end().to_string(),
            kind,
        }
    }
}

impl Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}\n  | {}", self.line, self.kind, self.source)
    }
}

impl std::error::Error for AsmError {}

#[derive(Debug, Clone)]
enum InnerError<Kind> {
    Incomplete,
    Context(&'static str),
    Other(Kind),
    Nom(ErrorKind),
}

impl<Kind: Display> fmt::Display for InnerError<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InnerError::Context(ctx) => write!(f, "invalid {}", ctx),
            InnerError::Nom(_err) => write!(f, "unexpected input"),
            InnerError::Other(kind) => fmt::Display::fmt(kind, f),
            InnerError::Incomplete => write!(f, "expected more input"),
        }
    }
}

/// Error type that contains the reasons of the error and how much input was left unconsumed
/// at each of them. The first entry is the innermost failure.
///
/// For error location information see [ParseError::verbose].
#[derive(Clone, Debug)]
pub struct ParseError<Kind> {
    stack: Vec<(usize, InnerError<Kind>)>,
}

impl<Kind> ParseError<Kind> {
    pub(crate) fn from_kind(rest: &str, kind: Kind) -> ParseError<Kind> {
        ParseError {
            stack: vec![(rest.len(), InnerError::Other(kind))],
        }
    }

    pub(crate) fn incomplete() -> ParseError<Kind> {
        ParseError {
            stack: vec![(0, InnerError::Incomplete)],
        }
    }

    /// Returns the custom error kind of the innermost failure, if it has one.
    pub fn kind(&self) -> Option<&Kind> {
        self.stack.iter().find_map(|(_, inner)| match inner {
            InnerError::Other(kind) => Some(kind),
            _ => None,
        })
    }

    /// Calculates the error location information from the [ParseError] and the original input
    /// buffer.
    ///
    /// # Parameters
    /// - `input`: The original input buffer or an exact copy of it.
    pub fn verbose(self, input: &str) -> VerboseParseError<Kind> {
        let (remaining, kind) = self
            .stack
            .into_iter()
            .next()
            .unwrap_or((0, InnerError::Incomplete));

        let offset = input.len().saturating_sub(remaining);
        let consumed = &input[..offset];

        let line = consumed.matches('\n').count() + 1;
        let column = consumed.len() - consumed.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;

        let rest = input[offset..]
            .lines()
            .next()
            .map(|l| &l[..l.len().min(20)])
            .unwrap_or("");

        VerboseParseError {
            line,
            column,
            kind,
            rest,
        }
    }
}

/// Error type containing location information in addition to the reason of the error.
///
/// Created from a [ParseError] with [ParseError::verbose].
#[derive(Clone, Debug)]
pub struct VerboseParseError<'a, Kind> {
    /// The line number of the error location.
    pub line: usize,
    /// The column number of the error location.
    pub column: usize,
    kind: InnerError<Kind>,
    rest: &'a str,
}

impl<'a, Kind: Display> fmt::Display for VerboseParseError<'a, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "at line {} col {}: {}, at '{}'", self.line, self.column, self.kind, self.rest)
    }
}

impl<Kind: Display> fmt::Display for ParseError<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.stack.iter().map(|(_, inner)| inner).join(": "))
    }
}

impl<Kind: fmt::Debug + Display> std::error::Error for ParseError<Kind> {}

impl<Kind> nom::error::ParseError<&str> for ParseError<Kind> {
    fn from_error_kind(input: &str, kind: ErrorKind) -> Self {
        ParseError {
            stack: vec![(input.len(), InnerError::Nom(kind))],
        }
    }

    fn append(input: &str, kind: ErrorKind, mut other: Self) -> Self {
        other.stack.push((input.len(), InnerError::Nom(kind)));
        other
    }

    fn add_context(input: &str, ctx: &'static str, mut other: Self) -> Self {
        other.stack.push((input.len(), InnerError::Context(ctx)));
        other
    }
}

#[test]
fn test_verbose_location() {
    let input = "HPROG  001000000003\nT00100003XYZ\nE001000\n";
    let rest = &input[29..];

    let err: ParseError<&'static str> = ParseError::from_kind(rest, "bad payload");
    let verbose = err.verbose(input);

    assert_eq!(verbose.line, 2);
    assert_eq!(verbose.column, 10);
    assert_eq!(verbose.to_string(), "at line 2 col 10: bad payload, at 'XYZ'");
}
