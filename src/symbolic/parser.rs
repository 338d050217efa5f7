//! Parser for single lines of SIC/XE assembly.
//!
//! Numeric operands are decimal (`RESB 4096`, `ORG 100`, `#3`) except the address of `START`,
//! which is hexadecimal as in SIC object programs (`START 1000` begins at 0x1000). A lone
//! `START` operand without a label is the address when it begins with a digit and the program
//! name otherwise, so `START ABC` names the program and `START 0ABC` begins at 0xABC.

use logos::{Logos, Span};

use crate::error::AsmErrorKind;
use crate::instruction::{
    AddressingMode, Directive, Format, MemoryOperands, Mnemonic, Register, RegisterOperands,
    UnknownMnemonic,
};

use super::ast::{Operand, Value};
use super::token::Token;

/// The syntactic content of a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'a> {
    pub label: Option<&'a str>,
    pub mnemonic: Mnemonic,
    pub extended: bool,
    pub operand: Operand,
}

type Result<T> = std::result::Result<T, AsmErrorKind>;

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(Token<'a>, Span)>,
    position: usize,
}

fn unknown_mnemonic(word: &str) -> AsmErrorKind {
    AsmErrorKind::UnknownMnemonic(UnknownMnemonic {
        mnemonic: word.to_string(),
        suggestion: Mnemonic::suggest(word),
    })
}

/// Parses hexadecimal digits, as used by `X'..'` literals and the `START` address.
fn parse_hex(digits: &str) -> Result<u32> {
    if digits.is_empty() || digits.len() > 6 {
        return Err(AsmErrorKind::MalformedLiteral(digits.to_string()));
    }

    u32::from_str_radix(digits, 16).map_err(|_| AsmErrorKind::MalformedLiteral(digits.to_string()))
}

fn parse_hex_bytes(digits: &str) -> Result<Vec<u8>> {
    let malformed = || AsmErrorKind::MalformedLiteral(format!("X'{}'", digits));

    if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed());
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| malformed()))
        .collect()
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Result<Parser<'a>> {
        let mut tokens = Vec::new();

        for (token, span) in Token::lexer(text).spanned() {
            if token == Token::Error {
                let found = &text[span.clone()];

                return Err(if found.contains('\'') {
                    AsmErrorKind::MalformedLiteral(text[span.start..].trim_end().to_string())
                } else if found.chars().all(|c| c.is_ascii_digit() || c == '-') {
                    AsmErrorKind::MalformedLiteral(found.to_string())
                } else {
                    AsmErrorKind::UnexpectedToken {
                        found: found.to_string(),
                        expected: "a symbol, number or operator",
                    }
                });
            }

            tokens.push((token, span));
        }

        Ok(Parser {
            text,
            tokens,
            position: 0,
        })
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.position).map(|(token, _)| token.clone());

        if token.is_some() {
            self.position += 1;
        }

        token
    }

    fn is_done(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Consumes the next token if it is equal to `token`.
    fn accept(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &'static str) -> AsmErrorKind {
        match self.peek() {
            Some(token) => AsmErrorKind::UnexpectedToken {
                found: token.to_string(),
                expected,
            },
            None => AsmErrorKind::MissingOperand(expected),
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.is_done() {
            Ok(())
        } else {
            Err(self.unexpected("end of line"))
        }
    }

    fn expect_separator(&mut self) -> Result<()> {
        if self.accept(&Token::Separator) {
            Ok(())
        } else {
            Err(self.unexpected("','"))
        }
    }

    fn register(&mut self) -> Result<Register> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let register = word
                    .parse()
                    .map_err(|_| AsmErrorKind::InvalidRegister(word.to_string()))?;
                self.position += 1;
                Ok(register)
            }
            _ => Err(self.unexpected("a register")),
        }
    }

    /// A plain number, decimal or `X'..'`.
    fn number(&mut self) -> Result<i64> {
        match self.peek() {
            Some(Token::Number(num)) => {
                let num = *num;
                self.position += 1;
                Ok(num)
            }
            Some(Token::HexLiteral(digits)) => {
                let num = parse_hex(digits)?;
                self.position += 1;
                Ok(num as i64)
            }
            _ => Err(self.unexpected("a number")),
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let value = Value::Symbol(word.to_string());
                self.position += 1;
                Ok(value)
            }
            Some(Token::Number(_)) | Some(Token::HexLiteral(_)) => {
                let num = self.number()?;

                if num < i32::min_value() as i64 || num > i32::max_value() as i64 {
                    return Err(AsmErrorKind::MalformedLiteral(num.to_string()));
                }

                Ok(Value::Number(num as i32))
            }
            _ => Err(self.unexpected("a number or symbol")),
        }
    }

    fn register_operands(&mut self, shape: RegisterOperands) -> Result<Operand> {
        match shape {
            RegisterOperands::Register => Ok(Operand::Register(self.register()?)),
            RegisterOperands::RegisterPair => {
                let r1 = self.register()?;
                self.expect_separator()?;
                let r2 = self.register()?;
                Ok(Operand::RegisterPair(r1, r2))
            }
            RegisterOperands::RegisterCount => {
                let r = self.register()?;
                self.expect_separator()?;
                let n = self.number()?;

                if n < 1 || n > 16 {
                    return Err(AsmErrorKind::ValueOutOfRange { value: n, bits: 4 });
                }

                Ok(Operand::RegisterCount(r, n as u8))
            }
            RegisterOperands::Number => {
                let n = self.number()?;

                if n < 0 || n > 15 {
                    return Err(AsmErrorKind::ValueOutOfRange { value: n, bits: 4 });
                }

                Ok(Operand::Number(n as u8))
            }
        }
    }

    fn memory_operand(&mut self) -> Result<Operand> {
        let mode = if self.accept(&Token::Immediate) {
            AddressingMode::Immediate
        } else if self.accept(&Token::Indirect) {
            AddressingMode::Indirect
        } else {
            AddressingMode::Simple
        };

        let value = self.value()?;

        let indexed = if self.accept(&Token::Separator) {
            match self.register()? {
                Register::X => true,
                other => return Err(AsmErrorKind::InvalidRegister(other.to_string())),
            }
        } else {
            false
        };

        Ok(Operand::Memory {
            mode,
            value,
            indexed,
        })
    }

    /// `START [name] [address]`. The address is always hexadecimal, so it is read from the raw
    /// text instead of the tokens.
    fn start_operand(&mut self, label: Option<&str>) -> Result<Operand> {
        let rest = match self.tokens.get(self.position) {
            Some((_, span)) => {
                let end = self.tokens.last().map(|(_, s)| s.end).unwrap_or(span.end);
                &self.text[span.start..end]
            }
            None => "",
        };

        self.position = self.tokens.len();

        let parts = rest.split_whitespace().collect::<Vec<_>>();

        let (name, address) = match parts.as_slice() {
            [] => (None, 0),
            [name, address] => (Some(*name), parse_hex(address)?),
            [single] if label.is_some() => (None, parse_hex(single)?),
            [single] if single.starts_with(|c: char| c.is_ascii_digit()) => {
                (None, parse_hex(single)?)
            }
            [single] => (Some(*single), 0),
            [_, _, extra, ..] => {
                return Err(AsmErrorKind::UnexpectedToken {
                    found: extra.to_string(),
                    expected: "end of line",
                })
            }
        };

        let name = name.or(label);

        if let Some(name) = name {
            if name.len() > 6 {
                return Err(AsmErrorKind::NameTooLong(name.to_string()));
            }
        }

        Ok(Operand::Start {
            name: name.map(str::to_string),
            address,
        })
    }

    fn directive_operand(&mut self, directive: Directive, label: Option<&str>) -> Result<Operand> {
        match directive {
            Directive::Start => self.start_operand(label),
            Directive::NoBase | Directive::Ltorg => Ok(Operand::None),
            Directive::End => {
                if self.is_done() {
                    Ok(Operand::None)
                } else {
                    Ok(Operand::Value(self.value()?))
                }
            }
            Directive::Equ => {
                if self.accept(&Token::Here) {
                    Ok(Operand::Here)
                } else {
                    Ok(Operand::Value(self.value()?))
                }
            }
            Directive::Byte => match self.peek() {
                Some(Token::CharLiteral(chars)) => {
                    let bytes = chars.as_bytes().to_vec();
                    self.position += 1;
                    Ok(Operand::Bytes(bytes))
                }
                Some(Token::HexLiteral(digits)) => {
                    let bytes = parse_hex_bytes(digits)?;
                    self.position += 1;
                    Ok(Operand::Bytes(bytes))
                }
                _ => Ok(Operand::Value(self.value()?)),
            },
            Directive::Base | Directive::Org | Directive::Word | Directive::Resb | Directive::Resw => {
                Ok(Operand::Value(self.value()?))
            }
        }
    }

    fn statement(&mut self) -> Result<Option<Statement<'a>>> {
        let label = match self.peek() {
            None => return Ok(None),
            Some(Token::Word(word)) if Mnemonic::parse(word).is_none() => {
                let word = *word;
                self.position += 1;

                match self.peek() {
                    Some(Token::Word(_)) | Some(Token::Extended) => Some(word),
                    _ => return Err(unknown_mnemonic(word)),
                }
            }
            _ => None,
        };

        let extended = self.accept(&Token::Extended);

        let mnemonic = match self.next() {
            Some(Token::Word(word)) => Mnemonic::parse(word).ok_or_else(|| unknown_mnemonic(word))?,
            Some(other) => {
                return Err(AsmErrorKind::UnexpectedToken {
                    found: other.to_string(),
                    expected: "a mnemonic",
                })
            }
            None => return Err(AsmErrorKind::MissingOperand("a mnemonic")),
        };

        let operand = match mnemonic {
            Mnemonic::Instruction(op) => {
                match op.format() {
                    Format::Three(_) => (),
                    _ if extended => return Err(AsmErrorKind::ExtendedNotAllowed(op.to_string())),
                    _ => (),
                }

                match op.format() {
                    Format::One | Format::Three(MemoryOperands::None) => Operand::None,
                    Format::Two(shape) => self.register_operands(shape)?,
                    Format::Three(MemoryOperands::Address) => self.memory_operand()?,
                }
            }
            Mnemonic::Directive(directive) => {
                if extended {
                    return Err(AsmErrorKind::ExtendedNotAllowed(directive.to_string()));
                }

                self.directive_operand(directive, label)?
            }
        };

        self.expect_end()?;

        Ok(Some(Statement {
            label,
            mnemonic,
            extended,
            operand,
        }))
    }
}

/// Parses one line of source. Blank lines and comment-only lines produce `None`.
pub fn parse_line(text: &str) -> Result<Option<Statement>> {
    Parser::new(text)?.statement()
}

#[cfg(test)]
use crate::instruction::OpCode;

#[test]
fn test_parse_memory_operands() {
    let statement = parse_line("LOOP  STCH  BUFFER,X").unwrap().unwrap();

    assert_eq!(statement.label, Some("LOOP"));
    assert_eq!(statement.mnemonic, Mnemonic::Instruction(OpCode::STCH));
    assert_eq!(
        statement.operand,
        Operand::Memory {
            mode: AddressingMode::Simple,
            value: Value::Symbol("BUFFER".into()),
            indexed: true,
        }
    );

    let statement = parse_line("  +LDT #4096").unwrap().unwrap();
    assert!(statement.extended);
    assert_eq!(statement.label, None);
    assert_eq!(
        statement.operand,
        Operand::Memory {
            mode: AddressingMode::Immediate,
            value: Value::Number(4096),
            indexed: false,
        }
    );

    let statement = parse_line("J @RETADR . return").unwrap().unwrap();
    assert!(matches!(statement.operand, Operand::Memory { mode: AddressingMode::Indirect, .. }));
}

#[test]
fn test_parse_blank_and_comments() {
    assert_eq!(parse_line(""), Ok(None));
    assert_eq!(parse_line("   \t "), Ok(None));
    assert_eq!(parse_line(". just a comment"), Ok(None));
}

#[test]
fn test_parse_start() {
    let statement = parse_line("START PROG 1000").unwrap().unwrap();
    assert_eq!(
        statement.operand,
        Operand::Start { name: Some("PROG".into()), address: 0x1000 }
    );

    let statement = parse_line("COPY START 1A00").unwrap().unwrap();
    assert_eq!(
        statement.operand,
        Operand::Start { name: Some("COPY".into()), address: 0x1A00 }
    );

    let statement = parse_line("START ABC").unwrap().unwrap();
    assert_eq!(
        statement.operand,
        Operand::Start { name: Some("ABC".into()), address: 0 }
    );

    let statement = parse_line("START 0ABC").unwrap().unwrap();
    assert_eq!(
        statement.operand,
        Operand::Start { name: None, address: 0xABC }
    );

    let statement = parse_line("PROG START ABC").unwrap().unwrap();
    assert_eq!(
        statement.operand,
        Operand::Start { name: Some("PROG".into()), address: 0xABC }
    );

    assert_eq!(
        parse_line("START TOOLONGNAME 0"),
        Err(AsmErrorKind::NameTooLong("TOOLONGNAME".into())),
    );
}

#[test]
fn test_parse_data() {
    let statement = parse_line("EOF BYTE C'EOF'").unwrap().unwrap();
    assert_eq!(statement.operand, Operand::Bytes(b"EOF".to_vec()));

    let statement = parse_line("OUT BYTE X'05'").unwrap().unwrap();
    assert_eq!(statement.operand, Operand::Bytes(vec![0x05]));

    assert_eq!(
        parse_line("BAD BYTE X'F'"),
        Err(AsmErrorKind::MalformedLiteral("X'F'".into())),
    );

    let statement = parse_line("LEN EQU *").unwrap().unwrap();
    assert_eq!(statement.operand, Operand::Here);
}

#[test]
fn test_parse_registers() {
    let statement = parse_line("COMPR A,S").unwrap().unwrap();
    assert_eq!(statement.operand, Operand::RegisterPair(Register::A, Register::S));

    assert_eq!(
        parse_line("CLEAR Q"),
        Err(AsmErrorKind::InvalidRegister("Q".into())),
    );

    assert_eq!(
        parse_line("SHIFTL A,17"),
        Err(AsmErrorKind::ValueOutOfRange { value: 17, bits: 4 }),
    );
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        parse_line("LDAA #5"),
        Err(AsmErrorKind::UnknownMnemonic(UnknownMnemonic { suggestion: Some("LDA"), .. }))
    ));

    assert_eq!(
        parse_line("+ADDR A,S"),
        Err(AsmErrorKind::ExtendedNotAllowed("ADDR".into())),
    );

    assert_eq!(
        parse_line("RSUB X"),
        Err(AsmErrorKind::UnexpectedToken { found: "X".into(), expected: "end of line" }),
    );
}
