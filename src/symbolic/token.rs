//! Tokens and a tokenizer for SIC/XE assembly source lines.

use logos::{Lexer, Logos};

use std::fmt;

/// Enumeration of all tokens of a source line.
#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Errorneous token that could not be interpreted as any of the other variants.
    #[error]
    #[regex(r"[ \t\r\f]+", logos::skip)]
    #[regex(r"\.[^\n]*", logos::skip)]
    Error,

    /// A label, mnemonic, register or symbol reference.
    #[regex("[A-Za-z_][A-Za-z0-9_]*", Lexer::slice)]
    Word(&'a str),

    /// A decimal number.
    #[regex("-?[0-9]+", |lex| lex.slice().parse())]
    Number(i64),

    /// The digits of a hexadecimal literal (`X'F1'`).
    #[regex("[Xx]'[^'\n]*'", literal_body)]
    HexLiteral(&'a str),

    /// The characters of a character literal (`C'EOF'`).
    #[regex("[Cc]'[^'\n]*'", literal_body)]
    CharLiteral(&'a str),

    /// Token (`#`) that selects immediate addressing.
    #[token("#")]
    Immediate,

    /// Token (`@`) that selects indirect addressing.
    #[token("@")]
    Indirect,

    /// Token (`+`) that selects the extended format 4.
    #[token("+")]
    Extended,

    /// Token (`,`) that separates operands.
    #[token(",")]
    Separator,

    /// Token (`*`) that refers to the current location.
    #[token("*")]
    Here,
}

fn literal_body<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[2..slice.len() - 1]
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Error => write!(f, "<error>"),
            Token::Word(word) => write!(f, "{}", word),
            Token::Number(num) => write!(f, "{}", num),
            Token::HexLiteral(digits) => write!(f, "X'{}'", digits),
            Token::CharLiteral(chars) => write!(f, "C'{}'", chars),
            Token::Immediate => write!(f, "#"),
            Token::Indirect => write!(f, "@"),
            Token::Extended => write!(f, "+"),
            Token::Separator => write!(f, ","),
            Token::Here => write!(f, "*"),
        }
    }
}

#[test]
fn test_tokenize_instruction() {
    let tokens = Token::lexer("LOOP  +LDA  @BUF,X   . load it").collect::<Vec<_>>();

    assert_eq!(
        tokens,
        vec![
            Token::Word("LOOP"),
            Token::Extended,
            Token::Word("LDA"),
            Token::Indirect,
            Token::Word("BUF"),
            Token::Separator,
            Token::Word("X"),
        ]
    );
}

#[test]
fn test_tokenize_literals() {
    let tokens = Token::lexer("EOF BYTE C'E.F' X'F1' #-12").collect::<Vec<_>>();

    assert_eq!(
        tokens,
        vec![
            Token::Word("EOF"),
            Token::Word("BYTE"),
            Token::CharLiteral("E.F"),
            Token::HexLiteral("F1"),
            Token::Immediate,
            Token::Number(-12),
        ]
    );
}
