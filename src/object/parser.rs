use std::fmt;
use std::result::Result as StdResult;

use nom::{
    branch::alt,
    bytes::complete::{take, take_while, take_while1, take_while_m_n},
    character::complete::{char, line_ending},
    combinator::{cut, map, map_res, opt, value},
    error::context,
    multi::many0,
    sequence::{preceded, tuple},
    IResult,
};

use super::program::{Header, Modification, Program, Sign, Text};

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    MissingHeader,
    MissingEnd,

    /// A record that does not follow the H, T*, M*, E order or has a bad marker.
    MalformedRecord(&'static str),

    /// The byte count of a text record does not match its payload.
    LengthMismatch {
        declared: usize,
        actual: usize,
    },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::MissingHeader => write!(f, "malformed object file: missing header record"),
            ErrorKind::MissingEnd => write!(f, "malformed object file: missing end record"),
            ErrorKind::MalformedRecord(what) => write!(f, "malformed record: {}", what),
            ErrorKind::LengthMismatch { declared, actual } => write!(
                f,
                "text record declares {} bytes but contains {}",
                declared, actual
            ),
        }
    }
}

pub type ParseError = crate::error::ParseError<ErrorKind>;
type Result<'a, T> = IResult<&'a str, T, ParseError>;

fn fail<T>(input: &str, kind: ErrorKind) -> Result<T> {
    Err(nom::Err::Failure(ParseError::from_kind(input, kind)))
}

fn hex_field(width: usize) -> impl Fn(&str) -> Result<u32> {
    move |input: &str| {
        map_res(
            take_while_m_n(width, width, |c: char| c.is_ascii_hexdigit()),
            |digits| u32::from_str_radix(digits, 16),
        )(input)
    }
}

fn sp(input: &str) -> Result<&str> {
    take_while(|c| c == ' ' || c == '\t')(input)
}

/// Consumes trailing blanks and the line ending. The last line does not need one.
fn end_of_line(input: &str) -> Result<()> {
    let (input, _) = sp(input)?;

    if input.is_empty() {
        return Ok((input, ()));
    }

    value((), line_ending)(input)
}

fn blank_lines(input: &str) -> Result<()> {
    value((), many0(preceded(sp, line_ending)))(input)
}

fn header(input: &str) -> Result<Header> {
    let (input, _) = char('H')(input)?;

    cut(context(
        "header record",
        map(
            tuple((take(6usize), hex_field(6), hex_field(6))),
            |(name, start, length): (&str, u32, u32)| Header {
                name: name.trim_end().to_string(),
                start,
                length,
            },
        ),
    ))(input)
}

fn text(input: &str) -> Result<Text> {
    let (input, _) = char('T')(input)?;
    let (input, (start, count)) = cut(context("text record", tuple((hex_field(6), hex_field(2)))))(input)?;
    let (rest, payload) = take_while(|c: char| c.is_ascii_hexdigit())(input)?;

    if payload.len() % 2 != 0 || payload.len() / 2 != count as usize {
        return fail(input, ErrorKind::LengthMismatch {
            declared: count as usize,
            actual: payload.len() / 2,
        });
    }

    let bytes = (0..payload.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&payload[i..i + 2], 16).unwrap_or(0))
        .collect();

    Ok((rest, Text { start, bytes }))
}

fn modification(input: &str) -> Result<Modification> {
    let (input, _) = char('M')(input)?;

    cut(context(
        "modification record",
        map(
            tuple((
                hex_field(6),
                hex_field(2),
                opt(tuple((
                    alt((value(Sign::Plus, char('+')), value(Sign::Minus, char('-')))),
                    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
                ))),
            )),
            |(address, half_bytes, symbol)| Modification {
                address,
                half_bytes: half_bytes as u8,
                symbol: symbol.map(|(sign, name): (Sign, &str)| (sign, name.to_string())),
            },
        ),
    ))(input)
}

fn end(input: &str) -> Result<u32> {
    let (input, _) = char('E')(input)?;
    cut(context("end record", hex_field(6)))(input)
}

fn line<'a, T>(record: impl Fn(&'a str) -> Result<'a, T>) -> impl Fn(&'a str) -> Result<'a, T> {
    move |input: &'a str| {
        let (input, _) = blank_lines(input)?;
        let (input, output) = record(input)?;
        let (input, _) = cut(end_of_line)(input)?;
        Ok((input, output))
    }
}

fn parse_object_file_nom(input: &str) -> Result<Program> {
    let (input, _) = blank_lines(input)?;

    if !input.starts_with('H') {
        return fail(input, ErrorKind::MissingHeader);
    }

    let (input, header) = line(header)(input)?;
    let (input, text) = many0(line(text))(input)?;
    let (input, modifications) = many0(line(modification))(input)?;
    let (input, _) = blank_lines(input)?;

    if input.trim().is_empty() {
        return fail(input, ErrorKind::MissingEnd);
    }

    if !input.starts_with('E') {
        return fail(input, ErrorKind::MalformedRecord("expected a text, modification or end record"));
    }

    let (input, entry) = line(end)(input)?;

    if !input.trim().is_empty() {
        return fail(input, ErrorKind::MalformedRecord("unexpected data after the end record"));
    }

    Ok((input, Program {
        header,
        text,
        modifications,
        entry,
    }))
}

pub(crate) fn parse_object_file(input: &str) -> StdResult<Program, ParseError> {
    match parse_object_file_nom(input) {
        Ok((_, program)) => Ok(program),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(err),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::incomplete()),
    }
}

#[test]
fn test_parse_object_file() {
    let input = "HPROG  00100000000F\r\nT0010000C0100051900030F20034F0000\nM00100105+PROG\nE001000\n";
    let program = parse_object_file(input).unwrap();

    assert_eq!(program.header, Header { name: "PROG".into(), start: 0x1000, length: 0x0F });
    assert_eq!(program.text.len(), 1);
    assert_eq!(
        program.text[0].bytes,
        vec![0x01, 0x00, 0x05, 0x19, 0x00, 0x03, 0x0F, 0x20, 0x03, 0x4F, 0x00, 0x00],
    );
    assert_eq!(
        program.modifications,
        vec![Modification { address: 0x1001, half_bytes: 5, symbol: Some((Sign::Plus, "PROG".into())) }],
    );
    assert_eq!(program.entry, 0x1000);
    assert_eq!(program.to_string().replace('\r', ""), input.replace('\r', ""));
}

#[test]
fn test_missing_records() {
    let err = parse_object_file("T00100001FF\nE001000\n").unwrap_err();
    assert_eq!(err.kind(), Some(&ErrorKind::MissingHeader));

    let err = parse_object_file("HPROG  001000000001\nT00100001FF\n").unwrap_err();
    assert_eq!(err.kind(), Some(&ErrorKind::MissingEnd));

    let err = parse_object_file("HPROG  001000000001\nM00100105\nT00100001FF\nE001000\n").unwrap_err();
    assert!(matches!(err.kind(), Some(ErrorKind::MalformedRecord(_))));
}

#[test]
fn test_malformed_text_record() {
    let input = "HPROG  001000000002\nT00100002FF\nE001000\n";
    let err = parse_object_file(input).unwrap_err();

    assert_eq!(err.kind(), Some(&ErrorKind::LengthMismatch { declared: 2, actual: 1 }));
    assert_eq!(err.verbose(input).line, 2);

    let input = "HPROG  001000000002\nT0010ZZ02FFFF\nE001000\n";
    assert!(parse_object_file(input).is_err());
}
