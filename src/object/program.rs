use std::fmt;
use std::io::{self, Write};

use super::parser::{parse_object_file, ParseError};

/// Maximum number of bytes in a single text record.
pub const MAX_TEXT_LENGTH: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Program name, at most 6 characters.
    pub name: String,
    pub start: u32,
    pub length: u32,
}

/// A run of bytes loaded at consecutive addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub start: u32,
    pub bytes: Vec<u8>,
}

impl Text {
    /// The address following the last byte of the record.
    pub fn end(&self) -> u32 {
        self.start + self.bytes.len() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

/// An address field that must be adjusted when the program is not loaded at its start address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub address: u32,

    /// Length of the field in half-bytes, counted from the low end of the word at `address`.
    pub half_bytes: u8,

    /// The symbol whose value is added or subtracted. `None` means the program's own load
    /// address.
    pub symbol: Option<(Sign, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Header(Header),
    Text(Text),
    Modification(Modification),
    End(u32),
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Record::Header(header) => {
                let name = header.name.chars().take(6).collect::<String>();
                write!(f, "H{:<6}{:06X}{:06X}", name, header.start, header.length)
            }
            Record::Text(text) => {
                write!(f, "T{:06X}{:02X}", text.start, text.bytes.len())?;

                for byte in &text.bytes {
                    write!(f, "{:02X}", byte)?;
                }

                Ok(())
            }
            Record::Modification(modification) => {
                write!(f, "M{:06X}{:02X}", modification.address, modification.half_bytes)?;

                match &modification.symbol {
                    Some((Sign::Plus, name)) => write!(f, "+{}", name),
                    Some((Sign::Minus, name)) => write!(f, "-{}", name),
                    None => Ok(()),
                }
            }
            Record::End(entry) => write!(f, "E{:06X}", entry),
        }
    }
}

/// An object program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub header: Header,
    pub text: Vec<Text>,
    pub modifications: Vec<Modification>,
    pub entry: u32,
}

impl Program {
    /// Creates a program with no content. The entry point defaults to the start address.
    pub fn new(header: Header) -> Program {
        Program {
            entry: header.start,
            header,
            text: Vec::new(),
            modifications: Vec::new(),
        }
    }

    /// Parses the textual object file format.
    pub fn parse(input: &str) -> Result<Program, ParseError> {
        parse_object_file(input)
    }

    /// Appends the bytes of one node at `address`.
    ///
    /// Bytes that continue the last text record are added to it if they fit in
    /// [MAX_TEXT_LENGTH]. Otherwise, or at a gap in addresses, a new record is started. Only a
    /// node longer than [MAX_TEXT_LENGTH] is split across records.
    pub fn push_bytes(&mut self, mut address: u32, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let continues = match self.text.last() {
                Some(last) if last.end() == address => {
                    let room = MAX_TEXT_LENGTH - last.bytes.len();
                    bytes.len() <= room || (bytes.len() > MAX_TEXT_LENGTH && room > 0)
                }
                _ => false,
            };

            if !continues {
                self.text.push(Text {
                    start: address,
                    bytes: Vec::new(),
                });
            }

            if let Some(last) = self.text.last_mut() {
                let count = bytes.len().min(MAX_TEXT_LENGTH - last.bytes.len());
                last.bytes.extend_from_slice(&bytes[..count]);
                address += count as u32;
                bytes = &bytes[count..];
            }
        }
    }

    /// Returns the records of the program in file order.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        std::iter::once(Record::Header(self.header.clone()))
            .chain(self.text.iter().cloned().map(Record::Text))
            .chain(self.modifications.iter().cloned().map(Record::Modification))
            .chain(std::iter::once(Record::End(self.entry)))
    }

    /// Writes the program in the textual object file format.
    pub fn write<W: Write>(&self, mut out: W) -> io::Result<()> {
        for record in self.records() {
            writeln!(out, "{}", record)?;
        }

        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for record in self.records() {
            writeln!(f, "{}", record)?;
        }

        Ok(())
    }
}

#[test]
fn test_push_bytes_coalesces() {
    let mut program = Program::new(Header {
        name: "PROG".into(),
        start: 0,
        length: 0,
    });

    program.push_bytes(0, &[1, 2, 3]);
    program.push_bytes(3, &[4, 5, 6]);
    program.push_bytes(10, &[7]);
    program.push_bytes(11, &[0xAA; 40]);

    assert_eq!(program.text.len(), 3);
    assert_eq!(program.text[0], Text { start: 0, bytes: vec![1, 2, 3, 4, 5, 6] });
    assert_eq!(program.text[1].start, 10);
    assert_eq!(program.text[1].bytes.len(), MAX_TEXT_LENGTH);
    assert_eq!(program.text[2], Text { start: 40, bytes: vec![0xAA; 11] });
}

#[test]
fn test_push_bytes_keeps_nodes_whole() {
    let mut program = Program::new(Header {
        name: "PROG".into(),
        start: 0,
        length: 0,
    });

    for i in 0..9 {
        program.push_bytes(i * 3, &[0x01, 0x00, 0x01]);
    }

    program.push_bytes(27, &[0x4B, 0x10, 0x00, 0x00]);

    assert_eq!(program.text.len(), 2);
    assert_eq!(program.text[0].bytes.len(), 27);
    assert_eq!(program.text[1], Text { start: 27, bytes: vec![0x4B, 0x10, 0x00, 0x00] });
}

#[test]
fn test_write_records() {
    let mut program = Program::new(Header {
        name: "PROG".into(),
        start: 0x1000,
        length: 0x0F,
    });

    program.push_bytes(0x1000, &[0x01, 0x00, 0x05]);
    program.modifications.push(Modification {
        address: 0x1001,
        half_bytes: 5,
        symbol: Some((Sign::Plus, "PROG".into())),
    });

    assert_eq!(
        program.to_string(),
        "HPROG  00100000000F\nT00100003010005\nM00100105+PROG\nE001000\n",
    );
}
