//! A crate for assembling and executing programs for the SIC/XE instruction architecture.
//!
//! Currently this crate provides the functionality to:
//! - Parse SIC/XE symbolic assembly with the usual directives (`START`, `END`, `BYTE`, `WORD`,
//!   `RESB`, `RESW`, `EQU`, `ORG`, `BASE`, `NOBASE`).
//! - Compile it into object programs, optionally with an assembly listing.
//! - Read and write the textual object file format (`H`, `T`, `M` and `E` records).
//! - Load object programs, relocating them if needed, and execute them.
//!
//! # Unimplemented stuff
//! - Floating point, I/O channel and supervisor instructions (`FIX`, `FLOAT`, `ADDF`, `SIO`,
//!   `SVC`, ...) are decoded but fail with [SimError::NotImplemented](emulator::SimError).
//! - Literal pools (`LTORG` is accepted and ignored), expressions and control sections.
//!
//! # Example
//! ```
//! use sicxe::{
//!     emulator::{Emulator, TestIo},
//!     instruction::Register,
//!     symbolic::Program,
//! };
//!
//! let source = r#"
//!         START   PROG 1000
//!         LDA     #5
//!         ADD     #3
//!         STA     RESULT
//!         RSUB
//! RESULT  RESW    1
//! "#;
//!
//! // Parse the source and assign addresses to every line.
//! let program = Program::parse(source).unwrap();
//!
//! // Resolve symbols and produce the object program.
//! let object = program.compile().unwrap();
//! assert_eq!(object.text.len(), 1);
//!
//! // Load the object program into an emulator with in-memory devices and run it.
//! let mut emulator = Emulator::new(TestIo::new());
//! emulator.load(&object).unwrap();
//! emulator.run().unwrap();
//!
//! assert_eq!(emulator.context.get(Register::A), 8);
//! assert_eq!(emulator.memory.get_word(0x100C).unwrap(), 8);
//! ```
//!
//! # Executables
//!
//! ## `sicxe`
//!
//! Built with the `tools` feature. `sicxe asm -i prog.asm` writes `prog.obj`, and
//! `sicxe sim -i prog.obj` loads it and starts an interactive prompt for stepping through the
//! program and inspecting the machine.
//!
//! ```text
//! 001000> s
//!  A: 000005 (5)
//!  X: 000000 (0)
//! ...
//! 001003> w 0x100C
//! 00100C: 000000 (0)
//! ```
pub mod compiler;
pub mod emulator;
pub mod error;
pub mod event;
pub mod instruction;
pub mod object;
pub mod source_map;
pub mod symbol_table;
pub mod symbolic;
pub mod word;
