//! Symbol resolution and translation from parsed assembly to object programs.

use slog::{debug, o, trace, Discard, Logger};

use crate::error::{AsmError, AsmErrorKind};
use crate::object::{Header, Modification, Program};
use crate::symbolic::{self, ast::Node};

/// Defines an interface for a data structure into which a program can be compiled.
pub trait CompileTarget: Sized {
    /// Create an empty instance of itself for the program described by `header`.
    fn create(header: Header) -> Self;

    /// Adds an encoded node. Called for every node in source order, including directives that
    /// encode to no bytes.
    fn push_node(&mut self, node: &Node, bytes: &[u8]);

    /// Adds a relocation entry.
    fn push_modification(&mut self, modification: Modification);

    /// Finalize the compilation.
    /// The compiler will not modify the data structure after this.
    fn finish(self, entry: u32) -> Self;
}

impl CompileTarget for Program {
    fn create(header: Header) -> Program {
        Program::new(header)
    }

    fn push_node(&mut self, node: &Node, bytes: &[u8]) {
        self.push_bytes(node.location, bytes);
    }

    fn push_modification(&mut self, modification: Modification) {
        self.modifications.push(modification);
    }

    fn finish(mut self, entry: u32) -> Program {
        self.entry = entry;
        self
    }
}

/// Compiles a parsed program.
///
/// Supports compilation into multiple data structures, but most often the compilation target is
/// [crate::object::Program] possibly wrapped in a [SourceMap](crate::source_map::SourceMap).
pub fn compile<T: CompileTarget>(program: symbolic::Program) -> Result<T, AsmError> {
    compile_with_logger(program, None)
}

pub fn compile_with_logger<T, L>(program: symbolic::Program, logger: L) -> Result<T, AsmError>
where
    T: CompileTarget,
    L: Into<Option<Logger>>,
{
    let logger = logger
        .into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "compilation"));

    let symbolic::Program {
        name,
        start,
        length,
        mut entry,
        first_instruction,
        mut nodes,
        mut symbol_table,
    } = program;

    let error_at = |nodes: &[Node], line: usize, kind: AsmErrorKind| {
        let source = nodes
            .iter()
            .find(|node| node.line == line)
            .map(|node| node.source.as_str())
            .unwrap_or("");

        AsmError::new(line, source, kind)
    };

    symbol_table
        .resolve_aliases()
        .map_err(|err| error_at(&nodes, err.line, AsmErrorKind::UndefinedSymbol(err.target)))?;

    for node in nodes.iter_mut() {
        node.resolve(&symbol_table)
            .map_err(|kind| AsmError::new(node.line, &node.source, kind))?;
    }

    let entry = match &mut entry {
        Some(value) => {
            let end_line = nodes.last().map(|node| node.line).unwrap_or(0);

            value
                .resolve(&symbol_table)
                .map_err(|kind| error_at(&nodes, end_line, kind))?;

            value.resolved().map(|symbol| symbol.value as u32).unwrap_or(start)
        }
        None => first_instruction.unwrap_or(start),
    };

    debug!(logger, "symbols resolved"; "entry" => format!("{:06X}", entry));

    let mut target = T::create(Header {
        name,
        start,
        length,
    });

    for node in &nodes {
        let bytes = node
            .encode()
            .map_err(|kind| AsmError::new(node.line, &node.source, kind))?;

        trace!(logger, "encode";
            "line" => node.line,
            "location" => format!("{:06X}", node.location),
            "bytes" => bytes.len());

        target.push_node(node, &bytes);

        if let Some(modification) = node.modification() {
            trace!(logger, "relocation entry"; "address" => format!("{:06X}", modification.address));
            target.push_modification(modification);
        }
    }

    Ok(target.finish(entry))
}

#[test]
fn test_compile() {
    let source = r#"
        START   PROG 1000
        LDA     #5
        ADD     #3
        STA     RESULT
        RSUB
RESULT  RESW    1
"#;

    let program = crate::symbolic::Program::parse(source).unwrap();
    let object: Program = compile(program).unwrap();

    assert_eq!(
        object.to_string(),
        "HPROG  00100000000F\nT0010000C0100051900030F20034F0000\nE001000\n",
    );
}

#[test]
fn test_compile_base_relative() {
    let source = r#"
        START   0
        +LDB    #TABLE
        BASE    TABLE
        LDA     TABLE,X
        STA     FAR
        NOBASE
        RESB    3000
TABLE   RESW    1
FAR     RESW    1
"#;

    let program = crate::symbolic::Program::parse(source).unwrap();
    let object: Program = compile(program).unwrap();

    // TABLE is at 0xBC2, out of PC-relative range from the start of the program.
    let bytes = &object.text[0].bytes;
    assert_eq!(&bytes[0..4], &[0x69, 0x10, 0x0B, 0xC2]);
    assert_eq!(&bytes[4..7], &[0x03, 0xC0, 0x00]);
    assert_eq!(&bytes[7..10], &[0x0F, 0x40, 0x03]);
}

#[test]
fn test_compile_undefined_symbol() {
    let program = crate::symbolic::Program::parse("  LDA MISSING\n").unwrap();
    let err = compile::<Program>(program).unwrap_err();

    assert_eq!(err.line, 1);
    assert_eq!(err.kind, AsmErrorKind::UndefinedSymbol("MISSING".into()));
}

#[test]
fn test_compile_modifications() {
    let source = r#"
        START   COPY 1000
        +JSUB   SUB
        +LDA    #4096
SUB     RSUB
ADDR    WORD    SUB
"#;

    let program = crate::symbolic::Program::parse(source).unwrap();
    let object: Program = compile(program).unwrap();

    assert_eq!(
        object.modifications,
        vec![
            Modification { address: 0x1001, half_bytes: 5, symbol: None },
            Modification { address: 0x100B, half_bytes: 6, symbol: None },
        ]
    );
}
