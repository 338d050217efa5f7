use sicxe::{
    emulator::{Emulator, TestIo},
    error::AsmErrorKind,
    object::{self, ErrorKind, Record, MAX_TEXT_LENGTH},
    symbolic::Program,
};

fn assemble(source: &str) -> object::Program {
    Program::parse(source).unwrap().compile().unwrap()
}

#[test]
fn test_pc_relative_bounds() {
    let forward = assemble("        J       TARGET\n        RESB    2047\nTARGET  RSUB\n");
    assert_eq!(forward.text[0].bytes, vec![0x3F, 0x27, 0xFF]);

    let backward = assemble("TARGET  RSUB\n        RESB    2042\n        J       TARGET\n");
    assert_eq!(backward.text[1].start, 0x7FD);
    assert_eq!(backward.text[1].bytes, vec![0x3F, 0x28, 0x00]);

    let err = Program::parse("        J       TARGET\n        RESB    2048\nTARGET  RSUB\n")
        .unwrap()
        .compile()
        .unwrap_err();

    assert_eq!(err.line, 1);
    assert!(matches!(err.kind, AsmErrorKind::AddressOutOfRange { target: 0x803, .. }));

    let err = Program::parse("TARGET  RSUB\n        RESB    2043\n        J       TARGET\n")
        .unwrap()
        .compile()
        .unwrap_err();

    assert_eq!(err.line, 3);
}

#[test]
fn test_base_relative_fallback() {
    let source = r#"
        +LDB    #TARGET
        BASE    TARGET
        J       TARGET
        RESB    2048
TARGET  RSUB
"#;

    let program = assemble(source);
    assert_eq!(&program.text[0].bytes[4..7], &[0x3F, 0x40, 0x00]);

    let mut emulator = Emulator::new(TestIo::new());
    emulator.load(&program).unwrap();
    emulator.run().unwrap();

    assert!(emulator.halted);
    assert_eq!(emulator.context.pc(), 0x80A);
}

#[test]
fn test_duplicate_label() {
    let err = Program::parse("LOOP    LDA     #1\nLOOP    LDA     #2\n").unwrap_err();

    assert_eq!(err.line, 2);
    assert_eq!(
        err.kind,
        AsmErrorKind::DuplicateLabel {
            label: "LOOP".into(),
            previous_line: 1,
        }
    );
}

#[test]
fn test_undefined_symbol() {
    let err = Program::parse("        LDA     #1\n        STA     NOWHERE\n")
        .unwrap()
        .compile()
        .unwrap_err();

    assert_eq!(err.line, 2);
    assert_eq!(err.kind, AsmErrorKind::UndefinedSymbol("NOWHERE".into()));
    assert!(err.to_string().contains("NOWHERE"));
}

#[test]
fn test_text_record_split() {
    let program = assemble("DATA    BYTE    C'ABCDEFGHIJKLMNOPQRSTUVWXYZ012345678'\n");
    let text = program
        .records()
        .filter_map(|record| match record {
            Record::Text(text) => Some(text),
            _ => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(text.len(), 2);
    assert_eq!(text[0].start, 0);
    assert_eq!(text[0].bytes.len(), MAX_TEXT_LENGTH);
    assert_eq!(text[1].start, 0x1E);
    assert_eq!(text[1].bytes, b"45678".to_vec());

    let output = program.to_string();
    assert!(output.contains("\nT0000001E4142"));
    assert!(output.contains("\nT00001E053435363738\n"));
}

#[test]
fn test_object_file_errors() {
    let err = object::Program::parse("T00000001FF\nE000000\n").unwrap_err();
    assert_eq!(err.kind(), Some(&ErrorKind::MissingHeader));

    let input = "HPROG  000000000001\nT00000001FF\n";
    let err = object::Program::parse(input).unwrap_err();
    assert_eq!(err.kind(), Some(&ErrorKind::MissingEnd));

    let input = "HPROG  000000000001\nT00000001FF\nX123\nE000000\n";
    let err = object::Program::parse(input).unwrap_err();
    assert!(matches!(err.kind(), Some(ErrorKind::MalformedRecord(_))));
    assert_eq!(err.verbose(input).line, 3);
}

#[test]
fn test_text_records_hold_whole_instructions() {
    let mut source = String::from("        FIX\n");

    for _ in 0..10 {
        source.push_str("        LDA     #1\n");
    }

    let listing = Program::parse(&source)
        .unwrap()
        .compile_with_listing()
        .unwrap();

    let starts = listing
        .entries()
        .iter()
        .map(|entry| entry.location)
        .collect::<Vec<_>>();

    let program = listing.into_inner();

    assert_eq!(program.text.len(), 2);
    assert_eq!(program.text[0].bytes.len(), 28);
    assert_eq!(program.text[1].start, 0x1C);
    assert_eq!(program.text[1].bytes, vec![0x01, 0x00, 0x01]);

    for text in &program.text {
        assert!(starts.contains(&text.start));
        assert!(starts.contains(&text.end()) || text.end() == 0x1F);
    }

    assert!(program.to_string().contains("\nT00001C03010001\n"));
}
