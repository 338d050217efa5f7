use std::fs::{self, File};

use slog::{o, Drain, Logger};

use sicxe::{
    compiler,
    emulator::{Emulator, TestIo},
    instruction::Register,
    object::{self, Record},
    symbolic::Program,
    word,
};

fn assemble() -> object::Program {
    Program::parse(include_str!("sum.asm"))
        .unwrap()
        .compile()
        .unwrap()
}

fn run(program: &object::Program) -> Emulator<TestIo> {
    let mut emulator = Emulator::new(TestIo::new());
    emulator.load(program).unwrap();
    emulator.run().unwrap();
    emulator
}

#[test]
fn test_sum_assemble() {
    let program = assemble();
    let records = program.records().collect::<Vec<_>>();

    assert_eq!(records.len(), 3);
    assert!(matches!(&records[0], Record::Header(header) if header.start == 0x1000));
    assert!(matches!(&records[1], Record::Text(text) if text.start == 0x1000));
    assert!(matches!(&records[2], Record::End(0x1000)));

    let text = program.to_string();
    assert!(text.starts_with("HPROG  001000"));
}

#[test]
fn test_sum_run() {
    let source = Program::parse(include_str!("sum.asm")).unwrap();
    let result = source.symbol_table.resolve("RESULT").unwrap().value as u32;

    let emulator = run(&source.compile().unwrap());

    assert!(emulator.halted);
    assert_eq!(emulator.context.get(Register::A), 8);
    assert_eq!(
        word::encode_word(emulator.memory.get_word(result).unwrap() as i64),
        "000008"
    );
}

#[test]
fn test_sum_round_trip_through_file() {
    let program = assemble();

    let path = std::env::temp_dir().join(format!("sicxe-sum-{}.obj", std::process::id()));
    program.write(File::create(&path).unwrap()).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let from_disk = object::Program::parse(&text).unwrap();
    let from_memory = object::Program::parse(&program.to_string()).unwrap();

    assert_eq!(from_disk, program);
    assert_eq!(from_memory, program);

    let a = run(&from_disk);
    let b = run(&from_memory);

    assert_eq!(a.context, b.context);
    assert_eq!(a.memory, b.memory);
}

#[test]
fn test_listing() {
    let listing = Program::parse(include_str!("sum.asm"))
        .unwrap()
        .compile_with_listing()
        .unwrap();

    let line = listing.get_source_line(0x1004).unwrap();
    assert_eq!(line.line, 4);
    assert_eq!(line.bytes, vec![0x19, 0x00, 0x03]);
    assert_eq!(line.source.trim(), "ADD     #3");
}

fn test_logger() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!("test" => "sum"))
}

#[test]
fn test_sum_with_logger() {
    let logger = test_logger();

    let source = Program::parse_with_logger(include_str!("sum.asm"), logger.clone()).unwrap();
    let program: object::Program = compiler::compile_with_logger(source, logger.clone()).unwrap();

    let mut emulator = Emulator::with_logger(TestIo::new(), logger);
    emulator.load(&program).unwrap();
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::A), 8);
    assert_eq!(emulator.steps(), 4);
}
