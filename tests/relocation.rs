use sicxe::{
    emulator::{Emulator, SimError, TestIo},
    instruction::Register,
    object::{self, Modification, Sign},
    symbolic::Program,
};

fn assemble() -> object::Program {
    Program::parse(include_str!("relocate.asm"))
        .unwrap()
        .compile()
        .unwrap()
}

#[test]
fn test_relocate_modification_records() {
    let program = assemble();

    assert_eq!(program.header.start, 0x1000);
    assert_eq!(program.header.length, 0x1C);
    assert_eq!(program.entry, 0x1000);
    assert!(program.to_string().contains("\nM00100105\nM00101306\nE001000\n"));
}

#[test]
fn test_relocate_run_in_place() {
    let mut emulator = Emulator::new(TestIo::new());
    emulator.load(&assemble()).unwrap();
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::A), 42);
    assert_eq!(emulator.context.get(Register::S), 7);
    assert_eq!(emulator.memory.get_word(0x1019).unwrap(), 42);
}

#[test]
fn test_relocate_run_elsewhere() {
    let mut emulator = Emulator::new(TestIo::new());
    emulator.load_at(&assemble(), 0x4000).unwrap();

    assert_eq!(emulator.context.pc(), 0x4000);
    assert_eq!(emulator.memory.read(0x4000, 4).unwrap(), &[0x4B, 0x10, 0x40, 0x0D]);
    assert_eq!(emulator.memory.get_word(0x4013).unwrap(), 0x4016);

    emulator.run().unwrap();

    assert!(emulator.halted);
    assert_eq!(emulator.context.get(Register::A), 42);
    assert_eq!(emulator.context.get(Register::S), 7);
    assert_eq!(emulator.context.get(Register::L), 0x4004);
    assert_eq!(emulator.memory.get_word(0x4019).unwrap(), 42);

    // The original location was never touched.
    assert_eq!(emulator.memory.get_word(0x1019).unwrap(), 0);
}

#[test]
fn test_relocate_external_symbol() {
    let mut program = assemble();
    program.modifications.push(Modification {
        address: 0x1001,
        half_bytes: 5,
        symbol: Some((Sign::Plus, "OTHER".into())),
    });

    let mut emulator = Emulator::new(TestIo::new());
    let err = emulator.load_at(&program, 0x4000).unwrap_err();

    assert!(matches!(err, SimError::UnsupportedModification(ref name) if name == "OTHER"));
    assert_eq!(emulator.memory.get_byte(0x4000).unwrap(), 0);
}

#[test]
fn test_relocate_out_of_memory() {
    let mut emulator = Emulator::new(TestIo::new());
    let err = emulator.load_at(&assemble(), 0xFFFF0).unwrap_err();

    assert!(matches!(err, SimError::AddressOutOfRange { .. }));
    assert_eq!(emulator.memory.get_byte(0xFFFF0).unwrap(), 0);
}
