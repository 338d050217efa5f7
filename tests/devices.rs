use sicxe::{
    emulator::{DeviceError, Emulator, SimError, TestIo, STDOUT},
    event::Event,
    instruction::Register,
    symbolic::Program,
};

use std::sync::{Arc, Mutex};

fn load(source: &str, io: TestIo) -> Emulator<TestIo> {
    let program = Program::parse(source).unwrap().compile().unwrap();

    let mut emulator = Emulator::new(io);
    emulator.load(&program).unwrap();
    emulator
}

#[test]
fn test_echo() {
    let source = include_str!("echo.asm");
    let count = Program::parse(source)
        .unwrap()
        .symbol_table
        .resolve("COUNT")
        .unwrap()
        .value as u32;

    let mut emulator = load(source, TestIo::with_input(0xF1, b"hi!".iter().copied()));

    let writes = Arc::new(Mutex::new(Vec::new()));
    let sink = writes.clone();

    emulator.add_listener(move |event: &Event| {
        if let Event::DeviceWrite { device, data } = event {
            sink.lock().unwrap().push((*device, *data));
        }
    });

    emulator.run().unwrap();

    assert_eq!(emulator.io.output(STDOUT), b"hi!");
    assert_eq!(emulator.context.get(Register::X), 3);
    assert_eq!(emulator.memory.get_word(count).unwrap(), 3);
    assert_eq!(
        *writes.lock().unwrap(),
        vec![(1, b'h'), (1, b'i'), (1, b'!')]
    );
}

#[test]
fn test_write_hello() {
    let source = r#"
        LDA     #72
        WD      #1
        LDA     #73
        WD      #1
        RSUB
"#;

    let mut emulator = load(source, TestIo::new());
    emulator.run().unwrap();

    assert_eq!(emulator.io.output(1), b"HI");
}

#[test]
fn test_read_keeps_upper_bytes() {
    let source = r#"
        +LDA    #4096
        RD      #241
        RSUB
"#;

    let mut emulator = load(source, TestIo::with_input(0xF1, vec![0x41]));
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::A), 0x1041);
}

#[test]
fn test_read_from_output_device() {
    let source = r#"
        RD      #1
        RSUB
"#;

    let mut emulator = load(source, TestIo::new());
    let err = emulator.run().unwrap_err();

    assert!(matches!(err, SimError::Device(DeviceError::NotReadable(1))));
    assert_eq!(emulator.context.pc(), 0);
    assert!(!emulator.halted);
}
