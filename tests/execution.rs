use sicxe::{
    emulator::{ConditionCode, Emulator, SimError, TestIo},
    instruction::Register,
    object,
    symbolic::Program,
};

fn load(source: &str) -> Emulator<TestIo> {
    let program = Program::parse(source).unwrap().compile().unwrap();

    let mut emulator = Emulator::new(TestIo::new());
    emulator.load(&program).unwrap();
    emulator
}

#[test]
fn test_unimplemented_instruction() {
    let mut emulator = load("  LDA #1\n  FIX\n");

    emulator.step().unwrap();
    let before = emulator.context.clone();

    let err = emulator.step().unwrap_err();

    assert!(matches!(err, SimError::NotImplemented("FIX")));
    assert_eq!(emulator.context, before);
    assert_eq!(emulator.context.pc(), 3);
}

#[test]
fn test_division_by_zero() {
    let mut emulator = load("  LDA #4\n  DIV #0\n  RSUB\n");
    let err = emulator.run().unwrap_err();

    assert!(matches!(err, SimError::DivisionByZero { address: 3 }));
    assert_eq!(emulator.context.get(Register::A), 4);
    assert_eq!(emulator.context.pc(), 3);
}

#[test]
fn test_store_out_of_memory() {
    let mut emulator = load("  LDA #9\n  +STA 1048575\n  RSUB\n");
    let before = emulator.memory.clone();

    let err = emulator.run().unwrap_err();

    assert!(matches!(err, SimError::AddressOutOfRange { .. }));
    assert_eq!(emulator.context.pc(), 3);
    assert_eq!(emulator.context.get(Register::A), 9);
    assert_eq!(emulator.memory, before);
}

#[test]
fn test_register_width() {
    let source = r#"
        +LDA    #1048575
        MUL     #16
        STA     RESULT
        RSUB
RESULT  RESW    1
"#;

    let mut emulator = load(source);
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::A), -16);
    assert_eq!(emulator.memory.read(0x0D, 3).unwrap(), &[0xFF, 0xFF, 0xF0]);
}

#[test]
fn test_unknown_opcode() {
    let program = object::Program::parse("HBAD   000000000003\nT00000003FF0000\nE000000\n").unwrap();

    let mut emulator = Emulator::new(TestIo::new());
    emulator.load(&program).unwrap();

    let err = emulator.step().unwrap_err();
    assert!(matches!(err, SimError::UnknownOpcode { address: 0, byte: 0xFF }));
}

#[test]
fn test_jump_to_self_halts() {
    let mut emulator = load("  LDA #1\nHERE  J HERE\n");
    emulator.run().unwrap();

    assert!(emulator.halted);
    assert_eq!(emulator.context.pc(), 3);
    assert_eq!(emulator.steps(), 3);
}

#[test]
fn test_indexed_loop() {
    let source = r#"
SUM     START   0
        CLEAR   X
        CLEAR   A
        LDT     #9
LOOP    ADD     TABLE,X
        TIX     #0
        TIX     #0
        TIX     #0
        COMPR   X,T
        JLT     LOOP
        STA     TOTAL
        RSUB
TABLE   WORD    1
        WORD    2
        WORD    7
TOTAL   RESW    1
"#;

    let mut emulator = load(source);
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::A), 10);
    assert_eq!(emulator.context.get(Register::X), 9);
    assert_eq!(emulator.memory.get_word(0x27).unwrap(), 10);
}

#[test]
fn test_byte_load_and_store() {
    let source = r#"
        +LDA    #4096
        LDCH    CHARS
        STCH    OUT
        RSUB
CHARS   BYTE    C'AB'
OUT     RESB    2
"#;

    let mut emulator = load(source);
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::A), 0x1041);
    assert_eq!(emulator.memory.read(0x0F, 2).unwrap(), &[0x41, 0x00]);
}

#[test]
fn test_float_register_transfer() {
    let source = r#"
        LDF     VALUE
        STF     COPY
        RSUB
VALUE   BYTE    X'80000000002A'
COPY    RESB    6
"#;

    let mut emulator = load(source);
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::F), -(1i64 << 47) + 42);
    assert_eq!(
        emulator.memory.read(0x0F, 6).unwrap(),
        &[0x80, 0x00, 0x00, 0x00, 0x00, 0x2A]
    );
}

#[test]
fn test_logic_and_subtract() {
    let source = r#"
        LDA     #255
        AND     #15
        OR      #48
        SUB     #100
        STA     RESULT
        RSUB
RESULT  RESW    1
"#;

    let mut emulator = load(source);
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::A), 63 - 100);
    assert_eq!(emulator.memory.read(0x12, 3).unwrap(), &[0xFF, 0xFF, 0xDB]);
}

#[test]
fn test_status_word_and_jgt() {
    let source = r#"
        LDA     #5
        COMP    #3
        STSW    STATUS
        JGT     TAKEN
        LDS     #1
TAKEN   LDT     #2
        RSUB
STATUS  RESW    1
"#;

    let mut emulator = load(source);
    emulator.run().unwrap();

    assert_eq!(emulator.context.condition_code(), Some(ConditionCode::Greater));
    assert_eq!(emulator.memory.get_word(0x15).unwrap(), 0x80);
    assert_eq!(emulator.context.get(Register::S), 0);
    assert_eq!(emulator.context.get(Register::T), 2);
}

#[test]
fn test_tixr_loop() {
    let source = r#"
        LDT     #3
LOOP    TIXR    T
        JLT     LOOP
        RSUB
"#;

    let mut emulator = load(source);
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::X), 3);
    assert_eq!(emulator.context.condition_code(), Some(ConditionCode::Equal));
    assert_eq!(emulator.steps(), 1 + 3 * 2 + 1);
}

#[test]
fn test_sic_addressing() {
    // LDX #2, then SIC-mode LDA 0x4100 and STA 0x4103,X, then RSUB.
    let program = object::Program::parse(
        "HSIC   000000004108\nT0000000C0500020041000CC1034F0000\nT0041000300002A\nE000000\n",
    )
    .unwrap();

    let mut emulator = Emulator::new(TestIo::new());
    emulator.load(&program).unwrap();
    emulator.run().unwrap();

    assert_eq!(emulator.context.get(Register::X), 2);
    assert_eq!(emulator.context.get(Register::A), 42);
    assert_eq!(emulator.memory.get_word(0x4105).unwrap(), 42);
}
