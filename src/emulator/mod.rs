//! [Emulator] for executing SIC/XE [object programs](crate::object::Program).

mod context;
mod decode;
mod error;
mod io;
mod memory;

pub use self::context::{ConditionCode, Context};
pub use self::decode::{decode, Instruction, Operands};
pub use self::error::{DeviceError, Location, SimError};
pub use self::io::{DeviceTable, InputOutput, TestIo, STDERR, STDIN, STDOUT};
pub use self::memory::Memory;

use std::cmp::Ordering;

use slog::{debug, info, o, trace, Discard, Logger};

use crate::event::{Event, EventDispatcher, EventListener};
use crate::instruction::{AddressingMode, OpCode, Register, TargetMode};
use crate::object::{self, Sign};
use crate::word::{self, MEMORY_SIZE, WORD_MASK};

/// Options controlling the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Halt when `RSUB` is executed with no subroutine call active, that is when the program
    /// returns to whatever loaded it. When `false`, this is a [SimError::EmptyCallStack].
    pub halt_on_return: bool,

    /// Maximum number of instructions [Emulator::run] executes before giving up.
    pub max_steps: Option<u64>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            halt_on_return: true,
            max_steps: None,
        }
    }
}

fn check_address(address: i64) -> Result<u32, SimError> {
    if address < 0 || address >= MEMORY_SIZE as i64 {
        return Err(SimError::AddressOutOfRange { address, length: 1 });
    }

    Ok(address as u32)
}

/// Utility struct for implementing methods in the context of emulating a single instruction.
///
/// Every instruction reads all of its operands before it writes anything, so an instruction
/// that fails has not modified the registers or the memory.
struct InstructionEmulationContext<'e, IO> {
    /// The emulator in whose context the instruction is being emulated.
    emulator: &'e mut Emulator<IO>,

    /// The instruction that we are currently emulating.
    instruction: Instruction,
}

impl<'e, IO> InstructionEmulationContext<'e, IO>
where
    IO: InputOutput,
{
    fn register(&self, register: Register) -> i64 {
        self.emulator.context.get(register)
    }

    fn mode(&self) -> AddressingMode {
        match self.instruction.operands {
            Operands::Memory { mode, .. } => mode,
            _ => AddressingMode::Simple,
        }
    }

    /// Computes the target address from the displacement, the relative addressing mode and the
    /// index register.
    fn target_address(&self) -> i64 {
        let (indexed, target, displacement) = match self.instruction.operands {
            Operands::Memory {
                indexed,
                target,
                displacement,
                ..
            } => (indexed, target, displacement),
            _ => return 0,
        };

        let mut address = match target {
            TargetMode::Direct => displacement as i64,
            TargetMode::PcRelative => {
                self.instruction.next() as i64 + word::sign_extend(displacement as u64, 12)
            }
            TargetMode::BaseRelative => {
                self.emulator.context.get_unsigned(Register::B) as i64 + displacement as i64
            }
        };

        if indexed {
            address += self.register(Register::X);
        }

        address
    }

    /// Address of the memory operand: the target address, dereferenced once for indirect
    /// addressing. Immediate operands have the target address as their address too, which is
    /// where stores and jumps land.
    fn operand_address(&self) -> Result<u32, SimError> {
        let target = self.target_address();

        match self.mode() {
            AddressingMode::Indirect => {
                let pointer = self.emulator.memory.get_word(check_address(target)?)?;
                check_address(pointer as i64 & WORD_MASK as i64)
            }
            _ => check_address(target),
        }
    }

    fn word_operand(&self) -> Result<i64, SimError> {
        if self.mode() == AddressingMode::Immediate {
            return Ok(self.target_address());
        }

        Ok(self.emulator.memory.get_word(self.operand_address()?)? as i64)
    }

    fn byte_operand(&self) -> Result<u8, SimError> {
        if self.mode() == AddressingMode::Immediate {
            return Ok(self.target_address() as u8);
        }

        self.emulator.memory.get_byte(self.operand_address()?)
    }

    fn double_operand(&self) -> Result<i64, SimError> {
        if self.mode() == AddressingMode::Immediate {
            return Ok(self.target_address());
        }

        self.emulator.memory.get_double(self.operand_address()?)
    }

    fn set_register(&mut self, register: Register, value: i64) -> Result<(), SimError> {
        self.emulator.context.set(register, value)?;

        self.emulator.dispatcher.dispatch(Event::RegisterChange {
            register,
            data: self.emulator.context.get(register),
        });

        Ok(())
    }

    fn set_low_byte(&mut self, register: Register, byte: u8) -> Result<(), SimError> {
        let value = self.emulator.context.get_unsigned(register) & !0xFF | byte as u64;
        self.set_register(register, Context::wrap(register, value as i64))
    }

    fn set_condition_code(&mut self, ordering: Ordering) {
        self.emulator
            .context
            .set_condition_code(ConditionCode::from_ordering(ordering));

        self.emulator.dispatcher.dispatch(Event::RegisterChange {
            register: Register::SW,
            data: self.emulator.context.get(Register::SW),
        });
    }

    fn store(&mut self, address: u32, data: &[u8]) -> Result<(), SimError> {
        self.emulator.memory.write(address, data)?;

        self.emulator.dispatcher.dispatch(Event::MemoryChange {
            address,
            data: data.to_vec(),
        });

        Ok(())
    }

    fn jump(&mut self, address: u32) {
        self.emulator.context.set_pc(address);
    }

    /// Increments X and returns the new value.
    fn increment_index(&self) -> i64 {
        Context::wrap(Register::X, self.register(Register::X) + 1)
    }

    fn shift_count(&self) -> u32 {
        match self.instruction.operands {
            Operands::Registers(_, n) => n as u32 + 1,
            _ => 0,
        }
    }

    /// Execute the instruction.
    fn emulate(&mut self) -> Result<(), SimError> {
        let opcode = self.instruction.opcode;
        let address = self.instruction.address;

        if !opcode.is_supported() {
            return Err(SimError::NotImplemented(opcode.mnemonic()));
        }

        match opcode {
            OpCode::LDA | OpCode::LDB | OpCode::LDL | OpCode::LDS | OpCode::LDT | OpCode::LDX => {
                let register = match opcode {
                    OpCode::LDA => Register::A,
                    OpCode::LDB => Register::B,
                    OpCode::LDL => Register::L,
                    OpCode::LDS => Register::S,
                    OpCode::LDT => Register::T,
                    _ => Register::X,
                };

                let value = self.word_operand()?;
                self.set_register(register, value)?;
            }

            OpCode::LDCH => {
                let byte = self.byte_operand()?;
                self.set_low_byte(Register::A, byte)?;
            }

            OpCode::LDF => {
                let value = self.double_operand()?;
                self.set_register(Register::F, value)?;
            }

            OpCode::STA
            | OpCode::STB
            | OpCode::STL
            | OpCode::STS
            | OpCode::STT
            | OpCode::STX
            | OpCode::STSW => {
                let register = match opcode {
                    OpCode::STA => Register::A,
                    OpCode::STB => Register::B,
                    OpCode::STL => Register::L,
                    OpCode::STS => Register::S,
                    OpCode::STT => Register::T,
                    OpCode::STX => Register::X,
                    _ => Register::SW,
                };

                let target = self.operand_address()?;
                let bytes = word::word_to_bytes(self.register(register));
                self.store(target, &bytes)?;
            }

            OpCode::STCH => {
                let target = self.operand_address()?;
                let byte = self.emulator.context.get_unsigned(Register::A) as u8;
                self.store(target, &[byte])?;
            }

            OpCode::STF => {
                let target = self.operand_address()?;
                let raw = self.emulator.context.get_unsigned(Register::F);
                let mut bytes = [0u8; 6];

                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = (raw >> (8 * (5 - i))) as u8;
                }

                self.store(target, &bytes)?;
            }

            OpCode::ADD | OpCode::SUB | OpCode::MUL | OpCode::DIV | OpCode::AND | OpCode::OR => {
                let a = self.register(Register::A);
                let operand = self.word_operand()?;

                let result = match opcode {
                    OpCode::ADD => a + operand,
                    OpCode::SUB => a - operand,
                    OpCode::MUL => a * operand,
                    OpCode::DIV if operand == 0 => return Err(SimError::DivisionByZero { address }),
                    OpCode::DIV => a / operand,
                    OpCode::AND => a & operand,
                    _ => a | operand,
                };

                self.set_register(Register::A, Context::wrap(Register::A, result))?;
            }

            OpCode::ADDR | OpCode::SUBR | OpCode::MULR | OpCode::DIVR => {
                let r1 = self.instruction.r1()?;
                let r2 = self.instruction.r2()?;
                let (v1, v2) = (self.register(r1), self.register(r2));

                let result = match opcode {
                    OpCode::ADDR => v2.wrapping_add(v1),
                    OpCode::SUBR => v2.wrapping_sub(v1),
                    OpCode::MULR => v2.wrapping_mul(v1),
                    _ if v1 == 0 => return Err(SimError::DivisionByZero { address }),
                    _ => v2 / v1,
                };

                self.set_register(r2, Context::wrap(r2, result))?;
            }

            OpCode::CLEAR => {
                let r1 = self.instruction.r1()?;
                self.set_register(r1, 0)?;
            }

            OpCode::RMO => {
                let r1 = self.instruction.r1()?;
                let r2 = self.instruction.r2()?;
                let value = self.register(r1);
                self.set_register(r2, value)?;
            }

            OpCode::SHIFTL => {
                let r1 = self.instruction.r1()?;
                let n = self.shift_count();
                let width = r1.width();
                let mask = (1u64 << width) - 1;
                let value = self.emulator.context.get_unsigned(r1);

                let rotated = (value << n | value >> (width - n)) & mask;
                self.set_register(r1, word::sign_extend(rotated, width))?;
            }

            OpCode::SHIFTR => {
                let r1 = self.instruction.r1()?;
                let n = self.shift_count();
                let value = self.register(r1) >> n;
                self.set_register(r1, value)?;
            }

            OpCode::COMP => {
                let operand = self.word_operand()?;
                let a = self.register(Register::A);
                self.set_condition_code(a.cmp(&operand));
            }

            OpCode::COMPR => {
                let r1 = self.instruction.r1()?;
                let r2 = self.instruction.r2()?;
                let ordering = self.register(r1).cmp(&self.register(r2));
                self.set_condition_code(ordering);
            }

            OpCode::TIX => {
                let operand = self.word_operand()?;
                let x = self.increment_index();
                self.set_register(Register::X, x)?;
                self.set_condition_code(x.cmp(&operand));
            }

            OpCode::TIXR => {
                let r1 = self.instruction.r1()?;
                let x = self.increment_index();
                let other = if r1 == Register::X { x } else { self.register(r1) };
                self.set_register(Register::X, x)?;
                self.set_condition_code(x.cmp(&other));
            }

            OpCode::J => {
                let target = self.operand_address()?;
                let halt = self.emulator.last_jump == Some(target);

                self.jump(target);
                self.emulator.last_jump = Some(target);

                if halt {
                    self.emulator.halt(address);
                }
            }

            OpCode::JEQ | OpCode::JGT | OpCode::JLT => {
                let condition = match opcode {
                    OpCode::JEQ => ConditionCode::Equal,
                    OpCode::JGT => ConditionCode::Greater,
                    _ => ConditionCode::Less,
                };

                if self.emulator.context.condition_code() == Some(condition) {
                    let target = self.operand_address()?;
                    self.jump(target);
                }
            }

            OpCode::JSUB => {
                let target = self.operand_address()?;
                let return_address = self.instruction.next();

                self.set_register(Register::L, return_address as i64)?;
                self.emulator.call_stack.push(return_address);
                self.jump(target);
            }

            OpCode::RSUB => {
                if self.emulator.call_stack.pop().is_none() {
                    if self.emulator.config.halt_on_return {
                        self.emulator.halt(address);
                        return Ok(());
                    }

                    return Err(SimError::EmptyCallStack { address });
                }

                let return_address = self.emulator.context.get_unsigned(Register::L) as u32;
                self.jump(return_address);

                if let Some(caller) = self.emulator.call_stack.last().copied() {
                    self.set_register(Register::L, caller as i64)?;
                }
            }

            OpCode::RD => {
                let device = self.byte_operand()?;
                let byte = self.emulator.io.read(device)?;
                self.set_low_byte(Register::A, byte)?;
            }

            OpCode::WD => {
                let device = self.byte_operand()?;
                let data = self.emulator.context.get_unsigned(Register::A) as u8;

                self.emulator.io.write(device, data)?;
                self.emulator
                    .dispatcher
                    .dispatch(Event::DeviceWrite { device, data });
            }

            OpCode::TD => {
                let device = self.byte_operand()?;
                let ready = self.emulator.io.test(device)?;

                trace!(self.emulator.logger, "device tested"; "device" => device, "ready" => ready);
            }

            other => return Err(SimError::NotImplemented(other.mnemonic())),
        }

        Ok(())
    }
}

/// The emulator contains all neccessary context for executing a SIC/XE program
/// and interfaces for doing IO.
pub struct Emulator<IO> {
    /// The memory of the emulated machine.
    pub memory: Memory,

    /// The execution context, which includes the registers of the CPU.
    pub context: Context,

    /// Interface for device operations.
    pub io: IO,

    /// True if the execution has been halted.
    pub halted: bool,

    pub config: Config,

    /// Return addresses of the active `JSUB` calls.
    call_stack: Vec<u32>,

    /// Target of the previous instruction if it was a `J`.
    last_jump: Option<u32>,

    /// Instructions executed since the program was loaded.
    steps: u64,

    dispatcher: EventDispatcher,
    logger: Logger,
}

impl<IO> Emulator<IO>
where
    IO: InputOutput,
{
    /// Create a new emulator with zeroed memory and registers.
    pub fn new(io: IO) -> Emulator<IO> {
        Emulator::with_logger(io, None)
    }

    pub fn with_logger<L>(io: IO, logger: L) -> Emulator<IO>
    where
        L: Into<Option<Logger>>,
    {
        let mut emulator = Emulator {
            memory: Memory::new(),
            context: Context::new(),
            io,
            halted: false,
            config: Config::default(),
            call_stack: Vec::new(),
            last_jump: None,
            steps: 0,
            dispatcher: EventDispatcher::new(),
            logger: Logger::root(Discard, o!()),
        };

        emulator.set_logger(logger);
        emulator
    }

    pub fn set_logger<L>(&mut self, logger: L)
    where
        L: Into<Option<Logger>>,
    {
        self.logger = logger
            .into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("stage" => "emulation"));
    }

    /// Registers a listener that is called for every [Event] the execution produces.
    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.dispatcher.add_listener(listener);
    }

    pub fn call_stack(&self) -> &[u32] {
        &self.call_stack
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Loads a program at the start address of its header.
    pub fn load(&mut self, program: &object::Program) -> Result<(), SimError> {
        self.load_at(program, program.header.start)
    }

    /// Loads a program at `address`, applying its modification records if `address` differs
    /// from the start address of the program. The program counter is set to the entry point.
    ///
    /// Nothing is written if any part of the program does not fit in memory.
    pub fn load_at(&mut self, program: &object::Program, address: u32) -> Result<(), SimError> {
        let offset = address as i64 - program.header.start as i64;

        let out_of_range = |start: i64, length: u32| {
            start < 0 || start + length as i64 > MEMORY_SIZE as i64
        };

        for text in &program.text {
            let start = text.start as i64 + offset;

            if out_of_range(start, text.bytes.len() as u32) {
                return Err(SimError::AddressOutOfRange {
                    address: start,
                    length: text.bytes.len() as u32,
                });
            }
        }

        for modification in &program.modifications {
            if let Some((_, symbol)) = &modification.symbol {
                if *symbol != program.header.name {
                    return Err(SimError::UnsupportedModification(symbol.clone()));
                }
            }

            let start = modification.address as i64 + offset;
            let length = (modification.half_bytes.min(16) as u32 + 1) / 2;

            if out_of_range(start, length) {
                return Err(SimError::AddressOutOfRange { address: start, length });
            }
        }

        for text in &program.text {
            self.memory
                .write((text.start as i64 + offset) as u32, &text.bytes)?;
        }

        if offset != 0 {
            for modification in &program.modifications {
                self.relocate(modification, offset)?;
            }
        }

        let entry = program.entry as i64 + offset;

        self.context.set_pc(check_address(entry)?);
        self.halted = false;
        self.call_stack.clear();
        self.last_jump = None;
        self.steps = 0;

        debug!(self.logger, "program loaded";
            "name" => &program.header.name,
            "address" => format!("{:06X}", address),
            "length" => format!("{:06X}", program.header.length),
            "entry" => format!("{:06X}", entry),
            "modifications" => program.modifications.len());

        Ok(())
    }

    /// Adds `offset` to the half-bytes named by a modification record.
    fn relocate(&mut self, modification: &object::Modification, offset: i64) -> Result<(), SimError> {
        let half_bytes = modification.half_bytes.min(16) as u32;
        let length = (half_bytes + 1) / 2;
        let address = (modification.address as i64 + offset) as u32;

        let raw = self
            .memory
            .read(address, length)?
            .iter()
            .fold(0u64, |acc, byte| acc << 8 | *byte as u64);

        let mask = if half_bytes >= 16 {
            u64::max_value()
        } else {
            (1u64 << (4 * half_bytes)) - 1
        };

        let delta = match modification.symbol {
            Some((Sign::Minus, _)) => -offset,
            _ => offset,
        };

        let field = (raw & mask).wrapping_add(delta as u64) & mask;
        let raw = raw & !mask | field;

        let bytes = (0..length)
            .map(|i| (raw >> (8 * (length - 1 - i))) as u8)
            .collect::<Vec<_>>();

        trace!(self.logger, "relocate";
            "address" => format!("{:06X}", address),
            "half_bytes" => half_bytes);

        self.memory.write(address, &bytes)
    }

    /// Decodes the instruction at `address` without executing it.
    pub fn decode_at(&self, address: u32) -> Result<Instruction, SimError> {
        decode(&self.memory, address)
    }

    /// Fetches the instruction from the address pointed by the Program Counter register.
    pub fn get_current_instruction(&self) -> Result<Instruction, SimError> {
        self.decode_at(self.context.pc())
    }

    /// Returns the device the next instruction reads from if it is an `RD`. Nothing is executed.
    pub fn pending_read(&mut self) -> Result<Option<u8>, SimError> {
        let instruction = self.get_current_instruction()?;

        if instruction.opcode != OpCode::RD {
            return Ok(None);
        }

        InstructionEmulationContext {
            emulator: self,
            instruction,
        }
        .byte_operand()
        .map(Some)
    }

    fn halt(&mut self, address: u32) {
        self.halted = true;

        info!(self.logger, "halted";
            "address" => format!("{:06X}", address),
            "steps" => self.steps + 1);

        self.dispatcher.dispatch(Event::Halt { address });
    }

    /// Fetches the next instruction, increments the program counter and executes the instruction.
    ///
    /// # Errors
    /// Returns the error that prevented the instruction from executing. The program counter is
    /// left pointing at the failed instruction and the rest of the state is unchanged.
    pub fn step(&mut self) -> Result<(), SimError> {
        if self.halted {
            return Ok(());
        }

        let address = self.context.pc();
        let instruction = self.get_current_instruction()?;

        trace!(self.logger, "execute";
            "address" => format!("{:06X}", address),
            "instruction" => %instruction);

        self.context.set_pc(instruction.next());

        let result = InstructionEmulationContext {
            emulator: self,
            instruction,
        }
        .emulate();

        match result {
            Ok(()) => {
                if instruction.opcode != OpCode::J {
                    self.last_jump = None;
                }

                self.steps += 1;
                Ok(())
            }
            Err(err) => {
                self.context.set_pc(address);
                debug!(self.logger, "instruction failed";
                    "address" => format!("{:06X}", address),
                    "error" => %err);
                Err(err)
            }
        }
    }

    /// Executes the program until it halts the execution or the step limit is reached.
    ///
    /// # Errors
    /// Returns the first error encountered while executing an instruction.
    pub fn run(&mut self) -> Result<(), SimError> {
        while !self.halted {
            if let Some(limit) = self.config.max_steps {
                if self.steps >= limit {
                    return Err(SimError::StepLimit(limit));
                }
            }

            self.step()?;
        }

        Ok(())
    }
}

#[cfg(test)]
fn load_source(source: &str) -> Emulator<TestIo> {
    let program = crate::symbolic::Program::parse(source)
        .unwrap()
        .compile()
        .unwrap();

    let mut emulator = Emulator::new(TestIo::new());
    emulator.load(&program).unwrap();
    emulator
}

#[cfg(test)]
fn run_source(source: &str) -> Emulator<TestIo> {
    let mut emulator = load_source(source);
    emulator.run().unwrap();
    emulator
}

#[test]
fn test_register_instructions() {
    let emulator = run_source(
        r#"
        START   0
        LDA     #10
        LDS     #3
        ADDR    S,A
        LDT     #2
        MULR    T,A
        SUBR    S,A
        DIVR    T,A
        RMO     A,X
        CLEAR   A
        LDS     TOP
        SHIFTL  S,4
        LDT     NEG
        SHIFTR  T,2
        COMPR   X,T
HALT    J       HALT
TOP     WORD    X'800001'
NEG     WORD    -16
"#,
    );

    let context = &emulator.context;
    assert!(emulator.halted);
    assert_eq!(context.get(Register::A), 0);
    assert_eq!(context.get(Register::X), 11);
    assert_eq!(context.get(Register::S), 0x18);
    assert_eq!(context.get(Register::T), -4);
    assert_eq!(context.condition_code(), Some(ConditionCode::Greater));
}

#[test]
fn test_nested_subroutines() {
    let source = r#"
        START   100
        JSUB    OUTER
        STA     RESULT
        RSUB
OUTER   LDA     #1
        JSUB    INNER
        ADD     #10
        RSUB
INNER   ADD     #100
        RSUB
RESULT  RESW    1
"#;

    let emulator = run_source(source);

    assert!(emulator.halted);
    assert_eq!(emulator.context.get(Register::A), 111);
    assert_eq!(emulator.context.get(Register::L), 0x103);
    assert_eq!(emulator.memory.get_word(0x11B).unwrap(), 111);
    assert!(emulator.call_stack().is_empty());

    let program = crate::symbolic::Program::parse(source)
        .unwrap()
        .compile()
        .unwrap();

    let mut emulator = Emulator::new(TestIo::new());
    emulator.config.halt_on_return = false;
    emulator.load(&program).unwrap();

    assert!(matches!(
        emulator.run(),
        Err(SimError::EmptyCallStack { address: 0x106 })
    ));
    assert_eq!(emulator.context.pc(), 0x106);
}

#[test]
fn test_addressing_modes() {
    let emulator = run_source(
        r#"
        START   0
        LDX     #3
        LDA     TABLE,X
        LDS     @PTR
        +LDT    TABLE
        +LDB    #FAR
        BASE    FAR
        STA     @PTR
        STA     FAR
HALT    J       HALT
PTR     WORD    THIRD
TABLE   WORD    10
        WORD    20
THIRD   WORD    30
        RESB    4096
FAR     RESW    1
"#,
    );

    let context = &emulator.context;
    assert_eq!(context.get(Register::A), 20);
    assert_eq!(context.get(Register::S), 30);
    assert_eq!(context.get(Register::T), 10);
    assert_eq!(context.get(Register::B), 0x1026);

    assert_eq!(emulator.memory.get_word(0x23).unwrap(), 20);
    assert_eq!(emulator.memory.get_word(0x1026).unwrap(), 20);
}

#[test]
fn test_step_limit() {
    let program = crate::symbolic::Program::parse(
        r#"
LOOP    TIX     #0
        J       LOOP
"#,
    )
    .unwrap()
    .compile()
    .unwrap();

    let mut emulator = Emulator::new(TestIo::new());
    emulator.config.max_steps = Some(10);
    emulator.load(&program).unwrap();

    assert!(matches!(emulator.run(), Err(SimError::StepLimit(10))));
    assert_eq!(emulator.steps(), 10);
    assert!(!emulator.halted);
    assert_eq!(emulator.context.get(Register::X), 5);
}

#[test]
fn test_events() {
    use std::sync::{Arc, Mutex};

    let program = crate::symbolic::Program::parse("  LDA #7\n  STA 100\nH J H\n")
        .unwrap()
        .compile()
        .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let mut emulator = Emulator::new(TestIo::new());
    emulator.add_listener(move |event: &Event| sink.lock().unwrap().push(event.clone()));
    emulator.load(&program).unwrap();
    emulator.run().unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        events[..],
        [
            Event::RegisterChange { register: Register::A, data: 7 },
            Event::MemoryChange { address: 100, data: vec![0, 0, 7] },
            Event::Halt { address: 6 },
        ]
    );
}

#[test]
fn test_pending_read() {
    let source = r#"
        LDA     #1
        RD      DEVICE
        RSUB
DEVICE  BYTE    X'F3'
"#;

    let mut emulator = load_source(source);

    assert_eq!(emulator.pending_read().unwrap(), None);
    emulator.step().unwrap();
    assert_eq!(emulator.pending_read().unwrap(), Some(0xF3));
    assert_eq!(emulator.context.pc(), 3);
    assert_eq!(emulator.steps(), 1);
}
