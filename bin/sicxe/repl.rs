use std::fmt;
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use itertools::Itertools;
use slog::{debug, Logger};

use sicxe::{
    emulator::{DeviceTable, Emulator, SimError, STDIN},
    instruction::Register,
    word,
};

use crate::console;
use crate::freerun::FreeRun;
use crate::Error;

const HELP: &str = "\
Available commands:
  r, regs                   Print the registers
  w, word <addr>            Print the word at an address
  b, byte <addr>            Print the byte at an address
  sw, setword <addr> <val>  Write a word
  sb, setbyte <addr> <val>  Write a byte
  m, mem <lo> <hi>          Dump the memory between two addresses
  sr, setreg <reg> <val>    Set a register, by name or number
  s, step                   Execute one instruction and print the registers
  e, exec                   Execute one instruction
  d, dis [addr]             Disassemble, starting from PC by default
  run                       Run until the program halts
  bt, begin                 Start running in the background
  et, end                   Stop running in the background
  h, help                   Print this help
  q, quit                   Exit
Numbers are decimal or hexadecimal with the 0x prefix.
While a background run waits for input on device 0, typed lines other than 'et' go to the
program.";

/// Number of instructions printed by `dis`.
const DISASSEMBLY_LENGTH: usize = 8;

#[derive(Debug)]
enum CommandError {
    Unknown(String),
    Usage(&'static str),
    InvalidNumber(String),
    InvalidRegister(String),
    Busy,
    Simulation(SimError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandError::Unknown(cmd) => write!(f, "unknown command '{}', type 'h' for help", cmd),
            CommandError::Usage(usage) => write!(f, "usage: {}", usage),
            CommandError::InvalidNumber(text) => write!(f, "invalid number: {}", text),
            CommandError::InvalidRegister(text) => write!(f, "invalid register: {}", text),
            CommandError::Busy => write!(f, "the program is running in the background, stop it with 'et'"),
            CommandError::Simulation(err) => write!(f, "{}", err),
        }
    }
}

impl From<SimError> for CommandError {
    fn from(err: SimError) -> CommandError {
        CommandError::Simulation(err)
    }
}

fn parse_number(text: &str) -> Result<i64, CommandError> {
    let invalid = || CommandError::InvalidNumber(text.to_string());

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).map_err(|_| invalid())?,
        None => digits.parse::<i64>().map_err(|_| invalid())?,
    };

    Ok(if negative { -value } else { value })
}

fn parse_address(text: &str) -> Result<u32, CommandError> {
    let value = parse_number(text)?;

    if !word::is_address(value) {
        return Err(SimError::AddressOutOfRange { address: value, length: 1 }.into());
    }

    Ok(value as u32)
}

fn parse_register(text: &str) -> Result<Register, CommandError> {
    if let Ok(register) = text.parse::<Register>() {
        return Ok(register);
    }

    let id = parse_number(text).map_err(|_| CommandError::InvalidRegister(text.to_string()))?;

    if id < 0 || id > 0xFF {
        return Err(CommandError::InvalidRegister(text.to_string()));
    }

    Register::from_index(id as u8).ok_or_else(|| SimError::InvalidRegister(id as u8).into())
}

fn is_stop_command(line: &str) -> bool {
    matches!(line.trim(), "et" | "end")
}

/// Interactive inspection of a loaded program.
pub struct Repl {
    emulator: Arc<Mutex<Emulator<DeviceTable>>>,
    freerun: Option<FreeRun>,
    tick: Duration,
    logger: Logger,
    lines: Receiver<Vec<u8>>,
}

impl Repl {
    pub fn new(emulator: Arc<Mutex<Emulator<DeviceTable>>>, tick: Duration, logger: Logger) -> Repl {
        Repl {
            emulator,
            freerun: None,
            tick,
            logger,
            lines: console::lines(),
        }
    }

    fn emulator(&self) -> MutexGuard<Emulator<DeviceTable>> {
        self.emulator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_stopped(&self) -> Result<(), CommandError> {
        match self.freerun {
            Some(_) => Err(CommandError::Busy),
            None => Ok(()),
        }
    }

    /// Reports the result of a background run that stopped on its own. Returns `true` if
    /// something was printed.
    fn collect_freerun(&mut self) -> bool {
        if !self.freerun.as_ref().map(FreeRun::is_finished).unwrap_or(false) {
            return false;
        }

        match self.freerun.take() {
            Some(freerun) => {
                println!();
                self.report_freerun(freerun.join());
                true
            }
            None => false,
        }
    }

    /// Takes a line from the prompt for the program if the next instruction reads standard
    /// input, so that `RD` does not compete with the prompt for it.
    fn supply_input(&mut self) -> Result<(), CommandError> {
        let needs_input = {
            let mut emulator = self.emulator();
            emulator.pending_read()? == Some(STDIN) && !emulator.io.has_input(STDIN)
        };

        if needs_input {
            print!("input> ");
            let _ = io::stdout().flush();

            // At the end of input nothing is fed and the read gets 0.
            if let Ok(line) = self.lines.recv() {
                self.emulator().io.feed(STDIN, line);
            }
        }

        Ok(())
    }

    fn step(&mut self) -> Result<(), CommandError> {
        self.supply_input()?;
        self.emulator().step()?;
        Ok(())
    }

    fn run_to_halt(&mut self) -> Result<(), CommandError> {
        loop {
            {
                let emulator = self.emulator();

                if emulator.halted {
                    return Ok(());
                }

                if let Some(limit) = emulator.config.max_steps {
                    if emulator.steps() >= limit {
                        return Err(SimError::StepLimit(limit).into());
                    }
                }
            }

            self.step()?;
        }
    }

    fn report_freerun(&self, result: Result<(), Error>) {
        match result {
            Ok(()) if self.emulator().halted => println!("halted"),
            Ok(()) => println!("stopped at {:06X}", self.emulator().context.pc()),
            Err(err) => println!("background run stopped: {}", err),
        }
    }

    fn print_registers(&self) {
        print!("{}", self.emulator().context);
    }

    fn disassemble(&self, start: u32) {
        let emulator = self.emulator();
        let mut address = start;

        for _ in 0..DISASSEMBLY_LENGTH {
            match emulator.decode_at(address) {
                Ok(instruction) => {
                    let bytes = emulator
                        .memory
                        .read(address, instruction.length)
                        .map(|bytes| bytes.iter().map(|byte| format!("{:02X}", byte)).join(""))
                        .unwrap_or_default();

                    let marker = if address == emulator.context.pc() { ">" } else { " " };

                    println!("{} {:06X}  {:<8}  {}", marker, address, bytes, instruction);
                    address = instruction.next();
                }
                Err(err) => {
                    println!("  {:06X}  {}", address, err);
                    break;
                }
            }
        }
    }

    /// Executes a command. Returns `false` when the REPL should exit.
    fn handle_command(&mut self, line: &str) -> Result<bool, CommandError> {
        let words = line.split_whitespace().collect::<Vec<_>>();

        let (command, args) = match words.split_first() {
            Some((command, args)) => (*command, args),
            None => return Ok(true),
        };

        debug!(self.logger, "command"; "command" => command, "args" => args.len());

        match (command, args) {
            ("h", _) | ("help", _) => println!("{}", HELP),
            ("q", _) | ("quit", _) => return Ok(false),
            ("r", _) | ("regs", _) => self.print_registers(),
            ("w", [addr]) | ("word", [addr]) => {
                let addr = parse_address(addr)?;
                let value = self.emulator().memory.get_word(addr)?;
                println!("{:06X}: {} ({})", addr, word::encode_word(value as i64), value);
            }
            ("w", _) | ("word", _) => return Err(CommandError::Usage("word <addr>")),
            ("b", [addr]) | ("byte", [addr]) => {
                let addr = parse_address(addr)?;
                let value = self.emulator().memory.get_byte(addr)?;
                println!("{:06X}: {:02X} ({})", addr, value, value);
            }
            ("b", _) | ("byte", _) => return Err(CommandError::Usage("byte <addr>")),
            ("sw", [addr, value]) | ("setword", [addr, value]) => {
                let addr = parse_address(addr)?;
                let value = parse_number(value)?;
                self.emulator().memory.set_word(addr, value)?;
            }
            ("sw", _) | ("setword", _) => return Err(CommandError::Usage("setword <addr> <val>")),
            ("sb", [addr, value]) | ("setbyte", [addr, value]) => {
                let addr = parse_address(addr)?;
                let value = parse_number(value)?;

                if !word::is_byte(value) {
                    return Err(CommandError::InvalidNumber(value.to_string()));
                }

                self.emulator().memory.set_byte(addr, value as u8)?;
            }
            ("sb", _) | ("setbyte", _) => return Err(CommandError::Usage("setbyte <addr> <val>")),
            ("m", [lo, hi]) | ("mem", [lo, hi]) => {
                let lo = parse_address(lo)?;
                let hi = parse_address(hi)?;

                if hi < lo {
                    return Err(CommandError::Usage("mem <lo> <hi> with lo <= hi"));
                }

                let emulator = self.emulator();
                let bytes = emulator.memory.read(lo, hi - lo + 1)?;

                for (i, chunk) in bytes.chunks(16).enumerate() {
                    let hex = chunk.iter().map(|byte| format!("{:02X}", byte)).join(" ");
                    println!("{:06X}  {}", lo + 16 * i as u32, hex);
                }
            }
            ("m", _) | ("mem", _) => return Err(CommandError::Usage("mem <lo> <hi>")),
            ("sr", [register, value]) | ("setreg", [register, value]) => {
                let register = parse_register(register)?;
                let value = parse_number(value)?;
                self.emulator().context.set(register, value)?;
            }
            ("sr", _) | ("setreg", _) => return Err(CommandError::Usage("setreg <reg> <val>")),
            ("s", _) | ("step", _) => {
                self.ensure_stopped()?;
                self.step()?;
                self.print_registers();
            }
            ("e", _) | ("exec", _) => {
                self.ensure_stopped()?;
                self.step()?;
            }
            ("d", []) | ("dis", []) => {
                let pc = self.emulator().context.pc();
                self.disassemble(pc);
            }
            ("d", [addr]) | ("dis", [addr]) => self.disassemble(parse_address(addr)?),
            ("run", _) => {
                self.ensure_stopped()?;
                self.run_to_halt()?;
                println!("halted");
            }
            ("bt", _) | ("begin", _) => {
                self.ensure_stopped()?;
                self.freerun = Some(FreeRun::start(self.emulator.clone(), self.tick));
            }
            ("et", _) | ("end", _) => match self.freerun.take() {
                Some(freerun) => self.report_freerun(freerun.stop()),
                None => println!("not running"),
            },
            (other, _) => return Err(CommandError::Unknown(other.to_string())),
        }

        Ok(true)
    }

    pub fn run(mut self) -> Result<(), Error> {
        println!("Type 'h' for a list of all available commands");

        let mut prompt = true;

        loop {
            if self.collect_freerun() {
                prompt = true;
            }

            if prompt {
                print!("{:06X}> ", self.emulator().context.pc());
                let _ = io::stdout().flush();
                prompt = false;
            }

            let line = match self.lines.recv_timeout(console::POLL_INTERVAL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            prompt = true;
            let text = String::from_utf8_lossy(&line);

            if let Some(freerun) = &self.freerun {
                if freerun.is_waiting_for_input() && !is_stop_command(&text) {
                    freerun.send_input(line);
                    continue;
                }
            }

            match self.handle_command(&text) {
                Ok(true) => (),
                Ok(false) => break,
                Err(err) => eprintln!("error: {}", err),
            }
        }

        match self.freerun.take() {
            Some(freerun) => freerun.stop(),
            None => Ok(()),
        }
    }
}
