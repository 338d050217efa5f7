mod console;
mod freerun;
mod repl;

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use slog::{debug, info, o, Drain, Level, Logger};
use slog_term::{CompactFormat, FullFormat, TermDecorator};

use sicxe::{
    compiler::compile_with_logger,
    emulator::{DeviceTable, Emulator, SimError},
    error::AsmError,
    object,
    source_map::SourceMap,
    symbolic,
};

#[derive(Debug)]
pub enum Error {
    Usage(String),
    Io { path: PathBuf, source: std::io::Error },
    Assembly(AsmError),
    Object(String),
    Simulation(SimError),
    FreeRunPanicked,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Usage(msg) => write!(f, "{}", msg),
            Error::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Error::Assembly(err) => write!(f, "assembly failed: {}", err),
            Error::Object(err) => write!(f, "invalid object file: {}", err),
            Error::Simulation(err) => write!(f, "simulation failed: {}", err),
            Error::FreeRunPanicked => write!(f, "the free-running simulation thread panicked"),
        }
    }
}

impl From<AsmError> for Error {
    fn from(err: AsmError) -> Error {
        Error::Assembly(err)
    }
}

impl From<SimError> for Error {
    fn from(err: SimError) -> Error {
        Error::Simulation(err)
    }
}

fn input_arg() -> Arg<'static, 'static> {
    Arg::with_name("input")
        .help("Input file")
        .short("i")
        .long("input")
        .value_name("FILE")
        .takes_value(true)
        .required(true)
}

fn debug_arg() -> Arg<'static, 'static> {
    Arg::with_name("debug")
        .help("Enables debug logging")
        .short("d")
        .long("debug")
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("sicxe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assembler and simulator for SIC/XE programs")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("asm")
                .about("Assembles a source file into an object file")
                .arg(input_arg())
                .arg(
                    Arg::with_name("output")
                        .help("Output file, defaults to the input file with the extension .obj")
                        .short("o")
                        .long("output")
                        .value_name("FILE")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("listing")
                        .help("Prints the assembly listing")
                        .short("l")
                        .long("listing"),
                )
                .arg(debug_arg()),
        )
        .subcommand(
            SubCommand::with_name("sim")
                .about("Loads an object file and executes it")
                .arg(input_arg())
                .arg(
                    Arg::with_name("background")
                        .help("Runs the program to completion without the interactive prompt")
                        .short("b")
                        .long("background"),
                )
                .arg(debug_arg())
                .arg(
                    Arg::with_name("tick")
                        .help("Milliseconds between instructions when free-running")
                        .long("tick")
                        .value_name("MS")
                        .takes_value(true)
                        .default_value("1"),
                )
                .arg(
                    Arg::with_name("max-steps")
                        .help("Stops the execution after this many instructions")
                        .long("max-steps")
                        .value_name("N")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("devices")
                        .help("Directory of the device files")
                        .long("devices")
                        .value_name("DIR")
                        .takes_value(true)
                        .default_value("."),
                )
                .arg(
                    Arg::with_name("load-at")
                        .help("Hexadecimal load address, defaults to the start address of the program")
                        .long("load-at")
                        .value_name("HEX")
                        .takes_value(true),
                ),
        )
        .get_matches()
}

fn build_logger(debug: bool) -> Logger {
    let decorator = TermDecorator::new().stderr().build();

    if debug {
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    } else {
        let drain = CompactFormat::new(decorator).build().fuse();
        let drain = drain.filter_level(Level::Warning).fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes the object file, removing it again if the write fails halfway.
fn write_object(path: &Path, program: &object::Program) -> Result<(), Error> {
    let result = File::create(path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        program.write(&mut writer)?;
        writer.flush()
    });

    if let Err(source) = result {
        let _ = fs::remove_file(path);
        return Err(io_error(path)(source));
    }

    Ok(())
}

fn assemble(args: &ArgMatches, logger: &Logger) -> Result<(), Error> {
    let input = Path::new(args.value_of("input").unwrap_or_default());
    let output = args
        .value_of("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("obj"));

    let source = fs::read_to_string(input).map_err(io_error(input))?;

    let program = symbolic::Program::parse_with_logger(&source, logger.clone())?;
    let listing: SourceMap<object::Program> = compile_with_logger(program, logger.clone())?;

    if args.is_present("listing") {
        print!("{}", listing);
    }

    let program = listing.into_inner();
    write_object(&output, &program)?;

    info!(logger, "object file written";
        "path" => %output.display(),
        "records" => program.records().count());

    Ok(())
}

fn parse_value<T: std::str::FromStr>(args: &ArgMatches, name: &str) -> Result<Option<T>, Error> {
    match args.value_of(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::Usage(format!("invalid value for --{}: {}", name, value))),
    }
}

fn simulate(args: &ArgMatches, logger: &Logger) -> Result<(), Error> {
    let input = Path::new(args.value_of("input").unwrap_or_default());
    let text = fs::read_to_string(input).map_err(io_error(input))?;

    let program = object::Program::parse(&text)
        .map_err(|err| Error::Object(err.verbose(&text).to_string()))?;

    let devices = DeviceTable::new(args.value_of("devices").unwrap_or("."));
    let mut emulator = Emulator::with_logger(devices, logger.clone());
    emulator.config.max_steps = parse_value(args, "max-steps")?;

    let load_at = match args.value_of("load-at") {
        None => None,
        Some(hex) => Some(
            u32::from_str_radix(hex.trim_start_matches("0x"), 16)
                .map_err(|_| Error::Usage(format!("invalid load address: {}", hex)))?,
        ),
    };

    match load_at {
        Some(address) => emulator.load_at(&program, address)?,
        None => emulator.load(&program)?,
    }

    let tick = Duration::from_millis(parse_value(args, "tick")?.unwrap_or(1));
    let emulator = Arc::new(Mutex::new(emulator));

    if args.is_present("background") {
        debug!(logger, "free-running"; "tick_ms" => tick.as_millis() as u64);

        let lines = console::lines();
        let mut freerun = freerun::FreeRun::start(emulator.clone(), tick);

        while !freerun.is_finished() {
            match lines.recv_timeout(console::POLL_INTERVAL) {
                Ok(line) => freerun.send_input(line),
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => {
                    freerun.close_input();
                    break;
                }
            }
        }

        freerun.join()?;

        let emulator = emulator.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        print!("{}", emulator.context);

        Ok(())
    } else {
        repl::Repl::new(emulator, tick, logger.clone()).run()
    }
}

fn run(args: &ArgMatches) -> Result<(), Error> {
    match args.subcommand() {
        ("asm", Some(args)) => {
            let logger = build_logger(args.is_present("debug"));
            assemble(args, &logger)
        }
        ("sim", Some(args)) => {
            let logger = build_logger(args.is_present("debug"));
            simulate(args, &logger)
        }
        _ => Err(Error::Usage(args.usage().to_string())),
    }
}

fn main() {
    let args = parse_arguments();

    if let Err(err) = run(&args) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
