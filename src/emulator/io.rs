//! Devices used by the `RD`, `WD` and `TD` instructions.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::error::DeviceError;

pub const STDIN: u8 = 0;
pub const STDOUT: u8 = 1;
pub const STDERR: u8 = 2;

/// Interface to the devices of the machine.
pub trait InputOutput {
    /// Called when a TD instruction is executed. Returns `true` if the device is ready.
    fn test(&mut self, device: u8) -> Result<bool, DeviceError>;

    /// Called when an RD instruction is executed. A device with no more data returns `0`.
    fn read(&mut self, device: u8) -> Result<u8, DeviceError>;

    /// Called when a WD instruction is executed.
    fn write(&mut self, device: u8, data: u8) -> Result<(), DeviceError>;
}

impl<T: InputOutput + ?Sized> InputOutput for &mut T {
    fn test(&mut self, device: u8) -> Result<bool, DeviceError> {
        (**self).test(device)
    }

    fn read(&mut self, device: u8) -> Result<u8, DeviceError> {
        (**self).read(device)
    }

    fn write(&mut self, device: u8, data: u8) -> Result<(), DeviceError> {
        (**self).write(device, data)
    }
}

/// A device handler for testing purposes.
///
/// Reads come from per-device input buffers and writes are appended to per-device output
/// buffers. Standard input can only be read and standard output and error only written, like
/// with [DeviceTable].
#[derive(Debug, Clone, Default)]
pub struct TestIo {
    input: HashMap<u8, VecDeque<u8>>,
    output: HashMap<u8, Vec<u8>>,
}

impl TestIo {
    pub fn new() -> TestIo {
        TestIo::default()
    }

    pub fn with_input<I: IntoIterator<Item = u8>>(device: u8, input: I) -> TestIo {
        let mut io = TestIo::new();
        io.input(device, input);
        io
    }

    /// Queues bytes to be read from `device`.
    pub fn input<I: IntoIterator<Item = u8>>(&mut self, device: u8, input: I) {
        self.input.entry(device).or_default().extend(input);
    }

    /// Everything written to `device` so far.
    pub fn output(&self, device: u8) -> &[u8] {
        self.output
            .get(&device)
            .map(|buffer| &buffer[..])
            .unwrap_or(&[])
    }
}

impl InputOutput for TestIo {
    fn test(&mut self, _device: u8) -> Result<bool, DeviceError> {
        Ok(true)
    }

    fn read(&mut self, device: u8) -> Result<u8, DeviceError> {
        if device == STDOUT || device == STDERR {
            return Err(DeviceError::NotReadable(device));
        }

        Ok(self
            .input
            .get_mut(&device)
            .and_then(|buffer| buffer.pop_front())
            .unwrap_or(0))
    }

    fn write(&mut self, device: u8, data: u8) -> Result<(), DeviceError> {
        if device == STDIN {
            return Err(DeviceError::NotWritable(device));
        }

        self.output.entry(device).or_default().push(data);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DeviceFile {
    reader: Option<File>,
    writer: Option<File>,
}

/// Devices backed by the standard streams and files.
///
/// Devices 0, 1 and 2 are standard input, output and error. Every other device `XX` is the file
/// `XX.dev` in the device directory, created on first use. Reads and writes keep separate
/// handles, so reading starts from the beginning of the file while writes append to it.
///
/// Bytes given to [DeviceTable::feed] are read before the underlying stream. This lets a caller
/// wait for interactive input without blocking inside `RD`.
#[derive(Debug)]
pub struct DeviceTable {
    directory: PathBuf,
    files: HashMap<u8, DeviceFile>,
    pending: HashMap<u8, VecDeque<u8>>,
}

impl DeviceTable {
    pub fn new<P: AsRef<Path>>(directory: P) -> DeviceTable {
        DeviceTable {
            directory: directory.as_ref().to_path_buf(),
            files: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Queues bytes to be read from `device` before its stream.
    pub fn feed<I: IntoIterator<Item = u8>>(&mut self, device: u8, bytes: I) {
        self.pending.entry(device).or_default().extend(bytes);
    }

    /// Returns `true` if bytes given to [DeviceTable::feed] are still waiting to be read.
    pub fn has_input(&self, device: u8) -> bool {
        self.pending.get(&device).map(|queue| !queue.is_empty()).unwrap_or(false)
    }

    /// Path of the file backing `device`.
    pub fn path(&self, device: u8) -> PathBuf {
        self.directory.join(format!("{:02X}.dev", device))
    }

    fn open(&self, device: u8, write: bool) -> Result<File, DeviceError> {
        OpenOptions::new()
            .read(!write)
            .append(true)
            .create(true)
            .open(self.path(device))
            .map_err(|source| DeviceError::Io { device, source })
    }

    fn reader(&mut self, device: u8) -> Result<&mut File, DeviceError> {
        if self.files.get(&device).and_then(|file| file.reader.as_ref()).is_none() {
            let file = self.open(device, false)?;
            self.files.entry(device).or_default().reader = Some(file);
        }

        let entry = self.files.entry(device).or_default();

        match entry.reader {
            Some(ref mut file) => Ok(file),
            None => Err(DeviceError::NotReadable(device)),
        }
    }

    fn writer(&mut self, device: u8) -> Result<&mut File, DeviceError> {
        if self.files.get(&device).and_then(|file| file.writer.as_ref()).is_none() {
            let file = self.open(device, true)?;
            self.files.entry(device).or_default().writer = Some(file);
        }

        let entry = self.files.entry(device).or_default();

        match entry.writer {
            Some(ref mut file) => Ok(file),
            None => Err(DeviceError::NotWritable(device)),
        }
    }
}

impl Default for DeviceTable {
    fn default() -> DeviceTable {
        DeviceTable::new(".")
    }
}

fn read_byte<R: Read>(device: u8, mut reader: R) -> Result<u8, DeviceError> {
    let mut buffer = [0u8; 1];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(0),
            Ok(_) => return Ok(buffer[0]),
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(DeviceError::Io { device, source }),
        }
    }
}

fn write_byte<W: Write>(device: u8, mut writer: W, data: u8) -> Result<(), DeviceError> {
    writer
        .write_all(&[data])
        .and_then(|_| writer.flush())
        .map_err(|source| DeviceError::Io { device, source })
}

impl InputOutput for DeviceTable {
    fn test(&mut self, device: u8) -> Result<bool, DeviceError> {
        match device {
            STDIN | STDOUT | STDERR => Ok(true),
            _ => {
                self.reader(device)?;
                self.writer(device)?;
                Ok(true)
            }
        }
    }

    fn read(&mut self, device: u8) -> Result<u8, DeviceError> {
        if let Some(byte) = self.pending.get_mut(&device).and_then(VecDeque::pop_front) {
            return Ok(byte);
        }

        match device {
            STDIN => read_byte(device, io::stdin().lock()),
            STDOUT | STDERR => Err(DeviceError::NotReadable(device)),
            _ => {
                let file = self.reader(device)?;
                read_byte(device, file)
            }
        }
    }

    fn write(&mut self, device: u8, data: u8) -> Result<(), DeviceError> {
        match device {
            STDIN => Err(DeviceError::NotWritable(device)),
            STDOUT => write_byte(device, io::stdout().lock(), data),
            STDERR => write_byte(device, io::stderr().lock(), data),
            _ => {
                let file = self.writer(device)?;
                write_byte(device, file, data)
            }
        }
    }
}

#[test]
fn test_test_io() {
    let mut io = TestIo::with_input(0xF1, vec![b'h', b'i']);

    assert_eq!(io.read(0xF1).unwrap(), b'h');
    assert_eq!(io.read(0xF1).unwrap(), b'i');
    assert_eq!(io.read(0xF1).unwrap(), 0);

    io.write(STDOUT, b'x').unwrap();
    assert_eq!(io.output(STDOUT), b"x");
    assert_eq!(io.output(0x05), b"");

    assert!(matches!(io.read(STDOUT), Err(DeviceError::NotReadable(1))));
    assert!(matches!(io.write(STDIN, 0), Err(DeviceError::NotWritable(0))));
}

#[test]
fn test_device_files() {
    let directory = std::env::temp_dir().join(format!("sicxe-devices-{}", std::process::id()));
    std::fs::create_dir_all(&directory).unwrap();

    let mut devices = DeviceTable::new(&directory);
    let path = devices.path(0xA5);
    let _ = std::fs::remove_file(&path);

    assert!(devices.test(0xA5).unwrap());
    assert!(path.exists());
    assert_eq!(path.file_name().and_then(|name| name.to_str()), Some("A5.dev"));

    devices.write(0xA5, b'o').unwrap();
    devices.write(0xA5, b'k').unwrap();

    assert_eq!(devices.read(0xA5).unwrap(), b'o');
    assert_eq!(devices.read(0xA5).unwrap(), b'k');
    assert_eq!(devices.read(0xA5).unwrap(), 0);

    std::fs::remove_dir_all(&directory).unwrap();
}

#[test]
fn test_fed_input() {
    let mut devices = DeviceTable::default();
    assert!(!devices.has_input(STDIN));

    devices.feed(STDIN, b"ok".iter().copied());
    assert!(devices.has_input(STDIN));

    assert_eq!(devices.read(STDIN).unwrap(), b'o');
    assert_eq!(devices.read(STDIN).unwrap(), b'k');
    assert!(!devices.has_input(STDIN));
}
