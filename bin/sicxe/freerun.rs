use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sicxe::emulator::{DeviceTable, Emulator, SimError, STDIN};

use crate::console::POLL_INTERVAL;
use crate::Error;

type SharedEmulator = Arc<Mutex<Emulator<DeviceTable>>>;

enum Input {
    Line(Vec<u8>),
    Closed,
    Stopped,
}

/// Executes one instruction per tick on a background thread until the program halts, an
/// instruction fails or the run is stopped.
///
/// The emulator is only locked while an instruction executes. When the program reads standard
/// input, the thread waits for a line from [FreeRun::send_input] with the emulator unlocked.
pub struct FreeRun {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    waiting: Arc<AtomicBool>,
    input: Option<Sender<Vec<u8>>>,
    handle: JoinHandle<Result<(), SimError>>,
}

fn lock(emulator: &SharedEmulator) -> MutexGuard<Emulator<DeviceTable>> {
    emulator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn wait_for_line(lines: &Receiver<Vec<u8>>, stop: &AtomicBool) -> Input {
    loop {
        if stop.load(Ordering::SeqCst) {
            return Input::Stopped;
        }

        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => return Input::Line(line),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Input::Closed,
        }
    }
}

fn run(
    emulator: &SharedEmulator,
    tick: Duration,
    lines: &Receiver<Vec<u8>>,
    stop: &AtomicBool,
    waiting: &AtomicBool,
) -> Result<(), SimError> {
    while !stop.load(Ordering::SeqCst) {
        let needs_input = {
            let mut emulator = lock(emulator);

            if emulator.halted {
                return Ok(());
            }

            if let Some(limit) = emulator.config.max_steps {
                if emulator.steps() >= limit {
                    return Err(SimError::StepLimit(limit));
                }
            }

            emulator.pending_read()? == Some(STDIN) && !emulator.io.has_input(STDIN)
        };

        if needs_input {
            waiting.store(true, Ordering::SeqCst);
            let input = wait_for_line(lines, stop);
            waiting.store(false, Ordering::SeqCst);

            match input {
                Input::Line(line) => lock(emulator).io.feed(STDIN, line),
                // The read falls through to the exhausted stream and gets 0.
                Input::Closed => (),
                Input::Stopped => return Ok(()),
            }
        }

        lock(emulator).step()?;
        thread::sleep(tick);
    }

    Ok(())
}

impl FreeRun {
    pub fn start(emulator: SharedEmulator, tick: Duration) -> FreeRun {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let waiting = Arc::new(AtomicBool::new(false));
        let (input, lines) = mpsc::channel();

        let (stop_flag, finished_flag, waiting_flag) =
            (stop.clone(), finished.clone(), waiting.clone());

        let handle = thread::spawn(move || {
            let result = run(&emulator, tick, &lines, &stop_flag, &waiting_flag);
            finished_flag.store(true, Ordering::SeqCst);
            result
        });

        FreeRun {
            stop,
            finished,
            waiting,
            input: Some(input),
            handle,
        }
    }

    /// True once the thread has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// True while the program is blocked on reading standard input.
    pub fn is_waiting_for_input(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Hands a line of standard input to the program.
    pub fn send_input(&self, line: Vec<u8>) {
        if let Some(input) = &self.input {
            let _ = input.send(line);
        }
    }

    /// Signals the end of standard input. Later reads of device 0 return 0.
    pub fn close_input(&mut self) {
        self.input = None;
    }

    /// Asks the thread to stop at the next instruction boundary and waits for it.
    pub fn stop(self) -> Result<(), Error> {
        self.stop.store(true, Ordering::SeqCst);
        self.join()
    }

    /// Waits for the thread to finish.
    pub fn join(self) -> Result<(), Error> {
        match self.handle.join() {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::FreeRunPanicked),
        }
    }
}
