use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// How long the prompt and the input forwarding wait for a line before checking on a
/// background run.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Reads standard input line by line on a background thread. Lines keep their line ending. The
/// channel disconnects at the end of input.
///
/// Standard input has exactly one reader once this is called, so device 0 input of a program
/// has to be taken from the channel and fed to the device table.
pub fn lines() -> Receiver<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();

    thread::spawn(move || {
        let stdin = io::stdin();

        loop {
            let mut line = Vec::new();

            match stdin.lock().read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });

    receiver
}
