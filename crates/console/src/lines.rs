//! Standard input as a pollable line source.
//!
//! A reader thread owns the blocking `stdin` lock and forwards lines over a
//! channel, so the session can give up on a wait without losing input.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use avrmon_core::input::LineSource;
use tracing::{debug, warn};

/// How long one poll blocks before handing control back to the wait loop.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct StdinLines {
    rx: Receiver<String>,
    closed: bool,
}

impl StdinLines {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new().name("stdin".into()).spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin: {e}");
                        break;
                    }
                }
            }
            debug!("stdin closed");
        })?;
        Ok(StdinLines { rx, closed: false })
    }
}

impl LineSource for StdinLines {
    type Line = String;

    fn poll_line(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        match self.rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => Some(line),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
