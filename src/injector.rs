use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::Result;

/// Repeatedly writes a fixed payload to a port with a fixed delay between
/// writes.
///
/// The loop never ends on its own; it runs until the stop channel fires or a
/// write fails. Every write error is fatal, there is no retry.
#[derive(Clone, Debug)]
pub struct Injector {
    payload: Vec<u8>,
    interval: Duration,
}

impl Injector {
    /// A zero `interval` produces back-to-back writes; an empty `payload`
    /// produces repeated zero-length writes.
    pub fn new(payload: Vec<u8>, interval: Duration) -> Self {
        Injector { payload, interval }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs the write/wait cycle until `stop` receives a message or its
    /// sender is dropped.
    ///
    /// The wait between writes doubles as the cancellation point, so a stop
    /// request is picked up within one interval. Returns the number of
    /// completed writes on a clean stop, or the first write error.
    pub fn run<W: Write>(&self, port: &mut W, stop: &Receiver<()>) -> Result<u64> {
        let mut cycles = 0u64;

        loop {
            port.write_all(&self.payload)?;
            cycles += 1;

            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(cycles),
            }
        }
    }
}
