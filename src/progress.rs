//! Progress spinner
//!
//! A cosmetic indicator drawn on a background thread while the caller runs
//! a blocking operation. The thread shares no state with the caller: it is
//! told to stop over a channel and answers with an acknowledgement once the
//! line is cleared. `stop` waits for that acknowledgement, so nothing is
//! drawn after it returns.

use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Redraw interval
pub const TICK: Duration = Duration::from_millis(80);

/// Running spinner handle
///
/// Dropping the handle stops the spinner.
pub struct Spinner {
    stop_tx: Option<Sender<()>>,
    stopped_rx: Option<Receiver<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Draw on stderr
    pub fn start(message: impl Into<String>) -> Self {
        Self::start_with(message, io::stderr(), TICK)
    }

    /// A spinner that draws nothing (JSON mode, non-terminal output)
    pub fn disabled() -> Self {
        Self {
            stop_tx: None,
            stopped_rx: None,
            handle: None,
        }
    }

    /// Start only when `enabled`
    pub fn start_if(enabled: bool, message: impl Into<String>) -> Self {
        if enabled {
            Self::start(message)
        } else {
            Self::disabled()
        }
    }

    /// Draw on any writer
    pub fn start_with<W>(message: impl Into<String>, mut out: W, tick: Duration) -> Self
    where
        W: Write + Send + 'static,
    {
        let message = message.into();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (stopped_tx, stopped_rx) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name("spinner".to_string())
            .spawn(move || {
                let mut frame = 0usize;
                loop {
                    let _ = write!(out, "\r{} {}", FRAMES[frame % FRAMES.len()], message);
                    let _ = out.flush();
                    frame += 1;

                    match stop_rx.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = write!(out, "\r\x1b[2K");
                let _ = out.flush();
                let _ = stopped_tx.send(());
            });

        match spawned {
            Ok(handle) => Self {
                stop_tx: Some(stop_tx),
                stopped_rx: Some(stopped_rx),
                handle: Some(handle),
            },
            Err(e) => {
                debug!(error = %e, "spinner thread not started");
                Self::disabled()
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signal the thread and wait until it has cleared the line
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(rx) = self.stopped_rx.take() {
            let _ = rx.recv();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run `f` with a spinner showing `message`
pub fn with_spinner<T, F>(enabled: bool, message: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let mut spinner = Spinner::start_if(enabled, message);
    let result = f();
    spinner.stop();
    result
}
