use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, sync_channel};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::error::ReelResult;

/// Lines buffered between the local input and whichever session is consuming it.
pub const DEFAULT_FEED_CAPACITY: usize = 64;

/// Line-oriented local input shared by consecutive sessions.
///
/// A single pump thread owns the underlying reader for the life of the process, so
/// a session that ends cannot leave behind a blocked read that swallows the next
/// session's input. Sessions take turns: at most one drains the feed at a time, and a
/// line picked up after a session was told to stop is kept for the next one.
#[derive(Clone)]
pub struct InputFeed {
    inner: Arc<Mutex<FeedState>>,
}

struct FeedState {
    rx: Receiver<String>,
    pending: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FeedEvent {
    Line(String),
    /// The local input hit end-of-file; no further lines will arrive.
    Eof,
    /// The consuming session asked to stop.
    Stopped,
}

impl InputFeed {
    /// Start pumping `reader` line by line. Line terminators (`\n`, `\r\n`) are stripped;
    /// invalid UTF-8 is replaced rather than dropped.
    pub fn from_reader<R>(mut reader: R, capacity: usize) -> ReelResult<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = sync_channel::<String>(capacity.max(1));
        std::thread::Builder::new()
            .name("castreel-input".to_string())
            .spawn(move || {
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            if buf.last() == Some(&b'\n') {
                                buf.pop();
                                if buf.last() == Some(&b'\r') {
                                    buf.pop();
                                }
                            }
                            let line = String::from_utf8_lossy(&buf).into_owned();
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!(error = %e, "local input read failed");
                            break;
                        }
                    }
                }
                tracing::trace!("local input closed");
            })
            .context("failed to spawn input pump thread")?;

        Ok(Self::from_receiver(rx))
    }

    pub fn stdin() -> ReelResult<Self> {
        Self::from_reader(
            std::io::BufReader::new(std::io::stdin()),
            DEFAULT_FEED_CAPACITY,
        )
    }

    /// A feed that is already at end-of-file.
    pub fn closed() -> Self {
        let (tx, rx) = sync_channel::<String>(1);
        drop(tx);
        Self::from_receiver(rx)
    }

    fn from_receiver(rx: Receiver<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FeedState { rx, pending: None })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until a line is available, the input closes, or `stop` is raised. `stop`
    /// is checked at least every `poll`.
    pub(crate) fn next_line(&self, stop: &AtomicBool, poll: Duration) -> FeedEvent {
        let mut state = self.lock();
        loop {
            if stop.load(Ordering::Acquire) {
                return FeedEvent::Stopped;
            }
            if let Some(line) = state.pending.take() {
                return FeedEvent::Line(line);
            }
            match state.rx.recv_timeout(poll) {
                Ok(line) => {
                    if stop.load(Ordering::Acquire) {
                        state.pending = Some(line);
                        return FeedEvent::Stopped;
                    }
                    return FeedEvent::Line(line);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return FeedEvent::Eof,
            }
        }
    }
}

/// Cloneable handle to a local output destination.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn new(w: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(w))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut w = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        w.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut w = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        w.flush()
    }
}

/// Local side of every session: where input comes from and where output goes.
#[derive(Clone)]
pub struct Terminal {
    pub input: InputFeed,
    pub stdout: SharedWriter,
    pub stderr: SharedWriter,
}

impl Terminal {
    /// The invoking process's standard streams.
    pub fn stdio() -> ReelResult<Self> {
        Ok(Self {
            input: InputFeed::stdin()?,
            stdout: SharedWriter::stdout(),
            stderr: SharedWriter::stderr(),
        })
    }
}
