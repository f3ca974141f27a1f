use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::foundation::error::{ReelError, ReelResult};
use crate::session::runtime::Attachment;
use crate::session::terminal::{FeedEvent, InputFeed, SharedWriter, Terminal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Activity {
    StdoutCopy,
    StderrCopy,
    InputRead,
    InputWrite,
}

impl Activity {
    fn thread_name(self) -> &'static str {
        match self {
            Self::StdoutCopy => "castreel-stdout",
            Self::StderrCopy => "castreel-stderr",
            Self::InputRead => "castreel-input-read",
            Self::InputWrite => "castreel-input-write",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct BridgeOpts {
    /// Capacity of the per-session line queue between input reader and writer.
    pub(crate) queue_capacity: usize,
    /// Upper bound on how long a blocked activity goes without checking for shutdown.
    pub(crate) poll: Duration,
}

/// The concurrent I/O activities of one running session.
///
/// Output from the process is copied to the local writers while local input lines
/// travel reader -> bounded queue -> writer -> process stdin. Shutdown runs as a chain:
/// input EOF or `stop` ends the reader, which closes the queue, which ends the writer,
/// which closes the process's stdin.
pub(crate) struct Bridge {
    stop: Arc<AtomicBool>,
    done_rx: Receiver<Activity>,
    running: usize,
}

/// Signals completion when dropped, including on panic.
struct DoneGuard {
    tx: Sender<Activity>,
    activity: Activity,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.activity);
    }
}

impl Bridge {
    pub(crate) fn spawn(
        attachment: Attachment,
        terminal: &Terminal,
        opts: BridgeOpts,
    ) -> ReelResult<Self> {
        let Attachment {
            stdin,
            stdout,
            stderr,
        } = attachment;
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let (queue_tx, queue_rx) = mpsc::sync_channel::<String>(opts.queue_capacity.max(1));

        let mut bridge = Self {
            stop: stop.clone(),
            done_rx,
            running: 0,
        };

        let out = terminal.stdout.clone();
        bridge.launch(&done_tx, Activity::StdoutCopy, move || {
            copy_output(stdout, out, "stdout")
        })?;

        let err = terminal.stderr.clone();
        bridge.launch(&done_tx, Activity::StderrCopy, move || {
            copy_output(stderr, err, "stderr")
        })?;

        bridge.launch(&done_tx, Activity::InputWrite, move || {
            write_queue(queue_rx, stdin)
        })?;

        let feed = terminal.input.clone();
        let poll = opts.poll;
        bridge.launch(&done_tx, Activity::InputRead, move || {
            read_feed(feed, queue_tx, stop, poll)
        })?;

        Ok(bridge)
    }

    fn launch<F>(&mut self, done: &Sender<Activity>, activity: Activity, f: F) -> ReelResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = DoneGuard {
            tx: done.clone(),
            activity,
        };
        let spawned = std::thread::Builder::new()
            .name(activity.thread_name().to_string())
            .spawn(move || {
                let _guard = guard;
                f();
            });
        match spawned {
            Ok(_) => {
                self.running += 1;
                Ok(())
            }
            Err(e) => {
                self.stop.store(true, Ordering::Release);
                Err(ReelError::attach(format!(
                    "failed to spawn {} thread: {e}",
                    activity.thread_name()
                )))
            }
        }
    }

    /// Ask the input side to wind down. Output copies end on their own when the
    /// process's streams close.
    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop the bridge and wait up to `grace` for its activities to finish. Returns how
    /// many were still running when patience ran out; those threads are left detached.
    pub(crate) fn shutdown(mut self, grace: Duration) -> usize {
        self.stop();
        let deadline = Instant::now() + grace;
        while self.running > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(activity) => {
                    self.running -= 1;
                    tracing::trace!(?activity, "bridge activity finished");
                }
                Err(_) => break,
            }
        }
        if self.running > 0 {
            tracing::debug!(lingering = self.running, "bridge activities still running");
        }
        self.running
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // An abandoned bridge must not keep draining the shared input feed.
        self.stop();
    }
}

fn copy_output(mut from: Box<dyn Read + Send>, mut to: SharedWriter, stream: &'static str) {
    if let Err(e) = std::io::copy(&mut from, &mut to) {
        tracing::debug!(stream, error = %e, "output copy ended with error");
    }
    let _ = to.flush();
}

fn read_feed(feed: InputFeed, queue: SyncSender<String>, stop: Arc<AtomicBool>, poll: Duration) {
    loop {
        let mut line = match feed.next_line(&stop, poll) {
            FeedEvent::Line(line) => line,
            FeedEvent::Eof | FeedEvent::Stopped => break,
        };
        // Bounded patience: a full queue is retried until shutdown is requested.
        loop {
            match queue.try_send(line) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    if stop.load(Ordering::Acquire) {
                        tracing::debug!("dropping queued input line on shutdown");
                        return;
                    }
                    line = back;
                    std::thread::sleep(poll);
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

fn write_queue(queue: Receiver<String>, mut stdin: Box<dyn Write + Send>) {
    for line in queue.iter() {
        let res = stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"))
            .and_then(|_| stdin.flush());
        if let Err(e) = res {
            tracing::debug!(error = %e, "process input closed early");
            break;
        }
    }
    drop(stdin);
    tracing::trace!("process input closed");
}
