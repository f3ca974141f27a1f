use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::foundation::error::{ReelError, ReelResult};
use crate::session::bridge::{Bridge, BridgeOpts};
use crate::session::runtime::{Attachment, ContainerId, ContainerRuntime, ExitStatus, WaitEvent};
use crate::session::spec::CommandSpec;
use crate::session::terminal::{DEFAULT_FEED_CAPACITY, Terminal};

/// Lifecycle of a [`ProcessSession`].
///
/// Happy path: `Created -> Attached -> Started -> Running -> Exited -> Drained ->
/// Disposed`. The stream is attached before the process starts so no input handoff is
/// missed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Attached,
    Started,
    Running,
    Exited,
    Drained,
    Disposed,
    AttachFailed,
    StartFailed,
    WaitFailed,
    /// The caller stopped waiting; the remote process may still be running.
    Abandoned,
}

/// Shared flag used to abandon a running session.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SessionOpts {
    /// Capacity of the bounded input line queue.
    pub queue_capacity: usize,
    /// How often blocked waits re-check cancellation.
    pub poll: Duration,
    /// How long to wait for I/O activities to wind down after exit.
    pub shutdown_grace: Duration,
    /// Ask the runtime to remove the process record on dispose.
    pub remove_on_dispose: bool,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_FEED_CAPACITY,
            poll: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(2),
            remove_on_dispose: true,
        }
    }
}

/// One external, interactive unit of work, from creation to disposal.
pub struct ProcessSession<'r> {
    runtime: &'r dyn ContainerRuntime,
    id: ContainerId,
    image: String,
    opts: SessionOpts,
    state: SessionState,
    attachment: Option<Attachment>,
    bridge: Option<Bridge>,
    exit: Option<ExitStatus>,
}

impl<'r> ProcessSession<'r> {
    /// Submit `spec` to the runtime. Nothing runs yet.
    pub fn open(
        runtime: &'r dyn ContainerRuntime,
        spec: &CommandSpec,
        opts: SessionOpts,
    ) -> ReelResult<Self> {
        spec.validate()?;
        let id = runtime.create(spec).map_err(as_start_error)?;
        tracing::debug!(image = %spec.image, id = %id, "session created");
        Ok(Self {
            runtime,
            id,
            image: spec.image.clone(),
            opts,
            state: SessionState::Created,
            attachment: None,
            bridge: None,
            exit: None,
        })
    }

    /// Open, attach, start, bridge, wait, drain and dispose.
    ///
    /// A failure before the process starts never reaches the bridge or the wait.
    pub fn run(
        runtime: &'r dyn ContainerRuntime,
        spec: &CommandSpec,
        terminal: &Terminal,
        opts: SessionOpts,
        cancel: &CancelToken,
    ) -> ReelResult<ExitStatus> {
        if cancel.is_cancelled() {
            return Err(ReelError::cancelled(format!(
                "'{}' not started",
                spec.image
            )));
        }
        let mut session = Self::open(runtime, spec, opts)?;
        let result = session.drive(terminal, cancel);
        session.dispose();
        result
    }

    fn drive(&mut self, terminal: &Terminal, cancel: &CancelToken) -> ReelResult<ExitStatus> {
        self.attach()?;
        self.start()?;
        self.bridge(terminal)?;
        let status = self.wait_for_exit(cancel)?;
        self.drain_logs(terminal);
        Ok(status)
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    pub fn attach(&mut self) -> ReelResult<()> {
        self.expect_state(SessionState::Created, "attach")?;
        match self.runtime.attach(&self.id) {
            Ok(attachment) => {
                self.attachment = Some(attachment);
                self.state = SessionState::Attached;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::AttachFailed;
                Err(as_attach_error(e))
            }
        }
    }

    pub fn start(&mut self) -> ReelResult<()> {
        self.expect_state(SessionState::Attached, "start")?;
        match self.runtime.start(&self.id) {
            Ok(()) => {
                self.state = SessionState::Started;
                tracing::info!(image = %self.image, id = %self.id, "session started");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::StartFailed;
                // Closes the stream we were holding for the handoff.
                self.attachment = None;
                Err(as_start_error(e))
            }
        }
    }

    /// Begin forwarding I/O between `terminal` and the process.
    pub fn bridge(&mut self, terminal: &Terminal) -> ReelResult<()> {
        self.expect_state(SessionState::Started, "bridge")?;
        let attachment = self
            .attachment
            .take()
            .ok_or_else(|| ReelError::invalid_state("started session has no attachment"))?;
        let opts = BridgeOpts {
            queue_capacity: self.opts.queue_capacity,
            poll: self.opts.poll,
        };
        match Bridge::spawn(attachment, terminal, opts) {
            Ok(bridge) => {
                self.bridge = Some(bridge);
                self.state = SessionState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::AttachFailed;
                Err(e)
            }
        }
    }

    /// Block until the runtime reports the process stopped.
    ///
    /// An error reported alongside an exit wins over the exit.
    pub fn wait_for_exit(&mut self, cancel: &CancelToken) -> ReelResult<ExitStatus> {
        self.expect_state(SessionState::Running, "wait")?;
        let events = match self.runtime.wait(&self.id) {
            Ok(rx) => rx,
            Err(e) => return Err(self.fail_wait(as_wait_error(e))),
        };

        loop {
            match events.recv_timeout(self.opts.poll) {
                Ok(WaitEvent::Exited(status)) => {
                    if let Some(msg) = pending_failure(&events) {
                        return Err(self.fail_wait(ReelError::wait(msg)));
                    }
                    self.stop_bridge();
                    self.exit = Some(status);
                    self.state = SessionState::Exited;
                    tracing::info!(image = %self.image, id = %self.id, %status, "session exited");
                    return Ok(status);
                }
                Ok(WaitEvent::Failed(msg)) => {
                    return Err(self.fail_wait(ReelError::wait(msg)));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        self.stop_bridge();
                        self.state = SessionState::Abandoned;
                        tracing::warn!(image = %self.image, id = %self.id, "session abandoned");
                        return Err(ReelError::cancelled(format!(
                            "stopped waiting on '{}'",
                            self.image
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.fail_wait(ReelError::wait(
                        "runtime stopped reporting before the process exited",
                    )));
                }
            }
        }
    }

    /// Emit the process's accumulated output once. Failures are logged, not returned.
    pub fn drain_logs(&mut self, terminal: &Terminal) {
        if self.state != SessionState::Exited {
            tracing::debug!(state = ?self.state, "skipping log drain");
            return;
        }
        let mut out = terminal.stdout.clone();
        let mut err = terminal.stderr.clone();
        if let Err(e) = self.runtime.logs(&self.id, &mut out, &mut err) {
            tracing::warn!(id = %self.id, error = %e, "failed to retrieve process logs");
        }
        self.state = SessionState::Drained;
    }

    /// Release local resources and, when configured, the runtime's record of the process.
    ///
    /// Every outcome except [`SessionState::Abandoned`] removes the record, failed ones
    /// included.
    pub fn dispose(mut self) {
        self.stop_bridge();
        self.attachment = None;
        if self.opts.remove_on_dispose
            && self.state != SessionState::Abandoned
            && let Err(e) = self.runtime.remove(&self.id)
        {
            tracing::warn!(id = %self.id, error = %e, "failed to remove process");
        }
        self.state = SessionState::Disposed;
        tracing::debug!(id = %self.id, "session disposed");
    }

    fn stop_bridge(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.shutdown(self.opts.shutdown_grace);
        }
    }

    fn fail_wait(&mut self, err: ReelError) -> ReelError {
        self.stop_bridge();
        self.state = SessionState::WaitFailed;
        err
    }

    fn expect_state(&self, want: SessionState, op: &str) -> ReelResult<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(ReelError::invalid_state(format!(
                "cannot {op} a session in state {:?}",
                self.state
            )))
        }
    }
}

fn pending_failure(events: &Receiver<WaitEvent>) -> Option<String> {
    events.try_iter().find_map(|ev| match ev {
        WaitEvent::Failed(msg) => Some(msg),
        WaitEvent::Exited(_) => None,
    })
}

fn as_start_error(e: ReelError) -> ReelError {
    match e {
        ReelError::Start(_) | ReelError::Validation(_) => e,
        other => ReelError::start(other.to_string()),
    }
}

fn as_attach_error(e: ReelError) -> ReelError {
    match e {
        ReelError::Attach(_) => e,
        other => ReelError::attach(other.to_string()),
    }
}

fn as_wait_error(e: ReelError) -> ReelError {
    match e {
        ReelError::Wait(_) => e,
        other => ReelError::wait(other.to_string()),
    }
}
