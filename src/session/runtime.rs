use std::fmt;
use std::io::{Read, Write};
use std::sync::mpsc::Receiver;

use crate::foundation::error::ReelResult;
use crate::session::spec::CommandSpec;

/// Runtime-assigned identifier of a created, not necessarily running, unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..12).unwrap_or(&self.0);
        f.write_str(short)
    }
}

/// Duplex stream attached to a process. Dropping `stdin` signals end of input.
pub struct Attachment {
    pub stdin: Box<dyn Write + Send>,
    pub stdout: Box<dyn Read + Send>,
    pub stderr: Box<dyn Read + Send>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment").finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i64,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {}", self.code)
    }
}

/// What a runtime reports while waiting on a process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitEvent {
    Exited(ExitStatus),
    Failed(String),
}

/// The external collaborator that actually runs processes.
///
/// Implementations only need to honor this contract; image retrieval, networking and
/// resource limits are their own business.
pub trait ContainerRuntime: Send + Sync {
    fn create(&self, spec: &CommandSpec) -> ReelResult<ContainerId>;

    fn attach(&self, id: &ContainerId) -> ReelResult<Attachment>;

    fn start(&self, id: &ContainerId) -> ReelResult<()>;

    /// Begin waiting for the process to stop running. Events arrive on the returned
    /// channel; more than one may arrive when an error races a normal exit.
    fn wait(&self, id: &ContainerId) -> ReelResult<Receiver<WaitEvent>>;

    /// Emit the accumulated combined output of the process.
    fn logs(
        &self,
        id: &ContainerId,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> ReelResult<()>;

    fn remove(&self, id: &ContainerId) -> ReelResult<()>;
}
