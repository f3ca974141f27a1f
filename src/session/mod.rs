//! Interactive external processes.
//!
//! A [`ProcessSession`] drives one unit of work through a [`ContainerRuntime`]:
//! create, attach, start, bridge local I/O, wait, drain logs and dispose.

mod bridge;
pub mod docker;
pub mod process;
pub mod runtime;
pub mod spec;
pub mod terminal;

pub use docker::{DockerCli, is_docker_on_path};
pub use process::{CancelToken, ProcessSession, SessionOpts, SessionState};
pub use runtime::{Attachment, ContainerId, ContainerRuntime, ExitStatus, WaitEvent};
pub use spec::{BindMount, CommandSpec};
pub use terminal::{InputFeed, SharedWriter, Terminal};
