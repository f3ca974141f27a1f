#![forbid(unsafe_code)]
//! Turn a project of recorded terminal sessions into a video.
//!
//! A project directory holds scenes; each scene holds asciicast recordings. The
//! [`Pipeline`] records the project, normalizes and renders every recording through a
//! containerized renderer, and assembles the final video. Every external step runs as
//! an interactive [`ProcessSession`] bridged to the invoking terminal.

pub mod cast;
pub mod config;
pub mod foundation;
pub mod pipeline;
pub mod project;
pub mod session;

pub use cast::header::{CastHeader, Dimensions};
pub use cast::normalize::{NormalizeOutcome, normalize};
pub use config::Config;
pub use foundation::error::{ReelError, ReelResult};
pub use pipeline::{Pipeline, RenderReport, RunOutcome, RunPlan, SetupPlan, SkipReason};
pub use project::layout::ProjectLayout;
pub use project::scene::{SceneRef, find_owning_scene, list_scenes};
pub use project::recordings::list_recordings;
pub use session::{CancelToken, CommandSpec, ContainerRuntime, DockerCli, ProcessSession, Terminal};
