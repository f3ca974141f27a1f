use std::path::{Path, PathBuf};

pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("environment error: {0}")]
    Environment(String),

    #[error("not in a project: '{}' has no scene ancestor", .path.display())]
    NotInProject { path: PathBuf },

    #[error("recordings directory absent: '{}'", .path.display())]
    RecordingsDirAbsent { path: PathBuf },

    #[error("empty recording: '{}'", .path.display())]
    EmptyRecording { path: PathBuf },

    #[error("malformed metadata in '{}': {reason}", .path.display())]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("session start error: {0}")]
    Start(String),

    #[error("session attach error: {0}")]
    Attach(String),

    #[error("session wait error: {0}")]
    Wait(String),

    #[error("session cancelled: {0}")]
    Cancelled(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("step '{step}' exited with status {code}")]
    StepFailed { step: &'static str, code: i64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn environment(msg: impl Into<String>) -> Self {
        Self::Environment(msg.into())
    }

    pub fn not_in_project(path: &Path) -> Self {
        Self::NotInProject {
            path: path.to_path_buf(),
        }
    }

    pub fn recordings_dir_absent(path: &Path) -> Self {
        Self::RecordingsDirAbsent {
            path: path.to_path_buf(),
        }
    }

    pub fn empty_recording(path: &Path) -> Self {
        Self::EmptyRecording {
            path: path.to_path_buf(),
        }
    }

    pub fn malformed_metadata(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn start(msg: impl Into<String>) -> Self {
        Self::Start(msg.into())
    }

    pub fn attach(msg: impl Into<String>) -> Self {
        Self::Attach(msg.into())
    }

    pub fn wait(msg: impl Into<String>) -> Self {
        Self::Wait(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Errors a caller may log and skip past without aborting sibling work.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotInProject { .. }
                | Self::RecordingsDirAbsent { .. }
                | Self::EmptyRecording { .. }
                | Self::MalformedMetadata { .. }
        )
    }
}
