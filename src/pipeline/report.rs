use std::fmt;
use std::path::PathBuf;

/// Why one scene or recording produced no render artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The scene has no recordings directory.
    RecordingsDirAbsent,
    /// The recordings directory holds no capture files.
    NoRecordings,
    /// The scene's recordings could not be listed.
    SceneUnreadable(String),
    /// The capture could not be normalized (empty or malformed header, I/O failure).
    Normalize(String),
    /// The renders directory could not be prepared.
    Output(String),
    /// The render session failed to start, attach or be waited on.
    Session(String),
    /// The render session ran but reported failure.
    ExitCode(i64),
    /// The render session succeeded but left no artifact behind.
    MissingArtifact,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordingsDirAbsent => f.write_str("no recordings directory"),
            Self::NoRecordings => f.write_str("no recordings"),
            Self::SceneUnreadable(e) => write!(f, "scene unreadable: {e}"),
            Self::Normalize(e) => write!(f, "normalization failed: {e}"),
            Self::Output(e) => write!(f, "output unavailable: {e}"),
            Self::Session(e) => write!(f, "render session failed: {e}"),
            Self::ExitCode(code) => write!(f, "renderer exited with code {code}"),
            Self::MissingArtifact => f.write_str("renderer produced no artifact"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skipped {
    /// The scene directory or recording file that was skipped.
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Outcome of rendering every scene of a project.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Scenes discovered, including ones skipped whole.
    pub scenes: usize,
    /// Recordings for which normalize + render was attempted.
    pub attempted: usize,
    /// Artifacts produced, in the order they were rendered.
    pub rendered: Vec<PathBuf>,
    pub skipped: Vec<Skipped>,
}

impl RenderReport {
    pub(crate) fn skip(&mut self, path: impl Into<PathBuf>, reason: SkipReason) {
        let path = path.into();
        tracing::warn!(path = %path.display(), reason = %reason, "skipped");
        self.skipped.push(Skipped { path, reason });
    }

    /// Recordings that were attempted but produced nothing.
    pub fn failed(&self) -> usize {
        self.attempted - self.rendered.len()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl fmt::Display for RenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scene(s), {} recording(s) attempted, {} rendered, {} skipped",
            self.scenes,
            self.attempted,
            self.rendered.len(),
            self.skipped.len()
        )
    }
}
