//! The end-to-end run: setup, record, render every scene, assemble.
//!
//! Steps run strictly one after another. Per-scene and per-recording failures during
//! rendering are logged and skipped; a failing mandatory step ends the run.

pub mod report;
pub mod steps;

use std::path::{Path, PathBuf};

use crate::cast::normalize::{NormalizeOutcome, normalize};
use crate::config::{Config, read_env_file};
use crate::foundation::error::{ReelError, ReelResult};
use crate::project::recordings::{SceneRecordings, discover};
use crate::project::scene::{SceneRef, uses_narration};
use crate::session::process::{CancelToken, ProcessSession, SessionOpts};
use crate::session::runtime::{ContainerRuntime, ExitStatus};
use crate::session::spec::CommandSpec;
use crate::session::terminal::Terminal;

pub use report::{RenderReport, SkipReason, Skipped};
pub use steps::Narration;

/// Inputs of the optional setup step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetupPlan {
    /// Script file describing the video.
    pub script: PathBuf,
    /// Directory the project is created in.
    pub into: PathBuf,
    /// Project directory name.
    pub name: String,
}

/// Which steps a [`Pipeline::run`] performs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunPlan {
    /// Create the project first. When set, `project` is ignored in favor of
    /// `into/name`.
    pub setup: Option<SetupPlan>,
    pub project: PathBuf,
    pub record: bool,
    pub render: bool,
    /// Stop after rendering; do not assemble the final video.
    pub gifs_only: bool,
}

impl RunPlan {
    /// Record, render and assemble an existing project.
    pub fn full(project: impl Into<PathBuf>) -> Self {
        Self {
            setup: None,
            project: project.into(),
            record: true,
            render: true,
            gifs_only: false,
        }
    }
}

/// What a [`Pipeline::run`] produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub project: PathBuf,
    pub render: Option<RenderReport>,
    /// Directory holding the assembled video.
    pub video: Option<PathBuf>,
}

pub struct Pipeline<'r> {
    runtime: &'r dyn ContainerRuntime,
    config: Config,
    terminal: Terminal,
    session_opts: SessionOpts,
    cancel: CancelToken,
}

impl<'r> Pipeline<'r> {
    pub fn new(runtime: &'r dyn ContainerRuntime, config: Config, terminal: Terminal) -> Self {
        Self {
            runtime,
            config,
            terminal,
            session_opts: SessionOpts::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_session_opts(mut self, opts: SessionOpts) -> Self {
        self.session_opts = opts;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run the steps selected by `plan` in order.
    #[tracing::instrument(skip_all, fields(project = %plan.project.display()))]
    pub fn run(&self, plan: &RunPlan) -> ReelResult<RunOutcome> {
        let project = match &plan.setup {
            Some(setup) => self.setup(&setup.script, &setup.into, &setup.name)?,
            None => plan.project.clone(),
        };
        let mut outcome = RunOutcome {
            project: project.clone(),
            ..RunOutcome::default()
        };

        if plan.record {
            self.record(&project)?;
        }
        if !plan.render {
            tracing::info!("rendering disabled, stopping after record");
            return Ok(outcome);
        }

        let report = self.render_all(&project)?;
        tracing::info!(%report, "render finished");
        outcome.render = Some(report);

        if !plan.gifs_only {
            outcome.video = Some(self.assemble(&project)?);
        }
        Ok(outcome)
    }

    /// Create a project named `name` inside `into` from `script`. Returns the project
    /// directory.
    #[tracing::instrument(skip(self))]
    pub fn setup(&self, script: &Path, into: &Path, name: &str) -> ReelResult<PathBuf> {
        let spec = steps::setup_command(&self.config, script, into, name)?;
        self.mandatory("setup", &spec)?;
        Ok(into.join(name))
    }

    /// Record every scene of `project`. Narration is used when a scene carries
    /// narration text, and then requires the credentials file.
    #[tracing::instrument(skip(self))]
    pub fn record(&self, project: &Path) -> ReelResult<ExitStatus> {
        let env = match &self.config.passwords_env {
            Some(path) => read_env_file(path)?,
            None => Vec::new(),
        };

        let narrated = uses_narration(project, &self.config.layout)?;
        let narration = if narrated {
            let credentials = self.config.tts_credentials.as_deref().ok_or_else(|| {
                ReelError::validation(
                    "the script narrates scenes, but no tts_credentials file is configured",
                )
            })?;
            if !credentials.is_file() {
                return Err(ReelError::config(format!(
                    "tts_credentials '{}' is not a file",
                    credentials.display()
                )));
            }
            Some(Narration {
                credentials,
                language: &self.config.language,
                language_name: &self.config.language_name,
            })
        } else {
            None
        };

        let spec = steps::record_command(&self.config, project, narration.as_ref(), &env)?;
        self.mandatory("record", &spec)
    }

    /// Normalize and render every recording of every scene.
    ///
    /// Never stops early on a per-scene or per-recording failure; each is recorded in
    /// the report and logged. Only an unreadable project or cancellation is an error.
    #[tracing::instrument(skip(self))]
    pub fn render_all(&self, project: &Path) -> ReelResult<RenderReport> {
        let layout = &self.config.layout;
        let mut report = RenderReport::default();

        for (scene, found) in discover(project, layout)? {
            report.scenes += 1;
            let recordings = match found {
                Ok(SceneRecordings::Found(paths)) => paths,
                Ok(SceneRecordings::Empty) => {
                    report.skip(&scene.path, SkipReason::NoRecordings);
                    continue;
                }
                Ok(SceneRecordings::Absent) => {
                    report.skip(&scene.path, SkipReason::RecordingsDirAbsent);
                    continue;
                }
                Err(e) => {
                    report.skip(&scene.path, SkipReason::SceneUnreadable(e.to_string()));
                    continue;
                }
            };

            for recording in recordings {
                report.attempted += 1;
                self.render_one(&scene, &recording, &mut report)?;
            }
        }
        Ok(report)
    }

    fn render_one(
        &self,
        scene: &SceneRef,
        recording: &Path,
        report: &mut RenderReport,
    ) -> ReelResult<()> {
        let layout = &self.config.layout;

        match normalize(recording, self.config.dimensions) {
            Ok(NormalizeOutcome::Rewritten) => {
                tracing::debug!(path = %recording.display(), "normalized");
            }
            Ok(NormalizeOutcome::Unchanged) => {}
            Err(e) => {
                report.skip(recording, SkipReason::Normalize(e.to_string()));
                return Ok(());
            }
        }

        if let Err(e) = scene.ensure_renders_dir(layout) {
            report.skip(recording, SkipReason::Output(e.to_string()));
            return Ok(());
        }

        let prepared = steps::render_command(&self.config, scene, recording).and_then(|spec| {
            let artifact = scene.render_path_for(recording, layout)?;
            Ok((spec, artifact))
        });
        let (spec, artifact) = match prepared {
            Ok(v) => v,
            Err(e) => {
                report.skip(recording, SkipReason::Session(e.to_string()));
                return Ok(());
            }
        };

        // Drop any render from an earlier run first.
        match std::fs::remove_file(&artifact) {
            Ok(()) => tracing::debug!(path = %artifact.display(), "removed previous render"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                report.skip(
                    recording,
                    SkipReason::Output(format!("cannot replace '{}': {e}", artifact.display())),
                );
                return Ok(());
            }
        }

        match self.session(&spec) {
            Ok(status) if status.success() => {}
            Ok(status) => {
                report.skip(recording, SkipReason::ExitCode(status.code));
                return Ok(());
            }
            Err(e @ ReelError::Cancelled(_)) => return Err(e),
            Err(e) => {
                report.skip(recording, SkipReason::Session(e.to_string()));
                return Ok(());
            }
        }

        if artifact.is_file() {
            tracing::info!(path = %artifact.display(), "rendered");
            report.rendered.push(artifact);
        } else {
            report.skip(recording, SkipReason::MissingArtifact);
        }
        Ok(())
    }

    /// Build the final video from the rendered scenes. Returns the directory the
    /// video is written to.
    #[tracing::instrument(skip(self))]
    pub fn assemble(&self, project: &Path) -> ReelResult<PathBuf> {
        let spec = steps::assemble_command(&self.config, project)?;
        self.mandatory("assemble", &spec)?;
        let out = project.join(&self.config.layout.final_dir);
        if !out.exists() {
            tracing::warn!(
                path = %out.display(),
                "assembly finished but the output directory is missing"
            );
        }
        Ok(out)
    }

    fn session(&self, spec: &CommandSpec) -> ReelResult<ExitStatus> {
        ProcessSession::run(
            self.runtime,
            spec,
            &self.terminal,
            self.session_opts,
            &self.cancel,
        )
    }

    fn mandatory(&self, step: &'static str, spec: &CommandSpec) -> ReelResult<ExitStatus> {
        let status = self.session(spec)?;
        if !status.success() {
            return Err(ReelError::StepFailed {
                step,
                code: status.code,
            });
        }
        Ok(status)
    }
}
