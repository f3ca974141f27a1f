//! Command descriptions for each pipeline step.
//!
//! Host directories are bind-mounted at fixed container paths; the step arguments
//! refer to files through those mount points.

use std::path::Path;

use crate::config::Config;
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::paths;
use crate::project::scene::SceneRef;
use crate::session::spec::CommandSpec;

/// Parent directory of the project (recorder steps).
pub const PROJECT_MOUNT: &str = "/project";
/// Directory a new project is written into (setup).
pub const WRITE_MOUNT: &str = "/users-cwd";
/// Directory holding the narration credentials file.
pub const CREDENTIALS_MOUNT: &str = "/credentials";
/// Scene directory seen by the renderer.
pub const RENDER_MOUNT: &str = "/data";

/// Environment variable naming the narration credentials inside the recorder.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Narration settings passed to the record step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Narration<'a> {
    pub credentials: &'a Path,
    pub language: &'a str,
    pub language_name: &'a str,
}

pub fn setup_command(
    cfg: &Config,
    script: &Path,
    into: &Path,
    name: &str,
) -> ReelResult<CommandSpec> {
    validate_project_name(name)?;
    let script_name = paths::file_name_str(script)?;
    Ok(CommandSpec::new(&cfg.images.recorder)
        .args([
            "setup".to_string(),
            "--project-path".to_string(),
            format!("{WRITE_MOUNT}/{name}"),
            format!("{PROJECT_MOUNT}/{script_name}"),
        ])
        .mount(paths::parent_dir(script)?, PROJECT_MOUNT)
        .mount(absolute(into)?, WRITE_MOUNT))
}

/// `env` holds extra `KEY=VALUE` entries (the passwords file).
pub fn record_command(
    cfg: &Config,
    project: &Path,
    narration: Option<&Narration<'_>>,
    env: &[String],
) -> ReelResult<CommandSpec> {
    let project_name = paths::file_name_str(project)?;
    let mut spec = CommandSpec::new(&cfg.images.recorder)
        .args(["record".to_string(), format!("{PROJECT_MOUNT}/{project_name}")])
        .envs(env.iter().cloned())
        .mount(paths::parent_dir(project)?, PROJECT_MOUNT);

    if let Some(n) = narration {
        let file = paths::file_name_str(n.credentials)?;
        spec = spec
            .args(["-l", n.language, "-n", n.language_name])
            .env(format!("{CREDENTIALS_ENV}={CREDENTIALS_MOUNT}/{file}"))
            .mount(paths::parent_dir(n.credentials)?, CREDENTIALS_MOUNT);
    }
    Ok(spec)
}

/// Convert `recording` (inside `scene`) into the artifact at `scene.render_path_for`.
pub fn render_command(
    cfg: &Config,
    scene: &SceneRef,
    recording: &Path,
) -> ReelResult<CommandSpec> {
    let layout = &cfg.layout;
    let input = container_path(&scene.path, recording)?;
    let output = container_path(&scene.path, &scene.render_path_for(recording, layout)?)?;
    Ok(CommandSpec::new(&cfg.images.renderer)
        .args(["-S1".to_string(), input, output])
        .mount(absolute(&scene.path)?, RENDER_MOUNT))
}

pub fn assemble_command(cfg: &Config, project: &Path) -> ReelResult<CommandSpec> {
    let project_name = paths::file_name_str(project)?;
    Ok(CommandSpec::new(&cfg.images.recorder)
        .args([
            "render-video".to_string(),
            format!("{PROJECT_MOUNT}/{project_name}"),
        ])
        .mount(paths::parent_dir(project)?, PROJECT_MOUNT))
}

fn validate_project_name(name: &str) -> ReelResult<()> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ReelError::validation(format!(
            "'{name}' is not a usable project name"
        )));
    }
    Ok(())
}

fn absolute(path: &Path) -> ReelResult<std::path::PathBuf> {
    std::path::absolute(path).map_err(|e| {
        ReelError::environment(format!("cannot make '{}' absolute: {e}", path.display()))
    })
}

/// Path of `file` as the renderer sees it, given `scene_dir` mounted at [`RENDER_MOUNT`].
fn container_path(scene_dir: &Path, file: &Path) -> ReelResult<String> {
    let rel = file.strip_prefix(scene_dir).map_err(|_| {
        ReelError::validation(format!(
            "'{}' is not inside scene '{}'",
            file.display(),
            scene_dir.display()
        ))
    })?;
    let mut out = RENDER_MOUNT.to_string();
    for comp in rel.components() {
        let part = comp.as_os_str().to_str().ok_or_else(|| {
            ReelError::validation(format!("'{}' is not valid UTF-8", file.display()))
        })?;
        out.push('/');
        out.push_str(part);
    }
    Ok(out)
}
