use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{ReelError, ReelResult};
use crate::project::layout::ProjectLayout;

/// A scene directory inside a project. Carries no state beyond its location; every run
/// re-derives scenes from disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneRef {
    pub name: String,
    pub path: PathBuf,
}

impl SceneRef {
    pub fn from_path(path: impl Into<PathBuf>) -> ReelResult<Self> {
        let path = path.into();
        let name = crate::foundation::paths::file_name_str(&path)?.to_string();
        Ok(Self { name, path })
    }

    pub fn recordings_dir(&self, layout: &ProjectLayout) -> PathBuf {
        self.path.join(&layout.recordings_dir)
    }

    pub fn renders_dir(&self, layout: &ProjectLayout) -> PathBuf {
        self.path.join(&layout.renders_dir)
    }

    /// Where the render artifact for `recording` lands: same stem, render extension.
    pub fn render_path_for(&self, recording: &Path, layout: &ProjectLayout) -> ReelResult<PathBuf> {
        let stem = recording
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ReelError::validation(format!(
                    "recording '{}' has no usable file stem",
                    recording.display()
                ))
            })?;
        Ok(self
            .renders_dir(layout)
            .join(format!("{stem}.{}", layout.render_ext)))
    }

    /// Create the renders directory if absent. Safe to race: an existing directory is
    /// not an error.
    pub fn ensure_renders_dir(&self, layout: &ProjectLayout) -> ReelResult<PathBuf> {
        let dir = self.renders_dir(layout);
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt as _;
            builder.mode(0o755);
        }
        builder
            .create(&dir)
            .with_context(|| format!("failed to create renders directory '{}'", dir.display()))?;
        Ok(dir)
    }
}

/// Immediate subdirectories of `project` whose name marks them as scenes, in
/// filesystem listing order.
pub fn list_scenes(project: &Path, layout: &ProjectLayout) -> ReelResult<Vec<SceneRef>> {
    let entries = std::fs::read_dir(project)
        .with_context(|| format!("failed to list project '{}'", project.display()))?;

    let mut scenes = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in '{}'", project.display()))?;
        // Follows symlinks, so a linked scene directory counts.
        if !entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !layout.is_scene_name(&name) {
            continue;
        }
        scenes.push(SceneRef {
            name,
            path: entry.path(),
        });
    }
    Ok(scenes)
}

/// Walk upward from `item` to the nearest directory whose name contains the scene
/// token. The returned path is absolute.
pub fn find_owning_scene(item: &Path, layout: &ProjectLayout) -> ReelResult<PathBuf> {
    let abs = std::path::absolute(item).map_err(|e| {
        ReelError::environment(format!("cannot make '{}' absolute: {e}", item.display()))
    })?;
    let abs = lexically_normalize(&abs);

    for ancestor in abs.ancestors() {
        let Some(name) = ancestor.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if layout.is_scene_name(name) {
            return Ok(ancestor.to_path_buf());
        }
    }
    Err(ReelError::not_in_project(item))
}

/// True if any scene carries a non-empty narration directory.
pub fn uses_narration(project: &Path, layout: &ProjectLayout) -> ReelResult<bool> {
    for scene in list_scenes(project, layout)? {
        let dir = scene.path.join(&layout.narration_dir);
        let Ok(mut entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        if entries.next().is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
