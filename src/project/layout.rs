use serde::{Deserialize, Serialize};

use crate::foundation::error::{ReelError, ReelResult};

/// Naming conventions of a project directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectLayout {
    /// A directory whose name contains this token is a scene. Substring match, so
    /// `old_scene_1` and `scene_1_draft` both count.
    pub scene_token: String,
    pub recordings_dir: String,
    pub renders_dir: String,
    /// Extension of capture files, without the dot.
    pub recording_ext: String,
    /// Extension given to render artifacts, without the dot.
    pub render_ext: String,
    /// Per-scene directory holding narration text.
    pub narration_dir: String,
    /// Project-level directory the assembled video is written to.
    pub final_dir: String,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            scene_token: "scene_".to_string(),
            recordings_dir: "recordings".to_string(),
            renders_dir: "renders".to_string(),
            recording_ext: "cast".to_string(),
            render_ext: "gif".to_string(),
            narration_dir: "read".to_string(),
            final_dir: "final".to_string(),
        }
    }
}

impl ProjectLayout {
    pub fn is_scene_name(&self, name: &str) -> bool {
        name.contains(&self.scene_token)
    }

    pub fn validate(&self) -> ReelResult<()> {
        let fields = [
            ("scene_token", &self.scene_token),
            ("recordings_dir", &self.recordings_dir),
            ("renders_dir", &self.renders_dir),
            ("recording_ext", &self.recording_ext),
            ("render_ext", &self.render_ext),
            ("narration_dir", &self.narration_dir),
            ("final_dir", &self.final_dir),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ReelError::validation(format!(
                    "layout.{name} must not be empty"
                )));
            }
        }
        if self.recordings_dir == self.renders_dir {
            return Err(ReelError::validation(
                "layout.recordings_dir and layout.renders_dir must differ",
            ));
        }
        Ok(())
    }
}
