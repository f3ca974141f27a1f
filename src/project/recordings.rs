use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{ReelError, ReelResult};
use crate::project::layout::ProjectLayout;
use crate::project::scene::{SceneRef, list_scenes};

/// Capture files inside the scene's recordings directory.
///
/// An absent recordings directory is reported as [`ReelError::RecordingsDirAbsent`],
/// which callers treat as "skip this scene". A present but empty directory is `Ok(vec![])`.
pub fn list_recordings(scene: &Path, layout: &ProjectLayout) -> ReelResult<Vec<PathBuf>> {
    let dir = scene.join(&layout.recordings_dir);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReelError::recordings_dir_absent(&dir));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to list recordings in '{}'", dir.display()))
                .into());
        }
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in '{}'", dir.display()))?;
        let path = entry.path();
        if !is_recording(&path, layout) {
            continue;
        }
        if !path.is_file() {
            continue;
        }
        out.push(path);
    }
    Ok(out)
}

pub fn is_recording(path: &Path, layout: &ProjectLayout) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == layout.recording_ext)
}

/// Discovery result for one scene.
#[derive(Clone, Debug)]
pub enum SceneRecordings {
    Found(Vec<PathBuf>),
    /// The directory exists but holds no capture files.
    Empty,
    /// The recordings directory does not exist.
    Absent,
}

/// Every scene of a project paired with what was found in it.
///
/// Scenes whose recordings cannot be listed for reasons other than absence are
/// returned as errors per scene, so one unreadable scene does not hide the others.
pub fn discover(
    project: &Path,
    layout: &ProjectLayout,
) -> ReelResult<Vec<(SceneRef, ReelResult<SceneRecordings>)>> {
    let scenes = list_scenes(project, layout)?;
    let mut out = Vec::with_capacity(scenes.len());
    for scene in scenes {
        let found = match list_recordings(&scene.path, layout) {
            Ok(paths) if paths.is_empty() => Ok(SceneRecordings::Empty),
            Ok(paths) => Ok(SceneRecordings::Found(paths)),
            Err(ReelError::RecordingsDirAbsent { .. }) => Ok(SceneRecordings::Absent),
            Err(e) => Err(e),
        };
        out.push((scene, found));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "{}\n").unwrap();
    }

    #[test]
    fn filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let scene = tmp.path().join("scene_2");
        touch(&scene.join("recordings/a.cast"));
        touch(&scene.join("recordings/notes.txt"));
        touch(&scene.join("recordings/b.json"));
        touch(&scene.join("recordings/cast"));
        std::fs::create_dir_all(scene.join("recordings/dir.cast")).unwrap();

        let found = list_recordings(&scene, &ProjectLayout::default()).unwrap();
        assert_eq!(found, vec![scene.join("recordings/a.cast")]);
    }

    #[test]
    fn absent_dir_is_distinct_from_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::default();

        let absent = tmp.path().join("scene_1");
        std::fs::create_dir_all(&absent).unwrap();
        let err = list_recordings(&absent, &layout).unwrap_err();
        assert!(matches!(err, ReelError::RecordingsDirAbsent { .. }));

        let empty = tmp.path().join("scene_2");
        std::fs::create_dir_all(empty.join("recordings")).unwrap();
        assert!(list_recordings(&empty, &layout).unwrap().is_empty());
    }

    #[test]
    fn discover_classifies_each_scene() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::default();
        touch(&tmp.path().join("scene_1/recordings/a.cast"));
        std::fs::create_dir_all(tmp.path().join("scene_2/recordings")).unwrap();
        std::fs::create_dir_all(tmp.path().join("scene_3")).unwrap();

        let mut found = discover(tmp.path(), &layout).unwrap();
        found.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        assert!(matches!(found[0].1, Ok(SceneRecordings::Found(ref p)) if p.len() == 1));
        assert!(matches!(found[1].1, Ok(SceneRecordings::Empty)));
        assert!(matches!(found[2].1, Ok(SceneRecordings::Absent)));
    }
}
