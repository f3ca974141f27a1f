use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::cast::header::Dimensions;
use crate::foundation::error::{ReelError, ReelResult};
use crate::project::layout::ProjectLayout;

/// File name of the per-user configuration inside the home directory.
pub const CONFIG_FILE_NAME: &str = ".castreel.json";

/// Container images the pipeline runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    /// Image providing `setup`, `record` and `render-video`.
    pub recorder: String,
    /// Image converting one capture into a render artifact.
    pub renderer: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            recorder: "trickytroll/good-bot:latest".to_string(),
            renderer: "asciinema/asciicast2gif".to_string(),
        }
    }
}

impl Images {
    pub fn all(&self) -> [&str; 2] {
        [&self.recorder, &self.renderer]
    }
}

/// User configuration, stored as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service-account file used for narration (text to speech).
    pub tts_credentials: Option<PathBuf>,
    /// File of `KEY=VALUE` lines passed to the recorder as environment.
    pub passwords_env: Option<PathBuf>,
    /// Narration language code.
    pub language: String,
    /// Narration voice name.
    pub language_name: String,
    pub images: Images,
    /// Geometry every capture is normalized to before rendering.
    pub dimensions: Dimensions,
    pub layout: ProjectLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tts_credentials: None,
            passwords_env: None,
            language: "en-US".to_string(),
            language_name: "en-US-Standard-C".to_string(),
            images: Images::default(),
            dimensions: Dimensions::default(),
            layout: ProjectLayout::default(),
        }
    }
}

impl Config {
    /// `~/.castreel.json`.
    pub fn default_path() -> ReelResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ReelError::environment("cannot determine home directory"))?;
        Ok(home.join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or from [`Config::default_path`] when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    #[tracing::instrument]
    pub fn load(path: Option<&Path>) -> ReelResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read config '{}'", path.display()))
                    .into());
            }
        };

        let cfg = Self::from_json(&text)
            .map_err(|e| ReelError::config(format!("'{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_pretty(&self) -> ReelResult<String> {
        serde_json::to_string_pretty(self)
            .context("failed to serialize config")
            .map_err(Into::into)
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.dimensions.width == 0 || self.dimensions.height == 0 {
            return Err(ReelError::config(format!(
                "dimensions must be non-zero, got {}x{}",
                self.dimensions.width, self.dimensions.height
            )));
        }
        if self.images.recorder.trim().is_empty() || self.images.renderer.trim().is_empty() {
            return Err(ReelError::config("images must not be empty"));
        }
        if self.language.trim().is_empty() {
            return Err(ReelError::config("language must not be empty"));
        }
        self.layout
            .validate()
            .map_err(|e| ReelError::config(e.to_string()))
    }
}

/// Environment entries from a passwords file: one `KEY=VALUE` per line, blank lines and
/// `#` comments ignored.
pub fn read_env_file(path: &Path) -> ReelResult<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read env file '{}'", path.display()))?;
    parse_env_lines(&text).map_err(|e| ReelError::config(format!("'{}': {e}", path.display())))
}

fn parse_env_lines(text: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, _)) if !key.trim().is_empty() => out.push(line.to_string()),
            _ => return Err(format!("line {} is not KEY=VALUE", idx + 1)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let cfg = Config::default();
        let text = cfg.to_json_pretty().unwrap();
        assert_eq!(Config::from_json(&text).unwrap(), cfg);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg = Config::from_json(
            r#"{"tts_credentials": "/keys/tts.json", "images": {"renderer": "local/gif"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.tts_credentials, Some(PathBuf::from("/keys/tts.json")));
        assert_eq!(cfg.images.renderer, "local/gif");
        assert_eq!(cfg.images.recorder, Images::default().recorder);
        assert_eq!(cfg.dimensions, Dimensions::new(80, 24));
        assert_eq!(cfg.language, "en-US");
    }

    #[test]
    fn validate_rejects_zero_dimensions() {
        let mut cfg = Config::default();
        cfg.dimensions.height = 0;
        assert!(matches!(cfg.validate(), Err(ReelError::Config(_))));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&tmp.path().join("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("nope.json"), "{err}");
    }

    #[test]
    fn load_reads_and_validates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cfg.json");
        std::fs::write(&path, r#"{"dimensions": {"width": 100, "height": 30}}"#).unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.dimensions, Dimensions::new(100, 30));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ReelError::Config(_))
        ));
    }

    #[test]
    fn env_lines_skip_blanks_and_comments() {
        let text = "# creds\nDB_PASS=hunter2\n\n  API_KEY=abc  \nEMPTY=\n";
        assert_eq!(
            parse_env_lines(text).unwrap(),
            vec!["DB_PASS=hunter2", "API_KEY=abc", "EMPTY="]
        );
        assert_eq!(
            parse_env_lines("OK=1\nbroken\n").unwrap_err(),
            "line 2 is not KEY=VALUE"
        );
    }
}
