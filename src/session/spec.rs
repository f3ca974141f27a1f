use std::path::PathBuf;

use crate::foundation::error::{ReelError, ReelResult};

/// Host directory exposed inside the process at `target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindMount {
    pub host: PathBuf,
    pub target: String,
}

/// Everything the runtime needs to create one unit of work.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program identity (a container image reference).
    pub image: String,
    pub args: Vec<String>,
    /// `KEY=VALUE` entries.
    pub env: Vec<String>,
    pub mounts: Vec<BindMount>,
}

impl CommandSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    pub fn envs<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env.extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn mount(mut self, host: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        self.mounts.push(BindMount {
            host: host.into(),
            target: target.into(),
        });
        self
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.image.trim().is_empty() {
            return Err(ReelError::validation("command image must not be empty"));
        }
        for entry in &self.env {
            match entry.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => {
                    return Err(ReelError::validation(format!(
                        "environment entry '{entry}' is not KEY=VALUE"
                    )));
                }
            }
        }
        for m in &self.mounts {
            if !m.host.is_absolute() {
                return Err(ReelError::validation(format!(
                    "mount source '{}' must be absolute",
                    m.host.display()
                )));
            }
            if !m.target.starts_with('/') {
                return Err(ReelError::validation(format!(
                    "mount target '{}' must be absolute",
                    m.target
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates() {
        let spec = CommandSpec::new("img:latest")
            .arg("record")
            .args(["/project/demo", "-l", "en-US"])
            .env("A=1")
            .envs(["B=2"])
            .mount("/host/projects", "/project");
        assert_eq!(spec.args, vec!["record", "/project/demo", "-l", "en-US"]);
        assert_eq!(spec.env, vec!["A=1", "B=2"]);
        assert_eq!(spec.mounts.len(), 1);
        spec.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_entries() {
        assert!(CommandSpec::new("").validate().is_err());
        assert!(CommandSpec::new("img").env("NOEQUALS").validate().is_err());
        assert!(CommandSpec::new("img").env("=x").validate().is_err());
        assert!(CommandSpec::new("img").env("EMPTY=").validate().is_ok());
        assert!(
            CommandSpec::new("img")
                .mount("relative/dir", "/data")
                .validate()
                .is_err()
        );
        assert!(
            CommandSpec::new("img")
                .mount("/abs", "data")
                .validate()
                .is_err()
        );
    }
}
