use std::path::{Path, PathBuf};

use crate::foundation::error::{ReelError, ReelResult};

/// Resolve a user-supplied path to an absolute path.
///
/// `~` and `~/...` expand to the home directory, `.` and `./...` expand relative to the
/// current working directory, and everything else goes through [`std::path::absolute`].
/// The result is not required to exist; see [`exists`].
pub fn resolve(input: &str) -> ReelResult<PathBuf> {
    if let Some(rest) = strip_token(input, "~") {
        let home = dirs::home_dir()
            .ok_or_else(|| ReelError::environment("cannot determine home directory"))?;
        return Ok(join_rest(home, rest));
    }

    if let Some(rest) = strip_token(input, ".") {
        let cwd = current_dir()?;
        return Ok(join_rest(cwd, rest));
    }

    std::path::absolute(input).map_err(|e| {
        ReelError::environment(format!("cannot make '{input}' absolute: {e}"))
    })
}

pub fn exists(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}

pub fn is_directory(path: &Path) -> ReelResult<bool> {
    use anyhow::Context as _;
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to stat '{}'", path.display()))?;
    Ok(meta.is_dir())
}

/// Absolute directory containing `path`. Used as the host side of bind mounts.
pub fn parent_dir(path: &Path) -> ReelResult<PathBuf> {
    let abs = std::path::absolute(path).map_err(|e| {
        ReelError::environment(format!("cannot make '{}' absolute: {e}", path.display()))
    })?;
    match abs.parent() {
        Some(parent) => Ok(parent.to_path_buf()),
        None => Ok(abs),
    }
}

/// Final path component as a UTF-8 string.
pub fn file_name_str(path: &Path) -> ReelResult<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ReelError::validation(format!(
                "'{}' has no usable file name",
                path.display()
            ))
        })
}

fn current_dir() -> ReelResult<PathBuf> {
    std::env::current_dir()
        .map_err(|e| ReelError::environment(format!("cannot determine working directory: {e}")))
}

/// Returns the remainder after a leading `token` when `token` is the whole input or is
/// followed by a separator.
fn strip_token<'a>(input: &'a str, token: &str) -> Option<&'a str> {
    let rest = input.strip_prefix(token)?;
    if rest.is_empty() {
        return Some("");
    }
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if std::path::is_separator(c) => Some(chars.as_str()),
        _ => None,
    }
}

fn join_rest(base: PathBuf, rest: &str) -> PathBuf {
    if rest.is_empty() {
        base
    } else {
        base.join(rest)
    }
}
