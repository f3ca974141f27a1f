use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use serde_json::Value;

use crate::cast::header::{CastHeader, Dimensions};
use crate::foundation::error::{ReelError, ReelResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormalizeOutcome {
    /// Line 0 was rewritten and the file replaced.
    Rewritten,
    /// The header already carried the requested geometry; the file was not touched.
    Unchanged,
}

/// Force the recording's header to `dims`.
///
/// Only the `width` and `height` fields of line 0 change. Everything from the first line
/// terminator onward is copied byte for byte, so the line count is preserved. The new
/// content is written to a sibling temp file and renamed over the original; on any
/// failure the original is left as it was.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn normalize(path: &Path, dims: Dimensions) -> ReelResult<NormalizeOutcome> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    if bytes.is_empty() {
        return Err(ReelError::empty_recording(path));
    }

    let (head, rest) = split_first_line(&bytes);
    let (header, mut value) = parse_header(path, head)?;
    if header.dimensions() == dims {
        tracing::debug!("header already normalized");
        return Ok(NormalizeOutcome::Unchanged);
    }

    let obj = value
        .as_object_mut()
        .ok_or_else(|| ReelError::malformed_metadata(path, "header is not a JSON object"))?;
    obj.insert("width".to_string(), Value::from(dims.width));
    obj.insert("height".to_string(), Value::from(dims.height));
    let new_head = serde_json::to_vec(&value)
        .map_err(|e| ReelError::malformed_metadata(path, e.to_string()))?;

    replace_atomically(path, &new_head, rest)?;
    tracing::debug!(
        from_width = header.width,
        from_height = header.height,
        width = dims.width,
        height = dims.height,
        "header rewritten"
    );
    Ok(NormalizeOutcome::Rewritten)
}

/// Parse line 0 of the capture at `path`.
pub fn read_header(path: &Path) -> ReelResult<CastHeader> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    if bytes.is_empty() {
        return Err(ReelError::empty_recording(path));
    }
    let (head, _) = split_first_line(&bytes);
    parse_header(path, head).map(|(header, _)| header)
}

fn parse_header(path: &Path, head: &[u8]) -> ReelResult<(CastHeader, Value)> {
    let text = std::str::from_utf8(head)
        .map_err(|e| ReelError::malformed_metadata(path, format!("header is not UTF-8: {e}")))?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ReelError::malformed_metadata(path, e.to_string()))?;
    if !value.is_object() {
        return Err(ReelError::malformed_metadata(
            path,
            "header is not a JSON object",
        ));
    }
    let header: CastHeader = serde_json::from_value(value.clone())
        .map_err(|e| ReelError::malformed_metadata(path, e.to_string()))?;
    Ok((header, value))
}

/// Split into line 0 (without its terminator) and everything from the terminator on.
/// A `\r\n` terminator stays with the tail.
fn split_first_line(bytes: &[u8]) -> (&[u8], &[u8]) {
    match bytes.iter().position(|&b| b == b'\n') {
        Some(nl) => {
            let end = if nl > 0 && bytes[nl - 1] == b'\r' {
                nl - 1
            } else {
                nl
            };
            (&bytes[..end], &bytes[end..])
        }
        None => (bytes, &[]),
    }
}

fn replace_atomically(path: &Path, head: &[u8], rest: &[u8]) -> ReelResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let perms = std::fs::metadata(path)
        .with_context(|| format!("failed to stat '{}'", path.display()))?
        .permissions();

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in '{}'", dir.display()))?;
    tmp.write_all(head)
        .and_then(|_| tmp.write_all(rest))
        .and_then(|_| tmp.as_file().sync_all())
        .with_context(|| format!("failed to write replacement for '{}'", path.display()))?;
    tmp.as_file()
        .set_permissions(perms)
        .with_context(|| format!("failed to copy permissions of '{}'", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_terminator_with_tail() {
        assert_eq!(split_first_line(b"{}\n[1]\n"), (&b"{}"[..], &b"\n[1]\n"[..]));
        assert_eq!(split_first_line(b"{}\r\n[1]"), (&b"{}"[..], &b"\r\n[1]"[..]));
        assert_eq!(split_first_line(b"{}"), (&b"{}"[..], &b""[..]));
        assert_eq!(split_first_line(b"\n"), (&b""[..], &b"\n"[..]));
    }

    #[test]
    fn rewrites_only_geometry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.cast");
        let body = "{\"version\": 2, \"width\": 189, \"height\": 50, \"timestamp\": 1}\n[0.1, \"o\", \"hi\"]\n[0.2, \"o\", \"  x\"]\n";
        std::fs::write(&path, body).unwrap();

        let out = normalize(&path, Dimensions::new(80, 24)).unwrap();
        assert_eq!(out, NormalizeOutcome::Rewritten);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), body.split('\n').count());
        assert_eq!(
            lines[0],
            r#"{"version":2,"width":80,"height":24,"timestamp":1}"#
        );
        assert_eq!(lines[1], "[0.1, \"o\", \"hi\"]");
        assert_eq!(lines[2], "[0.2, \"o\", \"  x\"]");
    }

    #[test]
    fn header_only_file_is_normalized() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.cast");
        std::fs::write(&path, r#"{"version":2,"width":1,"height":1}"#).unwrap();
        normalize(&path, Dimensions::new(80, 24)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"version":2,"width":80,"height":24}"#
        );
    }

    #[test]
    fn matching_header_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.cast");
        let body = "{\"version\": 2, \"width\": 80, \"height\": 24}\n[0.1, \"o\", \"hi\"]\n";
        std::fs::write(&path, body).unwrap();
        assert_eq!(
            normalize(&path, Dimensions::new(80, 24)).unwrap(),
            NormalizeOutcome::Unchanged
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
    }

    #[test]
    fn empty_and_malformed_inputs_fail_without_touching_file() {
        let tmp = tempfile::tempdir().unwrap();

        let empty = tmp.path().join("empty.cast");
        std::fs::write(&empty, "").unwrap();
        let err = normalize(&empty, Dimensions::default()).unwrap_err();
        assert!(matches!(err, ReelError::EmptyRecording { .. }));

        let bad = tmp.path().join("bad.cast");
        std::fs::write(&bad, "not json\n[0.1, \"o\", \"hi\"]\n").unwrap();
        let err = normalize(&bad, Dimensions::default()).unwrap_err();
        assert!(matches!(err, ReelError::MalformedMetadata { .. }));
        assert_eq!(
            std::fs::read_to_string(&bad).unwrap(),
            "not json\n[0.1, \"o\", \"hi\"]\n"
        );

        let event_first = tmp.path().join("event.cast");
        std::fs::write(&event_first, "[0.1, \"o\", \"hi\"]\n").unwrap();
        let err = normalize(&event_first, Dimensions::default()).unwrap_err();
        assert!(matches!(err, ReelError::MalformedMetadata { .. }));
    }

    #[test]
    fn read_header_reports_geometry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.cast");
        std::fs::write(&path, "{\"version\":2,\"width\":100,\"height\":30}\r\n").unwrap();
        assert_eq!(
            read_header(&path).unwrap().dimensions(),
            Dimensions::new(100, 30)
        );
    }
}
