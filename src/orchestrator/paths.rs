//! Request path confinement
//!
//! Two checks: a lexical one before touching the filesystem, and a
//! canonical one that catches symlinks pointing outside the served root.

use crate::error::OrchestratorError;
use std::path::{Path, PathBuf};

/// Normalize a request path into a slash-separated relative path
///
/// Empty and `.` segments are dropped and backslashes count as separators.
/// Any `..` segment, drive prefix or NUL byte is rejected, whether or not
/// the target exists.
pub fn sanitize(request: &str) -> Result<String, OrchestratorError> {
    let escape = || OrchestratorError::PathEscape(request.to_string());

    let mut parts = Vec::new();
    for segment in request.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(escape()),
            s if s.contains('\0') => return Err(escape()),
            s if s.len() >= 2 && s.as_bytes()[1] == b':' && parts.is_empty() => {
                return Err(escape())
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Resolve a sanitized relative path against the canonical root
pub async fn confine(root: &Path, rel: &str) -> Result<PathBuf, OrchestratorError> {
    let joined = rel.split('/').filter(|s| !s.is_empty()).fold(root.to_path_buf(), |p, s| p.join(s));

    let canonical = tokio::fs::canonicalize(&joined).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            OrchestratorError::NotFound(rel.to_string())
        } else {
            OrchestratorError::Io(format!("{}: {}", rel, e))
        }
    })?;

    if !canonical.starts_with(root) {
        return Err(OrchestratorError::PathEscape(rel.to_string()));
    }
    Ok(canonical)
}
