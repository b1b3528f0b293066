use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Rejects relative paths that are syntactically unsafe on any platform.
///
/// Rejects:
/// - Empty paths and embedded NULs
/// - Absolute paths (Unix `/`, Windows `\`)
/// - Drive letters (`C:`) and UNC prefixes (`\\server`)
///
/// Traversal is checked after normalisation by [`resolve_destination`].
pub fn validate_upload_path(file_path: &str) -> Result<(), TransferError> {
    if file_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if file_path.contains('\0') {
        return Err(TransferError::InvalidPath(format!(
            "NUL byte not allowed: {file_path:?}"
        )));
    }

    if file_path.starts_with('/') || file_path.starts_with('\\') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    let bytes = file_path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(TransferError::InvalidPath(format!(
            "drive letter not allowed: {file_path}"
        )));
    }

    for component in Path::new(file_path).components() {
        match component {
            Component::Prefix(_) => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {file_path}"
                )));
            }
            Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {file_path}"
                )));
            }
            Component::CurDir | Component::ParentDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Resolves `relative_path` under `base`, rejecting anything that would
/// land outside it.
///
/// The join is normalised lexically (`.` dropped, `..` popped); a `..`
/// that climbs above `base`, or a result equal to `base` itself, is
/// rejected. Comparison is case- and separator-insensitive on Windows.
pub fn resolve_destination(base: &Path, relative_path: &str) -> Result<PathBuf, TransferError> {
    validate_upload_path(relative_path)?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in relative_path.split(is_separator) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(TransferError::InvalidPath(format!(
                        "path escapes destination: {relative_path}"
                    )));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(TransferError::InvalidPath(format!(
            "path resolves to the destination root: {relative_path}"
        )));
    }

    let base = normalize(base);
    let mut resolved = base.clone();
    for segment in &segments {
        resolved.push(segment);
    }

    let mut prefix = comparable(&base);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    let candidate = comparable(&resolved);
    if !candidate.starts_with(&prefix) || candidate.split('/').any(|s| s == "..") {
        return Err(TransferError::InvalidPath(format!(
            "path escapes destination: {relative_path}"
        )));
    }

    Ok(resolved)
}

#[cfg(windows)]
fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

#[cfg(not(windows))]
fn is_separator(c: char) -> bool {
    c == '/'
}

/// Lexical normalisation: drops `.` and folds `..` into its parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(windows)]
fn comparable(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

#[cfg(not(windows))]
fn comparable(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
