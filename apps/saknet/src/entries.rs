//! Expands command-line paths into transfer entries.
//!
//! A file argument is sent under its file name; a directory argument is
//! walked recursively and its files are sent relative to the directory.
//! Relative paths use `/` as separator on every platform.
//!
//! File ids are name-based UUIDs over the relative path, size and SHA-256,
//! so re-sending an unchanged file after an interruption presents the same
//! id and the receiver's resume ledger still applies.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use saknet_transfer::{TransferFileEntry, calculate_file_checksum, validate_upload_path};

/// Scans `paths` and hashes every file found. Runs on the blocking pool.
pub async fn collect_entries(paths: Vec<PathBuf>) -> anyhow::Result<Vec<TransferFileEntry>> {
    tokio::task::spawn_blocking(move || scan(&paths)).await?
}

fn scan(paths: &[PathBuf]) -> anyhow::Result<Vec<TransferFileEntry>> {
    let mut found = Vec::new();
    for path in paths {
        let metadata =
            std::fs::metadata(path).with_context(|| format!("cannot read {}", path.display()))?;
        if metadata.is_dir() {
            walk_dir(path, path, &mut found)?;
        } else {
            let name = path
                .file_name()
                .with_context(|| format!("{} has no file name", path.display()))?;
            found.push((path.clone(), name.to_string_lossy().into_owned()));
        }
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(found.len());
    for (absolute_path, relative_path) in found {
        if !seen.insert(relative_path.clone()) {
            bail!("two inputs map to the same destination path: {relative_path}");
        }
        validate_upload_path(&relative_path)?;

        let size_bytes = std::fs::metadata(&absolute_path)?.len();
        let checksum_sha256 = calculate_file_checksum(&absolute_path)
            .with_context(|| format!("hashing {}", absolute_path.display()))?;
        tracing::debug!(path = %relative_path, size = size_bytes, "queued");

        entries.push(TransferFileEntry {
            file_id: stable_file_id(&relative_path, size_bytes, &checksum_sha256),
            absolute_path,
            relative_path,
            size_bytes,
            checksum_sha256,
            acl_sddl: None,
        });
    }
    Ok(entries)
}

const FILE_ID_NAMESPACE: uuid::Uuid =
    uuid::Uuid::from_u128(0x5341_4b4e_6669_6c65_8000_0000_0000_0001);

/// Deterministic id for one file version.
fn stable_file_id(relative_path: &str, size_bytes: u64, checksum_sha256: &str) -> String {
    let name = format!("{relative_path}\0{size_bytes}\0{checksum_sha256}");
    uuid::Uuid::new_v5(&FILE_ID_NAMESPACE, name.as_bytes()).to_string()
}

fn walk_dir(root: &Path, current: &Path, found: &mut Vec<(PathBuf, String)>) -> anyhow::Result<()> {
    let mut children = std::fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(|entry| entry.file_name());

    for entry in children {
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, found)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");
            found.push((path, rel_str));
        }
    }
    Ok(())
}
