// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work directory staging for submitted code payloads.
//!
//! `code` is either source text written verbatim to the entrypoint, or a
//! base64 payload whose decoded bytes carry the gzip magic, in which case
//! it is extracted as a gzip tar archive. Every materialized path must stay
//! strictly under the work directory.

use base64::Engine as _;
use flate2::read::GzDecoder;
use std::io::Read;
use crate::frame::MAX_MESSAGE_SIZE;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// First two bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors from payload staging
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path escapes work directory: {0}")]
    PathEscape(String),

    #[error("archive member too large: {path} ({size} bytes)")]
    MemberTooLarge { path: String, size: u64 },

    #[error("archive error: {0}")]
    Archive(String),
}

/// Remove and recreate `workdir`, then materialize `code` into it.
///
/// Archive payloads are extracted member by member; plain payloads are
/// written verbatim to `entrypoint`.
pub fn stage_payload(workdir: &Path, code: &str, entrypoint: &str) -> Result<(), PayloadError> {
    match std::fs::remove_dir_all(workdir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(workdir)?;

    if let Some(archive) = decode_archive(code) {
        return extract_archive(workdir, &archive);
    }

    let target = secured_join(workdir, entrypoint)?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, code)?;
    Ok(())
}

/// Decode `code` as base64 and sniff the gzip magic.
///
/// Returns the decoded bytes only when both hold; plain source text fails
/// one of the two checks and is written verbatim by the caller.
fn decode_archive(code: &str) -> Option<Vec<u8>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(code.trim())
        .ok()?;
    if decoded.len() >= 2 && decoded[..2] == GZIP_MAGIC {
        Some(decoded)
    } else {
        None
    }
}

/// Extract a gzip tar archive under `workdir`.
///
/// Directories are created, regular files written with the member mode
/// masked to `0o755` and bounded per file, all other member types ignored.
fn extract_archive(workdir: &Path, archive: &[u8]) -> Result<(), PayloadError> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));

    for entry in tar.entries().map_err(|e| PayloadError::Archive(e.to_string()))? {
        let mut entry = entry.map_err(|e| PayloadError::Archive(e.to_string()))?;

        let member_path = entry
            .path()
            .map_err(|e| PayloadError::Archive(e.to_string()))?
            .into_owned();
        let rel = member_path.to_string_lossy().into_owned();
        let target = secured_join(workdir, &rel)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&target)?;
            }
            tar::EntryType::Regular => {
                let size = entry.header().size().unwrap_or(0);
                if size > MAX_MESSAGE_SIZE as u64 {
                    return Err(PayloadError::MemberTooLarge { path: rel, size });
                }
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let mut contents = Vec::with_capacity(size as usize);
                entry
                    .read_to_end(&mut contents)
                    .map_err(|e| PayloadError::Archive(e.to_string()))?;
                std::fs::write(&target, contents)?;

                let mode = entry.header().mode().unwrap_or(0o644) & 0o755;
                set_mode(&target, mode)?;
            }
            _ => {} // symlinks, fifos, devices: ignored
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), PayloadError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), PayloadError> {
    Ok(())
}

/// Join `rel` under `root`, rejecting any component that would resolve
/// outside the work directory.
pub(crate) fn secured_join(root: &Path, rel: &str) -> Result<PathBuf, PayloadError> {
    let rel_path = Path::new(rel);
    if rel_path.components().count() == 0 {
        return Err(PayloadError::PathEscape(rel.to_string()));
    }

    let mut target = root.to_path_buf();
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PayloadError::PathEscape(rel.to_string()));
            }
        }
    }
    if target == root {
        return Err(PayloadError::PathEscape(rel.to_string()));
    }
    Ok(target)
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
