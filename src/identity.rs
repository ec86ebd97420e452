//! Content-bound partition naming.
//!
//! A partition table's name is derived from the source file's stat metadata,
//! so replacing the file with different content names a *new* table instead of
//! silently reusing stale rows. Only size and modification time participate in
//! the hash; those are the portable stat fields that change whenever the
//! export is regenerated.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::error::{IndexError, Result};

/// Resolve the partition table name for `path` within `dataset`.
///
/// Pure apart from one `stat` call. The name is `{dataset}_{stem}_{hash16}`
/// where `hash16` is the first 16 hex digits of a SHA-256 over the
/// canonicalized stat record. No collision handling is attempted.
pub fn table_name(dataset: &str, path: &Path) -> Result<String> {
    let meta = fs::metadata(path).map_err(|e| IndexError::SourceUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mtime = meta.modified().map_err(|e| IndexError::SourceUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (mtime_s, mtime_ns) = match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => (-(e.duration().as_secs() as i64), e.duration().subsec_nanos()),
    };

    let mut hasher = Sha256::new();
    hasher.update(format!(
        "len={};mtime_s={};mtime_ns={}",
        meta.len(),
        mtime_s,
        mtime_ns
    ));
    let digest = hasher.finalize();
    let hash16: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    Ok(format!("{dataset}_{}_{hash16}", sanitize(&stem)))
}

/// Table identifiers stay within `[a-z0-9_]` so they never need dialect
/// specific quoting rules.
fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
