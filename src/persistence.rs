//! On-disk index snapshots.
//!
//! A snapshot is the postcard encoding of every indexed entry, compressed
//! with zstd. It is written to a sibling temp file and renamed into place so
//! readers never observe a partial file. Any snapshot that fails to decode
//! or carries another format version is ignored: the index can always be
//! rebuilt from the filesystem.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::thread::available_parallelism;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::types::{unix_now_millis, IndexedEntry};

/// Snapshot format version. Bump when `IndexedEntry` or the envelope changes.
pub const SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 6;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    saved_at: u64,
    entries: &'a [IndexedEntry],
}

/// A decoded snapshot.
#[derive(Debug, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    /// Unix timestamp in milliseconds.
    pub saved_at: u64,
    pub entries: Vec<IndexedEntry>,
}

/// Writes `entries` to `path` atomically. Returns the size of the written file.
pub fn save_snapshot(path: &Path, entries: &[IndexedEntry]) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| SearchError::from_io(error, parent))?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let output = File::create(&tmp_path).map_err(|error| SearchError::from_io(error, &tmp_path))?;
        let mut encoder = zstd::Encoder::new(output, ZSTD_LEVEL).map_err(|error| {
            SearchError::Serialization(format!("failed to create zstd encoder: {error}"))
        })?;
        let threads = available_parallelism().map(|n| n.get() as u32).unwrap_or(4);
        encoder.multithread(threads).map_err(|error| {
            SearchError::Serialization(format!("failed to enable multi-threaded zstd: {error}"))
        })?;

        let mut writer = BufWriter::new(encoder);
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            saved_at: unix_now_millis(),
            entries,
        };
        postcard::to_io(&snapshot, &mut writer).map_err(|error| {
            SearchError::Serialization(format!("failed to encode index snapshot: {error}"))
        })?;
        writer.flush()?;
        let encoder = writer.into_inner().map_err(|error| error.into_error())?;
        let file = encoder.finish()?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path).map_err(|error| SearchError::from_io(error, path))?;
    let bytes = fs::metadata(path)?.len();
    log::info!(
        "wrote search index snapshot path={} entries={} bytes={}",
        path.display(),
        entries.len(),
        bytes
    );
    Ok(bytes)
}

/// Reads a snapshot. Missing, unreadable or outdated files yield `None`.
pub fn load_snapshot(path: &Path) -> Option<IndexSnapshot> {
    let input = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return None,
        Err(error) => {
            log::warn!("search index snapshot read failed for {}: {error}", path.display());
            return None;
        }
    };
    let decoder = match zstd::Decoder::new(input) {
        Ok(decoder) => decoder,
        Err(error) => {
            log::warn!("search index snapshot decompress failed for {}: {error}", path.display());
            return None;
        }
    };

    let mut input = BufReader::new(decoder);
    let mut scratch = vec![0u8; 4 * 1024];
    let snapshot: IndexSnapshot = match postcard::from_io((&mut input, &mut scratch)) {
        Ok((snapshot, _)) => snapshot,
        Err(error) => {
            log::warn!("search index snapshot decode failed for {}: {error}", path.display());
            return None;
        }
    };

    if snapshot.version != SNAPSHOT_VERSION {
        log::debug!(
            "search index snapshot version mismatch: {} != {}",
            snapshot.version,
            SNAPSHOT_VERSION
        );
        return None;
    }

    log::debug!(
        "loaded search index snapshot path={} entries={}",
        path.display(),
        snapshot.entries.len()
    );
    Some(snapshot)
}

/// Size of the snapshot file, if one exists.
pub fn snapshot_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|metadata| metadata.len())
}
