//! Track import
//!
//! Importers hand the store `(display name, bytes)` pairs. The batch
//! importer skips names already in the store, processes one file at a time
//! so `order` follows the sorted file names, and records each file's failure
//! without stopping the batch.

use crate::db::TrackStore;
use crate::error::{Error, Result};
use crate::media::is_audio_file;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedTrack {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a batch import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: Vec<ImportedTrack>,
    pub skipped: Vec<String>,
    pub failed: Vec<ImportFailure>,
}

/// Store one payload under `name`
pub async fn import_bytes(
    store: &TrackStore,
    name: &str,
    media_type: Option<&str>,
    bytes: &[u8],
) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest("track name is empty".to_string()));
    }
    if bytes.is_empty() {
        return Err(Error::BadRequest(format!("{} has no content", name)));
    }
    store.create(name, media_type, bytes).await
}

/// Audio files directly inside `dir`, sorted by file name
async fn audio_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_audio_file(&name) {
            files.push((name, entry.path()));
        }
    }

    files.sort();
    Ok(files)
}

/// Import every audio file in `dir` that is not already stored by name
pub async fn import_folder(store: &TrackStore, dir: &Path) -> Result<ImportReport> {
    if !dir.is_dir() {
        return Err(Error::BadRequest(format!("{} is not a folder", dir.display())));
    }

    let files = audio_files(dir).await?;
    let mut existing: HashSet<String> = store.names().await?;
    let mut report = ImportReport::default();

    info!("Importing {} audio file(s) from {}", files.len(), dir.display());

    for (name, path) in files {
        if existing.contains(&name) {
            report.skipped.push(name);
            continue;
        }

        let outcome = match tokio::fs::read(&path).await {
            Ok(bytes) => import_bytes(store, &name, None, &bytes).await,
            Err(e) => Err(Error::Io(e)),
        };

        match outcome {
            Ok(id) => {
                existing.insert(name.clone());
                report.imported.push(ImportedTrack { id, name });
            }
            Err(e) => {
                warn!("Failed to import {}: {}", path.display(), e);
                report.failed.push(ImportFailure {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Import finished: {} imported, {} skipped, {} failed",
        report.imported.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}
