//! Library view resolver
//!
//! Produces the ordered track sequence the session controller navigates:
//! either the whole library in `order` sequence, or one playlist in its own
//! member order.

use crate::db::{PlaylistIndex, TrackRecord, TrackStore};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which sequence is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "playlist_id", rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Library,
    Playlist(i64),
}

impl ViewMode {
    pub fn playlist_id(&self) -> Option<i64> {
        match self {
            ViewMode::Library => None,
            ViewMode::Playlist(id) => Some(*id),
        }
    }
}

impl From<Option<i64>> for ViewMode {
    fn from(playlist_id: Option<i64>) -> Self {
        playlist_id.map_or(ViewMode::Library, ViewMode::Playlist)
    }
}

/// Sort by `(order, id)` and renumber `order` to match position
///
/// Returns the `(id, order)` pairs that changed.
fn normalize(records: &mut [TrackRecord]) -> Vec<(i64, i64)> {
    records.sort_by_key(|r| (r.order, r.id));

    let mut changed = Vec::new();
    for (position, record) in records.iter_mut().enumerate() {
        let position = position as i64;
        if record.order != position {
            record.order = position;
            changed.push((record.id, position));
        }
    }
    changed
}

#[derive(Clone)]
pub struct LibraryResolver {
    tracks: TrackStore,
    playlists: PlaylistIndex,
}

impl LibraryResolver {
    pub fn new(tracks: TrackStore, playlists: PlaylistIndex) -> Self {
        Self { tracks, playlists }
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn playlists(&self) -> &PlaylistIndex {
        &self.playlists
    }

    pub async fn resolve(&self, mode: ViewMode) -> Result<Vec<TrackRecord>> {
        match mode {
            ViewMode::Library => self.resolve_library().await,
            ViewMode::Playlist(id) => self.resolve_playlist(id).await,
        }
    }

    /// Whole library, normalized
    ///
    /// Order corrections are written back right away, but a failed write only
    /// logs a warning: the returned sequence is already correct.
    pub async fn resolve_library(&self) -> Result<Vec<TrackRecord>> {
        let mut records = self.tracks.get_all().await?;
        let changed = normalize(&mut records);

        if !changed.is_empty() {
            debug!("Normalizing order of {} track(s)", changed.len());
            if let Err(e) = self.tracks.apply_orders(&changed).await {
                warn!("Failed to persist normalized order: {}", e);
            }
        }

        Ok(records)
    }

    /// One playlist in member order; ids without a track are skipped
    pub async fn resolve_playlist(&self, playlist_id: i64) -> Result<Vec<TrackRecord>> {
        let playlist = self.playlists.get(playlist_id).await?;

        let mut by_id: HashMap<i64, TrackRecord> = self
            .tracks
            .get_all()
            .await?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        Ok(playlist
            .song_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    /// Swap the library positions `index_a` and `index_b`
    pub async fn reorder_library(&self, index_a: usize, index_b: usize) -> Result<Vec<TrackRecord>> {
        let mut records = self.resolve_library().await?;

        for index in [index_a, index_b] {
            if index >= records.len() {
                return Err(Error::Range(format!(
                    "index {} outside library of {} track(s)",
                    index,
                    records.len()
                )));
            }
        }

        let (id_a, id_b) = (records[index_a].id, records[index_b].id);
        self.tracks
            .apply_orders(&[(id_a, index_b as i64), (id_b, index_a as i64)])
            .await?;

        records.swap(index_a, index_b);
        records[index_a].order = index_a as i64;
        records[index_b].order = index_b as i64;
        Ok(records)
    }
}
