//! Persistent store: tracks, playlists, runtime settings

pub mod playlists;
pub mod settings;
pub mod tracks;

pub use playlists::{PlaylistIndex, PlaylistRecord};
pub use tracks::{ContentInfo, TrackPatch, TrackRecord, TrackStore};

use crate::error::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Transaction holding the database write lock from its first statement
///
/// Read-then-write transactions must start this way: under WAL a deferred
/// transaction cannot upgrade its read snapshot once another writer has
/// committed, and that failure is not retried by the busy timeout.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}
