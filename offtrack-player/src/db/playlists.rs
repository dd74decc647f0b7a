//! Playlist index
//!
//! Playlists are stored relationally: `playlists` holds the record and
//! `playlist_members` holds one row per (playlist, track) with the track's
//! position in that playlist. Positions are kept contiguous from zero.

use crate::db::begin_write;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistRecord {
    pub id: i64,
    pub name: String,
    /// Member track ids in playlist order
    pub song_ids: Vec<i64>,
    pub date_created: DateTime<Utc>,
}

/// Renumber a playlist's members `0..len`, keeping their relative order
pub(crate) async fn compact_positions(conn: &mut SqliteConnection, playlist_id: i64) -> Result<()> {
    let members = member_ids(conn, playlist_id).await?;

    for (position, track_id) in members.iter().enumerate() {
        sqlx::query(
            "UPDATE playlist_members SET position = ? WHERE playlist_id = ? AND track_id = ?",
        )
        .bind(position as i64)
        .bind(playlist_id)
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn member_ids(conn: &mut SqliteConnection, playlist_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "SELECT track_id FROM playlist_members WHERE playlist_id = ? ORDER BY position, track_id",
    )
    .bind(playlist_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

async fn ensure_playlist(conn: &mut SqliteConnection, playlist_id: i64) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM playlists WHERE id = ?")
        .bind(playlist_id)
        .fetch_optional(&mut *conn)
        .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| Error::NotFound(format!("playlist {}", playlist_id)))
}

#[derive(Clone)]
pub struct PlaylistIndex {
    pool: SqlitePool,
}

impl PlaylistIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// New empty playlist; names need not be unique
    pub async fn create(&self, name: &str) -> Result<i64> {
        let id = sqlx::query("INSERT INTO playlists (name, date_created) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        info!("Created playlist {} ({})", id, name);
        Ok(id)
    }

    /// All playlists ordered by id
    pub async fn list(&self) -> Result<Vec<PlaylistRecord>> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query("SELECT id, name, date_created FROM playlists ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;

        let mut playlists = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            playlists.push(PlaylistRecord {
                id,
                name: row.try_get("name")?,
                song_ids: member_ids(&mut *conn, id).await?,
                date_created: row.try_get("date_created")?,
            });
        }
        Ok(playlists)
    }

    pub async fn get(&self, playlist_id: i64) -> Result<PlaylistRecord> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query("SELECT id, name, date_created FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| Error::NotFound(format!("playlist {}", playlist_id)))?;

        Ok(PlaylistRecord {
            id: playlist_id,
            name: row.try_get("name")?,
            song_ids: member_ids(&mut *conn, playlist_id).await?,
            date_created: row.try_get("date_created")?,
        })
    }

    /// Append a track; adding an existing member changes nothing
    pub async fn add_member(&self, playlist_id: i64, track_id: i64) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;

        ensure_playlist(&mut *tx, playlist_id).await?;

        let track: Option<i64> = sqlx::query_scalar("SELECT id FROM tracks WHERE id = ?")
            .bind(track_id)
            .fetch_optional(&mut *tx)
            .await?;
        if track.is_none() {
            return Err(Error::NotFound(format!("track {}", track_id)));
        }

        let len: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM playlist_members WHERE playlist_id = ?",
        )
        .bind(playlist_id)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO playlist_members (playlist_id, track_id, position) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(track_id)
        .bind(len)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if inserted == 0 {
            debug!("Track {} already in playlist {}", track_id, playlist_id);
        }
        Ok(())
    }

    /// Remove a track if it is a member; otherwise nothing happens
    pub async fn remove_member(&self, playlist_id: i64, track_id: i64) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;

        ensure_playlist(&mut *tx, playlist_id).await?;

        let removed = sqlx::query(
            "DELETE FROM playlist_members WHERE playlist_id = ? AND track_id = ?",
        )
        .bind(playlist_id)
        .bind(track_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed > 0 {
            compact_positions(&mut *tx, playlist_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Swap the members at two positions
    pub async fn reorder_members(&self, playlist_id: i64, index_a: usize, index_b: usize) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;

        ensure_playlist(&mut *tx, playlist_id).await?;
        let members = member_ids(&mut *tx, playlist_id).await?;

        for index in [index_a, index_b] {
            if index >= members.len() {
                return Err(Error::Range(format!(
                    "index {} outside playlist of {} track(s)",
                    index,
                    members.len()
                )));
            }
        }

        let swaps = [(members[index_a], index_b), (members[index_b], index_a)];
        for (track_id, position) in swaps {
            sqlx::query(
                "UPDATE playlist_members SET position = ? WHERE playlist_id = ? AND track_id = ?",
            )
            .bind(position as i64)
            .bind(playlist_id)
            .bind(track_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn rename(&self, playlist_id: i64, new_name: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE playlists SET name = ? WHERE id = ?")
            .bind(new_name)
            .bind(playlist_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!("playlist {}", playlist_id)));
        }
        Ok(())
    }

    /// Delete a playlist and its memberships; the tracks stay
    pub async fn delete(&self, playlist_id: i64) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;

        sqlx::query("DELETE FROM playlist_members WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound(format!("playlist {}", playlist_id)));
        }

        tx.commit().await?;

        info!("Deleted playlist {}", playlist_id);
        Ok(())
    }
}
