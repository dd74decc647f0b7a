//! Binary record store
//!
//! Audio payloads and their metadata live in the `tracks` table. Listings
//! never load payloads: [`TrackStore::content_info`] and
//! [`TrackStore::read_range`] read the blob length and the requested slice
//! in SQL.
//!
//! Every multi-statement operation runs in one transaction, so a failure
//! leaves the table exactly as it was.

use crate::db::begin_write;
use crate::db::playlists::compact_positions;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info};

/// Slowest accepted playback rate
pub const MIN_SPEED: f64 = 0.0625;
/// Fastest accepted playback rate
pub const MAX_SPEED: f64 = 16.0;

/// Check a playback rate before it reaches the transport or the store
pub fn validate_speed(speed: f64) -> Result<f64> {
    if speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(Error::Range(format!(
            "speed {} outside {}..={}",
            speed, MIN_SPEED, MAX_SPEED
        )))
    }
}

/// Track metadata (the payload itself is not carried)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: i64,
    pub name: String,
    pub media_type: Option<String>,
    pub size_bytes: i64,
    pub date_added: DateTime<Utc>,
    pub order: i64,
    pub speed: f64,
    pub preserve_pitch: bool,
}

/// Fields to change on a track; `None` leaves the stored value alone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackPatch {
    pub name: Option<String>,
    pub order: Option<i64>,
    pub speed: Option<f64>,
    pub preserve_pitch: Option<bool>,
}

impl TrackPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.order.is_none()
            && self.speed.is_none()
            && self.preserve_pitch.is_none()
    }

    /// Fold a later patch into this one; the later value wins per field
    pub fn merge(&mut self, later: TrackPatch) {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.order.is_some() {
            self.order = later.order;
        }
        if later.speed.is_some() {
            self.speed = later.speed;
        }
        if later.preserve_pitch.is_some() {
            self.preserve_pitch = later.preserve_pitch;
        }
    }

    fn apply_to(self, record: &mut TrackRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(order) = self.order {
            record.order = order;
        }
        if let Some(speed) = self.speed {
            record.speed = speed;
        }
        if let Some(preserve_pitch) = self.preserve_pitch {
            record.preserve_pitch = preserve_pitch;
        }
    }
}

/// What the range server needs to know before slicing
#[derive(Debug, Clone, PartialEq)]
pub struct ContentInfo {
    pub name: String,
    pub media_type: Option<String>,
    pub total_len: u64,
}

const TRACK_COLUMNS: &str = "id, name, media_type, length(content) AS size_bytes, \
                             date_added, sort_order, speed, preserve_pitch";

fn track_from_row(row: &SqliteRow) -> std::result::Result<TrackRecord, sqlx::Error> {
    Ok(TrackRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        media_type: row.try_get("media_type")?,
        size_bytes: row.try_get("size_bytes")?,
        date_added: row.try_get("date_added")?,
        order: row.try_get("sort_order")?,
        speed: row.try_get("speed")?,
        preserve_pitch: row.try_get("preserve_pitch")?,
    })
}

#[derive(Clone)]
pub struct TrackStore {
    pool: SqlitePool,
}

impl TrackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store a new payload at the end of the library
    pub async fn create(&self, name: &str, media_type: Option<&str>, bytes: &[u8]) -> Result<i64> {
        let mut tx = begin_write(&self.pool).await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&mut *tx)
            .await?;

        let id = sqlx::query(
            r#"
            INSERT INTO tracks (name, content, media_type, date_added, sort_order, speed, preserve_pitch)
            VALUES (?, ?, ?, ?, ?, 1.0, 1)
            "#,
        )
        .bind(name)
        .bind(bytes)
        .bind(media_type)
        .bind(Utc::now())
        .bind(count)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        info!("Stored track {} ({}, {} bytes) at order {}", id, name, bytes.len(), count);
        Ok(id)
    }

    /// Every record, in no particular order
    pub async fn get_all(&self) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query(&format!("SELECT {} FROM tracks", TRACK_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| track_from_row(row).map_err(Error::from))
            .collect()
    }

    pub async fn get(&self, id: i64) -> Result<TrackRecord> {
        let row = sqlx::query(&format!("SELECT {} FROM tracks WHERE id = ?", TRACK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", id)))?;

        Ok(track_from_row(&row)?)
    }

    /// Merge `patch` into the stored record
    ///
    /// The authoritative row is re-read inside the writing transaction and
    /// only metadata columns are written, so the payload is never rewritten
    /// from a stale copy.
    pub async fn update(&self, id: i64, patch: TrackPatch) -> Result<TrackRecord> {
        if let Some(speed) = patch.speed {
            validate_speed(speed)?;
        }
        if let Some(order) = patch.order {
            if order < 0 {
                return Err(Error::Range(format!("order {} is negative", order)));
            }
        }

        let mut tx = begin_write(&self.pool).await?;

        let row = sqlx::query(&format!("SELECT {} FROM tracks WHERE id = ?", TRACK_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", id)))?;

        let mut record = track_from_row(&row)?;
        patch.apply_to(&mut record);

        sqlx::query(
            "UPDATE tracks SET name = ?, sort_order = ?, speed = ?, preserve_pitch = ? WHERE id = ?",
        )
        .bind(&record.name)
        .bind(record.order)
        .bind(record.speed)
        .bind(record.preserve_pitch)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Updated track {}", id);
        Ok(record)
    }

    /// Remove a track and every playlist membership that references it
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;

        let affected: Vec<i64> = sqlx::query_scalar(
            "SELECT playlist_id FROM playlist_members WHERE track_id = ?",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM playlist_members WHERE track_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            // Dropping the transaction rolls back the membership delete
            return Err(Error::NotFound(format!("track {}", id)));
        }

        for playlist_id in &affected {
            compact_positions(&mut *tx, *playlist_id).await?;
        }

        tx.commit().await?;

        info!("Deleted track {} (removed from {} playlist(s))", id, affected.len());
        Ok(())
    }

    pub async fn content_info(&self, id: i64) -> Result<ContentInfo> {
        let row = sqlx::query(
            "SELECT name, media_type, length(content) AS total_len FROM tracks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("track {}", id)))?;

        // length() of a NULL payload is NULL
        let total_len: Option<i64> = row.try_get("total_len")?;

        Ok(ContentInfo {
            name: row.try_get("name")?,
            media_type: row.try_get("media_type")?,
            total_len: total_len.unwrap_or(0).max(0) as u64,
        })
    }

    /// `len` bytes of the payload starting at byte `start`
    pub async fn read_range(&self, id: i64, start: u64, len: u64) -> Result<Vec<u8>> {
        let bytes: Option<Option<Vec<u8>>> =
            sqlx::query_scalar("SELECT substr(content, ?, ?) FROM tracks WHERE id = ?")
                .bind((start + 1) as i64)
                .bind(len as i64)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match bytes {
            Some(bytes) => Ok(bytes.unwrap_or_default()),
            None => Err(Error::NotFound(format!("track {}", id))),
        }
    }

    /// Names already in the store, for import dedup
    pub async fn names(&self) -> Result<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM tracks")
            .fetch_all(&self.pool)
            .await?;
        Ok(names.into_iter().collect())
    }

    /// Write several `(id, order)` pairs in one transaction
    pub async fn apply_orders(&self, orders: &[(i64, i64)]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }

        let mut tx = begin_write(&self.pool).await?;
        for (id, order) in orders {
            sqlx::query("UPDATE tracks SET sort_order = ? WHERE id = ?")
                .bind(order)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Wrote {} order value(s)", orders.len());
        Ok(())
    }
}
