//! Table schema definitions
//!
//! Expected column layout of every table the player owns. Kept in step with
//! the `CREATE TABLE` statements in [`crate::db::init`].

use crate::db::schema_sync::{sync_table, ColumnDefinition, TableSchema};
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Constant default for timestamp columns added to older files.
/// SQLite refuses `CURRENT_TIMESTAMP` in `ADD COLUMN`.
const EPOCH: &str = "'1970-01-01 00:00:00'";

/// Stored audio blobs plus per-track metadata
pub struct TracksTableSchema;

impl TableSchema for TracksTableSchema {
    fn table_name() -> &'static str {
        "tracks"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "INTEGER").primary_key(),
            ColumnDefinition::new("name", "TEXT").not_null(),
            ColumnDefinition::new("content", "BLOB").not_null(),
            ColumnDefinition::new("media_type", "TEXT"),
            ColumnDefinition::new("date_added", "TEXT")
                .not_null()
                .default(EPOCH),
            ColumnDefinition::new("sort_order", "INTEGER")
                .not_null()
                .default("0"),
            ColumnDefinition::new("speed", "REAL")
                .not_null()
                .default("1.0"),
            ColumnDefinition::new("preserve_pitch", "INTEGER")
                .not_null()
                .default("1"),
        ]
    }
}

pub struct PlaylistsTableSchema;

impl TableSchema for PlaylistsTableSchema {
    fn table_name() -> &'static str {
        "playlists"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "INTEGER").primary_key(),
            ColumnDefinition::new("name", "TEXT").not_null(),
            ColumnDefinition::new("date_created", "TEXT")
                .not_null()
                .default(EPOCH),
        ]
    }
}

pub struct PlaylistMembersTableSchema;

impl TableSchema for PlaylistMembersTableSchema {
    fn table_name() -> &'static str {
        "playlist_members"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("playlist_id", "INTEGER").not_null(),
            ColumnDefinition::new("track_id", "INTEGER").not_null(),
            ColumnDefinition::new("position", "INTEGER")
                .not_null()
                .default("0"),
        ]
    }
}

pub struct SettingsTableSchema;

impl TableSchema for SettingsTableSchema {
    fn table_name() -> &'static str {
        "settings"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("key", "TEXT").primary_key(),
            ColumnDefinition::new("value", "TEXT"),
            ColumnDefinition::new("updated_at", "TIMESTAMP")
                .not_null()
                .default(EPOCH),
        ]
    }
}

/// Bring every player table up to the current column layout
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    let added = sync_table::<TracksTableSchema>(pool).await?
        + sync_table::<PlaylistsTableSchema>(pool).await?
        + sync_table::<PlaylistMembersTableSchema>(pool).await?
        + sync_table::<SettingsTableSchema>(pool).await?;

    if added > 0 {
        info!("Schema sync added {} column(s)", added);
    }
    Ok(())
}
