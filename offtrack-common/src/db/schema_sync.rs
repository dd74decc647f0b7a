//! Additive schema synchronization
//!
//! Brings an existing database file up to the column layout the current
//! binary expects. Tables are created with `CREATE TABLE IF NOT EXISTS` in
//! [`crate::db::init`]; this module then adds any column that an older file
//! lacks. Columns are never dropped, renamed, or retyped.
//!
//! A column can be added automatically only if SQLite accepts it through
//! `ALTER TABLE ... ADD COLUMN`: it must not be a primary key, and a
//! `NOT NULL` column must carry a default.

use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// Expected definition of one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Default expressed as SQL text, e.g. `"1.0"` or `"'audio/mpeg'"`
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// `ALTER TABLE` statement adding this column to `table`
    fn add_column_sql(&self, table: &str) -> Result<String> {
        if self.primary_key {
            return Err(Error::Schema(format!(
                "{}.{} is a primary key and cannot be added to an existing table",
                table, self.name
            )));
        }
        if self.not_null && self.default_value.is_none() {
            return Err(Error::Schema(format!(
                "{}.{} is NOT NULL without a default and cannot be added automatically",
                table, self.name
            )));
        }

        let mut sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, self.name, self.sql_type);
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        Ok(sql)
    }
}

/// Declarative layout of one table
pub trait TableSchema {
    fn table_name() -> &'static str;
    fn expected_columns() -> Vec<ColumnDefinition>;
}

/// Column names currently present in `table`, in declaration order
pub async fn existing_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
}

/// Add every expected column that `T`'s table is missing
///
/// Returns the number of columns added. Running it against an up-to-date
/// table is a no-op.
pub async fn sync_table<T: TableSchema>(pool: &SqlitePool) -> Result<usize> {
    let table = T::table_name();
    let present = existing_columns(pool, table).await?;

    if present.is_empty() {
        return Err(Error::Schema(format!("table {} does not exist", table)));
    }

    let mut added = 0;
    for column in T::expected_columns() {
        if present.iter().any(|name| name.eq_ignore_ascii_case(&column.name)) {
            continue;
        }

        let sql = column.add_column_sql(table)?;
        debug!("Schema sync: {}", sql);

        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => {
                info!("Added missing column {}.{}", table, column.name);
                added += 1;
            }
            // Another connection got there first
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    struct WidgetSchema;

    impl TableSchema for WidgetSchema {
        fn table_name() -> &'static str {
            "widgets"
        }

        fn expected_columns() -> Vec<ColumnDefinition> {
            vec![
                ColumnDefinition::new("id", "INTEGER").primary_key(),
                ColumnDefinition::new("label", "TEXT").not_null(),
                ColumnDefinition::new("weight", "REAL").not_null().default("1.0"),
                ColumnDefinition::new("note", "TEXT"),
            ]
        }
    }

    struct BrokenSchema;

    impl TableSchema for BrokenSchema {
        fn table_name() -> &'static str {
            "widgets"
        }

        fn expected_columns() -> Vec<ColumnDefinition> {
            vec![ColumnDefinition::new("required", "TEXT").not_null()]
        }
    }

    async fn pool_with_legacy_table() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE widgets (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO widgets (label) VALUES ('old')")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_missing_columns_are_added_with_defaults() {
        let pool = pool_with_legacy_table().await;

        let added = sync_table::<WidgetSchema>(&pool).await.unwrap();
        assert_eq!(added, 2);

        let columns = existing_columns(&pool, "widgets").await.unwrap();
        assert_eq!(columns, vec!["id", "label", "weight", "note"]);

        let weight: f64 = sqlx::query_scalar("SELECT weight FROM widgets WHERE label = 'old'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(weight, 1.0);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let pool = pool_with_legacy_table().await;

        sync_table::<WidgetSchema>(&pool).await.unwrap();
        let added = sync_table::<WidgetSchema>(&pool).await.unwrap();
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn test_not_null_without_default_is_rejected() {
        let pool = pool_with_legacy_table().await;

        let result = sync_table::<BrokenSchema>(&pool).await;
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[tokio::test]
    async fn test_missing_table_is_reported() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let result = sync_table::<WidgetSchema>(&pool).await;
        assert!(matches!(result, Err(Error::Schema(_))));
    }
}
