//! Runtime settings stored in the `settings` table

use crate::error::Result;
use offtrack_common::events::EndPolicy;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::warn;

const END_POLICY_KEY: &str = "end_policy";

/// Read a setting; `None` when the key is absent or NULL
pub async fn get_setting<T: FromStr>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value.flatten() {
        Some(raw) => match raw.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => {
                warn!("Ignoring unparsable value {:?} for setting {}", raw, key);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub async fn set_setting<T: ToString>(pool: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Stored end-of-track policy; a missing value is written back as the default
pub async fn load_end_policy(pool: &SqlitePool) -> Result<EndPolicy> {
    match get_setting::<EndPolicy>(pool, END_POLICY_KEY).await? {
        Some(policy) => Ok(policy),
        None => {
            let policy = EndPolicy::default();
            set_setting(pool, END_POLICY_KEY, policy).await?;
            Ok(policy)
        }
    }
}

pub async fn save_end_policy(pool: &SqlitePool, policy: EndPolicy) -> Result<()> {
    set_setting(pool, END_POLICY_KEY, policy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use offtrack_common::db::init_memory_database;

    #[tokio::test]
    async fn test_end_policy_defaults_and_persists() {
        let pool = init_memory_database().await.unwrap();

        assert_eq!(load_end_policy(&pool).await.unwrap(), EndPolicy::LoopAll);
        let stored: Option<String> = get_setting(&pool, END_POLICY_KEY).await.unwrap();
        assert_eq!(stored.as_deref(), Some("loop-all"));

        save_end_policy(&pool, EndPolicy::Single).await.unwrap();
        assert_eq!(load_end_policy(&pool).await.unwrap(), EndPolicy::Single);
    }

    #[tokio::test]
    async fn test_garbage_value_falls_back_to_default() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, END_POLICY_KEY, "shuffle").await.unwrap();

        assert_eq!(load_end_policy(&pool).await.unwrap(), EndPolicy::LoopAll);
    }
}
