//! Key/value documents stored as JSON text.
//!
//! Decoding is left to callers so each one can choose how to treat a
//! document that no longer parses.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::db::Database;

pub const RECOVERY_KEY: &str = "timerState";
pub const PROGRESS_KEY: &str = "progress";
pub const PLAYLIST_KEY: &str = "playlist";

impl Database {
    pub async fn load_state_raw(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM app_state WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    pub async fn save_state_raw(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO app_state (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn save_state<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let serialized = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize state '{key}'"))?;
        self.save_state_raw(key, serialized).await
    }

    pub async fn delete_state(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM app_state WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_upsert_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("focus.sqlite3")).unwrap();

        assert!(db.load_state_raw(RECOVERY_KEY).await.unwrap().is_none());

        db.save_state(RECOVERY_KEY, &serde_json::json!({ "a": 1 }))
            .await
            .unwrap();
        db.save_state(RECOVERY_KEY, &serde_json::json!({ "a": 2 }))
            .await
            .unwrap();

        let raw = db.load_state_raw(RECOVERY_KEY).await.unwrap().unwrap();
        assert_eq!(raw, r#"{"a":2}"#);

        db.delete_state(RECOVERY_KEY).await.unwrap();
        assert!(db.load_state_raw(RECOVERY_KEY).await.unwrap().is_none());
        // deleting twice is fine
        db.delete_state(RECOVERY_KEY).await.unwrap();
    }
}
