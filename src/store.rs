//! The local context store and the mirrored page-local storage.
//!
//! Both live in the `kv` table. The resident problem context is a single
//! slot under the key [`CONTEXT_KEY`]; it represents "the problem currently
//! open", not a history. Updates are read-then-write and non-atomic: if an
//! interception and a read race, the last write wins. Do not add locking
//! here unless a real race is demonstrated.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::models::ProblemContext;

/// The single persisted slot shared across the extension's views.
pub const CONTEXT_KEY: &str = "interceptedContext";

// ============ Generic kv access ============

pub async fn kv_get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn kv_set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn kv_delete(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM kv WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// All entries in enumeration order (rowid, i.e. insertion order).
/// Callers that scan for a pattern take the first hit; the ordering is an
/// accepted limitation, matching the page storage it mirrors.
pub async fn kv_entries(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT key, value FROM kv ORDER BY rowid")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

// ============ Resident context ============

/// Load the currently resident problem context, if any.
pub async fn load_context(pool: &SqlitePool) -> Result<Option<ProblemContext>> {
    let raw = kv_get(pool, CONTEXT_KEY).await?;
    match raw {
        Some(json) => {
            let ctx = serde_json::from_str(&json).context("stored context is corrupt")?;
            Ok(Some(ctx))
        }
        None => Ok(None),
    }
}

/// Make a freshly extracted context resident, replacing the previous one
/// wholesale. The exception is `user_code`, carried over when the new
/// record has none (a page reload re-fetches the problem but not the code
/// the user already wrote).
pub async fn store_context(pool: &SqlitePool, mut ctx: ProblemContext) -> Result<ProblemContext> {
    if ctx.user_code.is_none() {
        if let Some(previous) = load_context(pool).await.unwrap_or(None) {
            ctx.user_code = previous.user_code;
        }
    }

    let json = serde_json::to_string(&ctx)?;
    kv_set(pool, CONTEXT_KEY, &json).await?;
    Ok(ctx)
}

/// Drop the resident context.
pub async fn clear_context(pool: &SqlitePool) -> Result<()> {
    kv_delete(pool, CONTEXT_KEY).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use crate::migrate;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            db: DbConfig {
                path: tmp.path().join("pal.sqlite"),
            },
            client: Default::default(),
            intercept: Default::default(),
            llm: Default::default(),
            embedding: Default::default(),
            assist: Default::default(),
            search: Default::default(),
            indexer: Default::default(),
        };
        migrate::run_migrations(&config).await.unwrap();
        let pool = crate::db::connect(&config.db.path).await.unwrap();
        (tmp, pool)
    }

    fn sample_context(id: u64, title: &str) -> ProblemContext {
        ProblemContext {
            id,
            title: title.to_string(),
            description: "desc".to_string(),
            constraints: "No Constraints".to_string(),
            input_format: "No Input Format".to_string(),
            output_format: "No Output Format".to_string(),
            hints: Vec::new(),
            samples: Vec::new(),
            supported_languages: Vec::new(),
            editorial_solution: "No Editorial Solution".to_string(),
            user_code: None,
        }
    }

    #[tokio::test]
    async fn test_single_slot_overwrite() {
        let (_tmp, pool) = test_pool().await;

        store_context(&pool, sample_context(1, "First")).await.unwrap();
        store_context(&pool, sample_context(2, "Second")).await.unwrap();

        let resident = load_context(&pool).await.unwrap().unwrap();
        assert_eq!(resident.id, 2);
        assert_eq!(resident.title, "Second");
    }

    #[tokio::test]
    async fn test_user_code_preserved_across_overwrite() {
        let (_tmp, pool) = test_pool().await;

        let mut first = sample_context(1, "First");
        first.user_code = Some("fn main() {}".to_string());
        store_context(&pool, first).await.unwrap();

        // Fresh interception carries no code; the old code survives.
        let resident = store_context(&pool, sample_context(1, "First")).await.unwrap();
        assert_eq!(resident.user_code.as_deref(), Some("fn main() {}"));

        // A record that does carry code replaces it.
        let mut updated = sample_context(1, "First");
        updated.user_code = Some("fn main() { todo!() }".to_string());
        let resident = store_context(&pool, updated).await.unwrap();
        assert_eq!(resident.user_code.as_deref(), Some("fn main() { todo!() }"));
    }

    #[tokio::test]
    async fn test_clear_context() {
        let (_tmp, pool) = test_pool().await;

        store_context(&pool, sample_context(1, "First")).await.unwrap();
        clear_context(&pool).await.unwrap();
        assert!(load_context(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kv_enumeration_order() {
        let (_tmp, pool) = test_pool().await;

        kv_set(&pool, "b", "2").await.unwrap();
        kv_set(&pool, "a", "1").await.unwrap();

        let keys: Vec<String> = kv_entries(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
