//! Recovering code the user has written for a problem.
//!
//! The host page's editor autosaves into page-local storage under keys that
//! embed the problem id (e.g. `course_7415_1042_cpp`). The watcher mirrors
//! that storage into the `kv` table; this lookup scans it for the first key
//! matching the per-problem pattern and returns its value.

use anyhow::Result;
use globset::Glob;
use sqlx::SqlitePool;

use crate::store;

/// Find the user's saved code for `problem_id`.
///
/// Scans every mirrored key for `*_{id}_*` and returns the first match in
/// enumeration order, or `None` when nothing matches. The enumeration order
/// is undefined; first-match is an accepted limitation.
pub async fn lookup_user_code(pool: &SqlitePool, problem_id: u64) -> Result<Option<String>> {
    let matcher = Glob::new(&format!("*_{}_*", problem_id))?.compile_matcher();

    for (key, value) in store::kv_entries(pool).await? {
        if matcher.is_match(&key) {
            return Ok(Some(value));
        }
    }

    Ok(None)
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

    #[tokio::test]
    async fn test_finds_key_embedding_the_id() {
        let (_tmp, pool) = test_pool().await;

        store::kv_set(&pool, "theme", "dark").await.unwrap();
        store::kv_set(&pool, "course_7415_1042_cpp", "int main() {}")
            .await
            .unwrap();

        let code = lookup_user_code(&pool, 1042).await.unwrap();
        assert_eq!(code.as_deref(), Some("int main() {}"));
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let (_tmp, pool) = test_pool().await;

        store::kv_set(&pool, "course_1_1042_cpp", "first").await.unwrap();
        store::kv_set(&pool, "course_2_1042_py", "second").await.unwrap();

        let code = lookup_user_code(&pool, 1042).await.unwrap();
        assert_eq!(code.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let (_tmp, pool) = test_pool().await;

        store::kv_set(&pool, "course_1_1042_cpp", "code").await.unwrap();

        // 104 must not match the 1042 key.
        assert!(lookup_user_code(&pool, 104).await.unwrap().is_none());
    }
}
