//! Persistence for the indexed problem corpus and its embedding vectors.
//!
//! The search server answers both entry modes from here: a free-text query
//! is embedded and ranked against every stored vector; a query-by-id first
//! fetches the stored vector for that problem and ranks the rest against
//! it. Ranking is a full cosine scan; the corpus is a few hundred
//! problems, not a few million.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding;
use crate::models::{MatchMetadata, SearchMatch};

/// Insert or refresh one indexed problem.
pub async fn upsert_problem(
    pool: &SqlitePool,
    id: &str,
    title: Option<&str>,
    text: &str,
    text_hash: &str,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO problems (id, title, text, text_hash, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            text = excluded.text,
            text_hash = excluded.text_hash,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(text)
    .bind(text_hash)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Hash of the currently indexed text for `id`, used to skip re-embedding
/// unchanged problems.
pub async fn stored_hash(pool: &SqlitePool, id: &str) -> Result<Option<String>> {
    let hash: Option<String> = sqlx::query_scalar("SELECT text_hash FROM problems WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(hash)
}

/// Store (or replace) the embedding vector for a problem.
pub async fn store_vector(
    pool: &SqlitePool,
    problem_id: &str,
    model: &str,
    vec: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO problem_vectors (problem_id, model, dims, embedding)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(problem_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            embedding = excluded.embedding
        "#,
    )
    .bind(problem_id)
    .bind(model)
    .bind(vec.len() as i64)
    .bind(embedding::vec_to_blob(vec))
    .execute(pool)
    .await?;
    Ok(())
}

/// The stored vector for a problem id, or `None` when it was never indexed.
pub async fn fetch_vector(pool: &SqlitePool, problem_id: &str) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT embedding FROM problem_vectors WHERE problem_id = ?")
            .bind(problem_id)
            .fetch_optional(pool)
            .await?;
    Ok(blob.map(|b| embedding::blob_to_vec(&b)))
}

/// Rank every stored vector against `query_vec` and return the top `k`
/// matches: score descending, then id ascending for determinism.
pub async fn top_k_similar(
    pool: &SqlitePool,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<SearchMatch>> {
    let rows = sqlx::query(
        r#"
        SELECT pv.problem_id, pv.embedding, p.text
        FROM problem_vectors pv
        JOIN problems p ON p.id = pv.problem_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut matches: Vec<SearchMatch> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let score = embedding::cosine_similarity(query_vec, &vec) as f64;
            SearchMatch {
                id: row.get("problem_id"),
                score,
                metadata: MatchMetadata { text: row.get("text") },
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    matches.truncate(k);

    Ok(matches)
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

    async fn seed(pool: &SqlitePool, id: &str, text: &str, vec: &[f32]) {
        upsert_problem(pool, id, None, text, "hash").await.unwrap();
        store_vector(pool, id, "test-model", vec).await.unwrap();
    }

    #[tokio::test]
    async fn test_top_k_orders_by_similarity() {
        let (_tmp, pool) = test_pool().await;

        seed(&pool, "1", "Exact\nbody", &[1.0, 0.0]).await;
        seed(&pool, "2", "Orthogonal\nbody", &[0.0, 1.0]).await;
        seed(&pool, "3", "Close\nbody", &[0.9, 0.1]).await;

        let matches = top_k_similar(&pool, &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "1");
        assert_eq!(matches[1].id, "3");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn test_tie_break_is_id_ascending() {
        let (_tmp, pool) = test_pool().await;

        seed(&pool, "b", "B\nbody", &[1.0, 0.0]).await;
        seed(&pool, "a", "A\nbody", &[1.0, 0.0]).await;

        let matches = top_k_similar(&pool, &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[1].id, "b");
    }

    #[tokio::test]
    async fn test_fetch_vector_roundtrip() {
        let (_tmp, pool) = test_pool().await;

        seed(&pool, "7", "Two Sum\nbody", &[0.25, -0.5, 0.75]).await;

        let vec = fetch_vector(&pool, "7").await.unwrap().unwrap();
        assert_eq!(vec, vec![0.25, -0.5, 0.75]);
        assert!(fetch_vector(&pool, "8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_hash_tracks_upserts() {
        let (_tmp, pool) = test_pool().await;

        assert!(stored_hash(&pool, "1").await.unwrap().is_none());
        upsert_problem(&pool, "1", Some("T"), "text", "h1").await.unwrap();
        assert_eq!(stored_hash(&pool, "1").await.unwrap().as_deref(), Some("h1"));
        upsert_problem(&pool, "1", Some("T"), "text2", "h2").await.unwrap();
        assert_eq!(stored_hash(&pool, "1").await.unwrap().as_deref(), Some("h2"));
    }
}
