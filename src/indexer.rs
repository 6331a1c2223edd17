//! Building the similarity-search corpus.
//!
//! `pal index` pulls the full problem set, either from a local JSON dump
//! (an array of `{"data": {...}}` detail payloads) or straight from the
//! site API, then prepares one embedding text per problem, embeds in
//! batches, and upserts into the vector store. A problem whose prepared text is
//! unchanged since the last run (same sha256) is skipped, so re-indexing
//! is cheap and idempotent.
//!
//! Fetching from the API needs a bearer token in the `PROBLEM_SITE_TOKEN`
//! environment variable. Per-problem fetch failures are logged and skipped;
//! they never abort the run.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::vectors;

/// Where the problem set comes from.
pub enum IndexSource {
    /// A local JSON dump: an array of problem detail payloads.
    File(std::path::PathBuf),
    /// The site API, paginated list plus per-problem detail.
    Fetch,
}

/// One problem ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexItem {
    pub id: String,
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct IndexStats {
    pub fetched: u64,
    pub indexed: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

/// Run the full indexing pipeline and print a summary.
pub async fn run_index(config: &Config, source: IndexSource) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Indexing requires embeddings. Set [embedding] provider in config.");
    }

    let payloads = match source {
        IndexSource::File(path) => load_dump(&path)?,
        IndexSource::Fetch => fetch_all(config).await?,
    };

    let pool = db::connect(&config.db.path).await?;
    let stats = index_payloads(config, &pool, &payloads).await?;
    pool.close().await;

    println!("index");
    println!("  fetched: {} problems", stats.fetched);
    println!("  indexed: {}", stats.indexed);
    println!("  unchanged: {}", stats.unchanged);
    println!("  skipped: {}", stats.skipped);
    println!("ok");

    Ok(())
}

/// Embed and store every payload, batching API calls.
pub async fn index_payloads(
    config: &Config,
    pool: &SqlitePool,
    payloads: &[Value],
) -> Result<IndexStats> {
    let provider = embedding::create_provider(&config.embedding)?;
    let mut stats = IndexStats {
        fetched: payloads.len() as u64,
        ..Default::default()
    };

    // Keep only parseable problems whose text actually changed.
    let mut pending: Vec<(IndexItem, String)> = Vec::new();
    for payload in payloads {
        let Some(item) = prepare_item(payload) else {
            stats.skipped += 1;
            continue;
        };
        let hash = text_hash(&item.text);
        if vectors::stored_hash(pool, &item.id).await?.as_deref() == Some(hash.as_str()) {
            stats.unchanged += 1;
            continue;
        }
        pending.push((item, hash));
    }

    for batch in pending.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(item, _)| item.text.clone()).collect();
        let embeddings =
            embedding::embed_texts(provider.as_ref(), &config.embedding, &texts).await?;

        if embeddings.len() != batch.len() {
            bail!(
                "Embedding batch size mismatch: sent {}, got {}",
                batch.len(),
                embeddings.len()
            );
        }

        for ((item, hash), vec) in batch.iter().zip(embeddings) {
            vectors::upsert_problem(pool, &item.id, item.title.as_deref(), &item.text, hash)
                .await?;
            vectors::store_vector(pool, &item.id, provider.model_name(), &vec).await?;
            stats.indexed += 1;
        }
    }

    Ok(stats)
}

/// Combine the relevant problem fields into the one string that gets
/// embedded (and stored as the match metadata). Problems without an id are
/// unusable and yield `None`.
pub fn prepare_item(payload: &Value) -> Option<IndexItem> {
    let data = payload.get("data")?;
    let id = data.get("id").and_then(Value::as_u64)?;

    let field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    let hint = |key: &str| {
        data.get("hints")
            .and_then(|h| h.get(key))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    let editorial = data
        .get("editorial_code")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let text = [
        field("title"),
        field("body"),
        hint("hint1"),
        hint("hint2"),
        hint("solution_approach"),
        field("input_format"),
        field("output_format"),
        editorial,
    ]
    .join("\n");

    let title = data
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(IndexItem {
        id: id.to_string(),
        title,
        text,
    })
}

pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn load_dump(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read problems dump: {}", path.display()))?;
    let payloads: Vec<Value> =
        serde_json::from_str(&raw).context("Problems dump is not a JSON array")?;
    Ok(payloads)
}

// ============ Site API crawl ============

/// Fetch the problem list, then each problem's detail, sequentially.
async fn fetch_all(config: &Config) -> Result<Vec<Value>> {
    let token = std::env::var("PROBLEM_SITE_TOKEN")
        .map_err(|_| anyhow::anyhow!("PROBLEM_SITE_TOKEN not set"))?;
    let auth = format!("Bearer {}", token);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.indexer.timeout_secs))
        .build()?;

    let list_url = format!(
        "{}/problems/user?page=1&page_size={}",
        config.indexer.base_url, config.indexer.page_size
    );
    let list: Value = client
        .get(&list_url)
        .header("Authorization", &auth)
        .send()
        .await?
        .error_for_status()
        .context("Problem list request failed")?
        .json()
        .await?;

    let ids: Vec<u64> = list
        .get("data")
        .and_then(|d| d.get("problems"))
        .and_then(Value::as_array)
        .map(|problems| {
            problems
                .iter()
                .filter_map(|p| p.get("id").and_then(Value::as_u64))
                .collect()
        })
        .unwrap_or_default();

    println!("fetched problem list: {} entries", ids.len());

    let mut payloads = Vec::with_capacity(ids.len());
    for id in ids {
        let url = format!("{}/problems/user/{}", config.indexer.base_url, id);
        let detail = client
            .get(&url)
            .header("Authorization", &auth)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match detail {
            Ok(response) => match response.json::<Value>().await {
                Ok(payload) => payloads.push(payload),
                Err(err) => warn!("problem {} detail was not JSON: {}", id, err),
            },
            Err(err) => warn!("problem {} fetch failed: {}", id, err),
        }
    }

    Ok(payloads)
}
