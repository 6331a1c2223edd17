//! The explicit interception interface.
//!
//! Instead of monkey-patching the page's network primitives, the host
//! environment exposes an observable stream of completed responses: one
//! JSON event per line, `{"type":"apiIntercepted","url":...,"method":...,
//! "response":...}`. `pal watch` subscribes to that stream (stdin, or any
//! async reader), keeps the events whose URL matches the configured
//! patterns, and funnels their payloads through the extractor into the
//! context store.
//!
//! Failures are scoped to the single triggering event: a malformed line or
//! an unparsable payload is reported and skipped, the stream keeps going,
//! and the resident context is left unchanged.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::config::InterceptConfig;
use crate::extractor;
use crate::store;

/// One observed page response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEvent {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    pub response: String,
}

/// Matches response URLs against the configured problem-API patterns.
pub struct UrlFilter {
    set: GlobSet,
}

impl UrlFilter {
    pub fn new(config: &InterceptConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.url_patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid intercept.url_patterns entry: {}", pattern))?;
            builder.add(glob);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.set.is_match(url)
    }
}

/// Counters reported after a watch run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub events: u64,
    pub stored: u64,
    pub skipped: u64,
    pub failures: u64,
}

/// Consume the response stream until EOF.
///
/// Each matched event is extracted and made resident; everything else is
/// counted and dropped.
pub async fn watch_stream<R>(
    config: &InterceptConfig,
    pool: &SqlitePool,
    reader: R,
) -> Result<WatchStats>
where
    R: AsyncBufRead + Unpin,
{
    let filter = UrlFilter::new(config)?;
    let mut stats = WatchStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        stats.events += 1;

        let event: ResponseEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!("dropping malformed stream event: {}", err);
                stats.failures += 1;
                continue;
            }
        };

        match handle_event(&filter, pool, &event).await {
            Ok(true) => stats.stored += 1,
            Ok(false) => {
                stats.skipped += 1;
                debug!("ignoring response from {}", event.url);
            }
            Err(err) => {
                warn!("event from {} not stored: {:#}", event.url, err);
                stats.failures += 1;
            }
        }
    }

    Ok(stats)
}

/// Process one event. Returns `Ok(true)` when a context became resident,
/// `Ok(false)` when the event was filtered out.
pub async fn handle_event(
    filter: &UrlFilter,
    pool: &SqlitePool,
    event: &ResponseEvent,
) -> Result<bool> {
    if let Some(event_type) = &event.event_type {
        if event_type != "apiIntercepted" {
            return Ok(false);
        }
    }

    if !filter.matches(&event.url) {
        return Ok(false);
    }

    let ctx = extractor::parse_context(&event.response)?;
    let stored = store::store_context(pool, ctx).await?;
    println!("context updated: {} (id {})", stored.title, stored.id);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use crate::migrate;
    use tempfile::TempDir;
    use tokio::io::BufReader;

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

    fn intercept_config() -> InterceptConfig {
        InterceptConfig {
            url_patterns: vec!["https://api2.maang.in/problems/user/*".to_string()],
        }
    }

    fn event_line(url: &str, response: &str) -> String {
        serde_json::json!({
            "type": "apiIntercepted",
            "url": url,
            "method": "GET",
            "response": response,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_matched_event_becomes_resident() {
        let (_tmp, pool) = test_pool().await;

        let line = event_line(
            "https://api2.maang.in/problems/user/7",
            r#"{"data":{"id":7,"title":"Two Sum"}}"#,
        );
        let stats = watch_stream(&intercept_config(), &pool, BufReader::new(line.as_bytes()))
            .await
            .unwrap();

        assert_eq!(stats.stored, 1);
        let ctx = store::load_context(&pool).await.unwrap().unwrap();
        assert_eq!(ctx.id, 7);
        assert_eq!(ctx.title, "Two Sum");
    }

    #[tokio::test]
    async fn test_unmatched_url_is_skipped() {
        let (_tmp, pool) = test_pool().await;

        let line = event_line("https://api2.maang.in/profile", r#"{"data":{"id":1}}"#);
        let stats = watch_stream(&intercept_config(), &pool, BufReader::new(line.as_bytes()))
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert!(store::load_context(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_payload_leaves_store_unchanged() {
        let (_tmp, pool) = test_pool().await;

        // Make a context resident first.
        let good = event_line(
            "https://api2.maang.in/problems/user/7",
            r#"{"data":{"id":7,"title":"Two Sum"}}"#,
        );
        let bad = event_line("https://api2.maang.in/problems/user/8", "{not json");
        let input = format!("{}\n{}\n", good, bad);

        let stats = watch_stream(&intercept_config(), &pool, BufReader::new(input.as_bytes()))
            .await
            .unwrap();

        assert_eq!(stats.stored, 1);
        assert_eq!(stats.failures, 1);
        let ctx = store::load_context(&pool).await.unwrap().unwrap();
        assert_eq!(ctx.id, 7);
    }

    #[tokio::test]
    async fn test_malformed_stream_line_is_counted_not_fatal() {
        let (_tmp, pool) = test_pool().await;

        let input = "this is not an event\n";
        let stats = watch_stream(&intercept_config(), &pool, BufReader::new(input.as_bytes()))
            .await
            .unwrap();

        assert_eq!(stats.failures, 1);
        assert_eq!(stats.stored, 0);
    }

    #[tokio::test]
    async fn test_foreign_event_type_is_skipped() {
        let (_tmp, pool) = test_pool().await;

        let line = serde_json::json!({
            "type": "pageLoaded",
            "url": "https://api2.maang.in/problems/user/7",
            "response": r#"{"data":{"id":7}}"#,
        })
        .to_string();

        let stats = watch_stream(&intercept_config(), &pool, BufReader::new(line.as_bytes()))
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
    }
}
