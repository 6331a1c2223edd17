//! Client-side relays to the two companion servers.
//!
//! A relay's sole job is to forward a request to a remote endpoint and
//! normalize its response or error for local display. Preconditions are
//! checked before any network activity: a query with no resident context or
//! no resolvable user name fails fast and never leaves the machine. No
//! relay call retries, and none carries a timeout: a hung request simply
//! leaves the caller in its loading state, matching the host page's
//! behavior.

use anyhow::Result;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::models::{
    AskRequest, AskResponse, ChatMessage, DbData, HistoryResponse, SearchByIdRequest,
    SearchMatch, SearchRequest, SearchResponse,
};
use crate::store;

/// Everything that can go wrong on the client side of a round-trip. The
/// `Display` text is what the panels render to the user.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No context available")]
    MissingContext,
    #[error("No user name available")]
    MissingUser,
    #[error("{0}")]
    Remote(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The kv key consulted when `client.user_name` is not configured.
pub const USER_NAME_KEY: &str = "user_name";

/// Resolve the stable user identifier: config first, then the mirrored page
/// storage.
pub async fn resolve_user_name(
    pool: &SqlitePool,
    config: &ClientConfig,
) -> Result<Option<String>> {
    if let Some(name) = &config.user_name {
        return Ok(Some(name.clone()));
    }
    store::kv_get(pool, USER_NAME_KEY).await
}

/// Assemble a [`AskRequest`] from the resident state, failing fast when a
/// precondition is missing. No network is touched here.
pub async fn resolve_ask(
    pool: &SqlitePool,
    config: &ClientConfig,
    query: &str,
) -> Result<AskRequest, RelayError> {
    let context = store::load_context(pool)
        .await?
        .ok_or(RelayError::MissingContext)?;

    let user_name = resolve_user_name(pool, config)
        .await?
        .ok_or(RelayError::MissingUser)?;

    let problem_title = context.title.clone();
    Ok(AskRequest {
        query: query.to_string(),
        context,
        db_data: DbData {
            user_name,
            problem_title,
        },
    })
}

// ============ Assist relay ============

/// Forwards questions to the assist server and fetches stored history.
pub struct AssistRelay {
    client: reqwest::Client,
    base_url: String,
}

impl AssistRelay {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// One query round-trip. Returns the rendered reply text and the
    /// conversation id, when the server reports one.
    pub async fn ask(&self, request: &AskRequest) -> Result<(String, Option<String>), RelayError> {
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|err| RelayError::Remote(format!("Server unreachable: {}", err)))?;

        let status = response.status();
        let body: AskResponse = response
            .json()
            .await
            .map_err(|_| RelayError::Remote(format!("Server Error: {}", status)))?;

        if !status.is_success() || body.status != "success" {
            let message = body
                .error
                .unwrap_or_else(|| "Unknown error occurred".to_string());
            return Err(RelayError::Remote(message));
        }

        let text = body
            .response
            .ok_or_else(|| RelayError::Remote("Unknown error occurred".to_string()))?;
        Ok((text, body.conversation_id))
    }

    /// The stored conversation for (user, title), oldest first.
    pub async fn history(
        &self,
        user_name: &str,
        problem_title: &str,
    ) -> Result<Vec<ChatMessage>, RelayError> {
        let response = self
            .client
            .get(format!("{}/history", self.base_url))
            .query(&[("user_name", user_name), ("problem_title", problem_title)])
            .send()
            .await
            .map_err(|err| RelayError::Remote(format!("Server unreachable: {}", err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Remote(format!("Server Error: {}", status)));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|_| RelayError::Remote("Unknown error occurred".to_string()))?;
        Ok(body.conversation)
    }
}

// ============ Search relay ============

/// Forwards similarity searches to the search server.
pub struct SearchRelay {
    client: reqwest::Client,
    base_url: String,
}

impl SearchRelay {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Rank stored problems against free text.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<Vec<SearchMatch>, RelayError> {
        let request = SearchRequest {
            query: query.to_string(),
            top_k,
        };
        self.post("/query", &request).await
    }

    /// Rank stored problems against the vector already stored for `id`.
    pub async fn query_by_id(&self, id: &str, top_k: usize) -> Result<Vec<SearchMatch>, RelayError> {
        let request = SearchByIdRequest {
            id: id.to_string(),
            top_k,
        };
        self.post("/queryById", &request).await
    }

    async fn post<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<SearchMatch>, RelayError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|err| RelayError::Remote(format!("Server unreachable: {}", err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Remote(format!("Server Error: {}", status)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|_| RelayError::Remote("Unknown error occurred".to_string()))?;
        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use crate::migrate;
    use crate::models::ProblemContext;
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

    fn resident_context() -> ProblemContext {
        ProblemContext {
            id: 7,
            title: "Two Sum".to_string(),
            description: "Find two numbers.".to_string(),
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
    async fn test_ask_without_context_fails_fast() {
        let (_tmp, pool) = test_pool().await;
        let client = ClientConfig::default();

        let err = resolve_ask(&pool, &client, "explain").await.unwrap_err();
        assert!(matches!(err, RelayError::MissingContext));
        assert_eq!(err.to_string(), "No context available");
    }

    #[tokio::test]
    async fn test_ask_without_user_fails_fast() {
        let (_tmp, pool) = test_pool().await;
        store::store_context(&pool, resident_context()).await.unwrap();

        let err = resolve_ask(&pool, &ClientConfig::default(), "explain")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingUser));
    }

    #[tokio::test]
    async fn test_user_name_falls_back_to_page_storage() {
        let (_tmp, pool) = test_pool().await;
        store::store_context(&pool, resident_context()).await.unwrap();
        store::kv_set(&pool, USER_NAME_KEY, "alice").await.unwrap();

        let request = resolve_ask(&pool, &ClientConfig::default(), "explain constraints")
            .await
            .unwrap();
        assert_eq!(request.db_data.user_name, "alice");
        assert_eq!(request.db_data.problem_title, "Two Sum");
    }

    #[tokio::test]
    async fn test_request_wire_shape() {
        let (_tmp, pool) = test_pool().await;
        store::store_context(&pool, resident_context()).await.unwrap();

        let client = ClientConfig {
            user_name: Some("alice".to_string()),
            ..Default::default()
        };
        let request = resolve_ask(&pool, &client, "explain constraints").await.unwrap();

        let wire: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["query"], "explain constraints");
        assert_eq!(wire["context"]["id"], 7);
        assert_eq!(wire["db_data"]["user_name"], "alice");
        assert_eq!(wire["db_data"]["problem_title"], "Two Sum");
    }
}
