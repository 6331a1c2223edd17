//! Core data models used throughout problem-pal.
//!
//! These types represent the problem context, chat messages, and search
//! results that flow between the watcher, the relays, and the two servers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The structured record describing the problem currently open on the host
/// page. Produced by the extractor from an intercepted API response and held
/// as the single resident record in the context store.
///
/// Optional fields carry explicit placeholder values instead of being
/// omitted, so downstream consumers never branch on field absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemContext {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub constraints: String,
    pub input_format: String,
    pub output_format: String,
    pub hints: Vec<String>,
    pub samples: Vec<Sample>,
    pub supported_languages: Vec<String>,
    pub editorial_solution: String,
    /// Code the user has written for this problem, recovered from the
    /// mirrored page storage. Preserved across context overwrites when the
    /// freshly extracted record has none.
    #[serde(default)]
    pub user_code: Option<String>,
}

/// One sample input/output pair attached to a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub input: String,
    pub output: String,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

/// One message in a conversation. Append-only; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A ranked match returned by the search server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    pub id: String,
    pub score: f64,
    pub metadata: MatchMetadata,
}

/// Metadata stored alongside each indexed vector. The display title is
/// derived from `text` by taking everything up to its first line break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub text: String,
}

// ============ Assist server wire types ============

/// Request body for the assist server's `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    pub context: ProblemContext,
    pub db_data: DbData,
}

/// Identity routing for conversation persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbData {
    pub user_name: String,
    pub problem_title: String,
}

/// Response body for the assist server's `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Response body for the assist server's `GET /history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub status: String,
    pub conversation: Vec<ChatMessage>,
}

// ============ Search server wire types ============

/// Request body for the search server's `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: usize,
}

/// Request body for the search server's `POST /queryById`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchByIdRequest {
    pub id: String,
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: usize,
}

pub(crate) fn default_top_k() -> usize {
    5
}

/// Response body for both search endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchMatch>,
}
