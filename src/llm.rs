//! Relay to the hosted generative-language API.
//!
//! The assist server hands the user's question, the resident problem
//! context, and the stored conversation so far to `generateContent` and
//! returns the first candidate's text. One attempt per request; a non-2xx
//! status or network failure is a single error for the caller to report.
//!
//! Requires the `GEMINI_API_KEY` environment variable.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::{ChatMessage, MessageRole, ProblemContext};

/// The question combined with the full problem record, the way the model
/// sees it.
pub fn build_prompt(query: &str, context: &ProblemContext) -> String {
    let context_json =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
    format!("{}\n\nContext:\n{}", query, context_json)
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Prior conversation turns plus the new prompt, in API order.
fn build_contents(history: &[ChatMessage], prompt: &str) -> Vec<Content> {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|message| Content {
            role: match message.role {
                MessageRole::User => "user".to_string(),
                MessageRole::Model => "model".to_string(),
            },
            parts: vec![Part {
                text: message.text.clone(),
            }],
        })
        .collect();

    contents.push(Content {
        role: "user".to_string(),
        parts: vec![Part {
            text: prompt.to_string(),
        }],
    });

    contents
}

/// Ask the model for a reply to `prompt`, continuing `history`.
pub async fn generate_reply(
    config: &LlmConfig,
    history: &[ChatMessage],
    prompt: &str,
) -> Result<String> {
    let api_key =
        std::env::var("GEMINI_API_KEY").map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let url = format!(
        "{}/{}:generateContent?key={}",
        config.base_url, config.model, api_key
    );

    let body = GenerateContentRequest {
        contents: build_contents(history, prompt),
    };

    let response = client.post(&url).json(&body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Generative API error {}: {}", status, body_text);
    }

    let parsed: GenerateContentResponse = response
        .json()
        .await
        .context("Invalid generateContent response")?;

    extract_text(parsed)
}

/// First candidate's parts, concatenated.
fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Generative API returned no candidates"))?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .map(|part| part.text)
        .collect();

    if text.is_empty() {
        bail!("Generative API returned an empty reply");
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn context() -> ProblemContext {
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

    #[test]
    fn test_prompt_embeds_query_and_context() {
        let prompt = build_prompt("explain constraints", &context());
        assert!(prompt.starts_with("explain constraints\n\nContext:\n"));
        assert!(prompt.contains("\"id\": 7"));
        assert!(prompt.contains("\"title\": \"Two Sum\""));
    }

    #[test]
    fn test_contents_end_with_the_new_user_turn() {
        let history = vec![
            ChatMessage {
                role: MessageRole::User,
                text: "hi".to_string(),
                timestamp: Utc::now(),
            },
            ChatMessage {
                role: MessageRole::Model,
                text: "hello".to_string(),
                timestamp: Utc::now(),
            },
        ];

        let contents = build_contents(&history, "next question");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[2].role, "user");
        assert_eq!(contents[2].parts[0].text, "next question");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content {
                    role: "model".to_string(),
                    parts: vec![
                        Part { text: "Use ".to_string() },
                        Part { text: "a hash map.".to_string() },
                    ],
                },
            }],
        };
        assert_eq!(extract_text(response).unwrap(), "Use a hash map.");
    }

    #[test]
    fn test_extract_text_with_no_candidates_is_an_error() {
        let response = GenerateContentResponse { candidates: vec![] };
        assert!(extract_text(response).is_err());
    }
}
