//! Per-(user, problem-title) conversation persistence.
//!
//! Users and conversations are created lazily: the first query against a
//! never-seen title creates both rows. Messages are append-only: every
//! query round-trip appends exactly one user message and one model reply,
//! and resubmitting an identical query appends a fresh pair rather than
//! deduplicating. History reads never create anything.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{ChatMessage, MessageRole};

/// Look up the user row for `name`, creating it on first sight.
pub async fn get_or_create_user(pool: &SqlitePool, name: &str) -> Result<String> {
    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO users (id, name, created_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;

    Ok(id)
}

/// Look up the conversation for (owner, title), creating it on first sight.
pub async fn get_or_create_conversation(
    pool: &SqlitePool,
    owner_id: &str,
    title: &str,
) -> Result<String> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM conversations WHERE owner_id = ? AND title = ?")
            .bind(owner_id)
            .bind(title)
            .fetch_optional(pool)
            .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO conversations (id, owner_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(owner_id)
    .bind(title)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Append one user/model message pair to a conversation.
///
/// The pair is written in a single transaction so a failed round-trip never
/// leaves half an exchange behind.
pub async fn append_exchange(
    pool: &SqlitePool,
    conversation_id: &str,
    user_text: &str,
    model_text: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let next_seq: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?",
    )
    .bind(conversation_id)
    .fetch_one(&mut *tx)
    .await?;

    let now = Utc::now().timestamp();
    for (offset, (role, text)) in [("user", user_text), ("model", model_text)]
        .into_iter()
        .enumerate()
    {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, seq, role, text, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(next_seq + offset as i64)
        .bind(role)
        .bind(text)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// The full message history for (user, title) in append order. A never-seen
/// pair yields an empty list; nothing is created.
pub async fn history(pool: &SqlitePool, user_name: &str, title: &str) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT m.role, m.text, m.created_at
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        JOIN users u ON u.id = c.owner_id
        WHERE u.name = ? AND c.title = ?
        ORDER BY m.seq
        "#,
    )
    .bind(user_name)
    .bind(title)
    .fetch_all(pool)
    .await?;

    let messages = rows
        .iter()
        .map(|row| {
            let role: String = row.get("role");
            let created_at: i64 = row.get("created_at");
            ChatMessage {
                role: if role == "model" {
                    MessageRole::Model
                } else {
                    MessageRole::User
                },
                text: row.get("text"),
                timestamp: timestamp_from_secs(created_at),
            }
        })
        .collect();

    Ok(messages)
}

fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
