//! Database operations for per-user memory: facts, summary, counters, and
//! the episodic timeline.
//!
//! Fact storage is idempotent under identical content: `memory_facts`
//! carries a unique index on `(user_id, LOWER(content))`, and inserts use
//! `ON CONFLICT DO NOTHING`. A soft per-user cap evicts the oldest facts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use sqlx::{PgPool, Row};
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct MemoryFact {
    pub content: String,
    pub fact_type: Option<String>,
    pub confidence: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MemoryRepository {
    pool: PgPool,
    max_facts_per_user: i64,
    summary_max_chars: usize,
}

impl MemoryRepository {
    pub fn new(pool: PgPool, max_facts_per_user: i64, summary_max_chars: usize) -> Self {
        Self { pool, max_facts_per_user, summary_max_chars }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Users are created lazily on first write.
    pub async fn ensure_user(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_stats (user_id, conversations_count, facts_count, last_seen_at)
             VALUES ($1, 0, 0, NOW())
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store one fact. Returns `true` when a new row was written, `false`
    /// when an equal fact (case-insensitive) already existed.
    pub async fn add_fact(
        &self,
        user_id: &str,
        content: &str,
        fact_type: Option<&str>,
        confidence: f64,
        source: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<bool> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(false);
        }

        let inserted = sqlx::query(
            "INSERT INTO memory_facts (user_id, content, fact_type, confidence, source, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (user_id, LOWER(content)) DO NOTHING",
        )
        .bind(user_id)
        .bind(content)
        .bind(fact_type)
        .bind(confidence)
        .bind(source)
        .bind(metadata.cloned().unwrap_or_else(|| json!({})))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            self.evict_over_quota(user_id).await?;
            sqlx::query(
                "UPDATE user_stats SET facts_count = facts_count + 1, last_seen_at = NOW()
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(inserted > 0)
    }

    /// Oldest facts go first once a user crosses the soft cap.
    async fn evict_over_quota(&self, user_id: &str) -> Result<()> {
        let evicted = sqlx::query(
            "DELETE FROM memory_facts
             WHERE user_id = $1
               AND id NOT IN (
                   SELECT id FROM memory_facts
                   WHERE user_id = $1
                   ORDER BY created_at DESC
                   LIMIT $2
               )",
        )
        .bind(user_id)
        .bind(self.max_facts_per_user)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if evicted > 0 {
            debug!(user = user_id, evicted, "evicted facts over quota");
        }
        Ok(())
    }

    pub async fn get_facts(&self, user_id: &str) -> Result<Vec<MemoryFact>> {
        let rows = sqlx::query(
            "SELECT content, fact_type, confidence::float8 AS confidence, created_at
             FROM memory_facts
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(self.max_facts_per_user)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MemoryFact {
                content: row.get("content"),
                fact_type: row.get("fact_type"),
                confidence: row.try_get("confidence").unwrap_or(0.5),
                created_at: row.try_get("created_at").ok(),
            })
            .collect())
    }

    /// Summaries are truncated to the configured maximum on write.
    pub async fn update_summary(&self, user_id: &str, summary: &str) -> Result<()> {
        let truncated: String = summary.chars().take(self.summary_max_chars).collect();
        sqlx::query(
            "UPDATE user_stats SET summary = $2, last_seen_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(truncated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn bump_conversation_counter(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE user_stats
             SET conversations_count = conversations_count + 1, last_seen_at = NOW()
             WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_summary_and_counters(&self, user_id: &str) -> Result<(String, Map<String, Value>)> {
        let row = sqlx::query(
            "SELECT summary, conversations_count::bigint AS conversations_count, facts_count::bigint AS facts_count, last_seen_at
             FROM user_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok((String::new(), Map::new()));
        };

        let mut counters = Map::new();
        counters.insert(
            "conversations".to_string(),
            json!(row.try_get::<i64, _>("conversations_count").unwrap_or(0)),
        );
        counters.insert(
            "facts".to_string(),
            json!(row.try_get::<i64, _>("facts_count").unwrap_or(0)),
        );
        if let Ok(last_seen) = row.try_get::<DateTime<Utc>, _>("last_seen_at") {
            counters.insert("last_seen_at".to_string(), json!(last_seen.to_rfc3339()));
        }

        let summary: Option<String> = row.try_get("summary").ok();
        Ok((summary.unwrap_or_default(), counters))
    }

    /// Compact "recent history" line for the prompt's memory block.
    pub async fn recent_timeline(&self, user_id: &str, limit: i64) -> Result<String> {
        let rows = sqlx::query(
            "SELECT summary, created_at
             FROM episodic_memories
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let lines: Vec<String> = rows
            .into_iter()
            .filter_map(|row| {
                let summary: Option<String> = row.try_get("summary").ok();
                let summary = summary?;
                let when: Option<DateTime<Utc>> = row.try_get("created_at").ok();
                Some(match when {
                    Some(when) => format!("- [{}] {}", when.format("%Y-%m-%d"), summary),
                    None => format!("- {summary}"),
                })
            })
            .collect();

        Ok(lines.join("\n"))
    }

    /// Append a shared, cross-user fact to the collective store table.
    pub async fn add_collective_fact(&self, content: &str, source_user: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO collective_memories (content, source_user, created_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT DO NOTHING",
        )
        .bind(content)
        .bind(source_user)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
