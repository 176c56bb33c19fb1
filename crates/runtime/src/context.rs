//! Per-request user context: profile and latest conversation in one
//! combined query, memory context through the orchestrator, and the
//! recall-assist vector search for identity/team intents.

use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::{debug, error, info, warn};

use zantara_memory::MemoryOrchestrator;
use zantara_prompt::UserProfile;
use zantara_retrieval::{SearchService, collections};
use zantara_vector::{FilterCond, SearchFilter};

/// Everything loaded for one request before prompt assembly.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub profile: Option<UserProfile>,
    pub history: Vec<Value>,
    pub facts: Vec<String>,
    pub collective_facts: Vec<String>,
    pub timeline_summary: String,
    pub kg_entities: Vec<Value>,
    pub summary: String,
    pub counters: serde_json::Map<String, Value>,
    pub entities: serde_json::Map<String, Value>,
    /// Recall-assist candidates: context hints, not evidence.
    pub memory_vector_candidates: Vec<Value>,
    pub memory_error: Option<String>,
}

/// Load profile + latest conversation with a single combined query, then
/// the memory context. Anonymous users and missing pools return an empty
/// context rather than failing the request.
pub async fn get_user_context(
    pool: Option<&PgPool>,
    user_id: Option<&str>,
    memory: Option<&MemoryOrchestrator>,
    query: Option<&str>,
) -> UserContext {
    let mut context = UserContext::default();

    let Some(user_id) = user_id.filter(|u| !u.is_empty() && *u != "anonymous") else {
        debug!("anonymous user, returning empty context");
        return context;
    };

    if let Some(pool) = pool {
        // Profile and newest conversation in one round trip.
        let row = sqlx::query(
            "SELECT
                 tm.id, tm.full_name AS name, tm.role, tm.department,
                 tm.language AS preferred_language, tm.notes, tm.email,
                 (
                     SELECT json_build_object('id', c.id, 'messages', c.messages)
                     FROM conversations c
                     WHERE c.user_id = CAST(tm.id AS TEXT) OR c.user_id = tm.email
                     ORDER BY c.created_at DESC
                     LIMIT 1
                 ) AS latest_conversation
             FROM team_members tm
             WHERE CAST(tm.id AS TEXT) = $1 OR tm.email = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await;

        match row {
            Ok(Some(row)) => {
                let profile = UserProfile {
                    name: row.try_get::<Option<String>, _>("name").ok().flatten().unwrap_or_default(),
                    role: row.try_get::<Option<String>, _>("role").ok().flatten().unwrap_or_default(),
                    department: row
                        .try_get::<Option<String>, _>("department")
                        .ok()
                        .flatten()
                        .unwrap_or_default(),
                    email: row.try_get::<Option<String>, _>("email").ok().flatten().unwrap_or_default(),
                    preferred_language: row
                        .try_get::<Option<String>, _>("preferred_language")
                        .ok()
                        .flatten()
                        .unwrap_or_default(),
                    notes: row.try_get::<Option<String>, _>("notes").ok().flatten().unwrap_or_default(),
                };
                info!(user = user_id, name = %profile.name, "profile loaded");
                context.profile = Some(profile);

                if let Ok(Some(conversation)) = row.try_get::<Option<Value>, _>("latest_conversation") {
                    context.history = extract_messages(&conversation);
                }
            }
            Ok(None) => debug!(user = user_id, "no profile row"),
            Err(err) => {
                error!(user = user_id, "failed to fetch profile/history: {err}");
            }
        }
    }

    if let Some(memory) = memory {
        let memory_context = memory.get_user_context(user_id, query).await;
        context.facts = memory_context.profile_facts;
        context.collective_facts = memory_context.collective_facts;
        context.timeline_summary = memory_context.timeline_summary;
        context.kg_entities = memory_context.kg_entities;
        context.summary = memory_context.summary;
        context.counters = memory_context.counters;
    }

    context
}

/// Last six messages (three turns) of the stored conversation; tolerates
/// JSONB arriving as a string.
fn extract_messages(conversation: &Value) -> Vec<Value> {
    let conversation = match conversation {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => parsed,
            Err(_) => return Vec::new(),
        },
        other => other.clone(),
    };

    let messages = match conversation.get("messages") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    };

    match messages.as_array() {
        Some(list) => {
            let start = list.len().saturating_sub(6);
            list[start..].to_vec()
        }
        None => Vec::new(),
    }
}

/// Recall assist: search the personal-memory collection for candidates.
/// Only called for identity/team intents; results are hints, not evidence.
pub async fn search_memory_vector(
    search: &SearchService,
    query: &str,
    user_id: Option<&str>,
    limit: usize,
) -> Vec<Value> {
    let filter = user_id
        .filter(|u| !u.is_empty() && *u != "anonymous")
        .map(|user| {
            let mut filter = SearchFilter::new();
            filter.insert("userId".to_string(), FilterCond::Eq(Value::String(user.to_string())));
            filter
        });

    match search
        .search_collection(query, collections::ZANTARA_MEMORIES, limit, filter.as_ref())
        .await
    {
        Ok(results) => results
            .results
            .into_iter()
            .map(|doc| {
                serde_json::json!({
                    "text": doc.text,
                    "metadata": doc.metadata,
                    "score": doc.score,
                })
            })
            .collect(),
        Err(err) => {
            warn!("memory vector search failed: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn anonymous_user_gets_empty_context() {
        let context = get_user_context(None, Some("anonymous"), None, None).await;
        assert!(context.profile.is_none());
        assert!(context.history.is_empty());

        let context = get_user_context(None, None, None, None).await;
        assert!(context.profile.is_none());
    }

    #[test]
    fn extract_messages_takes_last_three_turns() {
        let messages: Vec<Value> = (0..10)
            .map(|i| json!({"role": if i % 2 == 0 { "user" } else { "assistant" }, "content": format!("m{i}")}))
            .collect();
        let conversation = json!({"id": 1, "messages": messages});
        let extracted = extract_messages(&conversation);
        assert_eq!(extracted.len(), 6);
        assert_eq!(extracted[0]["content"], "m4");
    }

    #[test]
    fn extract_messages_handles_stringified_jsonb() {
        let inner = json!({"id": 2, "messages": [{"role": "user", "content": "hi"}]});
        let conversation = Value::String(inner.to_string());
        let extracted = extract_messages(&conversation);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0]["content"], "hi");
    }

    #[test]
    fn extract_messages_tolerates_garbage() {
        assert!(extract_messages(&json!("not json at all {")).is_empty());
        assert!(extract_messages(&json!({"messages": "oops"})).is_empty());
        assert!(extract_messages(&json!(null)).is_empty());
    }
}
