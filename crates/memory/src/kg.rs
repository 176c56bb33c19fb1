//! Knowledge graph repository: entity and relationship upserts plus the
//! query helpers the graph tools use.
//!
//! Uniqueness contracts: entities on `(type, canonical_name)`,
//! relationships on `(source, target, relationship_type)`. Repeated
//! entity upserts increment `mention_count` and merge metadata; repeated
//! relationship upserts average `strength` and append evidence.

use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};
use sqlx::{PgConnection, PgPool, Row};
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct KnowledgeGraphRepository {
    pool: PgPool,
}

impl KnowledgeGraphRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or update an entity inside the caller's transaction; returns
    /// the entity id.
    pub async fn upsert_entity(
        &self,
        conn: &mut PgConnection,
        entity_type: &str,
        name: &str,
        canonical_name: &str,
        metadata: &Value,
    ) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO kg_entities (type, name, canonical_name, metadata, mention_count, last_seen_at)
             VALUES ($1, $2, $3, $4, 1, NOW())
             ON CONFLICT (type, canonical_name)
             DO UPDATE SET
                 mention_count = kg_entities.mention_count + 1,
                 last_seen_at = NOW(),
                 metadata = kg_entities.metadata || EXCLUDED.metadata
             RETURNING id::bigint AS id",
        )
        .bind(entity_type)
        .bind(name)
        .bind(canonical_name)
        .bind(metadata)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.get("id"))
    }

    /// Insert or update a relationship inside the caller's transaction.
    /// On conflict the strength is averaged and evidence appended.
    pub async fn upsert_relationship(
        &self,
        conn: &mut PgConnection,
        source_id: i64,
        target_id: i64,
        rel_type: &str,
        strength: f64,
        evidence: &str,
        source_ref: &Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO kg_relationships (
                 source_entity_id, target_entity_id, relationship_type,
                 strength, evidence, source_references
             )
             VALUES ($1, $2, $3, $4, ARRAY[$5], $6::jsonb)
             ON CONFLICT (source_entity_id, target_entity_id, relationship_type)
             DO UPDATE SET
                 strength = (kg_relationships.strength + EXCLUDED.strength) / 2,
                 evidence = array_append(kg_relationships.evidence, $5),
                 source_references = kg_relationships.source_references || EXCLUDED.source_references,
                 updated_at = NOW()",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(rel_type)
        .bind(strength)
        .bind(evidence)
        .bind(json!([source_ref]))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Record where an entity was seen; context is capped at 500 chars.
    pub async fn add_entity_mention(
        &self,
        conn: &mut PgConnection,
        entity_id: i64,
        source_type: &str,
        source_id: &str,
        context: &str,
    ) -> Result<()> {
        let context: String = context.chars().take(500).collect();
        sqlx::query(
            "INSERT INTO kg_entity_mentions (entity_id, source_type, source_id, context)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entity_id)
        .bind(source_type)
        .bind(source_id)
        .bind(context)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Top entities, hub analysis, and relationship-type counts.
    pub async fn get_entity_insights(&self, top_n: i64) -> Value {
        let top_n = if (1..=100).contains(&top_n) { top_n } else { 20 };

        let result: Result<Value> = async {
            let top_rows = sqlx::query(
                "SELECT type, name, mention_count::bigint AS mention_count
                 FROM kg_entities
                 ORDER BY mention_count DESC
                 LIMIT $1",
            )
            .bind(top_n)
            .fetch_all(&self.pool)
            .await?;

            let top_entities: Vec<Value> = top_rows
                .iter()
                .map(|row| {
                    json!({
                        "type": row.get::<String, _>("type"),
                        "name": row.get::<String, _>("name"),
                        "mentions": row.get::<i64, _>("mention_count"),
                    })
                })
                .collect();

            let hub_rows = sqlx::query(
                "SELECT e.type, e.name, COUNT(DISTINCT r.id) AS connection_count
                 FROM kg_entities e
                 JOIN kg_relationships r
                   ON e.id = r.source_entity_id OR e.id = r.target_entity_id
                 GROUP BY e.id, e.type, e.name
                 ORDER BY connection_count DESC
                 LIMIT $1",
            )
            .bind(top_n)
            .fetch_all(&self.pool)
            .await?;

            let hubs: Vec<Value> = hub_rows
                .iter()
                .map(|row| {
                    json!({
                        "type": row.get::<String, _>("type"),
                        "name": row.get::<String, _>("name"),
                        "connections": row.get::<i64, _>("connection_count"),
                    })
                })
                .collect();

            let rel_rows = sqlx::query(
                "SELECT relationship_type, COUNT(*) AS count
                 FROM kg_relationships
                 GROUP BY relationship_type
                 ORDER BY count DESC",
            )
            .fetch_all(&self.pool)
            .await?;

            let mut relationship_types = serde_json::Map::new();
            for row in rel_rows {
                relationship_types.insert(
                    row.get::<String, _>("relationship_type"),
                    json!(row.get::<i64, _>("count")),
                );
            }

            Ok(json!({
                "top_entities": top_entities,
                "hubs": hubs,
                "relationship_types": relationship_types,
                "generated_at": Utc::now().to_rfc3339(),
            }))
        }
        .await;

        result.unwrap_or_else(|err| {
            error!("failed to build entity insights: {err}");
            json!({
                "top_entities": [],
                "hubs": [],
                "relationship_types": {},
                "generated_at": Utc::now().to_rfc3339(),
            })
        })
    }

    /// Entities tied to a user's conversations.
    pub async fn get_user_related_entities(&self, user_id: &str, limit: i64) -> Result<Vec<Value>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ke.id::bigint AS entity_id, ke.type, ke.name, ke.mention_count::bigint AS mention_count
             FROM kg_entity_mentions km
             JOIN kg_entities ke ON ke.id = km.entity_id
             WHERE km.source_type = 'conversation'
               AND km.source_id LIKE $1
             ORDER BY mention_count DESC
             LIMIT $2",
        )
        .bind(format!("%{user_id}%"))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                json!({
                    "entity_id": row.get::<i64, _>("entity_id"),
                    "type": row.get::<String, _>("type"),
                    "name": row.get::<String, _>("name"),
                    "mentions": row.get::<i64, _>("mention_count"),
                })
            })
            .collect())
    }

    /// Relevant entities plus their relationship types, for enriching the
    /// model's context on a query.
    pub async fn get_entity_context_for_query(&self, query: &str, limit: i64) -> Vec<Value> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT
                 e.id::bigint AS id, e.type, e.name, e.canonical_name, e.metadata, e.mention_count::bigint AS mention_count,
                 array_agg(DISTINCT r.relationship_type)
                     FILTER (WHERE r.relationship_type IS NOT NULL) AS relationship_types
             FROM kg_entities e
             LEFT JOIN kg_relationships r
               ON e.id = r.source_entity_id OR e.id = r.target_entity_id
             WHERE e.name ILIKE $1 OR e.canonical_name ILIKE $1
             GROUP BY e.id, e.type, e.name, e.canonical_name, e.metadata, e.mention_count
             ORDER BY e.mention_count DESC
             LIMIT $2",
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows
                .iter()
                .map(|row| {
                    json!({
                        "entity_id": row.get::<i64, _>("id"),
                        "type": row.get::<String, _>("type"),
                        "name": row.get::<String, _>("name"),
                        "canonical_name": row.get::<String, _>("canonical_name"),
                        "metadata": row.try_get::<Value, _>("metadata").unwrap_or(json!({})),
                        "mentions": row.get::<i64, _>("mention_count"),
                        "relationships": row
                            .try_get::<Vec<String>, _>("relationship_types")
                            .unwrap_or_default(),
                    })
                })
                .collect(),
            Err(err) => {
                warn!("entity context query failed: {err}");
                Vec::new()
            }
        }
    }

    /// Text search over entities, ranked by how often the sources mention
    /// them.
    pub async fn semantic_search_entities(&self, query: &str, top_k: i64) -> Vec<Value> {
        if query.is_empty() {
            return Vec::new();
        }
        let top_k = if (1..=100).contains(&top_k) { top_k } else { 10 };
        let pattern = format!("%{query}%");

        let rows = sqlx::query(
            "SELECT
                 e.id::bigint AS id, e.type, e.name, e.mention_count::bigint AS mention_count, e.metadata,
                 COUNT(DISTINCT m.id) AS mention_count_in_sources
             FROM kg_entities e
             LEFT JOIN kg_entity_mentions m ON e.id = m.entity_id
             WHERE e.name ILIKE $1
                OR e.canonical_name ILIKE $1
                OR e.metadata::text ILIKE $1
             GROUP BY e.id, e.type, e.name, e.mention_count, e.metadata
             ORDER BY mention_count_in_sources DESC
             LIMIT $2",
        )
        .bind(&pattern)
        .bind(top_k)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows
                .iter()
                .map(|row| {
                    json!({
                        "entity_id": row.get::<i64, _>("id"),
                        "type": row.get::<String, _>("type"),
                        "name": row.get::<String, _>("name"),
                        "mentions": row.get::<i64, _>("mention_count"),
                        "metadata": row.try_get::<Value, _>("metadata").unwrap_or(json!({})),
                        "source_mentions": row.get::<i64, _>("mention_count_in_sources"),
                    })
                })
                .collect(),
            Err(err) => {
                error!("entity search failed: {err}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> Option<KnowledgeGraphRepository> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        Some(KnowledgeGraphRepository::new(pool))
    }

    #[tokio::test]
    #[ignore = "requires postgres via DATABASE_URL"]
    async fn repeated_upserts_increment_mention_count() {
        let Some(repo) = repo().await else { return };
        let mut tx = repo.pool().begin().await.unwrap();

        let id1 = repo
            .upsert_entity(&mut tx, "law", "UU 13/2003", "uu-13-2003", &json!({"topic": "manpower"}))
            .await
            .unwrap();
        let id2 = repo
            .upsert_entity(&mut tx, "law", "UU 13/2003", "uu-13-2003", &json!({"year": 2003}))
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let row = sqlx::query("SELECT mention_count::bigint AS mention_count, metadata FROM kg_entities WHERE id = $1")
            .bind(id1)
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("mention_count"), 2);
        let metadata: Value = row.get("metadata");
        assert_eq!(metadata["topic"], "manpower");
        assert_eq!(metadata["year"], 2003);

        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires postgres via DATABASE_URL"]
    async fn inserted_entity_is_findable_by_canonical_name() {
        let Some(repo) = repo().await else { return };
        let mut tx = repo.pool().begin().await.unwrap();
        repo.upsert_entity(&mut tx, "visa", "E33G", "e33g-digital-nomad", &json!({}))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let hits = repo.semantic_search_entities("e33g-digital-nomad", 10).await;
        assert!(hits.iter().any(|h| h["canonical_name"] == "e33g-digital-nomad"
            || h["name"] == "E33G"));
    }
}
