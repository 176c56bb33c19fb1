//! System prompt assembly: persona gating, language lock, memory-block
//! injection, and a short-TTL cache.

pub mod communication;
pub mod language;
pub mod shortcircuit;
pub mod templates;

pub use language::{DetectedLanguage, detect_query_language};
pub use shortcircuit::{check_casual_conversation, check_greetings, check_identity_questions};

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use templates::{
    CREATOR_PERSONA, DEEP_THINK_INSTRUCTION, JAKSEL_PHRASES, TEAM_PERSONA, ZANTARA_MASTER_TEMPLATE,
};

const CACHE_TTL: Duration = Duration::from_secs(300);

/// User profile card injected into the memory block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub role: String,
    pub department: String,
    pub email: String,
    pub preferred_language: String,
    pub notes: String,
}

/// Everything the builder composes into a system prompt; assembled by the
/// orchestrator's context manager each request.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub profile: Option<UserProfile>,
    pub facts: Vec<String>,
    pub collective_facts: Vec<String>,
    pub timeline_summary: String,
    /// Entity cache fallback when no profile row exists.
    pub entities: Map<String, Value>,
    /// Pre-retrieved evidence; when absent the placeholder survives so the
    /// reasoning loop knows retrieval is still pending.
    pub rag_results: Option<String>,
}

/// Builds dynamic system prompts with a 5-minute cache.
///
/// The cache key folds in everything that changes the output: user, mode,
/// memory sizes, persona flags, and the detected language.
pub struct SystemPromptBuilder {
    cache: Mutex<HashMap<String, (String, Instant)>>,
}

impl Default for SystemPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPromptBuilder {
    pub fn new() -> Self {
        Self { cache: Mutex::new(HashMap::new()) }
    }

    pub fn build_system_prompt(
        &self,
        user_id: &str,
        context: &PromptContext,
        query: &str,
        deep_think_mode: bool,
        additional_context: &str,
    ) -> String {
        let user_email = context
            .profile
            .as_ref()
            .filter(|p| !p.email.is_empty())
            .map(|p| p.email.as_str())
            .unwrap_or(user_id);

        let email_lower = user_email.to_lowercase();
        let is_creator = email_lower.contains("antonello") || email_lower.contains("siano");
        let is_team = !is_creator
            && (email_lower.ends_with("@balizero.com")
                || context
                    .profile
                    .as_ref()
                    .is_some_and(|p| p.role.to_lowercase().contains("admin")));

        let detected_lang = language::detect_query_language(query);
        let lang_tag = detected_lang.map(|l| l.tag).unwrap_or("ID");

        let cache_key = format!(
            "{user_id}:{deep_think_mode}:{}:{}:{}:{is_creator}:{is_team}:{}:{lang_tag}",
            context.facts.len(),
            context.collective_facts.len(),
            context.timeline_summary.len(),
            additional_context.len(),
        );

        {
            let mut cache = self.cache.lock().expect("prompt cache lock poisoned");
            if let Some((prompt, cached_at)) = cache.get(&cache_key) {
                if cached_at.elapsed() < CACHE_TTL {
                    debug!(user = user_id, "system prompt cache hit");
                    return prompt.clone();
                }
                cache.remove(&cache_key);
            }
        }

        let user_memory = build_memory_block(context);
        let rag_results = context.rag_results.as_deref().unwrap_or("{rag_results}");

        let mut prompt = ZANTARA_MASTER_TEMPLATE
            .replace("{rag_results}", rag_results)
            .replace("{user_memory}", &user_memory)
            .replace("{query}", if query.is_empty() { "General inquiry" } else { query });

        if let Some(lang) = detected_lang {
            // Non-Indonesian query: strip the Jaksel register so the model
            // cannot leak slang, then pin the response language hard.
            for phrase in JAKSEL_PHRASES {
                prompt = prompt.replace(phrase, "");
            }
            prompt = format!(
                "================================================================================\n\
                 YOU ARE RESPONDING TO A {lang} SPEAKER.\n\
                 YOUR ENTIRE RESPONSE MUST BE IN {lang}.\n\
                 DO NOT USE ANY INDONESIAN WORDS OR SLANG.\n\
                 ================================================================================\n\n{prompt}",
                lang = lang.descriptive,
            );
        }

        if deep_think_mode {
            prompt.push_str(DEEP_THINK_INSTRUCTION);
        }
        if !additional_context.is_empty() {
            prompt.push('\n');
            prompt.push_str(additional_context);
        }

        if is_creator {
            info!(user = user_id, "architect persona activated");
            prompt = format!("{CREATOR_PERSONA}\n\n{prompt}");
        } else if is_team {
            info!(user = user_id, "internal team persona activated");
            prompt = format!("{TEAM_PERSONA}\n\n{prompt}");
        }

        self.cache
            .lock()
            .expect("prompt cache lock poisoned")
            .insert(cache_key, (prompt.clone(), Instant::now()));
        prompt
    }
}

/// Profile card, personal facts, recent timeline, and collective knowledge.
/// An empty block becomes the sentinel the pre-response check branches on.
fn build_memory_block(context: &PromptContext) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(profile) = &context.profile {
        parts.push(format!(
            "User Name: {}\nRole: {}\nDepartment: {}\nNotes: {}",
            if profile.name.is_empty() { "Partner" } else { &profile.name },
            if profile.role.is_empty() { "Team Member" } else { &profile.role },
            if profile.department.is_empty() { "General" } else { &profile.department },
            profile.notes,
        ));
    } else if !context.entities.is_empty() {
        let name = context
            .entities
            .get("user_name")
            .and_then(|v| v.as_str())
            .unwrap_or("Partner");
        let city = context
            .entities
            .get("user_city")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown City");
        parts.push(format!("User Name: {name}\nCity: {city}"));
    }

    if !context.facts.is_empty() {
        let bullets: Vec<String> = context.facts.iter().map(|f| format!("- {f}")).collect();
        parts.push(format!("FACTS:\n{}", bullets.join("\n")));
    }

    if !context.timeline_summary.is_empty() {
        parts.push(format!("RECENT HISTORY:\n{}", context.timeline_summary));
    }

    if !context.collective_facts.is_empty() {
        let bullets: Vec<String> =
            context.collective_facts.iter().map(|f| format!("- {f}")).collect();
        parts.push(format!("COLLECTIVE KNOWLEDGE:\n{}", bullets.join("\n")));
    }

    if parts.is_empty() {
        "No specific memory yet.".to_string()
    } else {
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with_facts() -> PromptContext {
        PromptContext {
            profile: Some(UserProfile {
                name: "Marco".to_string(),
                role: "Entrepreneur".to_string(),
                department: String::new(),
                email: "marco@example.com".to_string(),
                preferred_language: "it".to_string(),
                notes: String::new(),
            }),
            facts: vec!["Interested in PT PMA".to_string(), "Budget: $50k USD".to_string()],
            ..PromptContext::default()
        }
    }

    #[test]
    fn memory_block_lists_profile_and_facts() {
        let prompt = SystemPromptBuilder::new().build_system_prompt(
            "marco@example.com",
            &context_with_facts(),
            "",
            false,
            "",
        );
        assert!(prompt.contains("User Name: Marco"));
        assert!(prompt.contains("- Interested in PT PMA"));
        assert!(!prompt.contains("No specific memory yet."));
    }

    #[test]
    fn empty_memory_emits_sentinel() {
        let prompt = SystemPromptBuilder::new().build_system_prompt(
            "new@example.com",
            &PromptContext::default(),
            "",
            false,
            "",
        );
        assert!(prompt.contains("No specific memory yet."));
    }

    #[test]
    fn entity_fallback_builds_identity_card() {
        let mut entities = Map::new();
        entities.insert("user_name".to_string(), json!("Lena"));
        entities.insert("user_city".to_string(), json!("Ubud"));
        let context = PromptContext { entities, ..PromptContext::default() };
        let prompt = SystemPromptBuilder::new()
            .build_system_prompt("anon", &context, "", false, "");
        assert!(prompt.contains("User Name: Lena"));
        assert!(prompt.contains("City: Ubud"));
    }

    #[test]
    fn non_indonesian_query_strips_jaksel_lexicon() {
        let prompt = SystemPromptBuilder::new().build_system_prompt(
            "user@example.com",
            &PromptContext::default(),
            "Quanto costa una PT PMA? Grazie",
            false,
            "",
        );
        assert!(prompt.contains("YOUR ENTIRE RESPONSE MUST BE IN ITALIAN"));
        for token in ["Jaksel", "gue", "banget", "dong", "nih"] {
            assert!(!prompt.contains(token), "lexicon token leaked: {token}");
        }
    }

    #[test]
    fn indonesian_query_keeps_jaksel_register() {
        let prompt = SystemPromptBuilder::new().build_system_prompt(
            "user@example.com",
            &PromptContext::default(),
            "Berapa harga kitas untuk saya?",
            false,
            "",
        );
        assert!(prompt.contains("Jaksel"));
        assert!(!prompt.contains("YOUR ENTIRE RESPONSE MUST BE IN"));
    }

    #[test]
    fn creator_email_activates_architect_persona() {
        let prompt = SystemPromptBuilder::new().build_system_prompt(
            "antonello@balizero.com",
            &PromptContext::default(),
            "status report",
            false,
            "",
        );
        assert!(prompt.starts_with("\n### IDENTITY: ZANTARA (ARCHITECT MODE)"));
    }

    #[test]
    fn team_email_activates_team_persona() {
        let prompt = SystemPromptBuilder::new().build_system_prompt(
            "amanda@balizero.com",
            &PromptContext::default(),
            "need the kitas checklist",
            false,
            "",
        );
        assert!(prompt.contains("INTERNAL TEAM MODE"));
        assert!(!prompt.contains("ARCHITECT MODE"));
    }

    #[test]
    fn deep_think_appends_instruction() {
        let prompt = SystemPromptBuilder::new().build_system_prompt(
            "user@example.com",
            &PromptContext::default(),
            "Should I open a PT PMA or PT local?",
            true,
            "",
        );
        assert!(prompt.contains("DEEP THINK MODE ACTIVATED"));
    }

    #[test]
    fn cache_returns_identical_prompt_for_identical_key() {
        let builder = SystemPromptBuilder::new();
        let context = context_with_facts();
        let first =
            builder.build_system_prompt("marco@example.com", &context, "kitas?", false, "");
        let second =
            builder.build_system_prompt("marco@example.com", &context, "kitas?", false, "");
        assert_eq!(first, second);
    }

    #[test]
    fn facts_count_invalidates_cache_key() {
        let builder = SystemPromptBuilder::new();
        let mut context = context_with_facts();
        let first =
            builder.build_system_prompt("marco@example.com", &context, "kitas?", false, "");
        context.facts.push("Moving in October 2026".to_string());
        let second =
            builder.build_system_prompt("marco@example.com", &context, "kitas?", false, "");
        assert_ne!(first, second);
    }
}
