//! Response post-processing: strip internal reasoning, format procedural
//! answers as numbered lists, acknowledge emotional queries.

use std::sync::OnceLock;

use regex::Regex;

use zantara_prompt::communication::{
    clean_response, detect_language, emotional_acknowledgment, has_emotional_content,
    is_procedural_question,
};

/// Apply the communication rules to a raw model answer.
pub fn post_process_response(response: &str, query: &str) -> String {
    let cleaned = clean_response(response);

    let language = detect_language(query);
    let mut result = cleaned;

    if is_procedural_question(query) && !has_numbered_list(&result) {
        result = format_as_numbered_list(&result, language);
    }

    if has_emotional_content(query) && !has_acknowledgment(&result, language) {
        let acknowledgment = emotional_acknowledgment(language);
        if !result
            .to_lowercase()
            .starts_with(&acknowledgment.to_lowercase()[..20.min(acknowledgment.len())])
        {
            result = format!("{acknowledgment}{result}");
        }
    }

    result.trim().to_string()
}

fn numbered_list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[1-9][\.\)]\s+").expect("valid numbered list regex"))
}

fn has_numbered_list(text: &str) -> bool {
    numbered_list_regex().is_match(text)
}

/// Pull actionable sentences into a numbered list when the answer reads
/// like prose but the question asked for steps.
fn format_as_numbered_list(text: &str, language: &str) -> String {
    let action_verbs: &[&str] = match language {
        "it" => &["prepara", "trova", "applica", "compila", "invia", "attendi", "ritira"],
        "id" => &["siapkan", "cari", "ajukan", "isi", "kirim", "tunggu", "ambil"],
        _ => &["prepare", "find", "apply", "fill", "submit", "wait", "collect"],
    };

    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let actionable: Vec<&str> = sentences
        .iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            s.len() > 20 && action_verbs.iter().any(|v| lower.contains(v))
        })
        .copied()
        .collect();

    if actionable.len() >= 2 {
        actionable
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {s}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.to_string()
    }
}

fn has_acknowledgment(text: &str, language: &str) -> bool {
    let head: String = text.to_lowercase().chars().take(200).collect();
    let keywords: &[&str] = match language {
        "it" => &["capisco", "tranquillo", "aiuto", "soluzione", "possibilità"],
        "id" => &["mengerti", "tenang", "bantuan", "solusi", "kemungkinan"],
        _ => &["understand", "don't worry", "help", "solution", "possible"],
    };
    keywords.iter().any(|k| head.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_markers_are_removed() {
        let raw = "THOUGHT: checking\nThe C1 visa costs Rp 2,300,000.";
        assert_eq!(
            post_process_response(raw, "What does the C1 visa cost?"),
            "The C1 visa costs Rp 2,300,000."
        );
    }

    #[test]
    fn procedural_answers_become_numbered_lists() {
        let raw = "First prepare your passport and sponsor letter for the application. \
                   Then submit the application through the online portal and pay the fee. \
                   Finally wait for approval by email.";
        let out = post_process_response(raw, "How do I apply for a KITAS?");
        assert!(out.starts_with("1. "));
        assert!(out.contains("2. "));
    }

    #[test]
    fn existing_numbered_lists_are_left_alone() {
        let raw = "1. Prepare documents\n2. Submit application";
        let out = post_process_response(raw, "How do I apply?");
        assert_eq!(out, raw);
    }

    #[test]
    fn emotional_queries_get_an_acknowledgment() {
        let out = post_process_response(
            "You can fix the overstay by paying the fine at the airport.",
            "I'm so stressed, I overstayed my visa, help me",
        );
        assert!(out.starts_with("I understand the frustration"));
    }

    #[test]
    fn acknowledgment_is_not_duplicated() {
        let raw = "I understand the frustration, but don't worry - here is the fix.";
        let out = post_process_response(raw, "I'm stressed about my visa, help me");
        assert_eq!(out.matches("I understand the frustration").count(), 1);
    }

    #[test]
    fn neutral_answers_pass_through() {
        let raw = "The PPh 21 rate depends on the income bracket.";
        assert_eq!(post_process_response(raw, "What is the PPh 21 rate?"), raw);
    }
}
