//! Communication rules shared by the response pipeline and the
//! orchestrator: response cleaning, language/format/emotion detection, and
//! the out-of-domain gate.

use std::sync::OnceLock;

use regex::Regex;

/// Coarse response language: the three languages the post-processing rules
/// localize for.
pub fn detect_language(query: &str) -> &'static str {
    let query_lower = query.to_lowercase();
    let words: Vec<&str> = query_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    const ITALIAN: &[&str] = &["ciao", "come", "cosa", "quanto", "voglio", "grazie", "posso"];
    const INDONESIAN: &[&str] = &["apa", "bagaimana", "berapa", "saya", "bisa", "tolong", "halo"];

    if ITALIAN.iter().any(|m| words.contains(m)) {
        "it"
    } else if INDONESIAN.iter().any(|m| words.contains(m)) {
        "id"
    } else {
        "en"
    }
}

/// Strip internal reasoning markers that must never reach the user.
pub fn clean_response(response: &str) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    for line in response.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("THOUGHT:")
            || trimmed.starts_with("ACTION:")
            || trimmed.starts_with("Observation:")
        {
            continue;
        }
        cleaned.push(line);
    }
    let mut text = cleaned.join("\n");
    if let Some(stripped) = text.trim_start().strip_prefix("Final Answer:") {
        text = stripped.trim_start().to_string();
    }
    text.trim().to_string()
}

fn procedural_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(how do i|how to|how can i|what are the steps|step by step|procedure|process for|come faccio|come posso|quali sono i passaggi|bagaimana cara|langkah)\b",
        )
        .expect("valid procedural regex")
    })
}

pub fn is_procedural_question(query: &str) -> bool {
    procedural_regex().is_match(query)
}

fn emotional_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(frustrated|worried|scared|stressed|anxious|confused|help me|urgent|desperate|panico|preoccupato|frustrato|aiutami|bingung|takut|khawatir)\b",
        )
        .expect("valid emotional regex")
    })
}

pub fn has_emotional_content(query: &str) -> bool {
    emotional_regex().is_match(query)
}

/// Localized empathy line prepended to responses to emotional queries.
pub fn emotional_acknowledgment(language: &str) -> &'static str {
    match language {
        "it" => "Capisco la frustrazione, ma tranquillo - quasi ogni situazione ha una soluzione. ",
        "id" => "Saya mengerti frustrasinya, tapi tenang - hampir setiap situasi ada solusinya. ",
        _ => "I understand the frustration, but don't worry - almost every situation has a solution. ",
    }
}

// ── Out-of-domain gate ──────────────────────────────────────────────────────

/// Reasons a query is rejected before any model work.
pub const OUT_OF_DOMAIN_RESPONSES: &[(&str, &str)] = &[
    (
        "general_knowledge",
        "I'm specialized in Indonesian business, visa, tax, and legal matters. For general knowledge questions, a general-purpose assistant will serve you better. Is there anything about living, working, or doing business in Indonesia I can help with?",
    ),
    (
        "other_country",
        "My expertise covers Indonesia specifically. For questions about other countries' immigration or business rules I'd only be guessing. Anything about Indonesia I can help with?",
    ),
    (
        "unknown",
        "That's outside what I can help with. I specialize in Indonesian business, visa, tax, and legal matters - ask me anything in that area!",
    ),
];

pub fn out_of_domain_response(reason: &str) -> &'static str {
    OUT_OF_DOMAIN_RESPONSES
        .iter()
        .find(|(key, _)| *key == reason)
        .or_else(|| OUT_OF_DOMAIN_RESPONSES.iter().find(|(key, _)| *key == "unknown"))
        .map(|(_, message)| *message)
        .expect("unknown fallback present")
}

fn general_knowledge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(capital of|largest city of|population of|who won|world cup|olympic|celebrity|movie star|lyrics|recipe for|distance between|speed of light|square root of the universe)\b",
        )
        .expect("valid general knowledge regex")
    })
}

fn other_country_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(visa|residence|work permit|company|tax)\b.*\b(thailand|vietnam|malaysia|singapore|philippines|dubai|portugal|spain|mexico|usa|australia)\b",
        )
        .expect("valid other country regex")
    })
}

/// Classify a query as out-of-domain. Returns the reason, or `None` when
/// the query is in scope.
pub fn is_out_of_domain(query: &str) -> Option<&'static str> {
    if general_knowledge_regex().is_match(query) {
        return Some("general_knowledge");
    }
    if other_country_regex().is_match(query) {
        return Some("other_country");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_reasoning_lines() {
        let raw = "THOUGHT: need pricing data\nACTION: get_pricing(service_type=\"kitas\")\nObservation: prices listed\nThe E33G KITAS costs Rp 12,500,000 per year.";
        assert_eq!(clean_response(raw), "The E33G KITAS costs Rp 12,500,000 per year.");
    }

    #[test]
    fn clean_strips_final_answer_prefix() {
        assert_eq!(clean_response("Final Answer: It costs Rp 2,300,000."), "It costs Rp 2,300,000.");
    }

    #[test]
    fn language_detection_covers_three_locales() {
        assert_eq!(detect_language("Quanto costa il visto? grazie"), "it");
        assert_eq!(detect_language("Berapa harga kitas saya?"), "id");
        assert_eq!(detect_language("How long does it take?"), "en");
    }

    #[test]
    fn procedural_detection() {
        assert!(is_procedural_question("How do I open a PT PMA?"));
        assert!(is_procedural_question("Bagaimana cara perpanjang kitas?"));
        assert!(!is_procedural_question("What is the PPh 21 rate?"));
    }

    #[test]
    fn emotional_detection() {
        assert!(has_emotional_content("I'm so frustrated with my overstay fine, help me"));
        assert!(!has_emotional_content("What is the VAT rate?"));
    }

    #[test]
    fn capital_of_france_is_out_of_domain() {
        assert_eq!(is_out_of_domain("What is the capital of France?"), Some("general_knowledge"));
    }

    #[test]
    fn other_country_visas_are_out_of_domain() {
        assert_eq!(
            is_out_of_domain("How do I get a work permit in Thailand?"),
            Some("other_country")
        );
    }

    #[test]
    fn indonesia_business_stays_in_domain() {
        assert!(is_out_of_domain("How do I register a PT PMA in Bali?").is_none());
        assert!(is_out_of_domain("What is the E33G visa?").is_none());
    }

    #[test]
    fn unknown_reason_maps_to_fallback_message() {
        assert!(out_of_domain_response("nonexistent").contains("outside what I can help with"));
    }
}
