//! Query language detection for the prompt's language lock.

/// Indonesian marker words, including Jaksel slang.
const INDONESIAN_MARKERS: &[&str] = &[
    "apa", "bagaimana", "siapa", "dimana", "kapan", "mengapa", "yang", "dengan", "untuk",
    "dari", "saya", "aku", "kamu", "anda", "bisa", "mau", "ingin", "tolong", "halo",
    "gimana", "gue", "gw", "lu", "dong", "nih", "banget",
];

const ITALIAN_MARKERS: &[&str] = &["ciao", "come", "cosa", "voglio", "grazie", "quanto", "perché"];
const FRENCH_MARKERS: &[&str] = &["bonjour", "comment", "pourquoi", "combien", "merci"];
const SPANISH_MARKERS: &[&str] = &["hola", "cómo", "gracias", "cuánto", "quiero"];
const GERMAN_MARKERS: &[&str] = &["hallo", "wie", "warum", "danke", "möchte"];
const ENGLISH_MARKERS: &[&str] = &["what", "how", "where", "when", "please", "hello", "much"];

/// Detected non-Indonesian language, with the descriptive form used in the
/// hard language directive and a short tag for cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedLanguage {
    pub descriptive: &'static str,
    pub tag: &'static str,
}

/// Classify the query language.
///
/// Returns `None` for Indonesian (the default register) and for queries too
/// short to judge; otherwise the detected language drives Jaksel stripping
/// and the language directive.
pub fn detect_query_language(query: &str) -> Option<DetectedLanguage> {
    if query.len() <= 3 {
        return None;
    }
    let query_lower = query.to_lowercase();
    let words: Vec<&str> = query_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let contains_word = |markers: &[&str]| markers.iter().any(|m| words.contains(m));

    if contains_word(INDONESIAN_MARKERS) {
        return None;
    }

    if query.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        return Some(DetectedLanguage { descriptive: "CHINESE (中文)", tag: "ZH" });
    }
    if query.chars().any(|c| ('\u{0600}'..='\u{06ff}').contains(&c)) {
        return Some(DetectedLanguage { descriptive: "ARABIC (العربية)", tag: "AR" });
    }
    if query.chars().any(|c| ('\u{0400}'..='\u{04ff}').contains(&c)) {
        return Some(DetectedLanguage { descriptive: "RUSSIAN/UKRAINIAN", tag: "RU" });
    }
    if contains_word(ITALIAN_MARKERS) {
        return Some(DetectedLanguage { descriptive: "ITALIAN", tag: "IT" });
    }
    if contains_word(FRENCH_MARKERS) {
        return Some(DetectedLanguage { descriptive: "FRENCH", tag: "FR" });
    }
    if contains_word(SPANISH_MARKERS) {
        return Some(DetectedLanguage { descriptive: "SPANISH", tag: "ES" });
    }
    if contains_word(GERMAN_MARKERS) {
        return Some(DetectedLanguage { descriptive: "GERMAN", tag: "DE" });
    }
    if contains_word(ENGLISH_MARKERS) {
        return Some(DetectedLanguage { descriptive: "ENGLISH", tag: "EN" });
    }
    Some(DetectedLanguage { descriptive: "SAME AS USER'S QUERY", tag: "XX" })
}
