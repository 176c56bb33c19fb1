//! Fast paths the orchestrator checks before any retrieval or model work:
//! greetings, casual conversation, and identity questions.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

fn greeting_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"^(ciao|hello|hi|hey|salve|buongiorno|buonasera|buon pomeriggio|good morning|good afternoon|good evening)$",
            r"^(ciao|hello|hi|hey|salve)\s*!*$",
            r"^(ciao|hello|hi|hey|salve)\s+(zan|zantara|there)$",
            r"^(привіт|вітаю|добрий день|доброго ранку|доброго вечора)\s*!*$",
            r"^(привет|здравствуй|здравствуйте|добрый день|доброе утро|добрый вечер)\s*!*$",
            r"^(bonjour|salut|bonsoir)\s*!*$",
            r"^(hola|buenos días|buenas tardes|buenas noches)\s*!*$",
            r"^(hallo|guten tag|guten morgen|guten abend)\s*!*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid greeting regex"))
        .collect()
    })
}

/// Fixed localized reply for bare greetings; `None` when the query is not a
/// greeting. The orchestrator returns this without touching retrieval.
pub fn check_greetings(query: &str) -> Option<&'static str> {
    let query_lower = query.trim().to_lowercase();

    let is_greeting = greeting_regexes().iter().any(|re| re.is_match(&query_lower));
    if is_greeting {
        debug!("greeting short-circuit");
        if ["ciao", "salve", "buongiorno", "buonasera"]
            .iter()
            .any(|w| query_lower.contains(w))
        {
            return Some("Ciao! Come posso aiutarti oggi?");
        }
        if ["привіт", "вітаю", "добрий"].iter().any(|w| query_lower.contains(w)) {
            return Some("Привіт! Чим можу допомогти?");
        }
        if ["привет", "здравствуй", "добрый", "доброе"]
            .iter()
            .any(|w| query_lower.contains(w))
        {
            return Some("Привет! Чем могу помочь?");
        }
        if ["bonjour", "salut", "bonsoir"].iter().any(|w| query_lower.contains(w)) {
            return Some("Bonjour! Comment puis-je vous aider?");
        }
        if ["hola", "buenos", "buenas"].iter().any(|w| query_lower.contains(w)) {
            return Some("¡Hola! ¿En qué puedo ayudarte?");
        }
        if ["hallo", "guten"].iter().any(|w| query_lower.contains(w)) {
            return Some("Hallo! Wie kann ich dir helfen?");
        }
        return Some("Hello! How can I help you today?");
    }

    None
}

/// Business keywords that always require the full pipeline, across the
/// supported languages.
const BUSINESS_KEYWORDS: &[&str] = &[
    "visa", "kitas", "kitap", "voa", "pt pma", "pt local", "pma", "kbli", "tax", "pajak",
    "pph", "ppn", "company", "business", "legal", "law", "regulation", "permit", "license",
    "contract", "notaris", "bank", "investment", "investor", "capital", "modal", "hukum",
    "peraturan", "undang", "izin", "akta", "npwp", "siup", "tdp", "nib", "oss",
    "immigration", "imigrasi", "sponsor", "rptka", "imta", "tenaga kerja", "how much",
    "quanto costa", "berapa", "pricing", "price", "harga", "deadline", "expire", "renewal",
    "extension", "perpanjang", "ceo", "founder", "team", "tim", "anggota", "member",
    "staff", "chi è", "who is", "siapa", "direttore", "director", "manager", "bali zero",
    // Chinese
    "公司", "签证", "税", "投资", "法律", "注册", "许可", "办签证", "多少钱", "费用", "价格",
    // Arabic
    "شركة", "تأشيرة", "ضريبة", "استثمار", "قانون", "عمل",
    // Russian/Ukrainian
    "компания", "виза", "налог", "инвестиция", "бизнес", "закон",
];

fn casual_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(ristorante|restaurant|makan|mangiare|food|cibo|warung|cafe|dinner|lunch|breakfast|colazione|pranzo|cena)",
            r"(ресторан|їжа|кафе|обід|вечеря|сніданок)",
            r"(ресторан|еда|кафе|обед|ужин|завтрак)",
            r"(music|musica|lagu|song|cantante|singer|band|concert|spotify|playlist)",
            r"(музика|пісня|концерт|співак)",
            r"(музыка|песня|концерт|певец)",
            r"(weather|cuaca|meteo|beach|pantai|spiaggia|surf|sunset|sunrise)",
            r"(погода|пляж|закат|рассвет)",
            r"(come stai|how are you|apa kabar|gimana kabar|cosa fai|what do you do|che fai)",
            r"(як справи|як ти|що робиш)",
            r"(как дела|как ты|что делаешь)",
            r"(comment ça va|ça va)",
            r"(cómo estás|como estas|qué tal|que tal)",
            r"(wie geht's|wie geht es dir|was machst du)",
            r"(preferisci|prefer|suka|favorite|favorito|best|migliore|consiglia|recommend)",
            r"(hobby|hobi|sport|olahraga|travel|viaggio|movie|film|book|buku|libro)",
            r"(raccontami|tell me about yourself|parlami di te|cosa ti piace)",
            r"(che musica|what music|che tipo di|what kind of)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid casual regex"))
        .collect()
    })
}

/// Heuristic: casual/lifestyle queries skip tool use entirely.
///
/// Business keywords veto first. Non-Latin scripts are never judged by
/// length (they pack more meaning per char), so they take the full
/// pipeline unless a casual pattern matches.
pub fn check_casual_conversation(query: &str) -> bool {
    let query_lower = query.trim().to_lowercase();

    for keyword in BUSINESS_KEYWORDS {
        if query_lower.contains(keyword) {
            return false;
        }
    }

    if casual_regexes().iter().any(|re| re.is_match(&query_lower)) {
        return true;
    }

    let has_non_latin = query.chars().any(|c| {
        ('\u{4e00}'..='\u{9fff}').contains(&c)
            || ('\u{0600}'..='\u{06ff}').contains(&c)
            || ('\u{0400}'..='\u{04ff}').contains(&c)
    });
    if has_non_latin {
        debug!("non-latin script without business keywords, taking full pipeline");
        return false;
    }

    // Short Latin queries without business keywords are casual.
    query_lower.chars().count() < 60
}

fn identity_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"^(chi|who|cosa|what)\s+(sei|are)\s*(you|tu)?\??$",
            r"^(chi|who)\s+(è|is)\s+(zantara)\??$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid identity regex"))
        .collect()
    })
}

fn company_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"^(cosa|what)\s+(fa|does)\s+(bali\s*zero|balizero)(\s+do)?\??$",
            r"^(parlami|tell\s+me)\s+(di|about)\s+(bali\s*zero|balizero)\??$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid company regex"))
        .collect()
    })
}

/// Hardcoded answers for identity and company questions; avoids a model
/// round trip and keeps brand messaging uniform.
pub fn check_identity_questions(query: &str) -> Option<&'static str> {
    let query_lower = query.trim().to_lowercase();

    if identity_regexes().iter().any(|re| re.is_match(&query_lower)) {
        return Some(
            "Sono Zantara, l'assistente AI di Bali Zero. \
             Ti aiuto con visa, business, investimenti e questioni legali in Indonesia. \
             Come posso esserti utile oggi?",
        );
    }

    if company_regexes().iter().any(|re| re.is_match(&query_lower)) {
        return Some(
            "Bali Zero è una consulenza specializzata in visa, KITAS, setup aziendale (PT PMA) \
             e questioni legali per stranieri in Indonesia. Offriamo servizi trasparenti, \
             veloci e affidabili per aiutarti a vivere e lavorare a Bali senza stress.",
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciao_returns_the_italian_greeting() {
        assert_eq!(check_greetings("ciao"), Some("Ciao! Come posso aiutarti oggi?"));
        assert_eq!(check_greetings("Ciao!"), Some("Ciao! Come posso aiutarti oggi?"));
    }

    #[test]
    fn multilingual_greetings_localize() {
        assert_eq!(check_greetings("hello"), Some("Hello! How can I help you today?"));
        assert_eq!(check_greetings("привет"), Some("Привет! Чем могу помочь?"));
        assert_eq!(check_greetings("bonjour"), Some("Bonjour! Comment puis-je vous aider?"));
        assert_eq!(check_greetings("hola"), Some("¡Hola! ¿En qué puedo ayudarte?"));
        assert_eq!(check_greetings("hallo"), Some("Hallo! Wie kann ich dir helfen?"));
    }

    #[test]
    fn business_questions_are_not_greetings() {
        assert!(check_greetings("What is KITAS?").is_none());
        assert!(check_greetings("hello, how much is a visa?").is_none());
    }

    #[test]
    fn business_keywords_veto_casual() {
        assert!(!check_casual_conversation("best restaurant for a visa run?"));
        assert!(!check_casual_conversation("berapa harga kitas?"));
    }

    #[test]
    fn lifestyle_chat_is_casual() {
        assert!(check_casual_conversation("any good restaurant in Canggu for dinner?"));
        assert!(check_casual_conversation("what music do you like?"));
    }

    #[test]
    fn short_latin_chat_is_casual() {
        assert!(check_casual_conversation("nice day today, right?"));
    }

    #[test]
    fn non_latin_without_keywords_takes_full_pipeline() {
        assert!(!check_casual_conversation("请告诉我关于巴厘岛的情况"));
    }

    #[test]
    fn identity_questions_get_hardcoded_answers() {
        assert!(check_identity_questions("chi sei?").unwrap().contains("Sono Zantara"));
        assert!(check_identity_questions("who are you").is_some());
        assert!(check_identity_questions("cosa fa bali zero?").unwrap().contains("Bali Zero"));
        assert!(check_identity_questions("What is KITAS?").is_none());
    }
}
