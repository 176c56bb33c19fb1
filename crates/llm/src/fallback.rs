//! Localized fallback messages for error scenarios.

pub fn get_fallback_message(message_type: &str, language: &str) -> &'static str {
    match (language, message_type) {
        ("it", "connection_error") => {
            "Mi scusi, ho riscontrato un problema di connessione. Provi tra qualche istante o contatti il supporto."
        }
        ("it", "service_unavailable") => {
            "Mi scusi, il servizio non è disponibile. Contatti il supporto."
        }
        ("it", "api_key_error") => {
            "Mi scusi, c'è un problema con la configurazione del servizio AI. Il team tecnico è stato notificato. Provi più tardi."
        }
        ("it", _) => "Mi scusi, ho riscontrato un problema. Provi più tardi.",
        ("id", "connection_error") => {
            "Maaf, kami mengalami masalah koneksi. Silakan coba lagi sebentar lagi atau hubungi dukungan."
        }
        ("id", "service_unavailable") => {
            "Maaf, layanan tidak tersedia saat ini. Silakan hubungi dukungan."
        }
        ("id", "api_key_error") => {
            "Maaf, ada masalah dengan konfigurasi layanan AI. Tim teknis telah diberitahu. Silakan coba lagi nanti."
        }
        ("id", _) => "Maaf, kami mengalami masalah. Silakan coba lagi nanti.",
        (_, "connection_error") => {
            "Sorry, we encountered a connection issue. Please try again in a moment or contact support."
        }
        (_, "service_unavailable") => {
            "Sorry, the service is currently unavailable. Please contact support."
        }
        (_, "api_key_error") => {
            "Sorry, there's an issue with the AI service configuration. The technical team has been notified. Please try again later."
        }
        _ => "Sorry, we encountered an issue. Please try again later.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_falls_back_to_english() {
        let message = get_fallback_message("connection_error", "fr");
        assert!(message.starts_with("Sorry"));
    }

    #[test]
    fn unknown_type_falls_back_to_generic() {
        assert_eq!(
            get_fallback_message("nonsense", "it"),
            "Mi scusi, ho riscontrato un problema. Provi più tardi."
        );
    }
}
