//! Official service price list. Single source of truth for price answers:
//! the model is instructed to quote these figures verbatim, never its own.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy)]
struct PriceEntry {
    service_type: &'static str,
    name: &'static str,
    price_idr: u64,
    notes: &'static str,
}

const PRICE_LIST: &[PriceEntry] = &[
    PriceEntry {
        service_type: "visa",
        name: "C1 Tourism Visa (single entry, 60 days)",
        price_idr: 2_300_000,
        notes: "extendable twice by 60 days",
    },
    PriceEntry {
        service_type: "visa",
        name: "C2 Business Visa (single entry, 60 days)",
        price_idr: 3_000_000,
        notes: "meetings and site visits only, no employment",
    },
    PriceEntry {
        service_type: "visa",
        name: "D2 Multiple-Entry Business Visa (1 year)",
        price_idr: 6_500_000,
        notes: "60 days per entry",
    },
    PriceEntry {
        service_type: "kitas",
        name: "E33G Digital Nomad KITAS (1 year)",
        price_idr: 12_500_000,
        notes: "requires proof of remote income",
    },
    PriceEntry {
        service_type: "kitas",
        name: "E28A Investor KITAS (2 years)",
        price_idr: 17_000_000,
        notes: "requires shares in a PT PMA",
    },
    PriceEntry {
        service_type: "kitas",
        name: "E31A Spouse KITAS (1 year)",
        price_idr: 11_000_000,
        notes: "sponsored by Indonesian spouse",
    },
    PriceEntry {
        service_type: "business_setup",
        name: "PT PMA Company Setup",
        price_idr: 20_000_000,
        notes: "deed, ministry approval, NIB via OSS",
    },
    PriceEntry {
        service_type: "business_setup",
        name: "PT PMA + Investor KITAS bundle",
        price_idr: 33_000_000,
        notes: "company setup plus one investor permit",
    },
    PriceEntry {
        service_type: "tax_consulting",
        name: "Monthly Tax Compliance (PPh + PPN reporting)",
        price_idr: 1_500_000,
        notes: "per month, up to 50 transactions",
    },
    PriceEntry {
        service_type: "tax_consulting",
        name: "Annual Tax Return (SPT Tahunan, corporate)",
        price_idr: 5_000_000,
        notes: "includes fiscal reconciliation",
    },
    PriceEntry {
        service_type: "legal",
        name: "Legal Review (contracts, lease agreements)",
        price_idr: 3_500_000,
        notes: "per document, Indonesian and English",
    },
];

/// Format an IDR amount with thousands separators: `Rp 12,500,000`.
pub fn format_idr(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    out.push_str("Rp ");
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct PricingService;

impl PricingService {
    /// Official prices for one service type, or the whole list for "all".
    pub fn get_pricing(&self, service_type: &str) -> String {
        let entries: Vec<&PriceEntry> = PRICE_LIST
            .iter()
            .filter(|e| service_type == "all" || e.service_type == service_type)
            .collect();

        if entries.is_empty() {
            return format!(
                "No official pricing found for service type '{service_type}'. \
                 Available types: visa, kitas, business_setup, tax_consulting, legal, all."
            );
        }
        Self::render(&entries)
    }

    /// Keyword search across names and notes.
    pub fn search_service(&self, query: &str) -> String {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        let entries: Vec<&PriceEntry> = PRICE_LIST
            .iter()
            .filter(|e| {
                let haystack = format!("{} {}", e.name, e.notes).to_lowercase();
                terms.iter().any(|t| haystack.contains(t))
            })
            .collect();

        if entries.is_empty() {
            return format!("No official pricing matched '{query}'.");
        }
        Self::render(&entries)
    }

    fn render(entries: &[&PriceEntry]) -> String {
        let mut out = String::from("OFFICIAL BALI ZERO PRICES:\n");
        for entry in entries {
            let _ = writeln!(
                out,
                "- {}: {} ({})",
                entry.name,
                format_idr(entry.price_idr),
                entry.notes
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idr_formatting_inserts_separators() {
        assert_eq!(format_idr(0), "Rp 0");
        assert_eq!(format_idr(500), "Rp 500");
        assert_eq!(format_idr(12_500_000), "Rp 12,500,000");
        assert_eq!(format_idr(1_500_000), "Rp 1,500,000");
        assert_eq!(format_idr(100), "Rp 100");
        assert_eq!(format_idr(1_000), "Rp 1,000");
    }

    #[test]
    fn kitas_pricing_lists_only_kitas() {
        let out = PricingService.get_pricing("kitas");
        assert!(out.contains("E33G"));
        assert!(out.contains("Rp 12,500,000"));
        assert!(!out.contains("PT PMA Company Setup"));
    }

    #[test]
    fn all_pricing_lists_everything() {
        let out = PricingService.get_pricing("all");
        assert!(out.contains("E33G"));
        assert!(out.contains("PT PMA Company Setup"));
        assert!(out.contains("Legal Review"));
    }

    #[test]
    fn unknown_service_type_names_the_valid_ones() {
        let out = PricingService.get_pricing("yachts");
        assert!(out.contains("Available types"));
    }

    #[test]
    fn search_matches_keywords() {
        let out = PricingService.search_service("investor kitas");
        assert!(out.contains("E28A"));
    }

    #[test]
    fn search_without_match_reports_it() {
        let out = PricingService.search_service("zzzz");
        assert!(out.starts_with("No official pricing matched"));
    }
}
