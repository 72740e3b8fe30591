//! PII redaction applied to content before it leaves the process.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Patterns in application order. IBANs go before cards, cards before phones,
/// so a longer match is never split by a shorter pattern.
static PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}", "[EMAIL]"),
        (
            r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,3})?\b",
            "[IBAN]",
        ),
        (r"\b(?:\d[ -]?){12,18}\d\b", "[CARD]"),
        (
            r"(?:\+|\b00)\d{1,3}[\s.-]?\(?\d{1,4}\)?(?:[\s.-]?\d{2,4}){2,4}\b",
            "[PHONE]",
        ),
        (r"\b0\d{1,4}[\s./-]?\d{3,4}[\s.-]?\d{3,4}\b", "[PHONE]"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, label)))
    .collect()
});

/// Replace emails, IBANs, card numbers and phone numbers with placeholders.
pub fn redact_pii(text: &str) -> String {
    PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (re, label)| {
            re.replace_all(&acc, *label).into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(PATTERNS.len(), 5);
    }

    #[test]
    fn test_redacts_email() {
        assert_eq!(
            redact_pii("Contact jane.doe+promo@example.co.uk today"),
            "Contact [EMAIL] today"
        );
    }

    #[test]
    fn test_redacts_iban_and_card() {
        assert_eq!(
            redact_pii("Pay to DE89 3704 0044 0532 0130 00 now"),
            "Pay to [IBAN] now"
        );
        assert_eq!(
            redact_pii("Card 4111 1111 1111 1111 accepted"),
            "Card [CARD] accepted"
        );
    }

    #[test]
    fn test_redacts_phone_numbers() {
        assert_eq!(redact_pii("Call +44 20 7946 0958."), "Call [PHONE].");
        assert_eq!(redact_pii("Hotline 030 1234567"), "Hotline [PHONE]");
    }

    #[test]
    fn test_leaves_ordinary_text_alone() {
        let text = "Earn 12% interest in 2025 on balances up to 10000 EUR.";
        assert_eq!(redact_pii(text), text);
    }
}
