//! Phone number identity.
//!
//! Every join between calls, messages and contacts goes through
//! [`normalize`]. The result may be empty; empty keys still join.

use std::collections::BTreeSet;

/// Strip every character that is not an ASCII decimal digit.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Decides the `contact_saved` flag for a normalized number.
///
/// Matching is substring containment in either direction, so
/// `"15551234567"` matches a contact stored as `"5551234567"`. Short or
/// empty keys match broadly; an empty contact number matches every record.
#[derive(Debug, Clone, Default)]
pub struct ContactMatcher {
    numbers: BTreeSet<String>,
}

impl ContactMatcher {
    /// Build from already-normalized contact numbers.
    pub fn new<I>(numbers: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            numbers: numbers.into_iter().collect(),
        }
    }

    /// Build from raw contact numbers, normalizing each.
    pub fn from_raw<'a, I>(raw_numbers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::new(raw_numbers.into_iter().map(normalize))
    }

    pub fn is_saved(&self, normalized: &str) -> bool {
        self.numbers
            .iter()
            .any(|contact| normalized.contains(contact.as_str()) || contact.contains(normalized))
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_formatting() {
        assert_eq!(normalize("(555) 123-4567"), "5551234567");
        assert_eq!(normalize("+1 555.123.4567"), "15551234567");
        assert_eq!(normalize("5551234567"), "5551234567");
    }

    #[test]
    fn test_normalize_alphanumeric_sender_is_empty() {
        assert_eq!(normalize("BANK-ALERT"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_ignores_non_ascii_digits() {
        // Arabic-Indic digits are not decimal ASCII digits.
        assert_eq!(normalize("٥٥٥1"), "1");
    }

    #[test]
    fn test_matcher_substring_both_directions() {
        let matcher = ContactMatcher::from_raw(["555-123-4567"]);
        assert!(matcher.is_saved("5551234567"));
        assert!(matcher.is_saved("15551234567"));
        assert!(matcher.is_saved("1234567"));
        assert!(!matcher.is_saved("5559999999"));
    }

    #[test]
    fn test_matcher_empty_keys_match_broadly() {
        let matcher = ContactMatcher::from_raw(["5551234567"]);
        assert!(matcher.is_saved(""));

        let empty_contact = ContactMatcher::from_raw(["unknown"]);
        assert!(empty_contact.is_saved("5559999999"));
    }

    #[test]
    fn test_matcher_without_contacts_never_matches() {
        let matcher = ContactMatcher::default();
        assert!(matcher.is_empty());
        assert!(!matcher.is_saved(""));
        assert!(!matcher.is_saved("5551234567"));
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(raw in ".*") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn prop_normalize_yields_only_digits(raw in ".*") {
            prop_assert!(normalize(&raw).chars().all(|c| c.is_ascii_digit()));
        }
    }
}
