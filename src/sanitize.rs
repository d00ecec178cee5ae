//! Normalisation of free-text identifiers into storage path segments.

use std::collections::BTreeMap;

/// Segment used when nothing survives sanitisation.
pub const PLACEHOLDER: &str = "unnamed";

/// Sanitize a free-text key or filename for use as a single path segment.
///
/// Lower-cases, turns whitespace runs into `_` and drops anything that is not
/// an ASCII letter, digit, `-` or `_`.
pub fn sanitize_key(s: &str) -> String {
    let collapsed = s
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    let cleaned: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if cleaned.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        cleaned
    }
}

/// Storage folder for a form key.
///
/// Variant spellings listed in `aliases` fold into their canonical folder.
/// Alias keys and values are compared in sanitized form.
pub fn form_bucket(form_key: &str, aliases: &BTreeMap<String, String>) -> String {
    let key = sanitize_key(form_key);
    aliases
        .iter()
        .find(|(alias, _)| sanitize_key(alias) == key)
        .map(|(_, canonical)| sanitize_key(canonical))
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormsConfig;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("Date of Birth"), "date_of_birth");
        assert_eq!(sanitize_key("  many   spaces\there "), "many_spaces_here");
        assert_eq!(sanitize_key("passport (scan).v2"), "passport_scanv2");
        assert_eq!(sanitize_key("keep-dash_and_underscore"), "keep-dash_and_underscore");
    }

    #[test]
    fn test_empty_yields_placeholder() {
        assert_eq!(sanitize_key(""), PLACEHOLDER);
        assert_eq!(sanitize_key("   "), PLACEHOLDER);
        assert_eq!(sanitize_key("@#$%"), PLACEHOLDER);
        assert_eq!(sanitize_key("日本語"), PLACEHOLDER);
    }

    #[test]
    fn test_boarding_variants_share_a_bucket() {
        let forms = FormsConfig::default();
        let canonical = form_bucket("boarding_home", &forms.aliases);
        assert_eq!(canonical, "boarding_home");
        assert_eq!(form_bucket(" Boarding Tab ", &forms.aliases), canonical);
        assert_eq!(form_bucket("BOARDING", &forms.aliases), canonical);
        assert_eq!(form_bucket("Boarding-Home", &forms.aliases), canonical);
    }

    #[test]
    fn test_unknown_form_uses_sanitized_key() {
        let forms = FormsConfig::default();
        assert_eq!(form_bucket("Medical Intake", &forms.aliases), "medical_intake");
    }
}
