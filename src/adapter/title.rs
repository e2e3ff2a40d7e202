//! Title cleanup rules compiled from site configuration.
//!
//! Raw titles scraped from list pages carry boilerplate prefixes/suffixes
//! and irregular whitespace. [`TitleRules`] applies the configured cleanup
//! deterministically: the same input always yields the same output, and
//! sanitizing an already-sanitized title is a no-op.

use regex::Regex;

use crate::config::{ConfigError, TitleProcessing};

/// Compiled title cleanup rules.
///
/// Cleanup never fails: malformed titles degrade to a best-effort cleaned
/// string rather than an error.
#[derive(Debug, Clone)]
pub struct TitleRules {
    /// Prefixes to strip, longest first.
    prefixes: Vec<String>,
    /// Suffixes to strip, longest first.
    suffixes: Vec<String>,
    /// Maximum length in characters.
    max_length: usize,
    /// Whitespace-collapse pattern.
    cleanup: Regex,
    /// Replacement for cleanup matches.
    replacement: String,
}

impl TitleRules {
    /// Compiles rules from a site's `title_processing` block.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Regex`] if the cleanup pattern does not
    /// compile.
    pub fn from_config(processing: &TitleProcessing) -> Result<Self, ConfigError> {
        let cleanup =
            Regex::new(&processing.cleanup_regex).map_err(|source| ConfigError::Regex {
                pattern: processing.cleanup_regex.clone(),
                source,
            })?;

        // Longest-first ordering makes overlapping rules deterministic:
        // "Должностная инструкция" wins over "Должностная". Empty rules
        // would match forever and are discarded.
        let mut prefixes: Vec<String> = processing
            .remove_prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));
        let mut suffixes: Vec<String> = processing
            .remove_suffixes
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        suffixes.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));

        Ok(Self {
            prefixes,
            suffixes,
            max_length: processing.max_length,
            cleanup,
            replacement: processing.replacement.clone(),
        })
    }

    /// Cleans a raw title: strips configured prefixes and suffixes (longest
    /// match first), collapses whitespace via the configured pattern,
    /// truncates to the maximum length, and trims.
    ///
    /// Idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
    #[must_use]
    pub fn sanitize(&self, raw: &str) -> String {
        let mut title = raw.trim().to_string();

        // Strip to a fixpoint so repeated boilerplate cannot survive one
        // pass and reappear on the next (keeps sanitize idempotent).
        let mut changed = true;
        while changed {
            changed = false;
            for prefix in &self.prefixes {
                if let Some(rest) = title.strip_prefix(prefix.as_str()) {
                    title = rest.trim_start().to_string();
                    changed = true;
                }
            }
            for suffix in &self.suffixes {
                if let Some(rest) = title.strip_suffix(suffix.as_str()) {
                    title = rest.trim_end().to_string();
                    changed = true;
                }
            }
        }

        title = self
            .cleanup
            .replace_all(&title, self.replacement.as_str())
            .into_owned();

        if title.chars().count() > self.max_length {
            title = title.chars().take(self.max_length).collect();
        }

        title.trim().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rules(prefixes: &[&str], suffixes: &[&str], max_length: usize) -> TitleRules {
        TitleRules::from_config(&TitleProcessing {
            remove_prefixes: prefixes.iter().map(ToString::to_string).collect(),
            remove_suffixes: suffixes.iter().map(ToString::to_string).collect(),
            max_length,
            ..TitleProcessing::default()
        })
        .unwrap()
    }

    #[test]
    fn test_sanitize_strips_configured_prefix_and_suffix() {
        let rules = rules(
            &["Должностная инструкция"],
            &["(Подготовлен для системы КонсультантПлюс)"],
            100,
        );

        let raw = "Должностная инструкция менеджера по продажам \
                   (Подготовлен для системы КонсультантПлюс)";
        assert_eq!(rules.sanitize(raw), "менеджера по продажам");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let rules = rules(
            &["Должностная инструкция"],
            &["(Подготовлен для системы КонсультантПлюс)"],
            100,
        );

        let raw = "Должностная  инструкция   бухгалтера \
                   (Подготовлен для системы КонсультантПлюс)";
        let once = rules.sanitize(raw);
        assert_eq!(rules.sanitize(&once), once);
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        let rules = rules(&[], &[], 100);
        assert_eq!(
            rules.sanitize("менеджера   по \t продажам"),
            "менеджера по продажам"
        );
    }

    #[test]
    fn test_sanitize_longest_prefix_wins() {
        let rules = rules(&["Инструкция", "Инструкция по охране труда"], &[], 100);
        assert_eq!(
            rules.sanitize("Инструкция по охране труда для электрика"),
            "для электрика"
        );
    }

    #[test]
    fn test_sanitize_truncates_to_max_length_in_chars() {
        let rules = rules(&[], &[], 10);
        // Multi-byte characters must be counted, not bytes; the trailing
        // space left by the cut is trimmed
        let result = rules.sanitize("менеджера по продажам");
        assert_eq!(result, "менеджера");
    }

    #[test]
    fn test_sanitize_handles_empty_and_whitespace_only() {
        let rules = rules(&["Prefix"], &[], 100);
        assert_eq!(rules.sanitize(""), "");
        assert_eq!(rules.sanitize("   \t  "), "");
    }

    #[test]
    fn test_sanitize_never_fails_on_malformed_titles() {
        let rules = rules(&["Prefix"], &["Suffix"], 5);
        // Prefix equal to the whole title degrades to empty
        assert_eq!(rules.sanitize("Prefix"), "");
        // Unmatched rules leave the title intact apart from truncation
        assert_eq!(rules.sanitize("abcdefgh"), "abcde");
    }
}
