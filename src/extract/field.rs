//! Field extraction contracts

use super::selector::PageQuery;
use super::text::clean_text;
use regex::Regex;

/// Declarative description of how to extract one output field
///
/// Selectors are tried in order; the first one that yields non-empty text
/// after post-processing wins.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub selectors: Vec<String>,
    pub required: bool,
    /// Join every match of a selector instead of taking the first non-empty one
    pub multiple: bool,
    /// Removed from the raw text before cleaning
    pub strip_patterns: Vec<Regex>,
}

impl FieldSpec {
    /// Creates a single-valued field with no strip patterns
    pub fn new(name: impl Into<String>, selectors: Vec<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            selectors,
            required,
            multiple: false,
            strip_patterns: Vec::new(),
        }
    }

    fn post_process(&self, raw: &str) -> String {
        if self.strip_patterns.is_empty() {
            return clean_text(raw);
        }
        let mut text = raw.to_string();
        for pattern in &self.strip_patterns {
            text = pattern.replace_all(&text, " ").into_owned();
        }
        clean_text(&text)
    }

    /// Resolves this field against a parsed page
    ///
    /// Returns `None` when no selector produced non-empty text.
    pub fn resolve(&self, page: &dyn PageQuery) -> Option<String> {
        for expr in &self.selectors {
            let matches = page.query(expr);

            if self.multiple {
                let value = self.post_process(&matches.join("\n"));
                if !value.is_empty() {
                    return Some(value);
                }
                continue;
            }

            let found = matches
                .iter()
                .map(|raw| self.post_process(raw))
                .find(|value| !value.is_empty());
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakePage(HashMap<&'static str, Vec<&'static str>>);

    impl PageQuery for FakePage {
        fn query(&self, expr: &str) -> Vec<String> {
            self.0
                .get(expr)
                .map(|v| v.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default()
        }
    }

    fn page(entries: &[(&'static str, Vec<&'static str>)]) -> FakePage {
        FakePage(entries.iter().cloned().collect())
    }

    #[test]
    fn test_fallback_order() {
        let spec = FieldSpec::new("title", vec!["h1".into(), "h2".into()], true);
        let p = page(&[("h1", vec!["  "]), ("h2", vec!["Second"])]);
        assert_eq!(spec.resolve(&p), Some("Second".to_string()));
    }

    #[test]
    fn test_first_selector_wins() {
        let spec = FieldSpec::new("title", vec!["h1".into(), "h2".into()], true);
        let p = page(&[("h1", vec!["First"]), ("h2", vec!["Second"])]);
        assert_eq!(spec.resolve(&p), Some("First".to_string()));
    }

    #[test]
    fn test_skips_empty_matches_within_selector() {
        let spec = FieldSpec::new("lead", vec!["p".into()], false);
        let p = page(&[("p", vec!["\u{200F} ", "Text"])]);
        assert_eq!(spec.resolve(&p), Some("Text".to_string()));
    }

    #[test]
    fn test_nothing_found() {
        let spec = FieldSpec::new("title", vec!["h1".into()], true);
        assert_eq!(spec.resolve(&page(&[])), None);
    }

    #[test]
    fn test_multiple_joins_matches() {
        let mut spec = FieldSpec::new("body", vec!["p".into()], true);
        spec.multiple = true;
        let p = page(&[("p", vec!["one ", "", " two"])]);
        assert_eq!(spec.resolve(&p), Some("one two".to_string()));
    }

    #[test]
    fn test_strip_patterns() {
        let mut spec = FieldSpec::new("body", vec!["div".into()], true);
        spec.strip_patterns = vec![Regex::new(r"var .*?\}\);").unwrap()];
        let p = page(&[("div", vec!["Story var x = f({error: 1}); continues"])]);
        assert_eq!(spec.resolve(&p), Some("Story continues".to_string()));
    }
}
