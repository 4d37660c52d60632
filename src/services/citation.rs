//! Rewrites `[[identifier]]` provenance markers into numbered references.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::Sources;

// Stray brackets around a marker are consumed with it so `[n]` never ends up
// inside a new `[[...]]`.
static RE_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[*\[\[([^\[\]]+)\]\]\]*").unwrap());

/// Answer text with markers replaced, plus the index → identifier map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitedText {
    pub text: String,
    pub sources: Sources,
}

/// Number distinct identifiers by first appearance and replace each marker
/// with `[n]`. Running it on its own output changes nothing.
pub fn extract_citations(text: &str) -> CitedText {
    let mut indices: HashMap<String, usize> = HashMap::new();
    let mut sources = BTreeMap::new();

    let rewritten = RE_CITATION.replace_all(text, |caps: &Captures| {
        let identifier = caps[1].trim().to_string();
        let next = indices.len() + 1;
        let index = *indices.entry(identifier.clone()).or_insert_with(|| {
            sources.insert(next, identifier);
            next
        });
        format!("[{}]", index)
    });

    CitedText {
        text: rewritten.into_owned(),
        sources: Sources(sources),
    }
}

/// Remove markers entirely; used for the copy persisted to history.
pub fn strip_citations(text: &str) -> String {
    RE_CITATION.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_first_appearance() {
        let cited = extract_citations("Paris [[a]] is big [[b]] and old [[a]].");
        assert_eq!(cited.text, "Paris [1] is big [2] and old [1].");
        assert_eq!(cited.sources.get(1), Some("a"));
        assert_eq!(cited.sources.get(2), Some("b"));
        assert_eq!(cited.sources.len(), 2);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let once = extract_citations("See [[docs/A.txt]] and [[https://example.com/b]].");
        let twice = extract_citations(&once.text);
        assert_eq!(twice.text, once.text);
        assert!(twice.sources.is_empty());
    }

    #[test]
    fn test_nested_brackets_collapse_to_one_reference() {
        let once = extract_citations("See [[[a]]] here and [[[[b]]]].");
        assert_eq!(once.text, "See [1] here and [2].");
        assert_eq!(once.sources.get(1), Some("a"));
        assert_eq!(once.sources.get(2), Some("b"));

        let twice = extract_citations(&once.text);
        assert_eq!(twice.text, once.text);
        assert!(twice.sources.is_empty());
    }

    #[test]
    fn test_adjacent_markers() {
        let once = extract_citations("Both agree[[a]][[b]]]. Again [[[a]][[c]].");
        assert_eq!(once.text, "Both agree[1][2]. Again [1][3].");
        assert_eq!(once.sources.len(), 3);
        assert_eq!(extract_citations(&once.text).text, once.text);
    }

    #[test]
    fn test_text_without_markers() {
        let cited = extract_citations("No sources here [1].");
        assert_eq!(cited.text, "No sources here [1].");
        assert!(cited.sources.is_empty());
    }

    #[test]
    fn test_sources_serialize_sequential_keys() {
        let cited = extract_citations("[[x]] [[y]] [[z]] [[y]]");
        let json = serde_json::to_string(&cited.sources).unwrap();
        assert_eq!(json, r#"{"1":"x","2":"y","3":"z"}"#);
    }

    #[test]
    fn test_strip_citations() {
        assert_eq!(
            strip_citations("Paris is the capital[[A.txt]]."),
            "Paris is the capital."
        );
    }
}
