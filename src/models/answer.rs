use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::message::Message;

/// 1-based citation index to provenance identifier, in first-appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sources(pub BTreeMap<usize, String>);

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(&index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0.iter().map(|(i, s)| (*i, s.as_str()))
    }
}

/// A bot response paired with the sources it cites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub message: Message,
    pub sources: Sources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_serialize_with_string_keys() {
        let mut map = BTreeMap::new();
        map.insert(1, "a.txt".to_string());
        map.insert(2, "https://example.com/b".to_string());
        let json = serde_json::to_string(&Sources(map)).unwrap();
        assert_eq!(json, r#"{"1":"a.txt","2":"https://example.com/b"}"#);
    }
}
