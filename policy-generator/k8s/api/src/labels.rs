use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

/// Selects pods whose labels include every key/value pair of the selector.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Selector {
    match_labels: Option<Map>,
}

// === Selector ===

impl Selector {
    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
        }
    }

    /// Returns true when the selector constrains nothing.
    pub fn is_empty(&self) -> bool {
        self.match_labels.as_ref().map_or(true, Map::is_empty)
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.0.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }
}

// === Labels ===

impl Labels {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_map(&self) -> Map {
        self.0.as_ref().clone()
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<Map>::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_map(pairs: &[(&str, &str)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn mk_selector(pairs: &[(&str, &str)]) -> Selector {
        Selector::from_map(mk_map(pairs))
    }

    fn mk_labels(pairs: &[(&str, &str)]) -> Labels {
        mk_map(pairs).into()
    }

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                mk_selector(&[("app", "db")]),
                mk_labels(&[("app", "db")]),
                true,
                "exact label match",
            ),
            (
                mk_selector(&[("app", "db")]),
                mk_labels(&[("app", "db"), ("pod-template-hash", "abc")]),
                true,
                "sufficient label match",
            ),
            (
                mk_selector(&[("app", "db"), ("tier", "backend")]),
                mk_labels(&[("app", "db")]),
                false,
                "missing label",
            ),
            (
                mk_selector(&[("app", "db")]),
                mk_labels(&[("app", "web")]),
                false,
                "mismatched value",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn empty_selectors() {
        assert!(Selector::default().is_empty());
        assert!(Selector::from_map(Map::new()).is_empty());
        assert!(!mk_selector(&[("app", "db")]).is_empty());
    }

    #[test]
    fn null_labels_deserialize_empty() {
        let labels: Labels = serde_json::from_str("null").unwrap();
        assert!(labels.is_empty());
        let labels: Labels = serde_json::from_str(r#"{"app":"web"}"#).unwrap();
        assert_eq!(labels, mk_labels(&[("app", "web")]));
    }
}
