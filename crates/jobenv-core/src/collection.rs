//! Ordered, merge-only variable collection.
//!
//! Precedence is expressed purely through insertion order: when several
//! entries share a key, the last one wins.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::VariableEntry;

// Matches `$KEY` and `${KEY}`
static REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VariableCollection {
    entries: Vec<VariableEntry>,
}

impl VariableCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry to the end.
    pub fn append(&mut self, entry: VariableEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Append every entry of `other`, in order.
    pub fn concat(&mut self, other: &VariableCollection) -> &mut Self {
        self.entries.extend(other.entries.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VariableEntry> {
        self.entries.iter()
    }

    /// The effective entry for `key`, i.e. its last occurrence.
    pub fn get(&self, key: &str) -> Option<&VariableEntry> {
        self.entries.iter().rev().find(|e| e.key() == key)
    }

    /// Resolve to `key -> entry` with last occurrence winning.
    pub fn to_effective_map(&self) -> BTreeMap<String, VariableEntry> {
        let mut map = BTreeMap::new();
        for entry in &self.entries {
            map.insert(entry.key().to_string(), entry.clone());
        }
        map
    }

    /// Plain `key -> value` view of the effective map.
    pub fn to_env_map(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.key().to_string(), e.value().to_string()))
            .collect()
    }

    /// Substitute `$KEY` / `${KEY}` references in every non-raw entry using
    /// the effective map. Single pass; unknown references are kept verbatim.
    pub fn expand(&self) -> VariableCollection {
        let effective = self.to_env_map();
        self.entries
            .iter()
            .map(|entry| {
                if entry.is_raw() || !entry.value().contains('$') {
                    entry.clone()
                } else {
                    entry.with_value(expand_value(entry.value(), &effective))
                }
            })
            .collect()
    }
}

/// Substitute references in a single value.
pub fn expand_value(input: &str, variables: &HashMap<String, String>) -> String {
    REFERENCE_REGEX
        .replace_all(input, |caps: &regex::Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            variables
                .get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

impl FromIterator<VariableEntry> for VariableCollection {
    fn from_iter<I: IntoIterator<Item = VariableEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<VariableEntry> for VariableCollection {
    fn extend<I: IntoIterator<Item = VariableEntry>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl From<Vec<VariableEntry>> for VariableCollection {
    fn from(entries: Vec<VariableEntry>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for VariableCollection {
    type Item = VariableEntry;
    type IntoIter = std::vec::IntoIter<VariableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a VariableCollection {
    type Item = &'a VariableEntry;
    type IntoIter = std::slice::Iter<'a, VariableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(key: &str, value: &str) -> VariableEntry {
        VariableEntry::new(key, value).unwrap()
    }

    #[test]
    fn test_last_occurrence_wins() {
        let mut vars = VariableCollection::new();
        vars.append(entry("A", "1"))
            .append(entry("B", "2"))
            .append(entry("A", "3"));

        let map = vars.to_effective_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["A"].value(), "3");
        assert_eq!(vars.get("A").unwrap().value(), "3");
        assert_eq!(vars.to_env_map()["A"], "3");
    }

    #[test]
    fn test_concat_preserves_order_and_source() {
        let mut a: VariableCollection = vec![entry("X", "a")].into();
        let b: VariableCollection = vec![entry("Y", "b"), entry("X", "b")].into();

        a.concat(&b);

        let keys: Vec<_> = a.iter().map(|e| e.key()).collect();
        assert_eq!(keys, vec!["X", "Y", "X"]);
        assert_eq!(b.len(), 2);
        assert_eq!(a.get("X").unwrap().value(), "b");
    }

    #[test]
    fn test_effective_map_keeps_winner_flags() {
        let vars: VariableCollection = vec![
            entry("TOKEN", "plain"),
            entry("TOKEN", "secret-value").masked(),
        ]
        .into();

        let map = vars.to_effective_map();
        assert!(map["TOKEN"].is_masked());
        assert!(!map["TOKEN"].is_public());
    }

    #[test]
    fn test_expand_references() {
        let vars: VariableCollection = vec![
            entry("HOST", "example.com"),
            entry("URL", "https://$HOST/${PATH_PART}"),
            entry("PATH_PART", "api"),
        ]
        .into();

        let expanded = vars.expand();
        assert_eq!(expanded.get("URL").unwrap().value(), "https://example.com/api");
    }

    #[test]
    fn test_expand_skips_raw_entries() {
        let vars: VariableCollection = vec![
            entry("HOST", "example.com"),
            entry("LITERAL", "$HOST").raw(),
        ]
        .into();

        let expanded = vars.expand();
        assert_eq!(expanded.get("LITERAL").unwrap().value(), "$HOST");
        assert!(expanded.get("LITERAL").unwrap().is_raw());
    }

    #[test]
    fn test_expand_keeps_unknown_references() {
        let vars: VariableCollection = vec![entry("GREETING", "hello ${WHO} and $OTHER")].into();
        let expanded = vars.expand();
        assert_eq!(
            expanded.get("GREETING").unwrap().value(),
            "hello ${WHO} and $OTHER"
        );
    }

    fn arb_entries() -> impl Strategy<Value = Vec<VariableEntry>> {
        prop::collection::vec(("[A-D]", "[a-z0-9]{0,4}"), 0..12).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(k, v)| VariableEntry::new(k, v).unwrap())
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_concat_then_resolve_is_last_wins(a in arb_entries(), b in arb_entries()) {
            let mut merged = VariableCollection::from(a.clone());
            merged.concat(&VariableCollection::from(b.clone()));

            let mut expected = BTreeMap::new();
            for e in a.iter().chain(b.iter()) {
                expected.insert(e.key().to_string(), e.value().to_string());
            }

            let actual: BTreeMap<_, _> = merged
                .to_effective_map()
                .into_iter()
                .map(|(k, e)| (k, e.value().to_string()))
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
