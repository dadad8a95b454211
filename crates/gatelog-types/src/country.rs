use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Countries rejected by default.
pub const DEFAULT_FORBIDDEN_COUNTRIES: [&str; 9] = [
    "North Korea",
    "Iran",
    "Cuba",
    "Myanmar",
    "Iraq",
    "Libya",
    "Sudan",
    "Zimbabwe",
    "Syria",
];

/// Exact-match set of country labels that the file server refuses.
///
/// The label comes from a client-supplied header, so this is a gate, not an
/// authentication boundary. Matching trims surrounding whitespace and is
/// otherwise case- and spelling-sensitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryDenylist(BTreeSet<String>);

impl CountryDenylist {
    pub fn new<I, S>(countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(countries.into_iter().map(Into::into).collect())
    }

    /// Returns the trimmed label if it is denied.
    pub fn denied<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let country = raw.trim();
        self.0.contains(country).then_some(country)
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.denied(raw).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for CountryDenylist {
    fn default() -> Self {
        Self::new(DEFAULT_FORBIDDEN_COUNTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_nine_entries() {
        let list = CountryDenylist::default();
        assert_eq!(list.len(), 9);
        assert!(list.contains("North Korea"));
        assert!(list.contains("Syria"));
    }

    #[test]
    fn match_trims_whitespace_only() {
        let list = CountryDenylist::default();
        assert_eq!(list.denied("  Iran \t"), Some("Iran"));
        assert!(!list.contains("iran"));
        assert!(!list.contains("IRAN"));
        assert!(!list.contains("North  Korea"));
    }

    #[test]
    fn empty_header_is_allowed() {
        let list = CountryDenylist::default();
        assert!(!list.contains(""));
        assert!(!list.contains("   "));
    }

    #[test]
    fn custom_list_replaces_default() {
        let list = CountryDenylist::new(["Atlantis"]);
        assert!(list.contains("Atlantis"));
        assert!(!list.contains("Iran"));
    }

    #[test]
    fn serializes_as_plain_list() {
        let list = CountryDenylist::new(["B", "A"]);
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"["A","B"]"#);
        let parsed: CountryDenylist = serde_json::from_str(r#"["Cuba"]"#).unwrap();
        assert!(parsed.contains("Cuba"));
    }
}
