//! Probe data models

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A proxy address to be tested, in `host:port` form
///
/// The address is kept opaque: it is only checked for being non-empty.
/// Malformed entries fail to connect and get discarded by the prober.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyCandidate(String);

impl ProxyCandidate {
    /// Create a candidate from a raw line, trimming surrounding whitespace
    pub fn new(address: &str) -> Option<Self> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        Some(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the proxy URL string used to route plain HTTP through it
    pub fn url(&self) -> String {
        format!("http://{}", self.0)
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single (name, value) header pair as observed by the echo oracle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered headers of one request, sorted by name then value.
///
/// Serializes as a JSON array of `[name, value]` arrays, which is the
/// oracle's wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, String)>", into = "Vec<(String, String)>")]
pub struct HeaderSet {
    entries: Vec<HeaderEntry>,
}

impl HeaderSet {
    /// Build a sorted header set from raw pairs
    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut entries: Vec<HeaderEntry> = pairs
            .into_iter()
            .map(|(name, value)| HeaderEntry::new(name, value))
            .collect();
        entries.sort();
        Self { entries }
    }

    /// Decode the oracle's JSON payload
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// Render as the oracle's JSON payload, without the trailing newline
    pub fn to_json(&self) -> String {
        // A list of string pairs always serializes.
        serde_json::to_string(&self.pairs()).unwrap_or_else(|_| String::from("[]"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct header names
    pub fn distinct_names(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.name.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Whether every header name appears exactly once
    ///
    /// A payload where the distinct name count differs from the value count
    /// cannot be mapped name-to-value and is rejected by the prober.
    pub fn is_well_formed(&self) -> bool {
        self.distinct_names() == self.entries.len()
    }

    /// Copy of this set without the named header (case-insensitive)
    pub fn without(&self, name: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| !e.name.eq_ignore_ascii_case(name))
                .cloned()
                .collect(),
        }
    }

    fn pairs(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_str()))
            .collect()
    }
}

impl From<Vec<(String, String)>> for HeaderSet {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::from_pairs(pairs)
    }
}

impl From<HeaderSet> for Vec<(String, String)> {
    fn from(set: HeaderSet) -> Self {
        set.entries.into_iter().map(|e| (e.name, e.value)).collect()
    }
}

impl fmt::Display for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// How much a proxy relays about the originating client.
///
/// Variants are ordered from most to least leaky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnonymityLevel {
    /// Forwards the client's real address
    Transparent,
    /// Hides the address but announces itself as a proxy
    Anonymous,
    /// No identifying artifact found
    Elite,
}

impl AnonymityLevel {
    pub const ALL: [AnonymityLevel; 3] = [
        AnonymityLevel::Transparent,
        AnonymityLevel::Anonymous,
        AnonymityLevel::Elite,
    ];
}

impl fmt::Display for AnonymityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnonymityLevel::Transparent => write!(f, "Transparent"),
            AnonymityLevel::Anonymous => write!(f, "Anonymous"),
            AnonymityLevel::Elite => write!(f, "Elite"),
        }
    }
}

impl FromStr for AnonymityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transparent" => Ok(AnonymityLevel::Transparent),
            "anonymous" => Ok(AnonymityLevel::Anonymous),
            "elite" => Ok(AnonymityLevel::Elite),
            _ => Err(anyhow::anyhow!("Invalid anonymity level: {}", s)),
        }
    }
}

/// Outcome of a fully successful probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub proxy: ProxyCandidate,
    pub level: AnonymityLevel,
    pub elapsed_secs: f64,
    pub headers: HeaderSet,
}

impl ProbeResult {
    pub fn new(
        proxy: ProxyCandidate,
        level: AnonymityLevel,
        elapsed_secs: f64,
        headers: HeaderSet,
    ) -> Self {
        Self {
            proxy,
            level,
            elapsed_secs,
            headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_trims_and_rejects_empty() {
        let candidate = ProxyCandidate::new("  10.0.0.1:3128 \t").unwrap();
        assert_eq!(candidate.as_str(), "10.0.0.1:3128");
        assert_eq!(candidate.url(), "http://10.0.0.1:3128");
        assert!(ProxyCandidate::new("").is_none());
        assert!(ProxyCandidate::new("   ").is_none());
    }

    #[test]
    fn test_candidate_is_opaque() {
        let candidate = ProxyCandidate::new("not a proxy").unwrap();
        assert_eq!(candidate.to_string(), "not a proxy");
    }

    #[test]
    fn test_header_set_is_sorted() {
        let set = HeaderSet::from_pairs(vec![
            ("via", "b"),
            ("accept", "*/*"),
            ("host", "example.com"),
        ]);
        let names: Vec<_> = set.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["accept", "host", "via"]);
    }

    #[test]
    fn test_header_set_wire_format() {
        let set = HeaderSet::from_pairs(vec![("User-Agent", "Proxy Tester"), ("Accept", "*/*")]);
        assert_eq!(
            set.to_json(),
            r#"[["Accept","*/*"],["User-Agent","Proxy Tester"]]"#
        );

        let decoded = HeaderSet::from_json(&format!("{}\n", set)).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn test_header_set_rejects_wrong_shape() {
        assert!(HeaderSet::from_json(r#"{"Accept":"*/*"}"#).is_err());
        assert!(HeaderSet::from_json(r#"[["Accept"]]"#).is_err());
        assert!(HeaderSet::from_json(r#"[["Accept","*/*","x"]]"#).is_err());
        assert!(HeaderSet::from_json("<html>blocked</html>").is_err());
        assert!(HeaderSet::from_json("[]").unwrap().is_empty());
    }

    #[test]
    fn test_header_set_well_formed() {
        let ok = HeaderSet::from_pairs(vec![("a", "1"), ("b", "2")]);
        assert!(ok.is_well_formed());
        assert_eq!(ok.distinct_names(), 2);

        let dup = HeaderSet::from_pairs(vec![("a", "1"), ("a", "2"), ("b", "3")]);
        assert!(!dup.is_well_formed());
        assert_eq!(dup.distinct_names(), 2);
        assert_eq!(dup.len(), 3);
    }

    #[test]
    fn test_header_set_without() {
        let set = HeaderSet::from_pairs(vec![("Host", "1.2.3.4:80"), ("accept", "*/*")]);
        let stripped = set.without("host");
        assert_eq!(stripped.len(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_anonymity_level_order_and_names() {
        assert!(AnonymityLevel::Transparent < AnonymityLevel::Anonymous);
        assert!(AnonymityLevel::Anonymous < AnonymityLevel::Elite);

        for level in AnonymityLevel::ALL {
            let parsed: AnonymityLevel = level.to_string().to_uppercase().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert!("invisible".parse::<AnonymityLevel>().is_err());
    }
}
