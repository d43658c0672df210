//! Anonymity classification of echoed request headers

use crate::proxy::models::{AnonymityLevel, HeaderSet};
use once_cell::sync::Lazy;
use regex::Regex;

/// Header names that mark an intermediary announcing itself
static INTERMEDIARY_HEADER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)forward|via|proxy").expect("Invalid intermediary header regex")
});

/// Classify a proxy from the headers the oracle received through it.
///
/// `wan_ip` and `port` are the oracle's externally visible address. Rules are
/// applied in order:
/// 1. some header value equals `wan_ip:port` (ignoring case): `Transparent`
/// 2. some header name contains `forward`, `via` or `proxy`: `Anonymous`
/// 3. otherwise `Elite`
pub fn classify(headers: &HeaderSet, wan_ip: &str, port: u16) -> AnonymityLevel {
    let origin = format!("{}:{}", wan_ip, port);

    if headers
        .iter()
        .any(|h| h.value.eq_ignore_ascii_case(&origin))
    {
        return AnonymityLevel::Transparent;
    }

    if headers
        .iter()
        .any(|h| INTERMEDIARY_HEADER_REGEX.is_match(&h.name))
    {
        return AnonymityLevel::Anonymous;
    }

    AnonymityLevel::Elite
}
