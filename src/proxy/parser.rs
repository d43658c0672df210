//! Candidate list parsing

use crate::proxy::models::ProxyCandidate;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Parser for candidate list files
pub struct CandidateParser;

impl CandidateParser {
    /// Parse a single candidate line
    ///
    /// Lines are trimmed; blank lines and `#` comments yield nothing. The
    /// remaining text is taken as-is, in `host:port` form.
    pub fn parse_line(line: &str) -> Option<ProxyCandidate> {
        let line = line.trim();
        if line.starts_with('#') {
            return None;
        }
        ProxyCandidate::new(line)
    }

    /// Parse candidates from a string (multiple lines)
    pub fn parse_string(content: &str) -> Vec<ProxyCandidate> {
        content.lines().filter_map(Self::parse_line).collect()
    }

    /// Parse candidates from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProxyCandidate>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read candidate list {:?}", path))?;
        Ok(Self::parse_string(&content))
    }
}
