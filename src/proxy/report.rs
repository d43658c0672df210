//! Result persistence

use crate::proxy::models::{AnonymityLevel, ProbeResult};
use crate::Result;
use anyhow::{anyhow, Context};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Header line of the CSV report
pub const CSV_HEADER: &str = "PROXY,LEVEL,TIME,HEADERS";

/// Output format for a result file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One row per proxy with level, time and headers
    #[default]
    Csv,
    /// One `host:port` per line
    Text,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Csv => write!(f, "csv"),
            ReportFormat::Text => write!(f, "txt"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "txt" | "text" => Ok(ReportFormat::Text),
            _ => Err(anyhow!("Invalid report format: {}. Use: csv, txt", s)),
        }
    }
}

/// Quote a CSV field when it needs it
fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render one result as a CSV row, without line terminator
pub fn csv_row(result: &ProbeResult) -> String {
    format!(
        "{},{},{:.1},{}",
        csv_field(result.proxy.as_str()),
        result.level,
        result.elapsed_secs,
        csv_field(&result.headers.to_json())
    )
}

/// Render results in the given format
pub fn render(results: &[ProbeResult], format: ReportFormat) -> String {
    match format {
        ReportFormat::Csv => {
            let mut out = String::from(CSV_HEADER);
            out.push('\n');
            for result in results {
                out.push_str(&csv_row(result));
                out.push('\n');
            }
            out
        }
        ReportFormat::Text => results
            .iter()
            .map(|r| format!("{}\n", r.proxy))
            .collect(),
    }
}

/// Save results to a file, replacing it
pub fn save_to_file<P: AsRef<Path>>(
    results: &[ProbeResult],
    path: P,
    format: ReportFormat,
) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, render(results, format))
        .with_context(|| format!("failed to write results to {:?}", path))?;
    Ok(())
}

/// Count results per anonymity level, most leaky first
pub fn level_counts(results: &[ProbeResult]) -> [(AnonymityLevel, usize); 3] {
    AnonymityLevel::ALL.map(|level| {
        let count = results.iter().filter(|r| r.level == level).count();
        (level, count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{HeaderSet, ProxyCandidate};

    fn result(proxy: &str, level: AnonymityLevel, elapsed: f64) -> ProbeResult {
        ProbeResult::new(
            ProxyCandidate::new(proxy).unwrap(),
            level,
            elapsed,
            HeaderSet::from_pairs(vec![("accept", "*/*"), ("via", "1.1 \"squid\"")]),
        )
    }

    #[test]
    fn test_csv_row() {
        let row = csv_row(&result("1.2.3.4:8080", AnonymityLevel::Anonymous, 0.4567));
        assert_eq!(
            row,
            r#"1.2.3.4:8080,Anonymous,0.5,"[[""accept"",""*/*""],[""via"",""1.1 \""squid\""""]]""#
        );
    }

    #[test]
    fn test_render_csv() {
        let results = vec![
            result("1.1.1.1:80", AnonymityLevel::Elite, 1.0),
            result("2.2.2.2:3128", AnonymityLevel::Transparent, 0.04),
        ];
        let out = render(&results, ReportFormat::Csv);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("1.1.1.1:80,Elite,1.0,\"[["));
        assert!(lines[2].starts_with("2.2.2.2:3128,Transparent,0.0,"));
    }

    #[test]
    fn test_render_empty_csv_has_header() {
        assert_eq!(render(&[], ReportFormat::Csv), format!("{}\n", CSV_HEADER));
        assert_eq!(render(&[], ReportFormat::Text), "");
    }

    #[test]
    fn test_render_text() {
        let results = vec![
            result("1.1.1.1:80", AnonymityLevel::Elite, 1.0),
            result("2.2.2.2:3128", AnonymityLevel::Anonymous, 2.0),
        ];
        assert_eq!(
            render(&results, ReportFormat::Text),
            "1.1.1.1:80\n2.2.2.2:3128\n"
        );
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let results = vec![result("1.1.1.1:80", AnonymityLevel::Elite, 0.31)];

        save_to_file(&results, &path, ReportFormat::Csv).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("PROXY,LEVEL,TIME,HEADERS\n1.1.1.1:80,Elite,0.3"));
    }

    #[test]
    fn test_level_counts() {
        let results = vec![
            result("1.1.1.1:80", AnonymityLevel::Elite, 1.0),
            result("2.2.2.2:80", AnonymityLevel::Elite, 1.0),
            result("3.3.3.3:80", AnonymityLevel::Transparent, 1.0),
        ];
        assert_eq!(
            level_counts(&results),
            [
                (AnonymityLevel::Transparent, 1),
                (AnonymityLevel::Anonymous, 0),
                (AnonymityLevel::Elite, 2),
            ]
        );
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!("CSV".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert_eq!("txt".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
