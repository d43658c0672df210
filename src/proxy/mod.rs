//! Proxy module for probing and grading proxies
//!
//! This module provides functionality for:
//! - Serving an echo oracle that reflects request headers back as JSON
//! - Probing candidate proxies through that oracle on a bounded worker pool
//! - Classifying working proxies as transparent, anonymous or elite
//! - Loading candidate lists and saving results

pub mod checker;
pub mod classifier;
pub mod error;
pub mod models;
pub mod oracle;
pub mod parser;
pub mod pool;
pub mod report;

pub use checker::{ProberConfig, ProxyProber};
pub use classifier::classify;
pub use error::{ProbeError, ProbeErrorKind};
pub use models::{AnonymityLevel, HeaderEntry, HeaderSet, ProbeResult, ProxyCandidate};
pub use oracle::EchoOracle;
pub use parser::CandidateParser;
pub use pool::{ProbeEvent, ProbePool, ResultAggregator, WorkQueue};
pub use report::ReportFormat;
