//! Proxy Probe - Proxy Checker and Anonymity Grader
//!
//! Probes candidate HTTP proxies by sending a request through each one to a
//! local echo oracle, then grades every working proxy by what the oracle saw.

pub mod proxy;
pub mod tui;

pub use proxy::*;

use proxy::checker::{DEFAULT_ORACLE_PORT, DEFAULT_TIMEOUT};
use proxy::pool::DEFAULT_CONCURRENCY;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Default candidate list file
pub const DEFAULT_PROXY_FILE: &str = "proxies.txt";

/// Default result file
pub const DEFAULT_OUTPUT_FILE: &str = "results.csv";

/// Configuration for one probe run
#[derive(Debug, Clone)]
pub struct Config {
    /// Externally visible address of this machine
    pub wan_ip: String,
    /// Oracle listen port, also the port probes target
    pub oracle_port: u16,
    /// Local address for the oracle; the LAN address when unset
    pub bind_ip: Option<IpAddr>,
    /// Per-probe timeout
    pub timeout: Duration,
    /// Number of concurrent probes
    pub concurrency: usize,
    /// Candidate list file
    pub proxy_file: PathBuf,
    /// Result file
    pub output: PathBuf,
    /// Result file format
    pub format: ReportFormat,
}

impl Config {
    pub fn new(wan_ip: impl Into<String>) -> Self {
        Self {
            wan_ip: wan_ip.into(),
            oracle_port: DEFAULT_ORACLE_PORT,
            bind_ip: None,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            proxy_file: PathBuf::from(DEFAULT_PROXY_FILE),
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            format: ReportFormat::default(),
        }
    }

    pub fn prober_config(&self) -> ProberConfig {
        ProberConfig::new(self.wan_ip.clone())
            .with_timeout(self.timeout)
            .with_oracle_port(self.oracle_port)
    }

    /// Address the oracle binds to
    pub fn oracle_addr(&self) -> Result<SocketAddr> {
        let ip = match self.bind_ip {
            Some(ip) => ip,
            None => proxy::oracle::lan_address()?,
        };
        Ok(SocketAddr::new(ip, self.oracle_port))
    }
}
