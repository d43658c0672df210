//! Proxy prober: one request through a candidate to the echo oracle

use crate::proxy::classifier::classify;
use crate::proxy::error::ProbeError;
use crate::proxy::models::{HeaderSet, ProbeResult, ProxyCandidate};
use log::trace;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::time::{Duration, Instant};

/// Default timeout for a probe, connect and read combined
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default port the echo oracle listens on
pub const DEFAULT_ORACLE_PORT: u16 = 80;

/// User agent sent through the proxy; some servers special-case library defaults
pub const DEFAULT_USER_AGENT: &str = "Proxy Tester";

/// Configuration for the prober
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Timeout for each probe
    pub timeout: Duration,
    /// Externally visible address of the oracle
    pub wan_ip: String,
    /// Port the oracle is reachable on
    pub oracle_port: u16,
    /// User agent for probe requests
    pub user_agent: String,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            wan_ip: String::from("127.0.0.1"),
            oracle_port: DEFAULT_ORACLE_PORT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ProberConfig {
    pub fn new(wan_ip: impl Into<String>) -> Self {
        Self {
            wan_ip: wan_ip.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_oracle_port(mut self, port: u16) -> Self {
        self.oracle_port = port;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// URL every probe requests through its candidate
    pub fn oracle_url(&self) -> String {
        format!("http://{}:{}/", self.wan_ip, self.oracle_port)
    }
}

/// Probes candidates against the echo oracle
#[derive(Debug, Clone, Default)]
pub struct ProxyProber {
    config: ProberConfig,
}

impl ProxyProber {
    pub fn new(config: ProberConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// Run one probe through `proxy`.
    ///
    /// Fails on any transport problem, on a body that is not a header list,
    /// and on a header list whose names are not unique. No retries.
    pub async fn probe(&self, proxy: &ProxyCandidate) -> Result<ProbeResult, ProbeError> {
        let start = Instant::now();

        let client = self.create_client(proxy)?;
        let headers = match tokio::time::timeout(self.config.timeout, self.fetch(&client)).await {
            Ok(fetched) => fetched?,
            Err(_) => return Err(ProbeError::Timeout),
        };

        if !headers.is_well_formed() {
            return Err(ProbeError::Shape {
                names: headers.distinct_names(),
                values: headers.len(),
            });
        }

        // Host carries the oracle authority we asked for, not anything the proxy relayed.
        let level = classify(
            &headers.without("host"),
            &self.config.wan_ip,
            self.config.oracle_port,
        );
        let elapsed = start.elapsed().as_secs_f64();
        trace!("{} classified as {} in {:.2}s", proxy, level, elapsed);

        Ok(ProbeResult::new(proxy.clone(), level, elapsed, headers))
    }

    async fn fetch(&self, client: &Client) -> Result<HeaderSet, ProbeError> {
        let response = client.get(self.config.oracle_url()).send().await?;
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status()));
        }
        let body = response.text().await?;
        Ok(HeaderSet::from_json(&body)?)
    }

    /// Create a reqwest client routed through the candidate
    fn create_client(&self, proxy: &ProxyCandidate) -> Result<Client, ProbeError> {
        let reqwest_proxy = ReqwestProxy::http(proxy.url()).map_err(ProbeError::InvalidProxy)?;

        Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(ProbeError::Client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::error::ProbeErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response to every connection
    async fn canned_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        addr.to_string()
    }

    fn prober() -> ProxyProber {
        ProxyProber::new(
            ProberConfig::new("9.9.9.9")
                .with_oracle_port(8081)
                .with_timeout(Duration::from_millis(500)),
        )
    }

    #[test]
    fn test_prober_config_default() {
        let config = ProberConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.oracle_port, DEFAULT_ORACLE_PORT);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_prober_config_builder() {
        let config = ProberConfig::new("203.0.113.7")
            .with_timeout(Duration::from_secs(3))
            .with_oracle_port(8081)
            .with_user_agent("Custom Agent".to_string());

        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.oracle_url(), "http://203.0.113.7:8081/");
        assert_eq!(config.user_agent, "Custom Agent");
    }

    #[tokio::test]
    async fn test_probe_classifies_echo() {
        let proxy = canned_server("200 OK", r#"[["accept","*/*"],["via","1.1 squid"]]"#).await;
        let candidate = ProxyCandidate::new(&proxy).unwrap();

        let result = prober().probe(&candidate).await.unwrap();
        assert_eq!(result.proxy, candidate);
        assert_eq!(result.level, crate::AnonymityLevel::Anonymous);
        assert_eq!(result.headers.len(), 2);
        assert!(result.elapsed_secs >= 0.0);
    }

    #[tokio::test]
    async fn test_probe_ignores_host_header() {
        let proxy = canned_server("200 OK", r#"[["host","9.9.9.9:8081"]]"#).await;
        let candidate = ProxyCandidate::new(&proxy).unwrap();

        let result = prober().probe(&candidate).await.unwrap();
        assert_eq!(result.level, crate::AnonymityLevel::Elite);
        assert_eq!(result.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_rejects_non_json() {
        let proxy = canned_server("200 OK", "<html>Access denied</html>").await;
        let candidate = ProxyCandidate::new(&proxy).unwrap();

        let err = prober().probe(&candidate).await.unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_probe_rejects_duplicate_names() {
        let proxy = canned_server("200 OK", r#"[["via","a"],["via","b"]]"#).await;
        let candidate = ProxyCandidate::new(&proxy).unwrap();

        let err = prober().probe(&candidate).await.unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Shape);
    }

    #[tokio::test]
    async fn test_probe_rejects_error_status() {
        let proxy = canned_server("502 Bad Gateway", "[]").await;
        let candidate = ProxyCandidate::new(&proxy).unwrap();

        let err = prober().probe(&candidate).await.unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_probe_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let candidate = ProxyCandidate::new(&addr.to_string()).unwrap();
        let err = prober().probe(&candidate).await.unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_probe_times_out_on_silent_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let candidate = ProxyCandidate::new(&addr.to_string()).unwrap();
        let prober = ProxyProber::new(
            ProberConfig::new("9.9.9.9").with_timeout(Duration::from_millis(200)),
        );
        let start = Instant::now();
        let err = prober.probe(&candidate).await.unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Transport);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_probe_malformed_candidate() {
        let candidate = ProxyCandidate::new("definitely not an address").unwrap();
        let err = prober().probe(&candidate).await.unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Transport);
    }
}
