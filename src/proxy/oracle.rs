//! Echo oracle: an HTTP server that answers every request with the request's own headers
//!
//! Probes travel `prober -> candidate proxy -> oracle`, so the oracle has to be
//! reachable from the outside. For that reason it binds the machine's LAN
//! address by default, never a loopback alias; port forwarding from the WAN
//! address is up to the operator.

use crate::proxy::models::HeaderSet;
use crate::Result;
use anyhow::{anyhow, Context};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::{AddrIncoming, AddrStream};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use log::{debug, info, trace};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Public address used only to pick the outbound interface; nothing is sent to it
const ROUTE_PROBE_ADDR: (&str, u16) = ("8.8.8.8", 80);

/// How long shutdown waits for open connections
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Running echo oracle
pub struct EchoOracle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::result::Result<(), hyper::Error>>,
}

impl EchoOracle {
    /// Bind `addr` and start serving in the background.
    ///
    /// The socket is listening when this returns, so probes may be
    /// dispatched right away. Must be called within a tokio runtime.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let mut incoming =
            AddrIncoming::bind(&addr).with_context(|| format!("failed to bind oracle on {}", addr))?;
        incoming.set_nodelay(true);
        let local_addr = incoming.local_addr();

        let make_svc = make_service_fn(|conn: &AddrStream| {
            let remote = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| echo_headers(req, remote)))
            }
        });

        let (shutdown, rx) = oneshot::channel::<()>();
        let server = Server::builder(incoming)
            .serve(make_svc)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            });
        let task = tokio::spawn(server);

        info!("Echo oracle listening on {}", local_addr);

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and give open ones a moment to finish
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task).await {
            Ok(joined) => joined?.map_err(|e| anyhow!("oracle server error: {}", e)),
            Err(_) => {
                debug!("Oracle connections still open after {:?}, aborting", SHUTDOWN_GRACE);
                self.task.abort();
                Ok(())
            }
        }
    }
}

/// Find the address of the interface this machine uses for outbound traffic
pub fn lan_address() -> Result<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket
        .connect(ROUTE_PROBE_ADDR)
        .context("no route to a public address; pass an explicit bind address")?;
    let ip = socket.local_addr()?.ip();
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(anyhow!("could not determine a LAN address (got {})", ip));
    }
    Ok(ip)
}

/// Render the request headers as the oracle's response body
pub fn echo_body<T>(req: &Request<T>) -> String {
    let headers = HeaderSet::from_pairs(req.headers().iter().map(|(name, value)| {
        (
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
    }));
    format!("{}\n", headers.to_json())
}

async fn echo_headers(
    req: Request<Body>,
    remote: SocketAddr,
) -> std::result::Result<Response<Body>, Infallible> {
    trace!("{} {} from {}", req.method(), req.uri(), remote);

    let mut resp = Response::new(Body::from(echo_body(&req)));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(resp)
}
