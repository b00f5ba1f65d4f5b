//! Minimal HTTP/1 GET transport for the management API.
//!
//! One connection per request: TCP connect, optional TLS via `rustls`, a
//! hyper HTTP/1 handshake, then the body collected into a string. The whole
//! exchange runs under a single timeout.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{AdminError, AdminResult};

const USER_AGENT: &str = concat!("busgauge/", env!("CARGO_PKG_VERSION"));

/// Status code and body of a completed request.
pub(crate) struct Response {
    pub status: u16,
    pub body: String,
}

pub(crate) struct HttpTransport {
    host: String,
    port: u16,
    tls: Option<TlsConnector>,
    timeout: Duration,
}

impl HttpTransport {
    /// HTTPS transport trusting the Mozilla root store.
    pub fn https(host: &str, timeout: Duration) -> AdminResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| AdminError::Tls(format!("tls protocol version error: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            host: host.to_string(),
            port: 443,
            tls: Some(TlsConnector::from(Arc::new(config))),
            timeout,
        })
    }

    /// Plain HTTP transport (local emulator).
    pub fn plain(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            tls: None,
            timeout,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() { "https" } else { "http" }
    }

    /// Issue a GET for `path_and_query` with the given authorization header.
    pub async fn get(&self, path_and_query: &str, authorization: &str) -> AdminResult<Response> {
        tokio::time::timeout(self.timeout, self.exchange(path_and_query, authorization))
            .await
            .map_err(|_| AdminError::Timeout(self.timeout))?
    }

    async fn exchange(&self, path_and_query: &str, authorization: &str) -> AdminResult<Response> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| AdminError::Connect(format!("{}:{}: {e}", self.host, self.port)))?;
        let _ = stream.set_nodelay(true);

        match &self.tls {
            Some(connector) => {
                let server_name = ServerName::try_from(self.host.clone())
                    .map_err(|e| AdminError::Tls(format!("invalid server name '{}': {e}", self.host)))?;
                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| AdminError::Tls(e.to_string()))?;
                send(TokioIo::new(tls_stream), &self.host, path_and_query, authorization).await
            }
            None => send(TokioIo::new(stream), &self.host, path_and_query, authorization).await,
        }
    }
}

async fn send<T>(io: T, host: &str, path_and_query: &str, authorization: &str) -> AdminResult<Response>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| AdminError::Http(format!("handshake failed: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "admin connection closed with error");
        }
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(path_and_query)
        .header("host", host)
        .header("authorization", authorization)
        .header("accept", "application/atom+xml")
        .header("user-agent", USER_AGENT)
        .body(Empty::<Bytes>::new())
        .map_err(|e| AdminError::Http(e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| AdminError::Http(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| AdminError::Http(format!("reading body: {e}")))?
        .to_bytes();

    Ok(Response {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
