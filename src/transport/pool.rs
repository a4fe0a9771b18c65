//! Per-session transport with connection reuse.
//!
//! Connections are keyed by (scheme, host, port, upstream proxy) and owned by
//! exactly one session; requests on a session are serialized above this
//! layer, so the pool needs no interior locking. Cross-session reuse is
//! forbidden so transport-level state never leaks cookies between sessions.

use bytes::Bytes;
use http::{Method, Uri};
use std::collections::HashMap;
use url::Url;

use crate::error::{Error, Result};
use crate::fingerprint::ImpersonationProfile;
use crate::response::UpstreamResponse;
use crate::transport::connector::FingerprintConnector;
use crate::transport::h1::{H1Connection, RequestTarget};
use crate::transport::h2::H2Exchange;
use crate::transport::proxy::{ProxyScheme, UpstreamProxy};

/// One upstream exchange to perform.
pub struct Exchange<'a> {
    pub method: Method,
    pub url: &'a Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub proxy: Option<&'a UpstreamProxy>,
}

/// Connection-pool key: one entry per (origin, upstream proxy).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct ConnKey {
    scheme: String,
    host: String,
    port: u16,
    proxy: Option<String>,
}

impl ConnKey {
    fn for_exchange(url: &Url, proxy: Option<&UpstreamProxy>) -> Self {
        let scheme = url.scheme().to_string();
        let port = url
            .port()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });
        Self {
            scheme,
            host: url.host_str().unwrap_or_default().to_lowercase(),
            port,
            proxy: proxy.map(UpstreamProxy::pool_tag),
        }
    }
}

enum PooledConn {
    H1(H1Connection),
    H2(H2Exchange),
}

/// Transport handle owned by one session.
pub struct SessionTransport {
    connector: FingerprintConnector,
    profile: ImpersonationProfile,
    conns: HashMap<ConnKey, PooledConn>,
}

impl SessionTransport {
    pub fn new(profile: ImpersonationProfile) -> Self {
        Self {
            connector: FingerprintConnector::new(profile),
            profile,
            conns: HashMap::new(),
        }
    }

    /// Execute one exchange, reusing a pooled connection when possible.
    ///
    /// A pooled connection that fails is discarded and the exchange retried
    /// once on a fresh dial; fresh-dial failures propagate.
    pub async fn execute(&mut self, exchange: Exchange<'_>) -> Result<UpstreamResponse> {
        let uri: Uri = exchange
            .url
            .as_str()
            .parse()
            .map_err(|e| Error::bad_request(format!("invalid URL: {}", e)))?;
        let key = ConnKey::for_exchange(exchange.url, exchange.proxy);

        // Plaintext targets through an HTTP(S) proxy use absolute-form
        // request targets and carry proxy credentials inline.
        let mut headers = exchange.headers;
        let target = match exchange.proxy {
            Some(proxy)
                if exchange.url.scheme() == "http"
                    && matches!(proxy.scheme, ProxyScheme::Http | ProxyScheme::Https) =>
            {
                if let Some(credentials) = proxy.basic_credentials() {
                    headers.push(("Proxy-Authorization".to_string(), credentials));
                }
                RequestTarget::Absolute
            }
            _ => RequestTarget::Origin,
        };

        if let Some(conn) = self.conns.remove(&key) {
            match send_on(conn, &exchange.method, &uri, &headers, exchange.body.as_ref(), target)
                .await
            {
                Ok((response, Some(conn))) => {
                    self.conns.insert(key, conn);
                    return Ok(response);
                }
                Ok((response, None)) => return Ok(response),
                Err(e) => {
                    tracing::debug!(error = %e, "pooled connection failed, redialing");
                }
            }
        }

        let stream = self.connector.connect(&uri, exchange.proxy).await?;
        let conn = if stream.alpn_protocol().is_h2() {
            tracing::debug!(host = %key.host, "negotiated h2");
            PooledConn::H2(H2Exchange::connect(stream, self.profile.http2_settings()).await?)
        } else {
            PooledConn::H1(H1Connection::new(stream))
        };

        let (response, conn) =
            send_on(conn, &exchange.method, &uri, &headers, exchange.body.as_ref(), target)
                .await?;
        if let Some(conn) = conn {
            self.conns.insert(key, conn);
        }
        Ok(response)
    }

    /// Drop every pooled connection.
    pub fn close(&mut self) {
        self.conns.clear();
    }

    /// Number of live pooled connections.
    pub fn pooled(&self) -> usize {
        self.conns.len()
    }
}

/// Send on a connection; returns it for the pool when still reusable.
async fn send_on(
    conn: PooledConn,
    method: &Method,
    uri: &Uri,
    headers: &[(String, String)],
    body: Option<&Bytes>,
    target: RequestTarget,
) -> Result<(UpstreamResponse, Option<PooledConn>)> {
    match conn {
        PooledConn::H2(mut conn) => {
            let response = conn.send(method, uri, headers, body).await?;
            Ok((response, Some(PooledConn::H2(conn))))
        }
        PooledConn::H1(mut conn) => {
            let response = conn.send_request(method, uri, headers, body, target).await?;
            let reusable = !conn.should_close();
            Ok((response, reusable.then_some(PooledConn::H1(conn))))
        }
    }
}
