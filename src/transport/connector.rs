//! BoringSSL TLS connector with upstream proxy dialing.

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslVersion};
use http::Uri;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::fingerprint::tls::TlsFingerprint;
use crate::fingerprint::ImpersonationProfile;
use crate::transport::proxy::{http_connect, socks5_connect, ProxyScheme, UpstreamProxy};

// FFI bindings for BoringSSL extension control
use boring_sys::SSL_CTX;
use std::os::raw::c_int;

extern "C" {
    /// Enable GREASE (Generate Random Extensions And Sustain Extensibility)
    pub fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
    /// Enable extension order permutation (Chrome 110+ behavior)
    pub fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
}

/// Negotiated ALPN protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpnProtocol {
    /// HTTP/2 ("h2")
    H2,
    /// HTTP/1.1 ("http/1.1")
    Http1,
    /// No ALPN negotiated or unknown protocol
    Unknown,
}

impl AlpnProtocol {
    pub fn is_h2(&self) -> bool {
        matches!(self, Self::H2)
    }
}

/// Stream to the target origin, possibly layered through an upstream proxy.
pub enum MaybeTlsStream {
    /// Plain TCP: http target, dialed directly, through SOCKS5, or sent
    /// absolute-form through an http proxy.
    Plain(TcpStream),
    /// http target through an https proxy (absolute-form inside the proxy
    /// TLS session).
    PlainViaTls(SslStream<TcpStream>),
    /// https target: TLS directly over TCP (direct, SOCKS5, or an http
    /// proxy CONNECT tunnel).
    Tls(SslStream<TcpStream>),
    /// https target through an https proxy: target TLS nested inside the
    /// proxy TLS session.
    TlsViaTls(SslStream<SslStream<TcpStream>>),
}

impl MaybeTlsStream {
    /// The ALPN protocol negotiated with the *target* (never the proxy).
    pub fn alpn_protocol(&self) -> AlpnProtocol {
        let selected = match self {
            Self::Plain(_) | Self::PlainViaTls(_) => None,
            Self::Tls(stream) => stream.ssl().selected_alpn_protocol(),
            Self::TlsViaTls(stream) => stream.ssl().selected_alpn_protocol(),
        };
        match selected {
            Some(b"h2") => AlpnProtocol::H2,
            Some(b"http/1.1") => AlpnProtocol::Http1,
            _ => AlpnProtocol::Unknown,
        }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::PlainViaTls(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
            Self::TlsViaTls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::PlainViaTls(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
            Self::TlsViaTls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::PlainViaTls(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
            Self::TlsViaTls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::PlainViaTls(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
            Self::TlsViaTls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// BoringSSL-based connector carrying the impersonation fingerprint.
#[derive(Clone)]
pub struct FingerprintConnector {
    fingerprint: TlsFingerprint,
}

impl FingerprintConnector {
    pub fn new(profile: ImpersonationProfile) -> Self {
        Self {
            fingerprint: profile.tls_fingerprint(),
        }
    }

    /// Build a configured SSL connector. `target_alpn` selects the browser
    /// ALPN list for target handshakes; proxy handshakes advertise nothing.
    fn build_ssl(&self, target_alpn: bool) -> Result<SslConnector> {
        let fp = &self.fingerprint;
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("failed to create SSL connector: {}", e)))?;

        if !fp.cipher_list.is_empty() {
            builder
                .set_cipher_list(&fp.cipher_list.join(":"))
                .map_err(|e| Error::tls(format!("failed to set cipher list: {}", e)))?;
        }
        if !fp.curves.is_empty() {
            builder
                .set_curves_list(&fp.curves.join(":"))
                .map_err(|e| Error::tls(format!("failed to set curves: {}", e)))?;
        }
        if !fp.sigalgs.is_empty() {
            builder
                .set_sigalgs_list(&fp.sigalgs.join(":"))
                .map_err(|e| Error::tls(format!("failed to set signature algorithms: {}", e)))?;
        }

        // GREASE and per-connection extension permutation, matching the
        // randomized subset real Chrome reorders.
        unsafe {
            let ctx = builder.as_ptr() as *mut SSL_CTX;
            SSL_CTX_set_grease_enabled(ctx, fp.grease as c_int);
            SSL_CTX_set_permute_extensions(ctx, fp.permute_extensions as c_int);
        }

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| Error::tls(format!("failed to set min TLS version: {}", e)))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| Error::tls(format!("failed to set max TLS version: {}", e)))?;

        // Session tickets and session ID caching, as browsers do
        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

        if target_alpn {
            builder
                .set_alpn_protos(fp.alpn)
                .map_err(|e| Error::tls(format!("failed to set ALPN: {}", e)))?;
        }

        Ok(builder.build())
    }

    async fn tls_handshake<S>(&self, host: &str, stream: S, target_alpn: bool) -> Result<SslStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let connector = self.build_ssl(target_alpn)?;
        let config = connector
            .configure()
            .map_err(|e| Error::tls(format!("failed to configure SSL: {}", e)))?;
        tokio_boring::connect(config, host, stream)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake with {} failed: {}", host, e)))
    }

    /// Connect to the target named by `uri`, optionally through `proxy`.
    pub async fn connect(
        &self,
        uri: &Uri,
        proxy: Option<&UpstreamProxy>,
    ) -> Result<MaybeTlsStream> {
        let host = uri
            .host()
            .ok_or_else(|| Error::bad_request("missing host in URL"))?;
        let is_https = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });

        match proxy {
            None => {
                let tcp = dial(host, port).await?;
                if is_https {
                    let tls = self.tls_handshake(host, tcp, true).await?;
                    Ok(MaybeTlsStream::Tls(tls))
                } else {
                    Ok(MaybeTlsStream::Plain(tcp))
                }
            }
            Some(proxy) => match proxy.scheme {
                ProxyScheme::Socks5 => {
                    let mut tcp = dial(&proxy.host, proxy.port).await?;
                    socks5_connect(
                        &mut tcp,
                        host,
                        port,
                        proxy.username.as_deref(),
                        proxy.password.as_deref(),
                    )
                    .await?;
                    if is_https {
                        let tls = self.tls_handshake(host, tcp, true).await?;
                        Ok(MaybeTlsStream::Tls(tls))
                    } else {
                        Ok(MaybeTlsStream::Plain(tcp))
                    }
                }
                ProxyScheme::Http => {
                    let mut tcp = dial(&proxy.host, proxy.port).await?;
                    if is_https {
                        http_connect(&mut tcp, host, port, proxy.basic_credentials().as_deref())
                            .await?;
                        let tls = self.tls_handshake(host, tcp, true).await?;
                        Ok(MaybeTlsStream::Tls(tls))
                    } else {
                        // Plaintext targets use absolute-form requests on the
                        // proxy connection itself; no tunnel needed.
                        Ok(MaybeTlsStream::Plain(tcp))
                    }
                }
                ProxyScheme::Https => {
                    let tcp = dial(&proxy.host, proxy.port).await?;
                    let mut proxy_tls = self.tls_handshake(&proxy.host, tcp, false).await?;
                    if is_https {
                        http_connect(
                            &mut proxy_tls,
                            host,
                            port,
                            proxy.basic_credentials().as_deref(),
                        )
                        .await?;
                        let tls = self.tls_handshake(host, proxy_tls, true).await?;
                        Ok(MaybeTlsStream::TlsViaTls(tls))
                    } else {
                        Ok(MaybeTlsStream::PlainViaTls(proxy_tls))
                    }
                }
            },
        }
    }
}

async fn dial(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::dial(format!("failed to connect to {}:{}: {}", host, port, e)))
}
