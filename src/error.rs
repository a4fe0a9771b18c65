//! Error types for the camo engine.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the request engine and session registry.
///
/// Every variant carries a stable short code (for the error envelope) and an
/// HTTP status for the REST surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid request descriptor (method, URL scheme, proxy scheme, headers).
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Session registry full after a sweep.
    #[error("session capacity exhausted ({max} sessions)")]
    CapacityExhausted { max: usize },

    /// Unknown session handle.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A redirect target repeated an earlier URL in the chain.
    #[error("redirect loop at {0}")]
    RedirectLoop(String),

    /// Redirect hop limit exceeded.
    #[error("too many redirects ({count} hops)")]
    TooManyRedirects { count: u32 },

    /// Missing or unusable Location header.
    #[error("malformed redirect: {0}")]
    MalformedRedirect(String),

    /// TCP dial or DNS resolution failure.
    #[error("dial failed: {0}")]
    Dial(String),

    /// TLS handshake or configuration failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Upstream proxy handshake failure (CONNECT or SOCKS5).
    #[error("proxy protocol error: {0}")]
    ProxyProtocol(String),

    /// Malformed upstream response framing.
    #[error("upstream protocol error: {0}")]
    Protocol(String),

    /// Per-hop deadline reached.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Decompression or body decode failure.
    #[error("decode error: {0}")]
    Decode(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a dial error.
    pub fn dial(message: impl Into<String>) -> Self {
        Self::Dial(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a proxy protocol error.
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::ProxyProtocol(message.into())
    }

    /// Create an upstream protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Stable short code used in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::UrlParse(_) | Self::Json(_) => "bad_request",
            Self::CapacityExhausted { .. } => "capacity_exhausted",
            Self::SessionNotFound(_) => "session_not_found",
            Self::RedirectLoop(_) => "redirect_loop",
            Self::TooManyRedirects { .. } => "too_many_redirects",
            Self::MalformedRedirect(_) => "malformed_redirect",
            Self::Dial(_) | Self::Io(_) => "upstream_dial",
            Self::Tls(_) => "upstream_tls",
            Self::ProxyProtocol(_) => "proxy_protocol",
            Self::Protocol(_) => "upstream_protocol",
            Self::Timeout(_) => "timeout",
            Self::Decode(_) => "decode",
        }
    }

    /// HTTP status for the REST surface mapping.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest(_)
            | Self::UrlParse(_)
            | Self::Json(_)
            | Self::CapacityExhausted { .. } => 400,
            Self::SessionNotFound(_) => 404,
            Self::Timeout(_) => 504,
            _ => 502,
        }
    }
}
