//! # camo
//!
//! Forward proxy service that executes outbound HTTP requests while
//! impersonating the Chrome 133 TLS and HTTP fingerprint. Callers submit a
//! structured request over a local REST API; the engine handles sessions,
//! cookies, redirects, upstream proxies, and response decoding.

// Core modules
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod headers;
pub mod models;
pub mod redirect;
pub mod response;
pub mod session;

// Fingerprinting
pub mod fingerprint;

// Transport layer
pub mod transport;

// REST surface
pub mod api;

// Re-exports for convenient access
pub use config::Config;
pub use cookie::{hash_cookie_value, Cookie, CookieJar};
pub use engine::Engine;
pub use error::{Error, Result};
pub use fingerprint::ImpersonationProfile;
pub use models::{ProxyRequest, ProxyResponse};
pub use response::UpstreamResponse;
pub use session::SessionRegistry;

// Transport re-exports
pub use transport::connector::{AlpnProtocol, FingerprintConnector, MaybeTlsStream};
pub use transport::pool::SessionTransport;
pub use transport::proxy::UpstreamProxy;
