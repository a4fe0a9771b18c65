//! Browser impersonation profiles (TLS ClientHello, HTTP/2 SETTINGS, headers).

pub mod http2;
pub mod profiles;
pub mod tls;

pub use http2::Http2Settings;
pub use profiles::ImpersonationProfile;
pub use tls::TlsFingerprint;
