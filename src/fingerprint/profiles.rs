//! Browser impersonation profiles.
//!
//! A profile is a versioned, swappable parameter set: TLS ClientHello shape,
//! HTTP/2 SETTINGS, pseudo-header order, and the default header block. Call
//! sites take a profile value rather than hardcoding any of these.

use super::http2::{Http2Settings, PseudoHeaderOrder};
use super::tls::TlsFingerprint;

/// Browser profile used for outbound impersonation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImpersonationProfile {
    /// Chrome 133 on macOS desktop.
    #[default]
    Chrome133,
}

impl ImpersonationProfile {
    /// The User-Agent string for this profile.
    pub fn user_agent(&self) -> &'static str {
        match self {
            Self::Chrome133 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36"
            }
        }
    }

    /// The TLS ClientHello parameter set for this profile.
    pub fn tls_fingerprint(&self) -> TlsFingerprint {
        match self {
            Self::Chrome133 => TlsFingerprint::chrome_133(),
        }
    }

    /// The HTTP/2 SETTINGS for this profile.
    pub fn http2_settings(&self) -> Http2Settings {
        match self {
            Self::Chrome133 => Http2Settings::default(),
        }
    }

    /// The HTTP/2 pseudo-header order for this profile.
    pub fn pseudo_header_order(&self) -> PseudoHeaderOrder {
        match self {
            Self::Chrome133 => PseudoHeaderOrder::Chrome,
        }
    }

    /// The default header block sent with every request, in emission order.
    pub fn default_headers(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::Chrome133 => vec![
                ("Accept", "application/json, text/plain, */*"),
                ("Accept-Language", "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7"),
                ("Accept-Encoding", "gzip, deflate, br, zstd"),
                ("Cache-Control", "no-cache"),
                ("Pragma", "no-cache"),
                ("User-Agent", self.user_agent()),
                (
                    "Sec-Ch-Ua",
                    r#""Not(A:Brand";v="99", "Google Chrome";v="133", "Chromium";v="133""#,
                ),
                ("Sec-Ch-Ua-Mobile", "?0"),
                ("Sec-Ch-Ua-Platform", r#""macOS""#),
                ("Sec-Fetch-Dest", "empty"),
                ("Sec-Fetch-Mode", "cors"),
                ("Sec-Fetch-Site", "same-site"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_133_headers_carry_browser_identity() {
        let profile = ImpersonationProfile::Chrome133;
        let headers = profile.default_headers();
        let ua = headers
            .iter()
            .find(|(name, _)| *name == "User-Agent")
            .map(|(_, value)| *value)
            .unwrap();
        assert!(ua.contains("Chrome/133.0.0.0"));
        assert!(headers.iter().any(|(name, _)| *name == "Sec-Ch-Ua"));
    }
}
