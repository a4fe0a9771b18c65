//! Outbound header composition.
//!
//! Merge order: profile defaults, then headers derived from the current URL
//! (Origin, Referer), then caller overrides. Names compare case-insensitively
//! and the caller always wins; an empty caller value suppresses the header
//! entirely. Host is emitted by the transport, not composed here.

use url::Url;

use crate::fingerprint::ImpersonationProfile;

/// Compose the outbound header set for `url`.
pub fn compose(
    profile: ImpersonationProfile,
    url: &Url,
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = profile
        .default_headers()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let origin = origin_of(url);
    set_header(&mut headers, "Origin", &origin);
    set_header(&mut headers, "Referer", &format!("{}/", origin));

    for (name, value) in overrides {
        if value.is_empty() {
            remove_header(&mut headers, name);
        } else {
            set_header(&mut headers, name, value);
        }
    }

    headers
}

/// `scheme://host[:port]`, omitting default ports.
pub fn origin_of(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    }
}

/// Replace a header in place (case-insensitive), or append it.
pub fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some(slot) = headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
    {
        slot.1 = value.to_string();
    } else {
        headers.push((name.to_string(), value.to_string()));
    }
}

/// Remove a header (case-insensitive).
pub fn remove_header(headers: &mut Vec<(String, String)>, name: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

/// Fetch a header value (case-insensitive).
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composed(url: &str, overrides: &[(&str, &str)]) -> Vec<(String, String)> {
        let overrides: Vec<(String, String)> = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        compose(
            ImpersonationProfile::Chrome133,
            &Url::parse(url).unwrap(),
            &overrides,
        )
    }

    #[test]
    fn derives_origin_and_referer_from_url() {
        let headers = composed("https://api.example.com/v1/data", &[]);
        assert_eq!(
            get_header(&headers, "origin"),
            Some("https://api.example.com")
        );
        assert_eq!(
            get_header(&headers, "referer"),
            Some("https://api.example.com/")
        );
    }

    #[test]
    fn origin_keeps_non_default_port() {
        let url = Url::parse("http://localhost:8080/x").unwrap();
        assert_eq!(origin_of(&url), "http://localhost:8080");
        let url = Url::parse("https://example.com/x").unwrap();
        assert_eq!(origin_of(&url), "https://example.com");
    }

    #[test]
    fn overrides_dominate_case_insensitively() {
        let headers = composed("https://example.com/", &[("user-agent", "custom")]);
        assert_eq!(get_header(&headers, "User-Agent"), Some("custom"));
        // No duplicate left behind
        let count = headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_override_suppresses_header() {
        let headers = composed("https://example.com/", &[("Pragma", "")]);
        assert_eq!(get_header(&headers, "pragma"), None);
    }

    #[test]
    fn caller_extras_are_appended() {
        let headers = composed("https://example.com/", &[("X-Custom", "1")]);
        assert_eq!(get_header(&headers, "x-custom"), Some("1"));
    }
}
