//! RFC 6265 compliant cookie handling.
//!
//! Manual cookie storage and management - no automatic cookie engine. Each
//! session owns one jar; the redirect resolver feeds it raw Set-Cookie lines
//! and reads back a Cookie header per hop.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use url::Url;

use crate::error::{Error, Result};

/// SameSite attribute for cookies (RFC 6265bis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SameSite {
    /// Cookie sent only for same-site requests.
    Strict,
    /// Cookie sent for same-site requests and top-level navigation.
    Lax,
    /// Cookie sent for all requests (requires Secure attribute).
    None,
}

/// RFC 6265 compliant cookie representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub host_only: bool,
    /// Jar-assigned ingest sequence, used for ordering and snapshot ties.
    pub(crate) ingest_seq: u64,
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
            max_age: None,
            host_only: true,
            ingest_seq: 0,
        }
    }

    /// Builder-style method to set the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Builder-style method to set the secure flag.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Builder-style method to set the expires time.
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Builder-style method to set the host_only flag.
    pub fn with_host_only(mut self, host_only: bool) -> Self {
        self.host_only = host_only;
        self
    }

    /// Parse a Set-Cookie line received for `request_url`.
    ///
    /// Default domain and path are resolved from the request URL when the
    /// corresponding attributes are absent, per RFC 6265 Section 5.3.
    pub fn from_set_cookie_line(line: &str, request_url: &Url) -> Result<Self> {
        let request_domain = request_url
            .host_str()
            .ok_or_else(|| Error::bad_request("no host in request URL"))?;

        let parts: Vec<&str> = line.split(';').map(str::trim).collect();
        let (name, value) = match parts[0].split_once('=') {
            Some((n, v)) => (n.trim().to_string(), v.trim().to_string()),
            None => return Err(Error::bad_request("no = in Set-Cookie")),
        };
        if name.is_empty() {
            return Err(Error::bad_request("empty cookie name"));
        }

        let mut cookie = Cookie::new(name, value, request_domain);
        cookie.path = default_path(request_url);

        // RFC 6265 Section 5.3: host-only-flag is set unless a Domain
        // attribute is present.
        let mut domain_attr_present = false;

        for attr in parts.iter().skip(1) {
            let attr_lower = attr.to_lowercase();
            if attr_lower == "secure" {
                cookie.secure = true;
            } else if attr_lower == "httponly" {
                cookie.http_only = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                match key.trim().to_lowercase().as_str() {
                    "domain" => {
                        cookie.domain = normalize_domain(val.trim());
                        domain_attr_present = true;
                    }
                    "path" => {
                        // Non-absolute Path attributes fall back to the
                        // default path (RFC 6265 Section 5.2.4)
                        let val = val.trim();
                        if val.starts_with('/') {
                            cookie.path = val.to_string();
                        }
                    }
                    "expires" => cookie.expires = parse_cookie_date(val.trim()),
                    "max-age" => cookie.max_age = val.trim().parse().ok(),
                    "samesite" => {
                        cookie.same_site = match val.trim().to_lowercase().as_str() {
                            "strict" => Some(SameSite::Strict),
                            "lax" => Some(SameSite::Lax),
                            "none" => Some(SameSite::None),
                            _ => None,
                        };
                    }
                    _ => {}
                }
            }
        }

        cookie.host_only = !domain_attr_present;

        // A Domain attribute must cover the request host, otherwise the
        // cookie is ignored.
        if domain_attr_present && !cookie.domain_matches(request_domain) {
            return Err(Error::bad_request(format!(
                "Domain={} does not cover request host {}",
                cookie.domain, request_domain
            )));
        }

        // RFC 6265 Section 5.3: Max-Age takes precedence over Expires.
        if let Some(max_age) = cookie.max_age {
            if max_age > 0 {
                cookie.expires = Some(Utc::now() + chrono::Duration::seconds(max_age));
            } else {
                // Max-Age<=0 means delete the cookie
                cookie.expires = Some(Utc::now() - chrono::Duration::seconds(1));
            }
        }

        // RFC 6265 Section 5.3: reject cookies for public suffixes, e.g.
        // Domain=.com or Domain=co.uk.
        if is_public_suffix(&cookie.domain) {
            return Err(Error::bad_request(format!(
                "cannot set cookie for public suffix: {}",
                cookie.domain
            )));
        }

        // RFC 6265bis: SameSite=None requires Secure
        if cookie.same_site == Some(SameSite::None) && !cookie.secure {
            return Err(Error::bad_request("SameSite=None requires Secure"));
        }

        Ok(cookie)
    }

    /// Whether this cookie is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e <= now).unwrap_or(false)
    }

    /// Whether this cookie should be sent for `url` at the call instant.
    pub fn matches_url(&self, url: &Url) -> bool {
        let request_domain = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };

        // Secure cookies only travel over https
        if self.secure && url.scheme() != "https" {
            return false;
        }

        if self.is_expired(Utc::now()) {
            return false;
        }

        if !self.domain_matches(&request_domain) {
            return false;
        }

        self.path_matches(url.path())
    }

    /// RFC 6265 Section 5.1.3: domain matching, honoring the host-only flag.
    pub fn domain_matches(&self, request_domain: &str) -> bool {
        let cookie_domain = self.domain.to_lowercase();
        let request_domain = request_domain.to_lowercase();

        if self.host_only {
            return request_domain == cookie_domain;
        }

        if request_domain == cookie_domain {
            return true;
        }

        // Subdomain match: request "app.example.com" against cookie
        // "example.com" succeeds via the ".example.com" suffix rule.
        request_domain.len() > cookie_domain.len()
            && request_domain.ends_with(&format!(".{}", cookie_domain))
    }

    /// RFC 6265 Section 5.1.4: path matching.
    pub fn path_matches(&self, request_path: &str) -> bool {
        let cookie_path = &self.path;

        if request_path == cookie_path {
            return true;
        }
        if !request_path.starts_with(cookie_path.as_str()) {
            return false;
        }
        if cookie_path.ends_with('/') {
            return true;
        }
        // "/api" must not match "/apiv2"; require a '/' boundary
        request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')
    }

    pub fn value_hash(&self) -> String {
        hash_cookie_value(&self.value)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Hash a cookie value using SHA-256 (8-digit hex).
///
/// Used when logging cookie activity so values never reach the log stream.
pub fn hash_cookie_value(value: &str) -> String {
    use sha2::{Digest, Sha256};
    let result = Sha256::digest(value.as_bytes());
    result[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Cookie jar owned by one session.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: HashMap<String, Vec<Cookie>>,
    next_seq: u64,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a cookie by `(domain, path, name)` per RFC 6265 Section 5.3.
    pub fn store(&mut self, mut cookie: Cookie) {
        self.next_seq += 1;
        cookie.ingest_seq = self.next_seq;

        let list = self.cookies.entry(cookie.domain.clone()).or_default();
        if let Some(pos) = list
            .iter()
            .position(|c| c.name == cookie.name && c.path == cookie.path)
        {
            list[pos] = cookie;
        } else {
            list.push(cookie);
        }
    }

    /// Ingest raw Set-Cookie lines observed for `request_url`.
    ///
    /// A line whose effective expiry is already in the past deletes any
    /// matching entry instead of inserting.
    pub fn ingest(&mut self, request_url: &Url, lines: &[String]) {
        let now = Utc::now();
        for line in lines {
            match Cookie::from_set_cookie_line(line, request_url) {
                Ok(cookie) => {
                    if cookie.is_expired(now) {
                        tracing::debug!(
                            name = %cookie.name,
                            domain = %cookie.domain,
                            "expired Set-Cookie, removing entry"
                        );
                        self.remove(&cookie.domain, &cookie.path, &cookie.name);
                    } else {
                        tracing::debug!(
                            name = %cookie.name,
                            domain = %cookie.domain,
                            value_hash = %cookie.value_hash(),
                            "stored cookie"
                        );
                        self.store(cookie);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring unparsable Set-Cookie line");
                }
            }
        }
    }

    /// Cookies applicable to `url`, pruning expired entries first.
    pub fn select(&mut self, url: &Url) -> Vec<&Cookie> {
        self.prune_expired();
        self.cookies
            .values()
            .flat_map(|v| v.iter())
            .filter(|c| c.matches_url(url))
            .collect()
    }

    /// Build the `Cookie` header value for `url`, if any cookies apply.
    ///
    /// RFC 6265 Section 5.4: longest path first, then earliest stored.
    pub fn cookie_header(&mut self, url: &Url) -> Option<String> {
        let mut cookies = self.select(url);
        if cookies.is_empty() {
            return None;
        }
        cookies.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.ingest_seq.cmp(&b.ingest_seq))
        });
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Flat name-to-value projection for the session cookies endpoint.
    ///
    /// On name collisions across (domain, path), the longest path wins; ties
    /// go to the most recently ingested entry.
    pub fn snapshot(&self) -> HashMap<String, String> {
        let now = Utc::now();
        let mut winners: HashMap<String, &Cookie> = HashMap::new();
        for cookie in self.cookies.values().flat_map(|v| v.iter()) {
            if cookie.is_expired(now) {
                continue;
            }
            match winners.get(cookie.name.as_str()) {
                Some(current)
                    if (current.path.len(), current.ingest_seq)
                        >= (cookie.path.len(), cookie.ingest_seq) => {}
                _ => {
                    winners.insert(cookie.name.clone(), cookie);
                }
            }
        }
        winners
            .into_iter()
            .map(|(name, c)| (name, c.value.clone()))
            .collect()
    }

    fn prune_expired(&mut self) {
        let now = Utc::now();
        for list in self.cookies.values_mut() {
            list.retain(|c| !c.is_expired(now));
        }
        self.cookies.retain(|_, list| !list.is_empty());
    }

    fn remove(&mut self, domain: &str, path: &str, name: &str) -> Option<Cookie> {
        let list = self.cookies.get_mut(&normalize_domain(domain))?;
        let pos = list.iter().position(|c| c.name == name && c.path == path)?;
        Some(list.remove(pos))
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.values().all(|v| v.is_empty())
    }
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_lowercase()
}

/// RFC 6265 Section 5.1.4: default-path from the request URL.
fn default_path(url: &Url) -> String {
    let path = url.path();
    if !path.starts_with('/') {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    // RFC 6265 Section 5.1.1 date formats: RFC 1123, RFC 850, asctime, and
    // common variants seen in the wild.
    const FORMATS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%d %b %Y %H:%M:%S GMT",
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S%.fZ",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = chrono::DateTime::parse_from_str(date_str, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(chrono::TimeZone::from_utc_datetime(&Utc, &dt));
        }
    }

    // Fallback: Unix timestamp
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

/// Check whether a domain is a public suffix per RFC 6265 Section 5.3.
/// Prevents setting cookies on TLDs like ".com" or ".co.uk".
fn is_public_suffix(domain: &str) -> bool {
    let domain_clean = domain.strip_prefix('.').unwrap_or(domain);
    psl::suffix(domain_clean.as_bytes())
        .map(|suffix| suffix.is_known() && suffix.as_bytes() == domain_clean.as_bytes())
        .unwrap_or(false)
}
