//! RFC 6265 Cookie Compliance Tests
//!
//! https://www.rfc-editor.org/rfc/rfc6265

use chrono::{Duration, Utc};
use url::Url;

use camo::cookie::{Cookie, CookieJar, SameSite};

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn parse(line: &str, request_url: &str) -> camo::Result<Cookie> {
    Cookie::from_set_cookie_line(line, &url(request_url))
}

#[test]
fn secure_flag_enforcement_rfc6265_section_5_4() {
    let mut jar = CookieJar::new();
    jar.store(Cookie::new("secure_cookie", "val", "example.com").with_secure(true));

    assert!(
        jar.cookie_header(&url("http://example.com/foo")).is_none(),
        "secure cookie MUST NOT be sent to http"
    );
    assert!(
        jar.cookie_header(&url("https://example.com/foo")).is_some(),
        "secure cookie SHOULD be sent to https"
    );
}

#[test]
fn public_suffix_blocking_rfc6265_section_5_3() {
    assert!(
        parse("name=val; Domain=com", "https://example.com").is_err(),
        "should reject cookie for public suffix 'com'"
    );
    assert!(
        parse("name=val; Domain=co.uk", "https://example.co.uk").is_err(),
        "should reject cookie for public suffix 'co.uk'"
    );
    assert!(
        parse("name=val; Domain=example.co.uk", "https://example.co.uk").is_ok(),
        "should accept cookie for registrable domain"
    );
}

#[test]
fn samesite_none_requires_secure_rfc6265bis() {
    assert!(parse("name=val; SameSite=None", "https://example.com").is_err());

    let cookie = parse("name=val; SameSite=None; Secure", "https://example.com").unwrap();
    assert_eq!(cookie.same_site, Some(SameSite::None));
    assert!(cookie.secure);
}

#[test]
fn path_matching_rfc6265_section_5_1_4() {
    let cookie = Cookie::new("k", "v", "example.com").with_path("/api");

    assert!(cookie.path_matches("/api"));
    assert!(cookie.path_matches("/api/v2"));
    assert!(!cookie.path_matches("/apiv2"), "no '/' boundary");
    assert!(!cookie.path_matches("/"));
}

#[test]
fn domain_matching_rfc6265_section_5_1_3() {
    // Domain cookie matches subdomains
    let domain_cookie = parse("k=v; Domain=example.com", "https://example.com").unwrap();
    assert!(domain_cookie.domain_matches("example.com"));
    assert!(domain_cookie.domain_matches("app.example.com"));
    assert!(!domain_cookie.domain_matches("notexample.com"));

    // Host-only cookie (no Domain attribute) matches exactly
    let host_cookie = parse("k=v", "https://app.example.com/").unwrap();
    assert!(host_cookie.host_only);
    assert!(host_cookie.domain_matches("app.example.com"));
    assert!(!host_cookie.domain_matches("example.com"));
    assert!(!host_cookie.domain_matches("other.app.example.com"));
}

#[test]
fn leading_dot_domain_is_normalized() {
    let cookie = parse("k=v; Domain=.example.com", "https://example.com").unwrap();
    assert_eq!(cookie.domain, "example.com");
    assert!(!cookie.host_only);
    assert!(cookie.domain_matches("sub.example.com"));
}

#[test]
fn max_age_takes_precedence_over_expires_rfc6265_section_5_3() {
    let cookie = parse(
        "k=v; Expires=Wed, 01 Jan 2020 00:00:00 GMT; Max-Age=3600",
        "https://example.com",
    )
    .unwrap();
    // Max-Age=3600 wins over the long-past Expires
    assert!(cookie.expires.unwrap() > Utc::now());
}

#[test]
fn max_age_zero_expires_immediately() {
    let cookie = parse("k=v; Max-Age=0", "https://example.com").unwrap();
    assert!(cookie.is_expired(Utc::now()));
}

#[test]
fn expired_cookies_are_pruned_at_read_time() {
    let mut jar = CookieJar::new();
    jar.store(
        Cookie::new("gone", "x", "example.com").with_expires(Utc::now() - Duration::seconds(10)),
    );
    jar.store(Cookie::new("live", "y", "example.com"));
    assert_eq!(jar.len(), 2);

    let selected = jar.select(&url("https://example.com/"));
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].name, "live");
    assert_eq!(jar.len(), 1, "read prunes expired entries");
}

#[test]
fn cookie_header_orders_longest_path_first_rfc6265_section_5_4() {
    let mut jar = CookieJar::new();
    let u = url("https://example.com/api/v1/data");
    jar.ingest(&u, &["broad=1; Path=/".to_string()]);
    jar.ingest(&u, &["narrow=2; Path=/api/v1".to_string()]);

    let header = jar.cookie_header(&u).unwrap();
    assert_eq!(header, "narrow=2; broad=1");
}

#[test]
fn set_cookie_round_trips_through_snapshot() {
    let mut jar = CookieJar::new();
    jar.ingest(
        &url("https://example.com/login"),
        &["k=v; Path=/; Domain=example.com".to_string()],
    );
    let snapshot = jar.snapshot();
    assert_eq!(snapshot.get("k").map(String::as_str), Some("v"));
}

#[test]
fn default_path_derives_from_request_url() {
    let cookie = parse("k=v", "https://example.com/account/settings/page").unwrap();
    assert_eq!(cookie.path, "/account/settings");
    assert!(cookie.path_matches("/account/settings/other"));
    assert!(!cookie.path_matches("/account"));
}

#[test]
fn unparsable_lines_are_skipped_without_poisoning_the_jar() {
    let mut jar = CookieJar::new();
    let u = url("https://example.com/");
    jar.ingest(
        &u,
        &[
            "novalue".to_string(),
            "good=1; Path=/".to_string(),
            "=empty; Path=/".to_string(),
        ],
    );
    assert_eq!(jar.len(), 1);
    assert_eq!(jar.snapshot().get("good").map(String::as_str), Some("1"));
}
