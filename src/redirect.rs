//! Redirect resolution state machine.
//!
//! Drives the transport hop by hop, rewriting method/body/URL per status
//! class, with loop protection and a hop limit. Cookies accrue into the
//! session jar on every hop, including intermediate ones.

use bytes::Bytes;
use http::Method;
use std::time::Duration;
use url::Url;

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::fingerprint::ImpersonationProfile;
use crate::headers;
use crate::response::UpstreamResponse;
use crate::transport::pool::{Exchange, SessionTransport};
use crate::transport::proxy::UpstreamProxy;

/// Redirect hop limit.
pub const MAX_REDIRECTS: u32 = 5;

/// The initial frame handed to the resolver.
pub struct InitialRequest {
    pub method: Method,
    pub url: Url,
    /// Caller header overrides, already merged with engine-derived body
    /// headers.
    pub overrides: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub proxy: Option<UpstreamProxy>,
}

/// Terminal state: the final response plus redirect provenance.
pub struct RedirectOutcome {
    pub response: UpstreamResponse,
    /// URLs traversed before the final one; empty when no redirect occurred.
    pub chain: Vec<String>,
    pub hops: u32,
    pub final_url: Url,
}

/// Resolve `request` to a terminal response, following up to
/// [`MAX_REDIRECTS`] hops. Each hop gets its own `hop_timeout` deadline.
pub async fn resolve(
    transport: &mut SessionTransport,
    jar: &mut CookieJar,
    profile: ImpersonationProfile,
    request: InitialRequest,
    hop_timeout: Duration,
) -> Result<RedirectOutcome> {
    let InitialRequest {
        mut method,
        mut url,
        mut overrides,
        mut body,
        proxy,
    } = request;

    let mut chain: Vec<String> = Vec::new();
    let mut visited: Vec<String> = Vec::new();
    let mut hops: u32 = 0;

    loop {
        let mut outbound = headers::compose(profile, &url, &overrides);
        if let Some(jar_cookies) = jar.cookie_header(&url) {
            let caller_cookie = headers::get_header(&outbound, "cookie").map(str::to_string);
            match caller_cookie {
                Some(existing) => {
                    let combined = format!("{}; {}", existing, jar_cookies);
                    headers::set_header(&mut outbound, "Cookie", &combined);
                }
                None => outbound.push(("Cookie".to_string(), jar_cookies)),
            }
        }

        let exchange = Exchange {
            method: method.clone(),
            url: &url,
            headers: outbound,
            body: body.clone(),
            proxy: proxy.as_ref(),
        };
        let response = tokio::time::timeout(hop_timeout, transport.execute(exchange))
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "hop to {} exceeded {}s deadline",
                    url,
                    hop_timeout.as_secs()
                ))
            })??;

        jar.ingest(&url, &response.set_cookie_lines());

        if !response.is_redirect() {
            return Ok(RedirectOutcome {
                response,
                chain,
                hops,
                final_url: url,
            });
        }

        let location = response
            .get_header("Location")
            .ok_or_else(|| Error::MalformedRedirect("missing Location header".to_string()))?;
        let next = url
            .join(location)
            .map_err(|e| Error::MalformedRedirect(format!("unparsable Location: {}", e)))?;
        if !matches!(next.scheme(), "http" | "https") {
            return Err(Error::MalformedRedirect(format!(
                "refusing redirect to {} scheme",
                next.scheme()
            )));
        }

        if visited.contains(&visit_key(&next)) {
            return Err(Error::RedirectLoop(next.to_string()));
        }

        chain.push(url.to_string());
        visited.push(visit_key(&url));
        hops += 1;
        if hops > MAX_REDIRECTS {
            return Err(Error::TooManyRedirects { count: hops });
        }

        tracing::debug!(
            hop = hops,
            status = response.status,
            from = %url,
            to = %next,
            "following redirect"
        );

        // Method/body rewrite per status class. 303 always becomes a
        // body-less GET; the rest preserve method and body (modern browsers
        // no longer downgrade POST on 301/302).
        if response.status == 303 {
            method = Method::GET;
            body = None;
            headers::remove_header(&mut overrides, "Content-Type");
            headers::remove_header(&mut overrides, "Content-Length");
            headers::remove_header(&mut overrides, "Transfer-Encoding");
        }

        // Credentials never travel across origins; the jar re-attaches
        // whatever is scoped to the new origin.
        if headers::origin_of(&next) != headers::origin_of(&url) {
            headers::remove_header(&mut overrides, "Authorization");
            headers::remove_header(&mut overrides, "Cookie");
        }

        url = next;
    }
}

/// Loop-detection key: case-normalized origin plus raw path and query.
fn visit_key(url: &Url) -> String {
    let query = url.query().map(|q| format!("?{}", q)).unwrap_or_default();
    format!(
        "{}{}{}",
        url.origin().ascii_serialization().to_lowercase(),
        url.path(),
        query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_key_normalizes_origin_but_not_path() {
        let a = Url::parse("https://Example.com/Path?q=1").unwrap();
        let b = Url::parse("https://example.com/Path?q=1").unwrap();
        let c = Url::parse("https://example.com/path?q=1").unwrap();
        assert_eq!(visit_key(&a), visit_key(&b));
        assert_ne!(visit_key(&b), visit_key(&c));
    }
}
