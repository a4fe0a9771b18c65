//! Request orchestrator: the public entry point of the engine.
//!
//! Validates the descriptor, resolves a session (registered or ephemeral),
//! drives the redirect resolver, and assembles the response descriptor.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use http::Method;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fingerprint::ImpersonationProfile;
use crate::headers;
use crate::models::{header_map, ProxyRequest, ProxyResponse, PERMITTED_METHODS};
use crate::redirect::{self, InitialRequest, RedirectOutcome};
use crate::response::UpstreamResponse;
use crate::session::{SessionRegistry, SessionState};
use crate::transport::proxy::UpstreamProxy;

/// The engine value constructed at startup and shared with the HTTP surface.
///
/// Owns the session registry and its sweeper; tests can instantiate several
/// engines in one process.
pub struct Engine {
    config: Config,
    profile: ImpersonationProfile,
    registry: Arc<SessionRegistry>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let profile = ImpersonationProfile::default();
        let registry = Arc::new(SessionRegistry::new(
            config.session_ttl,
            config.max_sessions,
            profile,
        ));
        let sweeper = registry.spawn_sweeper(config.sweep_interval());
        Self {
            config,
            profile,
            registry,
            sweeper,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    pub fn create_session(&self) -> Result<String> {
        self.registry.create()
    }

    pub fn delete_session(&self, handle: &str) -> Result<()> {
        if self.registry.delete(handle) {
            Ok(())
        } else {
            Err(Error::SessionNotFound(handle.to_string()))
        }
    }

    pub async fn session_cookies(
        &self,
        handle: &str,
    ) -> Result<std::collections::HashMap<String, String>> {
        self.registry.cookies(handle).await
    }

    /// Execute one proxied request end to end.
    ///
    /// The timer starts only once the session (and its serialization turn)
    /// is acquired, so `elapsed_ms` excludes validation and queue wait.
    pub async fn execute(&self, request: ProxyRequest) -> Result<ProxyResponse> {
        let method = parse_method(&request.method)?;
        let url = parse_target_url(&request.url)?;
        let proxy = request
            .proxy
            .as_deref()
            .map(UpstreamProxy::parse)
            .transpose()?;

        let mut overrides = validated_overrides(request.headers.as_ref())?;
        let body = prepare_body(&method, request.body.as_ref(), &mut overrides)?;

        let initial = InitialRequest {
            method,
            url,
            overrides,
            body,
            proxy,
        };

        let (outcome, started) = match request.session_id.as_deref() {
            Some("") => return Err(Error::bad_request("session_id cannot be empty")),
            Some(handle) => {
                let session = self.registry.get_or_create(handle)?;
                let result = session
                    .execute(initial, self.config.request_timeout)
                    .await;
                session.touch();
                result?
            }
            None => {
                // Ephemeral: a throwaway (jar, transport) pair for this call
                // only, discarded with its connections on return.
                let mut state = SessionState::new(self.profile);
                let started = Instant::now();
                let outcome = self.resolve_ephemeral(&mut state, initial).await?;
                (outcome, started)
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        assemble(outcome, request.session_id, elapsed_ms)
    }

    async fn resolve_ephemeral(
        &self,
        state: &mut SessionState,
        initial: InitialRequest,
    ) -> Result<RedirectOutcome> {
        state.request_count += 1;
        tracing::debug!(
            method = %initial.method,
            url = %initial.url,
            "executing ephemeral request"
        );
        redirect::resolve(
            &mut state.transport,
            &mut state.jar,
            self.profile,
            initial,
            self.config.request_timeout,
        )
        .await
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    let upper = raw.to_ascii_uppercase();
    if !PERMITTED_METHODS.contains(&upper.as_str()) {
        return Err(Error::bad_request(format!("unsupported method: {}", raw)));
    }
    upper
        .parse()
        .map_err(|_| Error::bad_request(format!("unsupported method: {}", raw)))
}

fn parse_target_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::bad_request(format!("invalid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::bad_request(format!(
            "URL scheme must be http or https, got {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::bad_request("URL has no host"));
    }
    Ok(url)
}

/// Validate caller header overrides: token names, no control bytes in values.
fn validated_overrides(
    headers: Option<&std::collections::HashMap<String, String>>,
) -> Result<Vec<(String, String)>> {
    let Some(headers) = headers else {
        return Ok(Vec::new());
    };
    let mut overrides = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
        {
            return Err(Error::bad_request(format!("invalid header name: {}", name)));
        }
        if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
            return Err(Error::bad_request(format!(
                "invalid header value for {}",
                name
            )));
        }
        overrides.push((name.clone(), value.clone()));
    }
    Ok(overrides)
}

/// Serialize the caller body and derive its Content-Type.
///
/// Structured values go as JSON with `Content-Type: application/json` unless
/// the caller overrode the header; raw strings go as-is with a text/plain
/// default. Bodies only attach to POST, PUT, and PATCH.
fn prepare_body(
    method: &Method,
    body: Option<&Value>,
    overrides: &mut Vec<(String, String)>,
) -> Result<Option<Bytes>> {
    let Some(body) = body else {
        return Ok(None);
    };
    if !matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        return Ok(None);
    }

    let has_content_type = headers::get_header(overrides, "content-type").is_some();
    match body {
        Value::String(raw) => {
            if !has_content_type {
                overrides.push((
                    "Content-Type".to_string(),
                    "text/plain; charset=utf-8".to_string(),
                ));
            }
            Ok(Some(Bytes::from(raw.clone().into_bytes())))
        }
        value => {
            if !has_content_type {
                overrides.push(("Content-Type".to_string(), "application/json".to_string()));
            }
            Ok(Some(Bytes::from(serde_json::to_vec(value)?)))
        }
    }
}

/// Build the response descriptor from a terminal redirect outcome.
fn assemble(
    outcome: RedirectOutcome,
    session_id: Option<String>,
    elapsed_ms: f64,
) -> Result<ProxyResponse> {
    let RedirectOutcome {
        response,
        chain,
        hops,
        final_url,
    } = outcome;

    let body = interpret_body(&response)?;
    Ok(ProxyResponse {
        status_code: response.status,
        headers: header_map(&response.headers),
        body,
        session_id,
        elapsed_ms,
        redirect_count: hops,
        redirect_chain: chain,
        final_url: final_url.to_string(),
    })
}

/// Final-hop body policy: JSON content types parse to structured values,
/// valid UTF-8 comes back as a string, anything else as tagged base64.
fn interpret_body(response: &UpstreamResponse) -> Result<Value> {
    let decoded = response.decoded_body()?;
    if decoded.is_empty() {
        return Ok(Value::String(String::new()));
    }

    let is_json = response
        .content_type()
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("application/json")
        })
        .unwrap_or(false);
    if is_json {
        if let Ok(value) = serde_json::from_slice(&decoded) {
            return Ok(value);
        }
    }

    match String::from_utf8(decoded.to_vec()) {
        Ok(text) => Ok(Value::String(text)),
        Err(_) => Ok(serde_json::json!({
            "_binary": true,
            "data": BASE64.encode(&decoded),
        })),
    }
}
