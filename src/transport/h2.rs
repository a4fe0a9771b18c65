//! HTTP/2 exchange using the h2 crate directly.
//!
//! Bypasses higher-level client abstractions so the SETTINGS frame carries
//! the impersonated browser's values. The h2 crate emits pseudo-headers in
//! `:method :authority :scheme :path` order when the authority comes from
//! the URI, which matches Chrome.

use bytes::Bytes;
use h2::client::{Builder, SendRequest};
use http::{Method, Request, Uri};

use crate::error::{Error, Result};
use crate::fingerprint::http2::{Http2Settings, CHROME_CONNECTION_WINDOW_SIZE};
use crate::response::UpstreamResponse;
use crate::transport::connector::MaybeTlsStream;

/// One HTTP/2 connection with fingerprinted SETTINGS. Streams multiplex, so
/// the handle stays in the session pool for reuse.
pub struct H2Exchange {
    sender: SendRequest<Bytes>,
}

impl H2Exchange {
    /// Perform the HTTP/2 handshake over an ALPN-negotiated stream and spawn
    /// the connection driver.
    pub async fn connect(stream: MaybeTlsStream, settings: Http2Settings) -> Result<Self> {
        let mut builder = Builder::new();
        builder
            .header_table_size(settings.header_table_size)
            .initial_window_size(settings.initial_window_size)
            .initial_connection_window_size(CHROME_CONNECTION_WINDOW_SIZE)
            .max_concurrent_streams(settings.max_concurrent_streams)
            .max_frame_size(settings.max_frame_size)
            .max_header_list_size(settings.max_header_list_size)
            .enable_push(settings.enable_push);

        let (sender, connection) = builder
            .handshake(stream)
            .await
            .map_err(|e| Error::protocol(format!("HTTP/2 handshake failed: {}", e)))?;

        // Drive the connection; no I/O happens without this task.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("HTTP/2 connection terminated: {}", e);
            }
        });

        Ok(Self { sender })
    }

    /// Send a request on this connection and collect the full response.
    pub async fn send(
        &mut self,
        method: &Method,
        uri: &Uri,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<UpstreamResponse> {
        let mut sender = self
            .sender
            .clone()
            .ready()
            .await
            .map_err(|e| Error::protocol(format!("HTTP/2 not ready: {}", e)))?;

        let request = build_request(method, uri, headers)?;
        let has_body = body.is_some();

        let (response_future, mut send_stream) = sender
            .send_request(request, !has_body)
            .map_err(|e| Error::protocol(format!("failed to send HTTP/2 request: {}", e)))?;

        if let Some(body) = body {
            send_stream
                .send_data(body.clone(), true)
                .map_err(|e| Error::protocol(format!("failed to send request body: {}", e)))?;
        }

        let response = response_future
            .await
            .map_err(|e| Error::protocol(format!("HTTP/2 response error: {}", e)))?;

        let status = response.status().as_u16();
        let response_headers: Vec<String> = response
            .headers()
            .iter()
            .map(|(name, value)| format!("{}: {}", name.as_str(), value.to_str().unwrap_or("")))
            .collect();

        let mut body_stream = response.into_body();
        let mut body_bytes = Vec::new();
        while let Some(chunk) = body_stream.data().await {
            let chunk =
                chunk.map_err(|e| Error::protocol(format!("failed to read response body: {}", e)))?;
            body_bytes.extend_from_slice(&chunk);
            let _ = body_stream.flow_control().release_capacity(chunk.len());
        }

        Ok(UpstreamResponse::new(
            status,
            response_headers,
            Bytes::from(body_bytes),
            "HTTP/2".to_string(),
        ))
    }
}

fn build_request(
    method: &Method,
    uri: &Uri,
    headers: &[(String, String)],
) -> Result<Request<()>> {
    let mut builder = Request::builder().method(method.clone()).uri(uri.clone());

    for (name, value) in headers {
        // Connection-specific HTTP/1.1 headers are forbidden on h2 streams
        if name.starts_with(':')
            || name.eq_ignore_ascii_case("connection")
            || name.eq_ignore_ascii_case("keep-alive")
            || name.eq_ignore_ascii_case("transfer-encoding")
            || name.eq_ignore_ascii_case("host")
        {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(())
        .map_err(|e| Error::protocol(format!("failed to build request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_headers_are_stripped() {
        let uri: Uri = "https://example.com/x".parse().unwrap();
        let headers = vec![
            ("Connection".to_string(), "keep-alive".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
            ("Host".to_string(), "example.com".to_string()),
        ];
        let request = build_request(&Method::GET, &uri, &headers).unwrap();
        assert!(request.headers().get("connection").is_none());
        assert!(request.headers().get("host").is_none());
        assert_eq!(request.headers().get("accept").unwrap(), "*/*");
    }
}
