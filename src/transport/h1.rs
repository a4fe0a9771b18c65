//! HTTP/1.1 exchange over a raw stream.
//!
//! Uses httparse for response parsing and raw I/O for control over request
//! formatting and header order.

use bytes::Bytes;
use http::{Method, Uri};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::response::UpstreamResponse;
use crate::transport::connector::MaybeTlsStream;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Request-target form per RFC 9112 Section 3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    /// `/path?query` — direct and tunneled requests.
    Origin,
    /// `http://host/path?query` — plaintext requests through an HTTP proxy.
    Absolute,
}

/// HTTP/1.1 connection for sending requests.
pub struct H1Connection {
    stream: MaybeTlsStream,
    /// Whether the connection should be closed after the current response.
    should_close: bool,
}

impl H1Connection {
    pub fn new(stream: MaybeTlsStream) -> Self {
        Self {
            stream,
            should_close: false,
        }
    }

    /// Check if the connection should be closed (not reusable).
    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// Send a request and read the response.
    pub async fn send_request(
        &mut self,
        method: &Method,
        uri: &Uri,
        headers: &[(String, String)],
        body: Option<&Bytes>,
        target: RequestTarget,
    ) -> Result<UpstreamResponse> {
        let request_bytes = build_request(method, uri, headers, body, target)?;
        self.stream
            .write_all(&request_bytes)
            .await
            .map_err(|e| Error::protocol(format!("failed to write request: {}", e)))?;

        if let Some(body) = body {
            self.stream
                .write_all(body)
                .await
                .map_err(|e| Error::protocol(format!("failed to write body: {}", e)))?;
        }

        self.stream
            .flush()
            .await
            .map_err(|e| Error::protocol(format!("failed to flush: {}", e)))?;

        self.read_response(method).await
    }

    /// Read and parse a response, skipping 1xx informational responses per
    /// RFC 9112 Section 6.
    async fn read_response(&mut self, method: &Method) -> Result<UpstreamResponse> {
        let mut buffer = Vec::with_capacity(8192);

        loop {
            loop {
                if buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::protocol("response headers too large"));
                }
                if find_header_end(&buffer).is_some() {
                    break;
                }
                let mut read_buf = vec![0u8; 8192];
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::protocol(format!("failed to read response: {}", e)))?;
                if n == 0 {
                    return Err(Error::protocol("connection closed before response complete"));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            let (response, consumed) = self.parse_response(&buffer, method).await?;
            buffer = buffer[consumed..].to_vec();

            // 1xx responses have no body; keep reading for the final one.
            if (100..200).contains(&response.status) {
                continue;
            }
            return Ok(response);
        }
    }

    /// Parse headers and body, returning the response and bytes consumed
    /// from the buffer.
    async fn parse_response(
        &mut self,
        buffer: &[u8],
        request_method: &Method,
    ) -> Result<(UpstreamResponse, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut response = httparse::Response::new(&mut headers);

        let headers_len = match response
            .parse(buffer)
            .map_err(|e| Error::protocol(format!("failed to parse response: {}", e)))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                return Err(Error::protocol("incomplete response headers"));
            }
        };

        let status = response
            .code
            .ok_or_else(|| Error::protocol("missing status code"))?;
        let version = format!("HTTP/1.{}", response.version.unwrap_or(1));

        let response_headers: Vec<String> = response
            .headers
            .iter()
            .filter(|h| !h.name.is_empty())
            .map(|h| format!("{}: {}", h.name, String::from_utf8_lossy(h.value)))
            .collect();

        if let Some(conn) = find_header_value(&response_headers, "connection") {
            if conn.to_ascii_lowercase().contains("close") {
                self.should_close = true;
            }
        }

        // RFC 9112 Section 6.1: HEAD responses and 1xx/204/304 carry no body.
        let has_body =
            !matches!(status, 100..=199 | 204 | 304) && *request_method != Method::HEAD;
        if !has_body {
            let resp = UpstreamResponse::new(status, response_headers, Bytes::new(), version);
            return Ok((resp, headers_len));
        }

        let transfer_encoding = find_header_value(&response_headers, "transfer-encoding");
        let is_chunked = transfer_encoding
            .map(|v| {
                // chunked must be the final transfer coding
                v.split(',')
                    .next_back()
                    .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        // RFC 9112 Section 6.3: Transfer-Encoding overrides Content-Length
        let content_length = if transfer_encoding.is_some() {
            None
        } else if let Some(cl) = find_header_value(&response_headers, "content-length") {
            Some(parse_content_length(cl)?)
        } else {
            None
        };

        let body_start = &buffer[headers_len..];
        let (body, consumed) = if is_chunked {
            let body = self.read_chunked_body(body_start.to_vec()).await?;
            (body, buffer.len())
        } else if let Some(len) = content_length {
            let body = self.read_fixed_body(body_start, len).await?;
            (body, headers_len + body_start.len().min(len))
        } else {
            // Close-delimited body
            self.should_close = true;
            let body = self.read_until_close(body_start).await?;
            (body, buffer.len())
        };

        let resp = UpstreamResponse::new(status, response_headers, body, version);
        Ok((resp, consumed))
    }

    async fn read_until_close(&mut self, initial: &[u8]) -> Result<Bytes> {
        let mut body = initial.to_vec();
        let mut read_buf = vec![0u8; 8192];
        loop {
            let n = self
                .stream
                .read(&mut read_buf)
                .await
                .map_err(|e| Error::protocol(format!("failed to read body: {}", e)))?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&read_buf[..n]);
        }
        Ok(Bytes::from(body))
    }

    async fn read_fixed_body(&mut self, initial: &[u8], content_length: usize) -> Result<Bytes> {
        let initial_len = initial.len().min(content_length);
        let mut body = Vec::with_capacity(content_length);
        body.extend_from_slice(&initial[..initial_len]);

        while body.len() < content_length {
            let remaining = content_length - body.len();
            let mut chunk = vec![0u8; remaining.min(8192)];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| Error::protocol(format!("failed to read body: {}", e)))?;
            if n == 0 {
                return Err(Error::protocol(format!(
                    "connection closed before full body (got {} of {} bytes)",
                    body.len(),
                    content_length
                )));
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Ok(Bytes::from(body))
    }

    /// Read a chunked transfer-encoded body (RFC 9112 Section 7.1).
    async fn read_chunked_body(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = Vec::new();
        let mut buffer = initial;
        let mut read_buf = vec![0u8; 8192];

        loop {
            let (chunk_size, line_end) = loop {
                if let Some((size, end)) = find_chunk_size(&buffer)? {
                    break (size, end);
                }
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::protocol(format!("failed to read chunk size: {}", e)))?;
                if n == 0 {
                    return Err(Error::protocol("connection closed while reading chunk size"));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            };

            buffer.drain(..line_end);

            if chunk_size == 0 {
                // last-chunk; trailers (if any) are discarded up to the
                // terminating CRLF
                loop {
                    if buffer.starts_with(b"\r\n") {
                        break;
                    }
                    if let Some(end) = find_header_end(&buffer) {
                        buffer.drain(..end);
                        break;
                    }
                    let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                        Error::protocol(format!("failed to read trailers: {}", e))
                    })?;
                    if n == 0 {
                        break;
                    }
                    buffer.extend_from_slice(&read_buf[..n]);
                }
                return Ok(Bytes::from(body));
            }

            // chunk data + trailing CRLF
            while buffer.len() < chunk_size + 2 {
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::protocol(format!("failed to read chunk: {}", e)))?;
                if n == 0 {
                    return Err(Error::protocol("connection closed mid-chunk"));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }
            body.extend_from_slice(&buffer[..chunk_size]);
            buffer.drain(..chunk_size + 2);
        }
    }
}

/// Build the HTTP/1.1 request head as bytes.
fn build_request(
    method: &Method,
    uri: &Uri,
    headers: &[(String, String)],
    body: Option<&Bytes>,
    target: RequestTarget,
) -> Result<Vec<u8>> {
    let mut request = Vec::with_capacity(1024);

    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    match target {
        RequestTarget::Origin => {
            let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            request.extend_from_slice(path.as_bytes());
        }
        RequestTarget::Absolute => {
            request.extend_from_slice(uri.to_string().as_bytes());
        }
    }
    request.extend_from_slice(b" HTTP/1.1\r\n");

    // Host is required for HTTP/1.1 (RFC 9112 Section 3.2)
    request.extend_from_slice(b"Host: ");
    if let Some(host) = uri.host() {
        request.extend_from_slice(host.as_bytes());
        if let Some(port) = uri.port() {
            request.push(b':');
            request.extend_from_slice(port.as_str().as_bytes());
        }
    }
    request.extend_from_slice(b"\r\n");

    let mut has_connection_header = false;
    let has_transfer_encoding = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("transfer-encoding"));

    for (name, value) in headers {
        // Host was already emitted above
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        if name.eq_ignore_ascii_case("connection") {
            has_connection_header = true;
        }
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    if !has_connection_header {
        request.extend_from_slice(b"Connection: keep-alive\r\n");
    }

    // Content-Length unless the caller framed the body themselves
    if let Some(body) = body {
        if !has_transfer_encoding {
            let has_content_length = headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
            if !has_content_length {
                request.extend_from_slice(b"Content-Length: ");
                request.extend_from_slice(body.len().to_string().as_bytes());
                request.extend_from_slice(b"\r\n");
            }
        }
    }

    request.extend_from_slice(b"\r\n");
    Ok(request)
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Locate a chunk-size line; returns (size, end-of-line offset) once a full
/// line is buffered.
fn find_chunk_size(buffer: &[u8]) -> Result<Option<(usize, usize)>> {
    let Some(line_end) = buffer.windows(2).position(|w| w == b"\r\n") else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buffer[..line_end])
        .map_err(|_| Error::protocol("non-ASCII chunk size line"))?;
    // chunk extensions after ';' are ignored
    let size_str = line.split(';').next().unwrap_or("").trim();
    let size = usize::from_str_radix(size_str, 16)
        .map_err(|_| Error::protocol(format!("invalid chunk size: {}", size_str)))?;
    Ok(Some((size, line_end + 2)))
}

fn parse_content_length(value: &str) -> Result<usize> {
    // Multiple identical values are tolerated; anything else is an error
    let mut result = None;
    for part in value.split(',') {
        let parsed: usize = part
            .trim()
            .parse()
            .map_err(|_| Error::protocol(format!("invalid Content-Length: {}", value)))?;
        match result {
            None => result = Some(parsed),
            Some(prev) if prev == parsed => {}
            Some(_) => {
                return Err(Error::protocol(format!(
                    "conflicting Content-Length values: {}",
                    value
                )))
            }
        }
    }
    result.ok_or_else(|| Error::protocol("empty Content-Length"))
}

fn find_header_value<'a>(headers: &'a [String], name: &str) -> Option<&'a str> {
    headers.iter().find_map(|h| {
        let (key, value) = h.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_origin_form_request_line() {
        let uri: Uri = "http://example.com/a?b=1".parse().unwrap();
        let bytes = build_request(&Method::GET, &uri, &[], None, RequestTarget::Origin).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("GET /a?b=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
    }

    #[test]
    fn builds_absolute_form_for_proxying() {
        let uri: Uri = "http://example.com/a".parse().unwrap();
        let bytes = build_request(&Method::GET, &uri, &[], None, RequestTarget::Absolute).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("GET http://example.com/a HTTP/1.1\r\n"));
    }

    #[test]
    fn content_length_added_for_body() {
        let uri: Uri = "http://example.com/".parse().unwrap();
        let body = Bytes::from_static(b"hello");
        let bytes =
            build_request(&Method::POST, &uri, &[], Some(&body), RequestTarget::Origin).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn chunk_size_line_parses_with_extension() {
        let (size, end) = find_chunk_size(b"1a;ext=1\r\nrest").unwrap().unwrap();
        assert_eq!(size, 0x1a);
        assert_eq!(end, 10);
        assert!(find_chunk_size(b"partial").unwrap().is_none());
    }

    #[test]
    fn content_length_must_agree() {
        assert_eq!(parse_content_length("42").unwrap(), 42);
        assert_eq!(parse_content_length("42, 42").unwrap(), 42);
        assert!(parse_content_length("42, 43").is_err());
        assert!(parse_content_length("nan").is_err());
    }
}
