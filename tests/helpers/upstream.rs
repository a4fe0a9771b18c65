//! A scripted HTTP/1.1 upstream for engine tests.
//!
//! Handles keep-alive connections and routes a small set of httpbin-shaped
//! paths: statuses, redirect chains, loops, echo, cookies, and encodings.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

pub struct MockUpstream {
    listener: TcpListener,
    port: u16,
}

impl MockUpstream {
    /// Bind to a random localhost port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    #[allow(dead_code)]
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Serve connections until the test runtime shuts down.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream));
                    }
                    Err(_) => break,
                }
            }
        })
    }
}

/// Spawn a running upstream and return its base URL.
#[allow(dead_code)]
pub async fn start_upstream() -> String {
    let server = MockUpstream::new().await.expect("bind mock upstream");
    let url = server.url();
    server.start();
    url
}

async fn handle_connection(mut stream: TcpStream) {
    let mut buffer: Vec<u8> = Vec::with_capacity(8192);
    loop {
        // Read one request head (plus whatever body bytes arrive with it)
        let head_end = loop {
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let mut read_buf = [0u8; 8192];
            let n = match timeout(Duration::from_secs(5), stream.read(&mut read_buf)).await {
                Ok(Ok(n)) => n,
                _ => return,
            };
            if n == 0 {
                return;
            }
            buffer.extend_from_slice(&read_buf[..n]);
        };

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut request = httparse::Request::new(&mut headers);
        if request.parse(&buffer[..head_end]).is_err() {
            return;
        }
        let method = request.method.unwrap_or("GET").to_string();
        let target = request.path.unwrap_or("/").to_string();
        let header_map: HashMap<String, String> = request
            .headers
            .iter()
            .filter(|h| !h.name.is_empty())
            .map(|h| {
                (
                    h.name.to_lowercase(),
                    String::from_utf8_lossy(h.value).to_string(),
                )
            })
            .collect();

        let content_length: usize = header_map
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        while buffer.len() < head_end + content_length {
            let mut read_buf = [0u8; 8192];
            let n = match timeout(Duration::from_secs(5), stream.read(&mut read_buf)).await {
                Ok(Ok(n)) => n,
                _ => return,
            };
            if n == 0 {
                return;
            }
            buffer.extend_from_slice(&read_buf[..n]);
        }
        let body = buffer[head_end..head_end + content_length].to_vec();
        buffer.drain(..head_end + content_length);

        let response = route(&method, &target, &header_map, &body).await;
        if stream.write_all(&response).await.is_err() {
            return;
        }
        if stream.flush().await.is_err() {
            return;
        }
    }
}

async fn route(
    method: &str,
    target: &str,
    headers: &HashMap<String, String>,
    body: &[u8],
) -> Vec<u8> {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let params = parse_query(query);

    if path == "/get" {
        let payload = serde_json::json!({"url": "/get", "method": method});
        return json_response(200, &payload, &[]);
    }

    if let Some(code) = path.strip_prefix("/status/") {
        let code: u16 = code.parse().unwrap_or(200);
        return response(code, &[], b"");
    }

    if let Some(n) = path.strip_prefix("/redirect/") {
        let n: u32 = n.parse().unwrap_or(1);
        let location = if n > 1 {
            format!("/redirect/{}", n - 1)
        } else {
            "/get".to_string()
        };
        return response(302, &[("Location", &location)], b"");
    }

    if path == "/redirect-to" {
        let location = params.get("url").cloned().unwrap_or_else(|| "/get".into());
        let status: u16 = params
            .get("status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(302);
        return response(status, &[("Location", &location)], b"");
    }

    if path == "/loop/a" {
        return response(302, &[("Location", "/loop/b")], b"");
    }
    if path == "/loop/b" {
        return response(302, &[("Location", "/loop/a")], b"");
    }
    if path == "/missing-location" {
        return response(302, &[], b"");
    }

    if path == "/echo" {
        let payload = serde_json::json!({
            "method": method,
            "body": String::from_utf8_lossy(body),
            "cookie": headers.get("cookie").cloned().unwrap_or_default(),
            "authorization": headers.get("authorization").cloned(),
        });
        return json_response(200, &payload, &[]);
    }

    if path == "/cookies/set" {
        let set_cookie: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| {
                (
                    "Set-Cookie".to_string(),
                    format!("{}={}; Path=/", k, v),
                )
            })
            .collect();
        let set_cookie_refs: Vec<(&str, &str)> = set_cookie
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let payload = serde_json::json!({"set": params});
        return json_response(200, &payload, &set_cookie_refs);
    }

    if path == "/cookies" {
        let payload = serde_json::json!({
            "cookie": headers.get("cookie").cloned().unwrap_or_default(),
        });
        return json_response(200, &payload, &[]);
    }

    if path == "/slow" {
        tokio::time::sleep(Duration::from_secs(1)).await;
        return response(200, &[], b"slept");
    }

    if path == "/gzip" {
        let payload = serde_json::to_vec(&serde_json::json!({"gzipped": true})).unwrap();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();
        return response(
            200,
            &[
                ("Content-Type", "application/json"),
                ("Content-Encoding", "gzip"),
            ],
            &compressed,
        );
    }

    response(404, &[], b"not found")
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

fn json_response(status: u16, payload: &serde_json::Value, extra: &[(&str, &str)]) -> Vec<u8> {
    let body = serde_json::to_vec(payload).unwrap();
    let mut headers = vec![("Content-Type", "application/json")];
    headers.extend_from_slice(extra);
    response(status, &headers, &body)
}

fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        404 => "Not Found",
        _ => "Status",
    };
    let mut out = format!("HTTP/1.1 {} {}\r\n", status, reason).into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"Connection: keep-alive\r\n\r\n");
    out.extend_from_slice(body);
    out
}
