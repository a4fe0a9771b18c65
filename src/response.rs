//! Upstream response representation with explicit content decoding.

use bytes::Bytes;
use std::io::Read;

use crate::error::{Error, Result};

/// One upstream exchange's response: status, raw header lines, and the
/// transfer-decoded (but still content-encoded) body bytes.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Header lines in wire order, as `Name: value`.
    pub headers: Vec<String>,
    body: Bytes,
    http_version: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, headers: Vec<String>, body: Bytes, http_version: String) -> Self {
        Self {
            status,
            headers,
            body,
            http_version,
        }
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// First value of a header, case-insensitive.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        for header in &self.headers {
            if let Some((key, value)) = header.split_once(':') {
                if key.trim().to_lowercase() == name_lower {
                    return Some(value.trim());
                }
            }
        }
        None
    }

    /// All values of a header, case-insensitive (Set-Cookie repeats).
    pub fn get_headers(&self, name: &str) -> Vec<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .filter_map(|h| {
                let (key, value) = h.split_once(':')?;
                if key.trim().to_lowercase() == name_lower {
                    Some(value.trim())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Unparsed `Set-Cookie` directive lines, for jar-side RFC 6265 parsing.
    pub fn set_cookie_lines(&self) -> Vec<String> {
        self.get_headers("set-cookie")
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get_header("Content-Encoding")
    }

    /// Decode the body per Content-Encoding (gzip, deflate, br, zstd).
    ///
    /// Falls back to magic-byte sniffing when the header is absent; some
    /// origins compress without declaring it.
    pub fn decoded_body(&self) -> Result<Bytes> {
        match self.content_encoding().map(|s| s.to_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => decode_gzip(&self.body),
            Some("deflate") => decode_deflate(&self.body),
            Some("br") => decode_brotli(&self.body),
            Some("zstd") => decode_zstd(&self.body),
            _ => {
                if self.body.len() >= 4
                    && self.body[0] == 0x28
                    && self.body[1] == 0xB5
                    && self.body[2] == 0x2F
                    && self.body[3] == 0xFD
                {
                    return decode_zstd(&self.body);
                }
                if self.body.len() >= 2 && self.body[0] == 0x1f && self.body[1] == 0x8b {
                    return decode_gzip(&self.body);
                }
                Ok(self.body.clone())
            }
        }
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::decode(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    // Servers send both zlib-wrapped and raw deflate under this token.
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::decode(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::decode(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    zstd::stream::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| Error::decode(format!("zstd: {}", e)))
}
