//! Minimal HTTP/1.1 request parsing and response writing.
//!
//! One request per connection. The head is read up to `\r\n\r\n`; the body is
//! only read on demand, and only up to its declared `Content-Length`.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;

const MAX_HEAD_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Bytes of an oversized body drained before closing, so the client sees the response.
const MAX_DRAIN_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub(crate) enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("request body of {length} bytes exceeds {limit} bytes")]
    TooLarge { length: u64, limit: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    /// Body bytes that arrived together with the head.
    body_prefix: Vec<u8>,
    body_consumed: bool,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn content_length(&self) -> Result<u64, RequestError> {
        match self.header("content-length") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| RequestError::Malformed(format!("bad Content-Length '{}'", value))),
            None => Ok(0),
        }
    }

    /// Reject bodies over `limit` before any of the body is stored.
    pub fn check_body_limit(&self, limit: u64) -> Result<u64, RequestError> {
        if self.header("transfer-encoding").is_some() {
            return Err(RequestError::Malformed(
                "chunked uploads are not supported; send Content-Length".to_string(),
            ));
        }
        let length = self.content_length()?;
        if length > limit {
            return Err(RequestError::TooLarge { length, limit });
        }
        Ok(length)
    }

    /// Copy exactly `Content-Length` body bytes from `stream` into `out`.
    pub fn copy_body(&mut self, stream: &mut TcpStream, out: &mut impl Write) -> Result<u64, RequestError> {
        let length = self.content_length()?;
        self.body_consumed = true;
        let prefix = std::mem::take(&mut self.body_prefix);
        let from_prefix = prefix.len().min(length as usize);
        out.write_all(&prefix[..from_prefix])?;

        let remaining = length - from_prefix as u64;
        let copied = std::io::copy(&mut Read::by_ref(stream).take(remaining), out)?;
        if copied != remaining {
            return Err(RequestError::Malformed(format!(
                "body ended after {} of {} bytes",
                from_prefix as u64 + copied,
                length
            )));
        }
        Ok(length)
    }

    /// Reader over exactly `Content-Length` body bytes.
    pub fn body_reader<'a>(
        &mut self,
        stream: &'a mut TcpStream,
    ) -> Result<impl Read + Send + 'a, RequestError> {
        let length = self.content_length()?;
        self.body_consumed = true;
        let mut prefix = std::mem::take(&mut self.body_prefix);
        prefix.truncate(length as usize);
        let remaining = length - prefix.len() as u64;
        Ok(std::io::Cursor::new(prefix).chain(stream.take(remaining)))
    }

    /// Read and discard a body nobody consumed, up to a cap.
    pub fn drain_body(&mut self, stream: &mut TcpStream) {
        if self.body_consumed {
            return;
        }
        self.body_consumed = true;
        let Ok(length) = self.content_length() else {
            return;
        };
        let already = std::mem::take(&mut self.body_prefix).len() as u64;
        let remaining = length.saturating_sub(already).min(MAX_DRAIN_BYTES);
        let _ = std::io::copy(&mut Read::by_ref(stream).take(remaining), &mut std::io::sink());
    }
}

pub(crate) fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, RequestError> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let head_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(RequestError::Malformed("connection closed before end of headers".to_string()));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEAD_BYTES {
            return Err(RequestError::Malformed("request head too large".to_string()));
        }
    };
    let body_prefix = data.split_off(head_end + 4);

    let text = String::from_utf8_lossy(&data[..head_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| RequestError::Malformed("empty request".to_string()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing method".to_string()))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing path".to_string()))?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw_path, HashMap::new()),
    };

    Ok(HttpRequest {
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
        query,
        headers,
        body_prefix,
        body_consumed: false,
    })
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub(crate) struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: serde::Serialize>(status: u16, value: &T) -> anyhow::Result<Self> {
        Ok(Self {
            status,
            content_type: "application/json",
            body: serde_json::to_vec(value)?,
        })
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }
}

pub(crate) fn write_response(
    stream: &mut TcpStream,
    response: &Response,
    extra_headers: &[(&str, String)],
) -> std::io::Result<()> {
    let status_line = match response.status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n",
        status_line = status_line,
        content_type = response.content_type,
        len = response.body.len()
    );
    for (name, value) in extra_headers {
        header.push_str(name);
        header.push_str(": ");
        header.push_str(value);
        header.push_str("\r\n");
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn roundtrip(raw: &'static [u8]) -> (HttpRequest, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(raw).unwrap();
            stream
        });
        let (mut server, _) = listener.accept().unwrap();
        let request = read_request(&mut server).unwrap();
        let _client = client.join().unwrap();
        (request, server)
    }

    #[test]
    fn parses_head_query_and_body() {
        let (mut request, mut stream) = roundtrip(
            b"POST /api/detect?filename=reef%20scan.png&frame_interval=5 HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\nX-Filename: other.png\r\n\r\nabcd",
        );
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/detect");
        assert_eq!(request.query_param("filename"), Some("reef scan.png"));
        assert_eq!(request.query_param("frame_interval"), Some("5"));
        assert_eq!(request.header("X-Filename"), Some("other.png"));

        let mut body = Vec::new();
        assert_eq!(request.copy_body(&mut stream, &mut body).unwrap(), 4);
        assert_eq!(body, b"abcd");
    }

    #[test]
    fn body_reader_stops_at_declared_length() {
        let (mut request, mut stream) =
            roundtrip(b"POST /api/detect HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcdef");
        let mut body = Vec::new();
        request
            .body_reader(&mut stream)
            .unwrap()
            .read_to_end(&mut body)
            .unwrap();
        assert_eq!(body, b"abc");
    }

    #[test]
    fn body_limit_is_checked_from_declared_length() {
        let (request, _stream) =
            roundtrip(b"POST /api/detect HTTP/1.1\r\nContent-Length: 2048\r\n\r\n");
        assert!(matches!(
            request.check_body_limit(1024),
            Err(RequestError::TooLarge { length: 2048, limit: 1024 })
        ));
        assert_eq!(request.check_body_limit(4096).unwrap(), 2048);
    }
}
