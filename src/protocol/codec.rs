//! Handshake codec
//!
//! Builds and parses the HTTP/1.1 upgrade request/response pair. Everything
//! here except [`read_request`] is a pure function over byte buffers.
//!
//! ```text
//! GET <path> HTTP/1.1\r\n
//! User-Agent: AoHTTP\r\n
//! Connection: Upgrade\r\n
//! Upgrade: <token>\r\n
//! Host: <host>\r\n
//! \r\n
//!
//! HTTP/1.1 101 Switching Protocols\r\n
//! \r\n
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::Result;
use crate::error::Error;

/// User-Agent sent by the initiator
pub const USER_AGENT: &str = "AoHTTP";

/// Upper bound on the request line + header section the acceptor will buffer
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Upper bound on the number of request headers
pub const MAX_HEADERS: usize = 64;

const HTTP_VERSION: &str = "HTTP/1.1";
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

// ============================================================================
// Responses
// ============================================================================

/// The canned responses the acceptor can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    SwitchingProtocols,
    BadRequest,
    NotFound,
    UpgradeRequired,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::SwitchingProtocols => 101,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::UpgradeRequired => 426,
            Status::InternalServerError => 500,
        }
    }

    /// Reason phrase exactly as put on the wire
    pub fn reason(self) -> &'static str {
        match self {
            Status::SwitchingProtocols => "Switching Protocols",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not found",
            Status::UpgradeRequired => "Upgrade required",
            Status::InternalServerError => "Internal server error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Render a canned response: the status line and an empty header section.
pub fn encode_status_line(status: Status) -> Vec<u8> {
    format!("{} {}\r\n\r\n", HTTP_VERSION, status).into_bytes()
}

/// Status line of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub reason: String,
}

impl StatusLine {
    /// `101 Switching Protocols`, compared literally
    pub fn is_switching_protocols(&self) -> bool {
        self.code == Status::SwitchingProtocols.code()
            && self.reason == Status::SwitchingProtocols.reason()
    }
}

/// Parse the first line of a response buffer as `HTTP/1.1 <code> <reason>`.
///
/// Headers after the status line are not looked at.
pub fn decode_response_status_line(buf: &[u8]) -> Result<StatusLine> {
    let end = find(buf, b"\r\n")
        .ok_or_else(|| Error::MalformedResponse("no complete status line".into()))?;
    let line = std::str::from_utf8(&buf[..end])
        .map_err(|_| Error::MalformedResponse("status line is not valid UTF-8".into()))?;

    let rest = line
        .strip_prefix(HTTP_VERSION)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| Error::MalformedResponse(format!("not an {} status line: {:?}", HTTP_VERSION, line)))?;

    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedResponse(format!("invalid status code: {:?}", code)));
    }
    let code = code
        .parse()
        .map_err(|_| Error::MalformedResponse(format!("invalid status code: {:?}", code)))?;

    Ok(StatusLine {
        code,
        reason: reason.to_string(),
    })
}

/// Offset just past the blank line ending a message head, if present.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    find(buf, HEAD_TERMINATOR).map(|pos| pos + HEAD_TERMINATOR.len())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ============================================================================
// Requests
// ============================================================================

/// Build the initiator's upgrade request. Byte-for-byte deterministic.
pub fn encode_request(path: &str, host: &str, upgrade: &str) -> Vec<u8> {
    format!(
        "GET {} {}\r\nUser-Agent: {}\r\nConnection: Upgrade\r\nUpgrade: {}\r\nHost: {}\r\n\r\n",
        path, HTTP_VERSION, USER_AGENT, upgrade, host
    )
    .into_bytes()
}

/// A parsed request line and header section
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Method from the request line
    pub method: String,
    /// Request target as sent (origin-form or absolute-form)
    pub target: String,
    /// Headers in the order received
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// First value of a header, matching the name case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Host header, empty when absent
    pub fn host(&self) -> &str {
        self.header("Host").unwrap_or("")
    }
}

/// Parse a request head from a buffer and return `None` when incomplete.
///
/// Returns the length of the head and the request.
pub fn parse_request(buf: &[u8]) -> Result<Option<(usize, UpgradeRequest)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let head_len = match req
        .parse(buf)
        .map_err(|e| Error::MalformedRequest(e.to_string()))?
    {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(len) => len,
    };

    let method = req
        .method
        .ok_or_else(|| Error::MalformedRequest("missing method".into()))?;
    let target = req
        .path
        .ok_or_else(|| Error::MalformedRequest("missing request target".into()))?;
    if !(target.starts_with('/') || target == "*" || target.contains("://")) {
        return Err(Error::MalformedRequest(format!(
            "invalid request target: {:?}",
            target
        )));
    }

    // Values may carry obs-text
    let headers = req
        .headers
        .iter()
        .map(|h| {
            let value = String::from_utf8_lossy(h.value);
            (h.name.to_string(), value.trim().to_string())
        })
        .collect();

    Ok(Some((
        head_len,
        UpgradeRequest {
            method: method.to_string(),
            target: target.to_string(),
            headers,
        },
    )))
}

/// Read and parse one request head from `reader`.
///
/// Returns the request and any bytes that arrived after its head.
pub async fn read_request<R>(reader: &mut R) -> Result<(UpgradeRequest, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if buf.len() >= MAX_REQUEST_HEAD {
            return Err(Error::MalformedRequest(format!(
                "header section exceeds {} bytes",
                MAX_REQUEST_HEAD
            )));
        }

        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::MalformedRequest(if buf.is_empty() {
                "connection closed before request".into()
            } else {
                "connection closed mid-request".into()
            }));
        }

        if let Some((head_len, request)) = parse_request(&buf)? {
            if head_len > MAX_REQUEST_HEAD {
                return Err(Error::MalformedRequest(format!(
                    "header section exceeds {} bytes",
                    MAX_REQUEST_HEAD
                )));
            }
            let _head = buf.split_to(head_len);
            return Ok((request, buf.freeze()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_encode_request_wire_format() {
        let request = encode_request("/aohttp", "localhost", "aohttp");
        assert_eq!(
            request,
            b"GET /aohttp HTTP/1.1\r\nUser-Agent: AoHTTP\r\nConnection: Upgrade\r\nUpgrade: aohttp\r\nHost: localhost\r\n\r\n"
        );
    }

    #[test]
    fn test_canned_responses() {
        assert_eq!(
            encode_status_line(Status::SwitchingProtocols),
            b"HTTP/1.1 101 Switching Protocols\r\n\r\n"
        );
        assert_eq!(encode_status_line(Status::BadRequest), b"HTTP/1.1 400 Bad Request\r\n\r\n");
        assert_eq!(encode_status_line(Status::NotFound), b"HTTP/1.1 404 Not found\r\n\r\n");
        assert_eq!(
            encode_status_line(Status::UpgradeRequired),
            b"HTTP/1.1 426 Upgrade required\r\n\r\n"
        );
        assert_eq!(
            encode_status_line(Status::InternalServerError),
            b"HTTP/1.1 500 Internal server error\r\n\r\n"
        );
    }

    #[test]
    fn test_decode_status_line() {
        let line = decode_response_status_line(b"HTTP/1.1 101 Switching Protocols\r\n\r\n").unwrap();
        assert!(line.is_switching_protocols());

        let line = decode_response_status_line(b"HTTP/1.1 426 Upgrade required\r\nX: y\r\n").unwrap();
        assert_eq!(line.code, 426);
        assert_eq!(line.reason, "Upgrade required");
        assert!(!line.is_switching_protocols());
    }

    #[test]
    fn test_switching_protocols_is_case_sensitive() {
        let line = decode_response_status_line(b"HTTP/1.1 101 switching protocols\r\n\r\n").unwrap();
        assert!(!line.is_switching_protocols());
    }

    #[test]
    fn test_decode_malformed_status_line() {
        for buf in [
            &b"HTTP/1.1 101 Switching Protocols"[..],
            b"HTTP/1.0 101 Switching Protocols\r\n",
            b"SSH-2.0-OpenSSH_9.6\r\n",
            b"HTTP/1.1 1x1 Nope\r\n",
            b"",
        ] {
            assert!(
                matches!(decode_response_status_line(buf), Err(Error::MalformedResponse(_))),
                "accepted {:?}",
                String::from_utf8_lossy(buf)
            );
        }
    }

    #[test]
    fn test_find_head_end() {
        assert_eq!(find_head_end(b"HTTP/1.1 101 Switching Protocols\r\n\r\nabc"), Some(36));
        assert_eq!(find_head_end(b"HTTP/1.1 101 Switching Protocols\r\n"), None);
    }

    #[test]
    fn test_parse_request() {
        let buf = encode_request("/aohttp", "example.com", "aohttp");
        let (len, request) = parse_request(&buf).unwrap().unwrap();
        assert_eq!(len, buf.len());
        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/aohttp");
        assert_eq!(request.header("connection"), Some("Upgrade"));
        assert_eq!(request.header("UPGRADE"), Some("aohttp"));
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.header("X-Missing"), None);
    }

    #[test]
    fn test_parse_request_with_latin1_header_value() {
        let buf = b"GET /aohttp HTTP/1.1\r\nUser-Agent: caf\xe9\r\nConnection: Upgrade\r\nUpgrade: aohttp\r\n\r\n";
        let (len, request) = parse_request(buf).unwrap().unwrap();
        assert_eq!(len, buf.len());
        assert_eq!(request.header("User-Agent"), Some("caf\u{fffd}"));
        assert_eq!(request.header("Upgrade"), Some("aohttp"));
    }

    #[test]
    fn test_parse_too_many_headers() {
        let mut buf = b"GET /aohttp HTTP/1.1\r\n".to_vec();
        for i in 0..=MAX_HEADERS {
            buf.extend_from_slice(format!("X-H{}: v\r\n", i).as_bytes());
        }
        buf.extend_from_slice(b"\r\n");

        assert!(matches!(parse_request(&buf), Err(Error::MalformedRequest(_))));
    }

    #[test]
    fn test_parse_partial_request() {
        assert!(parse_request(b"GET /aohttp HTTP/1.1\r\nHost: a\r\n").unwrap().is_none());
    }

    #[test]
    fn test_parse_invalid_request() {
        assert!(matches!(
            parse_request(b"NOT AN HTTP REQUEST\r\n\r\n"),
            Err(Error::MalformedRequest(_))
        ));
        assert!(matches!(
            parse_request(b"GET aohttp HTTP/1.1\r\n\r\n"),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_read_request_keeps_trailing_bytes() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut wire = encode_request("/aohttp", "localhost", "aohttp");
        wire.extend_from_slice(b"early");
        client.write_all(&wire).await.unwrap();

        let (request, rest) = read_request(&mut server).await.unwrap();
        assert_eq!(request.target, "/aohttp");
        assert_eq!(&rest[..], b"early");
    }

    #[tokio::test]
    async fn test_read_request_rejects_oversized_head() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let mut wire = b"GET /aohttp HTTP/1.1\r\n".to_vec();
        wire.extend_from_slice(format!("X-Pad: {}\r\n", "a".repeat(MAX_REQUEST_HEAD)).as_bytes());
        client.write_all(&wire).await.unwrap();

        let result = read_request(&mut server).await;
        assert!(matches!(result, Err(Error::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn test_read_request_on_closed_connection() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result = read_request(&mut server).await;
        assert!(matches!(result, Err(Error::MalformedRequest(_))));
    }
}
