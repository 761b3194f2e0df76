//! HTTP message framing classifier
//!
//! Incrementally parses one HTTP message's header block from raw captured
//! bytes and answers whether the message closes its connection under
//! HTTP/1.x persistence rules. Bodies are never parsed.
//!
//! Each instance is single-use: create one per message, `feed` it payload
//! chunks as they arrive (chunk boundaries are arbitrary), then query the
//! closure predicates once parsing is complete. Suspension is explicit:
//! a partial header block leaves the parser in [`ParseStatus::Parsing`]
//! and the next `feed` resumes from the accumulated buffer.

use crate::{MonitorError, Result};

const MAX_HEADERS: usize = 64;

/// Parser lifecycle for one HTTP message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStatus {
    /// No bytes fed yet.
    AwaitingData,

    /// Bytes fed, header block incomplete.
    Parsing,

    /// Header block fully parsed.
    Complete,

    /// Input is not a valid HTTP message; terminal.
    Failed,
}

impl ParseStatus {
    /// True while more data can still complete the message.
    pub fn in_process(self) -> bool {
        matches!(self, Self::AwaitingData | Self::Parsing)
    }
}

impl Default for ParseStatus {
    fn default() -> Self {
        Self::AwaitingData
    }
}

/// A request in a stream of HTTP packets.
///
/// Only the request line and headers are parsed; the body is ignored.
#[derive(Debug, Default)]
pub struct Request {
    buf: Vec<u8>,
    status: ParseStatus,
    connection: Option<String>,
}

impl Request {
    /// Create a parser for a single request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append captured bytes and advance parsing as far as they allow.
    pub fn feed(&mut self, input: &[u8]) -> ParseStatus {
        if !self.status.in_process() {
            return self.status;
        }

        self.buf.extend_from_slice(input);

        if self.buf.is_empty() {
            return self.status;
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut request = httparse::Request::new(&mut headers);

        self.status = match request.parse(&self.buf) {
            Ok(httparse::Status::Complete(_)) => {
                self.connection = join_header(request.headers, "connection");
                ParseStatus::Complete
            }
            Ok(httparse::Status::Partial) => ParseStatus::Parsing,
            Err(_) => ParseStatus::Failed,
        };

        self.status
    }

    /// Is header parsing still in progress?
    pub fn in_process(&self) -> bool {
        self.status.in_process()
    }

    /// Current parser status.
    pub fn status(&self) -> ParseStatus {
        self.status
    }

    /// Did the request ask for an explicit close?
    ///
    /// Errors unless the header block parsed completely.
    pub fn explicit_close(&self) -> Result<bool> {
        ensure_complete(self.status)?;

        Ok(contains_close(self.connection.as_deref()))
    }
}

/// A response in a stream of HTTP packets.
///
/// Only the status line and headers are parsed; the body is ignored.
#[derive(Debug, Default)]
pub struct Response {
    buf: Vec<u8>,
    status: ParseStatus,
    code: u16,
    connection: Option<String>,
    transfer_encoding: Option<String>,
    content_lengths: Vec<String>,
    connect: bool,
}

impl Response {
    /// Create a parser for a single response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser for the response to a CONNECT request.
    ///
    /// A successful CONNECT response carries no body, which changes the
    /// framing decision in [`Response::closed`].
    pub fn for_connect() -> Self {
        Self {
            connect: true,
            ..Self::default()
        }
    }

    /// Append captured bytes and advance parsing as far as they allow.
    pub fn feed(&mut self, input: &[u8]) -> ParseStatus {
        if !self.status.in_process() {
            return self.status;
        }

        self.buf.extend_from_slice(input);

        if self.buf.is_empty() {
            return self.status;
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        self.status = match response.parse(&self.buf) {
            Ok(httparse::Status::Complete(_)) => {
                self.code = response.code.unwrap_or(0);
                self.connection = join_header(response.headers, "connection");
                self.transfer_encoding = join_header(response.headers, "transfer-encoding");
                self.content_lengths = response
                    .headers
                    .iter()
                    .filter(|h| h.name.eq_ignore_ascii_case("content-length"))
                    .map(|h| String::from_utf8_lossy(h.value).trim().to_string())
                    .collect();
                ParseStatus::Complete
            }
            Ok(httparse::Status::Partial) => ParseStatus::Parsing,
            Err(_) => ParseStatus::Failed,
        };

        self.status
    }

    /// Is header parsing still in progress?
    pub fn in_process(&self) -> bool {
        self.status.in_process()
    }

    /// Current parser status.
    pub fn status(&self) -> ParseStatus {
        self.status
    }

    /// Parsed status code.
    ///
    /// Errors unless the header block parsed completely.
    pub fn code(&self) -> Result<u16> {
        ensure_complete(self.status)?;

        Ok(self.code)
    }

    /// Did the response include an explicit close?
    pub fn explicit_close(&self) -> Result<bool> {
        ensure_complete(self.status)?;

        Ok(contains_close(self.connection.as_deref()))
    }

    /// Must the connection close after this response?
    ///
    /// Mirrors observed real-server framing behavior, in precedence order:
    /// an explicit close wins; bodyless status codes keep the connection
    /// open; a non-chunked Transfer-Encoding or an ambiguous Content-Length
    /// cannot be delimited and forces a close; a single well-formed
    /// Content-Length (or chunked encoding) delimits the body; with no
    /// framing information at all the body runs to connection close.
    pub fn closed(&self) -> Result<bool> {
        ensure_complete(self.status)?;

        if contains_close(self.connection.as_deref()) {
            return Ok(true);
        }

        if self.body_forbidden() {
            return Ok(false);
        }

        if let Some(encoding) = &self.transfer_encoding {
            return Ok(!encoding.trim().to_ascii_lowercase().ends_with("chunked"));
        }

        match self.content_lengths.as_slice() {
            [] => Ok(true),
            [length] => Ok(length.is_empty() || !length.bytes().all(|b| b.is_ascii_digit())),
            // duplicate Content-Length: ambiguous framing
            _ => Ok(true),
        }
    }

    fn body_forbidden(&self) -> bool {
        matches!(self.code, 100..=199 | 204 | 304) || (self.connect && (200..300).contains(&self.code))
    }
}

fn ensure_complete(status: ParseStatus) -> Result<()> {
    match status {
        ParseStatus::Complete => Ok(()),
        ParseStatus::Failed => Err(MonitorError::MessageFailed),
        _ => Err(MonitorError::MessageInProcess),
    }
}

/// Join every occurrence of `name` with ", ", the way `Net::HTTP` folds
/// repeated header fields.
fn join_header(headers: &[httparse::Header<'_>], name: &str) -> Option<String> {
    let values: Vec<String> = headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| String::from_utf8_lossy(h.value).to_string())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn contains_close(value: Option<&str>) -> bool {
    value
        .map(|v| v.to_ascii_lowercase().contains("close"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOSE_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n";
    const PLAIN_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: example\r\n\r\n";
    const CLOSE_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n";

    fn complete_response(raw: &[u8]) -> Response {
        let mut response = Response::new();
        assert_eq!(ParseStatus::Complete, response.feed(raw));
        response
    }

    #[test]
    fn test_request_explicit_close() {
        let mut request = Request::new();
        request.feed(CLOSE_REQUEST);

        assert!(!request.in_process());
        assert!(request.explicit_close().unwrap());
    }

    #[test]
    fn test_request_without_connection_header() {
        let mut request = Request::new();
        request.feed(PLAIN_REQUEST);

        assert!(!request.explicit_close().unwrap());
    }

    #[test]
    fn test_request_incremental_feed() {
        let mut request = Request::new();

        assert!(request.in_process(), "no bytes fed");
        assert_eq!(ParseStatus::AwaitingData, request.status());

        for chunk in CLOSE_REQUEST.chunks(7) {
            assert!(request.in_process());
            request.feed(chunk);
        }

        assert!(!request.in_process(), "complete request fed");
        assert!(request.explicit_close().unwrap());
    }

    #[test]
    fn test_request_query_while_parsing() {
        let mut request = Request::new();
        request.feed(b"GET / HT");

        assert_eq!(ParseStatus::Parsing, request.status());
        assert!(matches!(
            request.explicit_close(),
            Err(MonitorError::MessageInProcess)
        ));
    }

    #[test]
    fn test_response_explicit_close() {
        let response = complete_response(CLOSE_RESPONSE);

        assert!(response.explicit_close().unwrap());
        assert!(response.closed().unwrap());
    }

    #[test]
    fn test_response_no_content() {
        let response = complete_response(b"HTTP/1.1 204 No Content\r\n\r\n");

        assert!(!response.closed().unwrap());
    }

    #[test]
    fn test_response_not_modified() {
        let response = complete_response(b"HTTP/1.1 304 Not Modified\r\n\r\n");

        assert!(!response.closed().unwrap());
    }

    #[test]
    fn test_response_content_length() {
        let response = complete_response(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\n");

        assert!(!response.closed().unwrap());
    }

    #[test]
    fn test_response_duplicate_content_length() {
        let response = complete_response(
            b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\n",
        );

        assert!(response.closed().unwrap());
    }

    #[test]
    fn test_response_invalid_content_length() {
        let response = complete_response(b"HTTP/1.1 200 OK\r\nContent-Length: -1\r\n\r\n");

        assert!(response.closed().unwrap());
    }

    #[test]
    fn test_response_chunked() {
        let response =
            complete_response(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");

        assert!(!response.closed().unwrap());
    }

    #[test]
    fn test_response_gzip_then_chunked() {
        let response = complete_response(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n",
        );

        assert!(!response.closed().unwrap());
    }

    #[test]
    fn test_response_unknown_transfer_encoding() {
        let response =
            complete_response(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n");

        assert!(response.closed().unwrap());
    }

    #[test]
    fn test_response_no_framing_headers() {
        let response = complete_response(b"HTTP/1.1 200 OK\r\n\r\n");

        assert!(response.closed().unwrap());
    }

    #[test]
    fn test_response_connect_success() {
        let mut response = Response::for_connect();
        response.feed(b"HTTP/1.1 200 Connection Established\r\n\r\n");

        assert!(!response.closed().unwrap());
    }

    #[test]
    fn test_response_incremental_feed() {
        let mut response = Response::new();

        assert_eq!(ParseStatus::AwaitingData, response.status());

        for &byte in CLOSE_RESPONSE {
            response.feed(&[byte]);
        }

        assert_eq!(ParseStatus::Complete, response.status());
        assert_eq!(200, response.code().unwrap());
        assert!(response.closed().unwrap());
    }

    #[test]
    fn test_response_idempotent_queries() {
        let mut response = complete_response(CLOSE_RESPONSE);

        for _ in 0..3 {
            assert!(!response.in_process());
            assert!(response.closed().unwrap());
        }

        // terminal state ignores further input
        assert_eq!(ParseStatus::Complete, response.feed(b"trailing"));
        assert!(response.closed().unwrap());
    }

    #[test]
    fn test_response_malformed() {
        let mut response = Response::new();
        response.feed(b"not an http response\r\n\r\n");

        assert_eq!(ParseStatus::Failed, response.status());
        assert!(!response.in_process());
        assert!(matches!(
            response.closed(),
            Err(MonitorError::MessageFailed)
        ));
    }
}
