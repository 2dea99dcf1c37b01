use std::fmt;

use crate::error::{ParseErrorKind, RtspError};

/// Client identification string included in every request
/// per RFC 2326 §12.41.
pub const USER_AGENT: &str = "rtsp-rs-client/0.1";

/// Protocol version written on every request line.
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// RTSP methods issued by the client (RFC 2326 §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::GetParameter => "GET_PARAMETER",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "OPTIONS" => Self::Options,
            "DESCRIBE" => Self::Describe,
            "SETUP" => Self::Setup,
            "PLAY" => Self::Play,
            "PAUSE" => Self::Pause,
            "TEARDOWN" => Self::Teardown,
            "GET_PARAMETER" => Self::GetParameter,
            _ => return None,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Built by the session controller with [`new`](Self::new) and
/// [`add_header`](Self::add_header), then written with
/// [`serialize`](Self::serialize). Immutable once handed to the transport.
/// [`parse`](Self::parse) reads the same format back, which is what a
/// server (or a test double) needs.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspRequest {
    /// RTSP method name as it appears on the wire.
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-given;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspRequest {
    /// Start a request carrying `CSeq` and `User-Agent`.
    pub fn new(method: Method, uri: &str, cseq: u32) -> Self {
        RtspRequest {
            method: method.as_str().to_string(),
            uri: uri.to_string(),
            version: RTSP_VERSION.to_string(),
            headers: vec![
                ("CSeq".to_string(), cseq.to_string()),
                ("User-Agent".to_string(), USER_AGENT.to_string()),
            ],
            body: None,
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a `Session` header when a session id is known.
    pub fn with_session(self, session_id: Option<&str>) -> Self {
        match session_id {
            Some(id) if !id.is_empty() => self.add_header("Session", id),
            _ => self,
        }
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} {}\r\n", self.method, self.uri, self.version);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
            request.push_str("\r\n");
            request.push_str(body);
        } else {
            request.push_str("\r\n");
        }
        request
    }

    /// Parse an RTSP request from its text representation.
    ///
    /// Expects a complete request: request line, headers, and trailing blank
    /// line. Anything after the blank line becomes the body. Returns
    /// [`RtspError::Parse`] on malformed input.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let (head, body) = match raw.find("\r\n\r\n") {
            Some(idx) => (&raw[..idx], &raw[idx + 4..]),
            None => (raw, ""),
        };
        let mut lines = head.lines();

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != RTSP_VERSION {
            tracing::warn!(version, "peer sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();

            headers.push((name, value));
        }

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
            body: (!body.is_empty()).then(|| body.to_string()),
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The CSeq number of this request (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_setup_request() {
        let req = RtspRequest::new(Method::Setup, "rtsp://host/movie/trackID=1", 7)
            .with_session(Some("ABC123"))
            .add_header("Transport", "RTP/AVP;unicast;client_port=5000-5001");
        let s = req.serialize();
        assert!(s.starts_with("SETUP rtsp://host/movie/trackID=1 RTSP/1.0\r\n"));
        assert!(s.contains("CSeq: 7\r\n"));
        assert!(s.contains("Session: ABC123\r\n"));
        assert!(s.contains("Transport: RTP/AVP;unicast;client_port=5000-5001\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
        assert_eq!(req.cseq(), Some(7));
    }

    #[test]
    fn empty_session_is_omitted() {
        let s = RtspRequest::new(Method::Play, "rtsp://h/m", 1)
            .with_session(Some(""))
            .serialize();
        assert!(!s.contains("Session:"));
    }

    #[test]
    fn serialize_with_body() {
        let s = RtspRequest::new(Method::GetParameter, "rtsp://h/m", 3)
            .with_body("position\r\n".to_string())
            .serialize();
        assert!(s.contains("Content-Length: 10\r\n"));
        assert!(s.ends_with("\r\n\r\nposition\r\n"));
    }

    #[test]
    fn parse_round_trips_serialized_request() {
        let raw = RtspRequest::new(Method::Describe, "rtsp://localhost:8554/test", 1)
            .add_header("Accept", "application/sdp")
            .serialize();
        let req = RtspRequest::parse(&raw).unwrap();
        assert_eq!(req.method, "DESCRIBE");
        assert_eq!(req.uri, "rtsp://localhost:8554/test");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.cseq(), Some(1));
        assert_eq!(req.get_header("accept"), Some("application/sdp"));
        assert!(req.body.is_none());
    }

    #[test]
    fn parse_empty_request() {
        assert!(RtspRequest::parse("").is_err());
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse("JUST_A_METHOD\r\n\r\n").is_err());
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::from_name("GET_PARAMETER"), Some(Method::GetParameter));
        assert_eq!(Method::from_name("ANNOUNCE"), None);
        assert_eq!(Method::Teardown.to_string(), "TEARDOWN");
    }
}
