use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::sdp::SessionDescription;
use crate::session::transport::TransportHeader;

/// An RTSP response (RFC 2326 §7).
///
/// The client receives these from the control connection and reads them
/// through [`parse`](Self::parse); the builder half
/// ([`new`](Self::new), [`add_header`](Self::add_header),
/// [`serialize`](Self::serialize)) produces the same text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Parsed responses are read-only.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Value of the `Session` response header (RFC 2326 §12.37).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    pub id: String,
    /// `;timeout=N` in seconds, when the server sent one.
    pub timeout_secs: Option<u64>,
}

impl SessionHeader {
    /// Parse `"ID"` or `"ID;timeout=N"`.
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(';');
        let id = parts.next().unwrap_or("").trim().to_string();
        let timeout_secs = parts
            .filter_map(|p| p.trim().strip_prefix("timeout="))
            .find_map(|t| t.trim().parse().ok());
        SessionHeader { id, timeout_secs }
    }
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// 200 OK, success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
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
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }

    /// Parse one complete response: status line, headers, blank line and
    /// the body bytes announced by `Content-Length` (already framed by the
    /// caller).
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, body) = split_head(raw);
        let head = std::str::from_utf8(head).map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidEncoding,
        })?;

        let mut lines = head.lines().skip_while(|l| l.trim().is_empty());
        let status_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;

        let mut parts = status_line.trim().splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        if !version.starts_with("RTSP/") {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            });
        }
        let status_code: u16 = parts
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            })?;
        let status_text = parts.next().unwrap_or("").trim().to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let body = (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned());

        Ok(RtspResponse {
            status_code,
            status_text,
            headers,
            body,
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the status code is in the 2xx class.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Echoed CSeq. Servers sometimes omit it on error replies.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    pub fn session(&self) -> Option<SessionHeader> {
        self.get_header("Session").map(SessionHeader::parse)
    }

    /// Base URL for relative `a=control` attributes: `Content-Base`, then
    /// `Content-Location` (RFC 2326 §C.1.1).
    pub fn content_base(&self) -> Option<&str> {
        self.get_header("Content-Base")
            .or_else(|| self.get_header("Content-Location"))
            .filter(|v| !v.is_empty())
    }

    pub fn transport(&self) -> Option<TransportHeader> {
        self.get_header("Transport").and_then(TransportHeader::parse)
    }

    /// Parse the body as a session description, if there is one.
    pub fn sdp(&self) -> Option<Result<SessionDescription>> {
        self.body.as_deref().map(SessionDescription::parse)
    }

    /// Map a non-success status into [`RtspError::Protocol`].
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RtspError::Protocol {
                code: self.status_code,
                text: self.status_text,
            })
        }
    }
}

/// Split at the first blank line. Without one the whole input is the head.
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(idx) = find(raw, b"\r\n\r\n") {
        return (&raw[..idx], &raw[idx + 4..]);
    }
    if let Some(idx) = find(raw, b"\n\n") {
        return (&raw[..idx], &raw[idx + 2..]);
    }
    (raw, &[])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setup_reply() {
        let raw = b"RTSP/1.0 200 OK\r\n\
                    CSeq: 3\r\n\
                    Session: 12345678;timeout=30\r\n\
                    Transport: RTP/AVP;unicast;client_port=6000-6001;server_port=5000-5001\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.status_text, "OK");
        assert!(resp.is_success());
        assert_eq!(resp.cseq(), Some(3));
        assert_eq!(
            resp.session(),
            Some(SessionHeader {
                id: "12345678".to_string(),
                timeout_secs: Some(30),
            })
        );
        let transport = resp.transport().unwrap();
        assert_eq!(transport.client_rtp_port, 6000);
        assert_eq!(transport.server_rtp_port, Some(5000));
        assert!(resp.body.is_none());
    }

    #[test]
    fn parse_describe_reply_with_body() {
        let body = "v=0\r\nm=video 0 RTP/AVP 96\r\n";
        let raw = RtspResponse::ok()
            .add_header("CSeq", "2")
            .add_header("Content-Base", "rtsp://host/movie/")
            .add_header("Content-Type", "application/sdp")
            .with_body(body.to_string())
            .serialize();
        let resp = RtspResponse::parse(raw.as_bytes()).unwrap();
        assert_eq!(resp.content_base(), Some("rtsp://host/movie/"));
        assert_eq!(resp.body.as_deref(), Some(body));
        let sdp = resp.sdp().unwrap().unwrap();
        assert_eq!(sdp.media_count(), 1);
    }

    #[test]
    fn status_text_keeps_spaces() {
        let resp = RtspResponse::parse(b"RTSP/1.0 454 Session Not Found\r\n\r\n").unwrap();
        assert_eq!(resp.status_code, 454);
        assert_eq!(resp.status_text, "Session Not Found");
        assert_eq!(resp.cseq(), None);
        match resp.into_success() {
            Err(RtspError::Protocol { code, text }) => {
                assert_eq!(code, 454);
                assert_eq!(text, "Session Not Found");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn content_location_fallback() {
        let resp =
            RtspResponse::parse(b"RTSP/1.0 200 OK\r\nContent-Location: rtsp://h/x/\r\n\r\n")
                .unwrap();
        assert_eq!(resp.content_base(), Some("rtsp://h/x/"));
    }

    #[test]
    fn session_without_timeout() {
        let header = SessionHeader::parse("ABCDEF");
        assert_eq!(header.id, "ABCDEF");
        assert_eq!(header.timeout_secs, None);
    }

    #[test]
    fn rejects_request_as_response() {
        assert!(RtspResponse::parse(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").is_err());
        assert!(RtspResponse::parse(b"RTSP/1.0 abc OK\r\n\r\n").is_err());
        assert!(RtspResponse::parse(b"").is_err());
    }
}
