//! Error types for the RTSP client library.

use std::fmt;

/// Errors that can occur in the RTSP client library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Control channel**: [`ConnectFailure`](Self::ConnectFailure),
///   [`Protocol`](Self::Protocol), [`Timeout`](Self::Timeout),
///   [`Interrupted`](Self::Interrupted), [`Parse`](Self::Parse).
/// - **Session description**: [`MalformedDescription`](Self::MalformedDescription).
/// - **Media transport**: [`Bind`](Self::Bind), [`PortExhausted`](Self::PortExhausted),
///   [`TrackClosed`](Self::TrackClosed).
/// - **Controller**: [`NotConnected`](Self::NotConnected),
///   [`InvalidState`](Self::InvalidState), [`SessionFailed`](Self::SessionFailed).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The control connection to the server could not be opened.
    #[error("cannot connect to {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server answered with a non-success status code.
    #[error("RTSP error {code}: '{text}'")]
    Protocol { code: u16, text: String },

    /// No reply arrived within the request timeout, or the reply carried
    /// nothing usable.
    #[error("no usable reply to {method}")]
    Timeout { method: String },

    /// The session description failed to parse or lacks required media data.
    #[error("malformed session description: {0}")]
    MalformedDescription(String),

    /// Every port in the allocation range was tried without a successful bind.
    #[error("no bindable UDP port after {attempts} attempts")]
    PortExhausted { attempts: usize },

    /// A single UDP port could not be bound. Recoverable by retrying with
    /// another port.
    #[error("cannot bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The caller's wait was aborted because the control channel closed.
    #[error("request interrupted")]
    Interrupted,

    /// Failed to parse an RTSP message (RFC 2326 §6, §7).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The locator is not a usable `rtsp://` URL.
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    /// The operation needs an open session.
    #[error("not connected")]
    NotConnected,

    /// The operation is not allowed in the controller's current state.
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        state: crate::session::SessionState,
        operation: &'static str,
    },

    /// The track's receiver stopped and its queue is drained.
    #[error("track {track} closed")]
    TrackClosed { track: usize },

    /// Media delivery failed for the whole session.
    #[error("session failed: media receivers stopped")]
    SessionFailed,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `Version Code Text` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// Header block was not valid UTF-8.
    InvalidEncoding,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidEncoding => write!(f, "header block is not UTF-8"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
