//! Client-side RTSP session state (RFC 2326 §3, §12.37, §A.1).
//!
//! A session is established by the first SETUP reply and lives until
//! TEARDOWN or until the control connection closes. It tracks:
//!
//! - The server-assigned session ID (absent for stateless servers).
//! - The CSeq counter, incremented once per issued request.
//! - The session timeout (default 60s, per RFC 2326 §12.37).
//! - The content base and playable range from DESCRIBE.
//! - One [`Track`] per media description.
//!
//! ## Controller lifecycle
//!
//! ```text
//! Idle -> Connecting -> Described -> SettingUp -> Ready
//! Ready/Paused -> Playing        (PLAY)
//! Playing      -> Paused         (PAUSE)
//! any          -> TearingDown -> Closed
//! ```

pub mod port;
pub mod track;
pub mod transport;

use std::time::Duration;

use url::Url;

use crate::error::{Result, RtspError};
use crate::locator::RtspUrl;
use crate::protocol::Range;
pub use port::PortAllocator;
pub use track::{ReceiverFailurePolicy, SessionHealth, Track, TrackStream};
pub use transport::TransportHeader;

/// Default session timeout in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Session controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected yet.
    Idle,
    /// Control connection open, DESCRIBE in flight.
    Connecting,
    /// Session description received.
    Described,
    /// Issuing SETUP for each track.
    SettingUp,
    /// All tracks set up; media not flowing.
    Ready,
    /// PLAY acknowledged.
    Playing,
    /// PAUSE acknowledged; can resume via PLAY.
    Paused,
    /// TEARDOWN in progress.
    TearingDown,
    /// Resources released. A new `connect()` may start over.
    Closed,
}

/// Negotiated state of one RTSP session, owned by the controller.
#[derive(Debug)]
pub struct Session {
    /// Server-assigned identifier from the first SETUP reply.
    pub id: Option<String>,
    next_cseq: u32,
    /// Session timeout in seconds.
    pub timeout_secs: u64,
    /// Base URL for relative track control URLs.
    pub content_base: Url,
    /// Aggregate control URL for PLAY/PAUSE/TEARDOWN.
    pub control_url: String,
    pub range: Option<Range>,
    pub tracks: Vec<Track>,
}

impl Session {
    pub fn new(url: &RtspUrl, initial_cseq: u32) -> Self {
        Session {
            id: None,
            next_cseq: initial_cseq,
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            content_base: url.as_url().clone(),
            control_url: url.as_str().to_string(),
            range: None,
            tracks: Vec::new(),
        }
    }

    /// CSeq for the next request; each call advances the counter by one.
    pub fn next_cseq(&mut self) -> u32 {
        let cseq = self.next_cseq;
        self.next_cseq = self.next_cseq.wrapping_add(1);
        cseq
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Playable duration; `None` when unknown (live, open-ended or absent
    /// range).
    pub fn duration(&self) -> Option<Duration> {
        self.range.as_ref().and_then(Range::duration)
    }

    /// Resolve a track control attribute against the content base.
    ///
    /// Absolute URLs are used as-is and `*` means the base itself.
    pub fn resolve_control(&self, control: Option<&str>) -> Result<String> {
        resolve_control(&self.content_base, control).map(String::from)
    }

    /// Stop every track's receiver. Idempotent.
    pub fn release_tracks(&mut self) {
        for track in self.tracks.drain(..) {
            track.receiver().stop();
        }
    }
}

/// Join a control attribute to a base URL (RFC 2326 §C.1.1).
///
/// A control that parses as a URL on its own is absolute. Anything else is
/// appended to the base with a single `/` (not RFC 3986 reference
/// resolution, which would drop the last base segment).
pub fn resolve_control(base: &Url, control: Option<&str>) -> Result<Url> {
    let control = match control.map(str::trim) {
        None | Some("") | Some("*") => return Ok(base.clone()),
        Some(control) => control,
    };
    if let Ok(absolute) = Url::parse(control) {
        return Ok(absolute);
    }

    let separator = if base.as_str().ends_with('/') { "" } else { "/" };
    Url::parse(&format!(
        "{}{}{}",
        base.as_str(),
        separator,
        control.trim_start_matches('/')
    ))
    .map_err(|e| {
        RtspError::MalformedDescription(format!(
            "cannot join control {control:?} to {base}: {e}"
        ))
    })
}
