use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::Packet;
use crate::protocol::PayloadFormat;
use crate::transport::RtpReceiver;

/// One media stream of the session, created during SETUP.
#[derive(Clone)]
pub struct Track {
    pub index: usize,
    /// Absolute URL the SETUP request targeted.
    pub control_url: String,
    pub payload_type: Option<u8>,
    pub format: Option<PayloadFormat>,
    /// e.g. `video/H264`; `None` when the description did not say.
    pub content_descriptor: Option<String>,
    receiver: Arc<RtpReceiver>,
}

impl Track {
    pub(crate) fn new(
        index: usize,
        control_url: String,
        payload_type: Option<u8>,
        format: Option<PayloadFormat>,
        content_descriptor: Option<String>,
        receiver: Arc<RtpReceiver>,
    ) -> Self {
        Self {
            index,
            control_url,
            payload_type,
            format,
            content_descriptor,
            receiver,
        }
    }

    pub fn receiver(&self) -> &Arc<RtpReceiver> {
        &self.receiver
    }

    pub fn local_port(&self) -> u16 {
        self.receiver.local_port()
    }

    pub(crate) fn stream(&self, packet_timeout: Duration) -> TrackStream {
        TrackStream {
            index: self.index,
            content_descriptor: self.content_descriptor.clone(),
            receiver: self.receiver.clone(),
            packet_timeout,
        }
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("index", &self.index)
            .field("control_url", &self.control_url)
            .field("payload_type", &self.payload_type)
            .field("content_descriptor", &self.content_descriptor)
            .field("local_port", &self.local_port())
            .finish()
    }
}

/// Pull-based packet source for one track, handed to the playback layer.
///
/// Cheap to clone; reading is safe while the controller disconnects.
#[derive(Clone)]
pub struct TrackStream {
    index: usize,
    content_descriptor: Option<String>,
    receiver: Arc<RtpReceiver>,
    packet_timeout: Duration,
}

impl TrackStream {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn content_descriptor(&self) -> Option<&str> {
        self.content_descriptor.as_deref()
    }

    /// Next packet, waiting up to the configured packet timeout.
    pub fn read(&self) -> Result<Option<Packet>> {
        self.read_timeout(self.packet_timeout)
    }

    /// Next packet, waiting up to `timeout`.
    ///
    /// `Ok(None)` means silence. Once the receiver has stopped and every
    /// queued packet was read, returns [`RtspError::TrackClosed`].
    pub fn read_timeout(&self, timeout: Duration) -> Result<Option<Packet>> {
        match self.receiver.dequeue(timeout) {
            Some(packet) => Ok(Some(packet)),
            None if self.receiver.is_drained() => Err(RtspError::TrackClosed { track: self.index }),
            None => Ok(None),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.receiver.is_alive()
    }
}

/// What happens to the session when one track's receiver fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReceiverFailurePolicy {
    /// Only the failed track ends. The session fails when no track is
    /// left receiving.
    #[default]
    IsolateTrack,
    /// Any receiver failure ends every track and fails the session.
    EndSession,
}

/// Media delivery health, as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionHealth {
    Healthy,
    /// Some tracks stopped receiving; the others continue.
    Degraded { failed_tracks: Vec<usize> },
    /// No track is receiving any more.
    Failed,
}

/// Tracks receiver failures for one session and applies the policy.
///
/// Receivers hold the monitor through their failure hook; the monitor only
/// keeps weak references back.
pub(crate) struct FailureMonitor {
    policy: ReceiverFailurePolicy,
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    receivers: BTreeMap<usize, Weak<RtpReceiver>>,
    failed: Vec<usize>,
    session_failed: bool,
}

impl FailureMonitor {
    pub(crate) fn new(policy: ReceiverFailurePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Watch `receiver` as the current receiver of track `index`,
    /// replacing any earlier one.
    pub(crate) fn register(&self, index: usize, receiver: &Arc<RtpReceiver>) {
        self.state
            .lock()
            .receivers
            .insert(index, Arc::downgrade(receiver));
    }

    pub(crate) fn receiver_failed(&self, index: usize) {
        let mut state = self.state.lock();
        if !state.failed.contains(&index) {
            state.failed.push(index);
        }
        let live = state
            .receivers
            .keys()
            .filter(|i| !state.failed.contains(*i))
            .count();

        if self.policy == ReceiverFailurePolicy::EndSession || live == 0 {
            if !state.session_failed {
                tracing::warn!(
                    track = index,
                    policy = ?self.policy,
                    "media receiver failed, ending session delivery"
                );
            }
            state.session_failed = true;
            for (i, weak) in &state.receivers {
                if *i != index
                    && let Some(receiver) = weak.upgrade()
                {
                    receiver.halt();
                }
            }
        } else {
            tracing::warn!(track = index, live, "media receiver failed, track degraded");
        }
    }

    pub(crate) fn health(&self) -> SessionHealth {
        let state = self.state.lock();
        if state.session_failed {
            SessionHealth::Failed
        } else if state.failed.is_empty() {
            SessionHealth::Healthy
        } else {
            let mut failed_tracks = state.failed.clone();
            failed_tracks.sort_unstable();
            SessionHealth::Degraded { failed_tracks }
        }
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = MonitorState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReceiverSettings;
    use std::net::{IpAddr, Ipv4Addr, UdpSocket};

    fn receiver() -> Arc<RtpReceiver> {
        let port = UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let settings = ReceiverSettings {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            poll_interval: Duration::from_millis(20),
            ..ReceiverSettings::default()
        };
        let receiver = Arc::new(RtpReceiver::new(port, settings));
        receiver.start().unwrap();
        receiver
    }

    #[test]
    fn isolate_policy_degrades_then_fails() {
        let monitor = FailureMonitor::new(ReceiverFailurePolicy::IsolateTrack);
        let (a, b) = (receiver(), receiver());
        monitor.register(0, &a);
        monitor.register(1, &b);
        assert_eq!(monitor.health(), SessionHealth::Healthy);

        monitor.receiver_failed(1);
        assert_eq!(
            monitor.health(),
            SessionHealth::Degraded {
                failed_tracks: vec![1]
            }
        );
        assert!(!a.is_drained());

        monitor.receiver_failed(0);
        assert_eq!(monitor.health(), SessionHealth::Failed);
        a.stop();
        b.stop();
    }

    #[test]
    fn end_session_policy_halts_other_tracks() {
        let monitor = FailureMonitor::new(ReceiverFailurePolicy::EndSession);
        let (a, b) = (receiver(), receiver());
        monitor.register(0, &a);
        monitor.register(1, &b);

        monitor.receiver_failed(0);
        assert_eq!(monitor.health(), SessionHealth::Failed);

        let stream = Track::new(1, "rtsp://h/m".into(), None, None, None, b.clone())
            .stream(Duration::from_secs(5));
        assert!(matches!(
            stream.read(),
            Err(RtspError::TrackClosed { track: 1 })
        ));

        monitor.reset();
        assert_eq!(monitor.health(), SessionHealth::Healthy);
        a.stop();
        b.stop();
    }
}
