use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use url::Url;

use crate::error::{Result, RtspError};
use crate::locator::RtspUrl;
use crate::protocol::{MediaDescription, Method, RtspRequest, RtspResponse};
use crate::session::track::FailureMonitor;
use crate::session::{
    PortAllocator, ReceiverFailurePolicy, Session, SessionHealth, SessionState, Track,
    TrackStream, TransportHeader, resolve_control,
};
use crate::transport::udp::FailureHook;
use crate::transport::{ControlTransport, ReceiverSettings, RtpReceiver};

/// How long `disconnect` waits for an in-flight call before interrupting it.
const DISCONNECT_POLL: Duration = Duration::from_millis(20);

/// Client-level configuration used by the session controller.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a request waits for its reply.
    pub request_timeout: Duration,
    /// TCP connect timeout for the control connection.
    pub connect_timeout: Duration,
    /// Default wait of [`TrackStream::read`].
    pub packet_timeout: Duration,
    /// Socket parameters for every track's receiver.
    pub receiver: ReceiverSettings,
    /// First CSeq of a session. `None` picks a random start.
    pub initial_cseq: Option<u32>,
    pub receiver_failure: ReceiverFailurePolicy,
    /// Source of local RTP ports. Defaults to the process-wide allocator.
    pub ports: Arc<PortAllocator>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(5000),
            packet_timeout: Duration::from_millis(30000),
            receiver: ReceiverSettings::default(),
            initial_cseq: None,
            receiver_failure: ReceiverFailurePolicy::default(),
            ports: PortAllocator::global(),
        }
    }
}

/// Drives one RTSP session: DESCRIBE → SETUP (per track) → PLAY / PAUSE →
/// TEARDOWN.
///
/// All methods take `&self`; control requests are serialized internally so
/// at most one is outstanding. [`disconnect`](Self::disconnect) may be
/// called from another thread while a request is in flight: it closes the
/// control connection, which interrupts the waiting call.
pub struct SessionController {
    url: RtspUrl,
    config: ClientConfig,
    state: RwLock<SessionState>,
    session: Mutex<Option<Session>>,
    transport: Mutex<Option<Arc<ControlTransport>>>,
    cancelled: AtomicBool,
    monitor: Arc<FailureMonitor>,
}

impl SessionController {
    pub fn new(url: RtspUrl, config: ClientConfig) -> Self {
        let monitor = Arc::new(FailureMonitor::new(config.receiver_failure));
        Self {
            url,
            config,
            state: RwLock::new(SessionState::Idle),
            session: Mutex::new(None),
            transport: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            monitor,
        }
    }

    /// Parse `locator` as an `rtsp://` URL and create a controller for it.
    pub fn from_locator(locator: &str, config: ClientConfig) -> Result<Self> {
        Ok(Self::new(RtspUrl::parse(locator)?, config))
    }

    /// Open the control connection, describe the presentation and set up
    /// every track. On success the controller is [`SessionState::Ready`].
    ///
    /// Any failure releases everything acquired so far and leaves the
    /// controller [`SessionState::Closed`].
    pub fn connect(&self) -> Result<()> {
        let mut slot = self.session.lock();
        match self.state() {
            SessionState::Idle | SessionState::Closed => {}
            state => {
                return Err(RtspError::InvalidState {
                    state,
                    operation: "connect",
                });
            }
        }

        self.cancelled.store(false, Ordering::SeqCst);
        self.monitor.reset();
        self.set_state(SessionState::Connecting);

        let transport = match ControlTransport::open(&self.url, self.config.connect_timeout) {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "connect failed");
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };
        *self.transport.lock() = Some(transport.clone());

        let initial_cseq = self
            .config
            .initial_cseq
            .unwrap_or_else(|| rand::rng().random_range(1..=10_000));
        let mut session = Session::new(&self.url, initial_cseq);

        match self.negotiate(&transport, &mut session) {
            Ok(()) => {
                tracing::info!(
                    url = %self.url,
                    session_id = ?session.id,
                    tracks = session.tracks.len(),
                    duration = ?session.duration(),
                    "session ready"
                );
                *slot = Some(session);
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "session setup failed");
                session.release_tracks();
                if let Some(transport) = self.transport.lock().take() {
                    transport.close();
                }
                self.set_state(SessionState::Closed);
                Err(e)
            }
        }
    }

    /// Issue PLAY. No-op when already playing.
    ///
    /// A rejected PLAY ([`RtspError::Protocol`]) leaves the state unchanged.
    /// Any other failure means the control channel is gone: the session is
    /// released and the controller is [`SessionState::Closed`].
    pub fn start(&self) -> Result<()> {
        let mut slot = self.session.lock();
        match self.state() {
            SessionState::Playing => return Ok(()),
            SessionState::Ready | SessionState::Paused => {}
            state => {
                return Err(RtspError::InvalidState {
                    state,
                    operation: "start",
                });
            }
        }
        self.ensure_healthy()?;

        self.session_request(&mut slot, Method::Play)?;
        self.set_state(SessionState::Playing);
        Ok(())
    }

    /// Issue PAUSE. No-op unless playing.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.session.lock();
        if self.state() != SessionState::Playing {
            return Ok(());
        }
        self.ensure_healthy()?;

        self.session_request(&mut slot, Method::Pause)?;
        self.set_state(SessionState::Paused);
        Ok(())
    }

    /// Send GET_PARAMETER to keep the session from timing out
    /// (RFC 2326 §10.8). Callers typically do this at half the session
    /// timeout.
    pub fn keepalive(&self) -> Result<()> {
        let mut slot = self.session.lock();
        match self.state() {
            SessionState::Ready | SessionState::Playing | SessionState::Paused => {}
            state => {
                return Err(RtspError::InvalidState {
                    state,
                    operation: "keepalive",
                });
            }
        }

        self.session_request(&mut slot, Method::GetParameter)?;
        tracing::trace!("keepalive acknowledged");
        Ok(())
    }

    /// Tear the session down and release every resource. Never fails.
    ///
    /// TEARDOWN is best-effort: its errors are logged and ignored. When
    /// another call is in flight, the control connection is closed first to
    /// interrupt it.
    pub fn disconnect(&self) {
        let mut slot = loop {
            if let Some(slot) = self.session.try_lock_for(DISCONNECT_POLL) {
                break slot;
            }
            self.cancelled.store(true, Ordering::SeqCst);
            if let Some(transport) = self.transport.lock().clone() {
                tracing::debug!("interrupting in-flight request for disconnect");
                transport.close();
            }
        };

        let transport = self.transport.lock().take();
        if transport.is_none() && slot.is_none() {
            if self.state() != SessionState::Idle {
                self.set_state(SessionState::Closed);
            }
            return;
        }

        self.set_state(SessionState::TearingDown);

        if let Some(transport) = &transport
            && let Some(session) = slot.as_mut()
            && !transport.is_closed()
        {
            let cseq = session.next_cseq();
            let request = RtspRequest::new(Method::Teardown, &session.control_url, cseq)
                .with_session(session.id());
            match transport.request(&request, self.config.request_timeout) {
                Ok(Some(reply)) if reply.is_success() => {
                    tracing::debug!(session_id = ?session.id, "TEARDOWN acknowledged");
                }
                Ok(Some(reply)) => {
                    tracing::info!(status = reply.status_code, text = %reply.status_text, "TEARDOWN rejected");
                }
                Ok(None) => tracing::info!("no reply to TEARDOWN"),
                Err(e) => tracing::info!(error = %e, "TEARDOWN failed"),
            }
        }

        if let Some(transport) = transport {
            transport.close();
        }
        if let Some(mut session) = slot.take() {
            session.release_tracks();
        }
        self.set_state(SessionState::Closed);
        tracing::info!(url = %self.url, "session closed");
    }

    /// Current state of the controller.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Playable duration. `None` means unknown; callers must not assume a
    /// value.
    pub fn duration(&self) -> Option<Duration> {
        self.session.lock().as_ref().and_then(Session::duration)
    }

    /// Per-track packet sources, in description order.
    pub fn streams(&self) -> Result<Vec<TrackStream>> {
        let slot = self.session.lock();
        let session = slot.as_ref().ok_or(RtspError::NotConnected)?;
        Ok(session
            .tracks
            .iter()
            .map(|t| t.stream(self.config.packet_timeout))
            .collect())
    }

    /// The negotiated tracks (empty when not connected).
    pub fn tracks(&self) -> Vec<Track> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.tracks.clone())
            .unwrap_or_default()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.lock().as_ref().and_then(|s| s.id.clone())
    }

    /// Session timeout negotiated in SETUP (60s unless the server said
    /// otherwise).
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session.lock().as_ref().map(Session::timeout)
    }

    pub fn health(&self) -> SessionHealth {
        self.monitor.health()
    }

    pub fn url(&self) -> &RtspUrl {
        &self.url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        tracing::debug!(old_state = ?*current, new_state = ?state, "state transition");
        *current = state;
    }

    fn current_transport(&self) -> Result<Arc<ControlTransport>> {
        self.transport.lock().clone().ok_or(RtspError::NotConnected)
    }

    fn ensure_healthy(&self) -> Result<()> {
        if self.monitor.health() == SessionHealth::Failed {
            return Err(RtspError::SessionFailed);
        }
        Ok(())
    }

    /// Issue an aggregate request within the session.
    ///
    /// A non-2xx status is returned as is. Any other error (timeout, lost or
    /// interrupted connection) closes the session.
    fn session_request(&self, slot: &mut Option<Session>, method: Method) -> Result<()> {
        let session = slot.as_mut().ok_or(RtspError::NotConnected)?;
        let transport = self.current_transport()?;
        let cseq = session.next_cseq();
        let request =
            RtspRequest::new(method, &session.control_url, cseq).with_session(session.id());

        match self.exchange(&transport, &request) {
            Ok(_) => Ok(()),
            Err(e @ RtspError::Protocol { .. }) => Err(e),
            Err(e) => {
                tracing::warn!(%method, error = %e, "control channel failed, closing session");
                self.release(slot);
                Err(e)
            }
        }
    }

    /// Close the transport, stop every receiver and mark the controller
    /// closed.
    fn release(&self, slot: &mut Option<Session>) {
        if let Some(transport) = self.transport.lock().take() {
            transport.close();
        }
        if let Some(mut session) = slot.take() {
            session.release_tracks();
        }
        self.set_state(SessionState::Closed);
    }

    /// Send one request and require a 2xx reply.
    fn exchange(
        &self,
        transport: &ControlTransport,
        request: &RtspRequest,
    ) -> Result<RtspResponse> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(RtspError::Interrupted);
        }
        match transport.request(request, self.config.request_timeout)? {
            Some(reply) => reply.into_success().inspect_err(|e| {
                tracing::info!(method = %request.method, error = %e, "request rejected");
            }),
            None => Err(RtspError::Timeout {
                method: request.method.clone(),
            }),
        }
    }

    /// DESCRIBE, then SETUP every track.
    fn negotiate(&self, transport: &ControlTransport, session: &mut Session) -> Result<()> {
        let request = RtspRequest::new(Method::Describe, self.url.as_str(), session.next_cseq())
            .add_header("Accept", "application/sdp");
        let reply = self.exchange(transport, &request)?;

        if let Some(base) = reply.content_base() {
            match Url::parse(base) {
                Ok(base) => session.content_base = base,
                Err(e) => {
                    tracing::warn!(base, error = %e, "ignoring unparsable content base");
                }
            }
        }
        let sdp = match reply.sdp() {
            Some(sdp) => sdp?,
            None => {
                return Err(RtspError::Timeout {
                    method: "DESCRIBE".to_string(),
                });
            }
        };
        self.set_state(SessionState::Described);

        session.range = sdp.range();
        session.control_url = match sdp.control() {
            Some(control) if control.trim() != "*" => {
                resolve_control(&session.content_base, Some(control))?.to_string()
            }
            _ => self.url.as_str().to_string(),
        };

        let track_count = sdp.media_count().max(1);
        tracing::debug!(
            media = sdp.media_count(),
            tracks = track_count,
            content_base = %session.content_base,
            range = ?session.range,
            "session described"
        );

        self.set_state(SessionState::SettingUp);
        for index in 0..track_count {
            let track = self.setup_track(transport, session, index, sdp.media.get(index))?;
            session.tracks.push(track);
        }
        Ok(())
    }

    /// Bind a receiver for one track and issue its SETUP.
    fn setup_track(
        &self,
        transport: &ControlTransport,
        session: &mut Session,
        index: usize,
        media: Option<&MediaDescription>,
    ) -> Result<Track> {
        let mut receiver = self.bind_receiver(index)?;
        let requested_port = receiver.local_port();

        let control_url = session.resolve_control(media.and_then(MediaDescription::control))?;
        let cseq = session.next_cseq();
        let request = RtspRequest::new(Method::Setup, &control_url, cseq)
            .with_session(session.id())
            .add_header("Transport", &TransportHeader::for_client_port(requested_port));
        let reply = self.exchange(transport, &request)?;

        // Session id and timeout come from the first SETUP reply only.
        if index == 0
            && let Some(header) = reply.session()
        {
            if !header.id.is_empty() {
                session.id = Some(header.id);
            }
            if let Some(timeout) = header.timeout_secs {
                session.timeout_secs = timeout;
            }
        }

        match reply.transport() {
            Some(granted) if granted.client_rtp_port != requested_port => {
                tracing::info!(
                    track = index,
                    requested_port,
                    granted_port = granted.client_rtp_port,
                    "server chose a different client port, rebinding"
                );
                receiver.stop();
                receiver = self.start_receiver(index, granted.client_rtp_port)?;
            }
            Some(_) => {}
            None => {
                tracing::debug!(track = index, "SETUP reply without Transport, keeping requested port");
            }
        }

        self.monitor.register(index, &receiver);

        tracing::debug!(
            track = index,
            control_url = %control_url,
            port = receiver.local_port(),
            session_id = ?session.id,
            "track set up"
        );

        Ok(Track::new(
            index,
            control_url,
            media.and_then(|m| m.payload_type),
            media.and_then(MediaDescription::payload_format),
            media.and_then(MediaDescription::content_descriptor),
            receiver,
        ))
    }

    /// Try allocated ports until one binds, for at most one full cycle of
    /// the allocator.
    fn bind_receiver(&self, index: usize) -> Result<Arc<RtpReceiver>> {
        let attempts = self.config.ports.cycle_len();
        for _ in 0..attempts {
            let port = self.config.ports.allocate();
            match self.start_receiver(index, port) {
                Ok(receiver) => return Ok(receiver),
                Err(RtspError::Bind { port, source }) => {
                    tracing::debug!(track = index, port, error = %source, "port busy, trying next");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(track = index, attempts, "no bindable RTP port");
        Err(RtspError::PortExhausted { attempts })
    }

    fn start_receiver(&self, index: usize, port: u16) -> Result<Arc<RtpReceiver>> {
        let monitor = self.monitor.clone();
        let hook: FailureHook = Arc::new(move |_port| monitor.receiver_failed(index));
        let receiver =
            Arc::new(RtpReceiver::new(port, self.config.receiver.clone()).with_failure_hook(hook));
        receiver.start()?;
        Ok(receiver)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
