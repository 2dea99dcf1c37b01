use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, RtspError};
use crate::protocol::{RtspRequest, RtspResponse};
use crate::locator::RtspUrl;

/// Upper bound on a single header block; protects the reader from a peer
/// that never sends the blank line.
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Upper bound on a message body. Bodies are session descriptions and stay
/// far below this.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The RTSP control connection.
///
/// Owns the TCP stream to the server. A dedicated reader thread frames
/// inbound messages (header block, blank line, `Content-Length` body),
/// parses them and hands each reply to the caller blocked in
/// [`request`](Self::request) when its CSeq matches the outstanding one.
///
/// Requests are fully serialized: only one can be outstanding, so a reply
/// without a CSeq (some servers omit it on errors) is taken as the answer
/// to that one request.
pub struct ControlTransport {
    peer: String,
    writer: Mutex<TcpStream>,
    control: TcpStream,
    exchange: Arc<Exchange>,
    request_lock: Mutex<()>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// [`ControlTransport::close`] was called.
    Local,
    /// The server closed the stream or a read failed.
    Remote,
}

#[derive(Default)]
struct ExchangeState {
    outstanding: Option<u32>,
    reply: Option<RtspResponse>,
    closed: Option<CloseReason>,
}

/// Reply handoff between the reader thread and the requesting thread.
#[derive(Default)]
struct Exchange {
    state: Mutex<ExchangeState>,
    replied: Condvar,
}

impl Exchange {
    fn deliver(&self, response: RtspResponse) {
        let mut state = self.state.lock();
        match state.outstanding {
            Some(expected) if response.cseq().is_none_or(|cseq| cseq == expected) => {
                tracing::debug!(
                    cseq = expected,
                    status = response.status_code,
                    "reply matched"
                );
                state.outstanding = None;
                state.reply = Some(response);
                drop(state);
                self.replied.notify_one();
            }
            expected => {
                tracing::debug!(
                    ?expected,
                    cseq = ?response.cseq(),
                    status = response.status_code,
                    "dropping unmatched reply"
                );
            }
        }
    }

    fn close(&self, reason: CloseReason) {
        let mut state = self.state.lock();
        if state.closed.is_none() {
            state.closed = Some(reason);
        }
        drop(state);
        self.replied.notify_all();
    }
}

impl ControlTransport {
    /// Connect to the server named by `url` and start the reader thread.
    pub fn open(url: &RtspUrl, connect_timeout: Duration) -> Result<Self> {
        let peer = url.socket_addr();
        let stream = connect(&peer, connect_timeout).map_err(|source| {
            RtspError::ConnectFailure {
                addr: peer.clone(),
                source,
            }
        })?;
        Self::from_stream(stream, peer)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, peer: String) -> Result<Self> {
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;
        let control = stream.try_clone()?;
        let exchange = Arc::new(Exchange::default());

        let reader_exchange = exchange.clone();
        let reader_peer = peer.clone();
        let reader = thread::Builder::new()
            .name("rtsp-control-reader".to_string())
            .spawn(move || reader_loop(read_half, reader_exchange, reader_peer))?;

        tracing::info!(%peer, "control connection open");

        Ok(Self {
            peer,
            writer: Mutex::new(stream),
            control,
            exchange,
            request_lock: Mutex::new(()),
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Serialize and write a request. Returns `false` if the write failed.
    pub fn send(&self, request: &RtspRequest) -> bool {
        tracing::debug!(
            peer = %self.peer,
            method = %request.method,
            uri = %request.uri,
            cseq = ?request.cseq(),
            "request"
        );
        let mut writer = self.writer.lock();
        let result = writer
            .write_all(request.serialize().as_bytes())
            .and_then(|()| writer.flush());
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "control write failed");
                false
            }
        }
    }

    /// Send `request` and wait up to `timeout` for its reply.
    ///
    /// - `Ok(Some(reply))`: the matching reply, whatever its status code.
    /// - `Ok(None)`: the write failed or nothing matched in time.
    /// - `Err(Interrupted)`: [`close`](Self::close) was called while waiting.
    /// - `Err(Io)`: the server closed the connection.
    pub fn request(
        &self,
        request: &RtspRequest,
        timeout: Duration,
    ) -> Result<Option<RtspResponse>> {
        let _serial = self.request_lock.lock();

        {
            let mut state = self.exchange.state.lock();
            if let Some(reason) = state.closed {
                return Err(closed_error(reason));
            }
            state.reply = None;
            state.outstanding = Some(request.cseq().unwrap_or_default());
        }

        if !self.send(request) {
            self.exchange.state.lock().outstanding = None;
            return Ok(None);
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.exchange.state.lock();
        loop {
            if let Some(reply) = state.reply.take() {
                return Ok(Some(reply));
            }
            if let Some(reason) = state.closed {
                state.outstanding = None;
                return Err(closed_error(reason));
            }
            if self
                .exchange
                .replied
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                state.outstanding = None;
                let reply = state.reply.take();
                if reply.is_none() {
                    tracing::warn!(
                        peer = %self.peer,
                        method = %request.method,
                        ?timeout,
                        "no reply within timeout"
                    );
                }
                return Ok(reply);
            }
        }
    }

    /// Close the stream, wake every waiter and join the reader thread.
    /// Idempotent.
    pub fn close(&self) {
        self.exchange.close(CloseReason::Local);
        let _ = self.control.shutdown(Shutdown::Both);

        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!(peer = %self.peer, "control reader thread panicked");
            }
            tracing::info!(peer = %self.peer, "control connection closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.exchange.state.lock().closed.is_some()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Drop for ControlTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn closed_error(reason: CloseReason) -> RtspError {
    match reason {
        CloseReason::Local => RtspError::Interrupted,
        CloseReason::Remote => RtspError::Io(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "control connection closed by server",
        )),
    }
}

fn connect(peer: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in peer.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

/// Reads messages until EOF or a read error, then marks the exchange closed.
fn reader_loop(stream: TcpStream, exchange: Arc<Exchange>, peer: String) {
    let mut reader = BufReader::new(stream);
    let reason = loop {
        match read_message(&mut reader) {
            Ok(Some(raw)) => match RtspResponse::parse(&raw) {
                Ok(response) => exchange.deliver(response),
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "dropping unparseable control message");
                }
            },
            Ok(None) => break "connection closed by server",
            Err(e) => {
                tracing::debug!(%peer, error = %e, "control read ended");
                break "read error";
            }
        }
    };
    tracing::debug!(%peer, reason, "control reader exiting");
    exchange.close(CloseReason::Remote);
}

/// Read one framed message: header block up to the blank line, then exactly
/// `Content-Length` body bytes. Interleaved `$` data frames are skipped.
/// Returns `Ok(None)` on a clean EOF between messages.
fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut message = Vec::new();

    // Skip blank lines between messages and any interleaved binary frames.
    loop {
        let first = reader.fill_buf()?.first().copied();
        match first {
            None => return Ok(None),
            Some(b'\r') | Some(b'\n') => reader.consume(1),
            Some(b'$') => skip_interleaved(reader)?,
            Some(_) => break,
        }
    }

    let mut content_length = 0usize;
    loop {
        let start = message.len();
        let n = reader.read_until(b'\n', &mut message)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "EOF inside message header",
            ));
        }
        if message.len() > MAX_HEADER_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "message header too large",
            ));
        }

        let line = &message[start..];
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':')
            && name.trim().eq_ignore_ascii_case("Content-Length")
        {
            content_length = value.trim().parse().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "bad Content-Length")
            })?;
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Content-Length {content_length} exceeds {MAX_BODY_BYTES} bytes"),
        ));
    }
    if content_length > 0 {
        let start = message.len();
        let end = start.checked_add(content_length).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "Content-Length overflows")
        })?;
        message.resize(end, 0);
        reader.read_exact(&mut message[start..])?;
    }

    Ok(Some(message))
}

/// `$` channel(1) length(2) payload (RFC 2326 §10.12).
fn skip_interleaved<R: BufRead>(reader: &mut R) -> io::Result<()> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let len = u16::from_be_bytes([header[2], header[3]]) as u64;
    let skipped = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if skipped < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "EOF inside interleaved frame",
        ));
    }
    tracing::trace!(channel = header[1], len, "skipped interleaved frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Method;
    use std::io::Cursor;
    use std::net::TcpListener;

    fn pair() -> (ControlTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        let transport = ControlTransport::from_stream(client, addr.to_string()).unwrap();
        (transport, server)
    }

    /// Read one request off the server side of the pair.
    fn read_request(server: &mut BufReader<TcpStream>) -> RtspRequest {
        let raw = read_message(server).unwrap().unwrap();
        RtspRequest::parse(&String::from_utf8(raw).unwrap()).unwrap()
    }

    #[test]
    fn frames_header_and_body() {
        let wire = b"\r\nRTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 5\r\n\r\nv=0\r\nRTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n";
        let mut cursor = Cursor::new(&wire[..]);

        let first = read_message(&mut cursor).unwrap().unwrap();
        let first = RtspResponse::parse(&first).unwrap();
        assert_eq!(first.cseq(), Some(1));
        assert_eq!(first.body.as_deref(), Some("v=0\r\n"));

        let second = RtspResponse::parse(&read_message(&mut cursor).unwrap().unwrap()).unwrap();
        assert_eq!(second.cseq(), Some(2));

        assert!(read_message(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn skips_interleaved_frames() {
        let mut wire = vec![b'$', 0, 0, 3, 1, 2, 3];
        wire.extend_from_slice(b"RTSP/1.0 200 OK\r\nCSeq: 9\r\n\r\n");
        let raw = read_message(&mut Cursor::new(wire)).unwrap().unwrap();
        assert_eq!(RtspResponse::parse(&raw).unwrap().cseq(), Some(9));
    }

    #[test]
    fn oversized_body_is_rejected_without_allocating() {
        let wire = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 9223372036854775000\r\n\r\nv=0\r\n";
        let err = read_message(&mut Cursor::new(&wire[..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let wire = format!(
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        let err = read_message(&mut Cursor::new(wire.into_bytes())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_reply_closes_the_exchange() {
        let (transport, server) = pair();
        let mut server = BufReader::new(server);

        let handle = thread::spawn(move || {
            read_request(&mut server);
            let reply = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 9223372036854775000\r\n\r\n";
            server.get_mut().write_all(reply).unwrap();
            server
        });

        let request = RtspRequest::new(Method::Describe, "rtsp://h/m", 1);
        let result = transport.request(&request, Duration::from_secs(5));
        assert!(matches!(result, Err(RtspError::Io(_))));
        assert!(transport.is_closed());
        let _server = handle.join().unwrap();
    }

    #[test]
    fn eof_inside_header_is_an_error() {
        let mut cursor = Cursor::new(&b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n"[..]);
        assert!(read_message(&mut cursor).is_err());
    }

    #[test]
    fn matching_reply_wakes_requester() {
        let (transport, server) = pair();
        let mut server = BufReader::new(server);

        let handle = thread::spawn(move || {
            let req = read_request(&mut server);
            assert_eq!(req.method, "OPTIONS");
            let cseq = req.cseq().unwrap().to_string();
            // A stale reply first: must be ignored.
            let stale = RtspResponse::ok().add_header("CSeq", "999").serialize();
            let good = RtspResponse::ok()
                .add_header("CSeq", &cseq)
                .add_header("Public", "DESCRIBE")
                .serialize();
            let stream = server.get_mut();
            stream.write_all(stale.as_bytes()).unwrap();
            stream.write_all(good.as_bytes()).unwrap();
            server
        });

        let request = RtspRequest::new(Method::Options, "rtsp://h/m", 41);
        let reply = transport
            .request(&request, Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(reply.cseq(), Some(41));
        assert_eq!(reply.get_header("Public"), Some("DESCRIBE"));
        let _server = handle.join().unwrap();
    }

    #[test]
    fn reply_without_cseq_matches_outstanding_request() {
        let (transport, server) = pair();
        let mut server = BufReader::new(server);

        let handle = thread::spawn(move || {
            read_request(&mut server);
            let reply = RtspResponse::new(454, "Session Not Found").serialize();
            server.get_mut().write_all(reply.as_bytes()).unwrap();
            server
        });

        let request = RtspRequest::new(Method::Play, "rtsp://h/m", 5);
        let reply = transport
            .request(&request, Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(reply.status_code, 454);
        let _server = handle.join().unwrap();
    }

    #[test]
    fn silence_returns_no_reply() {
        let (transport, _server) = pair();
        let request = RtspRequest::new(Method::Describe, "rtsp://h/m", 1);
        let start = Instant::now();
        let reply = transport
            .request(&request, Duration::from_millis(150))
            .unwrap();
        assert!(reply.is_none());
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn close_interrupts_blocked_request() {
        let (transport, _server) = pair();
        let transport = Arc::new(transport);

        let closer = transport.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            closer.close();
        });

        let request = RtspRequest::new(Method::Describe, "rtsp://h/m", 1);
        let start = Instant::now();
        let result = transport.request(&request, Duration::from_secs(10));
        assert!(matches!(result, Err(RtspError::Interrupted)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();

        // Closed transports refuse further requests, and close is idempotent.
        assert!(transport.is_closed());
        transport.close();
        assert!(transport.request(&request, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn server_hangup_fails_waiter() {
        let (transport, server) = pair();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(server);
        });

        let request = RtspRequest::new(Method::Describe, "rtsp://h/m", 1);
        let result = transport.request(&request, Duration::from_secs(10));
        assert!(matches!(result, Err(RtspError::Io(_))));
        handle.join().unwrap();
    }

    #[test]
    fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = RtspUrl::parse(&format!("rtsp://127.0.0.1:{port}/x")).unwrap();
        match ControlTransport::open(&url, Duration::from_secs(1)) {
            Err(RtspError::ConnectFailure { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{port}"));
            }
            Err(other) => panic!("expected connect failure, got {other}"),
            Ok(_) => panic!("expected connect failure"),
        }
    }
}
