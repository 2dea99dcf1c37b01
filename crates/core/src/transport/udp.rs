use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::Packet;
use crate::transport::queue::PacketQueue;

/// Called with the local port when a receiver stops on its own (read error
/// or queue failure). Never called for a requested [`RtpReceiver::stop`].
pub type FailureHook = Arc<dyn Fn(u16) + Send + Sync>;

/// Socket and thread parameters for [`RtpReceiver`].
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    /// Local address to bind (the port comes from the allocator).
    pub bind_ip: IpAddr,
    /// Read timeout between checks of the running flag.
    pub poll_interval: Duration,
    /// Receive buffer size; longer datagrams are truncated.
    pub max_datagram_size: usize,
    /// Most unread packets a track may hold. When a consumer falls this far
    /// behind, the receiver fails. `None` leaves the queue unbounded.
    pub queue_capacity: Option<usize>,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            poll_interval: Duration::from_millis(100),
            max_datagram_size: 65_535,
            queue_capacity: None,
        }
    }
}

/// Receives one track's RTP datagrams on a dedicated thread.
///
/// The thread pushes every datagram into a [`PacketQueue`]; consumers pull
/// with [`dequeue`](Self::dequeue). Like the control transport, the thread
/// polls a running flag between reads so [`stop`](Self::stop) can end it
/// promptly.
pub struct RtpReceiver {
    port: u16,
    settings: ReceiverSettings,
    queue: Arc<PacketQueue>,
    running: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    on_failure: Option<FailureHook>,
}

impl RtpReceiver {
    pub fn new(port: u16, settings: ReceiverSettings) -> Self {
        let queue = match settings.queue_capacity {
            Some(capacity) => PacketQueue::bounded(capacity),
            None => PacketQueue::new(),
        };
        Self {
            port,
            settings,
            queue: Arc::new(queue),
            running: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            on_failure: None,
        }
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    /// Bind the socket and spawn the receiver thread.
    ///
    /// Fails with [`RtspError::Bind`] when the port is taken; the caller
    /// retries with another port.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let addr = SocketAddr::new(self.settings.bind_ip, self.port);
        let socket = UdpSocket::bind(addr).map_err(|source| RtspError::Bind {
            port: self.port,
            source,
        })?;
        socket.set_read_timeout(Some(self.settings.poll_interval))?;

        self.running.store(true, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);

        let ctx = ReceiveLoop {
            socket,
            port: self.port,
            queue: self.queue.clone(),
            running: self.running.clone(),
            alive: self.alive.clone(),
            on_failure: self.on_failure.clone(),
            buf: vec![0u8; self.settings.max_datagram_size],
        };

        let handle = thread::Builder::new()
            .name(format!("rtp-rx-{}", self.port))
            .spawn(move || ctx.run())
            .inspect_err(|_| {
                self.running.store(false, Ordering::SeqCst);
                self.alive.store(false, Ordering::SeqCst);
            })?;

        *worker = Some(handle);
        tracing::debug!(port = self.port, "RTP receiver started");
        Ok(())
    }

    /// Oldest received packet, waiting up to `timeout`. `None` means
    /// nothing arrived (silence), or the receiver stopped and the queue is
    /// drained.
    pub fn dequeue(&self, timeout: Duration) -> Option<Packet> {
        self.queue.pop(timeout)
    }

    /// Stop the thread and close the socket. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!(port = self.port, "RTP receiver thread panicked");
            }
            tracing::debug!(port = self.port, "RTP receiver stopped");
        }
        self.alive.store(false, Ordering::SeqCst);
        self.queue.close();
    }

    /// Ask the thread to exit and close the queue without waiting for it.
    /// Safe to call from another receiver's thread; [`stop`](Self::stop)
    /// still joins later.
    pub fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.close();
    }

    /// Whether the thread is still receiving.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Packets waiting to be dequeued.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// `true` once the receiver stopped and every packet was consumed.
    pub fn is_drained(&self) -> bool {
        self.queue.is_closed() && self.queue.is_empty()
    }

    pub fn local_port(&self) -> u16 {
        self.port
    }
}

impl Drop for RtpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReceiveLoop {
    socket: UdpSocket,
    port: u16,
    queue: Arc<PacketQueue>,
    running: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    on_failure: Option<FailureHook>,
    buf: Vec<u8>,
}

impl ReceiveLoop {
    fn run(mut self) {
        tracing::trace!(port = self.port, "RTP thread started");

        let failed = loop {
            if !self.running.load(Ordering::SeqCst) {
                break false;
            }
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, source)) => {
                    let packet = Packet::new(self.buf[..len].to_vec(), source);
                    if self.queue.push(packet).is_err() {
                        tracing::warn!(port = self.port, "cannot queue packet, stopping receiver");
                        break true;
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    tracing::warn!(port = self.port, error = %e, "RTP receive failed");
                    break true;
                }
            }
        };

        self.alive.store(false, Ordering::SeqCst);
        self.queue.close();

        if failed
            && self.running.load(Ordering::SeqCst)
            && let Some(hook) = &self.on_failure
        {
            hook(self.port);
        }
        tracing::trace!(port = self.port, failed, "RTP thread finished");
    }
}
