//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling. One
//!   connection per session, read by a dedicated thread that correlates
//!   replies with the single outstanding request.
//!
//! - **UDP** ([`udp`]): carries RTP media packets. One socket and one
//!   receiver thread per track, feeding a [`queue::PacketQueue`].
//!
//! Interleaved TCP transport (RFC 2326 §10.12) is not supported.

pub mod queue;
pub mod tcp;
pub mod udp;

pub use queue::PacketQueue;
pub use tcp::ControlTransport;
pub use udp::{ReceiverSettings, RtpReceiver};
