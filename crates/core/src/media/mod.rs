//! Received media packets.
//!
//! ## RTP overview (RFC 3550)
//!
//! The server splits each encoded frame into one or more RTP packets and
//! sends them as UDP datagrams to the port negotiated in SETUP. Every RTP
//! packet carries a 12-byte fixed header ([`rtp::RtpHeader`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, typically 90 kHz for video.
//! - **SSRC** (32-bit): identifies the sender.
//! - **Marker bit**: set on the last packet of an access unit (frame).
//!
//! The client hands packets to the consumer as they arrive: no reordering,
//! no depacketization and no jitter buffering happen here.

pub mod rtp;

pub use rtp::{Packet, RtpHeader};
