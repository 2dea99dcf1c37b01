use std::net::SocketAddr;
use std::time::Instant;

/// RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The client does not reorder or depacketize; this view only exposes the
/// header fields for consumers that want them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    pub sequence: u16,
    pub timestamp: u32,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    /// Offset of the payload, past CSRCs and any header extension.
    pub header_len: usize,
}

/// Size of the fixed part of the header.
pub const RTP_HEADER_LEN: usize = 12;

impl RtpHeader {
    /// Read the header at the start of `buf`. Returns `None` unless the
    /// version is 2 and the declared CSRC list and extension fit.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < RTP_HEADER_LEN || buf[0] >> 6 != 2 {
            return None;
        }

        let csrc_count = (buf[0] & 0x0f) as usize;
        let has_extension = buf[0] & 0x10 != 0;
        let mut header_len = RTP_HEADER_LEN + csrc_count * 4;

        if has_extension {
            let ext = buf.get(header_len..header_len + 4)?;
            let words = u16::from_be_bytes([ext[2], ext[3]]) as usize;
            header_len += 4 + words * 4;
        }
        if header_len > buf.len() {
            return None;
        }

        Some(Self {
            marker: buf[1] & 0x80 != 0,
            pt: buf[1] & 0x7f,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            header_len,
        })
    }

    /// Serialize a 12-byte fixed header (no CSRCs, no extension).
    pub fn write(&self) -> [u8; RTP_HEADER_LEN] {
        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = 2 << 6;
        header[1] = ((self.marker as u8) << 7) | (self.pt & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        header
    }
}

/// One received datagram.
///
/// Produced by a receiver thread and owned by the track's queue until a
/// consumer dequeues it.
#[derive(Debug, Clone)]
pub struct Packet {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
    pub received_at: Instant,
}

impl Packet {
    pub fn new(payload: Vec<u8>, source: SocketAddr) -> Self {
        Self {
            payload,
            source,
            received_at: Instant::now(),
        }
    }

    /// The RTP header, if the datagram carries a valid one.
    pub fn rtp_header(&self) -> Option<RtpHeader> {
        RtpHeader::parse(&self.payload)
    }

    /// Bytes after the RTP header.
    pub fn rtp_payload(&self) -> Option<&[u8]> {
        self.rtp_header().map(|h| &self.payload[h.header_len..])
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(marker: bool) -> RtpHeader {
        RtpHeader {
            marker,
            pt: 96,
            sequence: 0xBEEF,
            timestamp: 90_000,
            ssrc: 0xAABBCCDD,
            header_len: RTP_HEADER_LEN,
        }
    }

    #[test]
    fn version_is_2() {
        let buf = header(false).write();
        assert_eq!(buf[0] >> 6, 2);
    }

    #[test]
    fn reads_written_fields() {
        let mut datagram = header(true).write().to_vec();
        datagram.extend_from_slice(b"payload");
        let packet = Packet::new(datagram, "127.0.0.1:5000".parse().unwrap());

        let h = packet.rtp_header().unwrap();
        assert_eq!(h, header(true));
        assert_eq!(packet.rtp_payload(), Some(&b"payload"[..]));
    }

    #[test]
    fn skips_csrcs_and_extension() {
        let mut buf = header(false).write().to_vec();
        buf[0] |= 0x10 | 0x01; // X bit, one CSRC
        buf.extend_from_slice(&[0, 0, 0, 1]); // CSRC
        buf.extend_from_slice(&[0xBE, 0xDE, 0, 1]); // extension, 1 word
        buf.extend_from_slice(&[9, 9, 9, 9]);
        buf.push(0x42);

        let h = RtpHeader::parse(&buf).unwrap();
        assert_eq!(h.header_len, 24);
        assert_eq!(&buf[h.header_len..], &[0x42]);
    }

    #[test]
    fn rejects_short_or_wrong_version() {
        assert!(RtpHeader::parse(&[0x80, 96, 0, 1]).is_none());
        let mut buf = header(false).write();
        buf[0] = 1 << 6;
        assert!(RtpHeader::parse(&buf).is_none());

        let mut truncated = header(false).write();
        truncated[0] |= 0x03; // claims three CSRCs that are not there
        assert!(RtpHeader::parse(&truncated).is_none());
    }
}
