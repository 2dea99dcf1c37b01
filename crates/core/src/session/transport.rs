/// RTP transport parameters exchanged in SETUP (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=8000-8001
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=8000-8001;server_port=5000-5001
/// ```
///
/// The client port in the reply is the one the server will actually send
/// to; when it differs from the requested one the client rebinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHeader {
    /// Client's RTP receive port.
    pub client_rtp_port: u16,
    /// Client's RTCP receive port (typically `client_rtp_port + 1`).
    pub client_rtcp_port: Option<u16>,
    /// Server's RTP send port, when the server reported one.
    pub server_rtp_port: Option<u16>,
    pub server_rtcp_port: Option<u16>,
    /// Synchronization source the server will use, when reported.
    pub ssrc: Option<u32>,
}

impl TransportHeader {
    /// Header value requesting unicast RTP on `port` (RTCP on `port + 1`).
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// assert_eq!(
    ///     TransportHeader::for_client_port(8000),
    ///     "RTP/AVP;unicast;client_port=8000-8001"
    /// );
    /// ```
    pub fn for_client_port(port: u16) -> String {
        format!(
            "RTP/AVP;unicast;client_port={}-{}",
            port,
            port.saturating_add(1)
        )
    }

    /// Parse the `Transport` header value (RFC 2326 §12.39).
    ///
    /// Looks for `client_port=RTP[-RTCP]` among semicolon-separated
    /// parameters; the server port pair and SSRC are optional.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(th.client_rtp_port, 8000);
    /// assert_eq!(th.client_rtcp_port, Some(8001));
    ///
    /// assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        // Several comma-separated alternatives may be listed; the server
        // picks one, so only the first is considered.
        let first = header.split(',').next()?;

        let mut client = None;
        let mut server = None;
        let mut ssrc = None;

        for part in first.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("client_port=") {
                client = parse_port_pair(ports);
            } else if let Some(ports) = part.strip_prefix("server_port=") {
                server = parse_port_pair(ports);
            } else if let Some(value) = part.strip_prefix("ssrc=") {
                ssrc = u32::from_str_radix(value.trim(), 16).ok();
            }
        }

        let (client_rtp_port, client_rtcp_port) = client?;
        Some(TransportHeader {
            client_rtp_port,
            client_rtcp_port,
            server_rtp_port: server.map(|(rtp, _)| rtp),
            server_rtcp_port: server.and_then(|(_, rtcp)| rtcp),
            ssrc,
        })
    }
}

fn parse_port_pair(ports: &str) -> Option<(u16, Option<u16>)> {
    let mut parts = ports.split('-');
    let rtp = parts.next()?.trim().parse().ok()?;
    let rtcp = parts.next().and_then(|p| p.trim().parse().ok());
    Some((rtp, rtcp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_transport() {
        let th = TransportHeader::parse(
            "RTP/AVP;unicast;client_port=5000-5001;server_port=6970-6971;ssrc=1A2B3C4D",
        )
        .unwrap();
        assert_eq!(th.client_rtp_port, 5000);
        assert_eq!(th.client_rtcp_port, Some(5001));
        assert_eq!(th.server_rtp_port, Some(6970));
        assert_eq!(th.server_rtcp_port, Some(6971));
        assert_eq!(th.ssrc, Some(0x1A2B_3C4D));
    }

    #[test]
    fn single_client_port() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=7000").unwrap();
        assert_eq!(th.client_rtp_port, 7000);
        assert_eq!(th.client_rtcp_port, None);
    }

    #[test]
    fn parse_no_client_port() {
        assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
    }

    #[test]
    fn request_value_round_trips() {
        let th = TransportHeader::parse(&TransportHeader::for_client_port(4242)).unwrap();
        assert_eq!(th.client_rtp_port, 4242);
        assert_eq!(th.client_rtcp_port, Some(4243));
    }
}
