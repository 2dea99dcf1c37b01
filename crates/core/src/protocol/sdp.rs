//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! The DESCRIBE reply body lists the presentation's tracks:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 0 0 IN IP4 192.168.1.10                  ← origin
//! s=Movie                                      ← session name
//! a=range:npt=0.000-326.500                    ← playable range (session)
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=control:trackID=1                          ← track control URL
//! m=audio 0 RTP/AVP 0                          ← static payload type
//! a=control:trackID=2
//! ```
//!
//! Only the grammar the client depends on is enforced: every line is
//! `<letter>=<value>` and every `m=` line names a media type, port,
//! protocol and at least one format.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, RtspError};
use crate::protocol::range::Range;

/// An `a=` attribute: `a=name:value` or the flag form `a=name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

impl Attribute {
    fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((name, value)) => Attribute {
                name: name.trim().to_string(),
                value: Some(value.trim().to_string()),
            },
            None => Attribute {
                name: text.trim().to_string(),
                value: None,
            },
        }
    }
}

/// One `m=` section and the attributes that follow it.
#[derive(Debug, Clone)]
pub struct MediaDescription {
    /// Media type (`video`, `audio`, `application`, ...).
    pub media: String,
    pub port: u16,
    /// Transport protocol, e.g. `RTP/AVP`.
    pub protocol: String,
    /// Format list; for RTP these are payload type numbers.
    pub formats: Vec<String>,
    /// First format as an RTP payload type, when it is one.
    pub payload_type: Option<u8>,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        find_attribute(&self.attributes, name)
    }

    /// The `a=control` URL (absolute, or relative to the content base).
    pub fn control(&self) -> Option<&str> {
        self.attribute("control")
    }

    /// The `a=rtpmap` entry for this section's payload type.
    pub fn rtpmap(&self) -> Option<PayloadFormat> {
        self.attributes
            .iter()
            .filter(|a| a.name == "rtpmap")
            .filter_map(|a| a.value.as_deref().and_then(PayloadFormat::from_rtpmap))
            .find(|f| self.payload_type.is_none_or(|pt| pt == f.payload_type))
    }

    /// Payload format from `a=rtpmap`, falling back to the static payload
    /// type table (RFC 3551 §6).
    pub fn payload_format(&self) -> Option<PayloadFormat> {
        self.rtpmap()
            .or_else(|| self.payload_type.and_then(PayloadFormat::from_static))
    }

    /// Human-readable content descriptor, e.g. `video/H264`.
    pub fn content_descriptor(&self) -> Option<String> {
        self.payload_format()
            .map(|f| format!("{}/{}", self.media, f.encoding))
    }
}

/// A parsed session description.
#[derive(Debug, Clone)]
pub struct SessionDescription {
    /// Session-level `<type>=<value>` lines other than attributes, keyed by
    /// type letter (first occurrence wins).
    pub fields: HashMap<char, String>,
    pub attributes: Vec<Attribute>,
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    /// Parse a session description. Fails with
    /// [`RtspError::MalformedDescription`] on grammar violations.
    pub fn parse(text: &str) -> Result<Self> {
        let mut fields = HashMap::new();
        let mut attributes = Vec::new();
        let mut media: Vec<MediaDescription> = Vec::new();

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim_end_matches('\r').trim();
            if line.is_empty() {
                continue;
            }

            let (kind, value) = split_line(line).ok_or_else(|| {
                RtspError::MalformedDescription(format!("line {}: {:?}", lineno + 1, line))
            })?;

            match kind {
                'm' => media.push(parse_media_line(value).ok_or_else(|| {
                    RtspError::MalformedDescription(format!(
                        "line {}: bad media line {:?}",
                        lineno + 1,
                        value
                    ))
                })?),
                'a' => {
                    let attr = Attribute::parse(value);
                    match media.last_mut() {
                        Some(section) => section.attributes.push(attr),
                        None => attributes.push(attr),
                    }
                }
                other => {
                    // Media-level c=/b=/i= lines are not needed by the client.
                    if media.is_empty() {
                        fields.entry(other).or_insert_with(|| value.to_string());
                    }
                }
            }
        }

        if fields.is_empty() && attributes.is_empty() && media.is_empty() {
            return Err(RtspError::MalformedDescription("empty description".to_string()));
        }

        tracing::trace!(media = media.len(), attributes = attributes.len(), "parsed SDP");

        Ok(SessionDescription {
            fields,
            attributes,
            media,
        })
    }

    /// Session-level attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        find_attribute(&self.attributes, name)
    }

    /// Session-level `a=range`, when present and in npt form.
    pub fn range(&self) -> Option<Range> {
        self.attribute("range").and_then(Range::parse)
    }

    /// Session-level `a=control`, used as the aggregate URL when present.
    pub fn control(&self) -> Option<&str> {
        self.attribute("control")
    }

    pub fn media_count(&self) -> usize {
        self.media.len()
    }

    /// Session name (`s=`).
    pub fn name(&self) -> Option<&str> {
        self.fields.get(&'s').map(String::as_str)
    }
}

fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .map(|a| a.value.as_deref().unwrap_or(""))
}

/// `<letter>=<value>`.
fn split_line(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let kind = chars.next()?;
    if !kind.is_ascii_alphabetic() || chars.next()? != '=' {
        return None;
    }
    Some((kind, &line[2..]))
}

/// `<media> <port>[/<count>] <proto> <fmt> ...`
fn parse_media_line(value: &str) -> Option<MediaDescription> {
    let mut parts = value.split_whitespace();
    let media = parts.next()?.to_string();
    let port = parts.next()?.split('/').next()?.parse().ok()?;
    let protocol = parts.next()?.to_string();
    let formats: Vec<String> = parts.map(str::to_string).collect();
    if formats.is_empty() {
        return None;
    }

    let payload_type = if protocol.contains("RTP") {
        formats[0].parse::<u8>().ok().filter(|pt| *pt < 128)
    } else {
        None
    };

    Some(MediaDescription {
        media,
        port,
        protocol,
        formats,
        payload_type,
        attributes: Vec::new(),
    })
}

/// RTP payload format: `a=rtpmap:<pt> <encoding>/<clock>[/<channels>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFormat {
    pub payload_type: u8,
    pub encoding: String,
    pub clock_rate: u32,
    pub channels: Option<u16>,
}

impl PayloadFormat {
    pub fn from_rtpmap(value: &str) -> Option<Self> {
        let (pt, rest) = value.trim().split_once(char::is_whitespace)?;
        let payload_type = pt.parse().ok()?;
        let mut parts = rest.trim().split('/');
        let encoding = parts.next()?.to_string();
        let clock_rate = parts.next()?.parse().ok()?;
        let channels = parts.next().and_then(|c| c.parse().ok());
        Some(PayloadFormat {
            payload_type,
            encoding,
            clock_rate,
            channels,
        })
    }

    /// Look up a static payload type (RFC 3551 §6, Table 4 and 5).
    pub fn from_static(payload_type: u8) -> Option<Self> {
        let (encoding, clock_rate, channels) = match payload_type {
            0 => ("PCMU", 8_000, Some(1)),
            3 => ("GSM", 8_000, Some(1)),
            4 => ("G723", 8_000, Some(1)),
            5 => ("DVI4", 8_000, Some(1)),
            6 => ("DVI4", 16_000, Some(1)),
            7 => ("LPC", 8_000, Some(1)),
            8 => ("PCMA", 8_000, Some(1)),
            9 => ("G722", 8_000, Some(1)),
            10 => ("L16", 44_100, Some(2)),
            11 => ("L16", 44_100, Some(1)),
            12 => ("QCELP", 8_000, Some(1)),
            13 => ("CN", 8_000, Some(1)),
            14 => ("MPA", 90_000, None),
            15 => ("G728", 8_000, Some(1)),
            16 => ("DVI4", 11_025, Some(1)),
            17 => ("DVI4", 22_050, Some(1)),
            18 => ("G729", 8_000, Some(1)),
            25 => ("CelB", 90_000, None),
            26 => ("JPEG", 90_000, None),
            28 => ("nv", 90_000, None),
            31 => ("H261", 90_000, None),
            32 => ("MPV", 90_000, None),
            33 => ("MP2T", 90_000, None),
            34 => ("H263", 90_000, None),
            _ => return None,
        };
        Some(PayloadFormat {
            payload_type,
            encoding: encoding.to_string(),
            clock_rate,
            channels,
        })
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.encoding, self.clock_rate)?;
        if let Some(ch) = self.channels {
            write!(f, "/{}", ch)?;
        }
        Ok(())
    }
}
