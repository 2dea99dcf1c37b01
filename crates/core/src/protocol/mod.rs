//! Client side of the RTSP control protocol (RFC 2326).
//!
//! Builds requests and parses replies, including the SDP returned by
//! DESCRIBE.
//!
//! A session walks through these exchanges, each request carrying the next
//! CSeq and (after the first SETUP) the server's session id:
//!
//! ```text
//! C->S  DESCRIBE rtsp://cam/live RTSP/1.0      Accept: application/sdp
//! S->C  200 OK                                 Content-Base, SDP body
//! C->S  SETUP <base>/trackID=1 RTSP/1.0        Transport: client_port=P-P+1
//! S->C  200 OK                                 Session: id;timeout=60
//! C->S  PLAY | PAUSE | GET_PARAMETER           Session: id
//! C->S  TEARDOWN                               Session: id
//! ```
//!
//! Replies are matched to requests by CSeq. A reply whose status is not 2xx
//! turns into [`crate::RtspError::Protocol`].

pub mod range;
pub mod request;
pub mod response;
pub mod sdp;

pub use range::{NptTime, Range};
pub use request::{Method, RtspRequest};
pub use response::{RtspResponse, SessionHeader};
pub use sdp::{MediaDescription, PayloadFormat, SessionDescription};
