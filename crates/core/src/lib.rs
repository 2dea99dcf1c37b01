pub mod client;
pub mod error;
pub mod locator;
pub mod media;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{ClientConfig, SessionController};
pub use error::{Result, RtspError};
pub use locator::RtspUrl;
pub use media::Packet;
pub use session::{ReceiverFailurePolicy, SessionHealth, SessionState, TrackStream};
