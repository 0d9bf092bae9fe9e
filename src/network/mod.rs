// Peer transport layer for the simulation bridge
// Handles the WebRTC data channel and reports transport events to the connector

pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod protocol;
pub mod webrtc_runtime;

pub use client::Str0mTransport;
pub use webrtc_runtime::TransportOptions;
pub use protocol::{decode_frame_into, encode_frame, frame_len, FrameError};

use std::fmt;
use thiserror::Error;

/// Which side of the offer/answer exchange a remote description came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// Data channel message as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// False for text messages
    pub binary: bool,
    pub data: Vec<u8>,
}

impl Payload {
    pub fn binary(data: Vec<u8>) -> Self {
        Self { binary: true, data }
    }

    pub fn text(text: &str) -> Self {
        Self {
            binary: false,
            data: text.as_bytes().to_vec(),
        }
    }
}

/// Events the transport reports to the connector, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Local session description is ready to publish
    LocalDescription(String),

    /// A local ICE candidate was gathered
    LocalCandidate(String),

    /// The data channel is open (created locally or announced by the remote)
    ChannelOpen { label: String },

    /// A message arrived on the data channel
    Message(Payload),

    /// ICE lost the remote peer
    Disconnected,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport refused a remote description or candidate
    #[error("rejected by transport: {0}")]
    Rejected(String),

    #[error("no data channel is open")]
    NoChannel,

    /// The transport thread is gone
    #[error("transport closed")]
    Closed,

    #[error("transport setup failed: {0}")]
    Setup(String),

    #[error("webrtc engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Operations the connector needs from a peer connection
///
/// Notifications flow the other way, as [`TransportEvent`]s on the queue
/// handed out together with the transport.
pub trait PeerTransport {
    /// Create the data channel; on the offering side this produces the local offer
    fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError>;

    /// Apply the remote session description
    fn set_remote_description(&mut self, sdp: &str, kind: SdpKind) -> Result<(), TransportError>;

    /// Apply one remote ICE candidate
    fn add_remote_candidate(&mut self, candidate: &str) -> Result<(), TransportError>;

    /// Send one binary frame on the data channel
    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Release the connection
    fn close(&mut self);
}
