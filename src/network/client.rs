// Handle to the str0m transport thread
// Commands go to the driver over a channel; events come back on the queue returned by start()

use std::sync::mpsc;
use std::thread::JoinHandle;

use tracing::debug;

use super::webrtc_runtime::{self, TransportOptions};
use super::{PeerTransport, SdpKind, TransportError, TransportEvent};

pub(crate) type Reply = mpsc::Sender<Result<(), TransportError>>;

/// Commands the connector sends to the transport thread
#[derive(Debug)]
pub(crate) enum TransportCommand {
    /// Add the data channel and produce the local offer
    CreateChannel { label: String, reply: Reply },

    /// Apply the remote offer (producing the local answer) or the remote answer
    SetRemoteDescription {
        sdp: String,
        kind: SdpKind,
        reply: Reply,
    },

    /// Apply one remote ICE candidate
    AddRemoteCandidate { candidate: String, reply: Reply },

    /// Write one binary frame to the open data channel
    Send(Vec<u8>),

    /// Tear the peer connection down and stop the thread
    Close,
}

/// Peer connection backed by a str0m driver thread
pub struct Str0mTransport {
    /// Send commands TO the transport thread
    tx: mpsc::Sender<TransportCommand>,

    thread: Option<JoinHandle<()>>,
}

impl Str0mTransport {
    /// Bind a socket, gather local candidates and start the driver thread
    ///
    /// Returns the handle and the queue the driver reports [`TransportEvent`]s on.
    pub fn start(
        options: TransportOptions,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), TransportError> {
        let (tx, events, thread) = webrtc_runtime::spawn_transport_thread(options)?;
        Ok((
            Self {
                tx,
                thread: Some(thread),
            },
            events,
        ))
    }

    /// Send a command and wait for the driver's verdict
    fn request(&self, build: impl FnOnce(Reply) -> TransportCommand) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| TransportError::Closed)?;
        reply_rx.recv().map_err(|_| TransportError::Closed)?
    }
}

impl PeerTransport for Str0mTransport {
    fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError> {
        let label = label.to_string();
        self.request(|reply| TransportCommand::CreateChannel { label, reply })
    }

    fn set_remote_description(&mut self, sdp: &str, kind: SdpKind) -> Result<(), TransportError> {
        let sdp = sdp.to_string();
        self.request(|reply| TransportCommand::SetRemoteDescription { sdp, kind, reply })
    }

    fn add_remote_candidate(&mut self, candidate: &str) -> Result<(), TransportError> {
        let candidate = candidate.to_string();
        self.request(|reply| TransportCommand::AddRemoteCandidate { candidate, reply })
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(TransportCommand::Send(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        let _ = self.tx.send(TransportCommand::Close);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("Transport thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Str0mTransport {
    fn drop(&mut self) {
        self.close();
    }
}
