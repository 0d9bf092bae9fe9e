// Recording transport for unit tests

use super::{PeerTransport, SdpKind, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateDataChannel(String),
    SetRemoteDescription(String, SdpKind),
    AddRemoteCandidate(String),
    Send(Vec<u8>),
    Close,
}

/// Records every call; can be told to reject the next few remote descriptions
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub calls: Vec<Call>,
    pub reject_descriptions: usize,
}

impl RecordingTransport {
    pub fn descriptions(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::SetRemoteDescription(sdp, _) => Some(sdp.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn candidates(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::AddRemoteCandidate(candidate) => Some(candidate.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<&[u8]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Send(frame) => Some(frame.as_slice()),
                _ => None,
            })
            .collect()
    }
}

impl PeerTransport for RecordingTransport {
    fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError> {
        self.calls.push(Call::CreateDataChannel(label.to_string()));
        Ok(())
    }

    fn set_remote_description(&mut self, sdp: &str, kind: SdpKind) -> Result<(), TransportError> {
        if self.reject_descriptions > 0 {
            self.reject_descriptions -= 1;
            return Err(TransportError::Rejected("not ready".to_string()));
        }
        self.calls
            .push(Call::SetRemoteDescription(sdp.to_string(), kind));
        Ok(())
    }

    fn add_remote_candidate(&mut self, candidate: &str) -> Result<(), TransportError> {
        self.calls.push(Call::AddRemoteCandidate(candidate.to_string()));
        Ok(())
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.calls.push(Call::Send(frame));
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(Call::Close);
    }
}
