// Shared-directory mailbox standing in for a signaling server
// Each side publishes its description and candidates to a file the other side polls

use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::codec::{decode, SignalingMessage};
use crate::network::{PeerTransport, SdpKind, TransportError, TransportEvent};
use crate::shutdown::ShutdownToken;

/// Polling cadence for the remote mailbox file
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The two files of a mailbox directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSlot {
    /// Written by the offering side, read by the answering side
    Offer,
    /// Written by the answering side, read by the offering side
    Answer,
}

impl MailboxSlot {
    pub fn file_name(self) -> &'static str {
        match self {
            MailboxSlot::Offer => "offer.txt",
            MailboxSlot::Answer => "answer.txt",
        }
    }

    /// Kind of session description stored in this slot
    pub fn sdp_kind(self) -> SdpKind {
        match self {
            MailboxSlot::Offer => SdpKind::Offer,
            MailboxSlot::Answer => SdpKind::Answer,
        }
    }
}

/// Mailbox directory of one peer session: `<root>/<client_id>/{offer,answer}.txt`
#[derive(Debug, Clone)]
pub struct Mailbox {
    dir: PathBuf,
}

impl Mailbox {
    pub fn new(root: &Path, client_id: &str) -> Self {
        Self {
            dir: root.join(client_id),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, slot: MailboxSlot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    /// Replace the slot's file with `message`
    ///
    /// The text goes to a temporary sibling first and is renamed into place, so
    /// a concurrent reader sees either the previous or the new message.
    /// Failures are logged; the next read of the slot simply comes back empty.
    pub fn publish(&self, slot: MailboxSlot, message: &SignalingMessage) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("Cannot create mailbox directory {}: {}", self.dir.display(), e);
        }

        let path = self.path(slot);
        let tmp = self.dir.join(format!(".{}.tmp", slot.file_name()));
        let result = fs::write(&tmp, message.encode()).and_then(|_| fs::rename(&tmp, &path));
        match result {
            Ok(()) => debug!(
                "Published {} ({} candidates) to {}",
                slot.sdp_kind(),
                message.candidates.len(),
                path.display()
            ),
            Err(e) => warn!("Cannot write signaling to {}: {}", path.display(), e),
        }
    }

    /// Read and decode the slot; `None` while the file is absent or incomplete
    pub fn read(&self, slot: MailboxSlot) -> Option<SignalingMessage> {
        read_message(&self.path(slot))
    }

    /// Delete the slot's file; a missing file is not an error
    pub fn remove(&self, slot: MailboxSlot) {
        let path = self.path(slot);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
        }
    }
}

fn read_message(path: &Path) -> Option<SignalingMessage> {
    match fs::read_to_string(path) {
        Ok(text) => decode(&text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

/// Local description and candidates gathered so far
///
/// Candidates are only ever appended. Nothing is published until the
/// description exists; candidates gathered before it are held and go out with it.
#[derive(Debug, Default)]
pub struct LocalSignal {
    description: Option<String>,
    candidates: Vec<String>,
}

impl LocalSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_description(&self) -> bool {
        self.description.is_some()
    }

    pub fn set_description(&mut self, description: String) -> Option<SignalingMessage> {
        self.description = Some(description);
        self.message()
    }

    pub fn add_candidate(&mut self, candidate: &str) -> Option<SignalingMessage> {
        // One candidate per mailbox line
        let candidate = candidate.trim();
        if !candidate.is_empty() {
            self.candidates.push(candidate.to_string());
        }
        self.message()
    }

    /// Current publishable message, if the description is known
    pub fn message(&self) -> Option<SignalingMessage> {
        self.description
            .as_ref()
            .map(|description| SignalingMessage::new(description.clone(), self.candidates.clone()))
    }

    /// Record a local signaling event and republish the mailbox slot
    ///
    /// Any other event is handed back to the caller.
    pub fn absorb(
        &mut self,
        event: TransportEvent,
        mailbox: &Mailbox,
        slot: MailboxSlot,
    ) -> Option<TransportEvent> {
        let message = match event {
            TransportEvent::LocalDescription(description) => {
                let message = self.set_description(description);
                info!("Local {} ready, writing {}", slot.sdp_kind(), mailbox.path(slot).display());
                message
            }
            TransportEvent::LocalCandidate(candidate) => {
                let message = self.add_candidate(&candidate);
                debug!("Local candidate #{}: {}", self.candidates.len(), candidate.trim());
                message
            }
            other => return Some(other),
        };
        if let Some(message) = message {
            mailbox.publish(slot, &message);
        }
        None
    }
}

/// Result of one read-decode-apply attempt
#[derive(Debug)]
pub enum PollOutcome {
    /// File absent or not yet complete
    Pending,

    /// Transport refused the description or a candidate; retry on the next poll
    Rejected(TransportError),

    /// Description and every listed candidate have been applied
    Applied(SignalingMessage),
}

/// Polls the remote mailbox file and applies what it finds to the local connection
///
/// Progress survives retries: an accepted description is never applied again
/// and accepted candidates are skipped, so later polls only apply what is new.
#[derive(Debug)]
pub struct MailboxExchange {
    path: PathBuf,
    kind: SdpKind,
    interval: Duration,
    description_applied: bool,
    candidates_applied: usize,
}

impl MailboxExchange {
    pub fn new(path: PathBuf, kind: SdpKind) -> Self {
        Self {
            path,
            kind,
            interval: DEFAULT_POLL_INTERVAL,
            description_applied: false,
            candidates_applied: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn description_applied(&self) -> bool {
        self.description_applied
    }

    pub fn candidates_applied(&self) -> usize {
        self.candidates_applied
    }

    /// One read-decode-apply attempt
    pub fn poll<P: PeerTransport + ?Sized>(&mut self, peer: &mut P) -> PollOutcome {
        let Some(message) = read_message(&self.path) else {
            return PollOutcome::Pending;
        };

        match self.apply(&message, peer) {
            Ok(()) => PollOutcome::Applied(message),
            Err(e) => PollOutcome::Rejected(e),
        }
    }

    fn apply<P: PeerTransport + ?Sized>(
        &mut self,
        message: &SignalingMessage,
        peer: &mut P,
    ) -> Result<(), TransportError> {
        if !self.description_applied {
            peer.set_remote_description(&message.description, self.kind)?;
            self.description_applied = true;
        }
        for candidate in message.candidates.iter().skip(self.candidates_applied) {
            peer.add_remote_candidate(candidate)?;
            self.candidates_applied += 1;
        }
        Ok(())
    }

    /// Apply candidates appended to the remote file since the last successful poll
    ///
    /// Only meaningful once the description is in; returns how many were applied.
    pub fn apply_new_candidates<P: PeerTransport + ?Sized>(&mut self, peer: &mut P) -> usize {
        if !self.description_applied {
            return 0;
        }
        let before = self.candidates_applied;
        if let PollOutcome::Rejected(e) = self.poll(peer) {
            warn!("Applying remote candidate failed: {}", e);
        }
        let applied = self.candidates_applied - before;
        if applied > 0 {
            info!("Applied {} trickled remote candidate(s)", applied);
        }
        applied
    }

    /// Block until the remote description is applied
    ///
    /// `between_polls` runs once per interval before sleeping; the connector uses
    /// it to keep publishing local signaling while it waits. Returns `None` when
    /// `shutdown` is cancelled or `between_polls` breaks.
    pub fn await_remote<P, F>(
        &mut self,
        peer: &mut P,
        shutdown: &ShutdownToken,
        mut between_polls: F,
    ) -> Option<SignalingMessage>
    where
        P: PeerTransport + ?Sized,
        F: FnMut() -> ControlFlow<()>,
    {
        info!("Waiting for {} ...", self.path.display());
        loop {
            if shutdown.is_cancelled() {
                info!("Stopped waiting for {}", self.path.display());
                return None;
            }
            match self.poll(peer) {
                PollOutcome::Applied(message) => {
                    info!(
                        "Applied {} (cands={})",
                        self.kind,
                        message.candidates.len()
                    );
                    return Some(message);
                }
                PollOutcome::Rejected(e) => warn!("Applying {} failed: {}", self.kind, e),
                PollOutcome::Pending => {}
            }
            if between_polls().is_break() {
                return None;
            }
            thread::sleep(self.interval);
        }
    }
}

/// Block until the mailbox file at `path` holds a description the peer accepts
///
/// Returns `None` only when `shutdown` is cancelled during the wait.
pub fn await_remote<P: PeerTransport + ?Sized>(
    path: &Path,
    kind: SdpKind,
    peer: &mut P,
    shutdown: &ShutdownToken,
) -> Option<SignalingMessage> {
    MailboxExchange::new(path.to_path_buf(), kind)
        .await_remote(peer, shutdown, || ControlFlow::Continue(()))
}
