// File-based signaling: the mailbox text format and the polling exchange
// that replaces a live signaling server

pub mod codec;
pub mod mailbox;
pub mod relay;

pub use codec::{decode, encode, SignalingMessage};
pub use mailbox::{await_remote, LocalSignal, Mailbox, MailboxExchange, MailboxSlot, PollOutcome};
