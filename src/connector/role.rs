// Offerer and answerer behaviour as plain data

use crate::network::SdpKind;
use crate::signaling::MailboxSlot;

/// What distinguishes the two sides of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    pub name: &'static str,

    /// Mailbox slot this side publishes to
    pub writes: MailboxSlot,

    /// Mailbox slot this side waits for
    pub awaits: MailboxSlot,

    /// Creates the data channel up front (and with it the offer)
    pub creates_channel: bool,

    /// Sends the first frame right after the simulation handshake
    pub speaks_first: bool,

    /// Stale files deleted before anything is written
    pub clears_on_start: &'static [MailboxSlot],
}

impl Role {
    pub const OFFERER: Role = Role {
        name: "server",
        writes: MailboxSlot::Offer,
        awaits: MailboxSlot::Answer,
        creates_channel: true,
        speaks_first: true,
        clears_on_start: &[MailboxSlot::Offer, MailboxSlot::Answer],
    };

    // Never clears offer.txt: the offer may already be live
    pub const ANSWERER: Role = Role {
        name: "client",
        writes: MailboxSlot::Answer,
        awaits: MailboxSlot::Offer,
        creates_channel: false,
        speaks_first: false,
        clears_on_start: &[MailboxSlot::Answer],
    };

    /// Kind of the description found in the awaited slot
    pub fn remote_kind(&self) -> SdpKind {
        self.awaits.sdp_kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_mirror_each_other() {
        assert_eq!(Role::OFFERER.writes, Role::ANSWERER.awaits);
        assert_eq!(Role::OFFERER.awaits, Role::ANSWERER.writes);
        assert_eq!(Role::OFFERER.remote_kind(), SdpKind::Answer);
        assert_eq!(Role::ANSWERER.remote_kind(), SdpKind::Offer);
        assert!(!Role::ANSWERER.clears_on_start.contains(&MailboxSlot::Offer));
    }
}
