//! Peer identity.

use std::fmt;

/// Opaque identity of one connected peer.
///
/// Allocated by [`HubHandle::allocate_peer_id`](crate::hub::HubHandle::allocate_peer_id)
/// from a monotonically increasing counter, so two live peers never share an
/// id.  The hub compares ids to keep a sender's own broadcast from echoing
/// back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u64);

impl PeerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_prefixed() {
        assert_eq!(PeerId::new(7).to_string(), "peer-7");
    }

    #[test]
    fn test_ordering_follows_raw_value() {
        assert!(PeerId::new(1) < PeerId::new(2));
    }
}
