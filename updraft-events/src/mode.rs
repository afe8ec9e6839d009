//! Delivery mode flags of the user long poll

use bitflags::bitflags;

bitflags! {
    /// Optional fields the long poll server includes in updates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeliveryMode: u32 {
        /// Attachments object on message updates
        const ATTACHMENTS = 2;
        /// Extended set of events
        const EXTENDED = 8;
        /// `pts` in poll responses
        const PTS = 32;
        /// Platform id on "friend online" updates
        const EXTRA_ONLINE = 64;
        /// `random_id` on message updates
        const RANDOM_ID = 128;
    }
}

impl DeliveryMode {
    /// Parse a raw bitmask, rejecting unknown bits.
    pub fn from_raw(bits: u32) -> Option<Self> {
        Self::from_bits(bits)
    }
}
