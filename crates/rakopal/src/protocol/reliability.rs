/// Delivery guarantees for one encapsulated packet, as carried in the
/// 3-bit reliability field of its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Reliability {
    #[default]
    Unreliable = 0,
    UnreliableSequenced = 1,
    Reliable = 2,
    ReliableOrdered = 3,
    ReliableSequenced = 4,
}

impl Reliability {
    #[inline]
    pub fn from_bits(value: u8) -> Option<Self> {
        match value {
            0 => Some(Reliability::Unreliable),
            1 => Some(Reliability::UnreliableSequenced),
            2 => Some(Reliability::Reliable),
            3 => Some(Reliability::ReliableOrdered),
            4 => Some(Reliability::ReliableSequenced),
            _ => None,
        }
    }

    /// Reliable packets are deduplicated, acknowledged and retransmitted.
    #[inline]
    pub const fn is_reliable(self) -> bool {
        matches!(
            self,
            Reliability::Reliable | Reliability::ReliableOrdered | Reliability::ReliableSequenced
        )
    }

    /// Ordered packets are held back until every predecessor on their
    /// channel has been delivered.
    #[inline]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Reliability::ReliableOrdered)
    }

    /// Sequenced packets are delivered newest-wins; older arrivals on the
    /// channel are discarded.
    #[inline]
    pub const fn is_sequenced(self) -> bool {
        matches!(
            self,
            Reliability::UnreliableSequenced | Reliability::ReliableSequenced
        )
    }

    /// Whether the header carries an ordering channel and index.
    #[inline]
    pub const fn carries_ordering(self) -> bool {
        self.is_ordered() || self.is_sequenced()
    }

    /// Whether the header carries a reliable message number. Everything
    /// above plain unreliable does.
    #[inline]
    pub const fn carries_message_number(self) -> bool {
        !matches!(self, Reliability::Unreliable)
    }
}
