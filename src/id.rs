use embedded_can::ExtendedId;

/// A NMEA 2000 message identifier. According to N2K specification, this is a
/// 29-bit extended CAN ID with a 3-bit priority, a 18-bit parameter group
/// number (PGN), and an 8-bit source address. PDU1 PGNs also carry a
/// destination address in the low byte of the PGN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id(ExtendedId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Addressed; the PF byte is below 240.
    Pdu1,
    /// Broadcast only.
    Pdu2,
}

impl Format {
    #[inline]
    #[must_use]
    pub fn from_pgn(pgn: u32) -> Self {
        if ((pgn >> 8) & 0xff) < 240 {
            Self::Pdu1
        } else {
            Self::Pdu2
        }
    }
}

pub const DESTINATION_BROADCAST: u8 = 0xff;

/// Source address used before an address has been claimed.
pub const ADDRESS_NULL: u8 = 0xfe;

impl Id {
    #[inline]
    #[must_use]
    pub fn new(priority: u8, pgn: u32, source: u8, destination: u8) -> Self {
        let pgn = pgn & 0x3ffff;

        let id = match Format::from_pgn(pgn) {
            // the destination replaces the PS byte
            Format::Pdu1 => {
                ((priority as u32 & 0x7) << 26)
                    | ((pgn & 0x3ff00) << 8)
                    | ((destination as u32) << 8)
                    | source as u32
            }
            Format::Pdu2 => ((priority as u32 & 0x7) << 26) | (pgn << 8) | source as u32,
        };

        // at most 29 bits by construction
        Self(ExtendedId::new(id).unwrap_or(ExtendedId::ZERO))
    }

    /// Create a new identifier from an extended CAN ID.
    #[inline]
    #[must_use]
    pub const fn from_can_id(can_id: ExtendedId) -> Self {
        Self(can_id)
    }

    #[inline]
    #[must_use]
    pub const fn as_can_id(self) -> ExtendedId {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn priority(self) -> u8 {
        (self.0.as_raw() >> 26) as u8 & 0x7
    }

    #[inline]
    #[must_use]
    pub fn pgn(self) -> u32 {
        match self.format() {
            Format::Pdu1 => (self.0.as_raw() >> 8) & 0x3ff00,
            Format::Pdu2 => (self.0.as_raw() >> 8) & 0x3ffff,
        }
    }

    #[inline]
    #[must_use]
    pub fn source(self) -> u8 {
        self.0.as_raw() as u8
    }

    #[inline]
    pub fn set_source(&mut self, source: u8) {
        let raw = (self.0.as_raw() & 0x1fff_ff00) | source as u32;
        self.0 = ExtendedId::new(raw).unwrap_or(self.0);
    }

    #[inline]
    #[must_use]
    pub fn format(self) -> Format {
        Format::from_pgn(self.0.as_raw() >> 8)
    }

    #[inline]
    #[must_use]
    pub fn destination(self) -> u8 {
        match self.format() {
            Format::Pdu1 => (self.0.as_raw() >> 8) as u8,
            Format::Pdu2 => DESTINATION_BROADCAST, // implied global
        }
    }
}

impl From<ExtendedId> for Id {
    fn from(id: ExtendedId) -> Self {
        Self::from_can_id(id)
    }
}

impl From<Id> for embedded_can::Id {
    fn from(id: Id) -> Self {
        Self::Extended(id.as_can_id())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Id {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Id({:x})", self.0.as_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressed_pgn_carries_destination() {
        let id = Id::new(6, 59_904, 0xfe, 0x23);

        assert_eq!(id.as_can_id().as_raw(), 0x18ea_23fe);
        assert_eq!(id.format(), Format::Pdu1);
        assert_eq!(id.pgn(), 59_904);
        assert_eq!(id.destination(), 0x23);
        assert_eq!(id.source(), 0xfe);
        assert_eq!(id.priority(), 6);
    }

    #[test]
    fn broadcast_pgn_ignores_destination() {
        let mut id = Id::new(7, 126_993, 100, 0x23);

        assert_eq!(id.as_can_id().as_raw(), 0x1df0_1164);
        assert_eq!(id.format(), Format::Pdu2);
        assert_eq!(id.pgn(), 126_993);
        assert_eq!(id.destination(), DESTINATION_BROADCAST);

        id.set_source(101);
        assert_eq!(id.source(), 101);
        assert_eq!(id.pgn(), 126_993);
    }
}
