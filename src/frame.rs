use crate::{
    fast_packet::{self, FastPacket},
    Id,
};

/// A single CAN frame of a NMEA 2000 message.
#[derive(Debug, Clone, PartialEq, PartialOrd, Eq, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NmeaFrame {
    pub id: Id,
    pub data: heapless::Vec<u8, 8>,
}

impl NmeaFrame {
    pub const DEFAULT: Self = Self {
        id: Id::from_can_id(embedded_can::ExtendedId::ZERO),
        data: heapless::Vec::new(),
    };

    pub fn new(id: Id, data: heapless::Vec<u8, 8>) -> Self {
        Self { id, data }
    }

    /// A frame from a slice of at most 8 bytes.
    pub fn from_slice(id: Id, data: &[u8]) -> Option<Self> {
        Some(Self {
            id,
            data: heapless::Vec::from_slice(data).ok()?,
        })
    }

    pub fn to_can_frame<T: embedded_can::Frame>(&self) -> Option<T> {
        T::new(self.id.as_can_id(), &self.data)
    }

    /// Split an encoded message into frames: one frame if it fits, a Fast
    /// Packet sequence otherwise. `None` if the message is too long for a
    /// Fast Packet sequence.
    pub fn split(id: Id, data: &[u8], sequence_no: u8) -> Option<Frames<'_>> {
        if data.len() <= 8 {
            return Some(Frames::Single(NmeaFrame::from_slice(id, data)));
        }

        match fast_packet::Iter::new(data, sequence_no) {
            Some(iter) => Some(Frames::Fast(id, iter)),
            None => {
                error!("pgn {}: {} bytes do not fit a fast packet", id.pgn(), data.len());
                None
            }
        }
    }
}

/// See [`NmeaFrame::split`].
pub enum Frames<'a> {
    Single(Option<NmeaFrame>),
    Fast(Id, fast_packet::Iter<'a>),
}

impl Iterator for Frames<'_> {
    type Item = NmeaFrame;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Frames::Single(frame) => frame.take(),
            Frames::Fast(id, iter) => iter.next().map(|FastPacket(bytes)| NmeaFrame {
                id: *id,
                data: heapless::Vec::from_slice(&bytes).unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::well_known::PGN_HEARTBEAT;

    #[test]
    fn short_messages_fit_one_frame() {
        let id = Id::new(7, PGN_HEARTBEAT, 100, 0xff);
        let frames: Vec<_> = NmeaFrame::split(id, &[1, 2, 3], 0).unwrap().collect();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, [1, 2, 3]);
        assert_eq!(frames[0].id, id);
    }

    #[test]
    fn long_messages_become_fast_packets() {
        let id = Id::new(6, 126_996, 100, 0xff);
        let data = [0xaa; 134];
        let frames: Vec<_> = NmeaFrame::split(id, &data, 2).unwrap().collect();

        // 6 bytes in the first frame, 7 in each following
        assert_eq!(frames.len(), 20);
        assert_eq!(frames[0].data[0], 0b0100_0000);
        assert_eq!(frames[0].data[1], 134);
        assert_eq!(frames[19].data[0], 0b0100_0000 | 19);
        assert!(frames.iter().all(|f| f.id == id && f.data.len() == 8));
    }

    #[test]
    fn oversized_messages_are_not_split() {
        let id = Id::new(6, 126_998, 100, 0xff);

        assert!(NmeaFrame::split(id, &[0; fast_packet::MAX_LEN], 0).is_some());
        assert!(NmeaFrame::split(id, &[0; fast_packet::MAX_LEN + 1], 0).is_none());
    }
}
