//! Because the maximum size of a frame is 8 bytes, NMEA 2000 splits larger
//! messages into multiple frames, so-called Fast Packets. Each frame contains
//! a sequence number, a frame number, and the actual data. The first frame also
//! contains the length of the total message transmitted ([`FastPacket::total_len`]).

/// Largest payload a Fast Packet sequence can carry: 6 bytes in the first
/// frame and 7 in each of the 31 following ones.
pub const MAX_LEN: usize = 223;

/// See the [module-level documentation](self) for more information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastPacket(pub [u8; 8]);

impl FastPacket {
    /// The number of the frame within the sequence, starting from 0.
    #[inline]
    #[must_use]
    pub const fn frame_no(&self) -> u8 {
        self.0[0] & 0x1f
    }

    /// The sequence number of the frames. All frames of the same sequence can
    /// be combined to form the original message.
    #[inline]
    #[must_use]
    pub const fn sequence_no(&self) -> u8 {
        self.0[0] >> 5
    }

    #[inline]
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.frame_no() == 0
    }

    #[inline]
    #[must_use]
    pub const fn total_len(&self) -> Option<u8> {
        if self.is_first() {
            Some(self.0[1])
        } else {
            None
        }
    }

    /// The data contained in the frame.
    ///
    /// The last frame of a sequence is padded with 0xff, so only the first
    /// [`FastPacket::total_len`] bytes of the sequence are meaningful.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        if self.is_first() {
            &self.0[2..]
        } else {
            &self.0[1..]
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        if self.is_first() {
            &mut self.0[2..]
        } else {
            &mut self.0[1..]
        }
    }
}

/// Splits an encoded message into Fast Packet frames.
pub struct Iter<'a> {
    buf: &'a [u8],
    sequence_no: u8,
    frame_no: u8,
}

impl<'a> Iter<'a> {
    /// Creates a new iterator over the given data, or `None` if it is longer
    /// than [`MAX_LEN`] bytes.
    pub fn new(buf: &'a [u8], sequence_no: u8) -> Option<Self> {
        if buf.len() > MAX_LEN {
            return None;
        }

        Some(Self {
            buf,
            sequence_no: sequence_no & 0x07,
            frame_no: 0,
        })
    }
}

impl Iterator for Iter<'_> {
    type Item = FastPacket;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() && self.frame_no > 0 {
            return None;
        }

        let mut packet = FastPacket([0xff; 8]);
        packet.0[0] = (self.sequence_no << 5) | self.frame_no;

        if packet.is_first() {
            packet.0[1] = self.buf.len() as u8;
        }

        let dest = packet.data_mut();
        let len = self.buf.len().min(dest.len());
        let (head, rest) = self.buf.split_at(len);

        dest[..len].copy_from_slice(head);
        self.buf = rest;
        self.frame_no += 1;

        Some(packet)
    }
}
