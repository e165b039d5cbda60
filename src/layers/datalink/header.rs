use super::MacAddr;

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 20;

/// Sequence number reserved for the noise frame
pub const NOISE_SEQUENCE: u32 = 0xFFFF_FFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    Noise,
    /// Any other value found on the wire, kept verbatim
    Unknown(u16),
}

impl From<u16> for FrameKind {
    fn from(value: u16) -> Self {
        match value {
            0 => FrameKind::Data,
            2 => FrameKind::Noise,
            other => FrameKind::Unknown(other),
        }
    }
}

impl From<FrameKind> for u16 {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Data => 0,
            FrameKind::Noise => 2,
            FrameKind::Unknown(other) => other,
        }
    }
}

/// Fixed layout header that precedes every payload.
///
/// | Offset | Field          | Size |
/// |--------|----------------|------|
/// | 0      | source         | 6    |
/// | 6      | destination    | 6    |
/// | 12     | kind           | 2    |
/// | 14     | sequence       | 4    |
/// | 18     | payload_len    | 2    |
///
/// Multi-byte fields are little-endian on both ends of the link.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    pub source: MacAddr,
    pub destination: MacAddr,
    pub kind: FrameKind,
    pub sequence: u32,
    pub payload_len: u16,
}

impl FrameHeader {
    pub fn data(source: MacAddr, destination: MacAddr, sequence: u32, payload_len: u16) -> Self {
        FrameHeader {
            source,
            destination,
            kind: FrameKind::Data,
            sequence,
            payload_len,
        }
    }

    /// The collision sentinel header
    pub const fn noise() -> Self {
        FrameHeader {
            source: MacAddr::ZERO,
            destination: MacAddr::ZERO,
            kind: FrameKind::Noise,
            sequence: NOISE_SEQUENCE,
            payload_len: 0,
        }
    }

    pub fn src(&self) -> &MacAddr {
        &self.source
    }

    pub fn dest(&self) -> &MacAddr {
        &self.destination
    }

    /// Total size of the frame this header announces
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }

    /// Returns the wire representation of the header
    pub fn to_le_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        bytes[0..6].copy_from_slice(&self.source.0);
        bytes[6..12].copy_from_slice(&self.destination.0);
        bytes[12..14].copy_from_slice(&u16::from(self.kind).to_le_bytes());
        bytes[14..18].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[18..20].copy_from_slice(&self.payload_len.to_le_bytes());
        bytes
    }

    pub fn from_le_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut source = [0; 6];
        let mut destination = [0; 6];
        source.copy_from_slice(&bytes[0..6]);
        destination.copy_from_slice(&bytes[6..12]);
        FrameHeader {
            source: MacAddr(source),
            destination: MacAddr(destination),
            kind: FrameKind::from(u16::from_le_bytes([bytes[12], bytes[13]])),
            sequence: u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]),
            payload_len: u16::from_le_bytes([bytes[18], bytes[19]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let header = FrameHeader::data(
            MacAddr([1, 2, 3, 4, 5, 6]),
            MacAddr([7, 8, 9, 10, 11, 12]),
            0x0403_0201,
            0x0201,
        );
        let bytes = header.to_le_bytes();
        assert_eq!(&bytes[0..6], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&bytes[6..12], &[7, 8, 9, 10, 11, 12]);
        assert_eq!(&bytes[12..14], &[0, 0]);
        assert_eq!(&bytes[14..18], &[1, 2, 3, 4]);
        assert_eq!(&bytes[18..20], &[1, 2]);
        assert_eq!(FrameHeader::from_le_bytes(&bytes), header);
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let mut bytes = FrameHeader::noise().to_le_bytes();
        bytes[12] = 7;
        let header = FrameHeader::from_le_bytes(&bytes);
        assert_eq!(header.kind, FrameKind::Unknown(7));
        assert_eq!(header.to_le_bytes(), bytes);
    }

    #[test]
    fn test_frame_len() {
        let header = FrameHeader::data(MacAddr::ZERO, MacAddr::CHANNEL, 0, 10);
        assert_eq!(header.frame_len(), 30);
        assert_eq!(FrameHeader::noise().frame_len(), HEADER_SIZE);
    }
}
