pub mod frame;
pub mod header;
pub mod media_access_control;

use std::fmt;

pub use frame::{decode, encode, is_noise, Frame, MAX_FRAME_SIZE, NOISE_FRAME};
pub use header::{FrameHeader, FrameKind, HEADER_SIZE};
pub use media_access_control::{classify, next_delay, Response, MAX_ATTEMPTS};

/// Opaque 6 byte station identifier carried in every frame header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// All-zero address, used by the noise frame.
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Identifier the stations address their frames to.
    pub const CHANNEL: MacAddr = MacAddr([0xFF, 0xEE, 0xDD, 0x00, 0x00, 0x00]);

    const STATION_PREFIX: [u8; 3] = [0xAA, 0xBB, 0xCC];

    /// Station identifier derived from a local discriminator such as the
    /// station's local port, so that stations on one host stay distinct.
    pub fn station(discriminator: u32) -> Self {
        let low = discriminator.to_be_bytes();
        MacAddr([
            Self::STATION_PREFIX[0],
            Self::STATION_PREFIX[1],
            Self::STATION_PREFIX[2],
            low[1],
            low[2],
            low[3],
        ])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}
