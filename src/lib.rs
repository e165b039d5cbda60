pub mod config;
pub mod devices;
pub mod error;
pub mod layers;
pub mod utils;

pub use config::{ChannelConfig, StationConfig};
pub use devices::{Channel, ChannelReport, SlotOutcome, Station, TransferReport};
pub use layers::{Frame, FrameHeader, FrameKind, Link, MacAddr, HEADER_SIZE, MAX_FRAME_SIZE};
pub use utils::Simulateable;
