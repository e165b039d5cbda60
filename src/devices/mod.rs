pub mod channel;
pub mod station;

pub use channel::{Channel, ChannelReport, SlotCounters, SlotOutcome};
pub use station::{fragment, Station, StationState, TransferReport};
