//! Command line configuration for the channel and station binaries.
//!
//! Both programs take positional arguments only; the argument list handed to
//! `from_args` excludes the program name.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::layers::{HEADER_SIZE, MAX_FRAME_SIZE};

/// Settings for the channel arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// TCP port to listen on
    pub port: u16,

    /// Length of one ALOHA slot
    pub slot_time: Duration,

    /// Frames above this size are dropped
    pub max_frame_size: usize,
}

impl ChannelConfig {
    pub const USAGE: &'static str = "channel <chan_port> <slot_time_ms>";

    pub fn new(port: u16, slot_time: Duration) -> Self {
        ChannelConfig {
            port,
            slot_time,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let [port, slot_time] = args else {
            return Err(ConfigError::Usage(Self::USAGE.to_string()));
        };
        let port = parse("chan_port", port)?;
        let slot_ms: u64 = parse("slot_time_ms", slot_time)?;
        if slot_ms == 0 {
            return Err(invalid("slot_time_ms", slot_time, "must be positive"));
        }
        Ok(ChannelConfig::new(port, Duration::from_millis(slot_ms)))
    }
}

/// Settings for one station transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub channel_host: String,
    pub channel_port: u16,

    /// File whose contents are transmitted
    pub file: PathBuf,

    /// Size of a full frame, header included
    pub frame_size: usize,

    /// Slot length used to scale the backoff
    pub slot_time: Duration,

    /// Seed for the backoff generator
    pub seed: u64,

    /// How long to wait for the echo of each transmission
    pub response_timeout: Duration,

    /// Largest frame the channel accepts
    pub max_frame_size: usize,
}

impl StationConfig {
    pub const USAGE: &'static str =
        "station <chan_ip> <chan_port> <file_name> <frame_size> <slot_time_ms> <seed> <timeout_s>";

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let [host, port, file, frame_size, slot_time, seed, timeout] = args else {
            return Err(ConfigError::Usage(Self::USAGE.to_string()));
        };

        let frame_size: usize = parse("frame_size", frame_size)?;
        if frame_size <= HEADER_SIZE {
            return Err(invalid(
                "frame_size",
                &frame_size.to_string(),
                &format!("must be larger than the {HEADER_SIZE} byte header"),
            ));
        }
        if frame_size > MAX_FRAME_SIZE {
            return Err(invalid(
                "frame_size",
                &frame_size.to_string(),
                &format!("must not exceed {MAX_FRAME_SIZE} bytes"),
            ));
        }

        Ok(StationConfig {
            channel_host: host.clone(),
            channel_port: parse("chan_port", port)?,
            file: PathBuf::from(file),
            frame_size,
            slot_time: Duration::from_millis(parse("slot_time", slot_time)?),
            seed: parse("seed", seed)?,
            response_timeout: Duration::from_secs(parse("timeout", timeout)?),
            max_frame_size: MAX_FRAME_SIZE,
        })
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| invalid(name, value, &e.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidArgument {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
