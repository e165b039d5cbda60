use std::fmt;
use std::net::SocketAddr;

use super::registry::{Connection, ConnectionStats};

/// Final numbers for one station, archived or still connected.
#[derive(Clone, Debug, PartialEq)]
pub struct StationSummary {
    pub peer: SocketAddr,
    pub frames: u64,
    pub collisions: u64,
    pub bandwidth_mbps: f64,
}

impl StationSummary {
    fn new(peer: SocketAddr, stats: &ConnectionStats) -> Self {
        StationSummary {
            peer,
            frames: stats.frames_received,
            collisions: stats.collisions,
            bandwidth_mbps: stats.bandwidth_mbps(),
        }
    }
}

impl fmt::Display for StationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From {} port {}: {} frames, {} collisions, {:.3} Mbps",
            self.peer.ip(),
            self.peer.port(),
            self.frames,
            self.collisions,
            self.bandwidth_mbps
        )
    }
}

/// Shutdown report: exactly one line per connection ever accepted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelReport {
    pub stations: Vec<StationSummary>,
}

impl ChannelReport {
    pub fn from_connections<'a, T: 'a>(
        connections: impl IntoIterator<Item = &'a Connection<T>>,
    ) -> Self {
        ChannelReport {
            stations: connections
                .into_iter()
                .map(|conn| StationSummary::new(conn.peer(), conn.stats()))
                .collect(),
        }
    }
}

impl fmt::Display for ChannelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for station in &self.stations {
            writeln!(f, "{}", station)?;
        }
        Ok(())
    }
}
