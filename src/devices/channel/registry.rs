use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::info;

use crate::error::LinkError;
use crate::layers::Link;

/// Stable handle to a connection record. Never reused while the process runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) usize);

impl ConnectionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Running counters for one station.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionStats {
    pub frames_received: u64,
    pub collisions: u64,
    pub total_bytes: u64,
    pub first_frame_at: Option<Instant>,
    pub last_frame_at: Option<Instant>,
}

impl ConnectionStats {
    /// Counts a frame that won its slot
    pub fn record_frame(&mut self, bytes: usize, at: Instant) {
        self.frames_received += 1;
        self.total_bytes += bytes as u64;
        self.first_frame_at.get_or_insert(at);
        self.last_frame_at = Some(at);
    }

    pub fn record_collision(&mut self) {
        self.collisions += 1;
    }

    /// Average bandwidth in Mbps between the first and last frame.
    ///
    /// Zero with fewer than two frames or a non-positive interval.
    pub fn bandwidth_mbps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.first_frame_at, self.last_frame_at) else {
            return 0.0;
        };
        let seconds = last.saturating_duration_since(first).as_secs_f64();
        if self.frames_received < 2 || seconds <= 0.0 {
            return 0.0;
        }
        (self.total_bytes as f64 * 8.0) / (seconds * 1_000_000.0)
    }
}

/// One station attached to the channel.
///
/// The link is dropped on disconnect, the record itself is kept so its
/// statistics can still be reported.
#[derive(Debug)]
pub struct Connection<T> {
    id: ConnectionId,
    peer: SocketAddr,
    link: Option<Link<T>>,
    stats: ConnectionStats,
}

impl<T> Connection<T> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_active(&self) -> bool {
        self.link.is_some()
    }

    pub fn link(&self) -> Option<&Link<T>> {
        self.link.as_ref()
    }

    pub fn link_mut(&mut self) -> Option<&mut Link<T>> {
        self.link.as_mut()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ConnectionStats {
        &mut self.stats
    }

    /// Releases the transport. Statistics survive.
    pub fn disconnect(&mut self) {
        if self.link.take().is_some() {
            info!(
                conn = %self.id,
                peer = %self.peer,
                frames = self.stats.frames_received,
                collisions = self.stats.collisions,
                "station disconnected"
            );
        }
    }
}

/// Every connection the channel has ever accepted, in arrival order.
#[derive(Debug)]
pub struct ConnectionRegistry<T> {
    connections: Vec<Connection<T>>,
    max_frame_size: usize,
}

impl<T> ConnectionRegistry<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(max_frame_size: usize) -> Self {
        ConnectionRegistry {
            connections: Vec::new(),
            max_frame_size,
        }
    }

    /// Registers a freshly accepted transport
    pub fn add(&mut self, transport: T, peer: SocketAddr) -> ConnectionId {
        let id = ConnectionId(self.connections.len());
        self.connections.push(Connection {
            id,
            peer,
            link: Some(Link::new(transport, self.max_frame_size)),
            stats: ConnectionStats::default(),
        });
        info!(conn = %id, %peer, active = self.active_count(), "station connected");
        id
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection<T>> {
        self.connections.get(id.0)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<T>> {
        self.connections.get_mut(id.0)
    }

    /// Flags a connection inactive and releases its transport
    pub fn mark_disconnected(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.get_mut(id.0) {
            conn.disconnect();
        }
    }

    /// Grows a connection's receive buffer to at least `n` bytes
    pub fn ensure_capacity(&mut self, id: ConnectionId, n: usize) -> Result<(), LinkError> {
        let link = self
            .get_mut(id)
            .and_then(Connection::link_mut)
            .ok_or(LinkError::Disconnected)?;
        link.buffer_mut().ensure_capacity(n)?;
        Ok(())
    }

    pub fn for_each_active<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Connection<T>),
    {
        self.active_mut().for_each(|conn| f(conn));
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut Connection<T>> {
        self.connections.iter_mut().filter(|conn| conn.is_active())
    }

    pub fn active(&self) -> impl Iterator<Item = &Connection<T>> {
        self.connections.iter().filter(|conn| conn.is_active())
    }

    /// All records, archived ones included
    pub fn iter(&self) -> impl Iterator<Item = &Connection<T>> {
        self.connections.iter()
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
