//! The shared medium.
//!
//! Every slot the channel admits new stations, collects at most one frame
//! from each active connection for the length of the slot, then arbitrates:
//!
//! * no frame: idle slot
//! * one frame: the frame is broadcast unchanged to every active station,
//!   sender included, which doubles as its acknowledgment
//! * two or more: the noise frame is broadcast and every contributor is
//!   charged a collision

pub mod registry;
pub mod report;

use std::time::Duration;

use futures::future::select_all;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::ChannelConfig;
use crate::layers::datalink::NOISE_FRAME;
use crate::layers::Acceptor;
use crate::utils::Simulateable;

pub use registry::{Connection, ConnectionId, ConnectionRegistry, ConnectionStats};
pub use report::{ChannelReport, StationSummary};

/// How a slot was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    Idle,
    /// The given connection had the slot to itself
    Success(ConnectionId),
    /// This many connections transmitted at once
    Collision(usize),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotCounters {
    pub slots: u64,
    pub idle: u64,
    pub success: u64,
    pub collisions: u64,
}

impl SlotCounters {
    fn record(&mut self, outcome: SlotOutcome) {
        self.slots += 1;
        match outcome {
            SlotOutcome::Idle => self.idle += 1,
            SlotOutcome::Success(_) => self.success += 1,
            SlotOutcome::Collision(_) => self.collisions += 1,
        }
    }
}

/// Working set of one slot, reused from slot to slot.
#[derive(Debug, Default)]
struct SlotScratch {
    /// Connections that delivered a frame this slot, with the frame length
    contributors: Vec<(ConnectionId, usize)>,
    /// Copy of the winning frame while it is broadcast
    frame: Vec<u8>,
    /// Receivers whose send failed during the broadcast
    failed: Vec<ConnectionId>,
}

impl SlotScratch {
    fn with_capacity(max_frame_size: usize) -> Self {
        SlotScratch {
            contributors: Vec::with_capacity(16),
            frame: Vec::with_capacity(max_frame_size),
            failed: Vec::new(),
        }
    }

    fn contributed(&self, id: ConnectionId) -> bool {
        self.contributors.iter().any(|(c, _)| *c == id)
    }
}

/// Slotted ALOHA channel arbiter.
pub struct Channel<A: Acceptor> {
    acceptor: A,
    registry: ConnectionRegistry<A::Stream>,
    slot_time: Duration,
    scratch: SlotScratch,
    counters: SlotCounters,
}

impl<A: Acceptor> Channel<A> {
    pub fn new(acceptor: A, config: &ChannelConfig) -> Self {
        Channel {
            acceptor,
            registry: ConnectionRegistry::new(config.max_frame_size),
            slot_time: config.slot_time,
            scratch: SlotScratch::with_capacity(config.max_frame_size),
            counters: SlotCounters::default(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry<A::Stream> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConnectionRegistry<A::Stream> {
        &mut self.registry
    }

    pub fn counters(&self) -> SlotCounters {
        self.counters
    }

    pub fn slot_time(&self) -> Duration {
        self.slot_time
    }

    /// Registers every pending connection attempt
    pub fn admit(&mut self) -> usize {
        let mut admitted = 0;
        while let Some(accepted) = self.acceptor.try_accept() {
            match accepted {
                Ok((stream, peer)) => {
                    self.registry.add(stream, peer);
                    admitted += 1;
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept station");
                    break;
                }
            }
        }
        admitted
    }

    /// Listens to the medium for one slot.
    ///
    /// Each active connection contributes at most one complete frame; bytes
    /// beyond it stay buffered for later slots. Connections that close or
    /// fail meanwhile are archived. Returns the number of frames collected.
    pub async fn collect(&mut self) -> usize {
        let Self {
            registry,
            scratch,
            slot_time,
            ..
        } = self;
        scratch.contributors.clear();
        let deadline = Instant::now() + *slot_time;

        // Frames left over from earlier slots are on the medium right away
        for conn in registry.active_mut() {
            if let Some(len) = conn.link_mut().and_then(|link| link.poll_frame()) {
                scratch.contributors.push((conn.id(), len));
            }
        }

        loop {
            let ready = {
                let waiting = registry
                    .active_mut()
                    .filter(|conn| !scratch.contributed(conn.id()))
                    .filter_map(|conn| {
                        let id = conn.id();
                        conn.link_mut()
                            .map(|link| Box::pin(async move { (id, link.fill().await) }))
                    })
                    .collect::<Vec<_>>();

                if waiting.is_empty() {
                    None
                } else {
                    match timeout_at(deadline, select_all(waiting)).await {
                        Ok(((id, filled), _, _)) => Some((id, filled)),
                        Err(_) => break,
                    }
                }
            };

            let Some((id, filled)) = ready else {
                sleep_until(deadline).await;
                break;
            };
            match filled {
                Ok(_) => {
                    let frame = registry
                        .get_mut(id)
                        .and_then(Connection::link_mut)
                        .and_then(|link| link.poll_frame());
                    if let Some(len) = frame {
                        scratch.contributors.push((id, len));
                    }
                }
                Err(e) if e.is_fatal() => {
                    debug!(conn = %id, error = %e, "connection lost during slot");
                    registry.mark_disconnected(id);
                }
                Err(e) => warn!(conn = %id, error = %e, "dropping frame"),
            }
        }

        scratch.contributors.len()
    }

    /// Resolves the slot from the frames gathered by [`Channel::collect`]
    pub fn arbitrate(&mut self) -> SlotOutcome {
        let Self {
            registry,
            scratch,
            counters,
            ..
        } = self;

        let outcome = match scratch.contributors.as_slice() {
            [] => SlotOutcome::Idle,
            &[(id, len)] => {
                scratch.frame.clear();
                if let Some(conn) = registry.get_mut(id) {
                    if let Some(link) = conn.link_mut() {
                        scratch.frame.extend_from_slice(link.frame(len));
                        link.consume(len);
                    }
                    conn.stats_mut().record_frame(len, Instant::now());
                }
                let delivered = broadcast(registry, &scratch.frame, &mut scratch.failed);
                debug!(conn = %id, len, delivered, "slot success");
                SlotOutcome::Success(id)
            }
            contributors => {
                for &(id, len) in contributors {
                    if let Some(conn) = registry.get_mut(id) {
                        if let Some(link) = conn.link_mut() {
                            link.consume(len);
                        }
                        conn.stats_mut().record_collision();
                    }
                }
                let delivered = broadcast(registry, &NOISE_FRAME, &mut scratch.failed);
                debug!(stations = contributors.len(), delivered, "slot collision");
                SlotOutcome::Collision(contributors.len())
            }
        };

        scratch.contributors.clear();
        counters.record(outcome);
        outcome
    }

    /// Runs slots until `shutdown` turns true. The flag is looked at once per
    /// slot, before the slot starts.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> SlotCounters {
        info!(slot_ms = self.slot_time.as_millis() as u64, "channel running");
        while !*shutdown.borrow() {
            self.tick().await;
        }
        info!(
            slots = self.counters.slots,
            success = self.counters.success,
            collisions = self.counters.collisions,
            idle = self.counters.idle,
            stations = self.registry.len(),
            "channel stopped"
        );
        self.counters
    }

    /// Per-station statistics for every connection ever accepted
    pub fn report(&self) -> ChannelReport {
        ChannelReport::from_connections(self.registry.iter())
    }
}

impl<A: Acceptor> Simulateable for Channel<A> {
    type Outcome = SlotOutcome;

    async fn tick(&mut self) -> SlotOutcome {
        self.admit();
        self.collect().await;
        self.arbitrate()
    }
}

/// Offers `bytes` to every active connection. A failing receiver is archived
/// without affecting the others. Returns how many receivers took the frame.
fn broadcast<T>(
    registry: &mut ConnectionRegistry<T>,
    bytes: &[u8],
    failed: &mut Vec<ConnectionId>,
) -> usize
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if bytes.is_empty() {
        return 0;
    }
    let mut delivered = 0;
    registry.for_each_active(|conn| {
        let id = conn.id();
        let Some(link) = conn.link_mut() else {
            return;
        };
        match link.try_send(bytes) {
            Ok(true) => delivered += 1,
            Ok(false) => trace!(conn = %id, "receiver busy, frame lost"),
            Err(e) => {
                debug!(conn = %id, error = %e, "send failed");
                failed.push(id);
            }
        }
    });
    for id in failed.drain(..) {
        registry.mark_disconnected(id);
    }
    delivered
}
