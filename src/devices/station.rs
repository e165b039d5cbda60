//! The transmitting side of slotted ALOHA.
//!
//! A station cuts its data into frames and sends them one at a time. The
//! channel answers every slot it wins with the frame itself; anything else
//! (noise, a foreign frame, silence) means the frame has to go out again
//! after a random backoff.

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::StationConfig;
use crate::error::{FrameError, TransferError};
use crate::layers::datalink::{
    classify, next_delay, Frame, FrameHeader, MacAddr, Response, HEADER_SIZE, MAX_ATTEMPTS,
};
use crate::layers::Link;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StationState {
    #[default]
    Idle,
    Sending,
    AwaitingResponse,
    Success,
    Collision,
    Timeout,
    Failed,
    Done,
}

/// Cuts `data` into frames of at most `frame_size` bytes, header included.
///
/// Sequence numbers start at 0; only the last frame may be short.
pub fn fragment(
    data: &[u8],
    frame_size: usize,
    source: MacAddr,
    destination: MacAddr,
) -> Result<Vec<Frame>, FrameError> {
    if frame_size <= HEADER_SIZE {
        return Err(FrameError::FrameSizeTooSmall {
            size: frame_size,
            min: HEADER_SIZE + 1,
        });
    }
    data.chunks(frame_size - HEADER_SIZE)
        .enumerate()
        .map(|(sequence, chunk)| {
            let header = FrameHeader::data(source, destination, sequence as u32, 0);
            Frame::new(header, chunk.to_vec())
        })
        .collect()
}

/// Outcome of one file transfer.
#[derive(Debug)]
pub struct TransferReport {
    pub file_name: String,
    pub file_size: usize,
    pub frames_total: usize,
    pub successful_frames: usize,
    pub total_transmissions: u32,
    /// Most transmissions spent on one frame, the abandoned one included
    pub max_attempts: u32,
    /// Payload bytes of the acknowledged frames
    pub delivered_bytes: usize,
    pub elapsed: Duration,
    pub failure: Option<TransferError>,
}

impl TransferReport {
    fn new(file_name: &str, file_size: usize, frames_total: usize) -> Self {
        TransferReport {
            file_name: file_name.to_string(),
            file_size,
            frames_total,
            successful_frames: 0,
            total_transmissions: 0,
            max_attempts: 0,
            delivered_bytes: 0,
            elapsed: Duration::ZERO,
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.successful_frames == self.frames_total
    }

    /// Transmissions per acknowledged frame
    pub fn average_transmissions(&self) -> f64 {
        if self.successful_frames == 0 {
            return 0.0;
        }
        self.total_transmissions as f64 / self.successful_frames as f64
    }

    pub fn bandwidth_mbps(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        (self.delivered_bytes as f64 * 8.0) / (seconds * 1_000_000.0)
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sent file {}", self.file_name)?;
        writeln!(
            f,
            "Result: {}",
            if self.is_success() { "Success" } else { "Failure" }
        )?;
        writeln!(
            f,
            "File size: {} Bytes ({} frames)",
            self.file_size, self.frames_total
        )?;
        writeln!(
            f,
            "Total transfer time: {} milliseconds",
            self.elapsed.as_millis()
        )?;
        writeln!(
            f,
            "Transmissions/frame: average {:.2}, maximum {}",
            self.average_transmissions(),
            self.max_attempts
        )?;
        writeln!(f, "Average bandwidth: {:.3} Mbps", self.bandwidth_mbps())?;
        if let Some(failure) = &self.failure {
            writeln!(f, "Reason: {}", failure)?;
        }
        Ok(())
    }
}

/// A station attached to the channel over `T`.
pub struct Station<T> {
    link: Link<T>,
    mac: MacAddr,
    channel_mac: MacAddr,
    frame_size: usize,
    slot_time: Duration,
    response_timeout: Duration,
    rng: StdRng,
    state: StationState,
}

impl<T> Station<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, mac: MacAddr, config: &StationConfig) -> Self {
        Station {
            link: Link::new(io, config.max_frame_size),
            mac,
            channel_mac: MacAddr::CHANNEL,
            frame_size: config.frame_size,
            slot_time: config.slot_time,
            response_timeout: config.response_timeout,
            rng: StdRng::seed_from_u64(config.seed),
            state: StationState::Idle,
        }
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn state(&self) -> StationState {
        self.state
    }

    fn set_state(&mut self, state: StationState) {
        trace!(from = ?self.state, to = ?state, "station state");
        self.state = state;
    }

    /// Sends `data` frame by frame, stopping at the first frame that cannot
    /// be delivered.
    pub async fn transmit(&mut self, name: &str, data: &[u8]) -> TransferReport {
        let start = Instant::now();
        let frames = fragment(data, self.frame_size, self.mac, self.channel_mac);
        let mut report = TransferReport::new(
            name,
            data.len(),
            frames.as_ref().map_or(0, |frames| frames.len()),
        );
        info!(
            file = name,
            bytes = data.len(),
            frames = report.frames_total,
            station = %self.mac,
            "starting transfer"
        );

        let result = match frames {
            Ok(frames) => self.transmit_frames(&frames, &mut report).await,
            Err(e) => Err(e.into()),
        };
        report.elapsed = start.elapsed();

        match result {
            Ok(()) => {
                self.set_state(StationState::Done);
                info!(
                    file = name,
                    transmissions = report.total_transmissions,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "transfer complete"
                );
            }
            Err(e) => {
                self.set_state(StationState::Failed);
                warn!(file = name, error = %e, "transfer failed");
                report.failure = Some(e);
            }
        }
        report
    }

    async fn transmit_frames(
        &mut self,
        frames: &[Frame],
        report: &mut TransferReport,
    ) -> Result<(), TransferError> {
        for frame in frames {
            let wire = frame.encode(self.link.max_frame_size())?;
            self.deliver(frame.header(), &wire, report).await?;
            report.successful_frames += 1;
            report.delivered_bytes += frame.payload().len();
        }
        Ok(())
    }

    /// Sends one frame until its echo comes back or the attempts run out
    async fn deliver(
        &mut self,
        header: &FrameHeader,
        wire: &[u8],
        report: &mut TransferReport,
    ) -> Result<(), TransferError> {
        let sequence = header.sequence;
        let sent = header.to_le_bytes();
        let mut attempts = 0;

        loop {
            self.set_state(StationState::Sending);
            let stale = self.link.discard_pending().await?;
            if stale > 0 {
                trace!(sequence, stale, "discarded stale bytes");
            }
            self.link.send(wire).await?;
            attempts += 1;
            report.total_transmissions += 1;
            report.max_attempts = report.max_attempts.max(attempts);
            debug!(
                sequence,
                attempt = attempts,
                total = report.total_transmissions,
                "frame sent"
            );

            self.set_state(StationState::AwaitingResponse);
            let response = self.await_response(&sent).await?;
            if response.is_success() {
                self.set_state(StationState::Success);
                return Ok(());
            }
            self.set_state(match response {
                Response::Timeout => StationState::Timeout,
                _ => StationState::Collision,
            });

            if attempts >= MAX_ATTEMPTS {
                return Err(TransferError::Exhausted { sequence, attempts });
            }
            let delay = next_delay(&mut self.rng, attempts, self.slot_time);
            debug!(
                sequence,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "backing off"
            );
            sleep(delay).await;
        }
    }

    async fn await_response(
        &mut self,
        sent: &[u8; HEADER_SIZE],
    ) -> Result<Response, TransferError> {
        let len = match timeout(self.response_timeout, self.link.recv_frame()).await {
            Err(_) => return Ok(Response::Timeout),
            Ok(received) => received?,
        };
        let response = classify(sent, Some(self.link.frame(len)));
        self.link.consume(len);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::layers::datalink::{decode, MAX_FRAME_SIZE, NOISE_FRAME};
    use std::path::PathBuf;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn config(frame_size: usize) -> StationConfig {
        StationConfig {
            channel_host: "127.0.0.1".to_string(),
            channel_port: 0,
            file: PathBuf::from("test.bin"),
            frame_size,
            slot_time: Duration::from_millis(10),
            seed: 42,
            response_timeout: Duration::from_secs(1),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    fn station(frame_size: usize) -> (Station<DuplexStream>, Link<DuplexStream>) {
        let (a, b) = duplex(4096);
        let station = Station::new(a, MacAddr::station(5000), &config(frame_size));
        (station, Link::new(b, MAX_FRAME_SIZE))
    }

    /// Answers every received frame with whatever `reply` returns for it
    async fn fake_channel<F>(link: &mut Link<DuplexStream>, mut reply: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>>,
    {
        while let Ok(len) = link.recv_frame().await {
            let answer = reply(link.frame(len));
            link.consume(len);
            if let Some(answer) = answer {
                if link.send(&answer).await.is_err() {
                    break;
                }
            }
        }
        std::future::pending::<()>().await;
    }

    #[test]
    fn test_fragment() {
        let data = (0..25).collect::<Vec<u8>>();
        let frames = fragment(&data, 30, MacAddr::station(1), MacAddr::CHANNEL).unwrap();

        assert_eq!(frames.len(), 3);
        let lens = frames.iter().map(|f| f.payload().len()).collect::<Vec<_>>();
        assert_eq!(lens, vec![10, 10, 5]);
        let sequences = frames.iter().map(|f| f.header().sequence).collect::<Vec<_>>();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(frames[2].header().payload_len, 5);
        assert_eq!(frames[1].payload(), &data[10..20]);
        assert_eq!(frames[0].header().dest(), &MacAddr::CHANNEL);
    }

    #[test]
    fn test_fragment_edge_cases() {
        assert!(fragment(b"", 30, MacAddr::ZERO, MacAddr::CHANNEL)
            .unwrap()
            .is_empty());
        assert_eq!(
            fragment(&[0; 20], 30, MacAddr::ZERO, MacAddr::CHANNEL)
                .unwrap()
                .len(),
            2
        );
        assert!(matches!(
            fragment(b"abc", HEADER_SIZE, MacAddr::ZERO, MacAddr::CHANNEL),
            Err(FrameError::FrameSizeTooSmall { size: 20, min: 21 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_succeeds_first_time() {
        let (mut station, mut channel) = station(30);
        let report = tokio::select! {
            report = station.transmit("echo.bin", b"hello") => report,
            _ = fake_channel(&mut channel, |frame| Some(frame.to_vec())) => unreachable!(),
        };

        assert!(report.is_success());
        assert_eq!(report.frames_total, 1);
        assert_eq!(report.successful_frames, 1);
        assert_eq!(report.total_transmissions, 1);
        assert_eq!(report.max_attempts, 1);
        assert_eq!(report.delivered_bytes, 5);
        assert_eq!(station.state(), StationState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_sent_in_order() {
        let (mut station, mut channel) = station(30);
        let mut seen = Vec::new();
        let data = (0..25).collect::<Vec<u8>>();
        let report = tokio::select! {
            report = station.transmit("ordered.bin", &data) => report,
            _ = fake_channel(&mut channel, |frame| {
                let (header, payload) = decode(frame).unwrap();
                seen.push((header.sequence, payload.len()));
                Some(frame.to_vec())
            }) => unreachable!(),
        };

        assert!(report.is_success());
        assert_eq!(seen, vec![(0, 10), (1, 10), (2, 5)]);
        assert_eq!(report.total_transmissions, 3);
        assert_eq!(report.average_transmissions(), 1.0);
        assert_eq!(report.delivered_bytes, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_channel_gives_up_after_max_attempts() {
        let (mut station, mut channel) = station(30);
        let report = station.transmit("silent.bin", &[7; 25]).await;

        assert!(!report.is_success());
        assert_eq!(report.successful_frames, 0);
        assert_eq!(report.total_transmissions, MAX_ATTEMPTS);
        assert_eq!(report.max_attempts, MAX_ATTEMPTS);
        assert!(matches!(
            report.failure,
            Some(TransferError::Exhausted {
                sequence: 0,
                attempts: MAX_ATTEMPTS
            })
        ));
        assert_eq!(station.state(), StationState::Failed);

        // Only the first frame ever went out
        drop(station);
        let mut count = 0;
        while let Ok(len) = channel.recv_frame().await {
            let (header, _) = decode(channel.frame(len)).unwrap();
            assert_eq!(header.sequence, 0);
            channel.consume(len);
            count += 1;
        }
        assert_eq!(count, MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_noise_then_echo() {
        let (mut station, mut channel) = station(30);
        let mut replies = 0;
        let report = tokio::select! {
            report = station.transmit("noisy.bin", b"abc") => report,
            _ = fake_channel(&mut channel, |frame| {
                replies += 1;
                if replies == 1 {
                    Some(NOISE_FRAME.to_vec())
                } else {
                    Some(frame.to_vec())
                }
            }) => unreachable!(),
        };

        assert!(report.is_success());
        assert_eq!(report.total_transmissions, 2);
        assert_eq!(report.max_attempts, 2);
        assert_eq!(report.average_transmissions(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_frame_counts_as_collision() {
        let (mut station, mut channel) = station(30);
        let mut replies = 0;
        let report = tokio::select! {
            report = station.transmit("garbage.bin", b"abc") => report,
            _ = fake_channel(&mut channel, |frame| {
                replies += 1;
                if replies <= 2 {
                    let (mut header, payload) = decode(frame).unwrap();
                    header.sequence += 100;
                    let mut other = header.to_le_bytes().to_vec();
                    other.extend_from_slice(payload);
                    Some(other)
                } else {
                    Some(frame.to_vec())
                }
            }) => unreachable!(),
        };

        assert!(report.is_success());
        assert_eq!(report.total_transmissions, 3);
        assert_eq!(report.max_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_fails_transfer() {
        let (mut station, channel) = station(30);
        drop(channel);
        let report = station.transmit("closed.bin", b"abc").await;

        assert!(!report.is_success());
        assert!(matches!(
            report.failure,
            Some(TransferError::Link(LinkError::Closed | LinkError::Io(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_echo_is_not_taken_for_new_frame() {
        let (mut station, mut channel) = station(30);
        // Left over from an earlier slot, must be thrown away before sending
        let header = FrameHeader::data(MacAddr::station(5000), MacAddr::CHANNEL, 0, 3);
        let mut stale = header.to_le_bytes().to_vec();
        stale.extend_from_slice(b"abc");
        channel.send(&stale).await.unwrap();

        let report = tokio::select! {
            report = station.transmit("stale.bin", b"abc") => report,
            _ = fake_channel(&mut channel, |_| None) => unreachable!(),
        };
        assert!(!report.is_success());
        assert_eq!(report.total_transmissions, MAX_ATTEMPTS);
    }

    #[test]
    fn test_report_lines() {
        let report = TransferReport {
            file_name: "data.bin".to_string(),
            file_size: 25,
            frames_total: 3,
            successful_frames: 3,
            total_transmissions: 4,
            max_attempts: 2,
            delivered_bytes: 25,
            elapsed: Duration::from_millis(100),
            failure: None,
        };
        assert_eq!(
            report.to_string(),
            "Sent file data.bin\n\
             Result: Success\n\
             File size: 25 Bytes (3 frames)\n\
             Total transfer time: 100 milliseconds\n\
             Transmissions/frame: average 1.33, maximum 2\n\
             Average bandwidth: 0.002 Mbps\n"
        );
    }

    #[tokio::test]
    async fn test_raw_bytes_on_the_wire() {
        let (a, mut raw) = duplex(4096);
        let mut station = Station::new(a, MacAddr::station(7), &config(24));
        let report = tokio::select! {
            report = station.transmit("raw.bin", b"wxyz") => report,
            _ = async {
                let mut frame = [0u8; 24];
                raw.read_exact(&mut frame).await.unwrap();
                tokio::io::AsyncWriteExt::write_all(&mut raw, &frame).await.unwrap();
                std::future::pending::<()>().await;
            } => unreachable!(),
        };
        assert!(report.is_success());
    }
}
