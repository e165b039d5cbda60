use std::io;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::unconstrained;
use tracing::{trace, warn};

use super::buffer::RecvBuffer;
use crate::error::LinkError;
use crate::layers::datalink::HEADER_SIZE;

/// Bytes pulled from the transport per read
const READ_CHUNK: usize = 2048;

/// Frames a link buffers before it starts dropping incoming ones
const MAX_BUFFERED_FRAMES: usize = 64;

/// A `Physical Layer` primitive: one end of a point-to-point byte stream,
/// framed with the fixed frame header.
///
/// Incoming bytes are collected in a [`RecvBuffer`] so frames can be taken
/// off one at a time. Outgoing frames are either written in full
/// ([`Link::send`]) or offered without waiting ([`Link::try_send`]).
#[derive(Debug)]
pub struct Link<T> {
    io: T,
    rx: RecvBuffer,
    /// Tail of a partially written frame, flushed before anything else
    backlog: Vec<u8>,
    max_frame_size: usize,
}

impl<T> Link<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, max_frame_size: usize) -> Self {
        Link {
            io,
            rx: RecvBuffer::with_limit(
                HEADER_SIZE,
                max_frame_size.saturating_mul(MAX_BUFFERED_FRAMES),
            ),
            backlog: Vec::new(),
            max_frame_size,
        }
    }

    pub fn buffer(&self) -> &RecvBuffer {
        &self.rx
    }

    pub fn buffer_mut(&mut self) -> &mut RecvBuffer {
        &mut self.rx
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Reads whatever the transport has into the receive buffer.
    ///
    /// Frames that do not fit in the buffer are dropped and the link stays
    /// usable. Cancel safe: bytes are only buffered once the read has
    /// completed.
    pub async fn fill(&mut self) -> Result<usize, LinkError> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.io.read(&mut chunk).await?;
        if n == 0 {
            return Err(LinkError::Closed);
        }
        if let Err(e) = self.rx.extend(&chunk[..n]) {
            warn!(error = %e, "receive buffer full, dropping frame");
        }
        Ok(n)
    }

    /// Length of the complete frame at the front of the buffer, if any.
    ///
    /// Oversized frames are dropped as if they never arrived.
    pub fn poll_frame(&mut self) -> Option<usize> {
        loop {
            match self.rx.peek_frame(self.max_frame_size) {
                Ok(found) => return found,
                Err(e) => warn!(error = %e, "dropping frame"),
            }
        }
    }

    /// Waits until a complete frame is buffered and returns its length.
    ///
    /// Cancel safe.
    pub async fn recv_frame(&mut self) -> Result<usize, LinkError> {
        loop {
            if let Some(len) = self.poll_frame() {
                return Ok(len);
            }
            self.fill().await?;
        }
    }

    /// The first `len` buffered bytes, normally a frame found by
    /// [`Link::poll_frame`] or [`Link::recv_frame`]
    pub fn frame(&self, len: usize) -> &[u8] {
        self.rx.frame(len)
    }

    pub fn consume(&mut self, len: usize) {
        self.rx.consume(len);
    }

    /// Throws away every buffered byte and everything the transport can
    /// deliver without waiting. Returns the number of bytes dropped.
    pub async fn discard_pending(&mut self) -> Result<usize, LinkError> {
        // Let the runtime refresh readiness for bytes that already arrived
        tokio::task::yield_now().await;

        let mut discarded = self.rx.len();
        self.rx.clear();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match unconstrained(self.io.read(&mut chunk)).now_or_never() {
                None => break,
                Some(Ok(0)) => return Err(LinkError::Closed),
                Some(Ok(n)) => discarded += n,
                Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => break,
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(discarded)
    }

    /// Writes a whole frame, waiting for the transport if needed
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.io.write_all(bytes).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Offers a frame to the transport without waiting.
    ///
    /// Returns `Ok(false)` when the transport would block and the frame was
    /// dropped. A partial write keeps the rest of the frame queued so the
    /// byte stream stays framed. The write is exempt from the task's
    /// cooperative budget, so a broadcast to many links in one poll is never
    /// mistaken for a full transport.
    pub fn try_send(&mut self, bytes: &[u8]) -> Result<bool, LinkError> {
        if !self.flush_backlog()? {
            trace!(len = bytes.len(), "backlog pending, frame dropped");
            return Ok(false);
        }
        match unconstrained(self.io.write(bytes)).now_or_never() {
            None => Ok(false),
            Some(Ok(0)) if !bytes.is_empty() => Err(LinkError::Closed),
            Some(Ok(n)) => {
                self.backlog.extend_from_slice(&bytes[n..]);
                Ok(true)
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Some(Err(e)) => Err(e.into()),
        }
    }

    fn flush_backlog(&mut self) -> Result<bool, LinkError> {
        while !self.backlog.is_empty() {
            match unconstrained(self.io.write(&self.backlog)).now_or_never() {
                None => return Ok(false),
                Some(Ok(0)) => return Err(LinkError::Closed),
                Some(Ok(n)) => {
                    self.backlog.drain(..n);
                }
                Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}
