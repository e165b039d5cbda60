use tracing::debug;

use crate::error::{BufferError, FrameError};
use crate::layers::datalink::{FrameHeader, HEADER_SIZE};

/// Growable receive buffer that reassembles frames out of a byte stream.
///
/// Growth policy: the capacity grows to exactly what is needed to hold the
/// buffered bytes or the largest frame announced so far, plus room for one
/// more header, and never shrinks. Bytes already buffered are preserved
/// across growth.
///
/// When the buffer cannot grow, the frame being reassembled is dropped and
/// the rest of it is skipped as it arrives, so the stream stays framed.
#[derive(Debug)]
pub struct RecvBuffer {
    bytes: Vec<u8>,
    /// Bytes of a dropped frame still to be thrown away as they arrive
    discard: usize,
    /// Capacity the buffer may never exceed
    limit: usize,
}

impl Default for RecvBuffer {
    fn default() -> Self {
        RecvBuffer::with_capacity(HEADER_SIZE)
    }
}

impl RecvBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        RecvBuffer {
            bytes: Vec::with_capacity(capacity.max(HEADER_SIZE)),
            discard: 0,
            limit: usize::MAX,
        }
    }

    /// A buffer that refuses to grow past `limit` bytes
    pub fn with_limit(capacity: usize, limit: usize) -> Self {
        RecvBuffer {
            limit: limit.max(HEADER_SIZE),
            ..RecvBuffer::with_capacity(capacity.min(limit))
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Grows the buffer so it can hold at least `n` bytes and one more
    /// header after them
    pub fn ensure_capacity(&mut self, n: usize) -> Result<(), BufferError> {
        let needed = n.saturating_add(HEADER_SIZE);
        if needed <= self.bytes.capacity() {
            return Ok(());
        }
        if needed > self.limit {
            return Err(BufferError::Limit {
                requested: n,
                limit: self.limit,
            });
        }
        self.bytes
            .try_reserve_exact(needed - self.bytes.len())
            .map_err(|source| BufferError::Grow {
                requested: n,
                source,
            })
    }

    /// Appends freshly received bytes.
    ///
    /// On error the frames that did not fit were dropped; everything else
    /// was stored and the buffer is still aligned on a frame boundary.
    pub fn extend(&mut self, data: &[u8]) -> Result<(), BufferError> {
        let skip = self.discard.min(data.len());
        self.discard -= skip;
        let mut data = &data[skip..];

        let mut result = Ok(());
        while !data.is_empty() {
            match self.ensure_capacity(self.bytes.len() + data.len()) {
                Ok(()) => {
                    self.bytes.extend_from_slice(data);
                    break;
                }
                Err(e) => {
                    data = self.drop_tail_frame(data);
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Offset of the first incomplete frame, or the length when every
    /// buffered frame is complete
    fn tail_start(&self) -> usize {
        let mut start = 0;
        while self.bytes.len() - start >= HEADER_SIZE {
            let size = header_at(&self.bytes[start..]).frame_len();
            if start + size > self.bytes.len() {
                break;
            }
            start += size;
        }
        start
    }

    /// Drops the incomplete frame at the tail together with the part of it
    /// carried by `data`, and returns whatever follows that frame.
    ///
    /// Needs no allocation: a trailing partial header always fits in the
    /// room kept for one more header.
    fn drop_tail_frame<'a>(&mut self, mut data: &'a [u8]) -> &'a [u8] {
        let start = self.tail_start();
        let stored = self.bytes.len() - start;
        let mut header = [0u8; HEADER_SIZE];
        let mut have = stored.min(HEADER_SIZE);
        header[..have].copy_from_slice(&self.bytes[start..start + have]);
        self.bytes.truncate(start);

        if have < HEADER_SIZE {
            let take = (HEADER_SIZE - have).min(data.len());
            header[have..have + take].copy_from_slice(&data[..take]);
            have += take;
            data = &data[take..];
            if have < HEADER_SIZE {
                self.bytes.extend_from_slice(&header[..have]);
                return &[];
            }
        }

        let size = FrameHeader::from_le_bytes(&header).frame_len();
        let seen = stored.max(HEADER_SIZE);
        let remaining = size - seen;
        if remaining > data.len() {
            self.discard = remaining - data.len();
            return &[];
        }
        &data[remaining..]
    }

    /// Length of the complete frame at the front of the buffer, if any.
    ///
    /// A frame larger than `max_frame_size` is dropped: its header and any
    /// buffered payload are removed now, the rest is skipped as it arrives.
    pub fn peek_frame(&mut self, max_frame_size: usize) -> Result<Option<usize>, FrameError> {
        if self.bytes.len() < HEADER_SIZE {
            return Ok(None);
        }
        let size = header_at(&self.bytes).frame_len();

        if size > max_frame_size {
            let buffered = size.min(self.bytes.len());
            self.bytes.drain(..buffered);
            self.discard = size - buffered;
            return Err(FrameError::TooLarge {
                size,
                max: max_frame_size,
            });
        }

        if self.bytes.len() < size {
            // Reserve room for the whole frame up front; extend retries later
            if let Err(e) = self.ensure_capacity(size) {
                debug!(size, error = %e, "cannot reserve announced frame");
            }
            return Ok(None);
        }
        Ok(Some(size))
    }

    /// The first `len` buffered bytes
    pub fn frame(&self, len: usize) -> &[u8] {
        &self.bytes[..len.min(self.bytes.len())]
    }

    /// Removes the first `len` bytes, keeping whatever follows for later
    pub fn consume(&mut self, len: usize) {
        let len = len.min(self.bytes.len());
        self.bytes.drain(..len);
    }

    /// Drops everything buffered, keeping the allocation
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.discard = 0;
    }
}

/// Header at the front of `bytes`, which holds at least `HEADER_SIZE` bytes
fn header_at(bytes: &[u8]) -> FrameHeader {
    let mut raw = [0; HEADER_SIZE];
    raw.copy_from_slice(&bytes[..HEADER_SIZE]);
    FrameHeader::from_le_bytes(&raw)
}
