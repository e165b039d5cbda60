use std::time::Duration;

use rand::Rng;

use super::frame::{decode, is_noise};
use super::header::HEADER_SIZE;

/// Transmissions allowed for a single frame before the transfer is abandoned
pub const MAX_ATTEMPTS: u32 = 10;

/// Upper bound on the backoff exponent
const MAX_BACKOFF: u32 = 10;

/// What a station heard after transmitting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The channel relayed our own frame back: the slot was ours
    Echo,
    /// The channel signalled a collision
    Noise,
    /// Nothing arrived before the response timeout
    Timeout,
    /// Something arrived that is neither noise nor our echo
    Garbage,
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Echo)
    }
}

/// Backoff for a random number of slots bounded by the attempt number.
///
/// Binary exponential backoff: draws `r` uniformly from `[0, 2^attempt)` and
/// waits `r` slots. `attempt` is 1 on the first retry.
pub fn next_delay<R: Rng + ?Sized>(rng: &mut R, attempt: u32, slot_time: Duration) -> Duration {
    let window = 1u32 << attempt.min(MAX_BACKOFF);
    slot_time * rng.gen_range(0..window)
}

/// Classifies the frame received after sending the frame whose header is
/// `sent`. `None` means the response timed out.
///
/// Only a byte-identical header counts as an echo; anything unrecognised is
/// garbage so it can never be mistaken for a different success.
pub fn classify(sent: &[u8; HEADER_SIZE], received: Option<&[u8]>) -> Response {
    let Some(received) = received else {
        return Response::Timeout;
    };
    match decode(received) {
        Ok((header, _)) if is_noise(&header) => Response::Noise,
        Ok(_) if received[..HEADER_SIZE] == sent[..] => Response::Echo,
        _ => Response::Garbage,
    }
}
