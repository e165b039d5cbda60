pub mod datalink;
pub mod physical;

pub use datalink::{Frame, FrameHeader, FrameKind, MacAddr, Response, HEADER_SIZE, MAX_FRAME_SIZE};
pub use physical::{Acceptor, Link, RecvBuffer};
