pub mod buffer;
pub mod link;

use std::io;
use std::net::SocketAddr;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::unconstrained;

pub use buffer::RecvBuffer;
pub use link::Link;

/// Source of new station connections for the channel.
pub trait Acceptor {
    type Stream: AsyncRead + AsyncWrite + Unpin;

    /// Accepts one pending connection attempt without waiting
    fn try_accept(&mut self) -> Option<io::Result<(Self::Stream, SocketAddr)>>;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn try_accept(&mut self) -> Option<io::Result<(TcpStream, SocketAddr)>> {
        let accepted = unconstrained(self.accept()).now_or_never()?;
        Some(accepted.and_then(|(stream, peer)| {
            stream.set_nodelay(true)?;
            Ok((stream, peer))
        }))
    }
}

/// In-process connections handed over a channel, mostly useful for driving
/// the channel with scripted streams.
impl<T> Acceptor for mpsc::UnboundedReceiver<(T, SocketAddr)>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    type Stream = T;

    fn try_accept(&mut self) -> Option<io::Result<(T, SocketAddr)>> {
        self.try_recv().ok().map(Ok)
    }
}
