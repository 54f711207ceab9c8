//! A registered client connection.
//!
//! The socket is shared between the registry and the bridge loop, so it is
//! held behind an `Arc` and closed with an explicit shutdown rather than by
//! dropping the last handle.

use std::fmt;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socket2::SockRef;
use tokio::net::TcpStream;
use tracing::{debug, info};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted client socket and its peer address.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: Arc<TcpStream>,
}

impl Connection {
    /// Wrap an accepted stream, assigning it a fresh id.
    #[must_use]
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::next(),
            peer,
            stream: Arc::new(stream),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Shut the socket down in both directions.
    ///
    /// Errors are ignored: the peer may already have closed its half.
    pub fn close(&self) {
        info!(connection_id = %self.id, peer = %self.peer, "Closing connection to {}", self.peer);
        if let Err(e) = SockRef::from(&*self.stream).shutdown(Shutdown::Both) {
            debug!(connection_id = %self.id, error = %e, "shutdown failed");
        }
    }
}
