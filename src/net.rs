//! TCP helpers for attaching sessions to sockets.
//!
//! Debug adapters commonly listen on a local port and let the client
//! attach. [`connect`] yields the split stream halves ready for
//! [`Session::bind`](crate::Session::bind); [`Server`] runs an accept loop
//! and hands each connection's halves to a callback.

use std::io;
use std::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Connect to a listening endpoint, returning the stream halves.
pub async fn connect(host: &str, port: u16) -> io::Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream.into_split())
}

/// A listening endpoint that accepts connections until stopped.
pub struct Server {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Bind `addr` and start accepting. Every connection's read and write
    /// halves are handed to `on_connect`, which typically creates and
    /// binds a [`Session`](crate::Session) per connection.
    pub async fn listen<A, F>(addr: A, on_connect: F) -> io::Result<Server>
    where
        A: ToSocketAddrs,
        F: Fn(OwnedReadHalf, OwnedWriteHalf) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("failed to disable Nagle on {peer}: {e}");
                        }
                        let (read, write) = stream.into_split();
                        on_connect(read, write);
                    }
                    Err(e) => {
                        warn!("failed to accept connection: {e}");
                        break;
                    }
                }
            }
        });
        Ok(Server {
            local_addr,
            accept_task,
        })
    }

    /// The address the server is listening on. With port 0 this reports
    /// the port actually chosen.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Already accepted sessions are
    /// unaffected.
    pub fn stop(&self) {
        self.accept_task.abort();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
