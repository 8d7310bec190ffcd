//! TCP and Unix domain socket listeners.
//!
//! # Example
//!
//! ```ignore
//! use nodewire::transport::{ListenAddr, Listener};
//!
//! let addr: ListenAddr = "unix:///tmp/nodewire.sock".parse()?;
//! let listener = Listener::bind(&addr).await?;
//! let (conn, peer) = listener.accept().await?;
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Result, RpcError};

/// Address the server listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// `host:port`
    Tcp(String),
    /// Socket file path.
    Unix(PathBuf),
}

impl FromStr for ListenAddr {
    type Err = RpcError;

    /// Accepts `tcp://host:port`, `unix://path` and bare `host:port`.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(RpcError::InvalidAddress(s.to_string()));
            }
            return Ok(ListenAddr::Unix(PathBuf::from(path)));
        }

        let host_port = s.strip_prefix("tcp://").unwrap_or(s);
        match host_port.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(ListenAddr::Tcp(host_port.to_string()))
            }
            _ => Err(RpcError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "tcp://{addr}"),
            ListenAddr::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

enum Inner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

/// Bound listener. A Unix socket file is removed when the listener drops.
pub struct Listener {
    inner: Inner,
    socket_path: Option<PathBuf>,
}

impl Listener {
    /// Bind to `addr`, replacing a stale Unix socket file if present.
    pub async fn bind(addr: &ListenAddr) -> Result<Self> {
        match addr {
            ListenAddr::Tcp(host_port) => Ok(Self {
                inner: Inner::Tcp(TcpListener::bind(host_port.as_str()).await?),
                socket_path: None,
            }),
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                Ok(Self {
                    inner: Inner::Unix(tokio::net::UnixListener::bind(path)?),
                    socket_path: Some(path.clone()),
                })
            }
            #[cfg(not(unix))]
            ListenAddr::Unix(_) => Err(RpcError::InvalidAddress(format!(
                "{addr}: Unix sockets are not supported on this platform"
            ))),
        }
    }

    /// Accept one connection, returning it with a printable peer address.
    pub async fn accept(&self) -> Result<(Connection, String)> {
        match &self.inner {
            Inner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Connection::Tcp(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Inner::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((Connection::Unix(stream), "unix".to_string()))
            }
        }
    }

    /// The bound address; for TCP this carries the actual port.
    pub fn local_addr(&self) -> Result<ListenAddr> {
        match &self.inner {
            Inner::Tcp(listener) => Ok(ListenAddr::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            Inner::Unix(_) => Ok(ListenAddr::Unix(
                self.socket_path.clone().unwrap_or_default(),
            )),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(path) = &self.socket_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// An accepted connection.
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write_vectored(cx, bufs),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Connection::Tcp(s) => s.is_write_vectored(),
            #[cfg(unix)]
            Connection::Unix(s) => s.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
