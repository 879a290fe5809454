//! One-shot TCP calls to the knitting daemon.
//!
//! Every call opens a fresh connection, writes the whole envelope, reads
//! until the daemon closes its side, and drops the socket. Nothing here
//! retries: a failed call is reported once and the caller decides.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Largest reply relayed from the daemon. Queue replies carry one short
/// record per image, so anything near this is a misbehaving peer.
pub const MAX_REPLY_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonEndpoint {
    pub host: String,
    pub port: u16,
}

impl DaemonEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTimeouts {
    pub connect: Duration,
    /// Bounds the write of the envelope plus the read of the whole reply.
    pub read: Duration,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot open connection to {endpoint}")]
    Unreachable {
        endpoint: DaemonEndpoint,
        timed_out: bool,
        #[source]
        source: Option<io::Error>,
    },
    #[error("daemon at {endpoint} did not answer within {}ms", .after.as_millis())]
    Timeout {
        endpoint: DaemonEndpoint,
        after: Duration,
    },
    #[error("reply from {endpoint} exceeds {limit} bytes")]
    ReplyTooLarge { endpoint: DaemonEndpoint, limit: u64 },
    #[error("connection to {endpoint} failed: {source}")]
    Io {
        endpoint: DaemonEndpoint,
        #[source]
        source: io::Error,
    },
}

impl BridgeError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::Timeout { .. } => "timeout",
            Self::ReplyTooLarge { .. } => "reply_too_large",
            Self::Io { .. } => "io",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonBridge {
    endpoint: DaemonEndpoint,
    timeouts: BridgeTimeouts,
    max_reply_bytes: u64,
}

impl DaemonBridge {
    #[must_use]
    pub fn new(endpoint: DaemonEndpoint, timeouts: BridgeTimeouts) -> Self {
        Self {
            endpoint,
            timeouts,
            max_reply_bytes: MAX_REPLY_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_reply_bytes(mut self, limit: u64) -> Self {
        self.max_reply_bytes = limit;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &DaemonEndpoint {
        &self.endpoint
    }

    /// Sends `envelope` and returns the daemon's reply bytes untouched.
    pub async fn call(&self, envelope: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let mut stream = self.connect().await?;
        let limit = self.max_reply_bytes;

        let exchange = async {
            stream.write_all(envelope).await?;
            stream.flush().await?;
            let mut reply = Vec::new();
            // One byte over the limit is enough to tell an oversized reply apart.
            (&mut stream)
                .take(limit.saturating_add(1))
                .read_to_end(&mut reply)
                .await?;
            Ok::<_, io::Error>(reply)
        };

        let reply = match timeout(self.timeouts.read, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(source)) => {
                return Err(BridgeError::Io {
                    endpoint: self.endpoint.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(BridgeError::Timeout {
                    endpoint: self.endpoint.clone(),
                    after: self.timeouts.read,
                });
            }
        };

        if reply.len() as u64 > limit {
            return Err(BridgeError::ReplyTooLarge {
                endpoint: self.endpoint.clone(),
                limit,
            });
        }

        debug!(
            daemon = %self.endpoint,
            request_bytes = envelope.len(),
            reply_bytes = reply.len(),
            "daemon call completed"
        );
        Ok(reply)
    }

    async fn connect(&self) -> Result<TcpStream, BridgeError> {
        let address = (self.endpoint.host.as_str(), self.endpoint.port);
        match timeout(self.timeouts.connect, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                // Envelopes are small and written in one go.
                stream.set_nodelay(true).ok();
                Ok(stream)
            }
            Ok(Err(source)) => Err(BridgeError::Unreachable {
                endpoint: self.endpoint.clone(),
                timed_out: false,
                source: Some(source),
            }),
            Err(_) => Err(BridgeError::Unreachable {
                endpoint: self.endpoint.clone(),
                timed_out: true,
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use anyhow::Result;
    use tokio::net::TcpListener;

    use super::*;

    fn bridge_for(addr: SocketAddr, read: Duration) -> DaemonBridge {
        DaemonBridge::new(
            DaemonEndpoint::new(addr.ip().to_string(), addr.port()),
            BridgeTimeouts {
                connect: Duration::from_millis(500),
                read,
            },
        )
    }

    async fn closed_port() -> Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);
        Ok(addr)
    }

    #[tokio::test]
    async fn reply_is_read_until_daemon_closes() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            let mut received = vec![0_u8; 64];
            let read = socket.read(&mut received).await?;
            received.truncate(read);
            // Reply arrives in two segments; the bridge must not stop at the first.
            socket.write_all(b"{\"result\":").await?;
            socket.flush().await?;
            socket.write_all(b"{\"status\":3}}\n").await?;
            Ok::<_, io::Error>(received)
        });

        let reply = bridge_for(addr, Duration::from_secs(2))
            .call(br#"{"method":"GET","uri":"/machine"}"#)
            .await?;

        assert_eq!(reply, b"{\"result\":{\"status\":3}}\n");
        let received = daemon.await??;
        assert_eq!(received, br#"{"method":"GET","uri":"/machine"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() -> Result<()> {
        let addr = closed_port().await?;
        let error = bridge_for(addr, Duration::from_secs(1))
            .call(b"{}")
            .await
            .expect_err("nothing listening");

        assert_eq!(error.kind(), "unreachable");
        assert_eq!(
            error.to_string(),
            format!("cannot open connection to 127.0.0.1:{}", addr.port())
        );
        Ok(())
    }

    #[tokio::test]
    async fn connect_to_unroutable_host_returns_within_bound() -> Result<()> {
        let connect = Duration::from_millis(200);
        let bridge = DaemonBridge::new(
            DaemonEndpoint::new("10.255.255.1", 9999),
            BridgeTimeouts {
                connect,
                read: Duration::from_secs(1),
            },
        );

        let started = tokio::time::Instant::now();
        let error = bridge.call(b"{}").await.expect_err("no route");

        assert_eq!(error.kind(), "unreachable");
        assert_eq!(error.to_string(), "cannot open connection to 10.255.255.1:9999");
        assert!(started.elapsed() < connect + Duration::from_millis(300));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_reply_is_refused() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            let mut received = vec![0_u8; 64];
            let _ = socket.read(&mut received).await?;
            let filler = "x".repeat(200);
            socket
                .write_all(format!("{{\"result\":\"{filler}\"}}").as_bytes())
                .await?;
            Ok::<_, io::Error>(())
        });

        let error = bridge_for(addr, Duration::from_secs(2))
            .with_max_reply_bytes(64)
            .call(b"{}")
            .await
            .expect_err("reply over limit");

        assert_eq!(error.kind(), "reply_too_large");
        // The bridge hangs up mid-reply; the daemon side may see a reset.
        let _ = daemon.await;
        Ok(())
    }

    #[tokio::test]
    async fn silent_daemon_times_out() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let daemon = tokio::spawn(async move {
            let (socket, _) = listener.accept().await?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
            Ok::<_, io::Error>(())
        });

        let started = tokio::time::Instant::now();
        let error = bridge_for(addr, Duration::from_millis(100))
            .call(b"{}")
            .await
            .expect_err("daemon never answers");

        assert_eq!(error.kind(), "timeout");
        assert!(started.elapsed() < Duration::from_secs(2));
        daemon.abort();
        Ok(())
    }
}
