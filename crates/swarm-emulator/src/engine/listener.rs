use crate::engine::planner::EndpointSpec;
use crate::error::{EmulatorError, Result};
use crate::metrics;
use bytes::BytesMut;
use std::io::ErrorKind;
use std::net::SocketAddr;
use swarm_common::{DisconnectPolicy, EndpointsConfig};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Knobs shared by every listener of a worker group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSettings {
    pub chunk_size: usize,
    pub backlog: u32,
    pub on_disconnect: DisconnectPolicy,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self::from_config(&EndpointsConfig::default(), DisconnectPolicy::default())
    }
}

impl ListenerSettings {
    pub fn from_config(endpoints: &EndpointsConfig, on_disconnect: DisconnectPolicy) -> Self {
        Self {
            chunk_size: endpoints.read_chunk_size,
            backlog: endpoints.accept_backlog,
            on_disconnect,
        }
    }
}

/// Why a listener stopped draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The token was cancelled, either while waiting for a client or mid-drain.
    Cancelled,
    /// The client closed its side of the connection.
    PeerClosed,
    /// Reading from the client failed.
    ReadFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerReport {
    pub port: u16,
    pub connections: u64,
    pub bytes_drained: u64,
    pub outcome: DrainOutcome,
}

struct BoundGuard;

impl BoundGuard {
    fn new() -> Self {
        metrics::LISTENERS_BOUND.inc();
        Self
    }
}

impl Drop for BoundGuard {
    fn drop(&mut self) {
        metrics::LISTENERS_BOUND.dec();
    }
}

struct ClientGuard;

impl ClientGuard {
    fn new() -> Self {
        metrics::CLIENTS_CONNECTED.inc();
        Self
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        metrics::CLIENTS_CONNECTED.dec();
    }
}

/// Binds `addr` with SO_REUSEADDR so restarts don't trip over TIME_WAIT sockets.
fn bind_reusable(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }?;
    socket.set_reuseaddr(true)?;

    let classify = |e: std::io::Error| match e.kind() {
        ErrorKind::AddrInUse => EmulatorError::BindConflict {
            port: addr.port(),
            source: e,
        },
        _ => EmulatorError::Io(e),
    };
    socket.bind(addr).map_err(classify)?;
    socket.listen(backlog).map_err(classify)
}

/// Reads and discards fixed-size chunks until the peer goes away or `token` fires.
async fn drain(
    stream: &mut TcpStream,
    peer: SocketAddr,
    port: u16,
    chunk_size: usize,
    token: &CancellationToken,
    bytes_drained: &mut u64,
) -> DrainOutcome {
    let mut buf = BytesMut::with_capacity(chunk_size);
    loop {
        buf.clear();
        tokio::select! {
            _ = token.cancelled() => return DrainOutcome::Cancelled,
            res = stream.read_buf(&mut buf) => match res {
                Ok(0) => {
                    info!(port = port, peer = %peer, "Client disconnected");
                    return DrainOutcome::PeerClosed;
                }
                Ok(n) => {
                    *bytes_drained += n as u64;
                    metrics::BYTES_DRAINED.inc_by(n as u64);
                    debug!(port = port, peer = %peer, bytes = n, "Drained chunk");
                }
                Err(e) => {
                    warn!(port = port, peer = %peer, error = %e, "Read failed");
                    return DrainOutcome::ReadFailed(e.to_string());
                }
            }
        }
    }
}

/// Emulates one middleware: bind, accept a single client, drain it.
///
/// With an uncancelled token this only returns after the client leaves under
/// [`DisconnectPolicy::Terminate`]; under [`DisconnectPolicy::Reaccept`] it runs
/// until cancelled. The listening socket is never asked for a second client
/// while one is being drained.
pub async fn serve(
    spec: &EndpointSpec,
    settings: &ListenerSettings,
    token: CancellationToken,
) -> Result<ListenerReport> {
    let addr: SocketAddr = spec.bind_addr().parse().map_err(|_| {
        EmulatorError::InvalidConfiguration(format!("bad bind address {}", spec.bind_addr()))
    })?;

    let listener = match bind_reusable(addr, settings.backlog) {
        Ok(l) => l,
        Err(e) => {
            if matches!(e, EmulatorError::BindConflict { .. }) {
                metrics::BIND_FAILURES.inc();
            }
            warn!(port = spec.port, error = %e, "Failed to bind middleware socket");
            return Err(e);
        }
    };
    let _bound = BoundGuard::new();
    debug!(port = spec.port, index = spec.index, "Middleware listening");

    let mut report = ListenerReport {
        port: spec.port,
        connections: 0,
        bytes_drained: 0,
        outcome: DrainOutcome::Cancelled,
    };

    loop {
        let (mut stream, peer) = tokio::select! {
            _ = token.cancelled() => {
                report.outcome = DrainOutcome::Cancelled;
                return Ok(report);
            }
            res = listener.accept() => res?,
        };

        report.connections += 1;
        let _client = ClientGuard::new();
        info!(port = spec.port, peer = %peer, "Client connected");

        report.outcome = drain(
            &mut stream,
            peer,
            spec.port,
            settings.chunk_size,
            &token,
            &mut report.bytes_drained,
        )
        .await;

        if report.outcome == DrainOutcome::Cancelled
            || settings.on_disconnect == DisconnectPolicy::Terminate
        {
            return Ok(report);
        }
    }
}
