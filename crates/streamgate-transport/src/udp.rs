use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Datagram, DatagramHandler, ReplySink, TransportAction};

/// Largest UDP payload over IPv4.
pub const DEFAULT_MAX_DATAGRAM: usize = 65_507;

/// Replies that may wait for the socket before `send_reply` starts failing.
pub const DEFAULT_REPLY_QUEUE: usize = 1024;

/// UDP transport configuration.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address to bind to.
    pub bind: SocketAddr,
    /// Interval between `on_heartbeat` callbacks; also the rebind retry delay.
    pub heartbeat_interval: Duration,
    /// Receive buffer size; longer datagrams are truncated by the OS.
    pub max_datagram_size: usize,
    /// Capacity of the outbound reply queue.
    pub reply_queue: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            heartbeat_interval: Duration::from_secs(5),
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            reply_queue: DEFAULT_REPLY_QUEUE,
        }
    }
}

type Outbound = (SocketAddr, Bytes);

/// Cloneable handle that queues replies onto a running [`UdpTransport`].
#[derive(Debug, Clone)]
pub struct ReplySender {
    tx: mpsc::Sender<Outbound>,
}

impl ReplySink for ReplySender {
    fn send_reply(&self, peer: SocketAddr, data: Bytes) -> Result<()> {
        self.tx.try_send((peer, data)).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull {
                capacity: self.tx.max_capacity(),
            },
            mpsc::error::TrySendError::Closed(_) => TransportError::Shutdown,
        })
    }
}

/// Non-blocking UDP socket driving a [`DatagramHandler`].
pub struct UdpTransport {
    /// `None` between dropping a failed socket and a successful rebind.
    socket: Option<UdpSocket>,
    local_addr: SocketAddr,
    config: UdpConfig,
    outbound_tx: mpsc::Sender<Outbound>,
    outbound_rx: mpsc::Receiver<Outbound>,
}

impl UdpTransport {
    /// Bind the socket. Must be called from within a tokio runtime.
    pub async fn bind(config: UdpConfig) -> Result<Self> {
        let socket = bind_socket(config.bind).await?;
        let local_addr = socket.local_addr()?;
        let (outbound_tx, outbound_rx) = mpsc::channel(config.reply_queue.max(1));

        info!(%local_addr, "udp listening");

        Ok(Self {
            socket: Some(socket),
            local_addr,
            config,
            outbound_tx,
            outbound_rx,
        })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for queueing replies.
    pub fn reply_sender(&self) -> ReplySender {
        ReplySender {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Errors are reported to the handler. When a reopen fails, the rebind is
    /// retried every heartbeat interval until it succeeds or `cancel` fires.
    pub async fn run(
        mut self,
        handler: Arc<dyn DatagramHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut buf = vec![0u8; self.config.max_datagram_size];
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let Some(socket) = self.socket.as_ref() else {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(local_addr = %self.local_addr, "udp stopped");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
                }
                self.reopen().await;
                continue;
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(local_addr = %self.local_addr, "udp stopped");
                    return Ok(());
                }
                recv = socket.recv_from(&mut buf) => match recv {
                    Ok((n, peer)) => {
                        if n == buf.len() {
                            warn!(%peer, size = n, "datagram may have been truncated");
                        }
                        handler.on_datagram(Datagram::new(Bytes::copy_from_slice(&buf[..n]), peer));
                    }
                    Err(err) => self.report(handler.as_ref(), TransportError::Recv(err)).await,
                },
                Some((peer, data)) = self.outbound_rx.recv() => {
                    match socket.send_to(&data, peer).await {
                        Ok(n) => handler.on_send_complete(peer, n),
                        Err(source) => {
                            self.report(handler.as_ref(), TransportError::Send { peer, source }).await
                        }
                    }
                }
                tick = heartbeat.tick() => handler.on_heartbeat(tick.into_std()),
            }
        }
    }

    async fn report(&mut self, handler: &dyn DatagramHandler, err: TransportError) {
        match handler.on_transport_error(&err) {
            TransportAction::Continue => {}
            TransportAction::Reopen => {
                self.reopen().await;
            }
        }
    }

    /// Drop the current socket and bind the same address again.
    ///
    /// Returns false and leaves the transport without a socket when the bind
    /// fails.
    async fn reopen(&mut self) -> bool {
        debug!(local_addr = %self.local_addr, "reopening udp socket");
        drop(self.socket.take());
        match bind_socket(self.local_addr).await {
            Ok(socket) => {
                self.socket = Some(socket);
                info!(local_addr = %self.local_addr, "udp socket reopened");
                true
            }
            Err(err) => {
                warn!(
                    error = %err,
                    retry_in = ?self.config.heartbeat_interval,
                    "udp rebind failed"
                );
                false
            }
        }
    }
}

async fn bind_socket(addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })
}
