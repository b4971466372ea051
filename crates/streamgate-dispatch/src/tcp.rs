use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

use crate::batch::CommandResult;
use crate::error::{DispatchError, Result};
use crate::gateway::{DispatchGateway, PendingReply};

/// Longest response line accepted from the backend.
pub const MAX_RESPONSE_LINE: usize = 4 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct BatchRequest {
    commands: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BatchResponse {
    results: Vec<CommandResult>,
}

/// Gateway speaking newline-delimited JSON to a backend over TCP.
///
/// Each batch opens its own connection, writes one `{"commands": [...]}`
/// line and reads one `{"results": [...]}` line, so batches complete
/// independently of each other.
#[derive(Debug, Clone)]
pub struct TcpJsonGateway {
    addr: String,
    connect_timeout: Duration,
}

impl TcpJsonGateway {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl DispatchGateway for TcpJsonGateway {
    /// Must be called from within a tokio runtime.
    fn submit(&self, commands: Vec<String>) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let addr = self.addr.clone();
        let connect_timeout = self.connect_timeout;
        tokio::spawn(async move {
            let result = exchange(&addr, connect_timeout, commands).await;
            let _ = tx.send(result);
        });
        rx
    }
}

async fn exchange(
    addr: &str,
    connect_timeout: Duration,
    commands: Vec<String>,
) -> Result<Vec<CommandResult>> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| DispatchError::Timeout(connect_timeout))??;
    let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(MAX_RESPONSE_LINE));

    let count = commands.len();
    lines
        .send(serde_json::to_string(&BatchRequest { commands })?)
        .await?;
    debug!(%addr, commands = count, "batch sent");

    let line = lines.next().await.ok_or(DispatchError::Disconnected)??;
    let response: BatchResponse = serde_json::from_str(&line)?;
    Ok(response.results)
}
