use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::prelude::*;
use bytes::Bytes;
use serde_json::Value;
use streamgate_frame::{hex_dump, Frame, FrameDecoder};
use streamgate_transport::{
    Datagram, DatagramHandler, ReplySink, TransportAction, TransportError,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::batch::{Batch, BatchResults};
use crate::command::Command;
use crate::error::{DispatchError, Result};
use crate::gateway::{submit, DispatchGateway, Submitted};
use crate::session::SessionManager;

/// Protocol name passed to the backend parser when none is configured.
pub const DEFAULT_PROTOCOL: &str = "S228";

/// Frame pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Protocol name handed to the backend with every frame.
    pub protocol: String,
    /// Upper bound on one frame's round trip.
    pub dispatch_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            dispatch_timeout: Duration::from_secs(30),
        }
    }
}

/// One frame's batch in flight, with everything needed to answer the device.
struct PendingBatch {
    peer: SocketAddr,
    frame_index: usize,
    submitted: Submitted,
}

/// Decodes datagrams and dispatches every frame under the current session.
///
/// Frames are submitted in datagram order and frame order. Their completions
/// run as independent tasks and may finish in any order.
pub struct FramePipeline {
    sessions: Arc<SessionManager>,
    gateway: Arc<dyn DispatchGateway>,
    replies: Arc<dyn ReplySink>,
    config: PipelineConfig,
}

impl FramePipeline {
    pub fn new(
        sessions: Arc<SessionManager>,
        gateway: Arc<dyn DispatchGateway>,
        replies: Arc<dyn ReplySink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sessions,
            gateway,
            replies,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Decode `datagram` and submit a batch per frame.
    ///
    /// Returns the completion tasks. Must be called from within a tokio runtime.
    pub fn process_datagram(&self, datagram: Datagram) -> Vec<JoinHandle<()>> {
        let endpoint = datagram.endpoint();
        debug!(
            peer = %endpoint,
            size = datagram.data.len(),
            data = %hex_dump(&datagram.data),
            "datagram"
        );

        let mut decoder = FrameDecoder::new(datagram.data.clone());
        let mut tasks = Vec::new();
        let mut index = 0usize;
        while let Some(item) = decoder.next() {
            match item {
                Ok(frame) => {
                    match self.dispatch_frame(datagram.peer, &endpoint, index, &frame) {
                        Ok(pending) => tasks.push(self.spawn_completion(pending)),
                        Err(DispatchError::NoSession) => {
                            warn!(peer = %endpoint, frame = index, "no session; frame dropped");
                        }
                        Err(err) => self.sessions.on_backend_error(&err),
                    }
                    index += 1;
                }
                Err(err) => {
                    let residue = decoder.residue().cloned().unwrap_or_default();
                    warn!(
                        peer = %endpoint,
                        frame = index,
                        error = %err,
                        discarded = residue.len(),
                        "malformed datagram; rest discarded"
                    );
                    debug!(peer = %endpoint, residue = %hex_dump(&residue), "discarded bytes");
                }
            }
        }
        tasks
    }

    fn dispatch_frame(
        &self,
        peer: SocketAddr,
        endpoint: &str,
        frame_index: usize,
        frame: &Frame,
    ) -> Result<PendingBatch> {
        let prelude = self.sessions.prelude()?;
        let call = Command::ApplicationCall {
            protocol: self.config.protocol.clone(),
            endpoint: endpoint.to_string(),
            payload_b64: BASE64_STANDARD.encode(&frame.raw),
        };
        let submitted = submit(self.gateway.as_ref(), Batch::new(prelude, vec![call]));
        debug!(
            peer = %endpoint,
            frame = frame_index,
            size = frame.wire_size(),
            commands = submitted.batch().len(),
            "frame dispatched"
        );
        Ok(PendingBatch {
            peer,
            frame_index,
            submitted,
        })
    }

    fn spawn_completion(&self, pending: PendingBatch) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let replies = Arc::clone(&self.replies);
        let timeout = self.config.dispatch_timeout;
        tokio::spawn(async move {
            let PendingBatch {
                peer,
                frame_index,
                submitted,
            } = pending;
            let outcome = submitted.complete(timeout).await.and_then(reply_bytes);
            match outcome {
                Ok(Some(reply)) => {
                    let len = reply.len();
                    if let Err(err) = replies.send_reply(peer, reply) {
                        warn!(%peer, frame = frame_index, error = %err, "reply dropped");
                    } else {
                        debug!(%peer, frame = frame_index, size = len, "reply queued");
                    }
                }
                Ok(None) => debug!(%peer, frame = frame_index, "no reply"),
                Err(err) => sessions.on_backend_error(&err),
            }
        })
    }
}

/// Base64-decoded application answer, or `None` when the backend has
/// nothing to send back.
fn reply_bytes(results: BatchResults) -> Result<Option<Bytes>> {
    let answer = results.into_values()?.into_iter().next().flatten();
    match answer {
        None => Ok(None),
        Some(Value::String(encoded)) => Ok(Some(Bytes::from(BASE64_STANDARD.decode(encoded)?))),
        Some(_) => Err(DispatchError::UnexpectedResult {
            command: "application_call",
            message: "reply is not a base64 string".to_string(),
        }),
    }
}

impl DatagramHandler for FramePipeline {
    fn on_datagram(&self, datagram: Datagram) {
        self.process_datagram(datagram);
    }

    fn on_send_complete(&self, peer: SocketAddr, len: usize) {
        debug!(%peer, size = len, "reply sent");
    }

    fn on_transport_error(&self, error: &TransportError) -> TransportAction {
        match error {
            // Per-peer failure; the socket itself is fine.
            TransportError::Send { peer, .. } => {
                warn!(%peer, error = %error, "reply send failed");
                TransportAction::Continue
            }
            _ => {
                error!(error = %error, "transport error; requesting reopen");
                TransportAction::Reopen
            }
        }
    }

    fn on_heartbeat(&self, now: Instant) {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            sessions.ensure_fresh(now).await;
        });
    }
}
