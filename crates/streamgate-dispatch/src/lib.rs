//! Session-gated dispatch of decoded frames to a backend command processor.
//!
//! Every frame becomes one [`Batch`]: an authorization prelude built from
//! the current [`Session`] followed by the application call carrying the
//! frame. Batches go through a [`DispatchGateway`], which answers through a
//! one-shot promise so completions can land in any order. The
//! [`SessionManager`] renews the session on heartbeat ticks and clears it on
//! any backend error.

pub mod batch;
pub mod clock;
pub mod command;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod session;
pub mod tcp;

pub use batch::{Batch, BatchResults, CommandResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{quote_literal, Command};
pub use error::{DispatchError, Result};
pub use gateway::{submit, DispatchGateway, PendingReply, Submitted};
pub use pipeline::{FramePipeline, PipelineConfig, DEFAULT_PROTOCOL};
pub use session::{
    authorization_prelude, Credentials, Phase, Renewal, Session, SessionConfig, SessionManager,
    DEFAULT_BOT_USERNAME, DEFAULT_RENEWAL_HORIZON,
};
pub use tcp::TcpJsonGateway;
