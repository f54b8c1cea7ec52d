//! Concurrent detection pipeline.
//!
//! Orchestrator (caller thread) → frame mailbox → detection worker →
//! {display mailbox, publish mailbox} → {render loop, publish throttler}.
//! Every hand-off is a single-slot latest-value mailbox; all threads share one
//! `Shutdown` flag.

pub mod mailbox;
mod orchestrator;
mod shutdown;
mod throttle;
mod worker;

pub use mailbox::{mailbox, Disconnected, Receiver, Recv, SendError, Sender};
pub use orchestrator::{run_pipeline, PipelineSettings, PipelineSummary};
pub use shutdown::{Shutdown, ShutdownReason, Workers};
pub use throttle::{PublishThrottler, Throttle};
pub use worker::DetectionWorker;
