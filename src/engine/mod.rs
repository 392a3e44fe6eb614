//! Render pipeline: throttle, completion routing, finalization, and the
//! async driver that ties them to a renderer.

pub mod finalize;
pub mod preview;
pub mod router;
pub mod service;
pub mod session;
pub mod throttle;

pub use finalize::{Finalizer, project_to_mint_candidates};
pub use preview::{Completion, PreviewEngine};
pub use router::{CompletionRouter, PendingPayload, PendingPayloads, Routed};
pub use service::{ExitReason, PreviewService, RenderRequest, RunSummary};
pub use session::Session;
pub use throttle::{Counters, DispatchThrottle};
