//! Engine boundary
//!
//! Everything that touches the black-box inference engine: the backend trait,
//! the lifecycle-owning handle, request bookkeeping, and stream output types.

pub mod backend;
pub mod error;
pub mod handle;
pub mod request;
pub mod streaming;

// Re-export main types for convenience
pub use backend::{EngineBackend, SimBackend};
pub use error::EngineError;
pub use handle::{EngineHandle, TraceRecorder};
pub use request::{Request, RequestRegistry};
pub use streaming::{FinishReason, StreamBatch, StreamOutput, StreamSink};
