//! Threaded inference engine driver
//!
//! A concurrent request/response façade around a long-running, black-box
//! LLM-serving engine. The driver owns the engine lifecycle, runs two
//! background loops (generation and stream-back), tracks outstanding request
//! ids for clean shutdown, and delivers generated token batches to the caller
//! through a typed channel.
//!
//! # Architecture
//!
//! The actual engine (scheduling, batching, KV-cache management) sits behind
//! the [`engine::EngineBackend`] trait and is never touched directly by the
//! caller. The generation loop is the only task that advances engine state;
//! the caller enqueues and aborts requests through the thread-safe
//! [`engine::EngineHandle`] entry points.

pub mod config;
pub mod driver;
pub mod engine;

// Re-export main types for convenience
pub use config::{Device, DeviceKind, EngineConfig, GenerationConfig};
pub use driver::{EngineDriver, LoopState};
pub use engine::{
    EngineBackend, EngineError, EngineHandle, FinishReason, Request, RequestRegistry, SimBackend,
    StreamBatch, StreamOutput, StreamSink,
};
