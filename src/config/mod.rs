//! Engine and generation configuration
//!
//! Structured configuration payloads crossing the engine boundary, with
//! fail-fast validation at parse time.

pub mod engine;
pub mod generation;

pub use engine::{
    Device, DeviceKind, EngineConfig, EngineMode, PrefillMode, PrefixCacheMode, SpeculativeMode,
};
pub use generation::GenerationConfig;
