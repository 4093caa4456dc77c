//! Engine backend seam
//!
//! The actual inference engine (scheduling, batching, KV-cache paging,
//! speculative decoding) lives behind [`EngineBackend`]. [`SimBackend`] is a
//! deterministic CPU simulation of that contract, used by the demo binary and
//! the test suite.

use std::path::Path;

use crate::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::request::Request;
use crate::engine::streaming::{FinishReason, StreamOutput};

/// Token-id space of the simulated model
pub const SIM_VOCAB_SIZE: i32 = 64000;

/// Generation budget applied when a request leaves `max_tokens` unset
pub const DEFAULT_MAX_TOKENS: u32 = 128;

/// The black-box inference engine contract
///
/// Implementations own all engine-internal state. Only the generation loop
/// calls `step`; submission and abort arrive through the engine handle's
/// entry points under the same lock.
pub trait EngineBackend: Send + 'static {
    /// Loads or hot-swaps model weights described by the configuration.
    /// Blocking; may take seconds to minutes for a real engine.
    fn reload(&mut self, config: &EngineConfig) -> Result<(), EngineError>;

    /// Enqueues a request. Returns once accepted, not once completed.
    fn add_request(&mut self, request: Request) -> Result<(), EngineError>;

    /// Requests cancellation. Idempotent: unknown or finished ids are a no-op.
    fn abort_request(&mut self, id: &str);

    /// Advances every in-flight request by one decode step, returning the
    /// deltas produced. An empty result means the engine is idle.
    fn step(&mut self) -> Vec<StreamOutput>;

    /// Releases model weights and device resources. Callers must ensure no
    /// loop still steps the engine.
    fn unload(&mut self);

    /// Whether model weights are currently loaded
    fn is_loaded(&self) -> bool;
}

struct ActiveRequest {
    request: Request,
    /// Last input token; the continuation is derived from it
    last: i32,
    produced: u32,
    finished: Option<FinishReason>,
}

/// Deterministic CPU simulation of an inference engine
///
/// Each decode step emits one token per candidate group, continuing the input
/// as `last + step + group (mod vocab)`. A request finishes with `Length` at
/// its `max_tokens` budget or `Stop` upon emitting a configured stop token.
/// Sampling parameters are accepted but do not alter the deterministic
/// continuation; sampling quality is an engine-internal concern.
pub struct SimBackend {
    loaded: Option<EngineConfig>,
    /// In-flight requests in submission order
    active: Vec<ActiveRequest>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            loaded: None,
            active: Vec::new(),
        }
    }

    /// Number of in-flight (unfinished) requests
    pub fn active_requests(&self) -> usize {
        self.active
            .iter()
            .filter(|a| a.finished.is_none())
            .count()
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBackend for SimBackend {
    fn reload(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        if !Path::new(&config.model).exists() {
            return Err(EngineError::Resource(format!(
                "model artifact not found at `{}`",
                config.model
            )));
        }
        // Hot swap: in-flight state from the previous weights is dropped.
        self.active.clear();
        tracing::info!(model = %config.model, "sim engine weights loaded");
        self.loaded = Some(config.clone());
        Ok(())
    }

    fn add_request(&mut self, request: Request) -> Result<(), EngineError> {
        if self.loaded.is_none() {
            return Err(EngineError::Initialization(
                "cannot accept requests before a model is loaded".to_string(),
            ));
        }
        if self
            .active
            .iter()
            .any(|a| a.finished.is_none() && a.request.id == request.id)
        {
            return Err(EngineError::InvalidRequest(format!(
                "request id `{}` is already in flight",
                request.id
            )));
        }
        // Input is validated non-empty at construction.
        let last = request.input_tokens.last().copied().unwrap_or(0);
        tracing::debug!(request_id = %request.id, tokens = request.input_tokens.len(), "request queued");
        self.active.push(ActiveRequest {
            request,
            last,
            produced: 0,
            finished: None,
        });
        Ok(())
    }

    fn abort_request(&mut self, id: &str) {
        if let Some(active) = self
            .active
            .iter_mut()
            .find(|a| a.request.id == id && a.finished.is_none())
        {
            active.finished = Some(FinishReason::Abort);
            tracing::debug!(request_id = %id, "request abort requested");
        }
    }

    fn step(&mut self) -> Vec<StreamOutput> {
        if self.loaded.is_none() {
            return Vec::new();
        }
        let mut outputs = Vec::new();
        self.active.retain_mut(|active| {
            let n = active.request.config.n as usize;

            // Aborted ahead of this step: emit the final (empty) delta and retire.
            if let Some(reason) = active.finished {
                outputs.push(StreamOutput {
                    request_id: active.request.id.clone(),
                    group_delta_token_ids: vec![Vec::new(); n],
                    finish_reason: Some(reason),
                });
                return false;
            }

            let step = active.produced as i32;
            let mut groups = Vec::with_capacity(n);
            let mut finish = None;
            for group in 0..n as i32 {
                let token = (active.last + step + 1 + group).rem_euclid(SIM_VOCAB_SIZE);
                if active.request.config.stop_token_ids.contains(&token) {
                    finish = Some(FinishReason::Stop);
                }
                groups.push(vec![token]);
            }
            active.produced += 1;

            let budget = active.request.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
            if finish.is_none() && active.produced >= budget {
                finish = Some(FinishReason::Length);
            }

            outputs.push(StreamOutput {
                request_id: active.request.id.clone(),
                group_delta_token_ids: groups,
                finish_reason: finish,
            });
            finish.is_none()
        });
        outputs
    }

    fn unload(&mut self) {
        self.active.clear();
        self.loaded = None;
        tracing::info!("sim engine unloaded");
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}
