//! Engine handle
//!
//! Owns the backend's lifecycle: create → initialize → reload → run → unload.
//! Initialization binds the device, completion sink, and trace recorder
//! exactly once; the lifecycle state machine rejects out-of-order calls.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{Device, EngineConfig};
use crate::engine::backend::EngineBackend;
use crate::engine::error::EngineError;
use crate::engine::request::Request;
use crate::engine::streaming::{StreamOutput, StreamSink};

/// Records engine events for diagnostics
///
/// Stands in for a full event-trace recorder; events land in the `tracing`
/// stream, at info level when the engine runs verbose.
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    verbose: bool,
}

impl TraceRecorder {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn record(&self, request_id: &str, event: &str) {
        if self.verbose {
            tracing::info!(request_id = %request_id, "{event}");
        } else {
            tracing::debug!(request_id = %request_id, "{event}");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initialized,
    Loaded,
    Unloaded,
}

struct HandleInner {
    backend: Box<dyn EngineBackend>,
    lifecycle: Lifecycle,
    device: Option<Device>,
    sink: Option<StreamSink>,
    trace: Option<TraceRecorder>,
}

/// Thread-safe handle owning the engine instance
///
/// Clones share the same engine. Submission and abort may be called from any
/// task; only the generation loop calls [`EngineHandle::step`].
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Mutex<HandleInner>>,
}

impl EngineHandle {
    /// Allocates a new, uninitialized engine around the given backend
    pub fn create(backend: Box<dyn EngineBackend>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HandleInner {
                backend,
                lifecycle: Lifecycle::Created,
                device: None,
                sink: None,
                trace: None,
            })),
        }
    }

    fn locked(&self) -> MutexGuard<'_, HandleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the compute device, completion sink, and trace recorder.
    ///
    /// Must be called exactly once before first use; a second call fails with
    /// an initialization error.
    pub fn initialize(
        &self,
        device: Device,
        sink: StreamSink,
        trace: TraceRecorder,
    ) -> Result<(), EngineError> {
        let mut inner = self.locked();
        if inner.lifecycle != Lifecycle::Created {
            return Err(EngineError::Initialization(
                "engine is already initialized".to_string(),
            ));
        }
        inner.device = Some(device);
        inner.sink = Some(sink);
        inner.trace = Some(trace);
        inner.lifecycle = Lifecycle::Initialized;
        tracing::info!(?device, "engine initialized");
        Ok(())
    }

    /// Loads or hot-swaps model weights. Blocking.
    pub fn reload(&self, config: &EngineConfig) -> Result<(), EngineError> {
        let mut inner = self.locked();
        match inner.lifecycle {
            Lifecycle::Initialized | Lifecycle::Loaded => {}
            Lifecycle::Created => {
                return Err(EngineError::Initialization(
                    "reload requires an initialized engine".to_string(),
                ));
            }
            Lifecycle::Unloaded => {
                return Err(EngineError::Initialization(
                    "engine has been unloaded".to_string(),
                ));
            }
        }
        inner.backend.reload(config)?;
        inner.lifecycle = Lifecycle::Loaded;
        Ok(())
    }

    /// Enqueues a request for the generation loop.
    ///
    /// Returns once the request is accepted, not once it completes. Queue
    /// depth is unbounded; a production bound is an open extension point.
    pub fn add_request(&self, request: Request) -> Result<(), EngineError> {
        let mut inner = self.locked();
        if inner.lifecycle != Lifecycle::Loaded {
            return Err(EngineError::Initialization(
                "no model loaded".to_string(),
            ));
        }
        if let Some(trace) = &inner.trace {
            trace.record(&request.id, "request submitted");
        }
        inner.backend.add_request(request)
    }

    /// Requests cancellation. Best-effort and idempotent; the request may
    /// still produce a final delta before the engine retires it.
    pub fn abort_request(&self, id: &str) {
        let mut inner = self.locked();
        if inner.lifecycle != Lifecycle::Loaded {
            return;
        }
        if let Some(trace) = &inner.trace {
            trace.record(id, "request abort requested");
        }
        inner.backend.abort_request(id);
    }

    /// Advances the engine by one decode step. Generation-loop only.
    pub fn step(&self) -> Vec<StreamOutput> {
        let mut inner = self.locked();
        if inner.lifecycle != Lifecycle::Loaded {
            return Vec::new();
        }
        inner.backend.step()
    }

    /// Releases model weights and device resources.
    ///
    /// Must only be called after both background loops have exited.
    pub fn unload(&self) {
        let mut inner = self.locked();
        inner.backend.unload();
        inner.lifecycle = Lifecycle::Unloaded;
    }

    /// The completion sink registered at initialization
    pub fn sink(&self) -> Option<StreamSink> {
        self.locked().sink.clone()
    }

    pub fn device(&self) -> Option<Device> {
        self.locked().device
    }

    pub fn is_loaded(&self) -> bool {
        self.locked().lifecycle == Lifecycle::Loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::engine::backend::SimBackend;
    use tempfile::TempDir;

    fn handle() -> EngineHandle {
        EngineHandle::create(Box::new(SimBackend::new()))
    }

    fn initialized_handle() -> EngineHandle {
        let handle = handle();
        let (sink, _rx) = StreamSink::channel();
        handle
            .initialize(Device::cpu(), sink, TraceRecorder::new(false))
            .unwrap();
        handle
    }

    fn loaded_handle() -> (EngineHandle, TempDir) {
        let handle = initialized_handle();
        let dir = tempfile::tempdir().unwrap();
        handle
            .reload(&EngineConfig::local(dir.path().to_string_lossy()))
            .unwrap();
        (handle, dir)
    }

    #[test]
    fn test_double_initialize_fails() {
        let handle = initialized_handle();
        let (sink, _rx) = StreamSink::channel();
        let err = handle
            .initialize(Device::cpu(), sink, TraceRecorder::new(false))
            .unwrap_err();
        assert!(matches!(err, EngineError::Initialization(_)));
    }

    #[test]
    fn test_reload_before_initialize_fails() {
        let err = handle()
            .reload(&EngineConfig::local("m"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Initialization(_)));
    }

    #[test]
    fn test_add_request_without_model_fails() {
        let handle = initialized_handle();
        let request = Request::new("req-1", vec![1], GenerationConfig::default()).unwrap();
        let err = handle.add_request(request).unwrap_err();
        assert!(matches!(err, EngineError::Initialization(_)));
    }

    #[test]
    fn test_lifecycle_reload_and_unload() {
        let (handle, _dir) = loaded_handle();
        assert!(handle.is_loaded());
        assert_eq!(handle.device(), Some(Device::cpu()));

        handle.unload();
        assert!(!handle.is_loaded());
        // Stepping an unloaded engine yields nothing.
        assert!(handle.step().is_empty());
    }

    #[test]
    fn test_reload_after_unload_fails() {
        let (handle, dir) = loaded_handle();
        handle.unload();
        let err = handle
            .reload(&EngineConfig::local(dir.path().to_string_lossy()))
            .unwrap_err();
        assert!(matches!(err, EngineError::Initialization(_)));
    }

    #[test]
    fn test_submit_and_step_through_handle() {
        let (handle, _dir) = loaded_handle();
        let mut config = GenerationConfig::default();
        config.max_tokens = Some(1);
        let request = Request::new("req-1", vec![7], config).unwrap();
        handle.add_request(request).unwrap();

        let outputs = handle.step();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].first_token(), Some(8));
    }

    #[test]
    fn test_abort_before_load_is_noop() {
        let handle = initialized_handle();
        // Should not panic or error.
        handle.abort_request("req-1");
    }
}
