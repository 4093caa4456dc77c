//! Engine driver façade
//!
//! Composes the engine handle, request registry, completion sink, and the two
//! background loops into the public construct / chat-completion / stop API.

pub mod loops;

pub use loops::LoopState;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{Device, EngineConfig, GenerationConfig};
use crate::engine::backend::EngineBackend;
use crate::engine::error::EngineError;
use crate::engine::handle::{EngineHandle, TraceRecorder};
use crate::engine::request::{Request, RequestRegistry};
use crate::engine::streaming::{StreamBatch, StreamSink};
use loops::{spawn_generation_loop, spawn_stream_back_loop};

/// Façade over a threaded inference engine
///
/// Construction starts the engine and both background loops; results arrive
/// out-of-band on the stream receiver returned alongside the driver. [`stop`]
/// must be called to shut the engine down cleanly; it is idempotent.
///
/// [`stop`]: EngineDriver::stop
pub struct EngineDriver {
    handle: EngineHandle,
    registry: RequestRegistry,
    exit_tx: watch::Sender<bool>,
    generation_task: Option<JoinHandle<()>>,
    stream_back_task: Option<JoinHandle<()>>,
    generation_state: watch::Receiver<LoopState>,
    stream_back_state: watch::Receiver<LoopState>,
    stopped: bool,
}

impl std::fmt::Debug for EngineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineDriver")
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl EngineDriver {
    /// Creates the engine, starts both background loops, then loads the model.
    ///
    /// The configuration is validated up front, before any loop starts. The
    /// reload happens only once both loops are running, so output produced
    /// during loading always has a loop to carry it back. Returns the driver
    /// and the receiver on which completion batches arrive.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn construct(
        backend: Box<dyn EngineBackend>,
        config: EngineConfig,
        device: Device,
    ) -> Result<(Self, mpsc::UnboundedReceiver<StreamBatch>), EngineError> {
        config.validate()?;

        let handle = EngineHandle::create(backend);
        let (sink, stream_rx) = StreamSink::channel();
        handle.initialize(device, sink.clone(), TraceRecorder::new(config.verbose))?;

        let registry = RequestRegistry::new();
        let (exit_tx, exit_rx) = watch::channel(false);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        let (generation_task, generation_state) =
            spawn_generation_loop(handle.clone(), batch_tx, exit_rx.clone());
        let (stream_back_task, stream_back_state) =
            spawn_stream_back_loop(sink, registry.clone(), batch_rx, exit_rx);

        if let Err(e) = handle.reload(&config) {
            // Fail fast with no partial engine state left running.
            let _ = exit_tx.send(true);
            let _ = generation_task.await;
            let _ = stream_back_task.await;
            return Err(e);
        }
        tracing::info!(model = %config.model, "engine driver ready");

        Ok((
            Self {
                handle,
                registry,
                exit_tx,
                generation_task: Some(generation_task),
                stream_back_task: Some(stream_back_task),
                generation_state,
                stream_back_state,
                stopped: false,
            },
            stream_rx,
        ))
    }

    /// Submits one token-based chat completion request.
    ///
    /// Returns once the engine accepts the request; results arrive later on
    /// the stream receiver, potentially concurrently with further
    /// submissions. The input must be non-empty and the id unique among
    /// outstanding requests.
    pub fn chat_completion(
        &self,
        token_ids: Vec<i32>,
        config: GenerationConfig,
        request_id: impl Into<String>,
    ) -> Result<(), EngineError> {
        if self.stopped {
            return Err(EngineError::Shutdown(
                "driver is already stopped".to_string(),
            ));
        }
        let request = Request::new(request_id, token_ids, config)?;
        let id = request.id.clone();
        if !self.registry.track(&id) {
            return Err(EngineError::InvalidRequest(format!(
                "request id `{id}` is already in flight"
            )));
        }
        if let Err(e) = self.handle.add_request(request) {
            self.registry.forget(&id);
            return Err(e);
        }
        Ok(())
    }

    /// Aborts every tracked request, signals both loops to exit, waits for
    /// them to terminate, then unloads the engine.
    ///
    /// Idempotent: a second call is a no-op. Shutdown is unconditional; even
    /// if every abort was a no-op, the loops are still signaled and awaited
    /// before the engine is unloaded.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        if self.stopped {
            tracing::debug!("stop() called on an already-stopped driver");
            return Ok(());
        }
        self.stopped = true;

        for id in self.registry.drain() {
            self.handle.abort_request(&id);
        }
        let _ = self.exit_tx.send(true);

        let mut join_error = None;
        for (name, task) in [
            ("generation", self.generation_task.take()),
            ("stream-back", self.stream_back_task.take()),
        ] {
            if let Some(task) = task {
                if let Err(e) = task.await {
                    join_error.get_or_insert(EngineError::Shutdown(format!(
                        "{name} loop did not terminate cleanly: {e}"
                    )));
                }
            }
        }

        // Both loops have exited; the engine can now release its resources.
        self.handle.unload();
        tracing::info!("engine driver stopped");

        match join_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Current phase of the generation loop
    pub fn generation_loop_state(&self) -> LoopState {
        *self.generation_state.borrow()
    }

    /// Current phase of the stream-back loop
    pub fn stream_back_loop_state(&self) -> LoopState {
        *self.stream_back_state.borrow()
    }

    /// Number of submitted requests not yet completed or aborted
    pub fn outstanding_requests(&self) -> usize {
        self.registry.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for EngineDriver {
    fn drop(&mut self) {
        // Best effort: let the loops wind down if stop() was never called.
        let _ = self.exit_tx.send(true);
    }
}
