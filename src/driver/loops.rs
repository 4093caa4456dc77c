//! Background loops
//!
//! The generation loop advances engine state and emits output batches; the
//! stream-back loop forwards them to the completion sink, decoupling callback
//! latency from generation throughput. Both follow a cooperative two-phase
//! exit: the driver flips a watch signal, each loop observes it between
//! steps, publishes `ExitRequested`, and winds down to `Stopped`.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::engine::handle::EngineHandle;
use crate::engine::request::RequestRegistry;
use crate::engine::streaming::{StreamBatch, StreamSink};

/// Idle backoff between decode steps when the engine has no work
const STEP_IDLE_INTERVAL: Duration = Duration::from_millis(2);

/// Background loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    ExitRequested,
    Stopped,
}

/// Spawns the generation loop.
///
/// Steps the engine until the exit signal is observed. Batches go to the
/// stream-back loop over `batch_tx`; dropping that sender on exit is what
/// lets the stream-back loop drain and finish.
pub(crate) fn spawn_generation_loop(
    handle: EngineHandle,
    batch_tx: mpsc::UnboundedSender<StreamBatch>,
    mut exit_rx: watch::Receiver<bool>,
) -> (JoinHandle<()>, watch::Receiver<LoopState>) {
    let (state_tx, state_rx) = watch::channel(LoopState::Running);
    let task = tokio::spawn(async move {
        loop {
            if *exit_rx.borrow() {
                let _ = state_tx.send(LoopState::ExitRequested);
                break;
            }
            let outputs = handle.step();
            if outputs.is_empty() {
                // Idle: wait for work to appear or the exit signal to flip.
                tokio::select! {
                    _ = exit_rx.changed() => {}
                    _ = tokio::time::sleep(STEP_IDLE_INTERVAL) => {}
                }
            } else if batch_tx.send(outputs).is_err() {
                tracing::debug!("stream-back loop gone, generation loop exiting");
                break;
            } else {
                // Let submissions and aborts interleave between decode steps.
                tokio::task::yield_now().await;
            }
        }
        let _ = state_tx.send(LoopState::Stopped);
        tracing::debug!("generation loop stopped");
    });
    (task, state_rx)
}

/// Spawns the stream-back loop.
///
/// Drains output batches and delivers each to the sink, forgetting request
/// ids whose final delta has arrived. On exit it keeps draining until the
/// generation loop drops its sender, so every batch produced before exit is
/// delivered in order.
pub(crate) fn spawn_stream_back_loop(
    sink: StreamSink,
    registry: RequestRegistry,
    mut batch_rx: mpsc::UnboundedReceiver<StreamBatch>,
    mut exit_rx: watch::Receiver<bool>,
) -> (JoinHandle<()>, watch::Receiver<LoopState>) {
    let (state_tx, state_rx) = watch::channel(LoopState::Running);
    let task = tokio::spawn(async move {
        let mut exiting = false;
        loop {
            let batch = if exiting {
                batch_rx.recv().await
            } else {
                tokio::select! {
                    batch = batch_rx.recv() => batch,
                    _ = exit_rx.changed() => {
                        let _ = state_tx.send(LoopState::ExitRequested);
                        exiting = true;
                        continue;
                    }
                }
            };
            match batch {
                Some(batch) => {
                    for output in &batch {
                        if output.is_finished() {
                            registry.forget(&output.request_id);
                        }
                    }
                    sink.deliver(batch);
                }
                None => break,
            }
        }
        let _ = state_tx.send(LoopState::Stopped);
        tracing::debug!("stream-back loop stopped");
    });
    (task, state_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::streaming::{FinishReason, StreamOutput};

    fn output(id: &str, finish: Option<FinishReason>) -> StreamOutput {
        StreamOutput {
            request_id: id.to_string(),
            group_delta_token_ids: vec![vec![1]],
            finish_reason: finish,
        }
    }

    #[tokio::test]
    async fn test_stream_back_forwards_and_forgets_finished() {
        let (sink, mut sink_rx) = StreamSink::channel();
        let registry = RequestRegistry::new();
        registry.track("req-1");
        registry.track("req-2");

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (_exit_tx, exit_rx) = watch::channel(false);
        let (task, state_rx) =
            spawn_stream_back_loop(sink, registry.clone(), batch_rx, exit_rx);
        assert_eq!(*state_rx.borrow(), LoopState::Running);

        batch_tx
            .send(vec![output("req-1", None), output("req-2", Some(FinishReason::Stop))])
            .unwrap();

        let batch = sink_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(registry.contains("req-1"));
        assert!(!registry.contains("req-2"));

        // Dropping the sender ends the loop without an exit signal.
        drop(batch_tx);
        task.await.unwrap();
        assert_eq!(*state_rx.borrow(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_stream_back_drains_after_exit_signal() {
        let (sink, mut sink_rx) = StreamSink::channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(false);
        let (task, _state_rx) =
            spawn_stream_back_loop(sink, RequestRegistry::new(), batch_rx, exit_rx);

        // Queue a batch, then signal exit before dropping the sender: the
        // queued batch must still be delivered.
        batch_tx.send(vec![output("req-1", None)]).unwrap();
        exit_tx.send(true).unwrap();
        drop(batch_tx);

        task.await.unwrap();
        let batch = sink_rx.recv().await.unwrap();
        assert_eq!(batch[0].request_id, "req-1");
    }
}
