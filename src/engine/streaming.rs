//! Streamed engine output
//!
//! Incremental token batches flowing from the generation loop to the caller.
//! The original callback-function delivery is modeled as a typed channel: the
//! stream-back loop pushes batches into the sink, the caller drains the
//! receiving end at its own pace.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Why a request stopped producing output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// A configured stop token id was emitted
    Stop,
    /// The `max_tokens` budget was exhausted
    Length,
    /// The request was aborted before completing
    Abort,
}

/// A per-request delta produced by one decode step
///
/// One inner group per candidate sequence (`n` > 1 yields several groups),
/// each an ordered run of newly generated token ids.
#[derive(Debug, Clone)]
pub struct StreamOutput {
    pub request_id: String,
    pub group_delta_token_ids: Vec<Vec<i32>>,
    /// Set on the final delta for the request
    pub finish_reason: Option<FinishReason>,
}

impl StreamOutput {
    /// Returns true if this is the request's final delta
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// First token of the first candidate group, if any
    pub fn first_token(&self) -> Option<i32> {
        self.group_delta_token_ids
            .first()
            .and_then(|group| group.first())
            .copied()
    }
}

/// One generation step's worth of per-request outputs
pub type StreamBatch = Vec<StreamOutput>;

/// Completion callback sink
///
/// Registered once at engine initialization and invoked by the stream-back
/// loop once per available batch. Delivery happens on the loop's task, so
/// consumers must treat it as concurrent with their own submissions.
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: UnboundedSender<StreamBatch>,
}

impl StreamSink {
    /// Creates a sink and the receiver the caller drains for results
    pub fn channel() -> (Self, UnboundedReceiver<StreamBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forwards one batch to the consumer.
    ///
    /// An empty batch is a no-output heartbeat and is skipped. A dropped
    /// receiver discards the batch; the engine keeps running regardless.
    pub fn deliver(&self, batch: StreamBatch) {
        if batch.is_empty() {
            tracing::trace!("empty stream batch, skipping delivery");
            return;
        }
        if self.tx.send(batch).is_err() {
            tracing::debug!("stream receiver dropped, discarding output batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(id: &str, tokens: Vec<i32>) -> StreamOutput {
        StreamOutput {
            request_id: id.to_string(),
            group_delta_token_ids: vec![tokens],
            finish_reason: None,
        }
    }

    #[test]
    fn test_first_token() {
        let out = output("req-1", vec![42, 7]);
        assert_eq!(out.first_token(), Some(42));

        let empty = StreamOutput {
            request_id: "req-1".to_string(),
            group_delta_token_ids: Vec::new(),
            finish_reason: Some(FinishReason::Abort),
        };
        assert_eq!(empty.first_token(), None);
        assert!(empty.is_finished());
    }

    #[tokio::test]
    async fn test_sink_delivers_batches() {
        let (sink, mut rx) = StreamSink::channel();
        sink.deliver(vec![output("req-1", vec![1]), output("req-2", vec![2])]);

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].request_id, "req-1");
        assert_eq!(batch[1].first_token(), Some(2));
    }

    #[tokio::test]
    async fn test_sink_skips_empty_heartbeat() {
        let (sink, mut rx) = StreamSink::channel();
        sink.deliver(Vec::new());
        sink.deliver(vec![output("req-1", vec![5])]);

        // Only the non-empty batch arrives.
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sink_tolerates_dropped_receiver() {
        let (sink, rx) = StreamSink::channel();
        drop(rx);
        // Should not panic.
        sink.deliver(vec![output("req-1", vec![9])]);
    }
}
