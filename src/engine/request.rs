//! Requests and the outstanding-request registry

use std::sync::Arc;

use dashmap::DashSet;

use crate::config::GenerationConfig;
use crate::engine::error::EngineError;

/// A unit of work submitted for completion
///
/// Ownership moves into the engine handle on submission; the engine destroys
/// the request once it completes or is aborted.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: String,
    /// Ordered input token ids, never empty
    pub input_tokens: Vec<i32>,
    pub config: GenerationConfig,
}

impl Request {
    /// Builds a request, validating the id and input sequence.
    ///
    /// An empty input sequence or blank id is rejected here so it never
    /// reaches the engine handle.
    pub fn new(
        id: impl Into<String>,
        input_tokens: Vec<i32>,
        config: GenerationConfig,
    ) -> Result<Self, EngineError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "request id must be non-empty".to_string(),
            ));
        }
        if input_tokens.is_empty() {
            return Err(EngineError::InvalidRequest(format!(
                "request `{id}` has an empty input token sequence"
            )));
        }
        config.validate()?;
        Ok(Self {
            id,
            input_tokens,
            config,
        })
    }
}

/// Set of currently-outstanding request ids
///
/// Tracked on submission and forgotten on completion, so shutdown can abort
/// everything still in flight. Not authoritative request state; the engine
/// owns that. Clones share the same underlying set.
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    ids: Arc<DashSet<String>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks an id; returns false if it was already tracked
    pub fn track(&self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    /// Forgets an id; returns false if it was not tracked
    pub fn forget(&self, id: &str) -> bool {
        self.ids.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Removes and returns every tracked id, for abort-all at shutdown
    pub fn drain(&self) -> Vec<String> {
        let ids: Vec<String> = self.ids.iter().map(|entry| entry.key().clone()).collect();
        self.ids.clear();
        ids
    }
}
