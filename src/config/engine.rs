//! Engine configuration
//!
//! The structured payload handed to `reload`, plus the compute device
//! selector. Absent or null optional keys take engine-defined defaults.

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;

/// Compute backend kind for the device selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
    Vulkan,
}

/// Opaque (backend kind, device index) pair identifying the compute device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub kind: DeviceKind,
    pub index: i32,
}

impl Device {
    /// CPU device 0, the simulation target
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            index: 0,
        }
    }
}

/// Engine deployment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Local,
    Interactive,
    Server,
}

/// Speculative decoding mode (engine-internal technique, opaque here)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeculativeMode {
    Disable,
    SmallDraft,
    Eagle,
    Medusa,
}

/// Prefix cache strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixCacheMode {
    Disable,
    Radix,
}

/// Prefill scheduling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefillMode {
    Chunked,
    Hybrid,
}

/// Engine configuration payload
///
/// Owned by the caller and consumed by the engine handle on `reload`.
/// `None` means "engine-defined default" and serializes to `null`, matching
/// the wire payload the external engine expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the compiled model weights directory
    pub model: String,
    /// Path to the loadable compiled model library artifact
    #[serde(default)]
    pub model_lib: Option<String>,
    /// Additional (e.g. draft) model paths
    #[serde(default)]
    pub additional_models: Vec<String>,
    #[serde(default = "default_mode")]
    pub mode: EngineMode,
    #[serde(default)]
    pub tensor_parallel_shards: Option<u32>,
    #[serde(default)]
    pub pipeline_parallel_stages: Option<u32>,
    /// Fraction of device memory the engine may claim (0.0 - 1.0)
    #[serde(default)]
    pub gpu_memory_utilization: Option<f32>,
    #[serde(default)]
    pub kv_cache_page_size: Option<u32>,
    #[serde(default)]
    pub max_num_sequence: Option<u32>,
    #[serde(default)]
    pub max_total_sequence_length: Option<u64>,
    #[serde(default)]
    pub prefill_chunk_size: Option<u32>,
    #[serde(default)]
    pub sliding_window_size: Option<u32>,
    #[serde(default = "default_speculative_mode")]
    pub speculative_mode: SpeculativeMode,
    #[serde(default)]
    pub spec_draft_length: Option<u32>,
    #[serde(default)]
    pub spec_tree_width: Option<u32>,
    #[serde(default)]
    pub prefix_cache_mode: Option<PrefixCacheMode>,
    #[serde(default)]
    pub prefill_mode: Option<PrefillMode>,
    #[serde(default)]
    pub verbose: bool,
}

fn default_mode() -> EngineMode {
    EngineMode::Local
}

fn default_speculative_mode() -> SpeculativeMode {
    SpeculativeMode::Disable
}

impl EngineConfig {
    /// Creates a local-mode configuration for the given model path, with the
    /// remaining keys left to engine defaults.
    pub fn local(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            model_lib: None,
            additional_models: Vec::new(),
            mode: EngineMode::Local,
            tensor_parallel_shards: None,
            pipeline_parallel_stages: None,
            gpu_memory_utilization: None,
            kv_cache_page_size: Some(16),
            max_num_sequence: None,
            max_total_sequence_length: None,
            prefill_chunk_size: None,
            sliding_window_size: None,
            speculative_mode: SpeculativeMode::Disable,
            spec_draft_length: Some(0),
            spec_tree_width: Some(1),
            prefix_cache_mode: Some(PrefixCacheMode::Radix),
            prefill_mode: Some(PrefillMode::Hybrid),
            verbose: false,
        }
    }

    /// Parses an engine configuration from its JSON payload.
    ///
    /// Fails with `ConfigError` on malformed JSON or a missing `model` key;
    /// unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("malformed engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, failing fast with a descriptive error
    /// rather than silently defaulting.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.model.trim().is_empty() {
            return Err(EngineError::Config(
                "`model` must be a non-empty path".to_string(),
            ));
        }
        if let Some(u) = self.gpu_memory_utilization {
            if !(0.0..=1.0).contains(&u) {
                return Err(EngineError::Config(format!(
                    "`gpu_memory_utilization` must be within 0.0 - 1.0, got {u}"
                )));
            }
        }
        if self.tensor_parallel_shards == Some(0) {
            return Err(EngineError::Config(
                "`tensor_parallel_shards` must be at least 1".to_string(),
            ));
        }
        if self.pipeline_parallel_stages == Some(0) {
            return Err(EngineError::Config(
                "`pipeline_parallel_stages` must be at least 1".to_string(),
            ));
        }
        if self.kv_cache_page_size == Some(0) {
            return Err(EngineError::Config(
                "`kv_cache_page_size` must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The payload the original example program sends, nulls and all.
    const LOCAL_CONFIG_JSON: &str = r#"{
        "model": "sim-chat-v0.1",
        "model_lib": "sim-chat-v0.1/model.dylib",
        "additional_models": [],
        "mode": "local",
        "tensor_parallel_shards": null,
        "pipeline_parallel_stages": null,
        "gpu_memory_utilization": null,
        "kv_cache_page_size": 16,
        "max_num_sequence": null,
        "max_total_sequence_length": null,
        "prefill_chunk_size": null,
        "sliding_window_size": null,
        "speculative_mode": "disable",
        "spec_draft_length": 0,
        "spec_tree_width": 1,
        "prefix_cache_mode": "radix",
        "prefill_mode": "hybrid",
        "verbose": true
    }"#;

    #[test]
    fn test_parse_local_config() {
        let config = EngineConfig::from_json(LOCAL_CONFIG_JSON).unwrap();
        assert_eq!(config.model, "sim-chat-v0.1");
        assert_eq!(config.mode, EngineMode::Local);
        assert_eq!(config.kv_cache_page_size, Some(16));
        assert_eq!(config.tensor_parallel_shards, None);
        assert_eq!(config.speculative_mode, SpeculativeMode::Disable);
        assert_eq!(config.prefix_cache_mode, Some(PrefixCacheMode::Radix));
        assert_eq!(config.prefill_mode, Some(PrefillMode::Hybrid));
        assert!(config.verbose);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config =
            EngineConfig::from_json(r#"{"model": "m", "opt": null, "attention_sink_size": 4}"#)
                .unwrap();
        assert_eq!(config.model, "m");
    }

    #[test]
    fn test_missing_model_is_config_error() {
        let err = EngineConfig::from_json(r#"{"mode": "local"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_empty_model_rejected() {
        let err = EngineConfig::from_json(r#"{"model": "  "}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_gpu_memory_utilization_range() {
        let mut config = EngineConfig::local("m");
        config.gpu_memory_utilization = Some(1.5);
        assert!(matches!(
            config.validate(),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let mut config = EngineConfig::local("m");
        config.tensor_parallel_shards = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_cpu() {
        let device = Device::cpu();
        assert_eq!(device.kind, DeviceKind::Cpu);
        assert_eq!(device.index, 0);
    }
}
