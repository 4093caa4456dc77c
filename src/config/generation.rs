//! Per-request generation configuration
//!
//! Sampling parameters parsed from a structured payload and validated at
//! request-creation time. Invalid configuration fails fast with a descriptive
//! error instead of silently defaulting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;

/// Generation parameters for a single request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of parallel candidate sequences to generate
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub logprobs: bool,
    #[serde(default)]
    pub top_logprobs: u32,
    #[serde(default)]
    pub logit_bias: Option<HashMap<String, f32>>,
    /// Maximum tokens to generate; engine default when absent
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub stop_strs: Vec<String>,
    /// Token ids that terminate generation when emitted
    #[serde(default)]
    pub stop_token_ids: Vec<i32>,
    #[serde(default)]
    pub response_format: Option<serde_json::Value>,
    #[serde(default)]
    pub debug_config: Option<serde_json::Value>,
}

fn default_n() -> u32 {
    1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            n: 1,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            repetition_penalty: None,
            logprobs: false,
            top_logprobs: 0,
            logit_bias: None,
            max_tokens: None,
            seed: None,
            stop_strs: Vec::new(),
            stop_token_ids: Vec::new(),
            response_format: None,
            debug_config: None,
        }
    }
}

impl GenerationConfig {
    /// Parses a generation configuration from its JSON payload
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: GenerationConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("malformed generation config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates sampling parameters, failing fast on the first violation
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.n == 0 {
            return Err(EngineError::Config("`n` must be at least 1".to_string()));
        }
        if let Some(t) = self.temperature {
            if t < 0.0 {
                return Err(EngineError::Config(format!(
                    "`temperature` must be non-negative, got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(EngineError::Config(format!(
                    "`top_p` must be within (0.0, 1.0], got {p}"
                )));
            }
        }
        for (name, value) in [
            ("frequency_penalty", self.frequency_penalty),
            ("presence_penalty", self.presence_penalty),
        ] {
            if let Some(v) = value {
                if !(-2.0..=2.0).contains(&v) {
                    return Err(EngineError::Config(format!(
                        "`{name}` must be within -2.0 - 2.0, got {v}"
                    )));
                }
            }
        }
        if let Some(r) = self.repetition_penalty {
            if r <= 0.0 {
                return Err(EngineError::Config(format!(
                    "`repetition_penalty` must be positive, got {r}"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(EngineError::Config(
                "`max_tokens` must be at least 1".to_string(),
            ));
        }
        if self.top_logprobs > 20 {
            return Err(EngineError::Config(format!(
                "`top_logprobs` must be at most 20, got {}",
                self.top_logprobs
            )));
        }
        if self.top_logprobs > 0 && !self.logprobs {
            return Err(EngineError::Config(
                "`top_logprobs` requires `logprobs` to be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The payload the original example program sends.
    const GENERATION_JSON: &str = r#"{
        "n": 1,
        "temperature": null,
        "top_p": null,
        "frequency_penalty": null,
        "presence_penalty": null,
        "repetition_penalty": null,
        "logprobs": false,
        "top_logprobs": 0,
        "logit_bias": null,
        "max_tokens": 20,
        "seed": 100,
        "stop_strs": [],
        "stop_token_ids": [2],
        "response_format": null,
        "debug_config": null
    }"#;

    #[test]
    fn test_parse_generation_config() {
        let config = GenerationConfig::from_json(GENERATION_JSON).unwrap();
        assert_eq!(config.n, 1);
        assert_eq!(config.max_tokens, Some(20));
        assert_eq!(config.seed, Some(100));
        assert_eq!(config.stop_token_ids, vec![2]);
        assert_eq!(config.temperature, None);
    }

    #[test]
    fn test_default_is_valid() {
        assert!(GenerationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_n_rejected() {
        let err = GenerationConfig::from_json(r#"{"n": 0}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_negative_temperature_rejected() {
        let mut config = GenerationConfig::default();
        config.temperature = Some(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_top_p_out_of_range_rejected() {
        let mut config = GenerationConfig::default();
        config.top_p = Some(1.5);
        assert!(config.validate().is_err());
        config.top_p = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_penalty_ranges() {
        let mut config = GenerationConfig::default();
        config.frequency_penalty = Some(3.0);
        assert!(config.validate().is_err());

        let mut config = GenerationConfig::default();
        config.presence_penalty = Some(-2.5);
        assert!(config.validate().is_err());

        let mut config = GenerationConfig::default();
        config.repetition_penalty = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let mut config = GenerationConfig::default();
        config.max_tokens = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_top_logprobs_requires_logprobs() {
        let mut config = GenerationConfig::default();
        config.top_logprobs = 5;
        assert!(config.validate().is_err());
        config.logprobs = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(GenerationConfig::from_json("{not json").is_err());
    }
}
