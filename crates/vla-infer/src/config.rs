//! Driver configuration
//!
//! Values come from an optional YAML file; command-line flags override them.
//!
//! ```yaml
//! model_type: openvla
//! model_id: openvla/openvla-7b
//! load:
//!   device: cuda
//!   dtype: bf16
//!   attn_implementation: flash_attention_2
//! predict:
//!   unnorm_key: fractal20220817_data
//! ```

use crate::cli::RunArgs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vla_infer_core::{Error, Result};
use vla_infer_models::{LoadOptions, PredictOptions, DEFAULT_MODEL_ID, OPENVLA};

/// Settings for one `run` invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Backend name
    pub model_type: Option<String>,

    /// Checkpoint identifier
    pub model_id: Option<String>,

    /// Options passed to `load`
    pub load: LoadOptions,

    /// Options passed to `predict`
    pub predict: PredictOptions,
}

impl AppConfig {
    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Apply command-line flags on top of the file values
    pub fn with_overrides(self, args: &RunArgs) -> Self {
        let load = LoadOptions {
            device: args.device,
            ..LoadOptions::default()
        };
        let predict = PredictOptions {
            unnorm_key: args.unnorm_key.clone(),
            do_sample: args.do_sample.then_some(true),
            seed: args.seed,
        };

        Self {
            model_type: args.model_type.clone().or(self.model_type),
            model_id: args.model_id.clone().or(self.model_id),
            load: self.load.overlay(load),
            predict: self.predict.overlay(predict),
        }
    }

    /// Backend name, `openvla` unless configured
    pub fn model_type(&self) -> &str {
        self.model_type.as_deref().unwrap_or(OPENVLA)
    }

    /// Checkpoint identifier, `openvla/openvla-7b` unless configured
    pub fn model_id(&self) -> &str {
        self.model_id.as_deref().unwrap_or(DEFAULT_MODEL_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vla_infer_models::{DeviceKind, Precision};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.model_type(), "openvla");
        assert_eq!(config.model_id(), "openvla/openvla-7b");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_yaml() {
        let config = AppConfig::from_yaml(
            r#"
model_id: local/openvla
load:
  device: cpu
  dtype: bf16
predict:
  unnorm_key: fractal20220817_data
  seed: 3
"#,
        )
        .unwrap();

        assert_eq!(config.model_id(), "local/openvla");
        assert_eq!(config.load.device, Some(DeviceKind::Cpu));
        assert_eq!(config.load.dtype, Some(Precision::Bf16));
        assert_eq!(config.predict.unnorm_key.as_deref(), Some("fractal20220817_data"));
        assert_eq!(config.predict.seed, Some(3));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = AppConfig::from_yaml("model: openvla\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_flags_override_file() {
        let file = AppConfig::from_yaml(
            "model_id: from-file\nload:\n  device: cuda\n  dtype: f16\npredict:\n  unnorm_key: kuka\n",
        )
        .unwrap();
        let args = RunArgs {
            instruction: "stack the cups".to_string(),
            model_id: Some("from-flag".to_string()),
            device: Some(DeviceKind::Cpu),
            do_sample: true,
            ..RunArgs::default()
        };

        let config = file.with_overrides(&args);
        assert_eq!(config.model_id(), "from-flag");
        assert_eq!(config.load.device, Some(DeviceKind::Cpu));
        assert_eq!(config.load.dtype, Some(Precision::F16));
        assert_eq!(config.predict.unnorm_key.as_deref(), Some("kuka"));
        assert_eq!(config.predict.do_sample, Some(true));
    }
}
