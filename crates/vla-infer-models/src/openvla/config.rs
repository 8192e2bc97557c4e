//! OpenVLA checkpoint configuration (`config.json`)

use crate::openvla::action::NormStats;
use candle_transformers::models::llama::{Config as LlamaConfig, LlamaConfig as LlamaConfigFile};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use vla_infer_core::{Error, Result};

/// Parsed `config.json` of an OpenVLA checkpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OpenVlaConfig {
    /// timm identifiers of the vision featurizers
    #[serde(default = "default_timm_model_ids")]
    pub timm_model_ids: Vec<String>,

    /// Whether both featurizers are used and concatenated
    #[serde(default = "default_true")]
    pub use_fused_vision_backbone: bool,

    /// Input resolution per featurizer
    #[serde(default = "default_image_sizes")]
    pub image_sizes: Vec<u32>,

    /// How images are fit to the input resolution
    #[serde(default = "default_resize_strategy")]
    pub image_resize_strategy: String,

    /// Number of action discretization bins
    #[serde(default = "default_n_action_bins")]
    pub n_action_bins: usize,

    /// Vocabulary padding added on top of the base tokenizer
    #[serde(default = "default_pad_to_multiple_of")]
    pub pad_to_multiple_of: usize,

    /// Language model overrides
    #[serde(default)]
    pub text_config: Value,

    /// Per-dataset action statistics
    #[serde(default)]
    pub norm_stats: NormStats,

    /// Custom code mapping; present when the repository ships modeling code
    #[serde(default)]
    pub auto_map: Option<Value>,
}

fn default_timm_model_ids() -> Vec<String> {
    vec![
        "vit_large_patch14_reg4_dinov2.lvd142m".to_string(),
        "vit_so400m_patch14_siglip_224".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_image_sizes() -> Vec<u32> {
    vec![224, 224]
}

fn default_resize_strategy() -> String {
    "resize-naive".to_string()
}

fn default_n_action_bins() -> usize {
    256
}

fn default_pad_to_multiple_of() -> usize {
    64
}

/// Llama-2-7B hyper-parameters with OpenVLA's padded vocabulary
fn llama2_7b_defaults() -> Value {
    json!({
        "hidden_size": 4096,
        "intermediate_size": 11008,
        "vocab_size": 32064,
        "num_hidden_layers": 32,
        "num_attention_heads": 32,
        "num_key_value_heads": 32,
        "rms_norm_eps": 1e-6,
        "rope_theta": 10000.0,
        "bos_token_id": 1,
        "eos_token_id": 2,
        "max_position_embeddings": 2048,
        "tie_word_embeddings": false
    })
}

impl OpenVlaConfig {
    /// Load from a `config.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Parse from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;

        if config.timm_model_ids.is_empty() {
            return Err(Error::config("config.json lists no vision featurizers"));
        }
        if config.image_resize_strategy != "resize-naive" {
            tracing::warn!(
                "Image resize strategy '{}' is not supported, using naive resize",
                config.image_resize_strategy
            );
        }

        Ok(config)
    }

    /// Whether the checkpoint declares custom modeling code
    pub fn requires_remote_code(&self) -> bool {
        self.auto_map.is_some()
    }

    /// Language model config: Llama-2-7B defaults overlaid with `text_config`
    fn text_config_value(&self) -> Value {
        let mut merged = llama2_7b_defaults();
        if let (Value::Object(base), Value::Object(overrides)) = (&mut merged, &self.text_config) {
            for (key, value) in overrides {
                if !value.is_null() {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// Candle Llama config for the language model
    pub fn llama_config(&self, use_flash_attn: bool) -> Result<LlamaConfig> {
        let file: LlamaConfigFile = serde_json::from_value(self.text_config_value())?;
        Ok(file.into_config(use_flash_attn))
    }

    /// Size of the padded language model vocabulary
    pub fn padded_vocab_size(&self) -> Result<usize> {
        self.text_config_value()
            .get("vocab_size")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| Error::config("text_config.vocab_size is not an integer"))
    }

    /// Size of the base vocabulary that action bins count down from
    pub fn action_vocab_size(&self) -> Result<usize> {
        let padded = self.padded_vocab_size()?;
        padded
            .checked_sub(self.pad_to_multiple_of)
            .ok_or_else(|| Error::config("pad_to_multiple_of exceeds the vocabulary size"))
    }

    /// Featurizers used by this checkpoint, in input-channel order
    pub fn featurizer_ids(&self) -> &[String] {
        if self.use_fused_vision_backbone {
            &self.timm_model_ids
        } else {
            &self.timm_model_ids[..1]
        }
    }

    /// Input resolution (square) shared by all featurizers
    pub fn image_size(&self) -> Result<u32> {
        let first = self.image_sizes.first().copied().unwrap_or(224);
        if self.image_sizes.iter().any(|&size| size != first) {
            return Err(Error::config(format!(
                "featurizers with different input sizes are not supported: {:?}",
                self.image_sizes
            )));
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENVLA_7B: &str = r#"{
        "arch_specifier": "no-align+fused-gelu-mlp",
        "auto_map": {"AutoModelForVision2Seq": "modeling_prismatic.OpenVLAForActionPrediction"},
        "image_resize_strategy": "resize-naive",
        "image_sizes": [224, 224],
        "n_action_bins": 256,
        "norm_stats": {
            "bridge_orig": {
                "action": {
                    "mask": [true, true, true, true, true, true, false],
                    "q01": [-0.03, -0.04, -0.03, -0.1, -0.1, -0.2, 0.0],
                    "q99": [0.03, 0.04, 0.04, 0.1, 0.1, 0.2, 1.0],
                    "mean": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5]
                },
                "num_transitions": 2135463
            }
        },
        "pad_to_multiple_of": 64,
        "text_config": {"model_type": "llama", "pad_token_id": 32000, "torch_dtype": "bfloat16", "vocab_size": 32064},
        "timm_model_ids": ["vit_large_patch14_reg4_dinov2.lvd142m", "vit_so400m_patch14_siglip_224"],
        "use_fused_vision_backbone": true
    }"#;

    #[test]
    fn test_parse_openvla_7b() {
        let config = OpenVlaConfig::from_json(OPENVLA_7B).unwrap();

        assert!(config.requires_remote_code());
        assert_eq!(config.featurizer_ids().len(), 2);
        assert_eq!(config.image_size().unwrap(), 224);
        assert_eq!(config.padded_vocab_size().unwrap(), 32064);
        assert_eq!(config.action_vocab_size().unwrap(), 32000);

        let stats = &config.norm_stats["bridge_orig"].action;
        assert_eq!(stats.dim(), 7);
        assert!(!stats.mask.as_ref().unwrap()[6]);
    }

    #[test]
    fn test_llama_config_defaults() {
        let config = OpenVlaConfig::from_json(OPENVLA_7B).unwrap();
        let llama = config.llama_config(false).unwrap();

        assert_eq!(llama.hidden_size, 4096);
        assert_eq!(llama.num_hidden_layers, 32);
        assert_eq!(llama.vocab_size, 32064);
        assert!(!llama.use_flash_attn);
    }

    #[test]
    fn test_text_config_overrides_defaults() {
        let config = OpenVlaConfig::from_json(
            r#"{"text_config": {"hidden_size": 2048, "num_hidden_layers": 2, "vocab_size": 128}, "pad_to_multiple_of": 64}"#,
        )
        .unwrap();

        let llama = config.llama_config(false).unwrap();
        assert_eq!(llama.hidden_size, 2048);
        assert_eq!(llama.num_hidden_layers, 2);
        assert_eq!(llama.intermediate_size, 11008);
        assert_eq!(config.action_vocab_size().unwrap(), 64);
    }

    #[test]
    fn test_single_backbone_uses_first_featurizer() {
        let config = OpenVlaConfig::from_json(
            r#"{"use_fused_vision_backbone": false, "timm_model_ids": ["vit_so400m_patch14_siglip_224"], "image_sizes": [224]}"#,
        )
        .unwrap();

        assert_eq!(config.featurizer_ids(), ["vit_so400m_patch14_siglip_224".to_string()]);
        assert!(!config.requires_remote_code());
    }

    #[test]
    fn test_rejects_mixed_image_sizes() {
        let config = OpenVlaConfig::from_json(r#"{"image_sizes": [224, 384]}"#).unwrap();
        assert!(config.image_size().is_err());
    }
}
