//! Load and predict options for model backends
//!
//! Callers pass partial option sets (`LoadOptions`, `PredictOptions`) where every
//! field is optional. Backends resolve them against their own defaults into
//! fully-populated settings; any field the caller sets wins over the default.

use crate::device::DeviceKind;
use candle_core::DType;
use serde::{Deserialize, Serialize};

/// Dataset statistics used to de-normalize actions when none is given
pub const DEFAULT_UNNORM_KEY: &str = "bridge_orig";

/// Seed used when sampling is enabled without an explicit seed
pub const DEFAULT_SEED: u64 = 299_792_458;

/// Revision fetched from the Hugging Face Hub when none is given
pub const DEFAULT_REVISION: &str = "main";

/// Numeric format for model weights and activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[serde(alias = "float32")]
    F32,
    #[serde(alias = "float16")]
    F16,
    #[serde(alias = "bfloat16")]
    Bf16,
}

impl Precision {
    /// The Candle dtype for this precision
    pub fn dtype(self) -> DType {
        match self {
            Self::F32 => DType::F32,
            Self::F16 => DType::F16,
            Self::Bf16 => DType::BF16,
        }
    }
}

/// Attention kernel used by the language model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttnImplementation {
    /// Plain matmul/softmax attention, works on every device
    Eager,
    /// Fused flash-attention kernels (CUDA builds with the `flash-attn` feature)
    #[serde(rename = "flash_attention_2", alias = "flash")]
    FlashAttention2,
}

/// Caller-supplied load options; unset fields fall back to backend defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    /// Device override; auto-detected when unset
    pub device: Option<DeviceKind>,

    /// Weight/activation precision
    pub dtype: Option<Precision>,

    /// Attention kernel for the language model
    pub attn_implementation: Option<AttnImplementation>,

    /// Memory-map weights instead of reading them into memory
    pub low_cpu_mem_usage: Option<bool>,

    /// Accept repositories that declare custom modeling code
    pub trust_remote_code: Option<bool>,

    /// Hub revision (branch, tag or commit)
    pub revision: Option<String>,
}

impl LoadOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set device
    pub fn with_device(mut self, device: DeviceKind) -> Self {
        self.device = Some(device);
        self
    }

    /// Set precision
    pub fn with_dtype(mut self, dtype: Precision) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Set attention implementation
    pub fn with_attn_implementation(mut self, attn: AttnImplementation) -> Self {
        self.attn_implementation = Some(attn);
        self
    }

    /// Set memory-mapped loading
    pub fn with_low_cpu_mem_usage(mut self, enable: bool) -> Self {
        self.low_cpu_mem_usage = Some(enable);
        self
    }

    /// Set trust of custom modeling code
    pub fn with_trust_remote_code(mut self, trust: bool) -> Self {
        self.trust_remote_code = Some(trust);
        self
    }

    /// Set Hugging Face revision
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn overlay(self, other: LoadOptions) -> LoadOptions {
        LoadOptions {
            device: other.device.or(self.device),
            dtype: other.dtype.or(self.dtype),
            attn_implementation: other.attn_implementation.or(self.attn_implementation),
            low_cpu_mem_usage: other.low_cpu_mem_usage.or(self.low_cpu_mem_usage),
            trust_remote_code: other.trust_remote_code.or(self.trust_remote_code),
            revision: other.revision.or(self.revision),
        }
    }

    /// Resolve against `defaults`; every field set here replaces the default
    pub fn merge_over(&self, defaults: LoadSettings) -> LoadSettings {
        LoadSettings {
            trust_remote_code: self.trust_remote_code.unwrap_or(defaults.trust_remote_code),
            dtype: self.dtype.unwrap_or(defaults.dtype),
            low_cpu_mem_usage: self.low_cpu_mem_usage.unwrap_or(defaults.low_cpu_mem_usage),
            attn_implementation: self
                .attn_implementation
                .unwrap_or(defaults.attn_implementation),
            revision: self.revision.clone().unwrap_or(defaults.revision),
        }
    }
}

/// Fully resolved settings handed to a runtime
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    pub trust_remote_code: bool,
    pub dtype: Precision,
    pub low_cpu_mem_usage: bool,
    pub attn_implementation: AttnImplementation,
    pub revision: String,
}

impl LoadSettings {
    /// OpenVLA defaults for the given device
    pub fn defaults_for(device: DeviceKind) -> Self {
        Self {
            trust_remote_code: true,
            dtype: device.default_precision(),
            low_cpu_mem_usage: true,
            attn_implementation: AttnImplementation::Eager,
            revision: DEFAULT_REVISION.to_string(),
        }
    }
}

/// Caller-supplied prediction options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictOptions {
    /// Dataset statistics key for action de-normalization
    pub unnorm_key: Option<String>,

    /// Sample action tokens instead of greedy decoding
    pub do_sample: Option<bool>,

    /// Seed for sampling
    pub seed: Option<u64>,
}

impl PredictOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set de-normalization key
    pub fn with_unnorm_key(mut self, key: impl Into<String>) -> Self {
        self.unnorm_key = Some(key.into());
        self
    }

    /// Enable or disable sampling
    pub fn with_do_sample(mut self, do_sample: bool) -> Self {
        self.do_sample = Some(do_sample);
        self
    }

    /// Set sampling seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn overlay(self, other: PredictOptions) -> PredictOptions {
        PredictOptions {
            unnorm_key: other.unnorm_key.or(self.unnorm_key),
            do_sample: other.do_sample.or(self.do_sample),
            seed: other.seed.or(self.seed),
        }
    }

    /// Resolve against the defaults
    pub fn resolve(&self) -> PredictSettings {
        PredictSettings {
            unnorm_key: self
                .unnorm_key
                .clone()
                .unwrap_or_else(|| DEFAULT_UNNORM_KEY.to_string()),
            do_sample: self.do_sample.unwrap_or(false),
            seed: self.seed.unwrap_or(DEFAULT_SEED),
        }
    }
}

/// Fully resolved prediction settings
#[derive(Debug, Clone, PartialEq)]
pub struct PredictSettings {
    pub unnorm_key: String,
    pub do_sample: bool,
    pub seed: u64,
}

impl PredictSettings {
    /// Token selection strategy for action decoding
    pub fn sampling(&self) -> Sampling {
        if self.do_sample {
            Sampling::Random { seed: self.seed }
        } else {
            Sampling::Greedy
        }
    }
}

/// How action tokens are picked from the logits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// Arg-max decoding; deterministic
    Greedy,
    /// Top-k sampling seeded for reproducibility
    Random { seed: u64 },
}
