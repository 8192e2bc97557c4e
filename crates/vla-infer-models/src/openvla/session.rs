//! Candle implementation of the OpenVLA runtime

use crate::device::DeviceKind;
use crate::openvla::action::{action_statistics, ActionTokenizer, NormStats};
use crate::openvla::config::OpenVlaConfig;
use crate::openvla::hub::{resolve_checkpoint, CheckpointFiles};
use crate::openvla::prismatic::PrismaticModel;
use crate::openvla::processor::PrismaticProcessor;
use crate::openvla::runtime::{VlaRuntime, VlaSession};
use crate::options::{AttnImplementation, LoadSettings, Sampling};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling as TokenSampling};
use tracing::{debug, info};
use vla_infer_core::{Error, Result, RgbImage, ACTION_DIM};

const TOP_K: usize = 50;

/// Runs OpenVLA checkpoints with Candle
#[derive(Debug, Clone, Default)]
pub struct CandleRuntime;

impl CandleRuntime {
    pub fn new() -> Self {
        Self
    }

    fn load_weights<'a>(
        files: &CheckpointFiles,
        settings: &LoadSettings,
        dtype: DType,
        device: &'a Device,
    ) -> Result<VarBuilder<'a>> {
        if settings.low_cpu_mem_usage {
            debug!("Memory-mapping {} weight files", files.weights.len());
            // SAFETY: checkpoint files are not modified while the session is alive.
            unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, device) }
                .map_err(|e| Error::load(format!("Failed to map weights: {}", e)))
        } else {
            debug!("Reading {} weight files into memory", files.weights.len());
            let buffers = files
                .weights
                .iter()
                .map(std::fs::read)
                .collect::<std::io::Result<Vec<_>>>()?;
            VarBuilder::from_buffered_safetensors(buffers, dtype, device)
                .map_err(|e| Error::load(format!("Failed to read weights: {}", e)))
        }
    }
}

impl VlaRuntime for CandleRuntime {
    type Session = OpenVlaSession;

    fn load(&self, model_id: &str, device: DeviceKind, settings: &LoadSettings) -> Result<OpenVlaSession> {
        let use_flash_attn = settings.attn_implementation == AttnImplementation::FlashAttention2;
        if use_flash_attn && !cfg!(feature = "flash-attn") {
            return Err(Error::load(
                "flash_attention_2 requested but vla-infer was built without the `flash-attn` feature",
            ));
        }

        let files = resolve_checkpoint(model_id, &settings.revision)?;
        let config = OpenVlaConfig::from_file(&files.config)?;

        if config.requires_remote_code() && !settings.trust_remote_code {
            return Err(Error::load(format!(
                "{} declares custom model code; loading requires trust_remote_code",
                model_id
            )));
        }

        let processor = PrismaticProcessor::from_config(&config, &files.tokenizer)?;
        let action_tokenizer =
            ActionTokenizer::new(config.n_action_bins, config.action_vocab_size()?);

        let candle_device = device.create()?;
        let dtype = settings.dtype.dtype();
        info!("Loading weights as {:?}", dtype);

        let vb = Self::load_weights(&files, settings, dtype, &candle_device)?;
        let model = PrismaticModel::load(&config, vb, use_flash_attn)
            .map_err(|e| Error::load(format!("Failed to build model: {}", e)))?;

        Ok(OpenVlaSession {
            model,
            processor,
            action_tokenizer,
            norm_stats: config.norm_stats,
            device: candle_device,
            dtype,
        })
    }
}

/// Tokenized prompt and preprocessed pixels
pub struct OpenVlaInputs {
    pub input_ids: Tensor,
    pub pixel_values: Tensor,
}

/// A loaded OpenVLA checkpoint
pub struct OpenVlaSession {
    model: PrismaticModel,
    processor: PrismaticProcessor,
    action_tokenizer: ActionTokenizer,
    norm_stats: NormStats,
    device: Device,
    dtype: DType,
}

impl VlaSession for OpenVlaSession {
    type Inputs = OpenVlaInputs;

    fn encode(&self, prompt: &str, image: &RgbImage) -> Result<OpenVlaInputs> {
        let ids = self.processor.encode_prompt(prompt)?;
        debug!("Prompt encoded to {} tokens", ids.len());

        let input_ids = Tensor::new(ids.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| Error::inference(format!("Failed to build input ids: {}", e)))?;
        let pixel_values = self.processor.pixel_values(image, &self.device, self.dtype)?;

        Ok(OpenVlaInputs {
            input_ids,
            pixel_values,
        })
    }

    fn predict_action(&self, inputs: OpenVlaInputs, unnorm_key: &str, sampling: Sampling) -> Result<Vec<f32>> {
        let stats = action_statistics(&self.norm_stats, unnorm_key)?;
        let action_dim = if stats.dim() == 0 { ACTION_DIM } else { stats.dim() };

        let mut logits_processor = match sampling {
            Sampling::Greedy => LogitsProcessor::from_sampling(0, TokenSampling::ArgMax),
            Sampling::Random { seed } => LogitsProcessor::from_sampling(
                seed,
                TokenSampling::TopK {
                    k: TOP_K,
                    temperature: 1.0,
                },
            ),
        };

        let tokens = self
            .model
            .generate(
                &inputs.input_ids,
                &inputs.pixel_values,
                action_dim,
                &mut logits_processor,
                self.dtype,
                &self.device,
            )
            .map_err(|e| Error::inference(format!("Generation failed: {}", e)))?;
        debug!("Generated action tokens: {:?}", tokens);

        let normalized = self.action_tokenizer.decode(&tokens);
        Ok(stats.unnormalize(&normalized))
    }
}
