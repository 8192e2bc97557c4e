//! Prismatic vision-language model: vision backbone, projector, Llama decoder

use crate::openvla::config::OpenVlaConfig;
use crate::openvla::vision::{VisionBackbone, VitSpec};
use candle_core::{DType, Device, IndexOp, Module, Result, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{Cache, Config as LlamaConfig, Llama};

/// MLP mapping patch features into the language model's embedding space
pub enum Projector {
    /// `fc1 -> gelu -> fc2 -> gelu -> fc3`, used with the fused backbone
    Fused { fc1: Linear, fc2: Linear, fc3: Linear },
    /// `fc1 -> gelu -> fc2`
    Single { fc1: Linear, fc2: Linear },
}

impl Projector {
    pub fn new(vb: VarBuilder, vision_dim: usize, llm_dim: usize, fused: bool) -> Result<Self> {
        if fused {
            let hidden = 4 * vision_dim;
            Ok(Self::Fused {
                fc1: linear(vision_dim, hidden, vb.pp("fc1"))?,
                fc2: linear(hidden, llm_dim, vb.pp("fc2"))?,
                fc3: linear(llm_dim, llm_dim, vb.pp("fc3"))?,
            })
        } else {
            Ok(Self::Single {
                fc1: linear(vision_dim, llm_dim, vb.pp("fc1"))?,
                fc2: linear(llm_dim, llm_dim, vb.pp("fc2"))?,
            })
        }
    }
}

impl Module for Projector {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Fused { fc1, fc2, fc3 } => {
                let xs = fc1.forward(xs)?.gelu_erf()?;
                let xs = fc2.forward(&xs)?.gelu_erf()?;
                fc3.forward(&xs)
            }
            Self::Single { fc1, fc2 } => fc2.forward(&fc1.forward(xs)?.gelu_erf()?),
        }
    }
}

/// The full OpenVLA network
pub struct PrismaticModel {
    vision_backbone: VisionBackbone,
    projector: Projector,
    language_model: Llama,
    llama_config: LlamaConfig,
}

impl PrismaticModel {
    /// Load all weights from `vb` (rooted at the checkpoint's top level)
    pub fn load(config: &OpenVlaConfig, vb: VarBuilder, use_flash_attn: bool) -> Result<Self> {
        let specs = config
            .featurizer_ids()
            .iter()
            .map(|id| VitSpec::from_timm_id(id))
            .collect::<vla_infer_core::Result<Vec<_>>>()
            .map_err(candle_core::Error::wrap)?;
        let image_size = config.image_size().map_err(candle_core::Error::wrap)? as usize;
        let llama_config = config
            .llama_config(use_flash_attn)
            .map_err(candle_core::Error::wrap)?;

        tracing::debug!("Loading vision backbone ({} featurizers)", specs.len());
        let vision_backbone = VisionBackbone::new(vb.pp("vision_backbone"), &specs, image_size)?;

        let projector = Projector::new(
            vb.pp("projector"),
            vision_backbone.embed_dim(),
            llama_config.hidden_size,
            config.use_fused_vision_backbone,
        )?;

        tracing::debug!(
            "Loading language model ({} layers)",
            llama_config.num_hidden_layers
        );
        let language_model = Llama::load(vb.pp("language_model"), &llama_config)?;

        Ok(Self {
            vision_backbone,
            projector,
            language_model,
            llama_config,
        })
    }

    /// Text embeddings with the projected patch embeddings spliced in right
    /// after the BOS token: `[1, seq_len + num_patches, hidden]`
    pub fn multimodal_embeddings(&self, input_ids: &Tensor, pixel_values: &Tensor) -> Result<Tensor> {
        let patches = self
            .projector
            .forward(&self.vision_backbone.forward(pixel_values)?)?;
        let text = self.language_model.embed(input_ids)?;
        let seq_len = text.dim(1)?;
        Tensor::cat(
            &[
                &text.narrow(1, 0, 1)?,
                &patches.to_dtype(text.dtype())?,
                &text.narrow(1, 1, seq_len - 1)?,
            ],
            1,
        )
    }

    /// Greedily or stochastically decode `max_new_tokens` tokens
    pub fn generate(
        &self,
        input_ids: &Tensor,
        pixel_values: &Tensor,
        max_new_tokens: usize,
        logits_processor: &mut LogitsProcessor,
        dtype: DType,
        device: &Device,
    ) -> Result<Vec<u32>> {
        let mut cache = Cache::new(true, dtype, &self.llama_config, device)?;

        let embeds = self.multimodal_embeddings(input_ids, pixel_values)?;

        let mut index_pos = 0;
        let mut step_input = embeds;
        let mut generated = Vec::with_capacity(max_new_tokens);

        for _ in 0..max_new_tokens {
            let step_len = step_input.dim(1)?;
            let logits = self
                .language_model
                .forward_input_embed(&step_input, index_pos, &mut cache)?;
            index_pos += step_len;

            let logits = logits.i(0)?.to_dtype(DType::F32)?;
            let token = logits_processor.sample(&logits)?;
            generated.push(token);

            let next = Tensor::new(&[token], device)?.unsqueeze(0)?;
            step_input = self.language_model.embed(&next)?;
        }

        Ok(generated)
    }
}
