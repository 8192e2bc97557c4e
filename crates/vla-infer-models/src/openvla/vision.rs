//! Vision featurizers
//!
//! Plain ViT encoders with timm parameter names, as stored under
//! `vision_backbone.featurizer` / `vision_backbone.fused_featurizer` in
//! OpenVLA checkpoints. Patch features are read from the second-to-last
//! block with prefix (class/register) tokens removed.

use candle_core::{IndexOp, Module, Result, Tensor, D};
use candle_nn::{conv2d, layer_norm, linear, Conv2d, Conv2dConfig, LayerNorm, Linear, VarBuilder};
use vla_infer_core::Error;

const LAYER_NORM_EPS: f64 = 1e-6;

/// Architecture of one timm ViT featurizer
#[derive(Debug, Clone, PartialEq)]
pub struct VitSpec {
    pub embed_dim: usize,
    pub depth: usize,
    pub num_heads: usize,
    pub mlp_dim: usize,
    pub patch_size: usize,
    pub num_reg_tokens: usize,
    pub class_token: bool,
    pub layer_scale: bool,
    /// Position embeddings cover patch tokens only (prefix tokens are appended after)
    pub no_embed_class: bool,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl VitSpec {
    /// Architecture for a timm model id (pretrained tag after `.` is ignored)
    pub fn from_timm_id(timm_id: &str) -> vla_infer_core::Result<Self> {
        let arch = timm_id.split('.').next().unwrap_or(timm_id);
        match arch {
            "vit_large_patch14_reg4_dinov2" => Ok(Self {
                embed_dim: 1024,
                depth: 24,
                num_heads: 16,
                mlp_dim: 4096,
                patch_size: 14,
                num_reg_tokens: 4,
                class_token: true,
                layer_scale: true,
                no_embed_class: true,
                mean: [0.485, 0.456, 0.406],
                std: [0.229, 0.224, 0.225],
            }),
            "vit_so400m_patch14_siglip_224" => Ok(Self {
                embed_dim: 1152,
                depth: 27,
                num_heads: 16,
                mlp_dim: 4304,
                patch_size: 14,
                num_reg_tokens: 0,
                class_token: false,
                layer_scale: false,
                no_embed_class: false,
                mean: [0.5, 0.5, 0.5],
                std: [0.5, 0.5, 0.5],
            }),
            other => Err(Error::load(format!(
                "unsupported vision featurizer '{}'",
                other
            ))),
        }
    }

    /// Class + register tokens prepended to the patch sequence
    pub fn num_prefix_tokens(&self) -> usize {
        usize::from(self.class_token) + self.num_reg_tokens
    }
}

struct Attention {
    qkv: Linear,
    proj: Linear,
    num_heads: usize,
    scale: f64,
}

impl Attention {
    fn new(vb: VarBuilder, dim: usize, num_heads: usize) -> Result<Self> {
        let qkv = linear(dim, dim * 3, vb.pp("qkv"))?;
        let proj = linear(dim, dim, vb.pp("proj"))?;
        let scale = 1. / ((dim / num_heads) as f64).sqrt();
        Ok(Self {
            qkv,
            proj,
            num_heads,
            scale,
        })
    }
}

impl Module for Attention {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, n, c) = xs.dims3()?;
        let qkv = self
            .qkv
            .forward(xs)?
            .reshape((b, n, 3, self.num_heads, c / self.num_heads))?
            .transpose(1, 2)? // 02134
            .transpose(0, 1)? // 20134
            .transpose(2, 3)?; // 20314
        let q = (qkv.i(0)? * self.scale)?;
        let k = qkv.i(1)?.contiguous()?;
        let v = qkv.i(2)?.contiguous()?;
        let attn = candle_nn::ops::softmax(&q.matmul(&k.t()?)?, D::Minus1)?;
        let attn = attn.matmul(&v)?.transpose(1, 2)?.reshape((b, n, c))?;
        self.proj.forward(&attn)
    }
}

/// Per-channel residual scaling; OpenVLA stores the parameter as `scale_factor`
struct LayerScale {
    scale_factor: Tensor,
}

impl LayerScale {
    fn new(vb: VarBuilder, dim: usize) -> Result<Self> {
        let scale_factor = vb.get(dim, "scale_factor")?;
        Ok(Self { scale_factor })
    }
}

impl Module for LayerScale {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        xs.broadcast_mul(&self.scale_factor)
    }
}

struct Mlp {
    fc1: Linear,
    fc2: Linear,
}

impl Mlp {
    fn new(vb: VarBuilder, in_features: usize, hidden_features: usize) -> Result<Self> {
        let fc1 = linear(in_features, hidden_features, vb.pp("fc1"))?;
        let fc2 = linear(hidden_features, in_features, vb.pp("fc2"))?;
        Ok(Self { fc1, fc2 })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.fc2.forward(&self.fc1.forward(xs)?.gelu_erf()?)
    }
}

struct Block {
    norm1: LayerNorm,
    attn: Attention,
    ls1: Option<LayerScale>,
    norm2: LayerNorm,
    mlp: Mlp,
    ls2: Option<LayerScale>,
}

impl Block {
    fn new(vb: VarBuilder, spec: &VitSpec) -> Result<Self> {
        let dim = spec.embed_dim;
        let norm1 = layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm1"))?;
        let attn = Attention::new(vb.pp("attn"), dim, spec.num_heads)?;
        let norm2 = layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm2"))?;
        let mlp = Mlp::new(vb.pp("mlp"), dim, spec.mlp_dim)?;
        let (ls1, ls2) = if spec.layer_scale {
            (
                Some(LayerScale::new(vb.pp("ls1"), dim)?),
                Some(LayerScale::new(vb.pp("ls2"), dim)?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            norm1,
            attn,
            ls1,
            norm2,
            mlp,
            ls2,
        })
    }
}

impl Module for Block {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let attn = self.attn.forward(&self.norm1.forward(xs)?)?;
        let attn = match &self.ls1 {
            Some(ls) => ls.forward(&attn)?,
            None => attn,
        };
        let xs = (xs + attn)?;

        let mlp = self.mlp.forward(&self.norm2.forward(&xs)?)?;
        let mlp = match &self.ls2 {
            Some(ls) => ls.forward(&mlp)?,
            None => mlp,
        };
        xs + mlp
    }
}

/// A ViT featurizer returning patch features `[batch, num_patches, embed_dim]`
pub struct VisionTransformer {
    patch_embed: Conv2d,
    cls_token: Option<Tensor>,
    reg_token: Option<Tensor>,
    pos_embed: Tensor,
    blocks: Vec<Block>,
    spec: VitSpec,
}

impl VisionTransformer {
    /// Load a featurizer for `image_size` inputs.
    ///
    /// Only the blocks up to the second-to-last are materialized since the
    /// final block's output is never read.
    pub fn new(vb: VarBuilder, spec: &VitSpec, image_size: usize) -> Result<Self> {
        let dim = spec.embed_dim;
        let config = Conv2dConfig {
            stride: spec.patch_size,
            ..Default::default()
        };
        let patch_embed = conv2d(3, dim, spec.patch_size, config, vb.pp("patch_embed.proj"))?;

        let cls_token = if spec.class_token {
            Some(vb.get((1, 1, dim), "cls_token")?)
        } else {
            None
        };
        let reg_token = if spec.num_reg_tokens > 0 {
            Some(vb.get((1, spec.num_reg_tokens, dim), "reg_token")?)
        } else {
            None
        };

        let num_patches = (image_size / spec.patch_size).pow(2);
        let pos_len = if spec.no_embed_class {
            num_patches
        } else {
            num_patches + usize::from(spec.class_token)
        };
        let pos_embed = vb.get((1, pos_len, dim), "pos_embed")?;

        let vb_b = vb.pp("blocks");
        let blocks = (0..spec.depth.saturating_sub(1))
            .map(|i| Block::new(vb_b.pp(i.to_string()), spec))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patch_embed,
            cls_token,
            reg_token,
            pos_embed,
            blocks,
            spec: spec.clone(),
        })
    }

    /// Width of the patch features
    pub fn embed_dim(&self) -> usize {
        self.spec.embed_dim
    }

    fn prefix_tokens(&self, batch: usize) -> Result<Vec<Tensor>> {
        let dim = self.spec.embed_dim;
        let mut prefix = Vec::with_capacity(2);
        if let Some(cls) = &self.cls_token {
            prefix.push(cls.expand((batch, 1, dim))?);
        }
        if let Some(reg) = &self.reg_token {
            prefix.push(reg.expand((batch, self.spec.num_reg_tokens, dim))?);
        }
        Ok(prefix)
    }
}

impl Module for VisionTransformer {
    fn forward(&self, pixel_values: &Tensor) -> Result<Tensor> {
        let xs = self
            .patch_embed
            .forward(pixel_values)?
            .flatten_from(2)?
            .transpose(1, 2)?;
        let batch = xs.dim(0)?;
        let prefix = self.prefix_tokens(batch)?;

        let mut xs = if self.spec.no_embed_class {
            let xs = xs.broadcast_add(&self.pos_embed)?;
            let mut parts = prefix;
            parts.push(xs);
            Tensor::cat(&parts, 1)?
        } else {
            let mut parts = prefix;
            parts.push(xs);
            Tensor::cat(&parts, 1)?.broadcast_add(&self.pos_embed)?
        };

        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }

        let num_prefix = self.spec.num_prefix_tokens();
        let seq_len = xs.dim(1)?;
        xs.narrow(1, num_prefix, seq_len - num_prefix)
    }
}

/// One or more featurizers whose patch features are concatenated channel-wise
pub struct VisionBackbone {
    featurizers: Vec<VisionTransformer>,
}

impl VisionBackbone {
    /// Prefixes of the featurizers inside `vision_backbone`, in channel order
    const PREFIXES: [&'static str; 2] = ["featurizer", "fused_featurizer"];

    /// Load the featurizers listed in `specs` (at most two)
    pub fn new(vb: VarBuilder, specs: &[VitSpec], image_size: usize) -> Result<Self> {
        if specs.is_empty() || specs.len() > Self::PREFIXES.len() {
            candle_core::bail!("expected one or two vision featurizers, got {}", specs.len());
        }

        let featurizers = specs
            .iter()
            .zip(Self::PREFIXES)
            .map(|(spec, prefix)| VisionTransformer::new(vb.pp(prefix), spec, image_size))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { featurizers })
    }

    /// Total width of the concatenated features
    pub fn embed_dim(&self) -> usize {
        self.featurizers.iter().map(|f| f.embed_dim()).sum()
    }
}

impl Module for VisionBackbone {
    /// `pixel_values` stacks 3 channels per featurizer: `[batch, 3 * k, H, W]`
    fn forward(&self, pixel_values: &Tensor) -> Result<Tensor> {
        let features = self
            .featurizers
            .iter()
            .enumerate()
            .map(|(i, featurizer)| featurizer.forward(&pixel_values.narrow(1, 3 * i, 3)?))
            .collect::<Result<Vec<_>>>()?;

        Tensor::cat(&features, D::Minus1)
    }
}
