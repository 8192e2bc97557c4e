//! Prompt tokenization and image preprocessing

use crate::openvla::config::OpenVlaConfig;
use crate::openvla::vision::VitSpec;
use candle_core::{DType, Device, Tensor};
use image::imageops::{self, FilterType};
use std::path::Path;
use tokenizers::Tokenizer;
use vla_infer_core::{Error, Result, RgbImage};

/// Token id of the empty "▁" piece that precedes action tokens in training data
pub const ACTION_PREFIX_TOKEN: u32 = 29871;

/// Ensure the prompt ids end with the empty action prefix token
pub fn with_action_prefix(mut ids: Vec<u32>) -> Vec<u32> {
    if ids.last() != Some(&ACTION_PREFIX_TOKEN) {
        ids.push(ACTION_PREFIX_TOKEN);
    }
    ids
}

/// Resize + per-featurizer normalization of an RGB image
#[derive(Debug, Clone)]
pub struct ImageTransform {
    size: u32,
    norms: Vec<([f32; 3], [f32; 3])>,
}

impl ImageTransform {
    /// `norms` holds one `(mean, std)` pair per featurizer
    pub fn new(size: u32, norms: Vec<([f32; 3], [f32; 3])>) -> Self {
        Self { size, norms }
    }

    /// Number of stacked channels produced (3 per featurizer)
    pub fn channels(&self) -> usize {
        3 * self.norms.len()
    }

    /// Pixel values shaped `[1, 3 * featurizers, size, size]`
    pub fn apply(&self, image: &RgbImage, device: &Device, dtype: DType) -> candle_core::Result<Tensor> {
        let size = self.size as usize;
        let resized = if image.dimensions() == (self.size, self.size) {
            image.clone()
        } else {
            imageops::resize(image, self.size, self.size, FilterType::CatmullRom)
        };

        let pixels = Tensor::from_vec(resized.into_raw(), (size, size, 3), &Device::Cpu)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1. / 255., 0.)?;

        let normalized = self
            .norms
            .iter()
            .map(|(mean, std)| {
                let mean = Tensor::new(mean, &Device::Cpu)?.reshape((3, 1, 1))?;
                let std = Tensor::new(std, &Device::Cpu)?.reshape((3, 1, 1))?;
                pixels.broadcast_sub(&mean)?.broadcast_div(&std)
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        Tensor::cat(&normalized, 0)?
            .unsqueeze(0)?
            .to_dtype(dtype)?
            .to_device(device)
    }
}

/// Tokenizer and image transform for a Prismatic checkpoint
pub struct PrismaticProcessor {
    tokenizer: Tokenizer,
    transform: ImageTransform,
}

impl PrismaticProcessor {
    /// Build from a checkpoint config and its `tokenizer.json`
    pub fn from_config(config: &OpenVlaConfig, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref())
            .map_err(|e| Error::load(format!("Failed to load tokenizer: {}", e)))?;

        let norms = config
            .featurizer_ids()
            .iter()
            .map(|id| VitSpec::from_timm_id(id).map(|spec| (spec.mean, spec.std)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tokenizer,
            transform: ImageTransform::new(config.image_size()?, norms),
        })
    }

    /// Prompt token ids, BOS included, ending in the action prefix token
    pub fn encode_prompt(&self, prompt: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| Error::inference(format!("Tokenization failed: {}", e)))?;

        Ok(with_action_prefix(encoding.get_ids().to_vec()))
    }

    /// Preprocess an image for the vision backbone
    pub fn pixel_values(&self, image: &RgbImage, device: &Device, dtype: DType) -> Result<Tensor> {
        self.transform
            .apply(image, device, dtype)
            .map_err(|e| Error::inference(format!("Image preprocessing failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;
    use vla_infer_core::image::solid_rgb;

    #[test]
    fn test_action_prefix_appended_once() {
        assert_eq!(with_action_prefix(vec![1, 512, 29901]), vec![1, 512, 29901, 29871]);
        assert_eq!(with_action_prefix(vec![1, 29871]), vec![1, 29871]);
    }

    #[test]
    fn test_fused_transform_shape_and_values() {
        let transform = ImageTransform::new(
            8,
            vec![
                ([0.485, 0.456, 0.406], [0.229, 0.224, 0.225]),
                ([0.5, 0.5, 0.5], [0.5, 0.5, 0.5]),
            ],
        );
        assert_eq!(transform.channels(), 6);

        let image = solid_rgb(16, 12, [255, 0, 0]);
        let pixels = transform.apply(&image, &Device::Cpu, DType::F32).unwrap();
        assert_eq!(pixels.dims(), &[1, 6, 8, 8]);

        // SigLIP red channel: (1.0 - 0.5) / 0.5
        let red = pixels.i((0, 3, 0, 0)).unwrap().to_scalar::<f32>().unwrap();
        assert!((red - 1.0).abs() < 1e-5);

        // SigLIP green channel: (0.0 - 0.5) / 0.5
        let green = pixels.i((0, 4, 0, 0)).unwrap().to_scalar::<f32>().unwrap();
        assert!((green + 1.0).abs() < 1e-5);

        // DINOv2 red channel
        let red = pixels.i((0, 0, 4, 4)).unwrap().to_scalar::<f32>().unwrap();
        assert!((red - (1.0 - 0.485) / 0.229).abs() < 1e-4);
    }
}
