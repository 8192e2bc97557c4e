//! Fake backend used in mock mode
//!
//! Stands in for a real backend so the driver's control flow can be exercised
//! without downloading weights.

use crate::model::VlaModel;
use crate::options::{LoadOptions, PredictOptions};
use vla_infer_core::{ActionResult, Error, Result, RgbImage, ACTION_DIM};

/// Text attached to every mock prediction
pub const MOCK_RESPONSE: &str = "Mock action: Pick up object";

/// Backend that never loads weights and always predicts the same action
#[derive(Debug)]
pub struct MockVlaModel {
    kind: String,
    model_id: Option<String>,
}

impl MockVlaModel {
    /// Create a mock standing in for backend `kind`
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            model_id: None,
        }
    }

    /// Identifier passed to the last `load`
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }
}

impl VlaModel for MockVlaModel {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn is_loaded(&self) -> bool {
        self.model_id.is_some()
    }

    fn load(&mut self, model_id: &str, _options: &LoadOptions) -> Result<()> {
        tracing::info!("Mock {} backend skipping weights for {}", self.kind, model_id);
        self.model_id = Some(model_id.to_string());
        Ok(())
    }

    fn predict(
        &self,
        image: &RgbImage,
        instruction: &str,
        _options: &PredictOptions,
    ) -> Result<ActionResult> {
        if !self.is_loaded() {
            return Err(Error::NotLoaded);
        }

        tracing::debug!(
            "Mock prediction for '{}' on {}x{} image",
            instruction,
            image.width(),
            image.height()
        );

        Ok(ActionResult::new(vec![0.0; ACTION_DIM])?.with_description(MOCK_RESPONSE))
    }
}
