//! Model capability trait shared by every backend

use crate::options::{LoadOptions, PredictOptions};
use vla_infer_core::{ActionResult, Result, RgbImage};

/// Trait for all Vision-Language-Action backends.
///
/// A backend is created unloaded by the factory. `load` must succeed before
/// `predict` may be called; implementations return `Error::NotLoaded`
/// otherwise, without touching their inference runtime.
pub trait VlaModel: Send {
    /// Registry name of this backend
    fn kind(&self) -> &str;

    /// Whether `load` has completed successfully
    fn is_loaded(&self) -> bool;

    /// Acquire weights, preprocessing and device placement for `model_id`.
    ///
    /// Calling it again re-initializes the backend.
    fn load(&mut self, model_id: &str, options: &LoadOptions) -> Result<()>;

    /// Predict an action for `instruction` given the current camera `image`
    fn predict(
        &self,
        image: &RgbImage,
        instruction: &str,
        options: &PredictOptions,
    ) -> Result<ActionResult>;
}
