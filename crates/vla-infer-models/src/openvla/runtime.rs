//! Inference runtime seam for the OpenVLA adapter
//!
//! The adapter only needs two entry points from whatever executes the network:
//! loading a processor + model by identifier, and running the action-prediction
//! pass over processed inputs. `CandleRuntime` is the production implementation;
//! tests substitute their own.

use crate::device::DeviceKind;
use crate::options::{LoadSettings, Sampling};
use vla_infer_core::{Result, RgbImage};

/// Loads OpenVLA checkpoints into ready-to-run sessions
pub trait VlaRuntime: Send {
    /// A loaded processor + model pair
    type Session: VlaSession;

    /// Load processor and model for `model_id` onto `device`
    fn load(&self, model_id: &str, device: DeviceKind, settings: &LoadSettings)
        -> Result<Self::Session>;
}

/// A loaded model able to encode inputs and predict actions
pub trait VlaSession: Send {
    /// Processed model inputs
    type Inputs;

    /// Tokenize `prompt` and preprocess `image`
    fn encode(&self, prompt: &str, image: &RgbImage) -> Result<Self::Inputs>;

    /// Run the forward pass and return the de-normalized action vector
    fn predict_action(
        &self,
        inputs: Self::Inputs,
        unnorm_key: &str,
        sampling: Sampling,
    ) -> Result<Vec<f32>>;
}
