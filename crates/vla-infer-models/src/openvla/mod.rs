//! OpenVLA backend
//!
//! `OpenVlaModel` adapts an inference runtime to the `VlaModel` trait: it picks
//! the device, merges load options over the OpenVLA defaults, builds the
//! prompt and turns the runtime's raw action vector into an `ActionResult`.
//! The network itself lives behind `VlaRuntime`; `CandleRuntime` runs the
//! Prismatic architecture (fused DINOv2 + SigLIP vision, Llama-2 decoder).

pub mod action;
pub mod config;
pub mod hub;
pub mod prismatic;
pub mod processor;
pub mod runtime;
pub mod session;
pub mod vision;

pub use runtime::{VlaRuntime, VlaSession};
pub use session::{CandleRuntime, OpenVlaSession};

use crate::device::{select_device, DeviceKind, DeviceProbe, SystemProbe};
use crate::factory::OPENVLA;
use crate::model::VlaModel;
use crate::options::{LoadOptions, LoadSettings, PredictOptions};
use tracing::{debug, info};
use vla_infer_core::{ActionResult, Error, Result, RgbImage};

/// Default checkpoint on the Hugging Face Hub
pub const DEFAULT_MODEL_ID: &str = "openvla/openvla-7b";

/// Build the OpenVLA prompt for an instruction
pub fn build_prompt(instruction: &str) -> String {
    format!(
        "In: What action should the robot take to {}?\nOut:",
        instruction.to_lowercase()
    )
}

/// OpenVLA backend over an inference runtime
pub struct OpenVlaModel<R: VlaRuntime = CandleRuntime, P: DeviceProbe = SystemProbe> {
    runtime: R,
    probe: P,
    session: Option<R::Session>,
    device: Option<DeviceKind>,
    model_id: Option<String>,
}

impl OpenVlaModel {
    /// Create an unloaded backend using the Candle runtime
    pub fn new() -> Self {
        Self::with_runtime(CandleRuntime::new())
    }
}

impl Default for OpenVlaModel {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: VlaRuntime> OpenVlaModel<R, SystemProbe> {
    /// Create an unloaded backend over a custom runtime
    pub fn with_runtime(runtime: R) -> Self {
        Self {
            runtime,
            probe: SystemProbe,
            session: None,
            device: None,
            model_id: None,
        }
    }
}

impl<R: VlaRuntime, P: DeviceProbe> OpenVlaModel<R, P> {
    /// Replace the device probe used when no device is requested
    pub fn with_probe<Q: DeviceProbe>(self, probe: Q) -> OpenVlaModel<R, Q> {
        OpenVlaModel {
            runtime: self.runtime,
            probe,
            session: self.session,
            device: self.device,
            model_id: self.model_id,
        }
    }

    /// The runtime this backend delegates to
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Device chosen by the last successful load
    pub fn device(&self) -> Option<DeviceKind> {
        self.device
    }

    /// Checkpoint identifier of the last successful load
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }
}

impl<R, P> VlaModel for OpenVlaModel<R, P>
where
    R: VlaRuntime,
    P: DeviceProbe + Send,
{
    fn kind(&self) -> &str {
        OPENVLA
    }

    fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    fn load(&mut self, model_id: &str, options: &LoadOptions) -> Result<()> {
        let device = options
            .device
            .unwrap_or_else(|| select_device(&self.probe));
        let settings = options.merge_over(LoadSettings::defaults_for(device));

        info!("Loading OpenVLA model: {} on {}...", model_id, device);
        debug!("Load settings: {:?}", settings);

        let session = self
            .runtime
            .load(model_id, device, &settings)
            .map_err(Error::into_load)?;

        self.session = Some(session);
        self.device = Some(device);
        self.model_id = Some(model_id.to_string());

        info!("Model loaded successfully.");
        Ok(())
    }

    fn predict(
        &self,
        image: &RgbImage,
        instruction: &str,
        options: &PredictOptions,
    ) -> Result<ActionResult> {
        let session = self.session.as_ref().ok_or(Error::NotLoaded)?;
        let settings = options.resolve();
        let prompt = build_prompt(instruction);

        debug!(
            "Predicting with unnorm_key={} do_sample={}",
            settings.unnorm_key, settings.do_sample
        );

        let inputs = session
            .encode(&prompt, image)
            .map_err(Error::into_inference)?;
        let action = session
            .predict_action(inputs, &settings.unnorm_key, settings.sampling())
            .map_err(Error::into_inference)?;

        ActionResult::new(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_template() {
        assert_eq!(
            build_prompt("Pick up the RED block"),
            "In: What action should the robot take to pick up the red block?\nOut:"
        );
    }

    #[test]
    fn test_new_backend_is_unloaded() {
        let model = OpenVlaModel::new();
        assert!(!model.is_loaded());
        assert_eq!(model.kind(), "openvla");
        assert_eq!(model.model_id(), None);
    }

    #[test]
    fn test_predict_before_load_fails() {
        let model = OpenVlaModel::new();
        let image = vla_infer_core::image::placeholder();
        let err = model
            .predict(&image, "open the drawer", &PredictOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotLoaded));
    }
}
