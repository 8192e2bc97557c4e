//! vla-infer Models
//!
//! Vision-Language-Action model backends behind a single capability interface.
//!
//! - `VlaModel`: load a checkpoint, then predict a 7-DoF action from an image
//!   and an instruction
//! - `ModelFactory`: case-insensitive lookup of backends by model type, with a
//!   mock switch that substitutes `MockVlaModel` for any known type
//! - `OpenVlaModel`: the OpenVLA backend, running on Candle by default
//!
//! Backends are synchronous; one `predict` call performs one forward pass.

pub mod device;
pub mod factory;
pub mod mock;
pub mod model;
pub mod openvla;
pub mod options;

pub use device::{select_device, DeviceKind, DeviceProbe, SystemProbe};
pub use factory::{ModelFactory, OPENVLA};
pub use mock::{MockVlaModel, MOCK_RESPONSE};
pub use model::VlaModel;
pub use openvla::{CandleRuntime, OpenVlaModel, VlaRuntime, VlaSession, DEFAULT_MODEL_ID};
pub use options::{
    AttnImplementation, LoadOptions, LoadSettings, Precision, PredictOptions, PredictSettings,
    Sampling, DEFAULT_UNNORM_KEY,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::factory::ModelFactory;
    pub use crate::model::VlaModel;
    pub use crate::options::{LoadOptions, PredictOptions};
    pub use vla_infer_core::prelude::*;
}
