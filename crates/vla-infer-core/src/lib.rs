//! vla-infer Core
//!
//! Types shared by every vla-infer crate:
//! - The error taxonomy and `Result` alias
//! - `ActionResult`, the 7-DoF action returned by model backends
//! - Image acquisition helpers (file decoding and mock placeholders)

pub mod error;
pub mod image;
pub mod types;

pub use ::image::RgbImage;
pub use error::{Error, Result};
pub use types::{ActionResult, ACTION_DIM};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ActionResult, ACTION_DIM};
    pub use ::image::RgbImage;
}
