//! Compute device selection

use crate::options::Precision;
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vla_infer_core::{Error, Result};

/// Device to run inference on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// CUDA GPU
    Cuda,
    /// Metal (Apple Silicon)
    #[serde(alias = "metal")]
    Mps,
    /// CPU inference (always available)
    Cpu,
}

impl DeviceKind {
    /// Reduced-precision format for accelerators, full precision on CPU
    pub fn default_precision(self) -> Precision {
        match self {
            Self::Cuda => Precision::Bf16,
            Self::Mps => Precision::F16,
            Self::Cpu => Precision::F32,
        }
    }

    /// Create the Candle device (ordinal 0 for accelerators)
    pub fn create(self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda => Device::new_cuda(0)
                .map_err(|e| Error::load(format!("Failed to create CUDA device: {}", e))),
            Self::Mps => Device::new_metal(0)
                .map_err(|e| Error::load(format!("Failed to create Metal device: {}", e))),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cuda => "cuda",
            Self::Mps => "mps",
            Self::Cpu => "cpu",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cuda" | "gpu" => Ok(Self::Cuda),
            "mps" | "metal" => Ok(Self::Mps),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!(
                "unknown device '{}', expected one of: cuda, mps, cpu",
                other
            )),
        }
    }
}

/// Queries which accelerators are usable in this process
pub trait DeviceProbe {
    /// Whether a CUDA device can be used
    fn cuda_available(&self) -> bool;

    /// Whether a Metal device can be used
    fn metal_available(&self) -> bool;
}

/// Probe that reports an accelerator only if its backend was compiled in
/// and device 0 can actually be opened
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    fn cuda_available(&self) -> bool {
        candle_core::utils::cuda_is_available() && Device::new_cuda(0).is_ok()
    }

    fn metal_available(&self) -> bool {
        candle_core::utils::metal_is_available() && Device::new_metal(0).is_ok()
    }
}

/// Pick the best available device: CUDA, then Metal, then CPU
pub fn select_device(probe: &impl DeviceProbe) -> DeviceKind {
    if probe.cuda_available() {
        DeviceKind::Cuda
    } else if probe.metal_available() {
        DeviceKind::Mps
    } else {
        DeviceKind::Cpu
    }
}
