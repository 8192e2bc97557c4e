use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vla_infer_models::DeviceKind;

#[derive(Parser, Debug)]
#[command(name = "vla-infer")]
#[command(about = "Run Vision-Language-Action models on a single image", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (ignored if missing)
    #[arg(short, long, global = true, default_value = "vla.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run inference on OpenVLA models
    Run(RunArgs),

    /// Print the version
    Version,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Instruction for the model
    #[arg(long)]
    pub instruction: String,

    /// Type of model to use (default: openvla)
    #[arg(long, alias = "model_type")]
    pub model_type: Option<String>,

    /// HuggingFace model ID or local checkpoint directory (default: openvla/openvla-7b)
    #[arg(long, alias = "model_id")]
    pub model_id: Option<String>,

    /// Path to the input image
    #[arg(long, alias = "image_path")]
    pub image_path: Option<PathBuf>,

    /// Device to run on (cuda, cpu, mps)
    #[arg(long)]
    pub device: Option<DeviceKind>,

    /// Run in mock mode (no model loading)
    #[arg(long)]
    pub mock: bool,

    /// Dataset statistics used to de-normalize actions
    #[arg(long, alias = "unnorm_key")]
    pub unnorm_key: Option<String>,

    /// Sample action tokens instead of greedy decoding.
    ///
    /// Only switches sampling on; `predict.do_sample: true` in the config
    /// file cannot be turned off from the command line.
    #[arg(long, alias = "do_sample")]
    pub do_sample: bool,

    /// Seed for sampling
    #[arg(long)]
    pub seed: Option<u64>,
}
