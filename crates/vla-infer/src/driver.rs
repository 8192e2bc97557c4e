//! The `run` and `version` commands

use crate::cli::{Cli, Commands, RunArgs};
use crate::config::AppConfig;
use std::io::Write;
use tracing::{debug, error};
use vla_infer_core::image::{load_rgb, placeholder};
use vla_infer_core::{Error, Result, RgbImage};
use vla_infer_models::ModelFactory;

/// Line printed by `version`
pub const VERSION_STRING: &str = "OpenVLA Inference v0.1.0";

/// Usage error when no image can be resolved
pub const IMAGE_REQUIRED: &str =
    "Error: --image_path is required unless in --mock mode with default mock image generation.";

/// Executes CLI commands against a model factory
#[derive(Debug, Clone, Default)]
pub struct Driver {
    factory: ModelFactory,
}

impl Driver {
    pub fn new(factory: ModelFactory) -> Self {
        Self { factory }
    }

    /// Run a parsed command line, writing the report to `out`.
    ///
    /// Returns the process exit code. Failures are reported on `out`, never
    /// propagated.
    pub fn execute(&self, cli: &Cli, out: &mut dyn Write) -> u8 {
        let outcome = match &cli.command {
            Commands::Version => writeln!(out, "{}", VERSION_STRING).map_err(Error::from),
            Commands::Run(args) => AppConfig::load(&cli.config)
                .and_then(|config| self.run(args, &config.with_overrides(args), out)),
        };

        match outcome {
            Ok(()) => 0,
            Err(e) => {
                error!("Command failed: {}", e);
                let message = if e.is_usage() {
                    e.to_string()
                } else {
                    format!("An error occurred: {}", e)
                };
                // Nothing left to report to if stdout itself is gone
                let _ = writeln!(out, "{}", message);
                1
            }
        }
    }

    /// Single-shot inference: create, load, predict, report
    pub fn run(&self, args: &RunArgs, config: &AppConfig, out: &mut dyn Write) -> Result<()> {
        let model_id = config.model_id();
        let model_type = config.model_type();

        writeln!(out, "Using model: {} (type: {})", model_id, model_type)?;
        if args.mock {
            writeln!(out, "Running in MOCK mode.")?;
        }

        let factory = self.factory.clone().with_mock(args.mock);
        let mut model = factory.create_model(model_type)?;

        let image = resolve_image(args)?;
        debug!("Input image is {}x{}", image.width(), image.height());

        model.load(model_id, &config.load)?;

        writeln!(out, "Instruction: {}", args.instruction)?;
        let result = model.predict(&image, &args.instruction, &config.predict)?;
        writeln!(out, "Result: {}", result)?;

        Ok(())
    }
}

/// The explicit image if given, the placeholder in mock mode, otherwise a usage error
pub fn resolve_image(args: &RunArgs) -> Result<RgbImage> {
    match (&args.image_path, args.mock) {
        (Some(path), _) => load_rgb(path),
        (None, true) => {
            debug!("No image given, using mock placeholder");
            Ok(placeholder())
        }
        (None, false) => Err(Error::usage(IMAGE_REQUIRED)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(mock: bool, image_path: Option<PathBuf>) -> RunArgs {
        RunArgs {
            instruction: "pick up the red block".to_string(),
            mock,
            image_path,
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_mock_without_path_uses_placeholder() {
        let image = resolve_image(&args(true, None)).unwrap();
        assert_eq!(image.dimensions(), (224, 224));
        assert!(image.pixels().all(|p| p.0 == [255, 0, 0]));
    }

    #[test]
    fn test_missing_path_outside_mock_is_usage_error() {
        let err = resolve_image(&args(false, None)).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(err.to_string(), IMAGE_REQUIRED);
    }

    #[test]
    fn test_explicit_path_wins_in_mock_mode() {
        let err = resolve_image(&args(true, Some(PathBuf::from("does-not-exist.png")))).unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }
}
