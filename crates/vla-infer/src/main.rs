//! vla-infer
//!
//! Loads a Vision-Language-Action model and predicts a robot action for one
//! image and instruction. The report goes to stdout, logs to stderr.

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use vla_infer::{Cli, Driver};
use vla_infer_models::ModelFactory;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let driver = Driver::new(ModelFactory::new());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let code = driver.execute(&cli, &mut out);
    out.flush()?;

    Ok(ExitCode::from(code))
}

/// Initialize tracing subscriber
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("vla_infer=debug,vla_infer_models=debug,vla_infer_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vla_infer=info,vla_infer_models=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
