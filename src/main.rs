use anyhow::Result;
use clap::{Parser, Subcommand};
use ommatidia_harness::cli::{self, EvalArgs, HarnessContext, UnitArgs};
use ommatidia_harness::infra::load_config;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "ommatidia-harness",
    version,
    about = "Builds detector images and checks their HTTP contract"
)]
struct Cli {
    /// Harness config file (default: ./ommatidia.toml when present)
    #[arg(long, global = true, env = "OMMATIDIA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, start and run the behavioral checks against detector(s)
    Unit(UnitArgs),
    /// Run a directory of images through detector(s) and export a report
    Eval(EvalArgs),
    /// Check that the container engine and fixtures are usable
    Doctor,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Unit(args) => {
            let context = HarnessContext::new(config, args.target.show_output);
            cli::unit::run(args, &context)
        }
        Commands::Eval(args) => {
            let context = HarnessContext::new(config, args.target.show_output);
            cli::eval::run(args, &context)
        }
        Commands::Doctor => cli::doctor::run(&HarnessContext::new(config, false)),
    }
}
