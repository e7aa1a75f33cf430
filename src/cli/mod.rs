pub mod context;
pub mod doctor;
pub mod eval;
pub mod unit;

pub use context::HarnessContext;
pub use eval::EvalArgs;
pub use unit::UnitArgs;

use crate::domain::image::validate_context;
use crate::infra::config::expand_path;
use crate::services::{TeardownReport, UnitOptions, UnitReport};
use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;

/// Which detector(s) to build and how.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Detector directory, or with --all the directory holding several of them
    pub detector: PathBuf,

    /// Forward build logs and container output to the terminal
    #[arg(long)]
    pub show_output: bool,

    /// Run every subdirectory of DETECTOR that holds a build descriptor
    #[arg(long)]
    pub all: bool,

    /// Build without the engine's layer cache
    #[arg(long)]
    pub no_cache: bool,

    /// Image name to use instead of the one derived from the directory
    #[arg(long, conflicts_with = "all")]
    pub name: Option<String>,
}

impl TargetArgs {
    pub fn path(&self) -> PathBuf {
        expand_path(&self.detector)
    }

    pub fn options(&self) -> UnitOptions<'_> {
        UnitOptions {
            name: self.name.as_deref(),
            no_cache: self.no_cache,
        }
    }

    /// Rejects a target that cannot be run before anything is built.
    fn validate(&self, descriptor: &str) -> Result<()> {
        let path = self.path();
        if self.all {
            if !path.is_dir() {
                bail!("{:?} is not a directory", path);
            }
            return Ok(());
        }
        validate_context(&path, descriptor)?;
        Ok(())
    }
}

fn print_header<T>(report: &UnitReport<T>) {
    match &report.image {
        Some(image) => println!("\n🔬 {image} ({})", report.path.display()),
        None => println!("\n🔬 {}", report.path.display()),
    }
}

fn print_teardown(teardown: Option<&TeardownReport>) {
    if let Some(teardown) = teardown.filter(|t| !t.is_clean()) {
        println!("⚠️  Teardown incomplete ({} errors)", teardown.errors.len());
    }
}

fn print_summary(verdicts: &[(String, bool)]) {
    let passed = verdicts.iter().filter(|(_, ok)| *ok).count();
    println!("\n📋 {passed}/{} detectors passed", verdicts.len());
    for (name, ok) in verdicts {
        let mark = if *ok { "✅" } else { "❌" };
        println!("  {mark} {name}");
    }
}

fn unit_label<T>(report: &UnitReport<T>) -> String {
    report
        .image
        .clone()
        .unwrap_or_else(|| report.path.display().to_string())
}
