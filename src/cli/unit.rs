use super::{
    HarnessContext, TargetArgs, print_header, print_summary, print_teardown, unit_label,
};
use crate::checks::builtin_registry;
use crate::infra::config::expand_path;
use crate::services::{CheckResult, UnitReport};
use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug, Clone)]
pub struct UnitArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Fixture images for the detection checks (overrides `fixtures_dir`)
    #[arg(long)]
    pub fixtures: Option<PathBuf>,
}

/// Runs the behavioral checks. Returns whether every check of every unit passed.
pub fn run(args: UnitArgs, context: &HarnessContext) -> Result<bool> {
    args.target.validate(&context.config.descriptor)?;

    let fixtures = args.fixtures.as_deref().map(expand_path);
    let samples = context.samples(fixtures.as_deref())?;
    if samples.is_empty() {
        warn!("No fixture samples found, the detection checks will fail");
    }
    let registry = builtin_registry(samples, context.config.max_pixel_distance);

    let suite = context.suite()?;
    let path = args.target.path();
    let reports = if args.target.all {
        let reports = suite.run_checks_all(&path, args.target.no_cache, &registry)?;
        if reports.is_empty() {
            bail!("no detector directories found in {:?}", path);
        }
        reports
    } else {
        vec![suite.run_checks(&path, args.target.options(), &registry)]
    };

    for report in &reports {
        print_report(report);
    }
    if args.target.all {
        let verdicts: Vec<(String, bool)> = reports
            .iter()
            .map(|report| (unit_label(report), report.is_success()))
            .collect();
        print_summary(&verdicts);
    }

    Ok(reports.iter().all(|report| report.is_success()))
}

fn print_report(report: &UnitReport<Vec<CheckResult>>) {
    print_header(report);
    match &report.outcome {
        Ok(results) => {
            for result in results {
                println!("{result}");
            }
            let passed = results.iter().filter(|r| r.is_ok()).count();
            let mark = if passed == results.len() { "✅" } else { "❌" };
            println!("{mark} {passed}/{} checks passed", results.len());
        }
        Err(e) => println!("❌ {e}"),
    }
    print_teardown(report.teardown.as_ref());
}
