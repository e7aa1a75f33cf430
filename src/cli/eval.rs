use super::{
    HarnessContext, TargetArgs, print_header, print_summary, print_teardown, unit_label,
};
use crate::infra::config::expand_path;
use crate::services::{EvaluationRecord, export_records};
use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Directory with the images to evaluate, searched recursively
    #[arg(long)]
    pub input: PathBuf,

    /// Tab separated report to write
    #[arg(long, default_value = "evaluation.tsv")]
    pub output: PathBuf,
}

/// Runs every image through the detector(s) and writes one combined report.
pub fn run(args: EvalArgs, context: &HarnessContext) -> Result<bool> {
    args.target.validate(&context.config.descriptor)?;
    let input = expand_path(&args.input);
    if !input.is_dir() {
        bail!("input {:?} is not a directory", input);
    }
    let output = expand_path(&args.output);

    let suite = context.suite()?;
    let path = args.target.path();
    let mut reports = if args.target.all {
        let reports = suite.run_evaluation_all(&path, args.target.no_cache, &input)?;
        if reports.is_empty() {
            bail!("no detector directories found in {:?}", path);
        }
        reports
    } else {
        vec![suite.run_evaluation(&path, args.target.options(), &input)]
    };

    let success = reports.iter().all(|report| report.is_success());
    let verdicts: Vec<(String, bool)> = reports
        .iter()
        .map(|report| (unit_label(report), report.is_success()))
        .collect();

    let mut records: Vec<EvaluationRecord> = Vec::new();
    for report in &mut reports {
        print_header(report);
        match &mut report.outcome {
            Ok(evaluation) => {
                let mark = if evaluation.is_complete() { "✅" } else { "❌" };
                println!("{mark} {} images detected", evaluation.records.len());
                if let Some(e) = &evaluation.aborted {
                    println!("❌ Stopped early: {e}");
                }
                records.append(&mut evaluation.records);
            }
            Err(e) => println!("❌ {e}"),
        }
        print_teardown(report.teardown.as_ref());
    }
    if args.target.all {
        print_summary(&verdicts);
    }

    export_records(&records, &output)
        .with_context(|| format!("writing evaluation report to {:?}", output))?;
    println!("📝 {} records written to {}", records.len(), output.display());

    Ok(success)
}
