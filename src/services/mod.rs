mod container;
mod evaluation;
mod image_builder;
mod suite;
mod test_runner;

pub use container::{Container, ContainerSettings, TeardownReport};
pub use evaluation::{
    EvaluationRecord, EvaluationReport, EvaluationRunner, discover_files, export_records, write_records,
};
pub use image_builder::{Image, ImageBuilder};
pub use suite::{Suite, UnitOptions, UnitReport};
pub use test_runner::{CheckOutcome, CheckResult, TestRunner};
