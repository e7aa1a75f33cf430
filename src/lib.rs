pub mod checks;
pub mod cli;
pub mod domain;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
// In a real production crate, we might use a feature flag "test-utils"
pub mod test_support;

pub use checks::{Check, CheckError, CheckRegistry, builtin_registry, register_builtin_checks};
pub use domain::{ContainerRuntime, ContainerState, HarnessError, RequestBody, Response, Sample};
pub use infra::{EngineCli, HarnessConfig};
pub use services::{
    CheckResult, Container, EvaluationRecord, EvaluationReport, EvaluationRunner, Image,
    ImageBuilder, Suite, TestRunner,
};
