//! Behavioral checks run against a live detector container.

mod detections;
pub mod matchers;
mod metadata;

use crate::domain::{HarnessError, Result, Sample};
use crate::services::Container;
use std::fmt;
use thiserror::Error;

pub use detections::{
    CorrectDetectionCheck, CreateDetectorCheck, DeleteDetectorCheck, DetectCheck,
    DetectInvalidCheck, GetDetectorCheck, GetInvalidDetectorCheck, QueryDetectorsCheck,
};
pub use matchers::{AssertionFailure, JsonKind, assert_equal, assert_in, assert_kind, assert_less};
pub use metadata::{ConfigCheck, MetadataCheck};

/// Why a check did not pass.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error(transparent)]
    Harness(#[from] HarnessError),
}

/// A named behavioral check. `run` stops at the first failing matcher.
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, container: &mut Container) -> Result<(), CheckError>;
}

/// Ordered collection of checks, filled once and then only read.
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Box<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: impl Check + 'static) {
        self.checks.push(Box::new(check));
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Check> {
        self.checks.iter().map(|check| check.as_ref())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.checks.iter().map(|check| check.name()))
            .finish()
    }
}

/// Appends every built-in check, in execution order.
pub fn register_builtin_checks(
    registry: &mut CheckRegistry,
    samples: Vec<Sample>,
    max_pixel_distance: f64,
) {
    registry.register(MetadataCheck);
    registry.register(ConfigCheck);
    registry.register(CreateDetectorCheck);
    registry.register(GetDetectorCheck);
    registry.register(GetInvalidDetectorCheck);
    registry.register(DetectCheck::new(samples.clone()));
    registry.register(CorrectDetectionCheck::new(samples, max_pixel_distance));
    registry.register(DetectInvalidCheck);
    registry.register(DeleteDetectorCheck);
    registry.register(QueryDetectorsCheck);
}

/// Registry with all built-in checks.
pub fn builtin_registry(samples: Vec<Sample>, max_pixel_distance: f64) -> CheckRegistry {
    let mut registry = CheckRegistry::new();
    register_builtin_checks(&mut registry, samples, max_pixel_distance);
    registry
}

/// Creates a detector instance and returns its id.
fn create_detector(container: &mut Container) -> Result<serde_json::Value, CheckError> {
    let response = container.post_json("/detections/", serde_json::json!({}))?;
    assert_equal(response.status, 200, "POST /detections/")?;
    let id = response.json()?;
    assert_kind(&id, &[JsonKind::Integer], "detector id")?;
    Ok(id)
}
