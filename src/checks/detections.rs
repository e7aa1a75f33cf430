use super::{
    AssertionFailure, Check, CheckError, JsonKind, assert_equal, assert_in, assert_kind,
    assert_less, create_detector,
};
use crate::domain::{Estimate, HarnessError, Result, Sample};
use crate::services::Container;
use serde_json::Value;
use std::f64::consts::TAU;
use tracing::debug;

const PNG: &str = "image/png";

fn detector_path(id: &Value) -> String {
    format!("/detections/{id}/")
}

/// `POST /detections/` answers 200 with an integer id.
pub struct CreateDetectorCheck;

impl Check for CreateDetectorCheck {
    fn name(&self) -> &str {
        "Create detector"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        create_detector(container)?;
        Ok(())
    }
}

pub struct GetDetectorCheck;

impl Check for GetDetectorCheck {
    fn name(&self) -> &str {
        "Get"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let id = create_detector(container)?;
        let response = container.get(&detector_path(&id))?;
        assert_equal(response.status, 200, "GET /detections/{id}/")?;
        response.json()?;
        Ok(())
    }
}

/// An id that was never handed out is a 404.
pub struct GetInvalidDetectorCheck;

impl Check for GetInvalidDetectorCheck {
    fn name(&self) -> &str {
        "Get invalid"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let response = container.get("/detections/666")?;
        assert_equal(response.status, 404, "GET /detections/666")?;
        Ok(())
    }
}

/// One fixture yields a detection with a center and the sample size.
pub struct DetectCheck {
    samples: Vec<Sample>,
}

impl DetectCheck {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl Check for DetectCheck {
    fn name(&self) -> &str {
        "Detect"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let id = create_detector(container)?;
        let Some(sample) = self.samples.first() else {
            return Err(AssertionFailure::new("no fixture samples available").into());
        };

        let response = container.post_bytes(&detector_path(&id), sample.load()?, PNG)?;
        assert_equal(response.status, 200, &response.text())?;

        let body = response.json()?;
        assert_kind(&body["x"], &[JsonKind::Number], "x")?;
        assert_kind(&body["y"], &[JsonKind::Number], "y")?;
        assert_in("sample", &body, "detection")?;
        assert_in("width", &body["sample"], "sample")?;
        assert_in("height", &body["sample"], "sample")?;
        assert_equal(&body["sample"]["width"], &Value::from(sample.width), "sample width")?;
        assert_equal(&body["sample"]["height"], &Value::from(sample.height), "sample height")?;
        Ok(())
    }
}

/// Every confident detection lands within `max_distance` pixels of the expected center.
pub struct CorrectDetectionCheck {
    samples: Vec<Sample>,
    max_distance: f64,
}

impl CorrectDetectionCheck {
    pub fn new(samples: Vec<Sample>, max_distance: f64) -> Self {
        Self {
            samples,
            max_distance,
        }
    }
}

impl Check for CorrectDetectionCheck {
    fn name(&self) -> &str {
        "Correct detection"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let id = create_detector(container)?;

        for sample in &self.samples {
            let response = container.post_bytes(&detector_path(&id), sample.load()?, PNG)?;
            assert_equal(response.status, 200, &sample.to_string())?;

            let body = response.json()?;
            // A null or non-positive confidence means the detector gave up on this image.
            if let Some(confidence) = body.get("confidence") {
                if confidence.as_f64().is_none_or(|value| value <= 0.0) {
                    debug!("Skipping {sample}: confidence {confidence}");
                    continue;
                }
            }

            let estimate: Estimate = serde_json::from_value(body).map_err(HarnessError::from)?;
            let context = format!("{estimate:?} [{sample}]");
            assert_less(
                sample.distance_to(estimate.x, estimate.y),
                self.max_distance,
                &context,
            )?;

            if estimate.has_ellipse() {
                let angle = estimate.angle.unwrap_or(f64::NAN);
                assert_equal((0.0..=TAU).contains(&angle), true, &format!("angle invalid: {context}"))?;
            }
        }
        Ok(())
    }
}

/// A payload that is not an image is a 400.
pub struct DetectInvalidCheck;

impl Check for DetectInvalidCheck {
    fn name(&self) -> &str {
        "Detect invalid"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let id = create_detector(container)?;
        let response =
            container.post_bytes(&detector_path(&id), b"ThisIsNotAnImage".to_vec(), PNG)?;
        assert_equal(response.status, 400, "POST of a non-image")?;
        Ok(())
    }
}

/// A deleted detector is gone afterwards.
pub struct DeleteDetectorCheck;

impl Check for DeleteDetectorCheck {
    fn name(&self) -> &str {
        "Delete"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let id = create_detector(container)?;
        let path = detector_path(&id);

        assert_equal(container.get(&path)?.status, 200, "before DELETE")?;
        assert_equal(container.delete(&path)?.status, 200, "DELETE")?;
        assert_equal(container.get(&path)?.status, 404, "after DELETE")?;
        Ok(())
    }
}

/// The listing contains the most recently created ids. Older ids may remain.
pub struct QueryDetectorsCheck;

impl Check for QueryDetectorsCheck {
    fn name(&self) -> &str {
        "Query"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let first = create_detector(container)?;
        let second = create_detector(container)?;

        let response = container.get("/detections/")?;
        assert_equal(response.status, 200, "GET /detections/")?;
        let listing = response.json()?;
        assert_kind(&listing, &[JsonKind::Array], "detector listing")?;
        assert_in(first, &listing, "detector listing")?;
        assert_in(second, &listing, "detector listing")?;
        Ok(())
    }
}
