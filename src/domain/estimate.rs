use serde::Deserialize;
use serde_json::Value;

/// Self-description a detector returns from `GET /`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MetaData {
    pub name: String,
    pub additional_information: Value,
    pub authors: Value,
    pub license: Value,
    pub prediction: Value,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct SampleSize {
    pub width: u32,
    pub height: u32,
}

/// A detection returned by `POST /detections/{id}/`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Estimate {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub major: Option<f64>,
    #[serde(default)]
    pub minor: Option<f64>,
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub sample: Option<SampleSize>,
}

impl Estimate {
    pub fn has_ellipse(&self) -> bool {
        self.major.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pupil_center_only() {
        let estimate: Estimate = serde_json::from_value(json!({
            "x": 12.5,
            "y": 7,
            "sample": {"width": 320, "height": 240}
        }))
        .unwrap();

        assert_eq!(estimate.x, 12.5);
        assert_eq!(estimate.y, 7.0);
        assert_eq!(estimate.confidence, None);
        assert!(!estimate.has_ellipse());
        assert_eq!(
            estimate.sample,
            Some(SampleSize {
                width: 320,
                height: 240
            })
        );
    }

    #[test]
    fn parses_ellipse_and_null_confidence() {
        let estimate: Estimate = serde_json::from_value(json!({
            "x": 1.0,
            "y": 2.0,
            "confidence": null,
            "major": 10.0,
            "minor": 8.0,
            "angle": 0.5
        }))
        .unwrap();

        assert_eq!(estimate.confidence, None);
        assert!(estimate.has_ellipse());
        assert_eq!(estimate.angle, Some(0.5));
    }

    #[test]
    fn parses_metadata() {
        let meta: MetaData = serde_json::from_value(json!({
            "name": "PuRe",
            "additional_information": "",
            "authors": ["Thiago Santini"],
            "license": "non-commercial",
            "prediction": "ellipse"
        }))
        .unwrap();
        assert_eq!(meta.name, "PuRe");
        assert_eq!(meta.prediction, json!("ellipse"));
    }
}
