use super::error::{HarnessError, Result};
use regex::Regex;
use std::f64::consts::PI;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SAMPLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9]+_(?P<width>[0-9]+)_(?P<height>[0-9]+)_(?P<x>[0-9.]+)_(?P<y>[0-9.]+)_(?P<major>[0-9.]+)_(?P<minor>[0-9.]+)_(?P<angle>-?[0-9.]+)\.png$",
    )
    .expect("sample name pattern is valid")
});

/// A fixture image whose file name carries the expected detection.
///
/// `<label>_<width>_<height>_<x>_<y>_<major>_<minor>_<angle>.png`, where the stored
/// angle is shifted by π on parse so it lies in `[0, 2π)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub x: f64,
    pub y: f64,
    pub major: f64,
    pub minor: f64,
    pub angle: f64,
}

impl Sample {
    /// Parses a sample from its file name. Returns `None` for files that do not follow
    /// the fixture naming convention.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let captures = SAMPLE_NAME.captures(file_name)?;
        let field = |name: &str| captures.name(name).map(|m| m.as_str());

        Some(Self {
            path: path.to_path_buf(),
            width: field("width")?.parse().ok()?,
            height: field("height")?.parse().ok()?,
            x: field("x")?.parse().ok()?,
            y: field("y")?.parse().ok()?,
            major: field("major")?.parse().ok()?,
            minor: field("minor")?.parse().ok()?,
            angle: field("angle")?.parse::<f64>().ok()? + PI,
        })
    }

    /// All samples directly inside `dir`, sorted by path.
    pub fn find_all(dir: &Path) -> Result<Vec<Self>> {
        let entries = fs::read_dir(dir)
            .map_err(|e| HarnessError::io(format!("listing fixtures in {:?}", dir), e))?;

        let mut samples: Vec<Self> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| Self::from_path(&path))
            .collect();
        samples.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(samples)
    }

    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| HarnessError::io(format!("reading {:?}", self.path), e))
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}, center {:.2}/{:.2})",
            self.path.display(),
            self.width,
            self.height,
            self.x,
            self.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ground_truth_from_file_name() {
        let sample = Sample::from_path(Path::new("abc_100_80_10.5_20.25_5.0_3.0_1.0.png")).unwrap();
        assert_eq!(sample.width, 100);
        assert_eq!(sample.height, 80);
        assert_eq!(sample.x, 10.5);
        assert_eq!(sample.y, 20.25);
        assert_eq!(sample.major, 5.0);
        assert_eq!(sample.minor, 3.0);
        assert!((sample.angle - (1.0 + PI)).abs() < 1e-12);
    }

    #[test]
    fn negative_angles_land_in_range() {
        let sample = Sample::from_path(Path::new("eye1_320_240_160_120_30_20_-1.5.png")).unwrap();
        assert!(sample.angle >= 0.0 && sample.angle < 2.0 * PI);
    }

    #[test]
    fn ignores_foreign_files() {
        for name in [
            "README.md",
            "abc_100_80_10.5_20.25_5.0_3.0_1.0.jpg",
            "abc_100_80_10.5_20.25_5.0_3.0.png",
            "a-b_100_80_1_2_3_4_5.png",
            "abc_100_80_1.2.3_2_3_4_5.png",
        ] {
            assert!(Sample::from_path(Path::new(name)).is_none(), "{name}");
        }
    }

    #[test]
    fn find_all_is_independent_of_listing_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "b_10_10_5_5_2_1_0.png",
            "a_10_10_4_4_2_1_0.png",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let samples = Sample::find_all(dir.path()).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].path.ends_with("a_10_10_4_4_2_1_0.png"));
        assert!(samples[1].path.ends_with("b_10_10_5_5_2_1_0.png"));
    }

    #[test]
    fn distance_is_euclidean() {
        let sample = Sample::from_path(Path::new("a_10_10_0_0_2_1_0.png")).unwrap();
        assert_eq!(sample.distance_to(3.0, 4.0), 5.0);
    }
}
