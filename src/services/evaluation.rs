use crate::domain::{Estimate, HarnessError, JSON_CONTENT_TYPE, Result};
use crate::services::Container;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One detection recorded during an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    #[serde(rename = "Detector")]
    pub detector: String,
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Confidence")]
    pub confidence: Option<f64>,
}

/// Records of one evaluation, and the error that stopped it early, if any.
#[derive(Debug, Default)]
pub struct EvaluationReport {
    pub records: Vec<EvaluationRecord>,
    pub aborted: Option<HarnessError>,
}

impl EvaluationReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

/// Feeds every file below a directory through one detector instance.
pub struct EvaluationRunner<'a> {
    container: &'a mut Container,
    records: Vec<EvaluationRecord>,
}

impl<'a> EvaluationRunner<'a> {
    pub fn new(container: &'a mut Container) -> Self {
        Self {
            container,
            records: Vec::new(),
        }
    }

    /// Creates one detector and posts every file below `input` to it.
    ///
    /// Unreadable files, non-2xx answers and bodies that are not an estimate are
    /// logged and skipped. A transport error ends the run; records added before it
    /// stay in the runner. Returns the number of records added.
    pub fn run(&mut self, input: &Path) -> Result<usize> {
        let files = discover_files(input)?;
        info!(
            "Evaluating {} with {} files from {:?}",
            self.container.image(),
            files.len(),
            input
        );

        let created = self.container.post_json("/detections/", serde_json::json!({}))?;
        if !created.is_success() {
            return Err(HarnessError::InvalidContainer(format!(
                "creating a detector returned {}: {}",
                created.status,
                created.text()
            )));
        }
        let id = created.json()?;
        let path = format!("/detections/{id}/");

        let before = self.records.len();
        for file in files {
            let name = file_name(&file);
            let bytes = match fs::read(&file) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping {name}: {e}");
                    continue;
                }
            };
            let response = self
                .container
                .post_bytes(&path, bytes, content_type_for(&file))?;

            if !response.is_success() {
                warn!(
                    "Skipping {name}: detector answered {} {}",
                    response.status,
                    response.text()
                );
                continue;
            }

            let estimate: Estimate = match response.parse() {
                Ok(estimate) => estimate,
                Err(e) => {
                    warn!("Skipping {name}: {e}");
                    continue;
                }
            };
            debug!("{name}: ({}, {})", estimate.x, estimate.y);
            self.records.push(EvaluationRecord {
                detector: self.container.image().to_string(),
                file: name,
                x: estimate.x,
                y: estimate.y,
                confidence: estimate.confidence,
            });
        }

        Ok(self.records.len() - before)
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EvaluationRecord> {
        self.records
    }

    /// Runs over `input` and keeps whatever was recorded, even when the run fails.
    pub fn run_to_report(mut self, input: &Path) -> EvaluationReport {
        let aborted = self.run(input).err();
        if let Some(e) = &aborted {
            warn!(
                "Evaluation of {} stopped after {} records: {e}",
                self.container.image(),
                self.records.len()
            );
        }
        EvaluationReport {
            records: self.records,
            aborted,
        }
    }

    pub fn export(&self, output: &Path) -> Result<()> {
        export_records(&self.records, output)
    }
}

/// Writes `records` as a tab separated table to `output`.
pub fn export_records(records: &[EvaluationRecord], output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| HarnessError::io(format!("creating {:?}", parent), e))?;
    }
    let file =
        File::create(output).map_err(|e| HarnessError::io(format!("creating {:?}", output), e))?;
    write_records(records, file)?;
    info!("Wrote {} records to {:?}", records.len(), output);
    Ok(())
}

/// Header line `Detector, File, X, Y, Confidence`, then one line per record in order.
pub fn write_records<W: Write>(records: &[EvaluationRecord], writer: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);

    writer.write_record(["Detector", "File", "X", "Y", "Confidence"])?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .map_err(|e| HarnessError::io("flushing evaluation report", e))
}

/// Regular files below `dir`, recursively, sorted by path.
pub fn discover_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(HarnessError::Configuration(format!(
            "{:?} is not a directory",
            dir
        )));
    }

    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let paths = glob::glob(&pattern)
        .map_err(|e| HarnessError::Configuration(format!("invalid input path {:?}: {e}", dir)))?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let context = format!("listing {:?}", e.path());
            HarnessError::io(context, e.into_error())
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("json") => JSON_CONTENT_TYPE,
        _ => "application/octet-stream",
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
