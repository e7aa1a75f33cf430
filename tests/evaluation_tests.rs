use anyhow::Result;
use ommatidia_harness::domain::HarnessError;
use ommatidia_harness::infra::HarnessConfig;
use ommatidia_harness::services::{EvaluationRunner, ImageBuilder, Suite, UnitOptions};
use ommatidia_harness::test_support::{
    MockRuntime, StubRequest, StubResponse, detector_dir, detector_service, fake_png,
};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn builder(mock: &Arc<MockRuntime>) -> Result<ImageBuilder> {
    let config = HarnessConfig {
        readiness_wait_secs: 0,
        readiness_attempts: 3,
        ..HarnessConfig::default()
    };
    Ok(ImageBuilder::new(mock.clone(), config)?)
}

#[test]
fn test_rejected_fixture_is_skipped() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = detector_dir(temp.path(), "pure");
    let input = temp.path().join("input");
    fs::create_dir_all(input.join("nested"))?;
    fs::write(input.join("a.png"), fake_png(100, 80))?;
    fs::write(input.join("nested/b.png"), b"ThisIsNotAnImage")?;

    let mock = Arc::new(MockRuntime::with_service(detector_service()));
    let image = builder(&mock)?.build(&dir, false)?;
    let mut container = image.spawn()?;

    let mut runner = EvaluationRunner::new(&mut container);
    assert_eq!(runner.run(&input)?, 1);

    let records = runner.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].detector, "pure:0.1");
    assert_eq!(records[0].file, "a.png");
    assert_eq!((records[0].x, records[0].y), (50.0, 40.0));
    assert_eq!(records[0].confidence, Some(1.0));

    let output = temp.path().join("out/report.tsv");
    runner.export(&output)?;
    let table = fs::read_to_string(&output)?;
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "Detector\tFile\tX\tY\tConfidence");
    assert_eq!(lines[1], "pure:0.1\ta.png\t50.0\t40.0\t1.0");
    Ok(())
}

#[test]
fn test_exactly_one_detector_is_created() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = detector_dir(temp.path(), "pure");
    let input = temp.path().join("input");
    fs::create_dir(&input)?;
    for name in ["a.png", "b.png", "c.png"] {
        fs::write(input.join(name), fake_png(10, 10))?;
    }

    let creations = Arc::new(AtomicUsize::new(0));
    let counter = creations.clone();
    let mock = Arc::new(MockRuntime::with_service(Arc::new(move |request: &StubRequest| {
        match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/detections/") => {
                counter.fetch_add(1, Ordering::SeqCst);
                StubResponse::json(200, json!(7))
            }
            ("POST", "/detections/7/") => StubResponse::json(200, json!({"x": 1, "y": 2})),
            _ => StubResponse::json(200, json!({})),
        }
    })));

    let image = builder(&mock)?.build(&dir, false)?;
    let mut container = image.spawn()?;
    let mut runner = EvaluationRunner::new(&mut container);
    runner.run(&input)?;

    assert_eq!(creations.load(Ordering::SeqCst), 1);
    let files: Vec<&str> = runner.records().iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, ["a.png", "b.png", "c.png"]);
    assert!(runner.records().iter().all(|r| r.confidence.is_none()));
    Ok(())
}

#[test]
fn test_failed_detector_creation_is_invalid_container() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = detector_dir(temp.path(), "pure");
    let input = temp.path().join("input");
    fs::create_dir(&input)?;

    let mock = Arc::new(MockRuntime::with_service(Arc::new(|request: &StubRequest| {
        match request.method.as_str() {
            "POST" => StubResponse::text(500, "no detectors today"),
            _ => StubResponse::json(200, json!({})),
        }
    })));

    let report = Suite::new(builder(&mock)?).run_evaluation(&dir, UnitOptions::default(), &input);
    let evaluation = report.outcome.as_ref().map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(matches!(evaluation.aborted, Some(HarnessError::InvalidContainer(_))));
    assert!(evaluation.records.is_empty());
    assert!(!report.is_success());
    assert_eq!(mock.count("kill:"), 1);
    Ok(())
}

#[test]
fn test_unparseable_estimate_is_skipped() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = detector_dir(temp.path(), "pure");
    let input = temp.path().join("input");
    fs::create_dir(&input)?;
    fs::write(input.join("a.png"), b"first")?;
    fs::write(input.join("b.png"), b"second")?;
    fs::write(input.join("c.png"), b"third")?;

    let posted = Arc::new(AtomicUsize::new(0));
    let counter = posted.clone();
    let mock = Arc::new(MockRuntime::with_service(Arc::new(move |request: &StubRequest| {
        match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/detections/") => StubResponse::json(200, json!(1)),
            ("POST", _) => {
                counter.fetch_add(1, Ordering::SeqCst);
                match request.body.as_slice() {
                    b"second" => StubResponse::json(200, json!({})),
                    _ => StubResponse::json(200, json!({"x": 1, "y": 2})),
                }
            }
            _ => StubResponse::json(200, json!({})),
        }
    })));

    let report = Suite::new(builder(&mock)?).run_evaluation(&dir, UnitOptions::default(), &input);
    assert!(report.is_success());
    let evaluation = report.outcome.as_ref().map_err(|e| anyhow::anyhow!("{e}"))?;
    let files: Vec<&str> = evaluation.records.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, ["a.png", "c.png"]);
    assert_eq!(posted.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn test_transport_failure_keeps_earlier_records() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = detector_dir(temp.path(), "pure");
    let input = temp.path().join("input");
    fs::create_dir(&input)?;
    fs::write(input.join("a.png"), fake_png(10, 10))?;
    fs::write(input.join("b.png"), b"stall")?;
    fs::write(input.join("c.png"), fake_png(10, 10))?;

    let mock = Arc::new(MockRuntime::with_service(Arc::new(|request: &StubRequest| {
        match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/detections/") => StubResponse::json(200, json!(1)),
            ("POST", _) if request.body == b"stall" => {
                thread::sleep(Duration::from_secs(2));
                StubResponse::json(200, json!({"x": 0, "y": 0}))
            }
            ("POST", _) => StubResponse::json(200, json!({"x": 5, "y": 5})),
            _ => StubResponse::json(200, json!({})),
        }
    })));
    let config = HarnessConfig {
        readiness_wait_secs: 0,
        readiness_attempts: 3,
        request_timeout_secs: 1,
        ..HarnessConfig::default()
    };

    let suite = Suite::new(ImageBuilder::new(mock.clone(), config)?);
    let report = suite.run_evaluation(&dir, UnitOptions::default(), &input);
    assert!(!report.is_success());

    let evaluation = report.outcome.as_ref().map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(evaluation.aborted.is_some());
    let files: Vec<&str> = evaluation.records.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, ["a.png"]);
    assert_eq!(mock.count("kill:"), 1);
    Ok(())
}
