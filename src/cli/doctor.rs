use super::HarnessContext;
use crate::domain::Sample;
use anyhow::Result;

/// Reports whether the engine and the configured fixtures are usable.
pub fn run(context: &HarnessContext) -> Result<bool> {
    println!("🔍 Checking the harness environment...");
    let engine = &context.config.engine;

    let engine_ok = context.runtime.is_available();
    if engine_ok {
        println!("✅ {engine} available");
    } else {
        println!("❌ {engine} not found in PATH or not executable");
    }

    match &context.config.fixtures_dir {
        Some(dir) => match Sample::find_all(dir) {
            Ok(samples) => println!("✅ {} fixture samples in {:?}", samples.len(), dir),
            Err(e) => println!("⚠️  Fixtures unavailable: {e}"),
        },
        None => println!("⚠️  No fixtures_dir configured, the detection checks need --fixtures"),
    }

    Ok(engine_ok)
}
