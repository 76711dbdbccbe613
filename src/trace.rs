//! Per-sample traces of an estimation session.
//!
//! One CSV row per sample with the outcome, the running interval and the stopping decision,
//! written through a gzip encoder.

use anyhow::Context;
use flate2::write::GzEncoder;
use spa_core::{ConfidenceInterval, Outcome};
use std::fs::File;
use std::path::Path;

/// Records the running interval of a session after every sample, as gzip-compressed CSV.
#[derive(Debug)]
pub struct TraceWriter {
    writer: csv::Writer<GzEncoder<File>>,
}

impl TraceWriter {
    const HEADER: [&str; 5] = ["Sample", "Outcome", "Lower", "Upper", "Decision"];

    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create trace file '{}'", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("trace.csv");
        let enc = flate2::GzBuilder::new()
            .filename(name)
            .write(file, flate2::Compression::fast());
        let mut writer = csv::WriterBuilder::new().from_writer(enc);
        writer.write_record(Self::HEADER)?;
        Ok(Self { writer })
    }

    pub fn record(
        &mut self,
        sample: u64,
        outcome: Outcome,
        interval: Option<&ConfidenceInterval>,
        decision: &str,
    ) -> anyhow::Result<()> {
        let outcome = match outcome {
            Outcome::Bool(b) => u8::from(b).to_string(),
            Outcome::Real(x) => x.to_string(),
        };
        let (lower, upper) = interval
            .map(|ci| (ci.lower.to_string(), ci.upper.to_string()))
            .unwrap_or_default();
        self.writer.write_record([
            sample.to_string().as_str(),
            outcome.as_str(),
            lower.as_str(),
            upper.as_str(),
            decision,
        ])?;
        Ok(())
    }

    /// Flushes and closes the compressed stream.
    pub fn finish(self) -> anyhow::Result<()> {
        self.writer
            .into_inner()
            .map_err(|err| err.into_error())?
            .finish()?;
        Ok(())
    }
}
