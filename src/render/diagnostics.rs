//! Opt-in per-step timing collected while frames are composed.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::foundation::error::{FramecutError, FramecutResult};

/// One composited step of one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepTiming {
    pub frame: u64,
    /// Clip label, empty for frame-level steps.
    pub clip: String,
    pub step: String,
    pub elapsed: Duration,
}

/// Thread-safe collector of [`StepTiming`] rows.
#[derive(Debug, Default)]
pub struct DiagnosticsReport {
    rows: Mutex<Vec<StepTiming>>,
}

impl DiagnosticsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, frame: u64, clip: &str, step: &str, elapsed: Duration) {
        self.rows.lock().push(StepTiming {
            frame,
            clip: clip.to_string(),
            step: step.to_string(),
            elapsed,
        });
    }

    /// Time `f` and record it as one row.
    pub fn time<T>(&self, frame: u64, clip: &str, step: &str, f: impl FnOnce() -> T) -> T {
        let t0 = Instant::now();
        let out = f();
        self.record(frame, clip, step, t0.elapsed());
        out
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows sorted by frame, in recording order within a frame.
    pub fn rows(&self) -> Vec<StepTiming> {
        let mut rows = self.rows.lock().clone();
        rows.sort_by_key(|r| r.frame);
        rows
    }

    pub fn write_csv(&self, out: &mut dyn Write) -> FramecutResult<()> {
        let io = |e: std::io::Error| FramecutError::evaluation(format!("write diagnostics: {e}"));
        writeln!(out, "frame,clip,step,micros").map_err(io)?;
        for r in self.rows() {
            writeln!(
                out,
                "{},{},{},{}",
                r.frame,
                csv_field(&r.clip),
                csv_field(&r.step),
                r.elapsed.as_micros()
            )
            .map_err(io)?;
        }
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> FramecutResult<()> {
        let file = std::fs::File::create(path).map_err(|e| {
            FramecutError::evaluation(format!("create '{}': {e}", path.display()))
        })?;
        let mut w = std::io::BufWriter::new(file);
        self.write_csv(&mut w)?;
        w.flush()
            .map_err(|e| FramecutError::evaluation(format!("flush diagnostics: {e}")))
    }
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
