//! Sync progress reporting.
//!
//! Reports observable progress during `hsync sync` so users see how many
//! records have been matched while the export is scanned and how many
//! points have been sent while uploading. Progress is emitted on **stderr**
//! so stdout remains parseable for scripts.
//!
//! Upload progress counts points handed to the remote API, whether or not
//! the chunk carrying them succeeded.

use std::io::Write;

/// A single progress event for sync.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Export scan in progress: `matched` records accepted so far. Total unknown.
    Scanning { metric: String, matched: u64 },
    /// Upload phase: `n` points processed out of `total`.
    Uploading { metric: String, n: u64, total: u64 },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the extract and upload loops.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "sync steps  uploading  1,200 / 15,000 points".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Scanning { metric, matched } => {
                format!("sync {}  scanning  {} records\n", metric, format_number(*matched))
            }
            ProgressEvent::Uploading { metric, n, total } => format!(
                "sync {}  uploading  {} / {} points\n",
                metric,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Scanning { metric, matched } => serde_json::json!({
                "event": "progress",
                "metric": metric,
                "phase": "scanning",
                "matched": matched
            }),
            ProgressEvent::Uploading { metric, n, total } => serde_json::json!({
                "event": "progress",
                "metric": metric,
                "phase": "uploading",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
