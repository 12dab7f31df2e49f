//! Job progress reporting.
//!
//! Reports observable progress while a work item is submitted and polled so
//! users see the engine status and an estimate of how far through the
//! maximum wait the job is. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

/// A single progress event for a job run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobProgressEvent {
    /// The work item was accepted by the engine.
    Submitted { job_id: String, activity: String },
    /// A non-terminal status was observed.
    Polling {
        job_id: String,
        status: String,
        percent: u8,
        elapsed_secs: u64,
    },
    /// A terminal status was reached, or the wait ran out.
    Finished {
        job_id: String,
        status: String,
        percent: u8,
    },
}

/// Reports job progress. Implementations write to stderr (human or JSON).
pub trait JobProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the poll loop.
    fn report(&self, event: JobProgressEvent);
}

/// Human-friendly progress on stderr: "job 3f2a…  inprogress  42%  (250s)".
pub struct StderrProgress;

impl JobProgressReporter for StderrProgress {
    fn report(&self, event: JobProgressEvent) {
        let line = match &event {
            JobProgressEvent::Submitted { job_id, activity } => {
                format!("job {}  submitted to {}\n", job_id, activity)
            }
            JobProgressEvent::Polling {
                job_id,
                status,
                percent,
                elapsed_secs,
            } => format!(
                "job {}  {}  {:>3}%  ({}s)\n",
                job_id, status, percent, elapsed_secs
            ),
            JobProgressEvent::Finished {
                job_id,
                status,
                percent,
            } => format!("job {}  {}  {:>3}%\n", job_id, status, percent),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JobProgressReporter for JsonProgress {
    fn report(&self, event: JobProgressEvent) {
        let obj = match &event {
            JobProgressEvent::Submitted { job_id, activity } => serde_json::json!({
                "event": "progress",
                "job_id": job_id,
                "phase": "submitted",
                "activity": activity
            }),
            JobProgressEvent::Polling {
                job_id,
                status,
                percent,
                elapsed_secs,
            } => serde_json::json!({
                "event": "progress",
                "job_id": job_id,
                "phase": "polling",
                "status": status,
                "percent": percent,
                "elapsed_secs": elapsed_secs
            }),
            JobProgressEvent::Finished {
                job_id,
                status,
                percent,
            } => serde_json::json!({
                "event": "progress",
                "job_id": job_id,
                "phase": "finished",
                "status": status,
                "percent": percent
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl JobProgressReporter for NoProgress {
    fn report(&self, _event: JobProgressEvent) {}
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

    /// Parses `off`, `human` or `json`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn JobProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
