//! Job orchestration: submit a work item, poll it to a terminal status and
//! materialize its output.
//!
//! The poll loop is split in two. [`PollState::observe`] is a pure state
//! machine that folds one status observation into the current state;
//! [`JobOrchestrator`] drives it against an [`ExecutionEngine`], reading
//! time through an injected [`Clock`] so tests can run a ten-minute wait
//! instantly.
//!
//! ```text
//! Submitted → Polling → Succeeded
//!                     → Failed
//!                     → Cancelled
//!                     → TimedOut
//!                     → Aborted   (status fetch failed too many times in a row)
//! ```

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::AutomationConfig;
use crate::engine::{ExecutionEngine, WorkItem};
use crate::error::{Error, Result};
use crate::models::{JobHandle, JobStatus, StatusReport};
use crate::payload::build_validated_job_request;
use crate::progress::{JobProgressEvent, JobProgressReporter, ProgressMode};
use crate::session::Session;
use crate::sheet::load_sheet;

/// Source of time for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll cadence and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
    /// Consecutive failed status fetches tolerated before aborting.
    pub max_status_errors: u32,
}

impl PollPolicy {
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_wait: config.max_wait(),
            max_status_errors: config.max_status_errors,
        }
    }
}

/// One result of asking the engine for a work item's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Status(StatusReport),
    FetchFailed,
}

/// Lifecycle of a submitted work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling {
        last: Option<StatusReport>,
        status_errors: u32,
    },
    Succeeded(StatusReport),
    Failed(StatusReport),
    Cancelled(StatusReport),
    /// `max_wait` elapsed; carries the last status seen, if any.
    TimedOut(Option<StatusReport>),
    Aborted,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Submitted | PollState::Polling { .. })
    }

    /// Last status observed, terminal or not.
    pub fn last_report(&self) -> Option<&StatusReport> {
        match self {
            PollState::Submitted | PollState::Aborted => None,
            PollState::Polling { last, .. } | PollState::TimedOut(last) => last.as_ref(),
            PollState::Succeeded(r) | PollState::Failed(r) | PollState::Cancelled(r) => Some(r),
        }
    }

    /// Folds `observation`, taken `elapsed` after submission, into the state.
    ///
    /// Terminal states absorb every further observation.
    pub fn observe(self, observation: Observation, elapsed: Duration, policy: &PollPolicy) -> PollState {
        let (last, status_errors) = match self {
            PollState::Submitted => (None, 0),
            PollState::Polling {
                last,
                status_errors,
            } => (last, status_errors),
            terminal => return terminal,
        };

        match observation {
            Observation::Status(report) => match report.status {
                JobStatus::Success => PollState::Succeeded(report),
                JobStatus::Failed(_) => PollState::Failed(report),
                JobStatus::Cancelled => PollState::Cancelled(report),
                JobStatus::Pending(_) if elapsed >= policy.max_wait => {
                    PollState::TimedOut(Some(report))
                }
                JobStatus::Pending(_) => PollState::Polling {
                    last: Some(report),
                    status_errors: 0,
                },
            },
            Observation::FetchFailed => {
                let status_errors = status_errors + 1;
                if status_errors > policy.max_status_errors {
                    PollState::Aborted
                } else if elapsed >= policy.max_wait {
                    PollState::TimedOut(last)
                } else {
                    PollState::Polling {
                        last,
                        status_errors,
                    }
                }
            }
        }
    }
}

/// Share of `max_wait` consumed, in percent, capped at 99.
pub fn progress_percent(elapsed: Duration, max_wait: Duration) -> u8 {
    if max_wait.is_zero() {
        return 99;
    }
    let pct = elapsed.as_millis().saturating_mul(100) / max_wait.as_millis();
    pct.min(99) as u8
}

/// Outcome of a successful job run.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: String,
    /// Number of distinct `(parameter, group)` entries sent.
    pub parameters: usize,
    /// Number of family/type targets sent.
    pub targets: usize,
    pub report_url: Option<String>,
    pub output_name: String,
    pub output_location: String,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

/// Drives one work item from submission to a terminal status.
pub struct JobOrchestrator<'a> {
    engine: &'a dyn ExecutionEngine,
    clock: &'a dyn Clock,
    reporter: &'a dyn JobProgressReporter,
    policy: PollPolicy,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(
        engine: &'a dyn ExecutionEngine,
        clock: &'a dyn Clock,
        reporter: &'a dyn JobProgressReporter,
        policy: PollPolicy,
    ) -> Self {
        Self {
            engine,
            clock,
            reporter,
            policy,
        }
    }

    /// Submits `work`, waits for success and finalizes its output.
    pub async fn run(&self, work: &WorkItem) -> Result<JobSummary> {
        let started = self.clock.now();
        let handle = self.engine.submit(work).await?;
        self.reporter.report(JobProgressEvent::Submitted {
            job_id: handle.to_string(),
            activity: work.activity.activity_alias.clone(),
        });

        let report = self.wait(&handle).await?;
        let output_location = self.engine.finalize(&work.output).await?;
        let elapsed = self.clock.now().saturating_sub(started);

        tracing::info!(
            job_id = %handle,
            elapsed_secs = elapsed.as_secs(),
            output = %output_location,
            "work item succeeded"
        );

        Ok(JobSummary {
            job_id: handle.to_string(),
            status: report.status.label().to_string(),
            parameters: work.input_config.request.parameter_count(),
            targets: work.input_config.request.target_count(),
            report_url: report.report_url,
            output_name: work.output.file_name.clone(),
            output_location,
            elapsed_secs: elapsed.as_secs_f64(),
            finished_at: Utc::now(),
        })
    }

    /// Polls `handle` until it reaches a terminal status.
    ///
    /// Returns the success report, or [`Error::JobExecution`] for a failed,
    /// cancelled or timed-out work item.
    pub async fn wait(&self, handle: &JobHandle) -> Result<StatusReport> {
        let started = self.clock.now();
        let mut state = PollState::Submitted;
        let mut percent = 0u8;

        loop {
            self.clock.sleep(self.policy.interval).await;

            let fetched = self.engine.status(handle).await;
            let elapsed = self.clock.now().saturating_sub(started);
            let (observation, fetch_error) = match fetched {
                Ok(report) => (Observation::Status(report), None),
                Err(e) => {
                    tracing::warn!(job_id = %handle, error = %e, "status fetch failed");
                    (Observation::FetchFailed, Some(e))
                }
            };
            state = state.observe(observation, elapsed, &self.policy);

            match state {
                PollState::Submitted | PollState::Polling { .. } => {
                    percent = percent.max(progress_percent(elapsed, self.policy.max_wait));
                    let status = state
                        .last_report()
                        .map(|r| r.status.label().to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    tracing::debug!(job_id = %handle, %status, percent, "polling");
                    self.reporter.report(JobProgressEvent::Polling {
                        job_id: handle.to_string(),
                        status,
                        percent,
                        elapsed_secs: elapsed.as_secs(),
                    });
                }
                PollState::Succeeded(report) => {
                    self.finished(handle, report.status.label(), 100);
                    return Ok(report);
                }
                PollState::Failed(report) | PollState::Cancelled(report) => {
                    self.finished(handle, report.status.label(), percent);
                    return Err(Error::JobExecution {
                        job_id: handle.to_string(),
                        status: report.status.label().to_string(),
                        report_url: report.report_url,
                        timed_out: false,
                    });
                }
                PollState::TimedOut(last) => {
                    let status = last
                        .as_ref()
                        .map(|r| r.status.label().to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    self.finished(handle, &status, percent);
                    return Err(Error::JobExecution {
                        job_id: handle.to_string(),
                        status,
                        report_url: last.and_then(|r| r.report_url),
                        timed_out: true,
                    });
                }
                PollState::Aborted => {
                    return Err(fetch_error.unwrap_or_else(|| {
                        Error::Transport(format!("status polling for {} aborted", handle))
                    }));
                }
            }
        }
    }

    fn finished(&self, handle: &JobHandle, status: &str, percent: u8) {
        self.reporter.report(JobProgressEvent::Finished {
            job_id: handle.to_string(),
            status: status.to_string(),
            percent,
        });
    }
}

/// Inputs of the `run` CLI command.
pub struct RunOptions {
    pub sheet: PathBuf,
    pub input_url: String,
    pub display_name: String,
    pub output_destination: String,
    pub version: Option<String>,
    pub manifest: Option<PathBuf>,
    /// Model URN whose manifest is fetched when neither `version` nor
    /// `manifest` is given.
    pub urn: Option<String>,
    pub progress: ProgressMode,
}

/// CLI: build the payload from a sheet, run the job and print its summary.
pub async fn run_job(session: &Session, opts: RunOptions) -> anyhow::Result<()> {
    let sheet = load_sheet(&opts.sheet)?;
    let request = build_validated_job_request(&sheet.assignments)?;

    let manifest = match &opts.manifest {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
            Some(
                serde_json::from_str::<serde_json::Value>(&content)
                    .with_context(|| format!("Failed to parse manifest: {}", path.display()))?,
            )
        }
        None => None,
    };
    let activity = session
        .resolve_activity(
            opts.version.as_deref(),
            manifest.as_ref(),
            opts.urn.as_deref(),
        )
        .await?;
    tracing::info!(
        version = %activity.version,
        activity = %activity.activity_alias,
        "activity resolved"
    );

    let work = WorkItem::new(
        activity,
        request,
        &opts.input_url,
        &opts.display_name,
        &opts.output_destination,
    );

    let engine = session.engine()?;
    let clock = TokioClock::new();
    let reporter = opts.progress.reporter();
    let orchestrator = JobOrchestrator::new(
        &engine,
        &clock,
        reporter.as_ref(),
        PollPolicy::from_config(&session.config().automation),
    );

    let summary = orchestrator
        .run(&work)
        .await
        .with_context(|| format!("Job for {} did not complete", opts.display_name))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
