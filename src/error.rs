//! Error taxonomy shared by the catalog and job subsystems.
//!
//! Library operations return [`Result<T>`](Result) with the typed [`Error`]
//! below. The CLI wraps these in `anyhow` with context; the HTTP API maps
//! each variant to a status code via [`Error::code`].

use thiserror::Error;

/// Errors raised by the query executor, catalog builder, payload builder
/// and job orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP-level failure. The message carries the status code
    /// and raw response body when one was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The GraphQL endpoint accepted the request but rejected the query.
    #[error("GraphQL errors: {0}")]
    RemoteQuery(String),

    /// A response arrived but its body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Caller-supplied assignment data is insufficient.
    #[error("{0}")]
    Validation(String),

    /// No activity configuration exists for the model-format version.
    #[error("Revit version '{version}' is not supported: {reason}")]
    UnsupportedVersion { version: String, reason: String },

    /// The remote work item ended unsuccessfully or never reached a
    /// terminal status within the maximum wait.
    #[error("{}", describe_job_failure(.job_id, .status, .report_url, .timed_out))]
    JobExecution {
        job_id: String,
        status: String,
        report_url: Option<String>,
        timed_out: bool,
    },

    /// A finished job's output could not be written locally.
    #[error("output error: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn describe_job_failure(
    job_id: &str,
    status: &str,
    report_url: &Option<String>,
    timed_out: &bool,
) -> String {
    let outcome = if *timed_out {
        "timed out"
    } else {
        "did not succeed"
    };
    match report_url {
        Some(url) => format!(
            "work item {} {} (last status: {}), report: {}",
            job_id, outcome, status, url
        ),
        None => format!("work item {} {} (last status: {})", job_id, outcome, status),
    }
}

impl Error {
    /// Builds a [`Error::Transport`] for a non-success HTTP response.
    pub fn http(status: reqwest::StatusCode, body: &str) -> Self {
        Error::Transport(format!("HTTP {}: {}", status.as_u16(), body))
    }

    /// Machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport_error",
            Error::RemoteQuery(_) => "remote_query_error",
            Error::InvalidResponse(_) => "invalid_response",
            Error::Validation(_) => "validation_error",
            Error::UnsupportedVersion { .. } => "unsupported_version",
            Error::JobExecution { .. } => "job_execution_error",
            Error::Output(_) => "output_error",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::InvalidResponse(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Output(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidResponse(err.to_string())
    }
}
