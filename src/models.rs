//! Core data models used throughout the assigner.
//!
//! These types represent the model elements fetched from the catalog, the
//! rows a user fills in to assign parameter values, and the job request and
//! status values exchanged with the automation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Parameter group used when a row does not name one.
pub const DEFAULT_PARAMETER_GROUP: &str = "PG_DATA";

/// One element instance of a design model.
///
/// Records without an `external_id` still count toward family/type option
/// lists but cannot be colored in the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementRecord {
    pub family_name: Option<String>,
    pub element_name: Option<String>,
    pub external_id: Option<String>,
}

/// Hex RGB color attached to an assignment row (`#rrggbb`, lowercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Parses `#rrggbb` (case-insensitive, leading `#` optional).
    pub fn parse(raw: &str) -> Result<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Validation(format!(
                "invalid color '{}': expected #rrggbb",
                raw
            )));
        }
        Ok(Self(format!("#{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self("#0099ff".to_string())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row of the parameter table: a parameter name the user intends to
/// target and whether its assignments should be colored in the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParameterRow {
    pub name: String,
    #[serde(default)]
    pub visualize: bool,
}

/// Unvalidated assignment row as it arrives from a sheet or request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAssignmentRow {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub parameter_group: Option<String>,
    #[serde(default)]
    pub parameter_value: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// One user-specified family/type → parameter value mapping.
///
/// Empty or whitespace-only strings are normalized to `None` on
/// construction, so downstream code only has to check for presence. Other
/// names are kept byte-exact since they are matched exactly against the
/// model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRow {
    pub family: Option<String>,
    pub type_name: Option<String>,
    pub parameter: Option<String>,
    pub parameter_group: Option<String>,
    pub parameter_value: Option<String>,
    pub color: Color,
}

impl AssignmentRow {
    /// Validates a raw row. Fails only on a malformed color.
    pub fn parse(raw: RawAssignmentRow) -> Result<Self> {
        let color = match non_empty(raw.color) {
            Some(c) => Color::parse(&c)?,
            None => Color::default(),
        };
        Ok(Self {
            family: non_empty(raw.family),
            type_name: non_empty(raw.type_name),
            parameter: non_empty(raw.parameter),
            parameter_group: non_empty(raw.parameter_group),
            parameter_value: raw.parameter_value,
            color,
        })
    }

    /// The group this row's parameter is written to.
    pub fn group(&self) -> &str {
        self.parameter_group
            .as_deref()
            .unwrap_or(DEFAULT_PARAMETER_GROUP)
    }
}

impl TryFrom<RawAssignmentRow> for AssignmentRow {
    type Error = Error;

    fn try_from(raw: RawAssignmentRow) -> Result<Self> {
        AssignmentRow::parse(raw)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A single family/type target of a parameter assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub type_name: String,
    pub family_name: String,
    pub value: String,
}

/// All targets that receive one `(parameter, group)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterEntry {
    pub parameter_name: String,
    pub parameter_group: String,
    pub targets: Vec<Target>,
}

/// The configuration document consumed by the remote job.
///
/// Serializes as a JSON array of [`ParameterEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobRequest {
    pub entries: Vec<ParameterEntry>,
}

impl JobRequest {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct `(parameter, group)` entries.
    pub fn parameter_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of targets across all entries.
    pub fn target_count(&self) -> usize {
        self.entries.iter().map(|e| e.targets.len()).sum()
    }
}

/// Identifier returned by the execution engine for a submitted work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a remote work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Any non-terminal engine label (`pending`, `inprogress`, `queued`, ...).
    Pending(String),
    Success,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    /// Maps an engine status label to a [`JobStatus`].
    ///
    /// `success` and `cancelled` are exact; `failed` and the engine's
    /// `failed*` variants (e.g. `failedInstructions`) are failures and keep
    /// their label. Everything else is in progress.
    pub fn parse(label: &str) -> Self {
        match label {
            "success" => JobStatus::Success,
            "cancelled" => JobStatus::Cancelled,
            l if l.starts_with("failed") => JobStatus::Failed(l.to_string()),
            other => JobStatus::Pending(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending(_))
    }

    pub fn label(&self) -> &str {
        match self {
            JobStatus::Pending(l) | JobStatus::Failed(l) => l,
            JobStatus::Success => "success",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A status observation with its optional diagnostic report link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    pub report_url: Option<String>,
}
