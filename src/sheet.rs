//! Assignment sheets.
//!
//! A sheet is the TOML stand-in for the assignment form: the parameter
//! table followed by the family/type rows.
//!
//! ```toml
//! [[parameters]]
//! name = "Fire Rating"
//! visualize = true
//!
//! [[assignments]]
//! family = "Basic Wall"
//! type_name = "Generic - 200mm"
//! parameter = "Fire Rating"
//! parameter_value = "60 min"
//! color = "#ff6600"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::models::{AssignmentRow, ParameterRow, RawAssignmentRow};

/// Parameter table and assignment rows, validated.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub parameters: Vec<ParameterRow>,
    pub assignments: Vec<AssignmentRow>,
}

#[derive(Deserialize)]
struct RawSheet {
    #[serde(default)]
    parameters: Vec<ParameterRow>,
    #[serde(default)]
    assignments: Vec<RawAssignmentRow>,
}

impl Sheet {
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawSheet = toml::from_str(content).context("Failed to parse assignment sheet")?;
        let assignments = raw
            .assignments
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                AssignmentRow::parse(row).with_context(|| format!("assignments[{}]", i))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            parameters: raw.parameters,
            assignments,
        })
    }
}

pub fn load_sheet(path: &Path) -> Result<Sheet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read assignment sheet: {}", path.display()))?;
    Sheet::parse(&content)
}
