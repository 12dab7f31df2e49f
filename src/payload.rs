//! Job request assembly.
//!
//! Turns the flat list of assignment rows into the grouped configuration
//! document the remote job reads: one entry per `(parameter, group)` pair,
//! each listing the family/type targets and the value to write.

use crate::error::{Error, Result};
use crate::models::{AssignmentRow, JobRequest, ParameterEntry, Target};

/// Groups `rows` by `(parameter, group)`.
///
/// Rows without a parameter are skipped. Entries keep the order in which
/// their pair first appears in `rows`; targets keep row order within an
/// entry. Missing type, family or value become empty strings.
pub fn build_job_request(rows: &[AssignmentRow]) -> JobRequest {
    let mut entries: Vec<ParameterEntry> = Vec::new();

    for row in rows {
        let Some(parameter) = row.parameter.as_deref() else {
            continue;
        };
        let group = row.group();

        let target = Target {
            type_name: row.type_name.clone().unwrap_or_default(),
            family_name: row.family.clone().unwrap_or_default(),
            value: row.parameter_value.clone().unwrap_or_default(),
        };

        match entries
            .iter_mut()
            .find(|e| e.parameter_name == parameter && e.parameter_group == group)
        {
            Some(entry) => entry.targets.push(target),
            None => entries.push(ParameterEntry {
                parameter_name: parameter.to_string(),
                parameter_group: group.to_string(),
                targets: vec![target],
            }),
        }
    }

    entries.retain(|e| !e.targets.is_empty());
    JobRequest { entries }
}

/// Rejects a request with no parameter-bearing assignments.
pub fn require_assignments(request: &JobRequest) -> Result<()> {
    if request.is_empty() {
        return Err(Error::Validation(
            "at least one assignment with a parameter is required".to_string(),
        ));
    }
    Ok(())
}

/// [`build_job_request`] followed by [`require_assignments`].
pub fn build_validated_job_request(rows: &[AssignmentRow]) -> Result<JobRequest> {
    let request = build_job_request(rows);
    require_assignments(&request)?;
    Ok(request)
}

/// CLI: print the job request document built from a sheet.
pub fn run_payload(sheet_path: &std::path::Path) -> anyhow::Result<()> {
    let sheet = crate::sheet::load_sheet(sheet_path)?;
    let request = build_validated_job_request(&sheet.assignments)?;
    eprintln!(
        "{} parameter(s), {} target(s)",
        request.parameter_count(),
        request.target_count()
    );
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Color, DEFAULT_PARAMETER_GROUP};

    fn row(family: &str, type_name: &str, parameter: &str, group: &str, value: &str) -> AssignmentRow {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        AssignmentRow {
            family: opt(family),
            type_name: opt(type_name),
            parameter: opt(parameter),
            parameter_group: opt(group),
            parameter_value: opt(value),
            color: Color::default(),
        }
    }

    #[test]
    fn groups_by_parameter_and_group() {
        let rows = vec![
            row("A", "T1", "P", "G", "V1"),
            row("B", "T2", "P", "G", "V2"),
            row("A", "T3", "", "G", "V3"),
        ];
        let request = build_job_request(&rows);

        assert_eq!(request.entries.len(), 1);
        let entry = &request.entries[0];
        assert_eq!(entry.parameter_name, "P");
        assert_eq!(entry.parameter_group, "G");
        let types: Vec<_> = entry.targets.iter().map(|t| t.type_name.as_str()).collect();
        assert_eq!(types, vec!["T1", "T2"]);
        assert_eq!(entry.targets[1].family_name, "B");
        assert_eq!(entry.targets[1].value, "V2");
    }

    #[test]
    fn same_parameter_different_group_are_separate() {
        let rows = vec![
            row("A", "T1", "P", "G1", "1"),
            row("A", "T2", "Q", "", "2"),
            row("A", "T3", "P", "G2", "3"),
            row("A", "T4", "P", "G1", "4"),
        ];
        let request = build_job_request(&rows);
        let keys: Vec<_> = request
            .entries
            .iter()
            .map(|e| (e.parameter_name.as_str(), e.parameter_group.as_str(), e.targets.len()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("P", "G1", 2),
                ("Q", DEFAULT_PARAMETER_GROUP, 1),
                ("P", "G2", 1),
            ]
        );
        assert_eq!(request.parameter_count(), 3);
        assert_eq!(request.target_count(), 4);
    }

    #[test]
    fn missing_fields_become_empty_strings() {
        let request = build_job_request(&[row("", "", "P", "", "")]);
        let target = &request.entries[0].targets[0];
        assert_eq!(target.type_name, "");
        assert_eq!(target.family_name, "");
        assert_eq!(target.value, "");
    }

    #[test]
    fn rows_without_parameters_are_rejected() {
        let rows = vec![row("A", "T1", "", "G", "V"), row("B", "T2", "", "", "")];
        assert!(build_job_request(&rows).is_empty());
        let err = build_validated_job_request(&rows).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(build_validated_job_request(&[]).is_err());
    }
}
