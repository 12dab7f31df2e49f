//! External-id → color mapping for the model viewer.
//!
//! The viewer isolates and themes elements by their external id. An
//! assignment row contributes colors when it names a type and its
//! parameter is marked `visualize` in the parameter table. Rows that name a
//! family only match elements of that family.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::catalog::Catalog;
use crate::models::{AssignmentRow, Color, ParameterRow};

/// Colors keyed by external id, in order of first assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColorMap {
    /// `(external_id, color)` pairs.
    pub colors: Vec<(String, Color)>,
    /// Type names of visualized rows that matched no element.
    pub unmatched_types: Vec<String>,
}

impl ColorMap {
    pub fn get(&self, external_id: &str) -> Option<&Color> {
        self.colors
            .iter()
            .find(|(id, _)| id == external_id)
            .map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Viewer payload: a list of single-entry `{external_id: color}` objects.
    pub fn to_viewer_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.colors
                .iter()
                .map(|(id, color)| serde_json::json!({ id: color.as_str() }))
                .collect(),
        )
    }
}

/// Builds the color map for `rows` against `catalog`.
///
/// A later row overwrites the color an earlier row gave the same element.
/// Elements without an external id are skipped.
pub fn color_map(catalog: &Catalog, rows: &[AssignmentRow], parameters: &[ParameterRow]) -> ColorMap {
    let visible: HashSet<&str> = parameters
        .iter()
        .filter(|p| p.visualize && !p.name.is_empty())
        .map(|p| p.name.as_str())
        .collect();

    let mut map = ColorMap::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(type_name) = row.type_name.as_deref() else {
            continue;
        };
        match row.parameter.as_deref() {
            Some(p) if visible.contains(p) => {}
            _ => continue,
        }

        let mut matched = false;
        for element in catalog.elements_of_type(type_name, row.family.as_deref()) {
            matched = true;
            let Some(ext) = element.external_id.as_deref() else {
                continue;
            };
            match index.get(ext) {
                Some(&i) => map.colors[i].1 = row.color.clone(),
                None => {
                    index.insert(ext.to_string(), map.colors.len());
                    map.colors.push((ext.to_string(), row.color.clone()));
                }
            }
        }

        if !matched {
            tracing::warn!(type_name, "no instances found for type");
            map.unmatched_types.push(type_name.to_string());
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ElementRecord;

    fn element(family: &str, type_name: &str, ext: Option<&str>) -> ElementRecord {
        ElementRecord {
            family_name: Some(family.to_string()),
            element_name: Some(type_name.to_string()),
            external_id: ext.map(str::to_string),
        }
    }

    fn row(family: Option<&str>, type_name: &str, parameter: &str, color: &str) -> AssignmentRow {
        AssignmentRow {
            family: family.map(str::to_string),
            type_name: Some(type_name.to_string()),
            parameter: Some(parameter.to_string()),
            parameter_group: None,
            parameter_value: None,
            color: Color::parse(color).unwrap(),
        }
    }

    fn visible(name: &str) -> Vec<ParameterRow> {
        vec![ParameterRow {
            name: name.to_string(),
            visualize: true,
        }]
    }

    #[test]
    fn family_restricts_matches() {
        let catalog = Catalog::new(
            "m",
            vec![element("F", "T", Some("E1")), element("G", "T", Some("E2"))],
        );
        let map = color_map(&catalog, &[row(Some("F"), "T", "P", "#ff0000")], &visible("P"));

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("E1").unwrap().as_str(), "#ff0000");
        assert!(map.get("E2").is_none());
    }

    #[test]
    fn no_family_matches_all_of_type() {
        let catalog = Catalog::new(
            "m",
            vec![
                element("F", "T", Some("E1")),
                element("G", "T", Some("E2")),
                element("G", "T", None),
            ],
        );
        let map = color_map(&catalog, &[row(None, "T", "P", "#00ff00")], &visible("P"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn hidden_parameters_are_skipped() {
        let catalog = Catalog::new("m", vec![element("F", "T", Some("E1"))]);
        let params = vec![ParameterRow {
            name: "P".into(),
            visualize: false,
        }];
        assert!(color_map(&catalog, &[row(None, "T", "P", "#00ff00")], &params).is_empty());
        assert!(color_map(&catalog, &[row(None, "T", "Q", "#00ff00")], &visible("P")).is_empty());
    }

    #[test]
    fn later_rows_overwrite_and_unmatched_reported() {
        let catalog = Catalog::new(
            "m",
            vec![element("F", "T", Some("E1")), element("F", "U", Some("E2"))],
        );
        let rows = vec![
            row(None, "T", "P", "#111111"),
            row(None, "U", "P", "#222222"),
            row(Some("F"), "T", "P", "#333333"),
            row(None, "Missing", "P", "#444444"),
        ];
        let map = color_map(&catalog, &rows, &visible("P"));

        assert_eq!(
            map.to_viewer_json(),
            serde_json::json!([{"E1": "#333333"}, {"E2": "#222222"}])
        );
        assert_eq!(map.unmatched_types, vec!["Missing"]);
    }
}
