//! Option lists for the presentation layer.
//!
//! These functions sit at the boundary between the core, which fails
//! loudly, and a form that must keep rendering when one field's options
//! cannot be computed. Every function here fails soft: an error is logged
//! and the affected list comes back empty. Callers that need the error use
//! [`CatalogCache`] and the [`Catalog`](crate::catalog::Catalog) views directly.

use std::collections::BTreeSet;

use crate::cache::CatalogCache;
use crate::models::{AssignmentRow, ParameterRow};

/// Sorted family names of the model, or an empty list on failure.
pub async fn family_options(
    cache: &CatalogCache,
    model_key: &str,
    token: &str,
    region: &str,
) -> Vec<String> {
    match cache.get_catalog(model_key, token, region).await {
        Ok(catalog) => catalog.distinct_families(),
        Err(e) => {
            tracing::warn!(model_key, error = %e, "family options unavailable");
            Vec::new()
        }
    }
}

/// Type options for each assignment row, in row order.
///
/// Rows without a family get an empty list. If the catalog cannot be
/// loaded every row gets an empty list.
pub async fn type_options(
    cache: &CatalogCache,
    model_key: &str,
    token: &str,
    region: &str,
    rows: &[AssignmentRow],
) -> Vec<Vec<String>> {
    if rows.iter().all(|r| r.family.is_none()) {
        return vec![Vec::new(); rows.len()];
    }

    let catalog = match cache.get_catalog(model_key, token, region).await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!(model_key, error = %e, "type options unavailable");
            return vec![Vec::new(); rows.len()];
        }
    };

    rows.iter()
        .map(|row| match row.family.as_deref() {
            Some(family) => catalog.distinct_types(family),
            None => Vec::new(),
        })
        .collect()
}

/// Sorted distinct parameter names from the parameter table.
pub fn parameter_options(parameters: &[ParameterRow]) -> Vec<String> {
    let names: BTreeSet<&str> = parameters
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| !n.is_empty())
        .collect();
    names.into_iter().map(str::to_string).collect()
}
