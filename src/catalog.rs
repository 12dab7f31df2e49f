//! Element catalog construction.
//!
//! Walks the Data Exchange `elements` connection page by page, following
//! the opaque pagination cursor, and materializes every element of a model
//! as an [`ElementRecord`] carrying its family name, type (element) name and
//! external identifier.
//!
//! # Pagination
//!
//! The loop stops when the server returns an empty or missing cursor, a
//! page with no results, or the same cursor that was just sent. The last
//! case guards against a server that fails to advance. There is no page
//! limit; any page failure aborts the whole build and no partial catalog is
//! returned.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::models::ElementRecord;
use crate::query::QueryExecutor;

/// Property holding an element's family name.
pub const FAMILY_NAME_PROPERTY: &str = "Family Name";
/// Property holding an element's type name.
pub const ELEMENT_NAME_PROPERTY: &str = "Element Name";

/// Elements of one exchange with their family/type properties and external ids.
pub const ELEMENTS_QUERY: &str = r#"
query ElementsWithProps($exchangeId: ID!, $pagination: PaginationInput) {
    exchange(exchangeId: $exchangeId) {
        elements(pagination: $pagination) {
            pagination {
                cursor
                pageSize
            }
            results {
                id
                properties(filter: { names: ["Family Name", "Element Name"] }) {
                    results {
                        name
                        value
                    }
                }
                alternativeIdentifiers {
                    externalElementId
                }
            }
        }
    }
}
"#;

/// All elements of one model snapshot, in fetch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    model_key: String,
    elements: Vec<ElementRecord>,
}

impl Catalog {
    pub fn new(model_key: impl Into<String>, elements: Vec<ElementRecord>) -> Self {
        Self {
            model_key: model_key.into(),
            elements,
        }
    }

    pub fn model_key(&self) -> &str {
        &self.model_key
    }

    pub fn elements(&self) -> &[ElementRecord] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Sorted distinct family names.
    pub fn distinct_families(&self) -> Vec<String> {
        let families: BTreeSet<&str> = self
            .elements
            .iter()
            .filter_map(|e| e.family_name.as_deref())
            .filter(|f| !f.is_empty())
            .collect();
        families.into_iter().map(str::to_string).collect()
    }

    /// Sorted distinct type names of elements whose family matches exactly.
    pub fn distinct_types(&self, family_name: &str) -> Vec<String> {
        let types: BTreeSet<&str> = self
            .elements
            .iter()
            .filter(|e| e.family_name.as_deref() == Some(family_name))
            .filter_map(|e| e.element_name.as_deref())
            .filter(|t| !t.is_empty())
            .collect();
        types.into_iter().map(str::to_string).collect()
    }

    /// Elements with the given type name, restricted to `family` when given.
    pub fn elements_of_type<'a>(
        &'a self,
        type_name: &'a str,
        family: Option<&'a str>,
    ) -> impl Iterator<Item = &'a ElementRecord> + 'a {
        self.elements.iter().filter(move |e| {
            e.element_name.as_deref() == Some(type_name)
                && family.map_or(true, |f| e.family_name.as_deref() == Some(f))
        })
    }
}

/// Fetches every element of `model_key`, following the pagination cursor.
///
/// # Errors
///
/// Propagates the first transport, remote-query or decoding error from any
/// page; nothing fetched before the failure is returned.
pub async fn build_catalog(
    executor: &dyn QueryExecutor,
    model_key: &str,
    token: &str,
    region: &str,
    page_size: usize,
) -> Result<Catalog> {
    let mut elements = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page = 1usize;

    loop {
        tracing::debug!(model_key, page, "fetching elements page");
        let variables = serde_json::json!({
            "exchangeId": model_key,
            "pagination": { "limit": page_size, "cursor": cursor },
        });

        let data = executor
            .execute(ELEMENTS_QUERY, variables, token, region)
            .await?;
        let parsed = parse_page(data)?;

        let result_count = parsed.elements.len();
        elements.extend(parsed.elements);
        if result_count == 0 {
            break;
        }

        match parsed.next_cursor {
            Some(next) if !next.is_empty() => {
                if cursor.as_deref() == Some(next.as_str()) {
                    tracing::warn!(model_key, page, cursor = %next, "pagination cursor did not advance");
                    break;
                }
                cursor = Some(next);
            }
            _ => break,
        }
        page += 1;
    }

    tracing::info!(model_key, pages = page, elements = elements.len(), "catalog built");
    Ok(Catalog::new(model_key, elements))
}

// ============ Page decoding ============

/// One decoded page: its elements and the cursor for the next request.
struct Page {
    elements: Vec<ElementRecord>,
    next_cursor: Option<String>,
}

#[derive(Deserialize, Default)]
struct PageData {
    #[serde(default)]
    exchange: Option<ExchangeBlock>,
}

#[derive(Deserialize, Default)]
struct ExchangeBlock {
    #[serde(default)]
    elements: Option<ElementsBlock>,
}

#[derive(Deserialize, Default)]
struct ElementsBlock {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    results: Option<Vec<ElementNode>>,
}

#[derive(Deserialize, Default)]
struct Pagination {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct ElementNode {
    #[serde(default)]
    properties: Option<PropertyResults>,
    #[serde(default, rename = "alternativeIdentifiers")]
    alternative_identifiers: Option<AlternativeIdentifiers>,
}

#[derive(Deserialize)]
struct PropertyResults {
    #[serde(default)]
    results: Option<Vec<Property>>,
}

#[derive(Deserialize)]
struct Property {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<Value>,
}

/// The API returns a single identifier object; older schemas return a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum AlternativeIdentifiers {
    Many(Vec<AlternativeIdentifier>),
    One(AlternativeIdentifier),
}

#[derive(Deserialize)]
struct AlternativeIdentifier {
    #[serde(default, rename = "externalElementId")]
    external_element_id: Option<Value>,
}

fn parse_page(data: Value) -> Result<Page> {
    let data: PageData = serde_json::from_value(data)?;
    let block = data.exchange.and_then(|e| e.elements).unwrap_or_default();

    let elements = block
        .results
        .unwrap_or_default()
        .into_iter()
        .map(element_record)
        .collect();

    Ok(Page {
        elements,
        next_cursor: block.pagination.and_then(|p| p.cursor),
    })
}

fn element_record(node: ElementNode) -> ElementRecord {
    let mut family_name = None;
    let mut element_name = None;
    for prop in node.properties.and_then(|p| p.results).unwrap_or_default() {
        let value = prop.value.and_then(value_to_string);
        match prop.name.as_deref() {
            Some(FAMILY_NAME_PROPERTY) => family_name = value,
            Some(ELEMENT_NAME_PROPERTY) => element_name = value,
            _ => {}
        }
    }

    let identifiers = match node.alternative_identifiers {
        Some(AlternativeIdentifiers::Many(ids)) => ids,
        Some(AlternativeIdentifiers::One(id)) => vec![id],
        None => Vec::new(),
    };
    let external_id = identifiers
        .into_iter()
        .filter_map(|id| id.external_element_id.and_then(value_to_string))
        .find(|id| !id.is_empty());

    ElementRecord {
        family_name,
        element_name,
        external_id,
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::error::{Error, Result};
    use crate::query::QueryExecutor;

    /// Executor that replays canned responses and records every call.
    pub struct ScriptedExecutor {
        responses: Mutex<VecDeque<Result<Value>>>,
        calls: AtomicUsize,
        variables: Mutex<Vec<Value>>,
    }

    impl ScriptedExecutor {
        pub fn new(responses: Vec<Result<Value>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                variables: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn sent_variables(&self) -> Vec<Value> {
            self.variables.lock().unwrap().clone()
        }

        pub fn sent_cursors(&self) -> Vec<Value> {
            self.variables
                .lock()
                .unwrap()
                .iter()
                .map(|v| v["pagination"]["cursor"].clone())
                .collect()
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _query: &str,
            variables: Value,
            _token: &str,
            _region: &str,
        ) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.variables.lock().unwrap().push(variables);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("no scripted response left".into())))
        }
    }

    /// A page with elements `(family, type, external id)` and a next cursor.
    pub fn page(elements: &[(&str, &str, &str)], cursor: Option<&str>) -> Value {
        let results: Vec<Value> = elements
            .iter()
            .map(|(family, type_name, ext)| {
                json!({
                    "id": format!("el-{}", ext),
                    "properties": { "results": [
                        { "name": "Family Name", "value": family },
                        { "name": "Element Name", "value": type_name },
                    ]},
                    "alternativeIdentifiers": { "externalElementId": ext },
                })
            })
            .collect();
        json!({
            "exchange": { "elements": {
                "pagination": { "cursor": cursor, "pageSize": 200 },
                "results": results,
            }}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{page, ScriptedExecutor};
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[tokio::test]
    async fn follows_cursor_until_empty() {
        let executor = ScriptedExecutor::new(vec![
            Ok(page(&[("Wall", "W1", "e1")], Some("c1"))),
            Ok(page(&[("Wall", "W2", "e2")], Some("c2"))),
            Ok(page(&[("Door", "D1", "e3")], None)),
        ]);

        let catalog = build_catalog(&executor, "model", "tok", "US", 200)
            .await
            .unwrap();

        assert_eq!(executor.calls(), 3);
        assert_eq!(
            executor.sent_cursors(),
            vec![Value::Null, json!("c1"), json!("c2")]
        );
        let ids: Vec<_> = catalog
            .elements()
            .iter()
            .map(|e| e.external_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
    }

    #[tokio::test]
    async fn empty_string_cursor_terminates() {
        let executor = ScriptedExecutor::new(vec![
            Ok(page(&[("Wall", "W1", "e1")], Some("c1"))),
            Ok(page(&[("Wall", "W2", "e2")], Some(""))),
        ]);
        let catalog = build_catalog(&executor, "model", "tok", "US", 200)
            .await
            .unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn repeated_cursor_breaks_cycle() {
        let executor = ScriptedExecutor::new(vec![
            Ok(page(&[("Wall", "W1", "e1")], Some("c1"))),
            Ok(page(&[("Wall", "W2", "e2")], Some("c1"))),
            Ok(page(&[("Wall", "W3", "e3")], None)),
        ]);
        let catalog = build_catalog(&executor, "model", "tok", "US", 200)
            .await
            .unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn zero_results_page_terminates() {
        let executor = ScriptedExecutor::new(vec![
            Ok(page(&[("Wall", "W1", "e1")], Some("c1"))),
            Ok(page(&[], Some("c2"))),
        ]);
        let catalog = build_catalog(&executor, "model", "tok", "US", 200)
            .await
            .unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn page_failure_aborts_build() {
        let executor = ScriptedExecutor::new(vec![
            Ok(page(&[("Wall", "W1", "e1")], Some("c1"))),
            Err(Error::RemoteQuery("bad cursor".into())),
        ]);
        let err = build_catalog(&executor, "model", "tok", "US", 200)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteQuery(_)));
    }

    #[tokio::test]
    async fn sends_model_key_and_page_size() {
        let executor = ScriptedExecutor::new(vec![Ok(page(&[], None))]);
        build_catalog(&executor, "ZXhjaA==", "tok", "EMEA", 50)
            .await
            .unwrap();
        let vars = executor.sent_variables()[0].clone();
        assert_eq!(vars["exchangeId"], "ZXhjaA==");
        assert_eq!(vars["pagination"]["limit"], 50);
    }

    #[test]
    fn parses_list_identifiers_and_non_string_values() {
        let data = json!({
            "exchange": { "elements": {
                "pagination": { "cursor": null },
                "results": [{
                    "id": "1",
                    "properties": { "results": [
                        { "name": "Family Name", "value": 42 },
                        { "name": "Element Name", "value": null },
                        { "name": "Other", "value": "x" },
                    ]},
                    "alternativeIdentifiers": [
                        { "externalElementId": "" },
                        { "externalElementId": "ext-2" },
                    ],
                }, {
                    "id": "2",
                }],
            }}
        });
        let page = parse_page(data).unwrap();
        assert_eq!(page.next_cursor, None);
        assert_eq!(
            page.elements[0],
            ElementRecord {
                family_name: Some("42".into()),
                element_name: None,
                external_id: Some("ext-2".into()),
            }
        );
        assert_eq!(
            page.elements[1],
            ElementRecord {
                family_name: None,
                element_name: None,
                external_id: None,
            }
        );
    }

    #[test]
    fn missing_exchange_is_empty_page() {
        let page = parse_page(json!({})).unwrap();
        assert!(page.elements.is_empty());
        assert!(page.next_cursor.is_none());
    }

    fn sample_catalog() -> Catalog {
        let record = |f: Option<&str>, t: Option<&str>, e: Option<&str>| ElementRecord {
            family_name: f.map(str::to_string),
            element_name: t.map(str::to_string),
            external_id: e.map(str::to_string),
        };
        Catalog::new(
            "model",
            vec![
                record(Some("Wall"), Some("W2"), Some("e1")),
                record(Some("Wall"), Some("W1"), None),
                record(Some("Door"), Some("D1"), Some("e3")),
                record(Some("wall"), Some("W9"), Some("e4")),
                record(None, Some("W1"), Some("e5")),
                record(Some("Wall"), Some("W2"), Some("e6")),
            ],
        )
    }

    #[test]
    fn distinct_families_sorted() {
        assert_eq!(
            sample_catalog().distinct_families(),
            vec!["Door", "Wall", "wall"]
        );
    }

    #[test]
    fn distinct_types_exact_family_match() {
        let catalog = sample_catalog();
        assert_eq!(catalog.distinct_types("Wall"), vec!["W1", "W2"]);
        assert_eq!(catalog.distinct_types("wall"), vec!["W9"]);
        assert!(catalog.distinct_types("Window").is_empty());
    }

    #[test]
    fn elements_of_type_with_and_without_family() {
        let catalog = sample_catalog();
        assert_eq!(catalog.elements_of_type("W1", None).count(), 2);
        assert_eq!(catalog.elements_of_type("W1", Some("Wall")).count(), 1);
        assert_eq!(catalog.elements_of_type("W2", Some("Wall")).count(), 2);
    }
}
