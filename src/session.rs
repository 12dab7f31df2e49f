//! Per-user context.
//!
//! A [`Session`] owns what one user's interactions share: the loaded
//! config, the bearer token, the data region and a handle to the catalog
//! cache. The CLI builds one session per invocation. The server builds one
//! per request from the request headers, all sharing a single cache.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::activity::{resolve_for_manifest, resolve_for_urn, ActivitySignature, ActivityTable};
use crate::cache::CatalogCache;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::engine::HttpExecutionEngine;
use crate::error::Result;
use crate::models::{AssignmentRow, ParameterRow};
use crate::options;
use crate::query::HttpQueryExecutor;
use crate::sheet::load_sheet;
use crate::visualize::{color_map, ColorMap};

pub struct Session {
    config: Arc<Config>,
    token: String,
    region: String,
    cache: Arc<CatalogCache>,
}

/// Builds a catalog cache backed by the configured GraphQL endpoint.
pub fn new_cache(config: &Config) -> Result<Arc<CatalogCache>> {
    let executor = HttpQueryExecutor::from_config(&config.query)?;
    Ok(Arc::new(CatalogCache::new(
        Arc::new(executor),
        config.query.page_size,
    )))
}

impl Session {
    pub fn new(
        config: Arc<Config>,
        token: impl Into<String>,
        region: impl Into<String>,
        cache: Arc<CatalogCache>,
    ) -> Self {
        Self {
            config,
            token: token.into(),
            region: region.into(),
            cache,
        }
    }

    /// Session for the CLI: token from the environment, region from config
    /// and a fresh cache.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let token = config.auth.token()?;
        let region = config.query.region.clone();
        let cache = new_cache(&config).context("Failed to create GraphQL client")?;
        Ok(Self::new(Arc::new(config), token, region, cache))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    pub async fn catalog(&self, model_key: &str) -> Result<Arc<Catalog>> {
        self.cache
            .get_catalog(model_key, &self.token, &self.region)
            .await
    }

    /// Drops this session's cached catalog for `model_key`.
    pub async fn invalidate(&self, model_key: &str) -> bool {
        self.cache.invalidate(model_key, &self.token).await
    }

    pub async fn family_options(&self, model_key: &str) -> Vec<String> {
        options::family_options(&self.cache, model_key, &self.token, &self.region).await
    }

    pub async fn type_options(&self, model_key: &str, rows: &[AssignmentRow]) -> Vec<Vec<String>> {
        options::type_options(&self.cache, model_key, &self.token, &self.region, rows).await
    }

    pub async fn color_map(
        &self,
        model_key: &str,
        rows: &[AssignmentRow],
        parameters: &[ParameterRow],
    ) -> Result<ColorMap> {
        let catalog = self.catalog(model_key).await?;
        Ok(color_map(&catalog, rows, parameters))
    }

    pub fn activity_table(&self) -> ActivityTable {
        ActivityTable::from_config(&self.config.automation)
    }

    /// Picks the activity for a job.
    ///
    /// An explicit `version` wins, then the version recorded in `manifest`,
    /// then the manifest fetched for `urn`. Without any of them the default
    /// version is used.
    pub async fn resolve_activity(
        &self,
        version: Option<&str>,
        manifest: Option<&serde_json::Value>,
        urn: Option<&str>,
    ) -> Result<ActivitySignature> {
        let table = self.activity_table();
        match (version, manifest, urn) {
            (Some(version), _, _) => table.resolve(Some(version)),
            (None, Some(manifest), _) => resolve_for_manifest(&table, Some(manifest)),
            (None, None, Some(urn)) => {
                resolve_for_urn(
                    &table,
                    &self.config.automation.derivative_base_url,
                    urn,
                    &self.token,
                    self.timeout(),
                )
                .await
            }
            (None, None, None) => resolve_for_manifest(&table, None),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.query.timeout_secs)
    }

    /// HTTP execution engine authenticated with this session's token.
    pub fn engine(&self) -> Result<HttpExecutionEngine> {
        HttpExecutionEngine::from_config(&self.config.automation, &self.token, self.timeout())
    }
}

/// CLI: print the model's family names, one per line.
pub async fn run_families(session: &Session, model_key: &str) -> anyhow::Result<()> {
    let catalog = session
        .catalog(model_key)
        .await
        .with_context(|| format!("Failed to load catalog for {}", model_key))?;
    for family in catalog.distinct_families() {
        println!("{}", family);
    }
    Ok(())
}

/// CLI: print the type names of `family`, one per line.
pub async fn run_types(session: &Session, model_key: &str, family: &str) -> anyhow::Result<()> {
    let catalog = session
        .catalog(model_key)
        .await
        .with_context(|| format!("Failed to load catalog for {}", model_key))?;
    let types = catalog.distinct_types(family);
    if types.is_empty() {
        eprintln!("No types found for family '{}'", family);
    }
    for type_name in types {
        println!("{}", type_name);
    }
    Ok(())
}

/// CLI: print the viewer color payload for a sheet.
pub async fn run_colors(
    session: &Session,
    model_key: &str,
    sheet_path: &std::path::Path,
) -> anyhow::Result<()> {
    let sheet = load_sheet(sheet_path)?;
    let map = session
        .color_map(model_key, &sheet.assignments, &sheet.parameters)
        .await
        .with_context(|| format!("Failed to load catalog for {}", model_key))?;
    for type_name in &map.unmatched_types {
        eprintln!("warning: no instances found for type '{}'", type_name);
    }
    println!("{}", serde_json::to_string_pretty(&map.to_viewer_json())?);
    Ok(())
}
