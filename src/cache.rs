//! Catalog memoization.
//!
//! A [`CatalogCache`] holds at most one built [`Catalog`] per model key and
//! credential for its own lifetime. It is an ordinary value owned by a
//! session or by the server state rather than a process global, so its
//! scope is explicit.
//!
//! Entries are scoped to the token that built them: a caller only sees
//! catalogs its own credential fetched, so a shared server cache never
//! hands one user's model to another. Tokens are kept as SHA-256 digests.
//!
//! Entries are never refreshed automatically: a cached catalog is returned
//! even if the model has since been edited. Callers that know the model
//! changed can [`invalidate`](CatalogCache::invalidate) the key, or pass a
//! version stamp to [`get_catalog_stamped`](CatalogCache::get_catalog_stamped)
//! so a new stamp triggers a rebuild.
//!
//! Concurrent requests for the same key share one in-flight build. A failed
//! build stores nothing and the next request tries again.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::catalog::{build_catalog, Catalog};
use crate::error::Result;
use crate::query::QueryExecutor;

struct Entry {
    stamp: Option<String>,
    cell: Arc<OnceCell<Arc<Catalog>>>,
}

/// (credential digest, model key)
type EntryKey = (String, String);

/// Model key → catalog memo table, partitioned by credential.
pub struct CatalogCache {
    executor: Arc<dyn QueryExecutor>,
    page_size: usize,
    entries: Mutex<HashMap<EntryKey, Entry>>,
}

fn principal(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn entry_key(model_key: &str, token: &str) -> EntryKey {
    (principal(token), model_key.to_string())
}

impl CatalogCache {
    pub fn new(executor: Arc<dyn QueryExecutor>, page_size: usize) -> Self {
        Self {
            executor,
            page_size,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the catalog for `model_key`, building it on first use by
    /// this `token`.
    pub async fn get_catalog(
        &self,
        model_key: &str,
        token: &str,
        region: &str,
    ) -> Result<Arc<Catalog>> {
        let cell = self.cell_for(entry_key(model_key, token), None).await;
        self.fill(&cell, model_key, token, region).await
    }

    /// Like [`get_catalog`](Self::get_catalog), but rebuilds when `stamp`
    /// differs from the stamp the cached entry was built under.
    pub async fn get_catalog_stamped(
        &self,
        model_key: &str,
        stamp: &str,
        token: &str,
        region: &str,
    ) -> Result<Arc<Catalog>> {
        let cell = self.cell_for(entry_key(model_key, token), Some(stamp)).await;
        self.fill(&cell, model_key, token, region).await
    }

    /// Drops the catalog `token` cached for `model_key`. Returns whether one
    /// existed. Entries built under other credentials are untouched.
    pub async fn invalidate(&self, model_key: &str, token: &str) -> bool {
        let removed = self
            .entries
            .lock()
            .await
            .remove(&entry_key(model_key, token))
            .is_some();
        if removed {
            tracing::debug!(model_key, "catalog invalidated");
        }
        removed
    }

    /// Number of completed catalogs across all credentials.
    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn cell_for(&self, key: EntryKey, stamp: Option<&str>) -> Arc<OnceCell<Arc<Catalog>>> {
        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(entry) if stamp.is_none() || entry.stamp.as_deref() == stamp => entry.cell.clone(),
            existing => {
                if existing.is_some() {
                    tracing::debug!(model_key = %key.1, stamp = ?stamp, "catalog stamp changed, rebuilding");
                }
                let cell = Arc::new(OnceCell::new());
                entries.insert(
                    key,
                    Entry {
                        stamp: stamp.map(str::to_string),
                        cell: cell.clone(),
                    },
                );
                cell
            }
        }
    }

    async fn fill(
        &self,
        cell: &OnceCell<Arc<Catalog>>,
        model_key: &str,
        token: &str,
        region: &str,
    ) -> Result<Arc<Catalog>> {
        let catalog = cell
            .get_or_try_init(|| async {
                build_catalog(
                    self.executor.as_ref(),
                    model_key,
                    token,
                    region,
                    self.page_size,
                )
                .await
                .map(Arc::new)
            })
            .await?;
        Ok(catalog.clone())
    }
}
