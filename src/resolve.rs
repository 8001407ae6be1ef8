use tracing::{info, warn};

use crate::{
    error::Result,
    remote::DocsClient,
    store::{DocSource, IndexStore},
};

/// The outcome of mapping a requested version onto an available
/// snapshot version.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub version: String,
    pub slug: String,
    pub is_exact: bool,
}

/// Picks which available documentation version to use for a requested
/// package+version, refreshing the local catalog once when nothing is
/// known about the package.
pub struct VersionResolver<'a> {
    store: &'a IndexStore,
    client: &'a DocsClient,
}

impl<'a> VersionResolver<'a> {
    pub fn new(store: &'a IndexStore, client: &'a DocsClient) -> Self {
        Self { store, client }
    }

    /// Three-tier policy: exact match on version or release label,
    /// then stored-version-is-prefix-of-requested, then the
    /// unversioned candidate (or the first in row order) as fallback.
    /// All comparisons are case-insensitive; no semantic-version
    /// ordering is attempted.
    pub async fn resolve(
        &self,
        package: &str,
        requested: &str,
    ) -> Result<Option<Resolution>> {
        let mut candidates = self.store.sources_for_package(package)?;

        if candidates.is_empty() {
            self.sync_catalog_best_effort().await;
            candidates = self.store.sources_for_package(package)?;
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let target = requested.to_lowercase();

        // Tier 1: exact version or release label.
        if let Some(exact) = candidates.iter().find(|c| {
            c.version
                .as_deref()
                .is_some_and(|v| v.to_lowercase() == target)
                || c.release
                    .as_deref()
                    .is_some_and(|r| r.to_lowercase() == target)
        }) {
            return Ok(Some(resolution(exact, true)));
        }

        // Tier 2: stored version is a prefix of the requested one
        // (requested "20.1.4" matches stored "20").
        if let Some(prefix) = candidates.iter().find(|c| {
            c.version
                .as_deref()
                .is_some_and(|v| target.starts_with(&v.to_lowercase()))
        }) {
            return Ok(Some(resolution(prefix, false)));
        }

        // Tier 3: the unversioned candidate if there is one, else the
        // first in row order.
        let fallback = candidates
            .iter()
            .find(|c| c.version.is_none())
            .unwrap_or(&candidates[0]);
        Ok(Some(resolution(fallback, false)))
    }

    /// Refresh the local catalog from the remote listing. Failures are
    /// logged and swallowed; resolution proceeds with whatever is
    /// already indexed.
    async fn sync_catalog_best_effort(&self) {
        if let Err(e) = self.sync_catalog().await {
            warn!("catalog sync failed: {e}");
        }
    }

    pub async fn sync_catalog(&self) -> Result<usize> {
        let docs = self.client.fetch_catalog().await?;
        let count = self.store.upsert_catalog(&docs)?;
        info!("synced {count} documentation sets from the catalog");
        Ok(count)
    }
}

fn resolution(source: &DocSource, is_exact: bool) -> Resolution {
    Resolution {
        version: source
            .version
            .clone()
            .unwrap_or_else(|| "latest".to_string()),
        slug: source.slug.clone(),
        is_exact,
    }
}
