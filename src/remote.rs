use std::{path::Path, time::Duration};

use reqwest::Client;
use serde::Deserialize;

use crate::error::Result;

/// Default DevDocs-compatible endpoints.
const DEFAULT_CATALOG_URL: &str = "https://devdocs.io/docs.json";
const DEFAULT_DOCS_BASE_URL: &str = "https://documents.devdocs.io";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One item of the remote catalog listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDoc {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub mtime: Option<i64>,
}

impl CatalogDoc {
    fn normalize(mut self) -> Self {
        // The catalog encodes "unversioned" as an empty string.
        if self.version.as_deref() == Some("") {
            self.version = None;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub catalog_url: String,
    pub docs_base_url: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            docs_base_url: DEFAULT_DOCS_BASE_URL.to_string(),
        }
    }
}

/// Client for the remote catalog and per-slug content host.
///
/// A failed request fails that unit of work; there is no retry or
/// backoff at this layer.
#[derive(Debug, Clone)]
pub struct DocsClient {
    http: Client,
    config: RemoteConfig,
}

impl DocsClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    /// Fetch the full catalog listing.
    pub async fn fetch_catalog(&self) -> Result<Vec<CatalogDoc>> {
        let docs: Vec<CatalogDoc> = self
            .http
            .get(&self.config.catalog_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(docs.into_iter().map(CatalogDoc::normalize).collect())
    }

    /// Download one file of a snapshot (e.g. `db.json` or `index.json`)
    /// to `dest`. Non-success statuses are errors.
    pub async fn fetch_file(
        &self,
        slug: &str,
        file: &str,
        dest: &Path,
    ) -> Result<()> {
        let url = format!("{}/{slug}/{file}", self.config.docs_base_url);
        let bytes = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
impl DocsClient {
    /// A client whose requests fail fast without leaving the machine.
    /// Used across the crate's tests to prove operations that must not
    /// touch the network.
    pub(crate) fn unroutable() -> Self {
        Self::new(RemoteConfig {
            catalog_url: "http://127.0.0.1:1/docs.json".to_string(),
            docs_base_url: "http://127.0.0.1:1".to_string(),
        })
        .unwrap()
    }
}
