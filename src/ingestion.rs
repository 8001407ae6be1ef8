use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    remote::DocsClient,
    resolve::VersionResolver,
    store::{DocEntry, DocSource, IndexStore, now_secs},
};

/// Per-dependency terminal state of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    AlreadyDownloaded,
    Downloaded,
    NotFound,
    Failed,
}

/// What happened to one requested (package, version) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub package: String,
    pub requested_version: String,
    pub resolved_version: Option<String>,
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caveat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolves, downloads, and indexes documentation snapshots for a list
/// of dependencies. Each dependency is processed independently: one
/// failing download never aborts the rest of the run.
pub struct IngestionPipeline<'a> {
    store: &'a IndexStore,
    client: &'a DocsClient,
    snapshots_dir: PathBuf,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(
        store: &'a IndexStore,
        client: &'a DocsClient,
        snapshots_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            client,
            snapshots_dir,
        }
    }

    /// Ingest every dependency in order. Blank package names or
    /// versions reject the whole request before any network or disk
    /// work starts.
    pub async fn ingest(
        &self,
        dependencies: &[(String, String)],
    ) -> Result<Vec<IngestOutcome>> {
        if dependencies.is_empty() {
            return Err(Error::validation(
                "at least one dependency is required",
            ));
        }
        for (package, version) in dependencies {
            if package.trim().is_empty() || version.trim().is_empty() {
                return Err(Error::validation(
                    "each dependency needs a package name and a version",
                ));
            }
        }

        let resolver = VersionResolver::new(self.store, self.client);
        let mut outcomes = Vec::with_capacity(dependencies.len());
        for (package, version) in dependencies {
            outcomes.push(self.ingest_one(&resolver, package, version).await?);
        }
        Ok(outcomes)
    }

    async fn ingest_one(
        &self,
        resolver: &VersionResolver<'_>,
        package: &str,
        requested: &str,
    ) -> Result<IngestOutcome> {
        // Exact (package, version) snapshots that are already on disk
        // short-circuit before any resolution or network traffic.
        if self.store.downloaded_source(package, requested)?.is_some() {
            return Ok(outcome(
                package,
                requested,
                Some(requested.to_string()),
                IngestStatus::AlreadyDownloaded,
                None,
                None,
            ));
        }

        let Some(resolution) = resolver.resolve(package, requested).await?
        else {
            return Ok(outcome(
                package,
                requested,
                None,
                IngestStatus::NotFound,
                None,
                None,
            ));
        };

        let caveat = (!resolution.is_exact).then(|| {
            format!(
                "exact version {requested} not available; using {}",
                resolution.version
            )
        });

        let Some(mut source) = self
            .store
            .sources_for_package(package)?
            .into_iter()
            .find(|s| s.slug == resolution.slug)
        else {
            return Ok(outcome(
                package,
                requested,
                None,
                IngestStatus::NotFound,
                None,
                None,
            ));
        };

        if source.downloaded {
            return Ok(outcome(
                package,
                requested,
                Some(resolution.version),
                IngestStatus::AlreadyDownloaded,
                caveat,
                None,
            ));
        }

        let dir = self.snapshots_dir.join(&resolution.slug);
        let entries = match self.acquire(&resolution.slug, &dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("download of {package}@{requested} failed: {e}");
                return Ok(outcome(
                    package,
                    requested,
                    Some(resolution.version),
                    IngestStatus::Failed,
                    caveat,
                    Some(e.to_string()),
                ));
            }
        };

        // The source row flips to downloaded in its own durable write
        // before any entry is indexed. A failed entry batch rolls back
        // to a downloaded snapshot with zero entries, never to a
        // half-indexed one.
        source.downloaded = true;
        source.path = Some(dir.to_string_lossy().into_owned());
        self.store.upsert_source(&source)?;

        match self.index_entries(&source, &entries) {
            Ok(count) => {
                source.indexed_at = Some(now_secs());
                self.store.upsert_source(&source)?;
                info!("indexed {count} entries for {}", source.id());
            }
            Err(e) => {
                warn!(
                    "indexing {} failed: {e}; snapshot kept without entries",
                    source.id()
                );
            }
        }

        Ok(outcome(
            package,
            requested,
            Some(resolution.version),
            IngestStatus::Downloaded,
            caveat,
            None,
        ))
    }

    /// Download the snapshot files that are not on disk yet, then read
    /// the entry listing. Files already present are never re-fetched,
    /// and the listing derived from `index.json` is persisted as
    /// `entries.json` once so later runs skip the manifest entirely.
    async fn acquire(&self, slug: &str, dir: &Path) -> Result<Vec<RawEntry>> {
        tokio::fs::create_dir_all(dir).await?;
        for file in ["db.json", "index.json"] {
            let dest = dir.join(file);
            if !dest.exists() {
                self.client.fetch_file(slug, file, &dest).await?;
            }
        }

        let derived = dir.join("entries.json");
        if !derived.exists() {
            let raw = tokio::fs::read_to_string(dir.join("index.json")).await?;
            let index: IndexFile = serde_json::from_str(&raw)?;
            let encoded = serde_json::to_string(&index.entries)?;
            tokio::fs::write(&derived, encoded).await?;
        }

        let raw = tokio::fs::read_to_string(&derived).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write all well-formed entries in one batch. Entries without a
    /// usable slug and title are skipped, not errors.
    fn index_entries(
        &self,
        source: &DocSource,
        raw: &[RawEntry],
    ) -> Result<usize> {
        let source_id = source.id();
        let mut batch = self.store.begin_batch()?;
        let mut count = 0;
        for entry in raw {
            if let Some(entry) = entry.to_entry(&source_id) {
                batch.upsert_entry(&entry)?;
                count += 1;
            }
        }
        batch.commit()?;
        Ok(count)
    }
}

fn outcome(
    package: &str,
    requested: &str,
    resolved: Option<String>,
    status: IngestStatus,
    caveat: Option<String>,
    error: Option<String>,
) -> IngestOutcome {
    IngestOutcome {
        package: package.to_string(),
        requested_version: requested.to_string(),
        resolved_version: resolved,
        status,
        caveat,
        error,
    }
}

#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    #[serde(default)]
    entries: Vec<RawEntry>,
}

/// One entry of a snapshot's `index.json`, tolerant of the field
/// variations seen in the wild: `slug` or `path`, `title` or `name`,
/// keywords as a string or an array.
#[derive(Debug, Serialize, Deserialize)]
struct RawEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    keywords: Option<serde_json::Value>,
    #[serde(default)]
    since: Option<String>,
}

impl RawEntry {
    fn to_entry(&self, source_id: &str) -> Option<DocEntry> {
        let title = self.title.as_deref().or(self.name.as_deref())?.trim();
        let slug = self.slug.as_deref().or(self.path.as_deref())?.trim();
        if title.is_empty() || slug.is_empty() {
            return None;
        }
        Some(DocEntry {
            source_id: source_id.to_string(),
            title: title.to_string(),
            slug: slug.to_string(),
            keywords: flatten_keywords(self.keywords.as_ref()),
            since: self.since.clone(),
        })
    }
}

fn flatten_keywords(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}
