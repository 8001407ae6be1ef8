use std::{
    collections::HashMap,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};

use crate::{error::Result, remote::CatalogDoc};

const SOURCES: TableDefinition<&str, &str> = TableDefinition::new("doc_sources");
const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("doc_entries");
const RELATIONSHIPS: TableDefinition<&str, &str> =
    TableDefinition::new("doc_relationships");
const PROJECTS: TableDefinition<&str, &str> = TableDefinition::new("projects");
const PROJECT_DEPS: TableDefinition<&str, &str> =
    TableDefinition::new("project_dependencies");
const PREFERENCES: TableDefinition<&str, &str> =
    TableDefinition::new("project_preferences");

/// Hard cap on the number of candidate rows returned by a single
/// search scan, to bound memory on broad queries.
pub const MAX_CANDIDATES: usize = 1000;

/// Composite keys join their parts with a newline; slugs and package
/// names never contain one.
const KEY_SEP: char = '\n';

/// One documentation snapshot: a (package, resolved version) pair from
/// the remote catalog, optionally downloaded and indexed locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocSource {
    pub name: String,
    pub version: Option<String>,
    pub slug: String,
    pub path: Option<String>,
    pub release: Option<String>,
    pub mtime: Option<i64>,
    pub downloaded: bool,
    pub indexed_at: Option<i64>,
}

impl DocSource {
    pub fn id(&self) -> String {
        source_id(&self.name, self.version.as_deref())
    }
}

pub fn source_id(name: &str, version: Option<&str>) -> String {
    format!("{name}@{}", version.unwrap_or("latest"))
}

/// One indexable page/section inside a [`DocSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub source_id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub keywords: String,
    pub since: Option<String>,
}

impl DocEntry {
    pub fn id(&self) -> String {
        format!("{}:{}", self.source_id, self.slug)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub path: String,
    pub registered_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDependency {
    pub package: String,
    pub version: String,
    pub ecosystem: String,
}

/// Per-project preference row, created with defaults on first
/// registration and left untouched afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPreferences {
    pub allow_experimental: bool,
    pub preferred_sources: Option<String>,
    pub ignored_sources: Option<String>,
    pub max_search_results: u32,
}

impl Default for ProjectPreferences {
    fn default() -> Self {
        Self {
            allow_experimental: false,
            preferred_sources: None,
            ignored_sources: None,
            max_search_results: 5,
        }
    }
}

/// A search candidate: an entry row joined with its source's package
/// name and on-disk path.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub id: String,
    pub title: String,
    pub keywords: String,
    pub slug: String,
    pub package_name: String,
    pub source_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRow {
    pub id: String,
    pub title: String,
    pub relation: String,
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Durable structured storage for catalog metadata, indexed entries,
/// relationships, and project records.
///
/// Every mutation outside an [`IndexBatch`] runs in its own committed
/// write transaction and is durable immediately. Writes issued through
/// a batch are buffered and flushed once at [`IndexBatch::commit`];
/// dropping the batch without committing rolls everything back.
pub struct IndexStore {
    db: Database,
}

impl IndexStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(SOURCES)?;
        txn.open_table(ENTRIES)?;
        txn.open_table(RELATIONSHIPS)?;
        txn.open_table(PROJECTS)?;
        txn.open_table(PROJECT_DEPS)?;
        txn.open_table(PREFERENCES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn begin_batch(&self) -> Result<IndexBatch> {
        Ok(IndexBatch {
            txn: self.db.begin_write()?,
        })
    }

    // -- Sources --

    pub fn upsert_source(&self, source: &DocSource) -> Result<()> {
        let encoded = serde_json::to_string(source)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SOURCES)?;
            table.insert(source.id().as_str(), encoded.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_source(&self, id: &str) -> Result<Option<DocSource>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SOURCES)?;
        let raw = table.get(id)?.map(|v| v.value().to_string());
        raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    /// A downloaded source for an exact (package, version) pair, if one
    /// is already registered.
    pub fn downloaded_source(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Option<DocSource>> {
        Ok(self
            .get_source(&source_id(package, Some(version)))?
            .filter(|s| s.downloaded))
    }

    /// All sources whose name or slug case-insensitively equals the
    /// package name, in row-id (lexicographic) order.
    pub fn sources_for_package(&self, package: &str) -> Result<Vec<DocSource>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SOURCES)?;
        let mut result = Vec::new();
        for item in table.iter()? {
            let (_k, v) = item?;
            let source: DocSource = serde_json::from_str(v.value())?;
            if source.name.eq_ignore_ascii_case(package)
                || source.slug.eq_ignore_ascii_case(package)
            {
                result.push(source);
            }
        }
        Ok(result)
    }

    /// Upsert one placeholder source per catalog item in a single
    /// transaction. Rows already downloaded keep their path, flag, and
    /// indexed timestamp; only the catalog metadata is refreshed.
    pub fn upsert_catalog(&self, docs: &[CatalogDoc]) -> Result<usize> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SOURCES)?;
            for doc in docs {
                let id = source_id(&doc.name, doc.version.as_deref());
                let existing = table
                    .get(id.as_str())?
                    .map(|v| v.value().to_string());
                let row = match existing {
                    Some(raw) => {
                        let mut source: DocSource = serde_json::from_str(&raw)?;
                        source.slug = doc.slug.clone();
                        source.release = doc.release.clone();
                        source.mtime = doc.mtime;
                        source
                    }
                    None => DocSource {
                        name: doc.name.clone(),
                        version: doc.version.clone(),
                        slug: doc.slug.clone(),
                        path: None,
                        release: doc.release.clone(),
                        mtime: doc.mtime,
                        downloaded: false,
                        indexed_at: None,
                    },
                };
                let encoded = serde_json::to_string(&row)?;
                table.insert(id.as_str(), encoded.as_str())?;
            }
        }
        txn.commit()?;
        Ok(docs.len())
    }

    // -- Entries --

    pub fn get_entry(&self, id: &str) -> Result<Option<DocEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let raw = table.get(id)?.map(|v| v.value().to_string());
        raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    /// Point lookup of an entry together with its owning source.
    pub fn entry_with_source(
        &self,
        id: &str,
    ) -> Result<Option<(DocEntry, DocSource)>> {
        let Some(entry) = self.get_entry(id)? else {
            return Ok(None);
        };
        let source = self.get_source(&entry.source_id)?.ok_or_else(|| {
            crate::error::Error::validation(format!(
                "entry {id} references missing source {}",
                entry.source_id
            ))
        })?;
        Ok(Some((entry, source)))
    }

    /// Candidate rows for ranking: entries joined to their source,
    /// optionally restricted to a set of package names, filtered by a
    /// case-insensitive substring match on title or keywords, and
    /// capped at [`MAX_CANDIDATES`]. Row order is stable (sorted by
    /// entry id).
    pub fn search_candidates(
        &self,
        query: &str,
        packages: Option<&[String]>,
    ) -> Result<Vec<CandidateRow>> {
        let txn = self.db.begin_read()?;

        let sources = txn.open_table(SOURCES)?;
        let mut by_id: HashMap<String, DocSource> = HashMap::new();
        for item in sources.iter()? {
            let (k, v) = item?;
            by_id.insert(k.value().to_string(), serde_json::from_str(v.value())?);
        }

        let needle = query.to_lowercase();
        let entries = txn.open_table(ENTRIES)?;
        let mut result = Vec::new();
        for item in entries.iter()? {
            if result.len() >= MAX_CANDIDATES {
                break;
            }
            let (k, v) = item?;
            let entry: DocEntry = serde_json::from_str(v.value())?;
            let Some(source) = by_id.get(&entry.source_id) else {
                continue;
            };
            if let Some(packages) = packages
                && !packages.iter().any(|p| *p == source.name)
            {
                continue;
            }
            if !needle.is_empty()
                && !entry.title.to_lowercase().contains(&needle)
                && !entry.keywords.to_lowercase().contains(&needle)
            {
                continue;
            }
            result.push(CandidateRow {
                id: k.value().to_string(),
                title: entry.title,
                keywords: entry.keywords,
                slug: entry.slug,
                package_name: source.name.clone(),
                source_path: source.path.clone().unwrap_or_default(),
            });
        }
        Ok(result)
    }

    // -- Relationships --

    /// Record a directed "see also" edge. Re-inserting the same
    /// (doc, related) pair replaces the relation label.
    pub fn insert_relationship(
        &self,
        doc_id: &str,
        related_doc_id: &str,
        relation: &str,
    ) -> Result<()> {
        let key = format!("{doc_id}{KEY_SEP}{related_doc_id}");
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RELATIONSHIPS)?;
            table.insert(key.as_str(), relation)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All entries related to `doc_id`, joined to their titles. Edges
    /// whose target entry no longer exists are dropped.
    pub fn related_entries(&self, doc_id: &str) -> Result<Vec<RelatedRow>> {
        let txn = self.db.begin_read()?;
        let relationships = txn.open_table(RELATIONSHIPS)?;
        let entries = txn.open_table(ENTRIES)?;

        let prefix = format!("{doc_id}{KEY_SEP}");
        let mut result = Vec::new();
        for item in relationships.range(prefix.as_str()..)? {
            let (k, v) = item?;
            let key = k.value();
            if !key.starts_with(&prefix) {
                break;
            }
            let related_id = &key[prefix.len()..];
            let Some(raw) = entries.get(related_id)? else {
                continue;
            };
            let entry: DocEntry = serde_json::from_str(raw.value())?;
            result.push(RelatedRow {
                id: related_id.to_string(),
                title: entry.title,
                relation: v.value().to_string(),
            });
        }
        Ok(result)
    }

    // -- Projects --

    pub fn upsert_project(&self, id: &str, name: &str, path: &str) -> Result<()> {
        let project = Project {
            name: name.to_string(),
            path: path.to_string(),
            registered_at: now_secs(),
        };
        let encoded = serde_json::to_string(&project)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PROJECTS)?;
            table.insert(id, encoded.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PROJECTS)?;
        let raw = table.get(id)?.map(|v| v.value().to_string());
        raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    /// Declared dependencies of a project, in package-name order.
    pub fn project_dependencies(
        &self,
        project_id: &str,
    ) -> Result<Vec<ProjectDependency>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PROJECT_DEPS)?;
        let prefix = format!("{project_id}{KEY_SEP}");
        let mut result = Vec::new();
        for item in table.range(prefix.as_str()..)? {
            let (k, v) = item?;
            if !k.value().starts_with(&prefix) {
                break;
            }
            result.push(serde_json::from_str(v.value())?);
        }
        Ok(result)
    }

    /// Insert the default preference row if the project has none.
    pub fn ensure_preferences(&self, project_id: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PREFERENCES)?;
            let exists = table.get(project_id)?.is_some();
            if !exists {
                let encoded =
                    serde_json::to_string(&ProjectPreferences::default())?;
                table.insert(project_id, encoded.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_preferences(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectPreferences>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PREFERENCES)?;
        let raw = table.get(project_id)?.map(|v| v.value().to_string());
        raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    // -- Status --

    pub fn count_sources(&self) -> Result<(u64, u64)> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SOURCES)?;
        let total = table.len()?;
        let mut downloaded = 0;
        for item in table.iter()? {
            let (_k, v) = item?;
            let source: DocSource = serde_json::from_str(v.value())?;
            if source.downloaded {
                downloaded += 1;
            }
        }
        Ok((total, downloaded))
    }

    pub fn count_entries(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        Ok(txn.open_table(ENTRIES)?.len()?)
    }

    pub fn count_projects(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        Ok(txn.open_table(PROJECTS)?.len()?)
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore").finish_non_exhaustive()
    }
}

/// A buffered write group. Writes become visible and durable only at
/// [`commit`](Self::commit); dropping the batch rolls them back.
pub struct IndexBatch {
    txn: WriteTransaction,
}

impl IndexBatch {
    pub fn upsert_entry(&mut self, entry: &DocEntry) -> Result<()> {
        let encoded = serde_json::to_string(entry)?;
        let mut table = self.txn.open_table(ENTRIES)?;
        table.insert(entry.id().as_str(), encoded.as_str())?;
        Ok(())
    }

    /// Delete every stored dependency of a project, ahead of inserting
    /// the replacement set.
    pub fn delete_project_dependencies(&mut self, project_id: &str) -> Result<()> {
        let mut table = self.txn.open_table(PROJECT_DEPS)?;
        let prefix = format!("{project_id}{KEY_SEP}");
        let keys: Vec<String> = table
            .range(prefix.as_str()..)?
            .map(|item| item.map(|(k, _v)| k.value().to_string()))
            .collect::<std::result::Result<Vec<_>, redb::StorageError>>()?
            .into_iter()
            .take_while(|k| k.starts_with(&prefix))
            .collect();
        for key in keys {
            table.remove(key.as_str())?;
        }
        Ok(())
    }

    pub fn insert_project_dependency(
        &mut self,
        project_id: &str,
        dependency: &ProjectDependency,
    ) -> Result<()> {
        let key = format!("{project_id}{KEY_SEP}{}", dependency.package);
        let encoded = serde_json::to_string(dependency)?;
        let mut table = self.txn.open_table(PROJECT_DEPS)?;
        table.insert(key.as_str(), encoded.as_str())?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }
}
