use std::path::Path;

use serde::Serialize;

use crate::{
    content_cache::ContentCache,
    error::{Error, Result},
    store::{IndexStore, RelatedRow},
};

/// The rendered body of one indexed entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryBody {
    pub title: String,
    pub content: String,
    pub source_path: String,
}

/// Load the full body of an entry by its id, going through the
/// snapshot's content bundle.
pub fn load_entry_body(
    store: &IndexStore,
    cache: &mut ContentCache,
    entry_id: &str,
) -> Result<EntryBody> {
    let (entry, source) = store
        .entry_with_source(entry_id)?
        .ok_or_else(|| Error::not_found("entry", entry_id))?;

    let source_path = source
        .path
        .clone()
        .ok_or_else(|| Error::not_found("downloaded snapshot", source.id()))?;

    let bundle = cache.get_or_load(&Path::new(&source_path).join("db.json"))?;
    let content = bundle
        .get(&entry.slug)
        .cloned()
        .ok_or_else(|| Error::not_found("entry body", entry.id()))?;

    Ok(EntryBody {
        title: entry.title,
        content,
        source_path,
    })
}

/// Entries related to `entry_id`. The entry itself must exist; having
/// no related entries is an empty list, not an error.
pub fn list_related(store: &IndexStore, entry_id: &str) -> Result<Vec<RelatedRow>> {
    if store.get_entry(entry_id)?.is_none() {
        return Err(Error::not_found("entry", entry_id));
    }
    store.related_entries(entry_id)
}

/// Convenience wrapper that owns the bundle cache, for callers that do
/// repeated lookups against the same store.
pub struct DocsReader<'a> {
    store: &'a IndexStore,
    cache: ContentCache,
}

impl<'a> DocsReader<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self {
            store,
            cache: ContentCache::new(),
        }
    }

    pub fn load_entry_body(&mut self, entry_id: &str) -> Result<EntryBody> {
        load_entry_body(self.store, &mut self.cache, entry_id)
    }

    pub fn list_related(&self, entry_id: &str) -> Result<Vec<RelatedRow>> {
        list_related(self.store, entry_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocEntry, DocSource};

    fn seeded() -> (tempfile::TempDir, IndexStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::open(&tmp.path().join("index.redb")).unwrap();

        let snapshot = tmp.path().join("react~18");
        std::fs::create_dir_all(&snapshot).unwrap();
        std::fs::write(
            snapshot.join("db.json"),
            r#"{"usecontext":"<h1>useContext</h1><p>Reads context.</p>"}"#,
        )
        .unwrap();

        store
            .upsert_source(&DocSource {
                name: "react".to_string(),
                version: Some("18".to_string()),
                slug: "react~18".to_string(),
                path: Some(snapshot.to_string_lossy().into_owned()),
                release: None,
                mtime: None,
                downloaded: true,
                indexed_at: Some(1700000000),
            })
            .unwrap();

        let mut batch = store.begin_batch().unwrap();
        for (slug, title) in
            [("usecontext", "useContext"), ("createcontext", "createContext")]
        {
            batch
                .upsert_entry(&DocEntry {
                    source_id: "react@18".to_string(),
                    title: title.to_string(),
                    slug: slug.to_string(),
                    keywords: String::new(),
                    since: None,
                })
                .unwrap();
        }
        batch.commit().unwrap();
        (tmp, store)
    }

    #[test]
    fn loads_body_from_snapshot_bundle() {
        let (_tmp, store) = seeded();
        let mut reader = DocsReader::new(&store);

        let body = reader.load_entry_body("react@18:usecontext").unwrap();
        assert_eq!(body.title, "useContext");
        assert!(body.content.contains("Reads context."));
        assert!(body.source_path.ends_with("react~18"));

        // Second lookup hits the cache.
        let again = reader.load_entry_body("react@18:usecontext").unwrap();
        assert_eq!(again.content, body.content);
    }

    #[test]
    fn unknown_entry_is_not_found() {
        let (_tmp, store) = seeded();
        let mut reader = DocsReader::new(&store);

        let err = reader.load_entry_body("react@18:ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "entry", .. }));
    }

    #[test]
    fn entry_missing_from_bundle_is_not_found() {
        let (_tmp, store) = seeded();
        let mut reader = DocsReader::new(&store);

        // Indexed but absent from db.json.
        let err = reader.load_entry_body("react@18:createcontext").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "entry body", .. }));
    }

    #[test]
    fn undownloaded_source_has_no_body() {
        let (_tmp, store) = seeded();
        store
            .upsert_source(&DocSource {
                name: "vue".to_string(),
                version: Some("3".to_string()),
                slug: "vue~3".to_string(),
                path: None,
                release: None,
                mtime: None,
                downloaded: false,
                indexed_at: None,
            })
            .unwrap();
        let mut batch = store.begin_batch().unwrap();
        batch
            .upsert_entry(&DocEntry {
                source_id: "vue@3".to_string(),
                title: "ref".to_string(),
                slug: "ref".to_string(),
                keywords: String::new(),
                since: None,
            })
            .unwrap();
        batch.commit().unwrap();

        let mut reader = DocsReader::new(&store);
        let err = reader.load_entry_body("vue@3:ref").unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound { kind: "downloaded snapshot", .. }
        ));
    }

    #[test]
    fn related_entries_round_trip() {
        let (_tmp, store) = seeded();
        store
            .insert_relationship(
                "react@18:usecontext",
                "react@18:createcontext",
                "see-also",
            )
            .unwrap();

        let reader = DocsReader::new(&store);
        let related = reader.list_related("react@18:usecontext").unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].title, "createContext");

        assert!(reader.list_related("react@18:createcontext").unwrap().is_empty());
        assert!(reader.list_related("react@18:ghost").is_err());
    }
}
