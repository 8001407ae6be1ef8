use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::error::{Error, Result};

/// How many parsed content bundles are kept in memory at once.
const DEFAULT_CAPACITY: usize = 3;

/// A bounded cache of parsed content bundles, keyed by bundle file
/// path. Each bundle is a snapshot's monolithic `db.json`: a mapping
/// from entry slug to rendered body.
///
/// Eviction is first-in-first-out by insertion order — a hit does not
/// refresh an entry's position. The queue makes the "oldest" element
/// explicit instead of leaning on a map's iteration order.
pub struct ContentCache {
    capacity: usize,
    order: VecDeque<PathBuf>,
    bundles: HashMap<PathBuf, Arc<HashMap<String, String>>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            bundles: HashMap::new(),
        }
    }

    /// Return the parsed bundle at `path`, loading and parsing it on
    /// first access. A missing file is a NotFound for the caller, not
    /// a cache event.
    pub fn get_or_load(
        &mut self,
        path: &Path,
    ) -> Result<Arc<HashMap<String, String>>> {
        if let Some(bundle) = self.bundles.get(path) {
            return Ok(Arc::clone(bundle));
        }

        if !path.exists() {
            return Err(Error::not_found(
                "content bundle",
                path.display().to_string(),
            ));
        }

        debug!("parsing content bundle {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let bundle: Arc<HashMap<String, String>> =
            Arc::new(serde_json::from_str(&raw)?);

        self.bundles.insert(path.to_path_buf(), Arc::clone(&bundle));
        self.order.push_back(path.to_path_buf());
        if self.order.len() > self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.bundles.remove(&oldest);
        }

        Ok(bundle)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    #[cfg(test)]
    fn contains(&self, path: &Path) -> bool {
        self.bundles.contains_key(path)
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new()
    }
}
