//! docdex - a local, versioned index of third-party API documentation.
//!
//! docdex mirrors DevDocs-compatible documentation sets into a local
//! [redb](https://github.com/cberner/redb) index: it resolves requested
//! dependency versions against the remote catalog, downloads each
//! snapshot once, and serves ranked keyword search, full entry bodies,
//! and related-entry lookups over the result. Projects can register
//! their dependency manifests so searches are scoped to the packages
//! they actually use.
//!
//! # Quick start
//!
//! ```no_run
//! use docdex::{DataDir, IndexStore, search};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let store = IndexStore::open(&data_dir.index_db()).unwrap();
//!
//! let results = search::execute_search(&store, "useContext", 5, None).unwrap();
//! for r in &results {
//!     println!("{} {:.3} {}", r.id, r.score, r.title);
//! }
//! ```

pub mod cli;
pub mod content_cache;
pub mod data_dir;
pub mod docs;
pub mod error;
pub mod ingestion;
pub mod mcp;
pub mod project;
pub mod remote;
pub mod resolve;
pub mod search;
pub mod store;

pub use content_cache::ContentCache;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use ingestion::{IngestOutcome, IngestStatus, IngestionPipeline};
pub use remote::{DocsClient, RemoteConfig};
pub use resolve::VersionResolver;
pub use store::IndexStore;
