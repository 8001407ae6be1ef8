use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    content_cache::ContentCache,
    data_dir::DataDir,
    docs,
    error,
    ingestion::{IngestOutcome, IngestionPipeline},
    project,
    remote::{DocsClient, RemoteConfig},
    search::{self, DEFAULT_LIMIT, ScoredResult},
    store::IndexStore,
};

struct DocdexState {
    store: IndexStore,
    client: DocsClient,
    snapshots_dir: PathBuf,
    cache: Mutex<ContentCache>,
}

#[derive(Clone)]
pub struct DocdexMcpServer {
    state: Arc<DocdexState>,
    tool_router: ToolRouter<Self>,
}

impl DocdexMcpServer {
    fn new(state: DocdexState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl DocdexMcpServer {
    /// Resolve, download, and index documentation for dependencies.
    #[tool(
        name = "docdex_ingest",
        description = "Download and index documentation for a map of dependencies (package name to requested version). Reports a per-dependency status."
    )]
    pub async fn docdex_ingest(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let dependencies: Vec<(String, String)> =
            params.0.dependencies.into_iter().collect();

        let pipeline = IngestionPipeline::new(
            &self.state.store,
            &self.state.client,
            self.state.snapshots_dir.clone(),
        );
        let outcomes = pipeline
            .ingest(&dependencies)
            .await
            .map_err(|e| mcp_error("ingestion failed", e))?;

        let summary = format_ingest_summary(&outcomes);
        let structured = serde_json::to_value(IngestResponse { outcomes })
            .map_err(|e| mcp_error("failed to serialize outcomes", e))?;

        Ok(tool_result(summary, structured))
    }

    /// Search indexed documentation entries.
    #[tool(
        name = "docdex_search",
        description = "Search indexed documentation by keyword. Pass projectId (from docdex_project) or projectPath to scope results to a registered project's dependencies and boost its packages."
    )]
    pub async fn docdex_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let project_id = params.project_id.clone().or_else(|| {
            params
                .project_path
                .as_deref()
                .map(project::project_id_for_path)
        });

        let results = search::execute_search(
            &self.state.store,
            &params.query,
            params.limit.unwrap_or(DEFAULT_LIMIT),
            project_id.as_deref(),
        )
        .map_err(|e| mcp_error("search failed", e))?;

        let summary = format_search_summary(&results, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            result_count: results.len(),
            results,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        Ok(tool_result(summary, structured))
    }

    /// Fetch the full body of one entry.
    #[tool(
        name = "docdex_explain",
        description = "Return the full documentation body for an entry id returned by docdex_search (e.g. react@18:usecontext)."
    )]
    pub async fn docdex_explain(
        &self,
        params: Parameters<EntryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let entry_id = params.0.entry_id;
        let body = {
            let mut cache = self.state.cache.lock().map_err(|_| {
                rmcp::ErrorData::internal_error("cache lock poisoned", None)
            })?;
            docs::load_entry_body(&self.state.store, &mut cache, &entry_id)
                .map_err(|e| mcp_error("entry lookup failed", e))?
        };

        let summary = format!("# {}\n\n{}", body.title, body.content);
        let structured = serde_json::to_value(&body)
            .map_err(|e| mcp_error("failed to serialize entry", e))?;

        Ok(tool_result(summary, structured))
    }

    /// List entries related to one entry.
    #[tool(
        name = "docdex_related",
        description = "List documentation entries related to an entry id (see-also edges recorded in the index)."
    )]
    pub async fn docdex_related(
        &self,
        params: Parameters<EntryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let entry_id = params.0.entry_id;
        let related = docs::list_related(&self.state.store, &entry_id)
            .map_err(|e| mcp_error("related lookup failed", e))?;

        let summary = if related.is_empty() {
            format!("No related entries for {entry_id}")
        } else {
            let mut lines = vec![format!("Related to {entry_id}:")];
            for row in &related {
                lines.push(format!("{} ({}) {}", row.id, row.relation, row.title));
            }
            lines.join("\n")
        };
        let structured = serde_json::to_value(RelatedResponse {
            entry_id,
            related,
        })
        .map_err(|e| mcp_error("failed to serialize related entries", e))?;

        Ok(tool_result(summary, structured))
    }

    /// Register a project and its dependency manifest.
    #[tool(
        name = "docdex_project",
        description = "Register a project by name and path with its dependency map, so searches can be scoped to what the project actually uses."
    )]
    pub async fn docdex_project(
        &self,
        params: Parameters<ProjectParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let dependencies: Vec<(String, String)> = params
            .dependencies
            .unwrap_or_default()
            .into_iter()
            .collect();

        let registration = project::register_project(
            &self.state.store,
            &params.name,
            &params.path,
            &dependencies,
            params.ecosystem.as_deref(),
        )
        .map_err(|e| mcp_error("project registration failed", e))?;

        let summary = format!(
            "Registered {} ({}) with {} dependencies",
            registration.name,
            registration.project_id,
            registration.dependency_count
        );
        let structured = serde_json::to_value(&registration)
            .map_err(|e| mcp_error("failed to serialize registration", e))?;

        Ok(tool_result(summary, structured))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DocdexMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::new("docdex", env!("CARGO_PKG_VERSION"));
        server_info.title = Some("docdex MCP".to_string());
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = server_info;
        info.instructions = Some(
            "Use docdex_ingest to download documentation for dependencies, docdex_search to find entries, and docdex_explain to read one. Register projects with docdex_project so searches can be scoped with projectPath."
                .to_string(),
        );
        info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestParams {
    /// Map of package name to requested version.
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query string.
    pub query: String,
    /// Maximum number of results (default: 5).
    pub limit: Option<usize>,
    /// Id of a registered project (as returned by docdex_project).
    pub project_id: Option<String>,
    /// Path of a registered project; alternative to projectId.
    pub project_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntryParams {
    /// Entry id, e.g. react@18:usecontext.
    pub entry_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectParams {
    /// Human-readable project name.
    pub name: String,
    /// Absolute path of the project directory.
    pub path: String,
    /// Map of package name to declared version.
    pub dependencies: Option<BTreeMap<String, String>>,
    /// Ecosystem label for the dependencies (default: npm).
    pub ecosystem: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    outcomes: Vec<IngestOutcome>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    result_count: usize,
    results: Vec<ScoredResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelatedResponse {
    entry_id: String,
    related: Vec<crate::store::RelatedRow>,
}

fn tool_result(summary: String, structured: serde_json::Value) -> CallToolResult {
    let mut result = CallToolResult::success(vec![Content::text(summary)]);
    result.structured_content = Some(structured);
    result
}

fn format_ingest_summary(outcomes: &[IngestOutcome]) -> String {
    let mut lines = Vec::with_capacity(outcomes.len());
    for o in outcomes {
        let mut line = format!(
            "{}@{}: {}",
            o.package,
            o.requested_version,
            match o.status {
                crate::ingestion::IngestStatus::AlreadyDownloaded => {
                    "already downloaded"
                }
                crate::ingestion::IngestStatus::Downloaded => "downloaded",
                crate::ingestion::IngestStatus::NotFound => "not found",
                crate::ingestion::IngestStatus::Failed => "failed",
            }
        );
        if let Some(caveat) = &o.caveat {
            line.push_str(&format!(" ({caveat})"));
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn format_search_summary(results: &[ScoredResult], query: &str) -> String {
    if results.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} result{} for \"{query}\":",
        results.len(),
        suffix
    ));
    for r in results {
        lines.push(format!("{} {:.3} {}", r.id, r.score, r.title));
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(data_dir: DataDir) -> error::Result<()> {
    let store = IndexStore::open(&data_dir.index_db())?;
    let client = DocsClient::new(RemoteConfig::default())?;
    let snapshots_dir = data_dir.snapshots_dir()?;

    let state = DocdexState {
        store,
        client,
        snapshots_dir,
        cache: Mutex::new(ContentCache::new()),
    };

    let server = DocdexMcpServer::new(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
