use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::error::{Error, Result};

#[derive(Debug, Parser)]
#[command(
    name = "docdex",
    about = "A local, versioned index of third-party API documentation"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download and index documentation for dependencies
    Ingest(IngestArgs),
    /// Search indexed documentation
    Search(SearchArgs),
    /// Print the full body of an indexed entry
    Show(ShowArgs),
    /// List entries related to an indexed entry
    Related(RelatedArgs),
    /// Manage registered projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Refresh the local copy of the remote catalog
    Sync,
    /// Show index statistics
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Dependencies as package@version pairs (e.g. react@18.2.0)
    #[arg(required = true)]
    pub dependencies: Vec<String>,

    /// Output outcomes as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "5")]
    pub limit: usize,

    /// Scope and boost results using a registered project's path
    #[arg(short = 'p', long)]
    pub project: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Show --

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Entry id (e.g. react@18:usecontext)
    pub entry_id: String,

    /// Output as JSON with metadata
    #[arg(long)]
    pub json: bool,
}

// -- Related --

#[derive(Debug, Parser)]
pub struct RelatedArgs {
    /// Entry id (e.g. react@18:usecontext)
    pub entry_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Project subcommands --

#[derive(Debug, Subcommand)]
pub enum ProjectAction {
    /// Register a project and its dependency manifest
    Register {
        /// Path to the project directory
        path: PathBuf,
        /// Human-readable project name
        #[arg(long)]
        name: String,
        /// Dependencies as package@version pairs (repeatable)
        #[arg(short = 'd', long = "dep")]
        deps: Vec<String>,
        /// Ecosystem label for the dependencies
        #[arg(long, default_value = "npm")]
        ecosystem: String,
    },
    /// Show a registered project and its dependencies
    Show {
        /// Path the project was registered under
        path: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docdex",
            &mut std::io::stdout(),
        );
    }
}

/// Split a `package@version` argument. The split is on the last `@` so
/// scoped npm names like `@types/node@20.1.4` parse correctly.
pub fn parse_dependency(spec: &str) -> Result<(String, String)> {
    match spec.rsplit_once('@') {
        Some((package, version)) if !package.is_empty() && !version.is_empty() => {
            Ok((package.to_string(), version.to_string()))
        }
        _ => Err(Error::validation(format!(
            "expected package@version, got {spec:?}"
        ))),
    }
}

pub fn parse_dependencies(specs: &[String]) -> Result<Vec<(String, String)>> {
    specs.iter().map(|s| parse_dependency(s)).collect()
}
