use clap::Parser;
use tracing_subscriber::EnvFilter;

use docdex::{
    cli::{self, Cli, Command, ProjectAction},
    data_dir::DataDir,
    docs::DocsReader,
    error,
    ingestion::IngestionPipeline,
    project,
    remote::{DocsClient, RemoteConfig},
    resolve::VersionResolver,
    search,
    store::IndexStore,
};

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("DOCDEX_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn runtime() -> error::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Ingest(args) => cmd_ingest(&data_dir, &args)?,
        Command::Search(args) => cmd_search(&data_dir, &args)?,
        Command::Show(args) => cmd_show(&data_dir, &args)?,
        Command::Related(args) => cmd_related(&data_dir, &args)?,
        Command::Project { action } => cmd_project(&data_dir, action)?,
        Command::Sync => cmd_sync(&data_dir)?,
        Command::Status(args) => cmd_status(&data_dir, args.json)?,
        Command::Mcp => docdex::mcp::run_mcp(data_dir)?,
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn cmd_ingest(data_dir: &DataDir, args: &cli::IngestArgs) -> error::Result<()> {
    let dependencies = cli::parse_dependencies(&args.dependencies)?;
    let store = IndexStore::open(&data_dir.index_db())?;
    let client = DocsClient::new(RemoteConfig::default())?;
    let pipeline =
        IngestionPipeline::new(&store, &client, data_dir.snapshots_dir()?);

    let outcomes = runtime()?.block_on(pipeline.ingest(&dependencies))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for o in &outcomes {
            let status = serde_json::to_value(o.status)?;
            let status = status.as_str().unwrap_or("unknown");
            match (&o.resolved_version, &o.caveat) {
                (Some(resolved), Some(caveat)) => println!(
                    "{}@{} -> {resolved}: {status} ({caveat})",
                    o.package, o.requested_version
                ),
                (Some(resolved), None) => println!(
                    "{}@{} -> {resolved}: {status}",
                    o.package, o.requested_version
                ),
                _ => println!(
                    "{}@{}: {status}",
                    o.package, o.requested_version
                ),
            }
        }
    }
    Ok(())
}

fn cmd_search(data_dir: &DataDir, args: &cli::SearchArgs) -> error::Result<()> {
    let store = IndexStore::open(&data_dir.index_db())?;
    let project_id = args
        .project
        .as_deref()
        .map(project::project_id_for_path);

    let results = search::execute_search(
        &store,
        &args.query,
        args.limit,
        project_id.as_deref(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No results for '{}'", args.query);
    } else {
        for r in &results {
            println!("{:.3}\t{}\t{} ({})", r.score, r.id, r.title, r.source);
        }
    }
    Ok(())
}

fn cmd_show(data_dir: &DataDir, args: &cli::ShowArgs) -> error::Result<()> {
    let store = IndexStore::open(&data_dir.index_db())?;
    let mut reader = DocsReader::new(&store);
    let body = reader.load_entry_body(&args.entry_id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("# {}", body.title);
        println!();
        println!("{}", body.content);
    }
    Ok(())
}

fn cmd_related(data_dir: &DataDir, args: &cli::RelatedArgs) -> error::Result<()> {
    let store = IndexStore::open(&data_dir.index_db())?;
    let reader = DocsReader::new(&store);
    let related = reader.list_related(&args.entry_id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&related)?);
    } else if related.is_empty() {
        println!("No related entries for '{}'", args.entry_id);
    } else {
        for row in &related {
            println!("{}\t{}\t{}", row.id, row.relation, row.title);
        }
    }
    Ok(())
}

fn cmd_project(data_dir: &DataDir, action: ProjectAction) -> error::Result<()> {
    let store = IndexStore::open(&data_dir.index_db())?;

    match action {
        ProjectAction::Register {
            path,
            name,
            deps,
            ecosystem,
        } => {
            let dependencies = cli::parse_dependencies(&deps)?;
            let registration = project::register_project(
                &store,
                &name,
                &path.to_string_lossy(),
                &dependencies,
                Some(&ecosystem),
            )?;
            println!(
                "Registered '{}' ({}) with {} dependencies",
                registration.name,
                registration.project_id,
                registration.dependency_count
            );
        }
        ProjectAction::Show { path, json } => {
            let project_id = project::project_id_for_path(&path.to_string_lossy());
            let record = store.get_project(&project_id)?.ok_or_else(|| {
                error::Error::not_found("project", path.display().to_string())
            })?;
            let deps = store.project_dependencies(&project_id)?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "projectId": project_id,
                        "name": record.name,
                        "path": record.path,
                        "dependencies": deps,
                    }))?
                );
            } else {
                println!("{} ({project_id})", record.name);
                println!("Path: {}", record.path);
                println!("Dependencies: {}", deps.len());
                for dep in &deps {
                    println!("  {}@{} [{}]", dep.package, dep.version, dep.ecosystem);
                }
            }
        }
    }
    Ok(())
}

fn cmd_sync(data_dir: &DataDir) -> error::Result<()> {
    let store = IndexStore::open(&data_dir.index_db())?;
    let client = DocsClient::new(RemoteConfig::default())?;
    let resolver = VersionResolver::new(&store, &client);

    let count = runtime()?.block_on(resolver.sync_catalog())?;
    println!("Synced {count} documentation sets");
    Ok(())
}

fn cmd_status(data_dir: &DataDir, json: bool) -> error::Result<()> {
    let store = IndexStore::open(&data_dir.index_db())?;
    let (sources, downloaded) = store.count_sources()?;
    let entries = store.count_entries()?;
    let projects = store.count_projects()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "dataDir": data_dir.root().display().to_string(),
                "sources": sources,
                "downloaded": downloaded,
                "entries": entries,
                "projects": projects,
            }))?
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Catalog sources: {sources} ({downloaded} downloaded)");
        println!("Indexed entries: {entries}");
        println!("Registered projects: {projects}");
    }
    Ok(())
}
