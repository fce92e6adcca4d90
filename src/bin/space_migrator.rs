//! Space Migrator CLI - copy connections, files and folders between spaces
//!
//! Usage:
//!   space-migrator spaces                          List spaces
//!   space-migrator rename-space <id> <name>        Rename a space
//!   space-migrator connections [--space <id>]      List data connections
//!   space-migrator files <space>                   List files and folders
//!   space-migrator migrate --source <id> --target <id> [--all | selection]
//!   space-migrator config show|set                 Inspect or edit settings

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use space_migrator::config::{self, MigratorConfig};
use space_migrator::logging;
use space_migrator::migration::{
    CandidateItem, ConflictResolution, CreateMigrationRequest, EngineConfig, ItemStatus,
    MigrationRegistry, MigrationService, MigrationStatus,
};
use space_migrator::remote::{
    CloudContentClient, ContentClient, DataConnection, DataFile, InMemoryContentClient, Space,
};

#[derive(Parser)]
#[command(
    name = "space-migrator",
    about = "Space Migrator - copy data connections, files and folders between spaces",
    version,
    long_about = "Connects to the tenant configured with `config set` (or the SPACE_MIGRATOR_TENANT_URL / SPACE_MIGRATOR_API_KEY variables)."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List spaces visible to the API key
    Spaces,
    /// Rename a space
    RenameSpace {
        /// Space id
        id: String,
        /// New name
        name: String,
    },
    /// List data connections
    Connections {
        /// Only connections of this space
        #[arg(long)]
        space: Option<String>,
    },
    /// List files and folders of a space
    Files {
        /// Space id
        space: String,
    },
    /// Copy selected items from one space into another
    Migrate {
        /// Source space id
        #[arg(long)]
        source: String,
        /// Target space id
        #[arg(long)]
        target: String,
        /// Connection id to copy (repeatable)
        #[arg(long = "connection")]
        connections: Vec<String>,
        /// File id to copy (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Folder id to copy (repeatable)
        #[arg(long = "folder")]
        folders: Vec<String>,
        /// Copy every connection, folder and file of the source space
        #[arg(long)]
        all: bool,
        /// What to do when a name already exists in the target: skip or rename
        #[arg(long)]
        on_conflict: Option<ConflictResolution>,
        /// Run against a local copy of both spaces; nothing is written to the tenant
        #[arg(long)]
        dry_run: bool,
    },
    /// Show or edit the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Update saved settings
    Set {
        #[arg(long)]
        tenant_url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Pause between items in milliseconds
        #[arg(long)]
        item_delay_ms: Option<u64>,
        /// Default conflict resolution: skip or rename
        #[arg(long)]
        on_conflict: Option<ConflictResolution>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Config { action } => {
            config_command(action)?;
            Ok(0)
        }
        Commands::Spaces => {
            let (_, client) = connect()?;
            let spaces = client.list_spaces().await?;
            for space in &spaces {
                println!(
                    "{:<38} {:<10} {}",
                    space.id,
                    space.space_type.as_deref().unwrap_or("-"),
                    space.name
                );
            }
            println!("{} space(s)", spaces.len());
            Ok(0)
        }
        Commands::RenameSpace { id, name } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("New space name must not be empty");
            }
            let (_, client) = connect()?;
            let space = client.rename_space(&id, name).await?;
            println!("Renamed space {} to '{}'", space.id, space.name);
            Ok(0)
        }
        Commands::Connections { space } => {
            let (_, client) = connect()?;
            let connections = client.list_connections(space.as_deref()).await?;
            for conn in &connections {
                println!(
                    "{:<38} {:<14} {}",
                    conn.id,
                    conn.datasource_id.as_deref().unwrap_or("-"),
                    conn.name
                );
            }
            println!("{} connection(s)", connections.len());
            Ok(0)
        }
        Commands::Files { space } => {
            let (_, client) = connect()?;
            let files = client.list_files(&space, true).await?;
            for file in &files {
                let kind = if file.is_folder { "folder" } else { "file" };
                println!("{:<38} {:<6} {:>12} {}", file.id, kind, file.size, file.name);
            }
            println!("{} item(s)", files.len());
            Ok(0)
        }
        Commands::Migrate {
            source,
            target,
            connections,
            files,
            folders,
            all,
            on_conflict,
            dry_run,
        } => {
            let (settings, client) = connect()?;
            let selection = Selection {
                connections,
                files,
                folders,
                all,
            };
            let resolution = on_conflict.unwrap_or(settings.conflict_resolution);
            migrate(
                client,
                settings.engine_config(),
                &source,
                &target,
                selection,
                resolution,
                dry_run,
            )
            .await
        }
    }
}

fn config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = config::load_config();
            let mut shown = serde_json::to_value(&settings)?;
            shown["api_key"] = serde_json::Value::String(config::redact(&settings.api_key));
            println!("{}", serde_json::to_string_pretty(&shown)?);
            println!("# file: {}", config::get_config_path().display());
        }
        ConfigAction::Set {
            tenant_url,
            api_key,
            timeout,
            item_delay_ms,
            on_conflict,
        } => {
            // Edit the file contents, not the env-overridden view
            let mut settings = config::load_config_from(&config::get_config_path());
            if let Some(url) = tenant_url {
                settings.tenant_url = url.trim().to_string();
            }
            if let Some(key) = api_key {
                settings.api_key = key.trim().to_string();
            }
            if let Some(secs) = timeout {
                settings.request_timeout_secs = secs;
            }
            if let Some(ms) = item_delay_ms {
                settings.item_delay_ms = ms;
            }
            if let Some(resolution) = on_conflict {
                settings.conflict_resolution = resolution;
            }
            if let Err(e) = config::validate_config(&mut settings) {
                eprintln!("Warning: {}", e);
            }
            config::save_config(&settings).map_err(|e| anyhow!(e))?;
            println!("Saved {}", config::get_config_path().display());
        }
    }
    Ok(())
}

/// Load settings and build the HTTP client
fn connect() -> Result<(MigratorConfig, Arc<dyn ContentClient>)> {
    let mut settings = config::load_config();
    config::validate_config(&mut settings).map_err(|e| anyhow!(e))?;
    let client_config = settings.client_config().map_err(|e| anyhow!(e))?;
    let client = CloudContentClient::new(client_config).context("Failed to build HTTP client")?;
    Ok((settings, Arc::new(client)))
}

struct Selection {
    connections: Vec<String>,
    files: Vec<String>,
    folders: Vec<String>,
    all: bool,
}

/// Turn ids from the command line into candidates, connections first,
/// then folders, then files. Unknown ids are an error.
fn select_items(
    selection: &Selection,
    source_connections: &[DataConnection],
    source_files: &[DataFile],
) -> Result<Vec<CandidateItem>> {
    let mut items = Vec::new();

    if selection.all {
        items.extend(
            source_connections
                .iter()
                .map(|c| CandidateItem::connection(&c.id, &c.name)),
        );
        items.extend(
            source_files
                .iter()
                .filter(|f| f.is_folder)
                .map(|f| CandidateItem::folder(&f.id, &f.name)),
        );
        items.extend(
            source_files
                .iter()
                .filter(|f| !f.is_folder)
                .map(|f| CandidateItem::file(&f.id, &f.name, f.size)),
        );
        return Ok(items);
    }

    for id in &selection.connections {
        let conn = source_connections
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| anyhow!("Connection {} is not in the source space", id))?;
        items.push(CandidateItem::connection(&conn.id, &conn.name));
    }
    for id in &selection.folders {
        let folder = source_files
            .iter()
            .find(|f| &f.id == id && f.is_folder)
            .ok_or_else(|| anyhow!("Folder {} is not in the source space", id))?;
        items.push(CandidateItem::folder(&folder.id, &folder.name));
    }
    for id in &selection.files {
        let file = source_files
            .iter()
            .find(|f| &f.id == id && !f.is_folder)
            .ok_or_else(|| anyhow!("File {} is not in the source space", id))?;
        items.push(CandidateItem::file(&file.id, &file.name, file.size));
    }
    Ok(items)
}

/// Mirror both spaces into an in-memory client so the run touches nothing remote
async fn dry_run_client(
    client: &dyn ContentClient,
    source: &str,
    target: &str,
) -> Result<InMemoryContentClient> {
    let mut local = InMemoryContentClient::new().with_default_storage_space(target);
    for space_id in [source, target] {
        let space: Space = client.get_space(space_id).await?;
        local = local.with_space(space);
        for conn in client.list_connections(Some(space_id)).await? {
            local = local.with_connection(conn);
        }
        for file in client.list_files(space_id, true).await? {
            local = local.with_file(file);
        }
        if let Some(storage) = client.resolve_file_storage_connection(space_id).await? {
            local = local.with_file_storage(space_id, &storage);
        }
    }
    Ok(local)
}

async fn migrate(
    client: Arc<dyn ContentClient>,
    mut engine_config: EngineConfig,
    source: &str,
    target: &str,
    selection: Selection,
    resolution: ConflictResolution,
    dry_run: bool,
) -> Result<i32> {
    if source == target {
        bail!("Source and target space must differ");
    }

    let (source_connections, source_files) = tokio::try_join!(
        client.list_connections(Some(source)),
        client.list_files(source, true),
    )?;
    let items = select_items(&selection, &source_connections, &source_files)?;
    if items.is_empty() {
        bail!("Nothing selected; pass --connection/--file/--folder ids or --all");
    }

    let client: Arc<dyn ContentClient> = if dry_run {
        println!("Dry run: changes are applied to a local copy of both spaces only");
        engine_config.item_delay = std::time::Duration::ZERO;
        Arc::new(dry_run_client(client.as_ref(), source, target).await?)
    } else {
        client
    };

    let service = MigrationService::new(client, Arc::new(MigrationRegistry::new()), engine_config);
    let created = service
        .create_migration(CreateMigrationRequest {
            session_id: format!("cli-{}", std::process::id()),
            source_space_id: source.to_string(),
            target_space_id: target.to_string(),
            items,
            conflict_resolution: resolution,
        })
        .await?;

    let migration_id = created.migration.id.clone();
    println!(
        "Migration {}: '{}' -> '{}', {} item(s)",
        migration_id,
        created.migration.source_space_name,
        created.migration.target_space_name,
        created.items.len()
    );
    if !created.conflicts.is_empty() {
        println!(
            "{} name conflict(s) in the target, resolution: {:?}",
            created.conflicts.len(),
            resolution
        );
        for conflict in &created.conflicts {
            println!("  {:<10} {}", conflict.kind.to_string(), conflict.name);
        }
    }

    let mut updates = service.subscribe(&migration_id).await?;
    let mut task = service.start_migration(&migration_id).await?;

    let bar = ProgressBar::new(created.items.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;
    let outcome = loop {
        tokio::select! {
            finished = &mut task => break finished,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut task).await;
                }
                let update = updates.borrow_and_update().clone();
                bar.set_position(update.progress.processed() as u64);
                bar.set_message(update.current_item.unwrap_or_default());
            }
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                bar.println("Cancelling; the item in flight will finish first");
                service.cancel_migration(&migration_id).await?;
            }
        }
    };
    let totals = outcome.context("Migration task panicked")??;
    bar.set_position(totals.processed() as u64);
    bar.finish_with_message("done");

    let snapshot = service.get_migration_status(&migration_id).await?;
    println!();
    for item in &snapshot.items {
        let detail = match item.status {
            ItemStatus::Failed => item.error.clone().unwrap_or_default(),
            ItemStatus::Completed => match &item.target_name {
                Some(renamed) => format!("as '{}'", renamed),
                None => String::new(),
            },
            _ => String::new(),
        };
        println!(
            "{:<10} {:<10} {:<40} {}",
            item.status.to_string(),
            item.kind.to_string(),
            item.name,
            detail
        );
    }
    println!();
    println!(
        "Migration {}: {} completed, {} failed, {} skipped of {}",
        snapshot.migration.status, totals.completed, totals.failed, totals.skipped, totals.total
    );

    Ok(match snapshot.migration.status {
        MigrationStatus::Failed => 2,
        _ if totals.failed > 0 => 1,
        _ => 0,
    })
}
