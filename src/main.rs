use anyhow::{Context, Result, bail};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use recordkeeper::{RecordManager, RecordPayload, Timestamp, Workspace, WorkspaceConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recordkeeper")]
#[command(about = "Inspect and edit stored chat histories and model presets")]
struct Cli {
    /// Workspace root; defaults to $RECORDKEEPER_DATA_DIR, then ./data
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    store: Store,
}

#[derive(Subcommand)]
enum Store {
    /// Chat histories
    Chats {
        #[command(subcommand)]
        action: Action,
    },
    /// Model presets
    Presets {
        #[command(subcommand)]
        action: Action,
    },
}

#[derive(Subcommand)]
enum Action {
    /// List records, most recently modified first
    List,
    /// Print a record as JSON (the selected one if no name is given)
    Show { name: Option<String> },
    /// Create a record; the name is made unique if needed
    Create { hint: Option<String> },
    Rename { old: String, new: String },
    Delete { name: String },
    /// Select a record and mark it as most recently used
    Select { name: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match cli.data_dir {
        Some(dir) => WorkspaceConfig::new(dir),
        None => WorkspaceConfig::from_env(),
    };
    let workspace = Workspace::open(config)
        .await
        .context("Failed to open workspace")?;

    let outcome = match cli.store {
        Store::Chats { action } => run(workspace.chats(), action).await,
        Store::Presets { action } => run(workspace.presets(), action).await,
    };

    workspace
        .shutdown()
        .await
        .context("Failed to finish pending writes")?;
    outcome
}

async fn run<P: RecordPayload>(manager: &RecordManager<P>, action: Action) -> Result<()> {
    match action {
        Action::List => {
            let current = manager.current_name();
            for record in manager.list_ordered() {
                let marker = if current.as_deref() == Some(record.name.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!(
                    "{} {:<40} {}",
                    marker,
                    record.name,
                    format_time(record.last_modified)
                );
            }
        }
        Action::Show { name } => {
            let record = match name {
                Some(name) => manager
                    .get(&name)
                    .with_context(|| format!("No {} named '{}'", P::KIND, name))?,
                None => manager
                    .current()
                    .with_context(|| format!("No {} selected", P::KIND))?,
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Action::Create { hint } => {
            let name = manager
                .create(hint.as_deref().unwrap_or(P::DEFAULT_NAME))
                .await;
            println!("created {} '{}'", P::KIND, name);
        }
        Action::Rename { old, new } => {
            manager
                .try_rename(&old, &new)
                .await
                .with_context(|| format!("Failed to rename '{}' to '{}'", old, new))?;
            println!("renamed '{}' -> '{}'", old, new);
        }
        Action::Delete { name } => {
            manager
                .try_delete(&name)
                .await
                .with_context(|| format!("Failed to delete '{}'", name))?;
            println!("deleted {} '{}'", P::KIND, name);
        }
        Action::Select { name } => {
            if !manager.switch_to(&name) {
                bail!("No {} named '{}'", P::KIND, name);
            }
            manager.touch(&name).await;
            println!("selected '{}'", name);
        }
    }

    manager.flush().await.context("Failed to flush writes")?;
    let stats = manager.persist_stats();
    if stats.failed > 0 {
        bail!(
            "{} write(s) failed: {}",
            stats.failed,
            stats.last_error.unwrap_or_default()
        );
    }
    Ok(())
}

fn format_time(ts: Timestamp) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
