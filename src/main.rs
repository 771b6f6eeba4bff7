use std::sync::Arc;

use clap::{Parser, Subcommand};

use manifest_lens::config::{HISTORY_LIMIT, db_path};
use manifest_lens::version::history::UpdateHistory;
use manifest_lens::version::store::SqliteStore;

#[derive(Parser)]
#[command(name = "manifest-lens")]
#[command(version, about = "Language Server that keeps dependency manifests up to date")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the most recently applied updates
    History {
        /// Maximum number of entries to print
        #[arg(short, long, default_value_t = HISTORY_LIMIT)]
        limit: usize,
    },
}

fn print_history(limit: usize) -> anyhow::Result<()> {
    let db_path = db_path();
    if !db_path.exists() {
        println!("No updates recorded");
        return Ok(());
    }

    let history = UpdateHistory::new(Arc::new(SqliteStore::new(&db_path)?));
    let events = history.recent(limit)?;
    if events.is_empty() {
        println!("No updates recorded");
        return Ok(());
    }

    for event in events {
        println!("{event}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::History { limit }) => print_history(limit),
        None => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(manifest_lens::lsp::server::run_server()),
    }
}
