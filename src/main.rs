use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::debug;

use repline::config::Config;
use repline::db::{SqliteStore, open};
use repline::logging;
use repline::storage::WorkoutStore;
use types::OutputFmt;

mod cli;
mod commands;
mod types;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let fmt = OutputFmt::from_flag(cli.json);

    let config_path = match cli.config {
        Some(p) => p,
        None => Config::default_path()?,
    };

    // Config commands must work even when the file on disk is invalid.
    if let Commands::Config(cmd) = cli.cmd {
        return commands::config::handle(cmd, &config_path, fmt).await;
    }

    let config = Config::load(&config_path)?;
    logging::init(&config.log_level, config.log_format)?;

    let db_path = match &cli.db {
        Some(p) => p.to_string_lossy().into_owned(),
        None => config.database.clone(),
    };
    debug!(db = %db_path, config = %config_path.display(), "opening database");

    let pool = open(&db_path).await?;
    let store: Arc<dyn WorkoutStore> = Arc::new(SqliteStore::new(pool));

    match cli.cmd {
        Commands::Program(cmd) => commands::program::handle(cmd, store.as_ref(), fmt).await?,
        Commands::Run { program } => commands::run::start(store, &config, &program).await?,
        Commands::Resume { session } => commands::run::resume(store, &config, &session).await?,
        Commands::History { limit } => commands::history::sessions(store.as_ref(), limit, fmt).await?,
        Commands::Prs => commands::history::records(store.as_ref(), fmt).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}
