//! tempo - a persistent, retrying, multi-type task scheduler.
//!
//! Usage:
//!   tempo run                   Start the scheduler and management API
//!   tempo check-config          Validate the configuration file

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tempo::api;
use tempo::config::Config;
use tempo::dispatch::{Dispatcher, HttpMailer, Mailer, ScriptRegistry};
use tempo::runner::{
    install_runner, install_watchdog, PeriodicTasks, SchedulerContext, TaskRunner, TimerRegistry,
    Watchdog,
};
use tempo::service::TaskService;
use tempo::storage::{SqliteStore, TaskStore};

/// tempo - a persistent, retrying, multi-type task scheduler
#[derive(Parser)]
#[command(name = "tempo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and management API
    Run {
        /// Override the database path
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
    },

    /// Validate the configuration file without starting
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run { db } => {
            if let Some(db) = db {
                config.database.path = db;
            }
            run(config).await
        }
        Commands::CheckConfig => {
            config.validate()?;
            println!("configuration OK");
            Ok(())
        }
    }
}

/// Wire up the store, dispatcher, runner, watchdog, and API server.
async fn run(config: Config) -> anyhow::Result<()> {
    info!("opening task store at {}", config.database.path.display());
    let store: Arc<dyn TaskStore> = Arc::new(
        SqliteStore::new(&config.database.path)
            .await
            .context("opening task store")?,
    );

    let scripts = match &config.scripts.command_root {
        Some(root) => {
            info!("script handlers resolve under {}", root.display());
            Arc::new(ScriptRegistry::with_command_root(root))
        }
        None => Arc::new(ScriptRegistry::new()),
    };

    let mut dispatcher =
        Dispatcher::new(Arc::clone(&scripts)).with_email_enabled(config.email.enabled);
    if let Some(endpoint) = &config.email.endpoint {
        let provider = config.email.provider.as_deref().unwrap_or("http");
        let mailer: Arc<dyn Mailer> = Arc::new(HttpMailer::new(endpoint, provider));
        dispatcher = dispatcher.with_mailer(mailer);
        info!(provider, "mail provider configured");
    }
    if let Some(from) = &config.email.from {
        dispatcher = dispatcher.with_email_from(from);
    }

    let ctx = SchedulerContext::new(
        Arc::clone(&store),
        Arc::new(dispatcher),
        config.scheduler.clone(),
    );
    let runner = Arc::new(TaskRunner::new(ctx));

    let timers: Arc<dyn PeriodicTasks> = Arc::new(TimerRegistry::new());
    install_runner(&timers, Arc::clone(&runner));
    let watchdog = Arc::new(Watchdog::new(Arc::clone(&timers), Arc::clone(&runner)));
    install_watchdog(&timers, watchdog);
    info!(
        poll_interval_secs = config.scheduler.poll_interval_secs,
        watchdog_interval_secs = config.scheduler.watchdog_interval_secs,
        "scheduler installed"
    );

    let service = Arc::new(TaskService::new(Arc::clone(&store), runner));
    let state = api::create_api_state(service);
    let server = api::start_server(&config.server, state).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
        _ = server => {
            info!("API server stopped");
        }
    }

    Ok(())
}
