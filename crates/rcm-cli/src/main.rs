mod config;
mod invoke_cmd;
mod runs_cmd;
mod runtime;
mod serve_cmd;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rcm_core::ExecutionMode;
use rcm_db::pool;

use config::{CliOverrides, RcmConfig, RecorderKind};
use runtime::Runtime;

#[derive(Parser)]
#[command(name = "rcm", about = "Revenue-cycle agent execution harness")]
struct Cli {
    /// Database URL (overrides RCM_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Execution mode: production or development (overrides RCM_MODE)
    #[arg(long, global = true)]
    mode: Option<ExecutionMode>,

    /// Run recorder: postgres or log (overrides RCM_RECORDER)
    #[arg(long, global = true)]
    recorder: Option<RecorderKind>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            database_url: self.database_url.clone(),
            mode: self.mode,
            recorder: self.recorder,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an rcm config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/rcm")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Run one request through an agent and print the response envelope
    Invoke {
        /// Agent name (e.g. coding, eligibility)
        agent: String,
        /// Request JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,
    },
    /// Inspect recorded runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Serve the agents over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum RunsCommands {
    /// List recent runs, newest first
    List {
        /// Only runs of this agent
        #[arg(long)]
        agent: Option<String>,
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one run as JSON
    Show {
        /// Run ID
        run_id: String,
    },
}

/// Execute the `rcm init` command: write config file.
fn cmd_init(db_url: &str, mode: Option<ExecutionMode>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mode = mode.unwrap_or_default();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        runtime: config::RuntimeSection {
            mode: Some(mode),
            recorder: Some(RecorderKind::Postgres),
        },
        ..config::ConfigFile::default()
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  runtime.mode = {mode}");
    println!();
    println!("Next: run `rcm db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `rcm db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &RcmConfig) -> anyhow::Result<()> {
    println!(
        "Initializing rcm database at {}...",
        resolved.db_config.redacted_url()
    );

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("rcm db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = cli.overrides();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, cli.mode, force)?;
        }
        Commands::DbInit => {
            let resolved = RcmConfig::resolve(&overrides)?;
            cmd_db_init(&resolved).await?;
        }
        Commands::Invoke { agent, input } => {
            let resolved = RcmConfig::resolve(&overrides)?;
            let (runtime, db_pool) = Runtime::from_config(&resolved).await?;
            let result = invoke_cmd::run_invoke(&runtime, &agent, &input).await;
            if let Some(p) = db_pool {
                p.close().await;
            }
            if !result? {
                std::process::exit(1);
            }
        }
        Commands::Runs { command } => {
            let resolved = RcmConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                RunsCommands::List { agent, limit } => {
                    runs_cmd::run_list(&db_pool, agent.as_deref(), limit).await
                }
                RunsCommands::Show { run_id } => runs_cmd::run_show(&db_pool, &run_id).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = RcmConfig::resolve(&overrides)?;
            let (runtime, db_pool) = Runtime::from_config(&resolved).await?;
            let run_store = match resolved.recorder {
                RecorderKind::Postgres => db_pool.clone(),
                RecorderKind::Log => None,
            };
            let state = serve_cmd::AppState::new(runtime, run_store);
            let result = serve_cmd::run_serve(state, &bind, port)
                .await
                .context("server error");
            if let Some(p) = db_pool {
                p.close().await;
            }
            result?;
        }
    }

    Ok(())
}
