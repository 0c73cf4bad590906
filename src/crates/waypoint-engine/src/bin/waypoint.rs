//! Waypoint CLI - inspect and operate on workflow executions
//!
//! Graphs are registered by the application that runs them, so this tool
//! works on the checkpoint database only: it can record responses, pause and
//! cancel runs, but resuming happens in the application.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use waypoint_engine::config::ConfigLoader;
use waypoint_engine::{
    CheckpointStore, Database, EventLogger, ExecutionController, ExecutionStatus, InterventionManager,
    SqliteCheckpointStore,
};
use waypoint_graph::GraphRegistry;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Waypoint - resumable workflow executions", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Database file (overrides configuration)
    #[arg(long, global = true, env = "WAYPOINT_DATABASE_PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Migrate,

    /// List workflow executions, newest first
    List {
        /// Only executions in this status (e.g. PAUSED)
        #[arg(short, long)]
        status: Option<ExecutionStatus>,
        /// Maximum number of executions
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Show a workflow execution
    Status {
        /// Workflow execution ID
        id: String,
    },

    /// List the node executions of a workflow execution
    Nodes {
        /// Workflow execution ID
        id: String,
    },

    /// List open intervention requests in queue order
    Pending,

    /// Answer an intervention request
    Respond {
        /// Intervention request ID
        request_id: String,
        /// Responding user
        #[arg(short, long)]
        user: String,
        /// Response as JSON
        #[arg(short, long)]
        data: String,
        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Pause a workflow execution
    Pause {
        /// Workflow execution ID
        id: String,
        /// Node execution to pause with it
        #[arg(long)]
        node: Option<String>,
    },

    /// Cancel a workflow execution
    Cancel {
        /// Workflow execution ID
        id: String,
    },

    /// Expire overdue intervention requests
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new().load().await?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let db = Database::from_config(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    db.run_migrations().await?;

    let store: Arc<dyn CheckpointStore> = Arc::new(SqliteCheckpointStore::new(db.clone()));
    let events = EventLogger::default();

    match cli.command {
        Commands::Migrate => {
            db.health_check().await?;
            println!("Database ready at {}", config.database.path.display());
        }
        Commands::List { status, limit } => {
            print_json(&store.list_executions(status, limit).await?)?;
        }
        Commands::Status { id } => match store.get_execution(&id).await? {
            Some(execution) => print_json(&execution)?,
            None => bail!("Workflow execution not found: {}", id),
        },
        Commands::Nodes { id } => {
            print_json(&store.list_nodes(&id).await?)?;
        }
        Commands::Pending => {
            let manager = InterventionManager::new(Arc::clone(&store), events);
            print_json(&manager.get_pending_interventions().await?)?;
        }
        Commands::Respond {
            request_id,
            user,
            data,
            notes,
        } => {
            let response_data: serde_json::Value =
                serde_json::from_str(&data).context("--data must be valid JSON")?;
            let manager = InterventionManager::new(Arc::clone(&store), events);
            if !manager
                .submit_response(&request_id, &user, response_data, notes)
                .await?
            {
                bail!("Request {} is not open (unknown, answered or expired)", request_id);
            }
            println!("Response recorded for {}", request_id);
        }
        Commands::Pause { id, node } => {
            let controller = controller(&store, events);
            if !controller.pause(&id, node.as_deref()).await? {
                bail!("Workflow execution {} cannot be paused", id);
            }
            println!("Paused {}", id);
        }
        Commands::Cancel { id } => {
            let controller = controller(&store, events);
            if !controller.cancel(&id).await? {
                bail!("Workflow execution {} cannot be cancelled", id);
            }
            println!("Cancelled {}", id);
        }
        Commands::Sweep => {
            let manager = InterventionManager::new(Arc::clone(&store), events);
            let expired = manager.expire_overdue().await?;
            println!("Expired {} request(s)", expired);
        }
    }

    db.close().await;
    Ok(())
}

/// Controller for operations that never traverse a graph
fn controller(store: &Arc<dyn CheckpointStore>, events: EventLogger) -> ExecutionController {
    ExecutionController::with_settings(
        Arc::clone(store),
        Arc::new(GraphRegistry::new()),
        Default::default(),
        events,
    )
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
