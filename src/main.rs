//! Main entry point for the application.
//!
//! This module initializes logging, loads environment variables and configuration,
//! and dispatches to the requested command:
//! - Task store administration and task creation
//! - The task processor daemon
//! - The HTTP producer API
//! - The hidden isolated worker, spawned by the daemon itself

use clap::Parser;
use colored::Colorize;
use jobsearch::cache::{CacheSettings, StepCache};
use jobsearch::cli::{CacheCommand, Cli, Command};
use jobsearch::config::{self, AppConfig};
use jobsearch::core::{HandlerRegistry, ProcessorConfig, Task, TaskProcessor, TaskStatus, TaskType};
use jobsearch::db::{Database, TaskRepository};
use jobsearch::errors::Error;
use jobsearch::isolated::{self, IsolatedExecutor, IsolatedRegistry};
use jobsearch::pipeline::{self, IsolatedBackend, Pipeline};
use jobsearch::utils;
use serde_json::Value;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout belongs to the protocol in the worker
    if let Command::Worker = cli.command {
        utils::init_worker_logging(cli.log_level());
        return match isolated::serve(
            &IsolatedRegistry::with_builtins(),
            std::io::stdin().lock(),
            std::io::stdout().lock(),
        ) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Worker failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let long_running = matches!(cli.command, Command::Daemon { .. } | Command::Serve { .. });
    utils::init_logging(cli.log_level(), long_running);

    if let Err(e) = dotenvy::dotenv() {
        warn!("Failed to load .env file: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Command::InitDb { reset } => {
            let database = Database::new(&config.database.path)?;
            if reset || config.database.reset {
                database.reset_tasks()?;
            }
            println!("Task store ready at {}", config.database.path.bold());
        }
        Command::Create { task_type, args } => {
            let args: Value = serde_json::from_str(&args)?;
            let database = Database::new(&config.database.path)?;
            let mut conn = database.get_conn()?;
            let id = TaskRepository::new(&mut conn).create_task(&TaskType::from_name(&task_type), &args)?;
            println!("{}", id);
        }
        Command::Get { id } => {
            let database = Database::new(&config.database.path)?;
            let mut conn = database.get_conn()?;
            let task = TaskRepository::new(&mut conn).get_task(&id)?;
            print_task(&task, true);
        }
        Command::List { status } => {
            let status = status
                .map(|s| s.parse::<TaskStatus>())
                .transpose()
                .map_err(Error::ConfigError)?;
            let database = Database::new(&config.database.path)?;
            let mut conn = database.get_conn()?;
            for task in TaskRepository::new(&mut conn).list_tasks(status)? {
                print_task(&task, false);
            }
        }
        Command::Daemon { cache } => {
            let settings = cache.apply(config.cache.settings());
            run_daemon(config, settings).await?;
        }
        Command::Serve { port } => {
            let database = Database::new(&config.database.path)?;
            info!("Starting API server on port {}", port);
            jobsearch::api::server::launch_server(database, port).await?;
        }
        Command::Cache {
            action: CacheCommand::Clear { stage },
        } => {
            let cache = StepCache::open(&config.cache.path)?;
            let removed = match stage {
                Some(stage) => cache.clear_stage(stage)?,
                None => cache.clear_all()?,
            };
            println!("Removed {} cache entries", removed);
        }
        // served directly from main
        Command::Worker => {}
    }
    Ok(())
}

/// Wires store, cache, executor and handlers, then runs the processor
async fn run_daemon(config: AppConfig, settings: CacheSettings) -> Result<(), Error> {
    let database = Database::new(&config.database.path)?;
    if config.database.reset {
        database.reset_tasks()?;
    }
    let cache = StepCache::open(&config.cache.path)?;

    let executor = match &config.isolation.worker_program {
        Some(program) => IsolatedExecutor::new(program, vec!["worker".to_string()]),
        None => IsolatedExecutor::for_current_exe()?,
    }
    .with_grace_period(config.isolation.grace_period());

    let backend = IsolatedBackend::new(
        executor,
        config.pipeline.clone(),
        config.isolation.timeout(),
    );
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(backend),
        cache,
        settings,
        config.pipeline.model.clone(),
        config.pipeline.max_referrals,
    ));

    let mut registry = HandlerRegistry::new();
    pipeline::register_handlers(&mut registry, database.clone(), pipeline)?;

    let processor = TaskProcessor::with_config(
        database,
        Arc::new(registry),
        ProcessorConfig {
            poll_interval: config.daemon.poll_interval(),
            error_backoff: config.daemon.error_backoff(),
        },
    );
    processor.run_until_shutdown().await;
    Ok(())
}

fn print_task(task: &Task, detailed: bool) {
    let padded = format!("{:<10}", task.status.to_string());
    let status = match task.status {
        TaskStatus::Pending => padded.yellow(),
        TaskStatus::Running => padded.blue(),
        TaskStatus::Completed => padded.green(),
        TaskStatus::Failed => padded.red(),
    };
    println!(
        "{}  {:<18} {} {}",
        task.id.bold(),
        task.task_type.to_string(),
        status,
        task.created_at.dimmed()
    );

    if !detailed {
        return;
    }
    println!("  args:    {}", task.args);
    println!("  updated: {}", task.updated_at);
    if let Some(result) = &task.result {
        println!("  result:  {}", result);
    }
    if let Some(error) = &task.error {
        println!("  error:   {}", error.red());
    }
}
