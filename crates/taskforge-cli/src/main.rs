mod config;
mod orchestrator;

use clap::{Parser, Subcommand};
use config::TaskforgeConfig;
use orchestrator::Orchestrator;
use std::path::PathBuf;
use taskforge_core::{EventBus, Phase, SessionId};
use taskforge_taskstore::{NewTask, Priority, TaskStore};
use taskforge_validator::{Kind, Validator};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskforge", about = "Autonomous task orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "taskforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator loop until idle, blocked, or `max_iterations` is reached
    Run,
    /// File a new task into the backlog
    Task {
        id: String,
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "implementation")]
        phase: String,
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    /// Run one input through the Validator and print the result
    Validate {
        input: String,
        #[arg(long, default_value = "description")]
        kind: String,
    },
    /// Print a backlog summary
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: TaskforgeConfig = toml::from_str(&config_str)?;

    match cli.command {
        Commands::Run => {
            let mut orchestrator = Orchestrator::new(config).await?;
            let code = orchestrator.run().await?;
            std::process::exit(code);
        }
        Commands::Task {
            id,
            title,
            description,
            phase,
            priority,
        } => {
            let phase: Phase = phase.parse().map_err(|e| anyhow::anyhow!("{e}"))?;
            let priority = parse_priority(&priority)?;

            std::fs::create_dir_all(&config.project.data_dir)?;
            let task_store = TaskStore::open(
                config.tasks_path(),
                &config.project.name,
                SessionId::generate(),
                EventBus::new(),
                None,
            )?;

            let mut new_task = NewTask::new(id, title, phase, priority);
            new_task.description = description;
            let task = task_store.create_task(new_task);
            task_store.save()?;

            info!(task_id = %task.id, "task added to backlog");
            println!("added task {}", task.id);
        }
        Commands::Validate { input, kind } => {
            let kind = parse_kind(&kind)?;
            let mut validator = Validator::new();
            let result = validator.validate(&input, kind);

            println!("valid: {}", result.valid);
            println!("sanitized: {}", result.sanitized);
            for threat in &result.threats {
                println!("threat: {threat:?}");
            }
            if !result.valid {
                std::process::exit(2);
            }
        }
        Commands::Status => {
            std::fs::create_dir_all(&config.project.data_dir)?;
            let mut task_store = TaskStore::open(
                config.tasks_path(),
                &config.project.name,
                SessionId::generate(),
                EventBus::new(),
                None,
            )?;
            if config.shadow.enabled {
                task_store.enable_shadow(config.shadow_path())?;
            }
            let summary = task_store.backlog_summary();
            println!("now:       {}", summary.now);
            println!("next:      {}", summary.next);
            println!("later:     {}", summary.later);
            println!("someday:   {}", summary.someday);
            println!("completed: {}", summary.completed);
            println!("total:     {}", summary.total);
            if let Some(health) = task_store.shadow_health() {
                println!(
                    "shadow:    score={} status={:?} ready_for_migration={}",
                    health.score, health.status, health.ready_for_migration
                );
            }
        }
    }

    Ok(())
}

fn parse_priority(input: &str) -> anyhow::Result<Priority> {
    match input.to_lowercase().as_str() {
        "critical" => Ok(Priority::Critical),
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        other => Err(anyhow::anyhow!("unknown priority '{other}'")),
    }
}

fn parse_kind(input: &str) -> anyhow::Result<Kind> {
    match input.to_lowercase().as_str() {
        "description" => Ok(Kind::Description),
        "task_id" | "task-id" => Ok(Kind::TaskId),
        "phase" => Ok(Kind::Phase),
        "path" => Ok(Kind::Path),
        "command" => Ok(Kind::Command),
        other => Err(anyhow::anyhow!("unknown validation kind '{other}'")),
    }
}
