//! # MNS Queue CLI
//!
//! Command-line interface for the MNS job queue driver.
//!
//! This module provides CLI commands for:
//! - Pushing jobs, optionally delayed
//! - Popping a single message for inspection
//! - Running a worker that drains named job types
//! - Validating and displaying the resolved configuration
//!
//! Command output goes to stdout; logs go to stderr.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mns_queue::config::MAX_DELAY_SECONDS;
use mns_queue::worker::DEFAULT_MAX_TRIES;
use mns_queue::{
    load_config, ConfigError, Connector, ConnectorError, JobHandle, JobHandler,
    JobRegistry, Payload, QueueConfig, Worker,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// MNS Queue CLI - push, pop and process jobs on Aliyun MNS queues
#[derive(Parser, Debug)]
#[command(name = "mns-queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Job queue driver for Aliyun Message Service")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MNS_QUEUE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push a job onto a queue and print its message ID
    Push {
        /// Job type identifier
        #[arg(short, long)]
        job: String,

        /// Job data as JSON
        #[arg(short, long, default_value = "{}")]
        data: String,

        /// Target queue (defaults to the configured default queue)
        #[arg(short, long)]
        queue: Option<String>,

        /// Seconds before the job becomes visible
        #[arg(long, default_value_t = 0)]
        delay: u64,

        /// Deliveries allowed before the job is given up on
        #[arg(long)]
        max_tries: Option<u32>,
    },

    /// Receive one message and print it as JSON
    Pop {
        /// Source queue (defaults to the configured default queue)
        #[arg(short, long)]
        queue: Option<String>,

        /// Delete the message after printing it
        #[arg(long)]
        ack: bool,
    },

    /// Process jobs of the given types until interrupted
    Work {
        /// Source queue (defaults to the configured default queue)
        #[arg(short, long)]
        queue: Option<String>,

        /// Job types to accept; may be repeated
        #[arg(short, long = "job", required = true)]
        jobs: Vec<String>,

        /// Attempts allowed for jobs that do not set their own
        #[arg(long, default_value_t = DEFAULT_MAX_TRIES)]
        max_tries: u32,

        /// Process at most one message and exit
        #[arg(long)]
        once: bool,
    },

    /// Validate configuration
    Config {
        /// Show resolved configuration (secrets redacted)
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] ConnectorError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 2,
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
        }
    }
}

// ============================================================================
// Job Handlers
// ============================================================================

/// Handler that logs each job it receives and succeeds
///
/// Lets `work` drain job types that have no in-process implementation.
#[derive(Debug, Default)]
pub struct LoggingJobHandler;

#[async_trait]
impl JobHandler for LoggingJobHandler {
    async fn handle(&self, job: &JobHandle<'_>, data: Value) -> anyhow::Result<()> {
        info!(
            queue = %job.queue(),
            message_id = %job.message_id(),
            attempts = job.total_attempts(),
            data = %data,
            "Handled job"
        );
        Ok(())
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    run(cli).await
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Push {
            job,
            data,
            queue,
            delay,
            max_tries,
        } => execute_push_command(&config, job, data, queue, delay, max_tries).await,
        Commands::Pop { queue, ack } => execute_pop_command(&config, queue, ack).await,
        Commands::Work {
            queue,
            jobs,
            max_tries,
            once,
        } => execute_work_command(&config, queue, jobs, max_tries, once).await,
        Commands::Config { show, format } => execute_config_command(&config, show, format),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Initialize logging based on CLI arguments
///
/// `RUST_LOG` takes precedence over `--log-level`.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("Failed to initialize logging: {}", e),
    })
}

/// Create a connector, keeping configuration problems distinct
fn connect(config: &QueueConfig) -> Result<Connector, CliError> {
    Connector::new(config).map_err(|e| match e {
        ConnectorError::Config(config_error) => CliError::Configuration(config_error),
        other => CliError::Queue(other),
    })
}

/// Build the payload for `push` from command-line arguments
pub fn build_payload(
    job: String,
    data: &str,
    max_tries: Option<u32>,
) -> Result<Payload, CliError> {
    if job.trim().is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "job".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let data: Value = serde_json::from_str(data).map_err(|e| CliError::InvalidArgument {
        arg: "data".to_string(),
        message: format!("not valid JSON: {}", e),
    })?;

    let payload = Payload::new(job, data);
    Ok(match max_tries {
        Some(max_tries) => payload.with_max_tries(max_tries),
        None => payload,
    })
}

/// Execute push command
async fn execute_push_command(
    config: &QueueConfig,
    job: String,
    data: String,
    queue: Option<String>,
    delay: u64,
    max_tries: Option<u32>,
) -> Result<(), CliError> {
    if delay > MAX_DELAY_SECONDS {
        return Err(CliError::InvalidArgument {
            arg: "delay".to_string(),
            message: format!("must be at most {} seconds", MAX_DELAY_SECONDS),
        });
    }

    let payload = build_payload(job, &data, max_tries)?;
    let connector = connect(config)?;

    let message_id = connector
        .later_payload(
            chrono::Duration::seconds(delay as i64),
            &payload,
            queue.as_deref(),
        )
        .await?;

    info!(
        job = %payload.job,
        message_id = %message_id,
        delay_seconds = delay,
        "Pushed job"
    );
    println!("{}", message_id);

    Ok(())
}

/// Execute pop command
async fn execute_pop_command(
    config: &QueueConfig,
    queue: Option<String>,
    ack: bool,
) -> Result<(), CliError> {
    let connector = connect(config)?;

    let Some(mut job) = connector.pop(queue.as_deref()).await? else {
        info!("No message available");
        return Ok(());
    };

    let output = json!({
        "queue": job.queue().as_str(),
        "message_id": job.message_id().as_str(),
        "receipt_handle": job.receipt_handle().handle(),
        "visible_again_at": job.receipt_handle().expires_at().to_string(),
        "attempts": job.attempts(),
        "body": job.raw_body(),
    });
    println!("{}", output);

    if ack {
        job.delete().await?;
        info!(message_id = %job.message_id(), "Deleted message");
    }

    Ok(())
}

/// Execute work command
async fn execute_work_command(
    config: &QueueConfig,
    queue: Option<String>,
    jobs: Vec<String>,
    max_tries: u32,
    once: bool,
) -> Result<(), CliError> {
    let mut registry = JobRegistry::new();
    for job in jobs {
        registry.register(job, Arc::new(LoggingJobHandler));
    }

    let worker = Worker::new(connect(config)?, registry).with_max_tries(max_tries);

    if once {
        let outcome = worker.run_next(queue.as_deref()).await?;
        println!("{:?}", outcome);
        return Ok(());
    }

    let processed = worker
        .run(queue.as_deref(), async {
            // An unavailable signal handler means no graceful stop
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await;
    info!(processed, "Worker finished");

    Ok(())
}

/// Execute config command
fn execute_config_command(
    config: &QueueConfig,
    show: bool,
    format: ConfigFormat,
) -> Result<(), CliError> {
    if !show {
        println!("Configuration is valid");
        return Ok(());
    }

    let redacted = config.redacted();
    let rendered = match format {
        ConfigFormat::Yaml => {
            serde_yaml::to_string(&redacted).map_err(|e| CliError::CommandFailed {
                message: format!("Failed to render configuration: {}", e),
            })?
        }
        ConfigFormat::Json => {
            serde_json::to_string_pretty(&redacted).map_err(|e| CliError::CommandFailed {
                message: format!("Failed to render configuration: {}", e),
            })?
        }
    };
    println!("{}", rendered.trim_end());

    Ok(())
}
