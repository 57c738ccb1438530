//! # Local TA CLI (`lta`)
//!
//! Starts the HTTP backend and manages the local Ollama runtime.
//!
//! ## Usage
//!
//! ```bash
//! lta --config ./configs/app.yaml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lta ensure` | Start Ollama if needed and pull missing models |
//! | `lta models` | List models installed on the runtime |
//! | `lta serve` | Start the HTTP server |
//! | `lta init` | Create the SQLite database and schema |
//!
//! ## Exit codes for `lta ensure`
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Runtime up and every requested model installed |
//! | 1 | Runtime up but at least one model could not be ensured |
//! | 2 | Runtime could not be reached or started |
//!
//! ## Examples
//!
//! ```bash
//! # Make sure the configured chat and embedding models are present
//! lta ensure
//!
//! # Against another host, with explicit models and no progress output
//! lta ensure --host http://10.0.0.5:11434 --model llama3.2 --model nomic-embed-text --quiet
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use local_ta::config::{self, Settings};
use local_ta::launcher::OllamaLauncher;
use local_ta::lifecycle::Coordinator;
use local_ta::logging::{self, LogFormat};
use local_ta::progress::ProgressMode;
use local_ta::runtime::{format_model_list, ModelRuntime, ModelSet, OllamaRuntime, RuntimeEndpoint};
use local_ta::{migrate, server};

/// Exit code when some requested models are missing.
const EXIT_MISSING_MODELS: u8 = 1;
/// Exit code when the runtime is unreachable.
const EXIT_UNREACHABLE: u8 = 2;

/// Local TA backend and Ollama lifecycle manager.
#[derive(Parser)]
#[command(
    name = "lta",
    about = "Local TA: upload/RAG backend with a hardened Ollama lifecycle manager",
    version
)]
struct Cli {
    /// Path to the YAML settings file.
    ///
    /// Defaults to `$APP_CONFIG_PATH`, then `./configs/app.yaml`. A missing
    /// file is fine; environment variables and defaults fill the gaps.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the runtime is up and the required models are installed.
    ///
    /// Starts `ollama serve` in the background if the runtime does not
    /// answer, waits for it, then pulls every missing model.
    Ensure {
        /// Runtime base URL (overrides settings and OLLAMA_HOST).
        #[arg(long)]
        host: Option<String>,

        /// Model to ensure. Repeatable. Defaults to the configured chat and
        /// embedding models.
        #[arg(long = "model", value_name = "MODEL")]
        models: Vec<String>,

        /// Suppress pull progress and the success summary.
        #[arg(long)]
        quiet: bool,

        /// Seconds to wait for a freshly started runtime.
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,

        /// Emit pull progress as JSON lines on stderr.
        #[arg(long)]
        json_progress: bool,
    },

    /// List the models installed on the runtime.
    Models {
        /// Runtime base URL (overrides settings and OLLAMA_HOST).
        #[arg(long)]
        host: Option<String>,
    },

    /// Start the HTTP server.
    ///
    /// Runs the startup hook (schema, runtime, models) and then serves on
    /// the configured bind address until Ctrl-C.
    Serve,

    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = config::load_settings(cli.config.as_deref())?;
    logging::init_tracing(&settings.log_level, LogFormat::parse(&settings.log_format));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Ensure {
            host,
            models,
            quiet,
            wait,
            json_progress,
        } => {
            let progress = if json_progress {
                ProgressMode::Json
            } else {
                ProgressMode::default_for_tty()
            };
            run_ensure(&settings, host, models, quiet, wait, progress, cancel).await
        }
        Commands::Models { host } => run_models(&settings, host).await,
        Commands::Serve => {
            server::run_server(&settings, cancel).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init => {
            migrate::run_migrations(&settings).await?;
            println!("Database initialized successfully.");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn runtime_for(settings: &Settings, host: Option<String>) -> anyhow::Result<OllamaRuntime> {
    let raw = host.unwrap_or_else(|| settings.ollama_base_url.clone());
    let endpoint =
        RuntimeEndpoint::parse(&raw).with_context(|| format!("Invalid runtime URL '{}'", raw))?;
    Ok(OllamaRuntime::from_settings(endpoint, settings))
}

async fn run_ensure(
    settings: &Settings,
    host: Option<String>,
    models: Vec<String>,
    quiet: bool,
    wait: Option<u64>,
    progress: ProgressMode,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    let runtime = Arc::new(runtime_for(settings, host)?);
    let mut coordinator = Coordinator::new(
        runtime,
        Box::new(OllamaLauncher::new(settings.ollama_executable.clone())),
    )
    .with_progress(progress)
    .with_cancellation(cancel);

    let wait = wait.map(Duration::from_secs).unwrap_or_else(|| settings.wait_timeout());
    if !coordinator.ensure_server(wait).await {
        eprintln!("Could not start or reach Ollama server. Is ollama installed?");
        return Ok(ExitCode::from(EXIT_UNREACHABLE));
    }

    let required: ModelSet = if models.is_empty() {
        settings.required_models()
    } else {
        models.into_iter().collect()
    };
    let ensured = coordinator.ensure_models(&required, quiet).await;
    let missing = required.missing(&ensured);
    if !missing.is_empty() {
        eprintln!("Failed to ensure models: {}", format_model_list(&missing));
        return Ok(ExitCode::from(EXIT_MISSING_MODELS));
    }

    if !quiet {
        println!("Ensured models: {}", format_model_list(required.iter()));
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_models(settings: &Settings, host: Option<String>) -> anyhow::Result<ExitCode> {
    let runtime = runtime_for(settings, host)?;
    match runtime.list_models().await {
        Ok(models) if models.is_empty() => {
            eprintln!("No models installed.");
            Ok(ExitCode::SUCCESS)
        }
        Ok(models) => {
            for model in models {
                println!("{}", model);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Could not reach Ollama at {}: {}", runtime.endpoint(), e);
            Ok(ExitCode::from(EXIT_UNREACHABLE))
        }
    }
}
