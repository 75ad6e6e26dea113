use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use studycards::api::server::ServerError;
use studycards::client::{
    ClientError, EventOutcome, GenerationSource, HttpGenerationClient, SessionDriver,
    SessionStatus,
};
use studycards::config::{self, ConfigError, ServerConfig};
use studycards::models::Mode;
use studycards::pipeline::backend::{BackendError, GeminiBackend};
use studycards::pipeline::encoder::{self, EncodeError};
use studycards::pipeline::GenerationHandler;

/// Turn a PDF into quizzes, flashcards and match-pairs.
#[derive(Parser)]
#[command(name = "studycards", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve POST /generate and GET /health
    Serve {
        /// Listen address (overrides STUDYCARDS_BIND)
        #[arg(long)]
        bind: Option<String>,

        /// Gemini model (overrides STUDYCARDS_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// Generation time limit in seconds (overrides STUDYCARDS_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Generate study sets for a PDF, one mode after another
    Run {
        /// PDF to upload
        pdf: PathBuf,

        /// Modes to activate in order (normalQuiz, learn, flashCard, match)
        #[arg(long = "mode", value_parser = parse_mode, default_value = "normalQuiz")]
        modes: Vec<Mode>,

        /// Generation server
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Call Gemini in-process instead of a server
        #[arg(long, conflicts_with = "server")]
        local: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Generation(String),
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    raw.parse::<Mode>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    studycards::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            bind,
            model,
            timeout_secs,
        } => serve(bind, model, timeout_secs).await,
        Commands::Run {
            pdf,
            modes,
            server,
            local,
        } => run(pdf, modes, server, local).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "studycards failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(
    bind: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<ServerConfig, CliError> {
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = bind {
        config.bind_addr = config::parse_bind_addr(&bind)?;
    }
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(secs) = timeout_secs.filter(|s| *s > 0) {
        config.generation_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

fn gemini_handler(config: &ServerConfig) -> Result<GenerationHandler, CliError> {
    let backend = GeminiBackend::from_config(config)?;
    Ok(GenerationHandler::new(Arc::new(backend)).with_timeout(config.generation_timeout))
}

async fn serve(
    bind: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<(), CliError> {
    let config = load_config(bind, model, timeout_secs)?;
    let handler = Arc::new(gemini_handler(&config)?);
    let bind_addr: SocketAddr = config.bind_addr;

    tracing::info!(
        app = config::APP_NAME,
        version = config::APP_VERSION,
        model = %config.model,
        "Starting generation server"
    );
    let mut server = studycards::api::start_server(handler, bind_addr).await?;
    println!("Listening on http://{}", server.session.server_addr);

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    server.wait().await;
    Ok(())
}

async fn run(pdf: PathBuf, modes: Vec<Mode>, server: String, local: bool) -> Result<(), CliError> {
    let source: Arc<dyn GenerationSource> = if local {
        let config = load_config(None, None, None)?;
        Arc::new(gemini_handler(&config)?)
    } else {
        let client = HttpGenerationClient::new(&server)?;
        let health = client.health().await?;
        tracing::info!(%server, version = %health.version, backend = %health.backend, "Connected");
        Arc::new(client)
    };

    let file = encoder::read_file(&pdf)?;
    let mut driver = SessionDriver::new(source);
    for notice in driver.upload_selection(&[file]) {
        eprintln!("{notice}");
    }

    let mut failures = 0;
    for mode in modes {
        if let Some(notice) = driver.activate_mode(mode) {
            eprintln!("{notice}");
            failures += 1;
            continue;
        }

        while let Some(outcome) = driver.next_update().await {
            match outcome {
                EventOutcome::Updated => {
                    if let Some(label) = driver.session().progress_label() {
                        eprintln!("[{mode}] {label} ({:.0}%)", driver.session().progress() * 100.0);
                    }
                }
                EventOutcome::Failed(notice) => {
                    eprintln!("[{mode}] {notice}");
                    if let Some(error) = driver.session().last_error() {
                        tracing::warn!(%mode, error = %error, "Generation failed");
                    }
                }
                EventOutcome::Completed | EventOutcome::Ignored => {}
            }
        }

        if driver.session().status() == SessionStatus::Complete {
            let items = serde_json::to_string_pretty(driver.session().items())
                .map_err(|e| CliError::Generation(e.to_string()))?;
            println!("{items}");
        } else {
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(CliError::Generation(format!("{failures} generation(s) failed")));
    }
    Ok(())
}
