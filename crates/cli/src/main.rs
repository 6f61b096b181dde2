mod config;
mod error;
mod logging;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use runtime::{DEFAULT_QUESTION, Input, OpenAiBackend, Orchestrator, Session, ToolRegistry};
use tokio_util::sync::CancellationToken;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "parley.toml";

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Tool calling chat against a local inference server", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./parley.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log tool calls to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and exit
    Ask {
        /// The question (a built-in demo question when omitted)
        question: Option<String>,
    },
    /// Start an interactive question loop
    Chat,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let config = load_config(cli.config.as_deref())?;
    let session = build_session(&config)?;
    tracing::info!(session = %session.id, "session started");

    let mut stdout = io::stdout();
    match cli.command {
        Some(Commands::Ask { question }) => {
            // Ctrl+C aborts the answer stream instead of killing mid-write
            let cancel = CancellationToken::new();
            let session = session.with_cancellation(cancel.clone());
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let question = question.unwrap_or_else(|| DEFAULT_QUESTION.to_string());
            session.run(Input::once(question), &mut stdout).await?;
        }
        Some(Commands::Chat) | None => {
            let stdin = io::stdin();
            session.run(Input::Lines(stdin.lock()), &mut stdout).await?;
        }
    }

    stdout.flush()?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None if Path::new(CONFIG_FILE).exists() => Path::new(CONFIG_FILE),
        None => return Ok(Config::default_config()),
    };

    let config = Config::load(path).map_err(|source| Error::Config {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn build_session(config: &Config) -> Result<Session<OpenAiBackend>> {
    let mut builder = OpenAiBackend::builder(&config.backend.base_url)
        .api_key(&config.backend.api_key);
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    let backend = builder.build().map_err(runtime::Error::Transport)?;
    tracing::info!(%backend, "using inference endpoint");

    let orchestrator =
        Orchestrator::new(backend, ToolRegistry::builtin()).with_config(config.orchestrator());
    Ok(Session::new(orchestrator))
}
