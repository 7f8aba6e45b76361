use anyhow::Result;
use clap::{Parser, Subcommand};
use hcterm::cli_adapter::TerminalRenderer;
use hcterm::config::Config;
use hcterm::coordinator::{self, Coordinator};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hcterm", version, about = "Terminal client for a streaming health consultation")]
struct Cli {
    /// TOML config file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a consultation and answer its questions from stdin
    Run {
        /// Symptom to open with; read from stdin when omitted
        #[arg(long)]
        symptom: Option<String>,

        /// Overrides server.base_url
        #[arg(long)]
        url: Option<String>,
    },
    /// Print the log a capture of server frames (JSON lines) produces
    Replay { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    init_tracing(&config.log.level);

    match cli.command {
        Command::Run { symptom, url } => {
            if let Some(url) = url {
                config.server.base_url = url;
            }
            let renderer = TerminalRenderer::new(std::io::stdout());
            let input = BufReader::new(tokio::io::stdin());
            let consultation = Coordinator::new(config, renderer)
                .run(symptom, input)
                .await?;
            info!(
                entries = consultation.log().len(),
                complete = consultation.is_complete(),
                "session finished"
            );
        }
        Command::Replay { file } => {
            let mut renderer = TerminalRenderer::new(std::io::stdout());
            let consultation = coordinator::replay(&file, &mut renderer)?;
            info!(
                entries = consultation.log().len(),
                state = ?consultation.state(),
                "replay finished"
            );
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match level.parse::<EnvFilter>() {
            Ok(filter) => filter,
            Err(err) => {
                eprintln!("WARN: log.level '{level}' is not a valid filter ({err}); using 'warn'");
                EnvFilter::new("warn")
            }
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
