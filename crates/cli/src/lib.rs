pub mod commands;
pub mod driver;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dreampool_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, RoutingMode};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "dreampool",
    about = "DreamPool funding concierge CLI",
    long_about = "Collect a funding goal, amount, deadline and recipient through a guided conversation, replay scripted sessions, and inspect configuration.",
    after_help = "Examples:\n  dreampool chat\n  dreampool --routing model chat\n  dreampool replay session.txt\n  dreampool config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file (must exist)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the configured log level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Tool routing: fixed or model")]
    routing: Option<RoutingMode>,
    #[arg(long, global = true, help = "Override the per-turn tool call budget")]
    max_tool_calls: Option<u32>,
    #[arg(long, global = true, help = "Override the language model name")]
    model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive session on stdin/stdout")]
    Chat,
    #[command(about = "Run a script of utterances (one per line) through a session")]
    Replay {
        #[arg(help = "Script file; blank lines and lines starting with # are skipped")]
        script: PathBuf,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Replay { .. } => "replay",
            Self::Config => "config",
        }
    }
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            routing: self.routing,
            max_tool_calls_per_turn: self.max_tool_calls,
            llm_provider: None,
            llm_model: self.model.clone(),
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let overrides = cli.overrides();

    let options = LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        overrides: overrides.clone(),
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            let result = commands::CommandResult::failure(
                cli.command.name(),
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
            println!("{}", result.output);
            return ExitCode::from(result.exit_code);
        }
    };
    init_logging(&config);

    let result = match &cli.command {
        Command::Chat => commands::chat::run(&config),
        Command::Replay { script } => commands::replay::run(&config, script),
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(&config, cli.config.as_deref(), &overrides),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded in tests.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
