pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use platter_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};

#[derive(Debug, Parser)]
#[command(
    name = "platter",
    about = "Platter customization CLI",
    long_about = "Inspect configuration, check storefront readiness, and replay customization sessions against catalog fixtures.",
    after_help = "Examples:\n  platter doctor --json\n  platter config\n  platter customize --catalog catalog.json --product product.json --script steps.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and storefront client readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run a scripted customization session and print its JSON summary")]
    Customize(commands::customize::CustomizeArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    init_logging(&logging);

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Customize(args) => commands::customize::run(&args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr; stdout carries only command output.
pub fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging already initialized: {error}");
    }
}
