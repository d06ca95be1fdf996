pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;

use caseflow_core::config::{AppConfig, LoadOptions, LogFormat};
use commands::gate::GateArgs;
use commands::simulate::{EventKindArg, SimulateArgs};

#[derive(Debug, Parser)]
#[command(
    name = "caseflow",
    about = "Caseflow operator CLI",
    long_about = "Manage the journey catalog database and dry-run exit gates and automation rules against journey files.",
    after_help = "Examples:\n  caseflow migrate\n  caseflow gate --template claims.json --config tenant.json --case case.json\n  caseflow simulate --template claims.json --event location --case-state in_progress"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo journey catalog and verify it")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Show the state key and field key a label canonicalizes to")]
    Key { label: String },
    #[command(about = "Check whether a case may leave its current state")]
    Gate {
        #[arg(long, help = "Template draft JSON (key, name, states, defaultState)")]
        template: PathBuf,
        #[arg(long, help = "Tenant journey configuration JSON")]
        config: Option<PathBuf>,
        #[arg(long, help = "Case JSON (state, fields, taskCompletions)")]
        case: PathBuf,
        #[arg(long, help = "Target state; checks the transition instead of the bare exit")]
        to: Option<String>,
    },
    #[command(about = "Decide what the automation rules would do with one inbound event")]
    Simulate {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        event: EventKindArg,
        #[arg(long, default_value = "+5500000000000")]
        sender: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long, default_value = "media/simulated.jpg")]
        media: String,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        longitude: f64,
        #[arg(long, help = "State of an open case for the sender; omit for no case")]
        case_state: Option<String>,
        #[arg(long, help = "Treat the sender as an existing vendor")]
        known_vendor: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Key { label } => commands::key::run(&label),
        Command::Gate { template, config, case, to } => commands::gate::run(GateArgs {
            template: &template,
            config: config.as_deref(),
            case: &case,
            to: to.as_deref(),
        }),
        Command::Simulate {
            template,
            config,
            event,
            sender,
            body,
            media,
            latitude,
            longitude,
            case_state,
            known_vendor,
        } => commands::simulate::run(SimulateArgs {
            template: &template,
            config: config.as_deref(),
            event,
            sender: &sender,
            body: &body,
            media: &media,
            latitude,
            longitude,
            case_state: case_state.as_deref(),
            known_vendor,
        }),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON payload.
fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
