pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dialroute",
    about = "Dialroute operator CLI",
    long_about = "Operate the conversational routing runtime: readiness, migrations, demo rules, config inspection and offline classification.",
    after_help = "Examples:\n  dialroute doctor --json\n  dialroute seed\n  dialroute classify \"quiero pagar 50 mil\" --authenticated"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo collections routing rules, awaiting types and schedules")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model readiness, DB connectivity and routing rules")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Route one message against the bundled demo rules without a database")]
    Classify {
        #[arg(help = "Inbound message text")]
        message: String,
        #[arg(long, help = "Treat the conversation as authenticated")]
        authenticated: bool,
        #[arg(long, value_name = "TYPE", help = "Pending input type, e.g. dni or menu_selection")]
        awaiting: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Classify { message, authenticated, awaiting } => {
            commands::classify::run(&message, authenticated, awaiting)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
