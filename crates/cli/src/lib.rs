pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use bushidage_core::config::{AppConfig, LoadOptions};
use commands::{decide, list, show, submit};

#[derive(Debug, Parser)]
#[command(
    name = "bushidage",
    about = "BushidageOA approval workflow CLI",
    long_about = "Submit, decide, and inspect multi-step approval requests backed by SQLite.",
    after_help = "Examples:\n  bushidage submit --type leave --title \"Annual leave\" --description \"3 days\" --user-id emp-001 --user-name \"Tanaka Yui\" --department Engineering\n  bushidage decide <id> --decision approve --user-id mgr-01 --user-name \"Department Manager\"\n  bushidage list --status pending\n  bushidage doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo requests (idempotent)")]
    Seed,
    #[command(about = "Submit a new approval request")]
    Submit(submit::SubmitArgs),
    #[command(about = "Approve or reject the current step of a request")]
    Decide(decide::DecideArgs),
    #[command(about = "Show one request with its steps and progress")]
    Show(show::ShowArgs),
    #[command(about = "List requests, newest first, with optional filters")]
    List(list::ListArgs),
    #[command(about = "Count requests by status and type")]
    Summary,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        if let Err(error) = logging::init(&config) {
            eprintln!("{error}");
        }
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Submit(args) => submit::run(args),
        Command::Decide(args) => decide::run(args),
        Command::Show(args) => show::run(args),
        Command::List(args) => list::run(args),
        Command::Summary => commands::summary::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn decide_arguments_parse() {
        let cli = Cli::try_parse_from([
            "bushidage",
            "decide",
            "apr-1",
            "--decision",
            "reject",
            "--comment",
            "Over budget",
            "--expected-version",
            "2",
            "--user-id",
            "mgr-01",
            "--user-name",
            "Department Manager",
        ])
        .expect("parse");

        match cli.command {
            Command::Decide(args) => {
                assert_eq!(args.id, "apr-1");
                assert_eq!(args.decision, "reject");
                assert_eq!(args.expected_version, Some(2));
                assert_eq!(args.actor.user_name, "Department Manager");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn submit_requires_identity() {
        let parsed = Cli::try_parse_from([
            "bushidage",
            "submit",
            "--type",
            "leave",
            "--title",
            "Annual leave",
            "--description",
            "3 days",
        ]);

        assert!(parsed.is_err());
    }
}
