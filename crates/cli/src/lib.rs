pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "brokerflow",
    about = "Brokerflow workflow operator CLI",
    long_about = "Drive quote and claims workflows: resolve where a record resumes, complete and revisit stages, and inspect stored sessions.",
    after_help = "Examples:\n  brokerflow stages --family claims\n  brokerflow resolve --family claims --record CLM-1001 --status investigating\n  brokerflow complete --family claims --record CLM-1001 --stage review --data '{\"checklist\":{\"photos\":true}}'"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Identifies the workflow session a command operates on.
#[derive(Debug, Clone, Args)]
pub struct RecordArgs {
    #[arg(long, help = "Workflow family (quote|claims)")]
    pub family: String,
    #[arg(long, help = "Identifier of the quote or claim record")]
    pub record: String,
    #[arg(long, help = "Status of the record in the external system")]
    pub status: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "List registered stages and the external statuses that map to them")]
    Stages {
        #[arg(long, help = "Limit output to one family (quote|claims)")]
        family: Option<String>,
    },
    #[command(about = "Resolve the stage a record resumes on and store the session")]
    Resolve {
        #[command(flatten)]
        target: RecordArgs,
        #[arg(long, help = "Edit the claim record instead of resuming the workflow")]
        edit: bool,
    },
    #[command(about = "Show the stored workflow session for a record")]
    Show {
        #[command(flatten)]
        target: RecordArgs,
    },
    #[command(about = "Merge stage data and complete a stage through its completion gate")]
    Complete {
        #[command(flatten)]
        target: RecordArgs,
        #[arg(long, help = "Stage identifier to complete")]
        stage: String,
        #[arg(long, default_value = "{}", help = "JSON payload merged into the stage data")]
        data: String,
    },
    #[command(about = "Navigate to a completed, current, or next stage")]
    Goto {
        #[command(flatten)]
        target: RecordArgs,
        #[arg(long, help = "Stage identifier to navigate to")]
        stage: String,
    },
    #[command(about = "Restart the workflow for a record from its first stage")]
    Reset {
        #[command(flatten)]
        target: RecordArgs,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Stages { family } => commands::stages::run(family.as_deref()),
        Command::Resolve { target, edit } => commands::resolve::run(&target, edit),
        Command::Show { target } => commands::show::run(&target),
        Command::Complete { target, stage, data } => {
            commands::complete::run(&target, &stage, &data)
        }
        Command::Goto { target, stage } => commands::goto::run(&target, &stage),
        Command::Reset { target } => commands::reset::run(&target),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
