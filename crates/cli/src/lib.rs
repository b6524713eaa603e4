pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rise",
    about = "Rise dealership assistant operator CLI",
    long_about = "Prepare the showroom database, inspect configuration, and exercise the \
                  price negotiation engine without going through the chat agent.",
    after_help = "Examples:\n  rise migrate\n  rise seed\n  rise negotiate --car-id 1 --offer 45000"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo showroom inventory unless the catalog already has cars")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run one negotiation round for a car and print the decision")]
    Negotiate {
        #[arg(long, help = "Id of the car to negotiate on")]
        car_id: i64,
        #[arg(long, help = "Customer offer in dollars, e.g. 45000 or 47,600.50")]
        offer: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Negotiate { car_id, offer } => commands::negotiate::run(car_id, &offer),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
