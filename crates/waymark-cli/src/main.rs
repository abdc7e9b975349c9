mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::Settings;

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let settings = Settings::resolve(cli, &cwd)?;

    match &cli.command {
        Commands::Migrate => {
            let report = commands::migrate(&settings)?;
            commands::print_report(&report);
        }
        Commands::Generate(args) => {
            let generated = commands::generate(&settings, &args.name)?;
            println!("created {}", generated.path.display());
        }
        Commands::Status(args) => {
            let statuses = commands::status(&settings)?;
            commands::print_status(&statuses, args.json)?;
        }
    }
    Ok(())
}
