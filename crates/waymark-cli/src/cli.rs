use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "waymark")]
#[command(about = "Apply-once schema migrations for SQLite")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to waymark.yml / waymark.toml in the current directory)
    #[arg(short, long, global = true, env = "WAYMARK_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides database.path from config)
    #[arg(short, long, global = true, env = "WAYMARK_DATABASE")]
    pub database: Option<PathBuf>,

    /// Migrations directory (overrides migrations.dir from config)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply every migration not yet recorded in the ledger
    Migrate,
    /// Write a new migration file from the configured schema
    Generate(GenerateArgs),
    /// Show which migrations are applied and which are pending
    Status(StatusArgs),
}

#[derive(clap::Args)]
pub struct GenerateArgs {
    /// Migration name, e.g. CreateUsers
    pub name: String,
}

#[derive(clap::Args)]
pub struct StatusArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
