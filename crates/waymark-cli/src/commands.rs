use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use waymark_common::Error;
use waymark_config::{AppConfig, ConfigLoader};
use waymark_db::{
    DirectorySource, GeneratedMigration, LedgerOptions, MigrationEngine, MigrationGenerator,
    MigrationSource, MigrationStatus, RunReport,
};

use crate::cli::Cli;

/// Config file merged with command-line overrides.
pub struct Settings {
    pub config: AppConfig,
    pub database: Option<PathBuf>,
    pub dir: PathBuf,
}

impl Settings {
    pub fn resolve(cli: &Cli, cwd: &Path) -> Result<Self> {
        let loader = match &cli.config {
            Some(path) => ConfigLoader::from_path(path),
            None => ConfigLoader::discover(cwd),
        };
        let config = loader.load().context("failed to load configuration")?;

        let database = cli.database.clone().or_else(|| config.database.path.clone());
        let dir = cli
            .dir
            .clone()
            .unwrap_or_else(|| config.migrations.dir.clone());

        Ok(Self {
            config,
            database,
            dir,
        })
    }

    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            table_name: self.config.migrations.table_name.clone(),
            id_column: self.config.migrations.id_column.clone(),
        }
    }

    pub fn source(&self) -> DirectorySource {
        DirectorySource::new(&self.dir).with_schemas(self.config.schema.clone())
    }

    fn open_engine(&self) -> Result<MigrationEngine> {
        let Some(path) = &self.database else {
            return Err(Error::Config(
                "no database configured: set database.path or pass --database".into(),
            )
            .into());
        };
        let engine = MigrationEngine::open(path, &self.ledger_options())
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(engine)
    }
}

pub fn migrate(settings: &Settings) -> Result<RunReport> {
    let mut engine = settings.open_engine()?;
    let report = engine
        .run_source(&settings.source())
        .context("migration run aborted")?;
    Ok(report)
}

pub fn generate(settings: &Settings, name: &str) -> Result<GeneratedMigration> {
    let source = settings.source();
    let generated = MigrationGenerator::new(source.dir())
        .generate(name, &source.schemas(), chrono::Utc::now())
        .with_context(|| format!("failed to generate migration {name:?}"))?;
    Ok(generated)
}

pub fn status(settings: &Settings) -> Result<Vec<MigrationStatus>> {
    let engine = settings.open_engine()?;
    let migrations = settings.source().migrations()?;
    let statuses = engine.status(&migrations)?;
    Ok(statuses)
}

pub fn print_report(report: &RunReport) {
    if report.bootstrapped {
        println!(
            "Initial schema applied; {} migrations marked as applied.",
            report.skipped.len()
        );
        return;
    }
    for id in &report.applied {
        println!("applied  {id}");
    }
    if report.applied.is_empty() {
        println!("Database is up to date ({} migrations).", report.skipped.len());
    } else {
        println!(
            "{} applied, {} already up to date.",
            report.applied.len(),
            report.skipped.len()
        );
    }
}

pub fn print_status(statuses: &[MigrationStatus], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(statuses)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("No migrations found.");
        return Ok(());
    }
    for status in statuses {
        let state = if status.applied { "applied" } else { "pending" };
        println!("{state:<8} {}", status.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn settings_for(args: &[&str], cwd: &Path) -> Settings {
        let cli = Cli::try_parse_from(args).unwrap();
        Settings::resolve(&cli, cwd).unwrap()
    }

    #[test]
    fn migrate_without_database_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(&["waymark", "migrate"], dir.path());
        settings.database = None;

        let err = migrate(&settings).unwrap_err();
        let root = err.downcast_ref::<Error>().unwrap();
        assert!(matches!(root, Error::Config(_)));
    }

    #[test]
    fn generate_then_migrate_then_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("waymark.yml"),
            "schema:
  - name: notes
    columns:
      - name: id
        type: INTEGER
        primary_key: true
      - name: body
        type: TEXT
",
        )
        .unwrap();
        let db = dir.path().join("app.db");
        let migrations = dir.path().join("migrations");
        let args = [
            "waymark",
            "migrate",
            "--database",
            db.to_str().unwrap(),
            "--dir",
            migrations.to_str().unwrap(),
        ];
        let settings = settings_for(&args, dir.path());

        let generated = generate(&settings, "CreateNotes").unwrap();
        assert!(generated.path.starts_with(&migrations));

        let report = migrate(&settings).unwrap();
        assert_eq!(report.applied, vec![generated.id.clone()]);

        let again = migrate(&settings).unwrap();
        assert!(again.applied.is_empty());

        let statuses = status(&settings).unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].applied);
    }

    #[test]
    fn invalid_ledger_name_in_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("waymark.yml"),
            "migrations:\n  table_name: \"bad name\"\n",
        )
        .unwrap();
        let db = dir.path().join("app.db");
        let settings = settings_for(
            &["waymark", "migrate", "--database", db.to_str().unwrap()],
            dir.path(),
        );

        let err = migrate(&settings).unwrap_err();
        assert!(format!("{err:#}").contains("invalid ledger table name"));
    }
}
