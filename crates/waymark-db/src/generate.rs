use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use heck::ToSnakeCase;
use tracing::info;
use waymark_common::{Error, Result, TableSchema};

use crate::schema::baseline_statements;

/// Writes new `.sql` migration files that [`DirectorySource`] picks up.
///
/// [`DirectorySource`]: crate::source::DirectorySource
pub struct MigrationGenerator {
    dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMigration {
    pub id: String,
    pub path: PathBuf,
    pub statements: Vec<String>,
}

impl MigrationGenerator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create `<dir>/<timestamp>_<name>.sql` holding the DDL for `schemas`.
    /// Never overwrites an existing file.
    pub fn generate(
        &self,
        name: &str,
        schemas: &[TableSchema],
        now: DateTime<Utc>,
    ) -> Result<GeneratedMigration> {
        let id = migration_id(name, now)?;
        let statements = baseline_statements(schemas)?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{id}.sql"));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::Validation(format!(
                    "migration file {} already exists",
                    path.display()
                )),
                _ => Error::Io(e),
            })?;
        file.write_all(render(&id, &statements, now).as_bytes())?;

        info!("generated migration {} at {}", id, path.display());
        Ok(GeneratedMigration {
            id,
            path,
            statements,
        })
    }
}

/// `<UTC %Y%m%d%H%M%S>_<snake_case name>`, so lexical order is creation order.
pub fn migration_id(name: &str, now: DateTime<Utc>) -> Result<String> {
    let snake = name.to_snake_case();
    if snake.is_empty() {
        return Err(Error::Validation(format!(
            "migration name {name:?} has no usable characters"
        )));
    }
    Ok(format!("{}_{snake}", now.format("%Y%m%d%H%M%S")))
}

fn render(id: &str, statements: &[String], now: DateTime<Utc>) -> String {
    let mut out = format!(
        "-- migration: {id}\n-- generated: {}\n\n",
        now.format("%Y-%m-%dT%H:%M:%SZ")
    );
    if statements.is_empty() {
        out.push_str("-- add statements here\n");
    }
    for statement in statements {
        out.push_str(statement);
        out.push_str(";\n");
    }
    out
}
