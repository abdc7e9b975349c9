use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use waymark_common::{Error, Result, TableSchema};

use crate::migration::Migration;

/// Supplies the ordered migration list and, for generation, the target
/// schema descriptions.
pub trait MigrationSource {
    fn migrations(&self) -> Result<Vec<Migration>>;

    fn schemas(&self) -> Vec<TableSchema> {
        Vec::new()
    }
}

/// Migrations registered in code.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    migrations: Vec<Migration>,
    schemas: Vec<TableSchema>,
}

impl StaticSource {
    pub fn new(migrations: Vec<Migration>) -> Self {
        Self {
            migrations,
            schemas: Vec::new(),
        }
    }

    pub fn with_schemas(mut self, schemas: Vec<TableSchema>) -> Self {
        self.schemas = schemas;
        self
    }
}

impl MigrationSource for StaticSource {
    fn migrations(&self) -> Result<Vec<Migration>> {
        Ok(self.migrations.clone())
    }

    fn schemas(&self) -> Vec<TableSchema> {
        self.schemas.clone()
    }
}

/// Top-level `BEGIN`, `COMMIT`, `END TRANSACTION` or `ROLLBACK` statements.
/// Trigger bodies (`BEGIN` followed by statements, closed by a bare `END;`)
/// do not match.
static TRANSACTION_CONTROL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?im)^\s*(",
        r"BEGIN(\s+(DEFERRED|IMMEDIATE|EXCLUSIVE))?(\s+TRANSACTION)?",
        r"|(COMMIT|ROLLBACK)(\s+TRANSACTION)?",
        r"|END\s+TRANSACTION",
        r")\s*;",
    ))
    .expect("transaction control regex")
});

/// One migration per `*.sql` file in a directory, ordered by file name.
/// The file stem is the migration identifier.
///
/// Each file already runs inside its own transaction, so files must not
/// contain `BEGIN`/`COMMIT` themselves. Loading such a file is a
/// [`Error::Validation`].
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    schemas: Vec<TableSchema>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            schemas: Vec::new(),
        }
    }

    pub fn with_schemas(mut self, schemas: Vec<TableSchema>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sql_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            debug!("migrations directory {} does not exist", self.dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }
}

impl MigrationSource for DirectorySource {
    fn migrations(&self) -> Result<Vec<Migration>> {
        let mut migrations = Vec::new();
        for path in self.sql_files()? {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                return Err(Error::Validation(format!(
                    "migration file name is not valid UTF-8: {}",
                    path.display()
                )));
            };
            let script = std::fs::read_to_string(&path)?;
            if TRANSACTION_CONTROL.is_match(&script) {
                return Err(Error::Validation(format!(
                    "{} manages its own transaction; remove BEGIN/COMMIT, \
                     each migration already runs in one",
                    path.display()
                )));
            }
            migrations.push(Migration::from_script(id, script));
        }
        debug!(
            "loaded {} migrations from {}",
            migrations.len(),
            self.dir.display()
        );
        Ok(migrations)
    }

    fn schemas(&self) -> Vec<TableSchema> {
        self.schemas.clone()
    }
}
