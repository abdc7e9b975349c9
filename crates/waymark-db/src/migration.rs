use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use waymark_common::{Error, Result};

/// Signature of a migration body and of the initial-schema shortcut.
///
/// The connection handed in is the migration's own transaction.
pub type MigrateFn = dyn Fn(&Connection) -> Result<()> + Send + Sync;

/// A named, immutable unit of schema change.
///
/// Identifiers are usually timestamp-prefixed (`20240101120000_add_users`)
/// so that list order and lexical order agree. The engine runs them in the
/// order given and never reorders.
#[derive(Clone)]
pub struct Migration {
    id: String,
    migrate: Arc<MigrateFn>,
}

impl Migration {
    pub fn new<F>(id: impl Into<String>, migrate: F) -> Self
    where
        F: Fn(&Connection) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            migrate: Arc::new(migrate),
        }
    }

    /// A migration that executes each statement in order.
    pub fn from_sql<I, S>(id: impl Into<String>, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statements: Vec<String> = statements.into_iter().map(Into::into).collect();
        Self::new(id, move |conn| {
            for statement in &statements {
                conn.execute_batch(statement)
                    .map_err(|e| Error::Database(format!("`{statement}`: {e}")))?;
            }
            Ok(())
        })
    }

    /// A migration whose body is a whole SQL script, e.g. a `.sql` file.
    /// The script runs inside the engine's transaction and must not issue
    /// `BEGIN`/`COMMIT` itself.
    pub fn from_script(id: impl Into<String>, script: impl Into<String>) -> Self {
        let script = script.into();
        Self::new(id, move |conn| {
            conn.execute_batch(&script)
                .map_err(|e| Error::Database(e.to_string()))
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn apply(&self, conn: &Connection) -> Result<()> {
        (self.migrate)(conn)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
