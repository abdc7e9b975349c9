use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use waymark_common::{Error, Result};

use crate::ident::{is_valid_identifier, quote};

/// Names of the ledger table and its identifier column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOptions {
    pub table_name: String,
    pub id_column: String,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            table_name: "_migrations".to_string(),
            id_column: "id".to_string(),
        }
    }
}

/// Record of which migration identifiers have been applied.
///
/// One row per applied migration; the presence of a row is the only signal.
/// Rows are only ever inserted. Every query goes to the database, nothing is
/// cached between calls.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    table: String,
    column: String,
}

impl LedgerStore {
    pub fn new(options: &LedgerOptions) -> Result<Self> {
        if !is_valid_identifier(&options.table_name) {
            return Err(Error::Config(format!(
                "invalid ledger table name {:?}: expected letters, digits and underscores",
                options.table_name
            )));
        }
        if !is_valid_identifier(&options.id_column) {
            return Err(Error::Config(format!(
                "invalid ledger id column {:?}: expected letters, digits and underscores",
                options.id_column
            )));
        }
        Ok(Self {
            table: options.table_name.clone(),
            column: options.id_column.clone(),
        })
    }

    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        conn.query_row(
            "SELECT count(*) > 0 FROM sqlite_master \
             WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![self.table],
            |row| row.get(0),
        )
        .map_err(|e| Error::Store(format!("failed to check for table {}: {e}", self.table)))
    }

    /// Create the ledger table unless it is already there.
    pub fn ensure_table_exists(&self, conn: &Connection) -> Result<()> {
        if self.table_exists(conn)? {
            return Ok(());
        }

        let sql = format!(
            "CREATE TABLE {} ({} VARCHAR(255) PRIMARY KEY)",
            quote(&self.table),
            quote(&self.column)
        );
        conn.execute(&sql, [])
            .map_err(|e| Error::Store(format!("failed to create table {}: {e}", self.table)))?;
        info!("created migration ledger table {}", self.table);
        Ok(())
    }

    /// True when no migration has been recorded yet.
    pub fn is_empty(&self, conn: &Connection) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} LIMIT 1", quote(&self.table));
        let row: Option<i64> = conn
            .query_row(&sql, [], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Store(format!("failed to read {}: {e}", self.table)))?;
        Ok(row.is_none())
    }

    pub fn has_applied(&self, conn: &Connection, id: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote(&self.table),
            quote(&self.column)
        );
        let count: i64 = conn
            .query_row(&sql, params![id], |row| row.get(0))
            .map_err(|e| Error::Store(format!("failed to look up migration {id}: {e}")))?;
        Ok(count > 0)
    }

    /// Insert a row for `id`. A duplicate trips the primary key.
    pub fn mark_applied(&self, conn: &Connection, id: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?1)",
            quote(&self.table),
            quote(&self.column)
        );
        conn.execute(&sql, params![id])
            .map_err(|e| Error::Store(format!("failed to record migration {id}: {e}")))?;
        Ok(())
    }

    /// All recorded identifiers in lexical order.
    pub fn applied_ids(&self, conn: &Connection) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT {col} FROM {table} ORDER BY {col}",
            col = quote(&self.column),
            table = quote(&self.table)
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Store(format!("failed to prepare query: {e}")))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Store(format!("failed to read {}: {e}", self.table)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Store(format!("failed to read row: {e}")))?;
        Ok(ids)
    }
}
