use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use waymark_common::TableSchema;

pub const DEFAULT_TABLE_NAME: &str = "_migrations";
pub const DEFAULT_ID_COLUMN: &str = "id";
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Top-level configuration, read from `waymark.yml` or `waymark.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Target table shapes used by `generate`.
    #[serde(default)]
    pub schema: Vec<TableSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file. Required for `migrate` and `status`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    #[serde(default = "default_table_name")]
    pub table_name: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_dir")]
    pub dir: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            id_column: default_id_column(),
            dir: default_dir(),
        }
    }
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MIGRATIONS_DIR)
}
