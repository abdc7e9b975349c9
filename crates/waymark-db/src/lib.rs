pub mod engine;
pub mod generate;
pub mod ident;
pub mod ledger;
pub mod migration;
pub mod schema;
pub mod source;

pub use engine::{MigrationEngine, MigrationStatus, RunReport};
pub use generate::{GeneratedMigration, MigrationGenerator};
pub use ledger::{LedgerOptions, LedgerStore};
pub use migration::Migration;
pub use schema::baseline_statements;
pub use source::{DirectorySource, MigrationSource, StaticSource};
