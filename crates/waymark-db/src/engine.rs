use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};
use waymark_common::{Error, Result};

use crate::ledger::{LedgerOptions, LedgerStore};
use crate::migration::{MigrateFn, Migration};
use crate::source::MigrationSource;

/// Applies migrations against one SQLite connection, each exactly once.
///
/// The engine is an ordinary value: construct one per database and pass it
/// around. It assumes it is the only writer to the ledger for the duration
/// of [`run`](Self::run); two engines racing on the same file can
/// double-apply a migration.
pub struct MigrationEngine {
    conn: Connection,
    ledger: LedgerStore,
    init_schema: Option<Arc<MigrateFn>>,
}

/// Outcome of a successful [`MigrationEngine::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Migrations whose action ran during this call, in order.
    pub applied: Vec<String>,
    /// Migrations already in the ledger.
    pub skipped: Vec<String>,
    /// Set when the initial schema ran and every migration was marked
    /// without executing.
    pub bootstrapped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub id: String,
    pub applied: bool,
}

impl MigrationEngine {
    pub fn new(conn: Connection, options: &LedgerOptions) -> Result<Self> {
        let ledger = LedgerStore::new(options)?;
        Ok(Self {
            conn,
            ledger,
            init_schema: None,
        })
    }

    /// Open (or create) a database file. Ledger names are checked before the
    /// file is touched.
    pub fn open(db_path: &Path, options: &LedgerOptions) -> Result<Self> {
        LedgerStore::new(options)?;
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Self::new(conn, options)
    }

    pub fn in_memory(options: &LedgerOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::new(conn, options)
    }

    /// Set the shortcut used on a database with an empty ledger: the
    /// function builds the whole current schema, and every listed migration
    /// is then recorded as applied without running.
    pub fn with_init_schema<F>(mut self, init_schema: F) -> Self
    where
        F: Fn(&Connection) -> Result<()> + Send + Sync + 'static,
    {
        self.init_schema = Some(Arc::new(init_schema));
        self
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run every migration in `migrations` that the ledger has not seen.
    ///
    /// Stops at the first error. Migrations after the failing one are not
    /// attempted and the failing one is not recorded, so calling `run` again
    /// resumes from it.
    pub fn run(&mut self, migrations: &[Migration]) -> Result<RunReport> {
        self.ledger.ensure_table_exists(&self.conn)?;

        if let Some(init_schema) = self.init_schema.clone() {
            if self.ledger.is_empty(&self.conn)? {
                return self.bootstrap(&*init_schema, migrations);
            }
        }

        let mut report = RunReport::default();
        for migration in migrations {
            let id = migration.id();
            if id.is_empty() {
                return Err(missing_id());
            }

            if self.ledger.has_applied(&self.conn, id)? {
                debug!("migration {id} already applied, skipping");
                report.skipped.push(id.to_string());
                continue;
            }

            self.apply(migration)?;
            report.applied.push(id.to_string());
        }

        info!(
            "migrations complete: {} applied, {} already up to date",
            report.applied.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// [`run`](Self::run) over whatever `source` currently supplies.
    pub fn run_source(&mut self, source: &dyn MigrationSource) -> Result<RunReport> {
        let migrations = source.migrations()?;
        self.run(&migrations)
    }

    /// Applied/pending state of each migration, in list order.
    pub fn status(&self, migrations: &[Migration]) -> Result<Vec<MigrationStatus>> {
        self.ledger.ensure_table_exists(&self.conn)?;
        let mut statuses = Vec::with_capacity(migrations.len());
        for migration in migrations {
            let id = migration.id();
            let applied = !id.is_empty() && self.ledger.has_applied(&self.conn, id)?;
            statuses.push(MigrationStatus {
                id: id.to_string(),
                applied,
            });
        }
        Ok(statuses)
    }

    fn bootstrap(
        &mut self,
        init_schema: &MigrateFn,
        migrations: &[Migration],
    ) -> Result<RunReport> {
        if migrations.iter().any(|m| m.id().is_empty()) {
            return Err(missing_id());
        }

        info!("empty migration ledger, running initial schema");
        self.in_transaction(init_schema).map_err(|e| Error::InitSchema(Box::new(e)))?;

        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Store(format!("failed to begin transaction: {e}")))?;
        for migration in migrations {
            self.ledger.mark_applied(&tx, migration.id())?;
        }
        tx.commit()
            .map_err(|e| Error::Store(format!("failed to commit ledger entries: {e}")))?;

        info!("initial schema applied, {} migrations marked", migrations.len());
        Ok(RunReport {
            applied: Vec::new(),
            skipped: migrations.iter().map(|m| m.id().to_string()).collect(),
            bootstrapped: true,
        })
    }

    fn apply(&mut self, migration: &Migration) -> Result<()> {
        let id = migration.id();
        info!("applying migration {id}");
        self.in_transaction(|conn| migration.apply(conn))
            .map_err(|e| Error::MigrationAction {
                id: id.to_string(),
                source: Box::new(e),
            })?;

        self.ledger.mark_applied(&self.conn, id).inspect_err(|e| {
            warn!("migration {id} committed but could not be recorded: {e}");
        })
    }

    /// Run `action` in its own transaction. Any error rolls it back.
    fn in_transaction<F>(&mut self, action: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        // Dropping `tx` on the error path rolls back.
        action(&*tx)?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit: {e}")))
    }
}

fn missing_id() -> Error {
    Error::Validation("missing ID in migration".into())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn engine() -> MigrationEngine {
        MigrationEngine::in_memory(&LedgerOptions::default()).unwrap()
    }

    /// A migration that appends its id to `log` when it runs.
    fn logged(id: &str, log: &Arc<Mutex<Vec<String>>>) -> Migration {
        let log = Arc::clone(log);
        let name = id.to_string();
        Migration::new(id, move |_| {
            log.lock().unwrap().push(name.clone());
            Ok(())
        })
    }

    fn failing(id: &str) -> Migration {
        Migration::new(id, |_| Err(Error::Database("boom".into())))
    }

    #[test]
    fn runs_pending_in_order_and_records() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        let migrations = vec![logged("a", &log), logged("b", &log), logged("c", &log)];

        let report = engine.run(&migrations).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(report.applied, vec!["a", "b", "c"]);
        assert!(report.skipped.is_empty());
        assert!(!report.bootstrapped);
        assert_eq!(
            engine.ledger().applied_ids(engine.connection()).unwrap(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn second_run_invokes_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        let migrations = vec![logged("a", &log), logged("b", &log)];

        engine.run(&migrations).unwrap();
        let report = engine.run(&migrations).unwrap();

        assert_eq!(log.lock().unwrap().len(), 2);
        assert!(report.applied.is_empty());
        assert_eq!(report.skipped, vec!["a", "b"]);
    }

    #[test]
    fn skips_only_applied_entries() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        engine.ledger().ensure_table_exists(engine.connection()).unwrap();
        engine.ledger().mark_applied(engine.connection(), "b").unwrap();

        let migrations = vec![logged("a", &log), logged("b", &log), logged("c", &log)];
        engine.run(&migrations).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn input_order_wins_over_lexical_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        let migrations = vec![logged("z", &log), logged("a", &log)];

        engine.run(&migrations).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["z", "a"]);
    }

    #[test]
    fn failure_stops_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        let migrations = vec![logged("a", &log), failing("b"), logged("c", &log)];

        let err = engine.run(&migrations).unwrap_err();

        assert_eq!(err.failed_migration(), Some("b"));
        assert!(matches!(
            &err,
            Error::MigrationAction { source, .. } if matches!(**source, Error::Database(_))
        ));
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        let conn = engine.connection();
        assert!(engine.ledger().has_applied(conn, "a").unwrap());
        assert!(!engine.ledger().has_applied(conn, "b").unwrap());
        assert!(!engine.ledger().has_applied(conn, "c").unwrap());
    }

    #[test]
    fn unrecorded_commit_aborts_before_next_migration() {
        let mut engine = engine();
        let migrations = vec![
            Migration::from_sql(
                "a",
                [
                    "CREATE TABLE foo (id INTEGER PRIMARY KEY)",
                    "DROP TABLE _migrations",
                ],
            ),
            Migration::from_sql("b", ["CREATE TABLE bar (id INTEGER PRIMARY KEY)"]),
        ];

        let err = engine.run(&migrations).unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        let table_exists = |name: &str| -> bool {
            engine
                .connection()
                .query_row(
                    "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [name],
                    |row| row.get(0),
                )
                .unwrap()
        };
        assert!(table_exists("foo"));
        assert!(!table_exists("bar"));
    }

    #[test]
    fn failed_action_is_rolled_back() {
        let mut engine = engine();
        let migrations = vec![Migration::new("half", |conn| {
            conn.execute_batch("CREATE TABLE partial (id INTEGER)")
                .map_err(|e| Error::Database(e.to_string()))?;
            Err(Error::Database("second statement failed".into()))
        })];

        engine.run(&migrations).unwrap_err();

        let exists: bool = engine
            .connection()
            .query_row(
                "SELECT count(*) > 0 FROM sqlite_master WHERE name = 'partial'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!exists);
    }

    #[test]
    fn retry_after_fix_resumes_at_failed_migration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();

        engine
            .run(&[logged("a", &log), failing("b"), logged("c", &log)])
            .unwrap_err();
        let report = engine
            .run(&[logged("a", &log), logged("b", &log), logged("c", &log)])
            .unwrap();

        assert_eq!(report.skipped, vec!["a"]);
        assert_eq!(report.applied, vec!["b", "c"]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_id_aborts_before_later_migrations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        let migrations = vec![logged("a", &log), logged("", &log), logged("c", &log)];

        let err = engine.run(&migrations).unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert!(!engine.ledger().has_applied(engine.connection(), "c").unwrap());
    }

    #[test]
    fn bootstrap_marks_everything_without_running() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let init_calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&init_calls);
        let mut engine = engine().with_init_schema(move |conn| {
            *counter.lock().unwrap() += 1;
            conn.execute_batch("CREATE TABLE foo (id INTEGER PRIMARY KEY, bar TEXT)")
                .map_err(|e| Error::Database(e.to_string()))
        });
        let migrations = vec![logged("a", &log), logged("b", &log)];

        let report = engine.run(&migrations).unwrap();

        assert!(report.bootstrapped);
        assert_eq!(*init_calls.lock().unwrap(), 1);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(
            engine.ledger().applied_ids(engine.connection()).unwrap(),
            vec!["a", "b"]
        );

        // Ledger is no longer empty, so the shortcut does not fire again.
        let mut migrations = migrations;
        migrations.push(logged("c", &log));
        let report = engine.run(&migrations).unwrap();
        assert!(!report.bootstrapped);
        assert_eq!(*init_calls.lock().unwrap(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["c"]);
    }

    #[test]
    fn failed_bootstrap_writes_no_ledger_entries() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine =
            engine().with_init_schema(|_| Err(Error::Database("cannot build schema".into())));

        let err = engine.run(&[logged("a", &log)]).unwrap_err();

        assert!(matches!(err, Error::InitSchema(_)));
        assert_eq!(err.failed_migration(), None);
        assert!(engine.ledger().is_empty(engine.connection()).unwrap());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn bootstrap_rejects_empty_id_before_init() {
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let mut engine = engine().with_init_schema(move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        let err = engine.run(&[Migration::new("", |_| Ok(()))]).unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn status_reports_pending_and_applied() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        engine.run(&[logged("a", &log)]).unwrap();

        let status = engine
            .status(&[logged("a", &log), logged("b", &log)])
            .unwrap();
        assert_eq!(
            status,
            vec![
                MigrationStatus {
                    id: "a".into(),
                    applied: true
                },
                MigrationStatus {
                    id: "b".into(),
                    applied: false
                },
            ]
        );
    }
}
