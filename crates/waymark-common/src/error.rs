use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("ledger store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration {id} failed")]
    MigrationAction {
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("initial schema failed")]
    InitSchema(#[source] Box<Error>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Identifier of the migration whose action failed, if any.
    pub fn failed_migration(&self) -> Option<&str> {
        match self {
            Error::MigrationAction { id, .. } => Some(id),
            _ => None,
        }
    }
}
