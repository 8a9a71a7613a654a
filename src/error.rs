/// Error type for the dbshift crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Missing required flags, malformed versions or migration names.
    #[error("{0}")]
    Config(String),
    /// A directory, utility SQL file, or referenced migration is absent.
    #[error("{0}")]
    NotFound(String),
    /// Ordinal gaps inside a version directory.
    #[error("{0}")]
    Structure(String),
    /// A probe/read/update of the current-migration record failed
    /// outside the expected bootstrap case.
    #[error("{0}")]
    State(String),
    /// A migration script's SQL failed to execute.
    #[error("{0}")]
    Migration(String),
    /// The dump or restore subprocess failed.
    #[error("{0}")]
    Snapshot(String),
    #[error("{0}")]
    Db(#[from] postgres::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
