//! Command-line argument surface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, DbParams};

/// Applies versioned SQL migration scripts to a PostgreSQL database,
/// with a pg_dump snapshot as the rollback safety net.
#[derive(Parser, Debug)]
#[command(name = "dbshift", version, about)]
pub struct Cli {
    /// Output detailed progress information, including skipped files
    /// and dump lifecycle messages
    #[arg(long)]
    pub verbose: bool,

    /// Host name of the machine on which the server is running
    #[arg(long, default_value = "")]
    pub host: String,

    /// Port on which the server is listening for connections
    #[arg(long, default_value = "")]
    pub port: String,

    /// Name of the database to which migrations should be applied. If
    /// errors occur when applying migrations, there should be no active
    /// connections to the database while it is being restored
    #[arg(long, default_value = "")]
    pub dbname: String,

    /// User name to connect as. To restore the database after a failed
    /// run the user must be able to connect to the 'postgres' database,
    /// drop the target database, and must be a member of its owner role
    #[arg(long, default_value = "")]
    pub username: String,

    /// Password to connect to the database
    #[arg(long, default_value = "")]
    pub password: String,

    /// Path to the directory with migration scripts
    #[arg(long, default_value = "")]
    pub migrations: String,

    /// Upgrade the database to the specified version (vX.Y.Z), or name
    /// the version the --migration target belongs to
    #[arg(long, default_value = "")]
    pub versiondb: String,

    /// Migration file name without extension (NNNN.Label). Updates the
    /// database to this migration within the --versiondb version, or
    /// within the current version if --versiondb is not given
    #[arg(long, default_value = "")]
    pub migration: String,
}

impl Cli {
    pub fn into_config(self) -> Config {
        Config {
            db: DbParams {
                host: self.host,
                port: self.port,
                dbname: self.dbname,
                user: self.username,
                password: self.password,
            },
            migrations_root: PathBuf::from(self.migrations),
            version_target: self.versiondb,
            migration_target: self.migration,
            verbose: self.verbose,
        }
    }
}
