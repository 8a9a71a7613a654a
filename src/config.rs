use std::path::PathBuf;

use crate::error::Error;

/// Connection parameters for the target database.
#[derive(Debug, Clone)]
pub struct DbParams {
    pub host: String,
    pub port: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

/// Runtime configuration for one run, as gathered from the command
/// line. Empty target strings mean "not given".
#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbParams,
    pub migrations_root: PathBuf,
    pub version_target: String,
    pub migration_target: String,
    pub verbose: bool,
}

impl Config {
    /// Fails fast, before any connection is opened, when a required
    /// parameter is missing.
    pub fn validate(&self) -> Result<(), Error> {
        let db = &self.db;
        if db.host.is_empty()
            || db.port.is_empty()
            || db.dbname.is_empty()
            || db.user.is_empty()
            || db.password.is_empty()
        {
            return Err(Error::Config(
                "Not all parameters for connection are specified. Familiarize yourself with \
                 them using -help."
                    .to_string(),
            ));
        }
        if self.migrations_root.as_os_str().is_empty() {
            return Err(Error::Config(
                "To view the current version of the database, the last applied migration, \
                 apply new migrations, specify the path to the directory with migration \
                 scripts in the -migrations parameter"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
