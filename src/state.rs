//! The current-migration record the target database keeps about itself.
//!
//! All three statements are supplied by the operator under `utils/` and
//! are opaque to the tool; the only contracts are "the probe returns a
//! single boolean", "the query exposes `version_db` and `name` columns",
//! and "the update takes two positional parameters".

use postgres::{Client, NoTls};

use crate::config::DbParams;
use crate::error::Error;
use crate::migration::MigrationId;
use crate::version::VersionId;

/// Seam between the planner/driver and the database's own record of its
/// schema version.
pub trait CurrentState {
    /// Runs the probe statement; expects a single boolean scalar.
    fn has_record(&mut self, probe_sql: &str) -> Result<bool, Error>;

    /// Runs the query statement; maps the first row by column name.
    fn get_record(&mut self, get_sql: &str) -> Result<MigrationId, Error>;

    /// Runs the update statement with `$1` = version, `$2` = name.
    fn update_record(&mut self, update_sql: &str, applied: &MigrationId) -> Result<(), Error>;
}

/// [CurrentState] over a live PostgreSQL connection.
pub struct StateStore<'a> {
    client: &'a mut Client,
}

impl<'a> StateStore<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    /// Runs an opaque migration script. Scripts may hold several
    /// statements, so they go through the simple-query protocol.
    pub fn exec_sql(&mut self, sql: &str) -> Result<(), Error> {
        self.client.batch_execute(sql)?;
        Ok(())
    }
}

impl CurrentState for StateStore<'_> {
    fn has_record(&mut self, probe_sql: &str) -> Result<bool, Error> {
        let row = self.client.query_one(probe_sql, &[])?;
        let available: bool = row.try_get(0)?;
        Ok(available)
    }

    fn get_record(&mut self, get_sql: &str) -> Result<MigrationId, Error> {
        let rows = self.client.query(get_sql, &[])?;
        let row = rows.first().ok_or_else(|| {
            Error::State("the current-version query returned no rows".to_string())
        })?;
        let version_db: String = row.try_get("version_db")?;
        let name: String = row.try_get("name")?;
        let version = VersionId::parse(&version_db)?;
        MigrationId::new(version, &name)
    }

    fn update_record(&mut self, update_sql: &str, applied: &MigrationId) -> Result<(), Error> {
        // Example template: UPDATE lastMigration SET version_db=$1, name=$2;
        let version = applied.version().to_string();
        self.client.execute(update_sql, &[&version, &applied.name()])?;
        Ok(())
    }
}

/// Opens a read-write session with the supplied credentials.
pub fn connect(params: &DbParams) -> Result<Client, Error> {
    tracing::debug!("Connecting to the database...");
    let conn_string = format!(
        "host={} port={} dbname={} user={} password={} target_session_attrs=read-write",
        params.host, params.port, params.dbname, params.user, params.password
    );
    let client = Client::connect(&conn_string, NoTls)?;
    tracing::debug!("Connection established.");
    Ok(client)
}
