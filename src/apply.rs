//! Executes a migration plan.

use colored::Colorize;

use crate::error::Error;
use crate::migration::{MigrationId, MigrationPlan};

/// Applies every migration of `plan` in order through the two supplied
/// operations: `get_script` loads a script's SQL, `exec` runs it.
///
/// Stops at the first failure and returns its error without touching
/// the remaining migrations. Recording the new current migration after
/// success is the caller's job, as is restoring the database after
/// failure.
pub fn apply<G, E>(plan: &MigrationPlan, mut get_script: G, mut exec: E) -> Result<(), Error>
where
    G: FnMut(&MigrationId) -> Result<String, Error>,
    E: FnMut(&str) -> Result<(), Error>,
{
    println!("Migrations started to apply...");
    for group in plan {
        for migration in &group.migrations {
            let label = format!("{} {}", group.version, migration.name());
            tracing::debug!("Applied: {label}");

            let sql = match get_script(migration) {
                Ok(sql) => sql,
                Err(err) => {
                    eprintln!("Error applying migration: {}", label.red());
                    return Err(err);
                }
            };
            if let Err(err) = exec(&sql) {
                eprintln!("Error applying migration: {}", label.red());
                return Err(err);
            }
            println!("Ready: {}", label.green());
        }
    }
    println!("Migrations have been applied.");
    Ok(())
}
