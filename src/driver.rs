//! Top-level orchestration of one migration run.
//!
//! The driver owns the database connection and the snapshot for the
//! run's duration. The connection is always released before a restore:
//! pg_restore drops the target database and cannot while sessions
//! exist.

use std::sync::{Arc, Mutex, MutexGuard};

use postgres::Client;

use crate::apply;
use crate::config::Config;
use crate::disk::{DiskSource, UPDATE_SQL};
use crate::error::Error;
use crate::planner::{Planned, Planner};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::state::{self, CurrentState, StateStore};

/// The connection, shared with the interrupt watcher so it can be
/// released from there. `None` once taken.
type SharedClient = Arc<Mutex<Option<Client>>>;

/// Runs one full migration pipeline. A clean "nothing to do" is `Ok`;
/// any fatal condition, including a failed run whose database was
/// successfully restored, is `Err`.
pub fn run(config: &Config) -> Result<(), Error> {
    config.validate()?;

    let client: SharedClient = Arc::new(Mutex::new(Some(state::connect(&config.db)?)));
    let disk = DiskSource::new(&config.migrations_root);

    let planned = {
        let mut guard = lock(&client)?;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let mut store = StateStore::new(conn);
        Planner::new(&disk, &mut store).plan(&config.version_target, &config.migration_target)?
    };
    let plan = match planned {
        Planned::Done => {
            close(&client);
            return Ok(());
        }
        Planned::Apply(plan) => plan,
    };

    // the update template must be present and well-formed before
    // anything mutates
    let update_sql = disk.read_update_sql()?;

    let snapshots = SnapshotStore::new(config.db.clone())?;
    let snapshot = snapshots.create()?;
    install_interrupt_watcher(
        Arc::clone(&client),
        recovery_advice(&snapshots.recovery_command(&snapshot)),
    );

    let outcome = apply::apply(
        &plan,
        |migration| disk.read_script(migration),
        |sql| {
            let mut guard = lock(&client)?;
            let conn = guard.as_mut().ok_or_else(closed)?;
            StateStore::new(conn).exec_sql(sql)
        },
    );
    if let Err(err) = outcome {
        eprintln!("Error when applying migrations: {err}");
        return Err(restore_and_report(&client, &snapshots, &snapshot));
    }

    let last = plan
        .last()
        .and_then(|group| group.migrations.last())
        .cloned()
        .ok_or_else(|| Error::State("the migration plan is empty".to_string()))?;
    let updated = {
        let mut guard = lock(&client)?;
        let conn = guard.as_mut().ok_or_else(closed)?;
        tracing::debug!(
            "Information about the current database version and the last applied migration \
             is updated..."
        );
        StateStore::new(conn).update_record(&update_sql, &last)
    };
    if let Err(err) = updated {
        eprintln!("Error when executing a query from {UPDATE_SQL}: {err}");
        return Err(restore_and_report(&client, &snapshots, &snapshot));
    }

    if let Err(err) = snapshots.delete(&snapshot) {
        println!("Error when deleting dump file: {err}");
    } else {
        tracing::debug!("Dump deleted.");
    }
    close(&client);
    Ok(())
}

/// The failure path shared by a failed apply and a failed record
/// update: release the connection, restore from the snapshot, and
/// produce the error the caller exits with. When the restore itself
/// fails the dump file is preserved and the operator gets a paste-ready
/// command.
fn restore_and_report(
    client: &SharedClient,
    snapshots: &SnapshotStore,
    snapshot: &Snapshot,
) -> Error {
    close(client);
    println!("The database is being restored from the dump...");
    match snapshots.restore(snapshot) {
        Ok(()) => {
            println!("The database from the dump has been restored.");
            if let Err(err) = snapshots.delete(snapshot) {
                println!(
                    "Db recovery was successful, error in deleting dump file after recovery: {err}"
                );
            } else {
                tracing::debug!("Dump deleted.");
            }
            Error::Migration(
                "migrations were not applied, the database was restored from the dump"
                    .to_string(),
            )
        }
        Err(err) => Error::Snapshot(format!(
            "Error when restoring database from dump: {err}: {}",
            recovery_advice(&snapshots.recovery_command(snapshot))
        )),
    }
}

/// Registers the single-shot Ctrl+C watcher. Its only job is to release
/// the connection and hand the operator the recovery command; the dump
/// file stays on disk as the authoritative recovery point.
fn install_interrupt_watcher(client: SharedClient, advice: String) {
    let result = ctrlc::set_handler(move || {
        println!("\r- Ctrl+C pressed in Terminal");
        if let Ok(mut guard) = client.lock() {
            if let Some(conn) = guard.take() {
                let _ = conn.close();
            }
        }
        eprintln!("An error may have occurred when applying migrations: {advice}");
        std::process::exit(1);
    });
    if let Err(err) = result {
        tracing::debug!("could not install the interrupt handler: {err}");
    }
}

fn recovery_advice(recovery_command: &str) -> String {
    format!(
        "manually restore the database. You can try to restore the dump manually using the \
         command: {recovery_command}"
    )
}

fn lock(client: &SharedClient) -> Result<MutexGuard<'_, Option<Client>>, Error> {
    client
        .lock()
        .map_err(|_| Error::State("the connection guard is poisoned".to_string()))
}

fn closed() -> Error {
    Error::State("the database connection is closed".to_string())
}

fn close(client: &SharedClient) {
    if let Ok(mut guard) = client.lock() {
        if let Some(conn) = guard.take() {
            let _ = conn.close();
        }
    }
}
