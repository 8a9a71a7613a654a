//! Full-database dump artifacts via the `pg_dump` / `pg_restore` pair.
//!
//! A dump is taken immediately before a plan is applied and is the only
//! rollback mechanism the tool has: migrations themselves run without a
//! wrapping transaction. Restore recreates the whole database, so it
//! connects to the administrative `postgres` database and requires that
//! no session holds the target database.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{Datelike, Local, Timelike};

use crate::config::DbParams;
use crate::error::Error;

/// Directory next to the executable that holds the pg client tools.
const PG_TOOLS_DIR: &str = "pg_tools";
/// Directory next to the executable where dump files are written.
const DUMPS_DIR: &str = "dumps";

/// A point-in-time dump file. Its only observable attribute is the
/// path; the contents belong to pg_restore.
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates, restores, and deletes [Snapshot]s for one database.
pub struct SnapshotStore {
    db: DbParams,
    dump_bin: PathBuf,
    restore_bin: PathBuf,
    dumps_dir: PathBuf,
}

impl SnapshotStore {
    /// Utility and dump locations default to `pg_tools/` and `dumps/`
    /// next to the running executable.
    pub fn new(db: DbParams) -> Result<Self, Error> {
        let exe_dir = exe_dir()?;
        Ok(Self::with_paths(
            db,
            exe_dir.join(PG_TOOLS_DIR).join("pg_dump"),
            exe_dir.join(PG_TOOLS_DIR).join("pg_restore"),
            exe_dir.join(DUMPS_DIR),
        ))
    }

    /// Fully injected variant, so tests and deployments can point the
    /// utilities and the dump directory anywhere.
    pub fn with_paths(
        db: DbParams,
        dump_bin: PathBuf,
        restore_bin: PathBuf,
        dumps_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            dump_bin,
            restore_bin,
            dumps_dir,
        }
    }

    /// Dumps the whole database into a fresh timestamped file.
    pub fn create(&self) -> Result<Snapshot, Error> {
        std::fs::create_dir_all(&self.dumps_dir).map_err(|err| {
            Error::Snapshot(format!(
                "trying to create a directory '{}' to save the dumps, error: {err}",
                self.dumps_dir.display()
            ))
        })?;
        let snapshot = Snapshot {
            path: self.dumps_dir.join(self.dump_file_name()),
        };

        tracing::debug!("Dump is created...");
        let output = self.run(&self.dump_bin, self.dump_args(&snapshot))?;
        if !output.status.success() {
            // pg_dump leaves an empty dump file behind on failure
            return Err(Error::Snapshot(combined_output(&output)));
        }
        tracing::debug!("Dump created.");
        Ok(snapshot)
    }

    /// Restores the database from `snapshot`, dropping and recreating
    /// it. The caller must have released every session to the target
    /// database first; pg_restore connects to `postgres` and will
    /// refuse to drop a database that still has connections.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let output = self.run(&self.restore_bin, self.restore_args(snapshot))?;
        if !output.status.success() {
            let trimmed = trim_at_detail(&combined_output(&output));
            return Err(Error::Snapshot(format!("{trimmed}: {}", output.status)));
        }
        Ok(())
    }

    /// A paste-ready pg_restore invocation for the operator, with
    /// `--no-password` stripped so an interactive prompt can happen.
    pub fn recovery_command(&self, snapshot: &Snapshot) -> String {
        let command = format!(
            "{} {}",
            self.restore_bin.display(),
            self.restore_args(snapshot).join(" ")
        );
        command.replacen(" --no-password ", " ", 1)
    }

    pub fn delete(&self, snapshot: &Snapshot) -> Result<(), Error> {
        std::fs::remove_file(snapshot.path())?;
        Ok(())
    }

    fn run(&self, bin: &Path, args: Vec<String>) -> Result<Output, Error> {
        Command::new(bin)
            .args(args)
            .env("PGPASSWORD", &self.db.password)
            .output()
            .map_err(|err| Error::Snapshot(format!("failed to run {}: {err}", bin.display())))
    }

    fn dump_file_name(&self) -> String {
        let now = Local::now();
        format!(
            "{}_{}-{}-{}_{}-{}-{}.dump",
            self.db.dbname,
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.timestamp_millis()
        )
    }

    fn dump_args(&self, snapshot: &Snapshot) -> Vec<String> {
        vec![
            format!("--host={}", self.db.host),
            format!("--port={}", self.db.port),
            format!("--username={}", self.db.user),
            "--no-password".to_string(),
            "--format=custom".to_string(),
            "--create".to_string(),
            "--clean".to_string(),
            "--if-exists".to_string(),
            format!("--dbname={}", self.db.dbname),
            format!("--file={}", snapshot.path().display()),
        ]
    }

    // The restore first drops the existing database, then recreates it
    // from the dump, which is why it connects to 'postgres' instead of
    // the target. The user therefore needs: connect rights on
    // 'postgres', the right to drop the target database, and membership
    // in the owner role recorded in the dump.
    fn restore_args(&self, snapshot: &Snapshot) -> Vec<String> {
        vec![
            format!("--host={}", self.db.host),
            format!("--port={}", self.db.port),
            format!("--username={}", self.db.user),
            "--no-password".to_string(),
            "--format=custom".to_string(),
            "--create".to_string(),
            "--clean".to_string(),
            "--if-exists".to_string(),
            "--dbname=postgres".to_string(),
            snapshot.path().display().to_string(),
        ]
    }
}

fn exe_dir() -> Result<PathBuf, Error> {
    let exe = std::env::current_exe()?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

// pg_restore prints the interesting cause on its DETAIL: line; keep the
// output through the newline that follows the first one and drop the
// rest of the listing.
fn trim_at_detail(output: &str) -> String {
    if let Some(start) = output.find("DETAIL:") {
        if let Some(newline) = output[start..].find('\n') {
            return output[..start + newline + 1].to_string();
        }
    }
    output.to_string()
}

fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params() -> DbParams {
        DbParams {
            host: "localhost".to_string(),
            port: "5432".to_string(),
            dbname: "appdb".to_string(),
            user: "app".to_string(),
            password: "secret".to_string(),
        }
    }

    fn store_in(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::with_paths(
            params(),
            dir.path().join("pg_dump"),
            dir.path().join("pg_restore"),
            dir.path().join("dumps"),
        )
    }

    #[cfg(unix)]
    fn write_stub(path: &Path, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, script).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn recovery_command_strips_no_password() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let snapshot = Snapshot {
            path: dir.path().join("dumps").join("appdb_x.dump"),
        };
        let command = store.recovery_command(&snapshot);
        assert!(!command.contains("--no-password"));
        assert!(command.contains("--dbname=postgres"));
        assert!(command.ends_with("appdb_x.dump"));
    }

    #[test]
    fn dump_args_target_the_database_itself() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let snapshot = Snapshot {
            path: dir.path().join("dumps").join("appdb_x.dump"),
        };
        let args = store.dump_args(&snapshot);
        assert!(args.contains(&"--dbname=appdb".to_string()));
        assert!(args.contains(&"--format=custom".to_string()));
        assert!(args.contains(&"--if-exists".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--file=")));
    }

    #[test]
    fn trims_output_after_the_detail_line() {
        let output = "pg_restore: error: could not drop\nDETAIL: 1 session is using the database.\nHINT: close them\nmore noise\n";
        assert_eq!(
            trim_at_detail(output),
            "pg_restore: error: could not drop\nDETAIL: 1 session is using the database.\n"
        );
        assert_eq!(trim_at_detail("plain failure"), "plain failure");
    }

    #[cfg(unix)]
    #[test]
    fn create_produces_a_timestamped_dump_path() {
        let dir = TempDir::new().unwrap();
        write_stub(&dir.path().join("pg_dump"), "#!/bin/sh\nexit 0\n");
        let store = store_in(&dir);

        let snapshot = store.create().unwrap();
        assert!(dir.path().join("dumps").is_dir());
        let file_name = snapshot.path().file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("appdb_"));
        assert!(file_name.ends_with(".dump"));
    }

    #[cfg(unix)]
    #[test]
    fn create_surfaces_utility_output_on_failure() {
        let dir = TempDir::new().unwrap();
        write_stub(
            &dir.path().join("pg_dump"),
            "#!/bin/sh\necho 'pg_dump: error: connection failed' >&2\nexit 1\n",
        );
        let store = store_in(&dir);
        let err = store.create().unwrap_err();
        assert!(err.to_string().contains("connection failed"));
    }

    #[cfg(unix)]
    #[test]
    fn restore_trims_and_reports_failure() {
        let dir = TempDir::new().unwrap();
        write_stub(
            &dir.path().join("pg_restore"),
            "#!/bin/sh\necho 'error: could not drop database'\necho 'DETAIL: 1 other session.'\necho 'ignored tail'\nexit 1\n",
        );
        let store = store_in(&dir);
        let snapshot = Snapshot {
            path: dir.path().join("whatever.dump"),
        };
        let err = store.restore(&snapshot).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("DETAIL: 1 other session."));
        assert!(!message.contains("ignored tail"));
    }

    #[cfg(unix)]
    #[test]
    fn delete_removes_the_dump_file() {
        let dir = TempDir::new().unwrap();
        let dumps = dir.path().join("dumps");
        std::fs::create_dir_all(&dumps).unwrap();
        let path = dumps.join("appdb_1.dump");
        std::fs::write(&path, b"dump").unwrap();
        let store = store_in(&dir);
        store.delete(&Snapshot { path: path.clone() }).unwrap();
        assert!(!path.exists());
    }
}
