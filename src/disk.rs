//! On-disk migration tree access.
//!
//! The migrations root looks like:
//!
//! ```text
//! <root>/
//!   utils/
//!     GetCurrentVersion.sql
//!     HasCurrentVersion.sql      (optional; enables init-mode probing)
//!     UpdateCurrentVersion.sql   (must contain $1 and $2)
//!   v0.0.1/
//!     0001.InitSchema.sql
//!     0002.SeedData.sql
//!   v0.0.2/
//!     ...
//! ```
//!
//! Entries that do not look like version directories or migration
//! scripts are skipped with a debug note, so experimental files can sit
//! next to real history. A gap in the ordinal sequence of the accepted
//! scripts, by contrast, is a hard error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::migration::{MigrationGroup, MigrationId};
use crate::version::VersionId;

pub const PROBE_SQL: &str = "utils/HasCurrentVersion.sql";
pub const GET_SQL: &str = "utils/GetCurrentVersion.sql";
pub const UPDATE_SQL: &str = "utils/UpdateCurrentVersion.sql";

const SCRIPT_EXTENSION: &str = "sql";

/// Reads version directories, migration scripts, and the `utils/` SQL
/// templates under a single migrations root.
pub struct DiskSource {
    root: PathBuf,
}

impl DiskSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Every version directory under the root, ascending. Entries not
    /// starting with `v`, or starting with `v` but unparsable, are
    /// skipped.
    pub fn list_versions(&self) -> Result<Vec<VersionId>, Error> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.starts_with('v') {
                continue;
            }
            match VersionId::parse(name) {
                Ok(version) => versions.push(version),
                Err(err) => tracing::debug!("{name} is ignored. {err}"),
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Loads one version directory and validates the ordinal sequence
    /// of the accepted scripts.
    pub fn load_group(&self, version: &VersionId) -> Result<MigrationGroup, Error> {
        let dir = self.root.join(version.to_string());
        let entries = fs::read_dir(&dir).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Error::NotFound(format!("no migrations directory for {version}"))
            } else {
                Error::Io(err)
            }
        })?;

        let mut migrations = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let path = Path::new(name);
            if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
                tracing::debug!("{version} {name} is ignored because of a bad file extension.");
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match MigrationId::new(version.clone(), stem) {
                Ok(migration) => migrations.push(migration),
                Err(err) => tracing::debug!("{version} {name} is ignored, err: {err}"),
            }
        }
        migrations.sort_by_key(|m| m.ordinal());

        check_order(version, &migrations)?;
        Ok(MigrationGroup {
            version: version.clone(),
            migrations,
        })
    }

    /// The SQL text of one migration script.
    pub fn read_script(&self, migration: &MigrationId) -> Result<String, Error> {
        let path = self
            .root
            .join(migration.version().to_string())
            .join(format!("{}.{SCRIPT_EXTENSION}", migration.name()));
        fs::read_to_string(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Error::NotFound(format!(
                    "no script for the {} {} migration",
                    migration.version(),
                    migration.name()
                ))
            } else {
                Error::Io(err)
            }
        })
    }

    /// Whether the optional probe template exists. Its absence turns
    /// init-mode detection off entirely.
    pub fn has_probe_sql(&self) -> bool {
        self.root.join(PROBE_SQL).exists()
    }

    pub fn read_probe_sql(&self) -> Result<String, Error> {
        self.read_util(PROBE_SQL)
    }

    pub fn read_get_sql(&self) -> Result<String, Error> {
        self.read_util(GET_SQL)
    }

    /// The update template, with its two positional parameters checked
    /// up front so a bad template cannot strand a half-applied plan.
    pub fn read_update_sql(&self) -> Result<String, Error> {
        let sql = self.read_util(UPDATE_SQL)?;
        if !(sql.contains("$1") && sql.contains("$2")) {
            return Err(Error::Config(format!(
                "the {UPDATE_SQL} must have arguments $1 and $2"
            )));
        }
        Ok(sql)
    }

    fn read_util(&self, short_path: &str) -> Result<String, Error> {
        tracing::debug!("The {short_path} file is being read...");
        let path = self.root.join(short_path);
        fs::read_to_string(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Error::NotFound(format!("error reading {short_path}: {err}"))
            } else {
                Error::Io(err)
            }
        })
    }
}

fn check_order(version: &VersionId, migrations: &[MigrationId]) -> Result<(), Error> {
    for (i, migration) in migrations.iter().enumerate() {
        if migration.ordinal() != i + 1 {
            return Err(Error::Structure(format!(
                "wrong order of migrations, error on {version} {}",
                migration.name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn version(s: &str) -> VersionId {
        VersionId::parse(s).unwrap()
    }

    fn write_file(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn list_versions_sorts_and_skips_junk() {
        let dir = TempDir::new().unwrap();
        for name in ["v0.0.10", "v0.0.2", "utils", "vnot-a-version", "notes"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let source = DiskSource::new(dir.path());
        let versions = source.list_versions().unwrap();
        assert_eq!(versions, vec![version("v0.0.2"), version("v0.0.10")]);
    }

    #[test]
    fn load_group_sorts_by_ordinal() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "v0.0.3/0002.Clear.sql", "");
        write_file(dir.path(), "v0.0.3/0001.First.sql", "");
        write_file(dir.path(), "v0.0.3/0003.Hqwerty.sql", "");
        let source = DiskSource::new(dir.path());
        let group = source.load_group(&version("v0.0.3")).unwrap();
        let names: Vec<&str> = group.migrations.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["0001.First", "0002.Clear", "0003.Hqwerty"]);
    }

    #[test]
    fn load_group_ignores_malformed_entries() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "v0.0.3/0001.First.sql", "");
        write_file(dir.path(), "v0.0.3/02.Clear.sql", "");
        write_file(dir.path(), "v0.0.3/0002.Clear.lash", "");
        write_file(dir.path(), "v0.0.3/0002..sql", "");
        write_file(dir.path(), "v0.0.3/0002.Clear", "");
        write_file(dir.path(), "v0.0.3/0002.Good.sql", "");
        let source = DiskSource::new(dir.path());
        let group = source.load_group(&version("v0.0.3")).unwrap();
        let names: Vec<&str> = group.migrations.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["0001.First", "0002.Good"]);
    }

    #[test]
    fn load_group_rejects_ordinal_gap() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "v0.0.4/0002.hhh.sql", "");
        write_file(dir.path(), "v0.0.4/0003.jjj.sql", "");
        write_file(dir.path(), "v0.0.4/0004.kkk.sql", "");
        let source = DiskSource::new(dir.path());
        let err = source.load_group(&version("v0.0.4")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "wrong order of migrations, error on v0.0.4 0002.hhh"
        );
    }

    #[test]
    fn load_group_rejects_duplicate_ordinal() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "v0.0.4/0001.aaa.sql", "");
        write_file(dir.path(), "v0.0.4/0002.bbb.sql", "");
        write_file(dir.path(), "v0.0.4/0002.ccc.sql", "");
        let source = DiskSource::new(dir.path());
        let err = source.load_group(&version("v0.0.4")).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("wrong order of migrations, error on v0.0.4 0002."));
    }

    #[test]
    fn load_group_missing_directory() {
        let dir = TempDir::new().unwrap();
        let source = DiskSource::new(dir.path());
        let err = source.load_group(&version("v9.9.9")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn read_script_returns_contents() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "v0.0.3/0001.First.sql", "SELECT 1;");
        let source = DiskSource::new(dir.path());
        let migration =
            MigrationId::new(version("v0.0.3"), "0001.First").unwrap();
        assert_eq!(source.read_script(&migration).unwrap(), "SELECT 1;");

        let absent = MigrationId::new(version("v0.0.3"), "0002.Missing").unwrap();
        assert!(matches!(
            source.read_script(&absent).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn probe_sql_presence() {
        let dir = TempDir::new().unwrap();
        let source = DiskSource::new(dir.path());
        assert!(!source.has_probe_sql());
        write_file(dir.path(), PROBE_SQL, "SELECT COUNT(*)<>0 FROM lastMigration;");
        assert!(source.has_probe_sql());
        assert_eq!(
            source.read_probe_sql().unwrap(),
            "SELECT COUNT(*)<>0 FROM lastMigration;"
        );
    }

    #[test]
    fn update_sql_requires_both_parameters() {
        let dir = TempDir::new().unwrap();
        let source = DiskSource::new(dir.path());

        write_file(dir.path(), UPDATE_SQL, "UPDATE lastMigration SET version_db=$1;");
        let err = source.read_update_sql().unwrap_err();
        assert_eq!(
            err.to_string(),
            "the utils/UpdateCurrentVersion.sql must have arguments $1 and $2"
        );

        write_file(
            dir.path(),
            UPDATE_SQL,
            "UPDATE lastMigration SET version_db=$1, name=$2;",
        );
        assert!(source.read_update_sql().is_ok());
    }

    #[test]
    fn missing_util_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = DiskSource::new(dir.path());
        let err = source.read_get_sql().unwrap_err();
        assert!(err
            .to_string()
            .contains("error reading utils/GetCurrentVersion.sql"));
    }
}
