//! The migration planner.
//!
//! Turns the on-disk migration tree, the database's record of its own
//! version, and the two optional targets into either "nothing to do" or
//! an ordered plan of group prefixes ending at the target migration.

use colored::Colorize;

use crate::disk::DiskSource;
use crate::error::Error;
use crate::migration::{index_of, locate, MigrationGroup, MigrationId, MigrationPlan};
use crate::state::CurrentState;
use crate::version::VersionId;

/// Name synthesized for the current record when the database has no
/// record storage yet.
const INIT_MIGRATION_NAME: &str = "0000.InitMod";

/// Outcome of planning.
#[derive(Debug)]
pub enum Planned {
    /// Nothing to apply; the run ends successfully.
    Done,
    /// The ordered plan to hand to the applier.
    Apply(MigrationPlan),
}

pub struct Planner<'a> {
    disk: &'a DiskSource,
    state: &'a mut dyn CurrentState,
}

impl<'a> Planner<'a> {
    pub fn new(disk: &'a DiskSource, state: &'a mut dyn CurrentState) -> Self {
        Self { disk, state }
    }

    /// Runs the full planning pipeline. Empty target strings mean the
    /// target was not given on the command line.
    pub fn plan(
        &mut self,
        version_target: &str,
        migration_target: &str,
    ) -> Result<Planned, Error> {
        let init_mode = self.detect_init_mode()?;
        if init_mode {
            println!("Initialization mode - ON");
            println!(
                "Migrations will be applied starting from version {}",
                VersionId::zero()
            );
        }

        let current = self.current_record(init_mode)?;
        println!("Current database version: {}", current.version());
        println!("Last migration applied: {}", current.name());

        let groups = self.unapplied_groups(init_mode, &current)?;
        if groups.is_empty() {
            println!("No new migrations");
            return Ok(Planned::Done);
        }
        show_unapplied(&groups);

        if version_target.is_empty() {
            if init_mode {
                println!(
                    "WARNING. If you specify some version in -versiondb, migrations will be \
                     applied starting from {} version.",
                    VersionId::zero()
                );
                return Ok(Planned::Done);
            }
            if migration_target.is_empty() {
                return Ok(Planned::Done);
            }
        }

        let target = select_target(version_target, migration_target, &current, &groups)?;
        Ok(Planned::Apply(clip_to_target(&groups, &target)?))
    }

    /// Init-mode is on iff the probe template exists and the probe
    /// either returned `false` or failed. A failing probe is the
    /// expected bootstrap state ("relation does not exist"), so the
    /// error is logged and swallowed.
    fn detect_init_mode(&mut self) -> Result<bool, Error> {
        if !self.disk.has_probe_sql() {
            return Ok(false);
        }
        let probe_sql = self.disk.read_probe_sql()?;
        tracing::debug!("Checking availability database version and last applied migration...");
        match self.state.has_record(&probe_sql) {
            Ok(true) => Ok(false),
            Ok(false) => Ok(true),
            Err(err) => {
                tracing::debug!(
                    "The current version of the database is not available, error: {err}"
                );
                Ok(true)
            }
        }
    }

    fn current_record(&mut self, init_mode: bool) -> Result<MigrationId, Error> {
        if init_mode {
            return MigrationId::new(VersionId::zero(), INIT_MIGRATION_NAME);
        }
        let get_sql = self.disk.read_get_sql()?;
        self.state.get_record(&get_sql).map_err(|err| {
            Error::State(format!(
                "error when retrieving the current database version and the last applied \
                 migration: {err}"
            ))
        })
    }

    /// All not-yet-applied groups, ascending: the unapplied tail of the
    /// current version's group, then every strictly newer version's
    /// group. Empty groups are dropped. Past versions are never loaded,
    /// so their directories are never re-validated.
    fn unapplied_groups(
        &mut self,
        init_mode: bool,
        current: &MigrationId,
    ) -> Result<Vec<MigrationGroup>, Error> {
        tracing::debug!("The presence of new migrations in the migrations directory is analyzed...");
        let mut groups = Vec::new();

        let head = self.head_group(init_mode, current)?;
        if !head.migrations.is_empty() {
            groups.push(head);
        }

        for version in self.disk.list_versions()? {
            if version > *current.version() {
                let group = self.disk.load_group(&version)?;
                if !group.migrations.is_empty() {
                    groups.push(group);
                }
            }
        }

        tracing::debug!("Analysis successfully completed.");
        Ok(groups)
    }

    /// The unapplied part of the current version's own group. In
    /// init-mode that is the whole group, which must not be empty; in
    /// normal mode it is the suffix strictly after the current record,
    /// which must be present in the directory.
    fn head_group(
        &mut self,
        init_mode: bool,
        current: &MigrationId,
    ) -> Result<MigrationGroup, Error> {
        let group = self.disk.load_group(current.version())?;

        if init_mode {
            if group.migrations.is_empty() {
                return Err(Error::NotFound(format!(
                    "in initialization mode there should be migrations with version {}",
                    current.version()
                )));
            }
            return Ok(group);
        }

        let index = index_of(&group.migrations, current).ok_or_else(|| {
            Error::NotFound(format!(
                "the {} {} migration is not in the migrations directory",
                current.version(),
                current.name()
            ))
        })?;
        Ok(MigrationGroup {
            version: group.version.clone(),
            migrations: group.migrations[index + 1..].to_vec(),
        })
    }
}

/// Resolves the target migration from the two command-line targets.
/// With only a version target, it is the last migration of that
/// version's group; with a migration target, the version defaults to
/// the current one.
fn select_target(
    version_target: &str,
    migration_target: &str,
    current: &MigrationId,
    groups: &[MigrationGroup],
) -> Result<MigrationId, Error> {
    let version = if version_target.is_empty() {
        current.version().clone()
    } else {
        VersionId::parse(version_target)
            .map_err(|err| Error::Config(format!("wrong version in -versiondb: {err}")))?
    };

    if migration_target.is_empty() {
        let group = groups.iter().find(|g| g.version == version);
        match group.and_then(|g| g.migrations.last()) {
            Some(last) => Ok(last.clone()),
            None => Err(Error::Config(format!(
                "The {version} version is not in the list of migrations available for updating"
            ))),
        }
    } else {
        let candidate = MigrationId::new(version, migration_target).map_err(|err| {
            Error::Config(format!(
                "Incorrect migration from -versiondb and -migration parameters: {err}"
            ))
        })?;
        if locate(groups, &candidate).is_none() {
            return Err(Error::Config(format!(
                "The {} {} migration is not in the list of migrations available for updating",
                candidate.version(),
                candidate.name()
            )));
        }
        Ok(candidate)
    }
}

/// Copies every group strictly before the target's group in full, then
/// the target group's prefix through the target migration.
fn clip_to_target(
    groups: &[MigrationGroup],
    target: &MigrationId,
) -> Result<MigrationPlan, Error> {
    let (group_index, migration_index) = locate(groups, target).ok_or_else(|| {
        Error::Config(format!(
            "the {} {} migration or database version is not in the list of migrations \
             available for updating",
            target.version(),
            target.name()
        ))
    })?;

    let mut plan: MigrationPlan = groups[..group_index].to_vec();
    let last = &groups[group_index];
    plan.push(MigrationGroup {
        version: last.version.clone(),
        migrations: last.migrations[..=migration_index].to_vec(),
    });
    Ok(plan)
}

fn show_unapplied(groups: &[MigrationGroup]) {
    println!("Updates available:");
    for group in groups {
        println!("\n{}", group.version.to_string().green());
        for migration in &group.migrations {
            println!("    {}", migration.name().green());
        }
    }
}
