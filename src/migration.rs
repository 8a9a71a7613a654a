use crate::error::Error;
use crate::version::VersionId;

/// Identity of a single migration script: its version plus the
/// `NNNN.Label` file stem.
///
/// `NNNN` is exactly four decimal digits and encodes the 1-based
/// position of the script within its version. `Label` is at least three
/// characters and carries no further meaning to the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationId {
    version: VersionId,
    name: String,
}

impl MigrationId {
    pub fn new(version: VersionId, name: &str) -> Result<Self, Error> {
        if !is_valid_name(name) {
            return Err(Error::Config("incorrect migration name".to_string()));
        }
        Ok(Self {
            version,
            name: name.to_string(),
        })
    }

    pub fn version(&self) -> &VersionId {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 1-based position encoded in the `NNNN` prefix.
    pub fn ordinal(&self) -> usize {
        // the constructor only accepts four-digit prefixes
        self.name[..4].parse().unwrap_or(0)
    }
}

// File stem example: 0001.AddUsers
fn is_valid_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 2 {
        return false;
    }
    let (number, label) = (parts[0], parts[1]);
    if number.len() != 4 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    const MIN_LABEL_LENGTH: usize = 3;
    label.len() >= MIN_LABEL_LENGTH
}

/// Every migration belonging to one version, ordered by ordinal.
///
/// `DiskSource` enforces the density invariant (`migrations[i]` has
/// ordinal `i + 1`) when it loads a group; holders may assume it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationGroup {
    pub version: VersionId,
    pub migrations: Vec<MigrationId>,
}

/// Ordered group prefixes the applier will execute in full. Versions
/// ascend strictly and no group is empty; the last migration of the
/// last group is the run's target.
pub type MigrationPlan = Vec<MigrationGroup>;

/// Index of `migration` within `migrations`, by structural equality.
pub fn index_of(migrations: &[MigrationId], migration: &MigrationId) -> Option<usize> {
    migrations.iter().position(|m| m == migration)
}

/// `(group index, migration index)` of `migration` within `groups`.
/// Only the group whose version matches is searched.
pub fn locate(groups: &[MigrationGroup], migration: &MigrationId) -> Option<(usize, usize)> {
    groups
        .iter()
        .enumerate()
        .find(|(_, g)| g.version == *migration.version())
        .and_then(|(gi, g)| index_of(&g.migrations, migration).map(|mi| (gi, mi)))
}
