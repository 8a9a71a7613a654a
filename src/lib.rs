//! `dbshift` applies versioned SQL migration scripts to a PostgreSQL
//! database, using a full `pg_dump` snapshot as the rollback safety net
//! instead of per-script transactions.
//!
//! # How it works
//!
//! Migration history lives on disk as plain SQL files grouped by
//! version:
//!
//! ```text
//! migrations/
//!   utils/
//!     GetCurrentVersion.sql      -- SELECT returning version_db, name
//!     HasCurrentVersion.sql      -- optional; SELECT returning a boolean
//!     UpdateCurrentVersion.sql   -- must contain $1 and $2
//!   v0.0.1/
//!     0001.InitSchema.sql
//!     0002.SeedData.sql
//!   v0.0.2/
//!     0001.AddIndexes.sql
//! ```
//!
//! The database itself records the last applied migration, read and
//! written through the operator-supplied statements under `utils/`.
//! A run compares that record against the on-disk tree, plans the
//! ordered list of unapplied scripts up to the requested target, dumps
//! the database, applies the plan, and records the new current
//! migration. If anything fails after the dump was taken, the database
//! is restored from it wholesale.
//!
//! When the record storage itself does not exist yet (a fresh
//! database), the probe statement fails or returns `false` and the tool
//! enters initialization mode: the whole `v0.0.0` group is applied
//! first, bootstrapping the record storage.
//!
//! The interesting entry points are [driver::run] for the whole
//! pipeline and [planner::Planner] for just the planning half.

pub mod apply;
pub mod cli;
pub mod config;
pub mod disk;
pub mod driver;
pub mod error;
pub mod migration;
pub mod planner;
pub mod snapshot;
pub mod state;
pub mod version;

pub use error::Error;
pub use migration::{MigrationGroup, MigrationId, MigrationPlan};
pub use version::VersionId;
