//! Site-to-site content migration between analytics server sites.
//!
//! Users, groups, projects, data sources and workbooks are listed on a source
//! site, rewritten to point at destination ids and published to a destination
//! site. Progress is kept in a resumable manifest.

pub mod features;
pub mod services;
pub mod utils;

pub use features::migration::{MigrationPlan, MigrationPlanBuilder, MigrationReport, Migrator};
