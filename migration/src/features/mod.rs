//! Feature modules
//!
//! - **migration**: plan, pipeline, manifest and orchestrator of a site migration

pub mod migration;
