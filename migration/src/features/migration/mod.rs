//! Site-to-site content migration
//!
//! A [`MigrationPlan`] registers one [`ContentPipeline`] per content type.
//! The [`Migrator`] runs them stage by stage, recording every item in a
//! [`Manifest`] that is saved between stages so an interrupted run resumes
//! where it stopped.

pub mod adapters;
pub mod hooks;
pub mod manifest;
pub mod mapping;
pub mod orchestrator;
pub mod permissions;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod storage;
pub mod transformers;

pub use hooks::{ContentFilter, ContentHooks, ContentMapping, ContentTransformer, FnFilter, HookContext};
pub use manifest::{Manifest, ManifestEntry, ManifestSummary, MigrationStatus, MigrationStep, SharedManifest};
pub use mapping::{DestinationFinder, DestinationLookup, ManifestDestinationFinder, ReferenceMapping};
pub use orchestrator::Migrator;
pub use permissions::{merge_grantee_capabilities, merge_permissions};
pub use pipeline::{ContentPipeline, ContentTypeMigration, RunContext};
pub use plan::{MigrationPlan, MigrationPlanBuilder};
pub use progress::*;
pub use storage::{JsonFileManifestStore, ManifestStore, MemoryManifestStore};
pub use transformers::PermissionsTransformer;
