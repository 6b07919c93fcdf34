//! Migration plan: which content types migrate, with which hooks

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

use super::adapters::{DataSourceAdapter, GroupAdapter, ProjectAdapter, UserAdapter, WorkbookAdapter};
use super::hooks::ContentHooks;
use super::mapping::{DestinationLookup, ReferenceMapping};
use super::pipeline::{ContentPipeline, ContentTypeMigration};
use super::transformers::PermissionsTransformer;
use crate::services::client::api::SiteApiClient;
use crate::services::content::{
    ContentType, DataSource, Group, Project, PublishableDataSource, PublishableGroup,
    PublishableProject, PublishableWorkbook, User, Workbook,
};
use crate::services::files::ContentFileStore;

/// A plan id and one registered migration per content type
///
/// Running the same plan id again resumes from its saved manifest.
pub struct MigrationPlan {
    id: String,
    destination: Arc<dyn DestinationLookup>,
    migrations: BTreeMap<ContentType, Arc<dyn ContentTypeMigration>>,
}

impl MigrationPlan {
    pub fn new(id: impl Into<String>, destination: Arc<dyn DestinationLookup>) -> Self {
        Self {
            id: id.into(),
            destination,
            migrations: BTreeMap::new(),
        }
    }

    /// Register the migration of one type, replacing any earlier one
    pub fn register(&mut self, migration: Arc<dyn ContentTypeMigration>) -> &mut Self {
        self.migrations.insert(migration.content_type(), migration);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &Arc<dyn DestinationLookup> {
        &self.destination
    }

    pub fn migration(&self, content_type: ContentType) -> Option<&Arc<dyn ContentTypeMigration>> {
        self.migrations.get(&content_type)
    }

    pub fn content_types(&self) -> impl Iterator<Item = ContentType> + '_ {
        self.migrations.keys().copied()
    }
}

/// Builds a plan over two signed-in sites
///
/// Every type maps its references to destination ids. Projects, data
/// sources and workbooks also map and merge their permissions.
pub struct MigrationPlanBuilder {
    id: String,
    source: Arc<SiteApiClient>,
    destination: Arc<SiteApiClient>,
    files: Arc<dyn ContentFileStore>,
    overwrite: bool,
    excluded: BTreeSet<ContentType>,
    users: ContentHooks<User, User>,
    groups: ContentHooks<Group, PublishableGroup>,
    projects: ContentHooks<Project, PublishableProject>,
    data_sources: ContentHooks<DataSource, PublishableDataSource>,
    workbooks: ContentHooks<Workbook, PublishableWorkbook>,
}

impl MigrationPlanBuilder {
    pub fn new(
        source: Arc<SiteApiClient>,
        destination: Arc<SiteApiClient>,
        files: Arc<dyn ContentFileStore>,
    ) -> Self {
        let mut users: ContentHooks<User, User> = ContentHooks::new();
        users.add_mapping(ReferenceMapping);
        let mut groups: ContentHooks<Group, PublishableGroup> = ContentHooks::new();
        groups.add_mapping(ReferenceMapping);
        let mut projects: ContentHooks<Project, PublishableProject> = ContentHooks::new();
        projects
            .add_mapping(ReferenceMapping)
            .add_transformer(PermissionsTransformer);
        let mut data_sources: ContentHooks<DataSource, PublishableDataSource> = ContentHooks::new();
        data_sources
            .add_mapping(ReferenceMapping)
            .add_transformer(PermissionsTransformer);
        let mut workbooks: ContentHooks<Workbook, PublishableWorkbook> = ContentHooks::new();
        workbooks
            .add_mapping(ReferenceMapping)
            .add_transformer(PermissionsTransformer);

        Self {
            id: Uuid::new_v4().to_string(),
            source,
            destination,
            files,
            overwrite: true,
            excluded: BTreeSet::new(),
            users,
            groups,
            projects,
            data_sources,
            workbooks,
        }
    }

    /// Reuse a plan id to resume its earlier run
    pub fn with_plan_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Whether publishing replaces same-named workbooks and data sources
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn exclude(mut self, content_type: ContentType) -> Self {
        self.excluded.insert(content_type);
        self
    }

    pub fn users(mut self, configure: impl FnOnce(&mut ContentHooks<User, User>)) -> Self {
        configure(&mut self.users);
        self
    }

    pub fn groups(mut self, configure: impl FnOnce(&mut ContentHooks<Group, PublishableGroup>)) -> Self {
        configure(&mut self.groups);
        self
    }

    pub fn projects(mut self, configure: impl FnOnce(&mut ContentHooks<Project, PublishableProject>)) -> Self {
        configure(&mut self.projects);
        self
    }

    pub fn data_sources(
        mut self,
        configure: impl FnOnce(&mut ContentHooks<DataSource, PublishableDataSource>),
    ) -> Self {
        configure(&mut self.data_sources);
        self
    }

    pub fn workbooks(mut self, configure: impl FnOnce(&mut ContentHooks<Workbook, PublishableWorkbook>)) -> Self {
        configure(&mut self.workbooks);
        self
    }

    pub fn build(self) -> MigrationPlan {
        let source = self.source;
        let destination = self.destination;
        let mut plan = MigrationPlan::new(self.id, destination.clone());

        let excluded = self.excluded;
        let mut register = |migration: Arc<dyn ContentTypeMigration>| {
            if !excluded.contains(&migration.content_type()) {
                plan.register(migration);
            }
        };

        register(Arc::new(ContentPipeline::new(
            UserAdapter::new(source.clone(), destination.clone()),
            self.users,
        )));
        register(Arc::new(ContentPipeline::new(
            GroupAdapter::new(source.clone(), destination.clone()),
            self.groups,
        )));
        register(Arc::new(ContentPipeline::new(
            ProjectAdapter::new(source.clone(), destination.clone()),
            self.projects,
        )));
        register(Arc::new(ContentPipeline::new(
            DataSourceAdapter::new(
                source.clone(),
                destination.clone(),
                self.files.clone(),
                self.overwrite,
            ),
            self.data_sources,
        )));
        register(Arc::new(ContentPipeline::new(
            WorkbookAdapter::new(source, destination, self.files, self.overwrite),
            self.workbooks,
        )));

        plan
    }
}
