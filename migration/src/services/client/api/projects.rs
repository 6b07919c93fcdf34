use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::permissions::PermissionsApiClient;
use super::references::{build_project_index, ContentReferenceCache};
use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::paging::{fetch_all_pages, ApiListPager, LoadedPageAccessor, Page};
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{
    IdRef, ProjectRequest, ProjectRequestType, ProjectResponse, ProjectType, ProjectsResponse,
};
use crate::services::content::{
    ContentLocation, ContentReference, ContentType, Project, PublishableProject,
};

pub struct ProjectsApiClient {
    rest: Arc<RestClient>,
    references: Arc<ContentReferenceCache>,
    permissions: Arc<PermissionsApiClient>,
    page_size: u64,
}

impl ProjectsApiClient {
    pub fn new(rest: Arc<RestClient>, references: Arc<ContentReferenceCache>, page_size: u64) -> Self {
        let permissions = Arc::new(PermissionsApiClient::new(rest.clone(), ContentType::Project));
        Self {
            rest,
            references,
            permissions,
            page_size,
        }
    }

    pub fn permissions(&self) -> &Arc<PermissionsApiClient> {
        &self.permissions
    }

    /// Every project of the site, parents before children
    ///
    /// Projects whose parent chain or owner cannot be resolved are left out.
    #[instrument(skip(self, cancel), err)]
    pub async fn list_all(&self, cancel: &CancellationToken) -> ClientResult<Vec<Project>> {
        let raw = self.fetch_raw(cancel).await?;
        let index = build_project_index(&raw);

        let mut projects = Vec::with_capacity(raw.len());
        for wire in raw {
            let Some(reference) = index.get(&wire.id) else {
                continue;
            };
            let owner = match &wire.owner {
                Some(owner) => self.references.find_user(owner.id, cancel).await?,
                None => None,
            };
            let Some(owner) = owner else {
                warn!("[ProjectsApi] Project {} has no resolvable owner", reference);
                continue;
            };

            projects.push(Project {
                id: wire.id,
                name: wire.name,
                description: wire.description,
                parent: wire
                    .parent_project_id
                    .and_then(|parent| index.get(&parent).cloned()),
                owner,
                content_permissions: wire.content_permissions,
                location: reference.location().clone(),
            });
        }

        projects.sort_by_key(|project| project.location.depth());
        Ok(projects)
    }

    /// Pager over [`Self::list_all`]; parents are always on an earlier page
    pub async fn ordered_pager(
        &self,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<ApiListPager<Project>> {
        let projects = self.list_all(cancel).await?;
        Ok(ApiListPager::new(
            Arc::new(LoadedPageAccessor::new(projects)),
            page_size,
        ))
    }

    pub async fn get_project(&self, id: Uuid, cancel: &CancellationToken) -> ClientResult<Project> {
        self.list_all(cancel)
            .await?
            .into_iter()
            .find(|project| project.id == id)
            .ok_or_else(|| ClientError::NotFound {
                resource: format!("project {}", id),
            })
    }

    /// Walk the path from the top-level project down, matching each segment
    /// by name under the previous one
    pub async fn find_by_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<ContentReference>> {
        let mut parent: Option<Uuid> = None;
        let mut found = None;

        for segment in location.segments() {
            let response: ProjectsResponse = self
                .rest
                .get("/projects")
                .with_filter("name", "eq", segment)
                .send_json(cancel)
                .await?;

            let Some(project) = response
                .projects
                .project
                .into_iter()
                .find(|p| &p.name == segment && p.parent_project_id == parent)
            else {
                debug!("[ProjectsApi] No project {} under {:?}", segment, parent);
                return Ok(None);
            };
            parent = Some(project.id);
            found = Some(project.id);
        }

        Ok(found.map(|id| {
            ContentReference::new(id, location.name().unwrap_or_default(), location.clone())
        }))
    }

    #[instrument(skip(self, request, cancel), err)]
    pub async fn create_project(
        &self,
        request: ProjectRequestType,
        cancel: &CancellationToken,
    ) -> ClientResult<ProjectType> {
        if request.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(ClientError::validation("name", "project name must not be empty"));
        }
        let response: ProjectResponse = self
            .rest
            .post("/projects")
            .with_json(&ProjectRequest { project: request })?
            .send_json(cancel)
            .await?;
        Ok(response.project)
    }

    pub async fn update_project(
        &self,
        id: Uuid,
        request: ProjectRequestType,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.rest
            .put("/projects")
            .segment(id)
            .with_json(&ProjectRequest { project: request })?
            .send_empty(cancel)
            .await
    }

    pub async fn change_owner(&self, id: Uuid, owner_id: Uuid, cancel: &CancellationToken) -> ClientResult<()> {
        self.update_project(
            id,
            ProjectRequestType {
                owner: Some(IdRef { id: owner_id }),
                ..Default::default()
            },
            cancel,
        )
        .await
    }

    pub async fn pull(&self, project: &Project, cancel: &CancellationToken) -> ClientResult<PublishableProject> {
        let permissions = self.permissions.get_permissions(project.id, cancel).await?;
        Ok(PublishableProject {
            project: project.clone(),
            permissions,
        })
    }

    /// Create the project under its parent, or reuse the one already there
    #[instrument(skip(self, item, cancel), fields(project = %item.project.location), err)]
    pub async fn publish(&self, item: &PublishableProject, cancel: &CancellationToken) -> ClientResult<ContentReference> {
        let project = &item.project;
        let request = ProjectRequestType {
            name: Some(project.name.clone()),
            description: project.description.clone(),
            parent_project_id: project.parent.as_ref().map(ContentReference::id),
            content_permissions: project.content_permissions.clone(),
            owner: None,
        };

        let id = match self.create_project(request, cancel).await {
            Ok(created) => created.id,
            Err(e) if e.is_conflict() => {
                info!("[ProjectsApi] Project {} already exists", project.location);
                self.find_by_location(&project.location, cancel)
                    .await?
                    .ok_or(e)?
                    .id()
            }
            Err(e) => return Err(e),
        };

        self.change_owner(id, project.owner.id(), cancel).await?;
        self.permissions
            .update_permissions(id, &item.permissions, cancel)
            .await?;

        Ok(ContentReference::new(id, &project.name, project.location.clone()))
    }

    async fn fetch_raw(&self, cancel: &CancellationToken) -> ClientResult<Vec<ProjectType>> {
        fetch_all_pages(self.page_size, |page_number, page_size| async move {
            let response: ProjectsResponse = self
                .rest
                .get("/projects")
                .with_page(page_number, page_size)
                .send_json(cancel)
                .await?;
            Ok(Page::from_pagination(
                response.projects.project,
                &response.pagination,
            ))
        })
        .await
    }
}
