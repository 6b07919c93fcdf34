use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::client::errors::ClientResult;
use crate::services::client::paging::{fetch_all_pages, Page};
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{ProjectType, ProjectsResponse, UsersResponse};
use crate::services::content::{ContentLocation, ContentReference};

type ReferenceIndex = Arc<HashMap<Uuid, ContentReference>>;

/// Lazily loaded id-to-reference index of a site's projects and users
///
/// List endpoints return only the id of an item's project and owner. The
/// cache pages through both collections once and answers lookups from memory.
pub struct ContentReferenceCache {
    rest: Arc<RestClient>,
    page_size: u64,
    projects: Mutex<Option<ReferenceIndex>>,
    users: Mutex<Option<ReferenceIndex>>,
}

impl ContentReferenceCache {
    pub fn new(rest: Arc<RestClient>, page_size: u64) -> Self {
        Self {
            rest,
            page_size,
            projects: Mutex::new(None),
            users: Mutex::new(None),
        }
    }

    pub async fn find_project(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<ContentReference>> {
        Ok(self.projects(cancel).await?.get(&id).cloned())
    }

    pub async fn find_user(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<ContentReference>> {
        Ok(self.users(cancel).await?.get(&id).cloned())
    }

    /// Drop everything; the next lookup reloads
    pub async fn invalidate(&self) {
        *self.projects.lock().await = None;
        *self.users.lock().await = None;
    }

    async fn projects(&self, cancel: &CancellationToken) -> ClientResult<ReferenceIndex> {
        let mut slot = self.projects.lock().await;
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }

        let raw = fetch_all_pages(self.page_size, |page_number, page_size| async move {
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
        .await?;

        let index = Arc::new(build_project_index(&raw));
        debug!("[ReferenceCache] Indexed {} projects", index.len());
        *slot = Some(index.clone());
        Ok(index)
    }

    async fn users(&self, cancel: &CancellationToken) -> ClientResult<ReferenceIndex> {
        let mut slot = self.users.lock().await;
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }

        let users = fetch_all_pages(self.page_size, |page_number, page_size| async move {
            let response: UsersResponse = self
                .rest
                .get("/users")
                .with_page(page_number, page_size)
                .send_json(cancel)
                .await?;
            Ok(Page::from_pagination(response.users.user, &response.pagination))
        })
        .await?;

        let index: HashMap<Uuid, ContentReference> = users
            .into_iter()
            .map(|user| {
                let domain = user.domain.as_ref().map(|d| d.name.as_str());
                let location = ContentLocation::for_domain(domain, &user.name);
                (user.id, ContentReference::new(user.id, &user.name, location))
            })
            .collect();
        debug!("[ReferenceCache] Indexed {} users", index.len());

        let index = Arc::new(index);
        *slot = Some(index.clone());
        Ok(index)
    }
}

/// Resolve every project's full path by walking its parent chain
pub(crate) fn build_project_index(projects: &[ProjectType]) -> HashMap<Uuid, ContentReference> {
    let by_id: HashMap<Uuid, &ProjectType> = projects.iter().map(|p| (p.id, p)).collect();

    projects
        .iter()
        .filter_map(|project| {
            let mut segments = vec![project.name.clone()];
            let mut parent = project.parent_project_id;
            while let Some(parent_id) = parent {
                let Some(parent_project) = by_id.get(&parent_id) else {
                    warn!(
                        "[ReferenceCache] Project {} has unknown parent {}",
                        project.id, parent_id
                    );
                    return None;
                };
                if segments.len() > by_id.len() {
                    warn!("[ReferenceCache] Project {} has a cyclic parent chain", project.id);
                    return None;
                }
                segments.push(parent_project.name.clone());
                parent = parent_project.parent_project_id;
            }
            segments.reverse();

            Some((
                project.id,
                ContentReference::new(project.id, &project.name, ContentLocation::new(segments)),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: Uuid, name: &str, parent: Option<Uuid>) -> ProjectType {
        ProjectType {
            id,
            name: name.to_string(),
            description: None,
            parent_project_id: parent,
            content_permissions: None,
            owner: None,
        }
    }

    #[test]
    fn test_project_paths_follow_parents() {
        let finance = Uuid::new_v4();
        let quarterly = Uuid::new_v4();
        let archive = Uuid::new_v4();
        let index = build_project_index(&[
            project(archive, "Archive", Some(quarterly)),
            project(finance, "Finance", None),
            project(quarterly, "Quarterly", Some(finance)),
        ]);

        assert_eq!(index[&finance].location().path(), "Finance");
        assert_eq!(index[&archive].location().path(), "Finance/Quarterly/Archive");
        assert_eq!(index[&archive].name(), "Archive");
    }

    #[test]
    fn test_orphans_and_cycles_are_left_out() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let index = build_project_index(&[
            project(a, "A", Some(b)),
            project(b, "B", Some(a)),
            project(orphan, "Orphan", Some(Uuid::new_v4())),
        ]);
        assert!(index.is_empty());
    }
}
