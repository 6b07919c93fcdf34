use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::connections::ConnectionsApiClient;
use super::permissions::PermissionsApiClient;
use super::publishing::{FilePublisher, PublishOptions};
use super::references::ContentReferenceCache;
use super::tags::TagsApiClient;
use super::views::{view_from_wire, ViewsApiClient};
use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::paging::{ApiListPager, Page, PageAccessor};
use crate::services::client::rest_client::{FileDownload, RestClient};
use crate::services::client::types::{
    IdRef, WorkbookRequest, WorkbookRequestType, WorkbookResponse, WorkbookType, WorkbooksResponse,
};
use crate::services::content::{
    ContentItem, ContentReference, ContentType, PublishableWorkbook, View, ViewPermissions,
    Workbook,
};
use crate::services::files::{release_on_failure, ContentFileStore};

const DEFAULT_FILE_EXTENSION: &str = "twbx";

pub struct WorkbooksApiClient {
    rest: Arc<RestClient>,
    references: Arc<ContentReferenceCache>,
    permissions: Arc<PermissionsApiClient>,
    tags: Arc<TagsApiClient>,
    connections: ConnectionsApiClient,
    views: Arc<ViewsApiClient>,
    publisher: Arc<FilePublisher>,
}

impl WorkbooksApiClient {
    pub fn new(
        rest: Arc<RestClient>,
        references: Arc<ContentReferenceCache>,
        views: Arc<ViewsApiClient>,
        publisher: Arc<FilePublisher>,
    ) -> Self {
        Self {
            permissions: Arc::new(PermissionsApiClient::new(rest.clone(), ContentType::Workbook)),
            tags: Arc::new(TagsApiClient::new(rest.clone(), ContentType::Workbook)),
            connections: ConnectionsApiClient::new(rest.clone(), ContentType::Workbook),
            rest,
            references,
            views,
            publisher,
        }
    }

    pub fn permissions(&self) -> &Arc<PermissionsApiClient> {
        &self.permissions
    }

    pub fn tags(&self) -> &Arc<TagsApiClient> {
        &self.tags
    }

    pub fn pager(self: &Arc<Self>, page_size: u64) -> ApiListPager<Workbook> {
        ApiListPager::new(self.clone(), page_size)
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn get_workbook(&self, id: Uuid, cancel: &CancellationToken) -> ClientResult<Workbook> {
        let response: WorkbookResponse = self
            .rest
            .get("/workbooks")
            .segment(id)
            .send_json(cancel)
            .await?;
        self.resolve(response.workbook, cancel)
            .await?
            .ok_or_else(|| ClientError::NotFound {
                resource: format!("project or owner of workbook {}", id),
            })
    }

    pub async fn download(&self, id: Uuid, cancel: &CancellationToken) -> ClientResult<FileDownload> {
        self.rest
            .get("/workbooks")
            .segment(id)
            .segment("content")
            .with_query("includeExtract", "true")
            .download(cancel)
            .await
    }

    /// Download the file into `store` and collect connections, views and
    /// permissions; the stored file is released if a later step fails
    #[instrument(skip(self, workbook, store, cancel), fields(workbook = %workbook.name), err)]
    pub async fn pull(
        &self,
        workbook: &Workbook,
        store: &dyn ContentFileStore,
        cancel: &CancellationToken,
    ) -> ClientResult<PublishableWorkbook> {
        let download = self.download(workbook.id, cancel).await?;
        let file_name = download
            .file_name
            .unwrap_or_else(|| format!("{}.{}", workbook.name, DEFAULT_FILE_EXTENSION));
        let file = store
            .create(&workbook.reference(), &file_name, download.content)
            .await?;

        release_on_failure(store, &file, async {
            let connections = self.connections.list(workbook.id, cancel).await?;
            let permissions = self.permissions.get_permissions(workbook.id, cancel).await?;

            let mut views = Vec::new();
            for view in self.views.for_workbook(workbook.id, cancel).await? {
                let permissions = self.views.permissions().get_permissions(view.id, cancel).await?;
                views.push(ViewPermissions { view, permissions });
            }

            let mut workbook = workbook.clone();
            workbook.views = views.iter().map(|v| v.view.clone()).collect();
            Ok(PublishableWorkbook {
                workbook,
                connections,
                permissions,
                views,
                file: file.clone(),
            })
        })
        .await
    }

    pub async fn update_workbook(
        &self,
        id: Uuid,
        update: WorkbookRequestType,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.rest
            .put("/workbooks")
            .segment(id)
            .with_json(&WorkbookRequest { workbook: update })?
            .send_empty(cancel)
            .await
    }

    pub async fn change_owner(&self, id: Uuid, owner_id: Uuid, cancel: &CancellationToken) -> ClientResult<()> {
        self.update_workbook(
            id,
            WorkbookRequestType {
                owner: Some(IdRef { id: owner_id }),
                ..Default::default()
            },
            cancel,
        )
        .await
    }

    /// Upload the pulled file, then apply owner, tags and permissions to the
    /// workbook and each of its views
    #[instrument(skip(self, item, store, cancel), fields(workbook = %item.workbook.name), err)]
    pub async fn publish(
        &self,
        item: &PublishableWorkbook,
        store: &dyn ContentFileStore,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<ContentReference> {
        let workbook = &item.workbook;
        let file_type = item
            .file
            .extension()
            .unwrap_or_else(|| DEFAULT_FILE_EXTENSION.to_string());
        let payload = WorkbookRequest {
            workbook: WorkbookRequestType {
                name: Some(workbook.name.clone()),
                description: workbook.description.clone(),
                show_tabs: Some(workbook.show_tabs),
                encrypt_extracts: Some(workbook.encrypt_extracts),
                project: Some(IdRef {
                    id: workbook.project.id(),
                }),
                owner: None,
            },
        };
        let options = PublishOptions {
            content_type: ContentType::Workbook,
            name: &workbook.name,
            project_id: workbook.project.id(),
            file_type: &file_type,
            overwrite,
            payload: &payload,
        };
        options.validate()?;

        let content = store.open_read(&item.file).await?;
        let published: WorkbookResponse = self.publisher.publish(content, &options, cancel).await?;
        let id = published.workbook.id;
        debug!("[WorkbooksApi] Published {} as {}", workbook.name, id);

        self.change_owner(id, workbook.owner.id(), cancel).await?;
        self.tags.add_tags(id, &workbook.tags, cancel).await?;
        self.permissions
            .update_permissions(id, &item.permissions, cancel)
            .await?;

        let published_views: Vec<View> = if published.workbook.views.view.is_empty() {
            self.views.for_workbook(id, cancel).await?
        } else {
            published
                .workbook
                .views
                .view
                .into_iter()
                .map(|view| view_from_wire(view, Some(id)))
                .collect()
        };
        self.publish_views(&item.views, &published_views, cancel).await?;

        Ok(ContentReference::new(id, &workbook.name, workbook.location()))
    }

    /// Views are matched to their published counterpart by name
    async fn publish_views(
        &self,
        source: &[ViewPermissions],
        published: &[View],
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        for source_view in source {
            let Some(destination) = published.iter().find(|v| v.name == source_view.view.name) else {
                warn!(
                    "[WorkbooksApi] View {} missing from published workbook",
                    source_view.view.name
                );
                continue;
            };
            self.views
                .tags()
                .add_tags(destination.id, &source_view.view.tags, cancel)
                .await?;
            self.views
                .permissions()
                .update_permissions(destination.id, &source_view.permissions, cancel)
                .await?;
        }
        Ok(())
    }

    async fn resolve(&self, wire: WorkbookType, cancel: &CancellationToken) -> ClientResult<Option<Workbook>> {
        let Some(project) = wire.project.as_ref() else {
            return Ok(None);
        };
        let Some(project) = self.references.find_project(project.id, cancel).await? else {
            debug!("[WorkbooksApi] Skipping {}: project not resolvable", wire.name);
            return Ok(None);
        };
        let Some(owner) = wire.owner.as_ref() else {
            return Ok(None);
        };
        let Some(owner) = self.references.find_user(owner.id, cancel).await? else {
            debug!("[WorkbooksApi] Skipping {}: owner not resolvable", wire.name);
            return Ok(None);
        };

        let id = wire.id;
        Ok(Some(Workbook {
            id,
            name: wire.name,
            description: wire.description,
            content_url: wire.content_url,
            project,
            owner,
            show_tabs: wire.show_tabs,
            encrypt_extracts: wire.encrypt_extracts,
            size: wire.size,
            tags: wire.tags.labels(),
            views: wire
                .views
                .view
                .into_iter()
                .map(|view| view_from_wire(view, Some(id)))
                .collect(),
        }))
    }
}

#[async_trait]
impl PageAccessor<Workbook> for WorkbooksApiClient {
    async fn get_page(
        &self,
        page_number: u64,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<Page<Workbook>> {
        let response: WorkbooksResponse = self
            .rest
            .get("/workbooks")
            .with_page(page_number, page_size)
            .send_json(cancel)
            .await?;

        let mut items = Vec::with_capacity(response.workbooks.workbook.len());
        for wire in response.workbooks.workbook {
            if let Some(workbook) = self.resolve(wire, cancel).await? {
                items.push(workbook);
            }
        }
        Ok(Page::from_pagination(items, &response.pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::client::test_support::{json_response, signed_in_rest, ScriptedTransport};
    use crate::services::client::transport::RestResponse;
    use crate::services::content::{
        Capability, ContentLocation, GranteeCapability, GranteeType, Permissions,
    };
    use crate::services::files::MemoryFileStore;
    use bytes::Bytes;
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    fn client(leaf: Arc<ScriptedTransport>) -> WorkbooksApiClient {
        let rest = signed_in_rest(leaf);
        let references = Arc::new(ContentReferenceCache::new(rest.clone(), 100));
        let views = Arc::new(ViewsApiClient::new(rest.clone()));
        let publisher = Arc::new(FilePublisher::new(rest.clone(), 1024));
        WorkbooksApiClient::new(rest, references, views, publisher)
    }

    fn revenue() -> Workbook {
        Workbook {
            id: Uuid::new_v4(),
            name: "Revenue".to_string(),
            description: None,
            content_url: None,
            project: ContentReference::new(Uuid::new_v4(), "Finance", ContentLocation::new(["Finance"])),
            owner: ContentReference::new(Uuid::new_v4(), "alice", ContentLocation::new(["local", "alice"])),
            show_tabs: true,
            encrypt_extracts: false,
            size: Some(1),
            tags: vec!["kpi".to_string()],
            views: vec![],
        }
    }

    #[tokio::test]
    async fn test_pull_collects_view_permissions() {
        let view = Uuid::new_v4();
        let grantee = Uuid::new_v4();
        let leaf = ScriptedTransport::with_handler(move |request| {
            let path = request.url.path();
            let body = if path.ends_with("/content") {
                return Ok(RestResponse::new(StatusCode::OK, "PK.."));
            } else if path.ends_with("/connections") {
                json!({ "connections": {} })
            } else if path.ends_with("/views") {
                json!({ "views": { "view": [{ "id": view, "name": "Overview" }] } })
            } else if path.contains(&format!("/views/{}/permissions", view)) {
                json!({ "permissions": { "granteeCapabilities": [
                    { "group": { "id": grantee }, "capabilities": { "capability": [
                        { "name": "Read", "mode": "Allow" }
                    ]}}
                ]}})
            } else {
                json!({ "permissions": {} })
            };
            Ok(json_response(StatusCode::OK, body))
        });
        let store = MemoryFileStore::new();

        let pulled = client(leaf)
            .pull(&revenue(), &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(pulled.views.len(), 1);
        assert_eq!(pulled.workbook.views.len(), 1);
        assert!(pulled.views[0]
            .permissions
            .contains(GranteeType::Group, grantee, &Capability::allow("Read")));
        assert_eq!(pulled.file.original_file_name, "Revenue.twbx");
    }

    #[tokio::test]
    async fn test_canceled_pull_releases_file() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let leaf = ScriptedTransport::with_handler(move |request| {
            if request.url.path().ends_with("/content") {
                trigger.cancel();
                Ok(RestResponse::new(StatusCode::OK, "PK.."))
            } else {
                Ok(json_response(StatusCode::OK, json!({ "connections": {} })))
            }
        });
        let store = MemoryFileStore::new();

        let outcome = client(leaf).pull(&revenue(), &store, &cancel).await;

        assert!(matches!(outcome, Err(ClientError::Canceled)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_publish_applies_view_permissions_by_name() {
        let published_id = Uuid::new_v4();
        let published_view = Uuid::new_v4();
        let grantee = Uuid::new_v4();
        let leaf = ScriptedTransport::with_handler(move |request| {
            let path = request.url.path();
            let body = if path.ends_with("/fileUploads") {
                json!({ "fileUpload": { "uploadSessionId": "s1" } })
            } else if request.method == Method::POST && path.ends_with("/workbooks") {
                json!({ "workbook": { "id": published_id, "name": "Revenue",
                    "views": { "view": [{ "id": published_view, "name": "Overview" }] } } })
            } else if path.ends_with("/permissions") && request.method == Method::GET {
                json!({ "permissions": {} })
            } else {
                json!({})
            };
            Ok(json_response(StatusCode::OK, body))
        });
        let store = MemoryFileStore::new();
        let workbook = revenue();
        let file = store
            .create(&workbook.reference(), "Revenue.twbx", Bytes::from_static(b"PK.."))
            .await
            .unwrap();
        let view_permissions = Permissions::new(vec![GranteeCapability::new(
            GranteeType::Group,
            grantee,
            vec![Capability::allow("Read")],
        )]);
        let item = PublishableWorkbook {
            workbook,
            connections: vec![],
            permissions: Permissions::default(),
            views: vec![ViewPermissions {
                view: View {
                    id: Uuid::new_v4(),
                    name: "Overview".to_string(),
                    content_url: None,
                    workbook_id: None,
                    project_id: None,
                    tags: vec![],
                },
                permissions: view_permissions,
            }],
            file,
        };

        let workbooks = client(leaf.clone());
        let reference = workbooks
            .publish(&item, &store, true, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reference.id(), published_id);
        assert_eq!(reference.location().path(), "Finance/Revenue");
        let view_grant = format!("PUT /api/3.18/sites/{}/views/{}/permissions",
            crate::services::client::test_support::TEST_SITE_ID, published_view);
        assert!(leaf.paths().contains(&view_grant));
    }
}
