use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::connections::ConnectionsApiClient;
use super::permissions::PermissionsApiClient;
use super::publishing::{FilePublisher, PublishOptions};
use super::references::ContentReferenceCache;
use super::tags::TagsApiClient;
use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::paging::{ApiListPager, Page, PageAccessor};
use crate::services::client::rest_client::{FileDownload, RestClient};
use crate::services::client::types::{
    DataSourceRequest, DataSourceRequestType, DataSourceResponse, DataSourceType,
    DataSourcesResponse, IdRef,
};
use crate::services::content::{
    ContentItem, ContentReference, ContentType, DataSource, PublishableDataSource,
};
use crate::services::files::{release_on_failure, ContentFileStore};

const DEFAULT_FILE_EXTENSION: &str = "tdsx";

pub struct DataSourcesApiClient {
    rest: Arc<RestClient>,
    references: Arc<ContentReferenceCache>,
    permissions: Arc<PermissionsApiClient>,
    tags: Arc<TagsApiClient>,
    connections: ConnectionsApiClient,
    publisher: Arc<FilePublisher>,
}

impl DataSourcesApiClient {
    pub fn new(
        rest: Arc<RestClient>,
        references: Arc<ContentReferenceCache>,
        publisher: Arc<FilePublisher>,
    ) -> Self {
        Self {
            permissions: Arc::new(PermissionsApiClient::new(rest.clone(), ContentType::DataSource)),
            tags: Arc::new(TagsApiClient::new(rest.clone(), ContentType::DataSource)),
            connections: ConnectionsApiClient::new(rest.clone(), ContentType::DataSource),
            rest,
            references,
            publisher,
        }
    }

    pub fn permissions(&self) -> &Arc<PermissionsApiClient> {
        &self.permissions
    }

    pub fn tags(&self) -> &Arc<TagsApiClient> {
        &self.tags
    }

    pub fn pager(self: &Arc<Self>, page_size: u64) -> ApiListPager<DataSource> {
        ApiListPager::new(self.clone(), page_size)
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn get_data_source(&self, id: Uuid, cancel: &CancellationToken) -> ClientResult<DataSource> {
        let response: DataSourceResponse = self
            .rest
            .get("/datasources")
            .segment(id)
            .send_json(cancel)
            .await?;
        self.resolve(response.datasource, cancel)
            .await?
            .ok_or_else(|| ClientError::NotFound {
                resource: format!("project or owner of data source {}", id),
            })
    }

    pub async fn download(&self, id: Uuid, cancel: &CancellationToken) -> ClientResult<FileDownload> {
        self.rest
            .get("/datasources")
            .segment(id)
            .segment("content")
            .with_query("includeExtract", "true")
            .download(cancel)
            .await
    }

    /// Download the file into `store` and collect connections and permissions
    ///
    /// If anything after the download fails, the stored file is released
    /// before the error is returned.
    #[instrument(skip(self, data_source, store, cancel), fields(data_source = %data_source.name), err)]
    pub async fn pull(
        &self,
        data_source: &DataSource,
        store: &dyn ContentFileStore,
        cancel: &CancellationToken,
    ) -> ClientResult<PublishableDataSource> {
        let download = self.download(data_source.id, cancel).await?;
        let file_name = download
            .file_name
            .unwrap_or_else(|| format!("{}.{}", data_source.name, DEFAULT_FILE_EXTENSION));
        let file = store
            .create(&data_source.reference(), &file_name, download.content)
            .await?;

        release_on_failure(store, &file, async {
            let connections = self.connections.list(data_source.id, cancel).await?;
            let permissions = self.permissions.get_permissions(data_source.id, cancel).await?;
            Ok(PublishableDataSource {
                data_source: data_source.clone(),
                connections,
                permissions,
                file: file.clone(),
            })
        })
        .await
    }

    pub async fn update_data_source(
        &self,
        id: Uuid,
        update: DataSourceRequestType,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.rest
            .put("/datasources")
            .segment(id)
            .with_json(&DataSourceRequest { datasource: update })?
            .send_empty(cancel)
            .await
    }

    pub async fn change_owner(&self, id: Uuid, owner_id: Uuid, cancel: &CancellationToken) -> ClientResult<()> {
        self.update_data_source(
            id,
            DataSourceRequestType {
                owner: Some(IdRef { id: owner_id }),
                ..Default::default()
            },
            cancel,
        )
        .await
    }

    /// Upload the pulled file, then apply owner, certification, tags and
    /// permissions to the published data source
    #[instrument(skip(self, item, store, cancel), fields(data_source = %item.data_source.name), err)]
    pub async fn publish(
        &self,
        item: &PublishableDataSource,
        store: &dyn ContentFileStore,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<ContentReference> {
        let data_source = &item.data_source;
        let file_type = item
            .file
            .extension()
            .unwrap_or_else(|| DEFAULT_FILE_EXTENSION.to_string());
        let payload = DataSourceRequest {
            datasource: DataSourceRequestType {
                name: Some(data_source.name.clone()),
                description: data_source.description.clone(),
                encrypt_extracts: Some(data_source.encrypt_extracts),
                project: Some(IdRef {
                    id: data_source.project.id(),
                }),
                ..Default::default()
            },
        };
        let options = PublishOptions {
            content_type: ContentType::DataSource,
            name: &data_source.name,
            project_id: data_source.project.id(),
            file_type: &file_type,
            overwrite,
            payload: &payload,
        };
        options.validate()?;

        let content = store.open_read(&item.file).await?;
        let published: DataSourceResponse = self.publisher.publish(content, &options, cancel).await?;
        let id = published.datasource.id;
        debug!("[DataSourcesApi] Published {} as {}", data_source.name, id);

        self.update_data_source(
            id,
            DataSourceRequestType {
                owner: Some(IdRef {
                    id: data_source.owner.id(),
                }),
                is_certified: Some(data_source.is_certified),
                certification_note: data_source.certification_note.clone(),
                ..Default::default()
            },
            cancel,
        )
        .await?;
        self.tags.add_tags(id, &data_source.tags, cancel).await?;
        self.permissions
            .update_permissions(id, &item.permissions, cancel)
            .await?;

        Ok(ContentReference::new(id, &data_source.name, data_source.location()))
    }

    /// Attach project and owner references; `None` when either is unknown,
    /// e.g. content in a personal space
    async fn resolve(&self, wire: DataSourceType, cancel: &CancellationToken) -> ClientResult<Option<DataSource>> {
        let Some(project) = wire.project.as_ref() else {
            return Ok(None);
        };
        let Some(project) = self.references.find_project(project.id, cancel).await? else {
            debug!("[DataSourcesApi] Skipping {}: project not resolvable", wire.name);
            return Ok(None);
        };
        let Some(owner) = wire.owner.as_ref() else {
            return Ok(None);
        };
        let Some(owner) = self.references.find_user(owner.id, cancel).await? else {
            debug!("[DataSourcesApi] Skipping {}: owner not resolvable", wire.name);
            return Ok(None);
        };

        Ok(Some(DataSource {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            content_url: wire.content_url,
            data_source_type: wire.data_source_type,
            project,
            owner,
            is_certified: wire.is_certified,
            certification_note: wire.certification_note,
            encrypt_extracts: wire.encrypt_extracts,
            has_extracts: wire.has_extracts,
            tags: wire.tags.labels(),
        }))
    }
}

#[async_trait]
impl PageAccessor<DataSource> for DataSourcesApiClient {
    async fn get_page(
        &self,
        page_number: u64,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<Page<DataSource>> {
        let response: DataSourcesResponse = self
            .rest
            .get("/datasources")
            .with_page(page_number, page_size)
            .send_json(cancel)
            .await?;

        let mut items = Vec::with_capacity(response.datasources.datasource.len());
        for wire in response.datasources.datasource {
            if let Some(data_source) = self.resolve(wire, cancel).await? {
                items.push(data_source);
            }
        }
        Ok(Page::from_pagination(items, &response.pagination))
    }
}
