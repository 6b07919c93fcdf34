use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::data_sources::DataSourcesApiClient;
use super::groups::GroupsApiClient;
use super::permissions::PermissionsApiClient;
use super::projects::ProjectsApiClient;
use super::publishing::FilePublisher;
use super::references::ContentReferenceCache;
use super::tags::TagsApiClient;
use super::users::UsersApiClient;
use super::views::ViewsApiClient;
use super::workbooks::WorkbooksApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::client::rest_client::RestClient;
use crate::services::client::session::{ServerSessionProvider, SessionPhase};
use crate::services::config::BatchConfig;
use crate::services::content::ContentType;

/// Handle to one signed-in site and its content clients
pub struct SiteApiClient {
    rest: Arc<RestClient>,
    references: Arc<ContentReferenceCache>,
    users: Arc<UsersApiClient>,
    groups: Arc<GroupsApiClient>,
    projects: Arc<ProjectsApiClient>,
    data_sources: Arc<DataSourcesApiClient>,
    workbooks: Arc<WorkbooksApiClient>,
    views: Arc<ViewsApiClient>,
}

impl SiteApiClient {
    pub fn new(rest: Arc<RestClient>, batch: &BatchConfig) -> Self {
        let references = Arc::new(ContentReferenceCache::new(rest.clone(), batch.page_size));
        let publisher = Arc::new(FilePublisher::new(rest.clone(), batch.file_chunk_size));
        let views = Arc::new(ViewsApiClient::new(rest.clone()));

        Self {
            users: Arc::new(UsersApiClient::new(rest.clone())),
            groups: Arc::new(GroupsApiClient::new(rest.clone(), batch.page_size)),
            projects: Arc::new(ProjectsApiClient::new(
                rest.clone(),
                references.clone(),
                batch.page_size,
            )),
            data_sources: Arc::new(DataSourcesApiClient::new(
                rest.clone(),
                references.clone(),
                publisher.clone(),
            )),
            workbooks: Arc::new(WorkbooksApiClient::new(
                rest.clone(),
                references.clone(),
                views.clone(),
                publisher,
            )),
            views,
            references,
            rest,
        }
    }

    pub fn session(&self) -> &Arc<ServerSessionProvider> {
        self.rest.session()
    }

    pub fn references(&self) -> &Arc<ContentReferenceCache> {
        &self.references
    }

    pub fn users(&self) -> &Arc<UsersApiClient> {
        &self.users
    }

    pub fn groups(&self) -> &Arc<GroupsApiClient> {
        &self.groups
    }

    pub fn projects(&self) -> &Arc<ProjectsApiClient> {
        &self.projects
    }

    pub fn data_sources(&self) -> &Arc<DataSourcesApiClient> {
        &self.data_sources
    }

    pub fn workbooks(&self) -> &Arc<WorkbooksApiClient> {
        &self.workbooks
    }

    pub fn views(&self) -> &Arc<ViewsApiClient> {
        &self.views
    }

    /// Permissions sub-client of a content type; users and groups have none
    pub fn permissions(&self, content_type: ContentType) -> Option<Arc<PermissionsApiClient>> {
        match content_type {
            ContentType::Project => Some(self.projects.permissions().clone()),
            ContentType::DataSource => Some(self.data_sources.permissions().clone()),
            ContentType::Workbook => Some(self.workbooks.permissions().clone()),
            ContentType::View => Some(self.views.permissions().clone()),
            ContentType::User | ContentType::Group => None,
        }
    }

    pub fn tags(&self, content_type: ContentType) -> Option<Arc<TagsApiClient>> {
        match content_type {
            ContentType::DataSource => Some(self.data_sources.tags().clone()),
            ContentType::Workbook => Some(self.workbooks.tags().clone()),
            ContentType::View => Some(self.views.tags().clone()),
            ContentType::User | ContentType::Group | ContentType::Project => None,
        }
    }

    /// End the session
    ///
    /// Succeeds without a request when nobody is signed in. Local session
    /// state is cleared even if the server call fails.
    #[instrument(skip(self, cancel), err)]
    pub async fn sign_out(&self, cancel: &CancellationToken) -> ClientResult<()> {
        let session = self.rest.session();
        if !session.is_signed_in() {
            return Ok(());
        }

        session.set_phase(SessionPhase::SigningOut);
        let outcome = self
            .rest
            .post("/auth/signout")
            .without_site()
            .send_empty(cancel)
            .await;
        session.clear_current_user_and_site();
        self.references.invalidate().await;

        if outcome.is_ok() {
            info!("[SiteApi] Signed out");
        }
        outcome
    }

    /// Best-effort sign-out; failures are logged, never returned
    pub async fn close(&self) {
        if let Err(e) = self.sign_out(&CancellationToken::new()).await {
            warn!("[SiteApi] Sign-out during close failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::client::errors::ClientError;
    use crate::services::client::errors::TransportError;
    use crate::services::client::test_support::{signed_in_rest, ScriptedTransport};
    use reqwest::StatusCode;

    #[tokio::test]
    async fn test_sign_out_clears_state_even_on_failure() {
        let leaf = ScriptedTransport::new();
        leaf.push(Err(ClientError::Transport(TransportError::Network {
            message: "connection reset".to_string(),
        })));
        let rest = signed_in_rest(leaf.clone());
        let site = SiteApiClient::new(rest, &BatchConfig::default());

        let outcome = site.sign_out(&CancellationToken::new()).await;

        assert!(outcome.is_err());
        assert!(!site.session().is_signed_in());
        assert_eq!(site.session().phase(), SessionPhase::SignedOut);
        assert!(site.session().version().is_some());
        assert_eq!(leaf.paths(), vec!["POST /api/3.18/auth/signout"]);
    }

    #[tokio::test]
    async fn test_sign_out_is_idempotent() {
        let leaf = ScriptedTransport::new();
        leaf.push_status(StatusCode::NO_CONTENT);
        let site = SiteApiClient::new(signed_in_rest(leaf.clone()), &BatchConfig::default());
        let cancel = CancellationToken::new();

        site.sign_out(&cancel).await.unwrap();
        site.sign_out(&cancel).await.unwrap();
        site.close().await;

        assert_eq!(leaf.request_count(), 1);
    }

    #[test]
    fn test_sub_client_lookup() {
        let site = SiteApiClient::new(signed_in_rest(ScriptedTransport::new()), &BatchConfig::default());

        assert!(site.permissions(ContentType::User).is_none());
        assert!(site.tags(ContentType::Project).is_none());
        for content_type in [ContentType::Project, ContentType::DataSource, ContentType::Workbook, ContentType::View] {
            assert_eq!(
                site.permissions(content_type).map(|p| p.content_type()),
                Some(content_type)
            );
        }
    }
}
