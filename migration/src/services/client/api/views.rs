use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::permissions::PermissionsApiClient;
use super::tags::TagsApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::client::paging::{ApiListPager, Page, PageAccessor};
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{ViewType, ViewsResponse};
use crate::services::content::{ContentType, View};

/// Views are published with their workbook; this client reads them and
/// manages their permissions and tags
pub struct ViewsApiClient {
    rest: Arc<RestClient>,
    permissions: Arc<PermissionsApiClient>,
    tags: Arc<TagsApiClient>,
}

impl ViewsApiClient {
    pub fn new(rest: Arc<RestClient>) -> Self {
        Self {
            permissions: Arc::new(PermissionsApiClient::new(rest.clone(), ContentType::View)),
            tags: Arc::new(TagsApiClient::new(rest.clone(), ContentType::View)),
            rest,
        }
    }

    pub fn permissions(&self) -> &Arc<PermissionsApiClient> {
        &self.permissions
    }

    pub fn tags(&self) -> &Arc<TagsApiClient> {
        &self.tags
    }

    pub fn pager(self: &Arc<Self>, page_size: u64) -> ApiListPager<View> {
        ApiListPager::new(self.clone(), page_size)
    }

    pub async fn for_workbook(&self, workbook_id: Uuid, cancel: &CancellationToken) -> ClientResult<Vec<View>> {
        let response: ViewsResponse = self
            .rest
            .get("/workbooks")
            .segment(workbook_id)
            .segment("views")
            .send_json(cancel)
            .await?;
        Ok(response
            .views
            .view
            .into_iter()
            .map(|view| view_from_wire(view, Some(workbook_id)))
            .collect())
    }
}

#[async_trait]
impl PageAccessor<View> for ViewsApiClient {
    async fn get_page(
        &self,
        page_number: u64,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<Page<View>> {
        let response: ViewsResponse = self
            .rest
            .get("/views")
            .with_page(page_number, page_size)
            .send_json(cancel)
            .await?;
        let items: Vec<View> = response
            .views
            .view
            .into_iter()
            .map(|view| view_from_wire(view, None))
            .collect();
        Ok(match &response.pagination {
            Some(pagination) => Page::from_pagination(items, pagination),
            None => {
                let count = items.len() as u64;
                Page::new(items, page_number, page_size, count)
            }
        })
    }
}

pub(crate) fn view_from_wire(view: ViewType, workbook_id: Option<Uuid>) -> View {
    View {
        id: view.id,
        name: view.name,
        content_url: view.content_url,
        workbook_id: view.workbook.map(|w| w.id).or(workbook_id),
        project_id: view.project.map(|p| p.id),
        tags: view.tags.labels(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::client::test_support::{page_body, signed_in_rest, ScriptedTransport};
    use reqwest::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_workbook_views_carry_workbook_id() {
        let workbook = Uuid::new_v4();
        let leaf = ScriptedTransport::new();
        leaf.push_json(
            StatusCode::OK,
            json!({ "views": { "view": [
                { "id": Uuid::new_v4(), "name": "Overview", "tags": { "tag": [{ "label": "kpi" }] } }
            ]}}),
        );
        let client = ViewsApiClient::new(signed_in_rest(leaf));

        let views = client.for_workbook(workbook, &CancellationToken::new()).await.unwrap();
        assert_eq!(views[0].workbook_id, Some(workbook));
        assert_eq!(views[0].tags, vec!["kpi"]);
    }

    #[tokio::test]
    async fn test_site_view_pager() {
        let leaf = ScriptedTransport::new();
        leaf.push_json(
            StatusCode::OK,
            page_body(
                "views",
                "view",
                json!([
                    { "id": Uuid::new_v4(), "name": "A", "workbook": { "id": Uuid::new_v4() } },
                    { "id": Uuid::new_v4(), "name": "B", "workbook": { "id": Uuid::new_v4() } }
                ]),
                2,
            ),
        );
        let client = Arc::new(ViewsApiClient::new(signed_in_rest(leaf)));

        let views = client
            .pager(100)
            .collect_all(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.workbook_id.is_some()));
    }
}
