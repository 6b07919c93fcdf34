use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::services::client::errors::ClientResult;
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{TagsRequest, TagsType};
use crate::services::content::ContentType;

pub struct TagsApiClient {
    rest: Arc<RestClient>,
    content_type: ContentType,
}

impl TagsApiClient {
    pub fn new(rest: Arc<RestClient>, content_type: ContentType) -> Self {
        Self { rest, content_type }
    }

    #[instrument(skip(self, cancel), fields(content_type = %self.content_type), err)]
    pub async fn add_tags(&self, content_id: Uuid, labels: &[String], cancel: &CancellationToken) -> ClientResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        self.rest
            .put(self.content_type.url_segment())
            .segment(content_id)
            .segment("tags")
            .with_json(&TagsRequest {
                tags: TagsType::from_labels(labels),
            })?
            .send_empty(cancel)
            .await
    }

    pub async fn remove_tag(&self, content_id: Uuid, label: &str, cancel: &CancellationToken) -> ClientResult<()> {
        self.rest
            .delete(self.content_type.url_segment())
            .segment(content_id)
            .segment("tags")
            .segment(label)
            .send_empty(cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::client::test_support::{signed_in_rest, ScriptedTransport};
    use reqwest::StatusCode;

    #[tokio::test]
    async fn test_add_tags_body() {
        let leaf = ScriptedTransport::new();
        leaf.push_status(StatusCode::OK);
        let client = TagsApiClient::new(signed_in_rest(leaf.clone()), ContentType::DataSource);
        let id = Uuid::new_v4();

        client
            .add_tags(id, &["finance".to_string(), "year end".to_string()], &CancellationToken::new())
            .await
            .unwrap();

        let request = &leaf.requests()[0];
        assert!(request.url.path().ends_with(&format!("/datasources/{}/tags", id)));
        let body: serde_json::Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["tags"]["tag"][1]["label"], "year end");
    }

    #[tokio::test]
    async fn test_no_labels_no_request() {
        let leaf = ScriptedTransport::new();
        let client = TagsApiClient::new(signed_in_rest(leaf.clone()), ContentType::Workbook);
        client
            .add_tags(Uuid::new_v4(), &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(leaf.request_count(), 0);
    }
}
