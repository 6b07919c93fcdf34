//! Scripted transport used by client and pipeline tests

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::errors::{ClientError, ClientResult};
use super::rest_client::RestClient;
use super::session::{ServerSessionProvider, ServerVersion, SignInResult};
use super::transport::{HttpTransport, RestRequest, RestResponse};
use url::Url;
use uuid::Uuid;

type Handler = Box<dyn Fn(&RestRequest) -> ClientResult<RestResponse> + Send + Sync>;

/// Replays queued responses in order, then falls back to a handler
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<ClientResult<RestResponse>>>,
    handler: Mutex<Option<Handler>>,
    requests: Mutex<Vec<RestRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_handler<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&RestRequest) -> ClientResult<RestResponse> + Send + Sync + 'static,
    {
        let transport = Self::default();
        *transport.handler.lock().unwrap() = Some(Box::new(handler));
        Arc::new(transport)
    }

    pub fn push(&self, outcome: ClientResult<RestResponse>) {
        self.queue.lock().unwrap().push_back(outcome);
    }

    pub fn push_status(&self, status: StatusCode) {
        self.push(Ok(RestResponse::new(status, "")));
    }

    pub fn push_json(&self, status: StatusCode, body: serde_json::Value) {
        self.push(Ok(json_response(status, body)));
    }

    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url.path()))
            .collect()
    }
}

/// Site id used by [`signed_in_rest`]
pub const TEST_SITE_ID: Uuid = Uuid::from_u128(0x5175_0000_0000_4000_8000_0000_0000_0001);

/// Session signed in to `TEST_SITE_ID` on REST API 3.18
pub fn signed_in_session() -> Arc<ServerSessionProvider> {
    let session = Arc::new(ServerSessionProvider::new());
    session.set_version(ServerVersion {
        rest_api_version: "3.18".to_string(),
        product_version: "2023.2".to_string(),
        build: "20232.23.0611.2007".to_string(),
    });
    session.set_current_user_and_site(&SignInResult {
        token: "test-token".to_string(),
        site_id: TEST_SITE_ID,
        site_content_url: "marketing".to_string(),
        user_id: Uuid::from_u128(0xa11ce),
    });
    session
}

pub fn signed_in_rest(transport: Arc<dyn HttpTransport>) -> Arc<RestClient> {
    Arc::new(RestClient::new(
        transport,
        Url::parse("https://analytics.example.com").unwrap(),
        signed_in_session(),
    ))
}

/// Paged list body: `{"pagination": {...}, "<plural>": {"<singular>": [...]}}`
pub fn page_body(plural: &str, singular: &str, items: serde_json::Value, total: usize) -> serde_json::Value {
    let mut body = serde_json::json!({
        "pagination": { "pageNumber": "1", "pageSize": "100", "totalAvailable": total.to_string() },
    });
    body[plural][singular] = items;
    body
}

pub fn json_response(status: StatusCode, body: serde_json::Value) -> RestResponse {
    RestResponse::new(status, serde_json::to_vec(&body).unwrap())
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        request: RestRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<RestResponse> {
        if cancel.is_cancelled() {
            return Err(ClientError::Canceled);
        }
        self.requests.lock().unwrap().push(request.clone());

        if let Some(outcome) = self.queue.lock().unwrap().pop_front() {
            return outcome;
        }

        match self.handler.lock().unwrap().as_ref() {
            Some(handler) => handler(&request),
            None => Err(ClientError::validation(
                "request",
                format!("unscripted {} {}", request.method, request.url),
            )),
        }
    }
}
