use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::services::client::api::SiteApiClient;
use crate::services::client::auth_handler::AuthenticatingTransport;
use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::resilience::{CachedRetryPolicyBuilder, ResilientTransport};
use crate::services::client::rest_client::{RestClient, MINIMUM_API_VERSION};
use crate::services::client::session::{ServerSessionProvider, ServerVersion, SessionPhase, SignInResult};
use crate::services::client::session_refresh::{AuthenticationTokenProvider, TokenRefresher};
use crate::services::client::transport::{HttpTransport, ReqwestTransport};
use crate::services::client::types::{
    ServerInfoResponse, SignInCredentials, SignInRequest, SignInResponse, SiteContentUrl,
};
use crate::services::config::{ConfigReader, SiteConnectionConfig};

/// Entry point for one server: discovers its version and signs in to a site
///
/// Two request paths share the resilient transport. Sign-in and server info
/// go out unauthenticated; everything else goes through the authenticating
/// layer, which re-signs in through the unauthenticated path on a 401.
pub struct ApiClient {
    connection: SiteConnectionConfig,
    config: Arc<dyn ConfigReader>,
    session: Arc<ServerSessionProvider>,
    anonymous: Arc<RestClient>,
    rest: Arc<RestClient>,
}

impl ApiClient {
    pub fn new(connection: SiteConnectionConfig, config: Arc<dyn ConfigReader>) -> ClientResult<Self> {
        let leaf = Arc::new(ReqwestTransport::new(&config.get().network)?);
        Ok(Self::with_transport(connection, config, leaf))
    }

    /// Build the client stack over an arbitrary leaf transport
    pub fn with_transport(
        connection: SiteConnectionConfig,
        config: Arc<dyn ConfigReader>,
        leaf: Arc<dyn HttpTransport>,
    ) -> Self {
        let session = Arc::new(ServerSessionProvider::new());
        let policies = Arc::new(CachedRetryPolicyBuilder::new(config.clone()));
        let resilient: Arc<dyn HttpTransport> = Arc::new(ResilientTransport::new(leaf, policies));

        let anonymous = Arc::new(RestClient::new(
            resilient.clone(),
            connection.server_url.clone(),
            session.clone(),
        ));
        let refresher = Arc::new(SignInTokenRefresher {
            rest: anonymous.clone(),
            connection: connection.clone(),
        });
        let provider = Arc::new(AuthenticationTokenProvider::new(session.clone(), refresher));
        let authenticated = Arc::new(AuthenticatingTransport::new(resilient, provider));
        let rest = Arc::new(RestClient::new(
            authenticated,
            connection.server_url.clone(),
            session.clone(),
        ));

        Self {
            connection,
            config,
            session,
            anonymous,
            rest,
        }
    }

    pub fn session(&self) -> &Arc<ServerSessionProvider> {
        &self.session
    }

    /// Server version, queried against the lowest API version every server accepts
    #[instrument(skip(self, cancel), err)]
    pub async fn get_server_info(&self, cancel: &CancellationToken) -> ClientResult<ServerVersion> {
        let response: ServerInfoResponse = self
            .anonymous
            .get("/serverinfo")
            .without_site()
            .with_api_version(MINIMUM_API_VERSION)
            .send_json(cancel)
            .await?;
        let info = response.server_info;
        Ok(ServerVersion {
            rest_api_version: info.rest_api_version,
            product_version: info.product_version.value,
            build: info.product_version.build,
        })
    }

    /// Sign in to the configured site
    ///
    /// The server version is discovered first when unknown. Session state is
    /// only written once both steps succeed.
    #[instrument(skip(self, cancel), fields(site = %self.connection.site_content_url), err)]
    pub async fn sign_in(&self, cancel: &CancellationToken) -> ClientResult<Arc<SiteApiClient>> {
        self.connection
            .validate()
            .map_err(|message| ClientError::validation("connection", message))?;

        let previous_phase = self.session.phase();
        self.session.set_phase(SessionPhase::SigningIn);

        match self.discover_and_sign_in(cancel).await {
            Ok((version, signed_in)) => {
                if self.session.version().as_ref() != Some(&version) {
                    self.session.set_version(version);
                }
                self.session.set_current_user_and_site(&signed_in);
                Ok(Arc::new(SiteApiClient::new(
                    self.rest.clone(),
                    &self.config.get().batch,
                )))
            }
            Err(e) => {
                error!("[ApiClient] Sign-in to {} failed: {}", self.connection.server_url, e);
                self.session.set_phase(previous_phase);
                Err(e)
            }
        }
    }

    async fn discover_and_sign_in(
        &self,
        cancel: &CancellationToken,
    ) -> ClientResult<(ServerVersion, SignInResult)> {
        let version = match self.session.version() {
            Some(version) => version,
            None => self.get_server_info(cancel).await?,
        };
        let signed_in = request_sign_in(
            &self.anonymous,
            &self.connection,
            &version.rest_api_version,
            cancel,
        )
        .await?;
        Ok((version, signed_in))
    }
}

/// Re-authenticates with the site credentials after the session expired
struct SignInTokenRefresher {
    rest: Arc<RestClient>,
    connection: SiteConnectionConfig,
}

#[async_trait]
impl TokenRefresher for SignInTokenRefresher {
    async fn refresh_token(&self, cancel: &CancellationToken) -> ClientResult<String> {
        let version = self
            .rest
            .session()
            .version()
            .ok_or(ClientError::NotSignedIn)?;
        let signed_in =
            request_sign_in(&self.rest, &self.connection, &version.rest_api_version, cancel).await?;
        Ok(signed_in.token)
    }
}

async fn request_sign_in(
    rest: &RestClient,
    connection: &SiteConnectionConfig,
    api_version: &str,
    cancel: &CancellationToken,
) -> ClientResult<SignInResult> {
    let request = SignInRequest {
        credentials: SignInCredentials {
            personal_access_token_name: &connection.access_token_name,
            personal_access_token_secret: &connection.access_token,
            site: SiteContentUrl {
                content_url: &connection.site_content_url,
            },
        },
    };
    let response: SignInResponse = rest
        .post("/auth/signin")
        .without_site()
        .with_api_version(api_version)
        .with_json(&request)?
        .send_json(cancel)
        .await?;

    let credentials = response.credentials;
    info!(
        "[ApiClient] Signed in to site {} as {}",
        credentials.site.id, credentials.user.id
    );
    Ok(SignInResult {
        token: credentials.token,
        site_id: credentials.site.id,
        site_content_url: credentials.site.content_url,
        user_id: credentials.user.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::client::auth_handler::AUTH_HEADER;
    use crate::services::client::test_support::{json_response, page_body, ScriptedTransport};
    use crate::services::config::{MigrationConfig, ResiliencePolicyConfig, SharedConfigReader};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;
    use uuid::Uuid;

    fn connection() -> SiteConnectionConfig {
        SiteConnectionConfig::new(
            Url::parse("https://source.example.com").unwrap(),
            "marketing",
            "migration",
            "secret",
        )
    }

    fn config() -> Arc<dyn ConfigReader> {
        let mut config = MigrationConfig::default();
        config.network.resilience = ResiliencePolicyConfig::disabled();
        SharedConfigReader::new(config)
    }

    fn server_info() -> serde_json::Value {
        json!({ "serverInfo": {
            "productVersion": { "value": "2023.3.0", "build": "20233.23.1017.0948" },
            "restApiVersion": "3.21"
        }})
    }

    fn sign_in_body(token: &str, site: Uuid, user: Uuid) -> serde_json::Value {
        json!({ "credentials": {
            "token": token,
            "site": { "id": site, "contentUrl": "marketing" },
            "user": { "id": user }
        }})
    }

    #[tokio::test]
    async fn test_sign_in_discovers_version_first() {
        let site = Uuid::new_v4();
        let user = Uuid::new_v4();
        let leaf = ScriptedTransport::new();
        leaf.push_json(StatusCode::OK, server_info());
        leaf.push_json(StatusCode::OK, sign_in_body("token-1", site, user));
        let client = ApiClient::with_transport(connection(), config(), leaf.clone());

        client.sign_in(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            leaf.paths(),
            vec!["GET /api/2.4/serverinfo", "POST /api/3.21/auth/signin"]
        );
        let body: serde_json::Value =
            serde_json::from_slice(leaf.requests()[1].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["credentials"]["personalAccessTokenName"], "migration");
        assert_eq!(body["credentials"]["site"]["contentUrl"], "marketing");

        let state = client.session().snapshot();
        assert_eq!(state.site_id, Some(site));
        assert_eq!(state.user_id, Some(user));
        assert_eq!(state.phase, SessionPhase::SignedIn);
        assert_eq!(state.version.map(|v| v.rest_api_version), Some("3.21".to_string()));
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_session_untouched() {
        let leaf = ScriptedTransport::new();
        leaf.push_json(StatusCode::OK, server_info());
        leaf.push_json(
            StatusCode::UNAUTHORIZED,
            json!({ "error": { "code": "401001", "summary": "Signin Error", "detail": "bad token" } }),
        );
        let client = ApiClient::with_transport(connection(), config(), leaf);

        let outcome = client.sign_in(&CancellationToken::new()).await;

        assert!(matches!(outcome, Err(ClientError::Unauthorized { .. })));
        let state = client.session().snapshot();
        assert!(state.version.is_none());
        assert!(state.token.is_none());
        assert_eq!(state.phase, SessionPhase::SignedOut);
    }

    #[tokio::test]
    async fn test_invalid_connection_fails_fast() {
        let leaf = ScriptedTransport::new();
        let mut connection = connection();
        connection.access_token_name = " ".to_string();
        let client = ApiClient::with_transport(connection, config(), leaf.clone());

        let outcome = client.sign_in(&CancellationToken::new()).await;

        assert!(matches!(outcome, Err(ClientError::Validation { .. })));
        assert_eq!(leaf.request_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_signs_in_again_once() {
        let site = Uuid::new_v4();
        let user = Uuid::new_v4();
        let sign_ins = Arc::new(AtomicUsize::new(0));
        let counter = sign_ins.clone();
        let leaf = ScriptedTransport::with_handler(move |request| {
            let path = request.url.path();
            if path.ends_with("/serverinfo") {
                return Ok(json_response(StatusCode::OK, server_info()));
            }
            if path.ends_with("/auth/signin") {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                return Ok(json_response(
                    StatusCode::OK,
                    sign_in_body(&format!("token-{}", n), site, user),
                ));
            }
            if request.header(AUTH_HEADER.as_str()) == Some("token-2") {
                Ok(json_response(
                    StatusCode::OK,
                    page_body("users", "user", json!([{ "id": user, "name": "alice" }]), 1),
                ))
            } else {
                Ok(json_response(StatusCode::UNAUTHORIZED, json!({})))
            }
        });
        let client = ApiClient::with_transport(connection(), config(), leaf.clone());
        let cancel = CancellationToken::new();

        let site_client = client.sign_in(&cancel).await.unwrap();
        let users = site_client
            .users()
            .pager(100)
            .collect_all(cancel.clone())
            .await
            .unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(sign_ins.load(Ordering::SeqCst), 2);
        assert_eq!(client.session().token().as_deref(), Some("token-2"));
    }
}
