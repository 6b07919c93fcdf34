//! REST client for the analytics server
//!
//! Requests flow through a stack of [`HttpTransport`] layers:
//!
//! - [`AuthenticatingTransport`] attaches the session token and re-signs in
//!   once on a 401, sharing one refresh between concurrent callers
//! - [`ResilientTransport`] retries transient failures per the live config
//! - [`ReqwestTransport`] performs the HTTP exchange
//!
//! On top sit the [`RestClient`] request builder, the paged list accessor and
//! one API client per content type.

pub mod api;
pub mod auth;
pub mod auth_handler;
pub mod errors;
pub mod paging;
pub mod resilience;
pub mod rest_client;
pub mod session;
pub mod session_refresh;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::SiteApiClient;
pub use auth::ApiClient;
pub use auth_handler::AuthenticatingTransport;
pub use errors::{ClientError, ClientResult, TransportError};
pub use paging::{ApiListPager, LoadedPageAccessor, Page, PageAccessor};
pub use resilience::{CachedRetryPolicyBuilder, ResilientTransport, RetryPolicy};
pub use rest_client::{RestClient, RestRequestBuilder};
pub use session::{ServerSessionProvider, ServerVersion, SessionPhase};
pub use session_refresh::{AuthenticationTokenProvider, TokenRefresher};
pub use transport::{HttpTransport, ReqwestTransport, RestRequest, RestResponse};
