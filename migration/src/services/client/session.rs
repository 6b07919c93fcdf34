use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

/// Version information reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub rest_api_version: String,
    pub product_version: String,
    pub build: String,
}

impl ServerVersion {
    pub fn api_version(&self) -> Option<ApiVersion> {
        ApiVersion::parse(&self.rest_api_version)
    }
}

/// REST API version, e.g. `3.18`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (major, minor) = value.trim().split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    SignedOut,
    SigningIn,
    SignedIn,
    SigningOut,
}

/// Identity returned by a successful sign-in
#[derive(Clone, PartialEq, Eq)]
pub struct SignInResult {
    pub token: String,
    pub site_id: Uuid,
    pub site_content_url: String,
    pub user_id: Uuid,
}

impl fmt::Debug for SignInResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInResult")
            .field("site_id", &self.site_id)
            .field("site_content_url", &self.site_content_url)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct SessionState {
    pub version: Option<ServerVersion>,
    pub site_id: Option<Uuid>,
    pub site_content_url: Option<String>,
    pub user_id: Option<Uuid>,
    pub token: Option<String>,
    pub phase: SessionPhase,
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("version", &self.version)
            .field("site_id", &self.site_id)
            .field("site_content_url", &self.site_content_url)
            .field("user_id", &self.user_id)
            .field("has_token", &self.token.is_some())
            .field("phase", &self.phase)
            .finish()
    }
}

/// Mutable session state of one server connection
#[derive(Debug, Default)]
pub struct ServerSessionProvider {
    state: RwLock<SessionState>,
}

impl ServerSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionState {
        self.read().clone()
    }

    pub fn version(&self) -> Option<ServerVersion> {
        self.read().version.clone()
    }

    pub fn set_version(&self, version: ServerVersion) {
        info!(
            "[SessionProvider] Server {} (REST API {})",
            version.product_version, version.rest_api_version
        );
        self.write().version = Some(version);
    }

    pub fn site_id(&self) -> Option<Uuid> {
        self.read().site_id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.read().user_id
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn set_token(&self, token: String) {
        self.write().token = Some(token);
    }

    pub fn phase(&self) -> SessionPhase {
        self.read().phase
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.write().phase = phase;
    }

    pub fn is_signed_in(&self) -> bool {
        let state = self.read();
        state.user_id.is_some() && state.token.is_some()
    }

    pub fn set_current_user_and_site(&self, signed_in: &SignInResult) {
        let mut state = self.write();
        state.site_id = Some(signed_in.site_id);
        state.site_content_url = Some(signed_in.site_content_url.clone());
        state.user_id = Some(signed_in.user_id);
        state.token = Some(signed_in.token.clone());
        state.phase = SessionPhase::SignedIn;
        info!(
            "[SessionProvider] Signed in to site '{}' as {}",
            signed_in.site_content_url, signed_in.user_id
        );
    }

    /// Forget the signed-in identity; the server version is kept
    pub fn clear_current_user_and_site(&self) {
        let mut state = self.write();
        state.site_id = None;
        state.site_content_url = None;
        state.user_id = None;
        state.token = None;
        state.phase = SessionPhase::SignedOut;
        info!("[SessionProvider] Session cleared");
    }
}
