use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Where and how to sign in to one site
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConnectionConfig {
    pub server_url: Url,
    /// Site content URL; empty for the default site
    #[serde(default)]
    pub site_content_url: String,
    pub access_token_name: String,
    pub access_token: String,
}

impl SiteConnectionConfig {
    pub fn new(
        server_url: Url,
        site_content_url: impl Into<String>,
        access_token_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            server_url,
            site_content_url: site_content_url.into(),
            access_token_name: access_token_name.into(),
            access_token: access_token.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.server_url.scheme() {
            "http" | "https" => {}
            other => return Err(format!("server_url scheme '{}' is not http(s)", other)),
        }

        if self.access_token_name.trim().is_empty() {
            return Err("access_token_name must not be empty".to_string());
        }

        if self.access_token.is_empty() {
            return Err("access_token must not be empty".to_string());
        }

        Ok(())
    }
}

// Keeps the secret out of logs
impl fmt::Debug for SiteConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteConnectionConfig")
            .field("server_url", &self.server_url.as_str())
            .field("site_content_url", &self.site_content_url)
            .field("access_token_name", &self.access_token_name)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(url: &str) -> SiteConnectionConfig {
        SiteConnectionConfig::new(Url::parse(url).unwrap(), "marketing", "migrator", "secret")
    }

    #[test]
    fn test_validate() {
        assert!(connection("https://analytics.example.com").validate().is_ok());
        assert!(connection("ftp://analytics.example.com").validate().is_err());

        let mut missing_token = connection("https://analytics.example.com");
        missing_token.access_token.clear();
        assert!(missing_token.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let printed = format!("{:?}", connection("https://analytics.example.com"));
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));
    }
}
