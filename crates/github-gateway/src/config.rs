//! GitHub connection settings.

use serde::{Deserialize, Serialize};

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API root (GitHub Enterprise: `https://host/api/v3`)
    pub api_url: String,
    /// Organization whose repositories are scanned
    pub organization: String,
    /// Personal access or app token; required for writes
    #[serde(skip_serializing, default)]
    pub token: Option<String>,
    pub user_agent: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Page size for repository listing (GitHub maximum is 100)
    pub per_page: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            organization: std::env::var("POLICY_BOT_ORG").unwrap_or_default(),
            token: std::env::var("GITHUB_TOKEN")
                .or_else(|_| std::env::var("TTV_GITHUB_PAT"))
                .ok()
                .filter(|t| !t.is_empty()),
            user_agent: format!("policy-bot/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            per_page: 100,
        }
    }
}

impl GitHubConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific API root and organization
    pub fn new(api_url: &str, organization: &str) -> Self {
        GitHubConfig {
            api_url: api_url.to_string(),
            organization: organization.to_string(),
            token: None,
            user_agent: format!("policy-bot/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            per_page: 100,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, 100);
        self
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("organization", &self.organization)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("per_page", &self.per_page)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let config = GitHubConfig::new(DEFAULT_API_URL, "org").with_token("ghp_secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = GitHubConfig::new(DEFAULT_API_URL, "org").with_token("ghp_secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("ghp_secret"));
    }

    #[test]
    fn test_per_page_is_clamped() {
        let config = GitHubConfig::new(DEFAULT_API_URL, "org").with_per_page(500);
        assert_eq!(config.per_page, 100);
    }
}
