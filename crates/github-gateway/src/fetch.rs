//! Canonical policy content over plain HTTP(S).

use std::time::Duration;

use async_trait::async_trait;
use policy_bots_core::context::RunContext;
use policy_bots_core::gateway::{ContentFetcher, GatewayError, GatewayResult};
use tracing::debug;

use crate::error::{self, GitHubError};

/// Fetches policy sources. No credentials are attached: sources are
/// arbitrary URLs and must not receive the GitHub token.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    http: reqwest::Client,
}

impl HttpContentFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, ctx: &RunContext, url: &str) -> GatewayResult<String> {
        debug!(url = %url, "fetching canonical content");
        let response = ctx
            .run(self.http.get(url).send())
            .await?
            .map_err(error::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: format!("GET {url} returned {status}"),
            });
        }

        ctx.run(response.text())
            .await?
            .map_err(|e| GatewayError::Decode(format!("{url}: {e}")))
    }
}
