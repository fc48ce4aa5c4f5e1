//! Outbound HTTP: template fetches and the userinfo lookup.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;

pub const SUBSCRIPTION_USERINFO: &str = "subscription-userinfo";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Remote origins the service talks to.
///
/// Implementations must be shareable across request tasks.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// GET `url` and return the full response body, decoded as UTF-8 with
    /// invalid sequences replaced.
    async fn fetch_template(&self, url: &Url) -> Result<String, UpstreamError>;

    /// HEAD `url` and return its `Subscription-Userinfo` header, if any.
    async fn fetch_userinfo(&self, url: &str) -> Result<Option<HeaderValue>, UpstreamError>;
}

/// [`Upstream`] backed by a shared `reqwest` client.
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());

        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch_template(&self, url: &Url) -> Result<String, UpstreamError> {
        let response = self.client.get(url.clone()).send().await?;

        tracing::debug!(
            url = %url,
            status = response.status().as_u16(),
            "Fetched template"
        );

        let body = response.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn fetch_userinfo(&self, url: &str) -> Result<Option<HeaderValue>, UpstreamError> {
        let response = self.client.head(url).send().await?;

        Ok(response.headers().get(SUBSCRIPTION_USERINFO).cloned())
    }
}
