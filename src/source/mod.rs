//! Template source resolution.
//!
//! - `GET`: the template is fetched from the URL in the `template` query
//!   parameter. Only `http`/`https` URLs on a whitelisted host are fetched,
//!   so the service cannot be used as an open proxy.
//! - `POST`: the request body is the template.
//! - Anything else is rejected with 405.

mod upstream;
mod variables;
mod whitelist;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Method;
use url::{form_urlencoded, Url};

use crate::error::{AppError, Result};

pub use upstream::{HttpUpstream, Upstream, UpstreamError, SUBSCRIPTION_USERINFO};
pub use variables::variables_from_query;
pub use whitelist::Whitelist;

/// Query parameter carrying the remote template URL.
pub const TEMPLATE_PARAM: &str = "template";

/// Produces the raw template text for one request.
pub struct Resolver {
    whitelist: Whitelist,
    upstream: Arc<dyn Upstream>,
    max_body_bytes: usize,
}

impl Resolver {
    pub fn new(whitelist: Whitelist, upstream: Arc<dyn Upstream>, max_body_bytes: usize) -> Self {
        Self {
            whitelist,
            upstream,
            max_body_bytes,
        }
    }

    pub async fn resolve(&self, method: &Method, query: Option<&str>, body: Body) -> Result<String> {
        match method {
            &Method::GET => self.fetch_remote(query).await,
            &Method::POST => self.read_body(body).await,
            _ => Err(AppError::MethodNotAllowed),
        }
    }

    async fn fetch_remote(&self, query: Option<&str>) -> Result<String> {
        let raw = query
            .and_then(|q| first_param(q, TEMPLATE_PARAM))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                AppError::Input(format!("Query parameter '{}' not found", TEMPLATE_PARAM))
            })?;

        let url = Url::parse(&raw)
            .map_err(|e| AppError::Input(format!("Parse url {}: {}", raw, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AppError::Input(format!("Unsupported url {}", url)));
        }

        if !self.whitelist.allows(&url) {
            return Err(AppError::Policy(format!("Template {} unavailable", url)));
        }

        self.upstream
            .fetch_template(&url)
            .await
            .map_err(|e| AppError::Upstream(format!("Fetch template from {}: {}", url, e)))
    }

    async fn read_body(&self, body: Body) -> Result<String> {
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| AppError::Input(format!("Fetch request payload: {}", e)))?;

        if bytes.is_empty() {
            return Err(AppError::Input("Empty template from body".to_string()));
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// First value of `key` in a raw query string.
fn first_param(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
