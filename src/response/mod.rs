//! Builds the final response from rendered output and its directives.

mod disposition;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use crate::directive::Attributes;
use crate::source::{Upstream, SUBSCRIPTION_USERINFO};

pub use disposition::attachment;

/// Directive naming a URL whose `Subscription-Userinfo` header is forwarded.
pub const USERINFO_URL_KEY: &str = "userinfo-url";

/// Directive setting the download filename.
pub const FILENAME_KEY: &str = "filename";

/// Compose a `200 text/plain` response carrying the `rendered` bytes verbatim.
///
/// The userinfo lookup is best effort: any failure leaves the header out.
pub async fn compose_response(
    rendered: Vec<u8>,
    attributes: &Attributes,
    upstream: &dyn Upstream,
) -> Response {
    let mut response = Response::new(Body::from(rendered));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();

    if let Some(url) = attributes.get(USERINFO_URL_KEY) {
        match upstream.fetch_userinfo(url).await {
            Ok(Some(info)) if !info.is_empty() => {
                headers.insert(SUBSCRIPTION_USERINFO, info);
            }
            Ok(_) => {
                tracing::debug!(url = %url, "Userinfo lookup returned no header");
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Userinfo lookup failed");
            }
        }
    }

    if let Some(filename) = attributes.get(FILENAME_KEY) {
        match HeaderValue::from_str(&attachment(filename)) {
            Ok(value) => {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Unusable filename directive");
            }
        }
    }

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

    response
}
