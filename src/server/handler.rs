use axum::{
    extract::{Request, State},
    response::Response,
};

use crate::directive::extract_attributes;
use crate::error::Result;
use crate::response::compose_response;
use crate::source::variables_from_query;

use super::AppState;

/// Resolve, render, extract directives, compose.
#[tracing::instrument(
    name = "http.render",
    skip(state, request),
    fields(method = %request.method())
)]
pub async fn render(State(state): State<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let query = parts.uri.query();

    let text = state.resolver.resolve(&parts.method, query, body).await?;

    let variables = variables_from_query(query);
    let rendered = state.engine.render(&text, &variables)?;

    let attributes = extract_attributes(&rendered);
    tracing::debug!(
        bytes = rendered.len(),
        attributes = attributes.len(),
        "Template rendered"
    );

    Ok(compose_response(rendered, &attributes, state.upstream.as_ref()).await)
}
