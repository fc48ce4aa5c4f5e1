use std::sync::Arc;

use crate::config::Settings;
use crate::source::{HttpUpstream, Resolver, Upstream, UpstreamError, Whitelist};
use crate::template::Engine;

/// Process-wide, read-only state shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub engine: Arc<Engine>,
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, UpstreamError> {
        let upstream = Arc::new(HttpUpstream::new(&settings.upstream)?);
        Ok(Self::with_upstream(settings, upstream))
    }

    /// Build state around a caller-supplied [`Upstream`].
    pub fn with_upstream(settings: Settings, upstream: Arc<dyn Upstream>) -> Self {
        let whitelist = Whitelist::new(&settings.whitelist.hosts);
        let resolver = Arc::new(Resolver::new(
            whitelist,
            upstream.clone(),
            settings.server.max_body_bytes,
        ));

        Self {
            resolver,
            engine: Arc::new(Engine::new()),
            upstream,
        }
    }
}
