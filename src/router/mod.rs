use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use serde_json::Value;
use smallvec::SmallVec;

use crate::errors::HubError;
use crate::wire::WireResponse;

// -----------------------------------------------------------------------------
// ----- WdRequest / WdHandler -------------------------------------------------

/// One request as the routed handlers see it.
#[derive(Clone, Debug)]
pub struct WdRequest {
    pub method: Method,
    /// Path and query exactly as received; handlers that forward must not
    /// rewrite it.
    pub uri: String,
    /// Session id bound from the matched route or redirect prefix.
    pub session_id: Option<String>,
    pub body: Bytes,
}

impl WdRequest {
    /// The JSON body; an empty body reads as an empty object.
    pub fn payload(&self) -> Result<Value, HubError> {
        if self.body.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|err| HubError::Configuration(format!("malformed json body: {err}")))
    }
}

#[async_trait]
pub trait WdHandler: Send + Sync {
    async fn handle(&self, request: &WdRequest) -> Result<WireResponse, HubError>;
}

// -----------------------------------------------------------------------------
// ----- Route -----------------------------------------------------------------

type Segments = SmallVec<[String; 8]>;

/// A registered route: method, URL template and handler. The template is
/// compiled into its segment array once, at registration.
pub struct Route {
    method: Method,
    template: String,
    segments: Segments,
    handler: Arc<dyn WdHandler>,
}

impl Route {
    fn new(method: Method, template: &str, handler: Arc<dyn WdHandler>) -> Self {
        Self {
            method,
            template: template.to_owned(),
            segments: compile(template),
            handler,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn handler(&self) -> &Arc<dyn WdHandler> {
        &self.handler
    }

    /// Template matching: equal segment counts, and each template segment is
    /// either a `:param` wildcard or character-equal to the URL segment.
    fn matches(&self, method: &Method, url_segments: &[&str]) -> bool {
        if self.method != *method || self.segments.len() != url_segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(url_segments)
            .all(|(tpl, url)| tpl.starts_with(':') || tpl == url)
    }

    /// The URL segment in the position of the template segment containing
    /// `name`. Requires matching segment counts.
    pub fn param(&self, uri: &str, name: &str) -> Option<String> {
        let path = strip_query(uri);
        let url_segments: Vec<&str> = path.split('/').collect();
        if url_segments.len() != self.segments.len() {
            return None;
        }
        position_of(&self.segments, name).map(|i| url_segments[i].to_owned())
    }
}

// -----------------------------------------------------------------------------
// ----- Router ----------------------------------------------------------------

pub enum Dispatch {
    Route(Arc<Route>),
    Redirect(Arc<dyn WdHandler>),
}

/// Per-method route tables plus a secondary prefix table for session-scoped
/// proxy routes. Dispatch order is registration order: the first registered route
/// that matches wins, deterministically.
#[derive(Default)]
pub struct Router {
    routes: Vec<Arc<Route>>,
    redirects: Vec<(String, Arc<dyn WdHandler>)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: Method, template: &str, handler: Arc<dyn WdHandler>) {
        self.routes
            .push(Arc::new(Route::new(method, template, handler)));
    }

    /// Requests matching no template fall through to the first registered
    /// prefix handler whose prefix starts the URL.
    pub fn register_redirect(&mut self, prefix: &str, handler: Arc<dyn WdHandler>) {
        self.redirects.push((prefix.to_owned(), handler));
    }

    pub fn dispatch(&self, method: &Method, uri: &str) -> Option<Dispatch> {
        let path = strip_query(uri);
        let url_segments: Vec<&str> = path.split('/').collect();

        for route in &self.routes {
            if route.matches(method, &url_segments) {
                return Some(Dispatch::Route(route.clone()));
            }
        }

        for (prefix, handler) in &self.redirects {
            if path.starts_with(prefix.as_str()) {
                return Some(Dispatch::Redirect(handler.clone()));
            }
        }

        None
    }
}

// -----------------------------------------------------------------------------
// ----- Parameter extraction --------------------------------------------------

/// Standalone parameter extraction for callers without a matched `Route` (the
/// redirect path). With `validate_len` unset, the URL may have more segments
/// than the template.
pub fn extract_param(template: &str, uri: &str, name: &str, validate_len: bool) -> Option<String> {
    let segments = compile(template);
    let path = strip_query(uri);
    let url_segments: Vec<&str> = path.split('/').collect();
    if validate_len && url_segments.len() != segments.len() {
        return None;
    }
    let index = position_of(&segments, name)?;
    url_segments.get(index).map(|s| (*s).to_owned())
}

pub fn strip_query(uri: &str) -> &str {
    match uri.find('?') {
        Some(pos) => &uri[..pos],
        None => uri,
    }
}

fn compile(template: &str) -> Segments {
    // Tolerate a stray query suffix in a registered template.
    strip_query(template)
        .split('/')
        .map(str::to_owned)
        .collect()
}

fn position_of(segments: &Segments, name: &str) -> Option<usize> {
    segments.iter().position(|segment| segment.contains(name))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
