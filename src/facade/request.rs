//! `LocalRequest`: the network-request surface, answered in-process.

use crate::error::ApiError;
use crate::facade::response::ResponseEnvelope;
use crate::router::{Reply, RequestContext, RouteTable};
use http::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Unsent,
    Opened,
    Done,
}

type OnLoad = Box<dyn FnMut(&LocalRequest) + Send>;

pub struct LocalRequest {
    routes: Arc<RouteTable>,
    origin: Url,
    method: Option<Method>,
    url: Option<Url>,
    request_headers: Vec<(String, String)>,
    response: Option<ResponseEnvelope>,
    ready_state: ReadyState,
    onload: Option<OnLoad>,
}

impl LocalRequest {
    pub fn new(routes: Arc<RouteTable>, origin: Url) -> Self {
        Self {
            routes,
            origin,
            method: None,
            url: None,
            request_headers: Vec::new(),
            response: None,
            ready_state: ReadyState::Unsent,
            onload: None,
        }
    }

    /// Record method and URL. Relative URLs resolve against the origin.
    pub fn open(&mut self, method: &str, url: &str) -> Result<(), ApiError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ApiError::InvalidMethod(method.to_string()))?;
        let url = self.origin.join(url)?;

        self.method = Some(method);
        self.url = Some(url);
        self.request_headers.clear();
        self.response = None;
        self.ready_state = ReadyState::Opened;
        Ok(())
    }

    /// Dispatch to the local handler and complete the exchange.
    ///
    /// An unmatched path completes with body `"404"`. A handler error is
    /// returned as-is and leaves the request without a response.
    pub async fn send(&mut self, body: Option<&str>) -> Result<(), ApiError> {
        let (method, url) = match (&self.method, &self.url) {
            (Some(method), Some(url)) => (method.clone(), url.clone()),
            _ => {
                return Err(ApiError::InvalidState(
                    "send() called before open()".to_string(),
                ))
            }
        };
        let path = url.path().to_string();

        let envelope = match self.routes.find(&method, &path) {
            Some(matched) => {
                debug!(method = %method, path = %path, route = %matched.pattern, "Routing request locally");
                let query = url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()));
                let ctx = RequestContext::build(body, matched.params, query, &path);
                match matched.handler.call(ctx) {
                    Reply::Ready(result) => result?,
                    Reply::Deferred(future) => future.await?,
                }
            }
            None => {
                debug!(method = %method, path = %path, "No local route");
                ResponseEnvelope::not_found()
            }
        };

        self.complete(envelope);
        Ok(())
    }

    fn complete(&mut self, envelope: ResponseEnvelope) {
        self.response = Some(envelope);
        self.ready_state = ReadyState::Done;
        if let Some(mut onload) = self.onload.take() {
            onload(self);
            self.onload = Some(onload);
        }
    }

    pub fn set_onload<F>(&mut self, callback: F)
    where
        F: FnMut(&LocalRequest) + Send + 'static,
    {
        self.onload = Some(Box::new(callback));
    }

    pub fn clear_onload(&mut self) {
        self.onload = None;
    }

    pub fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), ApiError> {
        if self.ready_state != ReadyState::Opened {
            return Err(ApiError::InvalidState(
                "request headers can only be set after open()".to_string(),
            ));
        }
        self.request_headers
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub fn request_headers(&self) -> &[(String, String)] {
        &self.request_headers
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn response(&self) -> Option<&ResponseEnvelope> {
        self.response.as_ref()
    }

    pub fn response_text(&self) -> Option<&str> {
        self.response.as_ref().map(ResponseEnvelope::body)
    }

    pub fn response_url(&self) -> Option<&Url> {
        match self.ready_state {
            ReadyState::Done => self.url.as_ref(),
            _ => None,
        }
    }

    /// Always 200; routing misses are answered with a body, not a status.
    pub fn status(&self) -> u16 {
        StatusCode::OK.as_u16()
    }

    pub fn status_text(&self) -> &'static str {
        StatusCode::OK.canonical_reason().unwrap_or("OK")
    }

    pub fn get_response_header(&self, name: &str) -> Option<&str> {
        self.response.as_ref()?.header(name)
    }

    pub fn get_all_response_headers(&self) -> String {
        self.response
            .as_ref()
            .map(|r| {
                r.headers()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join("\r\n")
            })
            .unwrap_or_default()
    }
}

impl fmt::Debug for LocalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("ready_state", &self.ready_state)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}
