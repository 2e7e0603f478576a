//! Local route table: method + path pattern to handler.
//!
//! The table is assembled once through [`RouteTableBuilder`] and is immutable
//! afterwards. Lookup walks routes in registration order; the first route whose
//! method and pattern both match wins.

pub mod context;
pub mod handler;
pub mod pattern;

pub use context::{RequestContext, REQUEST_PATH_KEY};
pub use handler::{Handler, Reply};
pub use pattern::{Params, PathPattern};

use crate::error::ApiError;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// Which request methods a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    Only(Method),
    Any,
}

impl MethodFilter {
    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Only(m) => m == method,
            MethodFilter::Any => true,
        }
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Only(m) => write!(f, "{}", m),
            MethodFilter::Any => write!(f, "ALL"),
        }
    }
}

struct Route {
    method: MethodFilter,
    pattern: PathPattern,
    handler: Arc<dyn Handler>,
}

/// A successful lookup.
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: Arc<dyn Handler>,
    pub params: Params,
    pub pattern: String,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            if !route.method.accepts(method) {
                return None;
            }
            route.pattern.matches(path).map(|params| RouteMatch {
                handler: Arc::clone(&route.handler),
                params,
                pattern: route.pattern.as_str().to_string(),
            })
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// `(method, pattern)` pairs in registration order.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.routes
            .iter()
            .map(|r| (r.method.to_string(), r.pattern.as_str().to_string()))
            .collect()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.describe()).finish()
    }
}

/// Collects route registrations. Pattern errors surface from [`build`](Self::build).
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: Vec<Route>,
    error: Option<ApiError>,
}

impl RouteTableBuilder {
    pub fn route<H>(mut self, method: MethodFilter, pattern: &str, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        match PathPattern::parse(pattern) {
            Ok(pattern) => self.routes.push(Route {
                method,
                pattern,
                handler: Arc::new(handler),
            }),
            Err(e) => self.error = Some(e),
        }
        self
    }

    pub fn get<H: Handler + 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(MethodFilter::Only(Method::GET), pattern, handler)
    }

    pub fn post<H: Handler + 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(MethodFilter::Only(Method::POST), pattern, handler)
    }

    pub fn put<H: Handler + 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(MethodFilter::Only(Method::PUT), pattern, handler)
    }

    pub fn patch<H: Handler + 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(MethodFilter::Only(Method::PATCH), pattern, handler)
    }

    pub fn delete<H: Handler + 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(MethodFilter::Only(Method::DELETE), pattern, handler)
    }

    pub fn all<H: Handler + 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(MethodFilter::Any, pattern, handler)
    }

    pub fn build(self) -> Result<RouteTable, ApiError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(RouteTable {
                routes: self.routes,
            }),
        }
    }
}
