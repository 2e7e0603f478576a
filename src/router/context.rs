//! Request context handed to route handlers.

use crate::router::pattern::Params;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Key under which the request path is exposed alongside the parameters.
pub const REQUEST_PATH_KEY: &str = "requestURL";

/// Merged request parameters plus the normalized request path.
///
/// Layers are applied in order body, path parameters, query string; a later
/// layer overwrites keys set by an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    params: HashMap<String, String>,
    path: String,
}

impl RequestContext {
    pub fn build<Q>(body: Option<&str>, path_params: Params, query: Q, path: &str) -> Self
    where
        Q: IntoIterator<Item = (String, String)>,
    {
        let mut params = HashMap::new();
        if let Some(body) = body {
            params.extend(
                url::form_urlencoded::parse(body.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }
        params.extend(path_params);
        params.extend(query);

        Self {
            params,
            path: path.to_string(),
        }
    }

    /// Look up a parameter. [`REQUEST_PATH_KEY`] always yields the path.
    pub fn get(&self, key: &str) -> Option<&str> {
        if key == REQUEST_PATH_KEY {
            return Some(&self.path);
        }
        self.params.get(key).map(String::as_str)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// The context as a JSON object, path included under [`REQUEST_PATH_KEY`].
    pub fn to_json(&self) -> Value {
        let mut object: Map<String, Value> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        object.insert(REQUEST_PATH_KEY.to_string(), Value::String(self.path.clone()));
        Value::Object(object)
    }
}
