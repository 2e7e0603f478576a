//! Response envelopes produced by route handlers.

use serde_json::Value;

/// Header naming the client-side template that renders a structured body.
pub const TEMPLATE_HEADER: &str = "hx-template";
/// Header asking the client to navigate elsewhere.
pub const LOCATION_HEADER: &str = "HX-Location";
/// Body sent when no local route matches.
pub const NOT_FOUND_BODY: &str = "404";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEnvelope {
    /// Full body, implicit success, no headers
    Raw(String),
    Structured {
        body: String,
        headers: Vec<(String, String)>,
    },
}

impl ResponseEnvelope {
    pub fn raw(body: impl Into<String>) -> Self {
        ResponseEnvelope::Raw(body.into())
    }

    pub fn structured(body: impl Into<String>) -> Self {
        ResponseEnvelope::Structured {
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header, turning a raw envelope into a structured one.
    pub fn with_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (body, mut headers) = match self {
            ResponseEnvelope::Raw(body) => (body, Vec::new()),
            ResponseEnvelope::Structured { body, headers } => (body, headers),
        };
        headers.push((name.into(), value.into()));
        ResponseEnvelope::Structured { body, headers }
    }

    /// JSON body tagged with the template that should render it.
    /// A null `data` serializes as `{}`.
    pub fn view(template_id: &str, data: Value) -> Self {
        let data = if data.is_null() {
            Value::Object(Default::default())
        } else {
            data
        };
        ResponseEnvelope::structured(data.to_string()).with_header(TEMPLATE_HEADER, template_id)
    }

    pub fn redirect(url: &str) -> Self {
        ResponseEnvelope::structured("{}").with_header(LOCATION_HEADER, url)
    }

    pub fn not_found() -> Self {
        ResponseEnvelope::Raw(NOT_FOUND_BODY.to_string())
    }

    pub fn body(&self) -> &str {
        match self {
            ResponseEnvelope::Raw(body) => body,
            ResponseEnvelope::Structured { body, .. } => body,
        }
    }

    /// Header lookup, ASCII case-insensitive. Raw envelopes carry no headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        match self {
            ResponseEnvelope::Raw(_) => &[],
            ResponseEnvelope::Structured { headers, .. } => headers,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ResponseEnvelope::Structured { .. })
    }
}

impl From<String> for ResponseEnvelope {
    fn from(body: String) -> Self {
        ResponseEnvelope::Raw(body)
    }
}

impl From<&str> for ResponseEnvelope {
    fn from(body: &str) -> Self {
        ResponseEnvelope::Raw(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_envelope() {
        let envelope = ResponseEnvelope::view("item", json!({"id": "42"}));
        assert_eq!(envelope.body(), r#"{"id":"42"}"#);
        assert_eq!(envelope.header("HX-Template"), Some("item"));

        let empty = ResponseEnvelope::view("list", Value::Null);
        assert_eq!(empty.body(), "{}");
    }

    #[test]
    fn test_redirect_envelope() {
        let envelope = ResponseEnvelope::redirect("/items");
        assert_eq!(envelope.body(), "{}");
        assert_eq!(envelope.header("hx-location"), Some("/items"));
    }

    #[test]
    fn test_raw_has_no_headers() {
        let envelope = ResponseEnvelope::from("<p>hi</p>");
        assert!(envelope.headers().is_empty());
        assert_eq!(envelope.header("content-type"), None);

        let tagged = envelope.with_header("X-Trace", "1");
        assert!(tagged.is_structured());
        assert_eq!(tagged.body(), "<p>hi</p>");
    }
}
