//! Path patterns: `/items/:id`, `/files/*path`.

use crate::error::ApiError;
use std::collections::HashMap;

pub type Params = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    /// Binds the remainder of the path, `/` included; always last
    Splat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, ApiError> {
        let invalid = |reason: &str| ApiError::InvalidRoute {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let rest = pattern
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                if matches!(segments.last(), Some(Segment::Splat(_))) {
                    return Err(invalid("a '*' segment must be last"));
                }
                let segment = if let Some(name) = part.strip_prefix(':') {
                    Segment::Param(param_name(name).ok_or_else(|| invalid("bad parameter name"))?)
                } else if let Some(name) = part.strip_prefix('*') {
                    let name = if name.is_empty() { "*" } else { name };
                    Segment::Splat(param_name(name).ok_or_else(|| invalid("bad parameter name"))?)
                } else if part.is_empty() {
                    return Err(invalid("empty segment"));
                } else {
                    Segment::Literal(part.to_string())
                };
                segments.push(segment);
            }
        }

        let mut seen = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) | Segment::Splat(name) = segment {
                if seen.contains(&name) {
                    return Err(invalid("duplicate parameter name"));
                }
                seen.push(name);
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a request path, returning the bound parameters.
    ///
    /// Literals compare ASCII case-insensitively and one trailing slash on the
    /// path is ignored. Captured values are returned as they appear in the path.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let rest = path.strip_prefix('/')?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut params = Params::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    let part = parts.get(index)?;
                    if !literal.eq_ignore_ascii_case(part) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let part = parts.get(index).filter(|p| !p.is_empty())?;
                    params.insert(name.clone(), part.to_string());
                }
                Segment::Splat(name) => {
                    let remainder = parts.get(index..).filter(|r| !r.is_empty())?;
                    params.insert(name.clone(), remainder.join("/"));
                    return Some(params);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

fn param_name(name: &str) -> Option<String> {
    let valid = name == "*"
        || (!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    valid.then(|| name.to_string())
}
