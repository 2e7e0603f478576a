//! Statement parsing for the bundled key-value backend.
//!
//! The vocabulary is small: a query engine is an external
//! collaborator, this only gives the sled backend something to execute.
//!
//! ```text
//! -- any comment            no-op, returns no rows
//! GET <tree> ?              row for key, if present
//! PUT <tree> ? ?            store key -> JSON value
//! DELETE <tree> ?           remove key, returns the removed row
//! SCAN <tree> [?]           all rows, optionally under a key prefix
//! ```

use crate::error::StorageError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Comment(String),
    Get { tree: String, key: String },
    Put { tree: String, key: String, value: Value },
    Delete { tree: String, key: String },
    Scan { tree: String, prefix: Option<String> },
}

impl Statement {
    /// Parse a statement and bind positional `?` parameters.
    pub fn parse(sql: &str, params: &[Value]) -> Result<Self, StorageError> {
        let sql = sql.trim();
        if let Some(comment) = sql.strip_prefix("--") {
            return Ok(Statement::Comment(comment.trim().to_string()));
        }

        let tokens: Vec<&str> = sql.split_whitespace().collect();
        let (verb, rest) = tokens
            .split_first()
            .ok_or_else(|| StorageError::InvalidStatement("empty statement".to_string()))?;
        let (tree, placeholders) = rest.split_first().ok_or_else(|| {
            StorageError::InvalidStatement(format!("{} requires a tree name", verb))
        })?;
        let tree = parse_tree_name(tree)?;

        if let Some(bad) = placeholders.iter().find(|t| **t != "?") {
            return Err(StorageError::InvalidStatement(format!(
                "unexpected token '{}'",
                bad
            )));
        }
        if placeholders.len() != params.len() {
            return Err(StorageError::InvalidStatement(format!(
                "{} placeholder(s) but {} parameter(s) bound",
                placeholders.len(),
                params.len()
            )));
        }

        match (verb.to_ascii_uppercase().as_str(), params) {
            ("GET", [key]) => Ok(Statement::Get {
                tree,
                key: key_param(key)?,
            }),
            ("PUT", [key, value]) => Ok(Statement::Put {
                tree,
                key: key_param(key)?,
                value: value.clone(),
            }),
            ("DELETE", [key]) => Ok(Statement::Delete {
                tree,
                key: key_param(key)?,
            }),
            ("SCAN", []) => Ok(Statement::Scan { tree, prefix: None }),
            ("SCAN", [prefix]) => Ok(Statement::Scan {
                tree,
                prefix: Some(key_param(prefix)?),
            }),
            (verb @ ("GET" | "PUT" | "DELETE" | "SCAN"), _) => Err(StorageError::InvalidStatement(
                format!("wrong number of parameters for {}", verb),
            )),
            (other, _) => Err(StorageError::InvalidStatement(format!(
                "unknown statement '{}'",
                other
            ))),
        }
    }
}

fn parse_tree_name(token: &str) -> Result<String, StorageError> {
    let valid = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    // sled keeps its own default tree under a `__sled` name
    if !valid || token.starts_with("__") {
        return Err(StorageError::InvalidStatement(format!(
            "invalid tree name '{}'",
            token
        )));
    }
    Ok(token.to_string())
}

fn key_param(value: &Value) -> Result<String, StorageError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(StorageError::InvalidStatement(format!(
            "keys must be strings or numbers, got {}",
            other
        ))),
    }
}
