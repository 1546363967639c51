use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::{RemoteError, RemoteResult};
use crate::registry::Scope;

/// Remote namespace of the command catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Global,
    Restricted,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Global, Partition::Restricted];
}

impl From<Scope> for Partition {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Global => Partition::Global,
            Scope::Restricted => Partition::Restricted,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Global => f.write_str("global"),
            Partition::Restricted => f.write_str("restricted"),
        }
    }
}

/// A command as the platform knows it
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCommand {
    /// Platform-assigned id, present on listed commands
    pub id: Option<String>,
    pub name: String,
    /// Full payload, `name` included
    pub schema: Value,
}

impl RemoteCommand {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            schema,
        }
    }

    /// Parse one element of a list response
    pub fn from_value(value: Value) -> RemoteResult<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::decode("command without a name"))?
            .to_string();
        let id = match value.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        Ok(Self {
            id,
            name,
            schema: value,
        })
    }
}
