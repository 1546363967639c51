/*!
 * Command descriptors and the on-disk command file format
 *
 * A command file is a small TOML document:
 *
 * ```toml
 * name = "ping"
 * handler = "utility.ping"
 * scope = "global"            # or "restricted"
 * aliases = ["p"]
 *
 * [schema]
 * description = "Replies with pong"
 * ```
 *
 * Parsing always builds a fresh value; nothing here touches the registry.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Longest name the platform accepts for a command or alias
pub const MAX_NAME_LEN: usize = 32;

/// Remote namespace a command registers into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Global,
    Restricted,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Restricted => f.write_str("restricted"),
        }
    }
}

/// One validated command definition
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub name: String,
    /// Identifier the execution pipeline dispatches to
    pub handler: String,
    /// Opaque invocation contract forwarded to the remote catalog
    pub schema: Value,
    /// Ordered, de-duplicated secondary names
    pub aliases: Vec<String>,
    pub scope: Scope,
    pub source_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CommandFile {
    name: Option<String>,
    handler: Option<String>,
    scope: Option<Scope>,
    dev_guild: Option<bool>,
    #[serde(default)]
    aliases: Vec<String>,
    schema: Option<toml::Table>,
}

impl CommandDescriptor {
    /// Parse and fully validate a command file's contents
    pub fn parse(source: &str, source_path: &Path) -> SyncResult<Self> {
        let file: CommandFile = toml::from_str(source)
            .map_err(|e| SyncError::validation(source_path, format!("malformed TOML: {}", e)))?;

        let name = file
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SyncError::validation(source_path, "missing command name"))?;
        if !is_valid_name(&name) {
            return Err(SyncError::validation(
                source_path,
                format!("invalid command name '{}'", name),
            ));
        }

        let handler = file
            .handler
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SyncError::validation(source_path, "missing executable contract (handler)"))?;

        let scope = match (file.scope, file.dev_guild) {
            (Some(scope), None) => scope,
            (None, Some(true)) => Scope::Restricted,
            (None, Some(false)) | (None, None) => Scope::Global,
            (Some(scope), Some(dev_guild)) => {
                if (scope == Scope::Restricted) != dev_guild {
                    return Err(SyncError::validation(
                        source_path,
                        format!("scope '{}' contradicts dev_guild = {}", scope, dev_guild),
                    ));
                }
                scope
            }
        };

        let mut aliases: Vec<String> = Vec::with_capacity(file.aliases.len());
        for raw in file.aliases {
            let alias = raw.trim();
            if alias.is_empty() || aliases.iter().any(|a| a == alias) {
                continue;
            }
            if alias == name {
                return Err(SyncError::validation(
                    source_path,
                    format!("alias '{}' repeats the command name", alias),
                ));
            }
            if !is_valid_name(alias) {
                return Err(SyncError::validation(
                    source_path,
                    format!("invalid alias '{}'", alias),
                ));
            }
            aliases.push(alias.to_string());
        }

        let schema = match file.schema {
            Some(table) => serde_json::to_value(table).map_err(|e| {
                SyncError::validation(source_path, format!("schema is not serializable: {}", e))
            })?,
            None => Value::Object(Default::default()),
        };

        Ok(Self {
            name,
            handler,
            schema,
            aliases,
            scope,
            source_path: source_path.to_path_buf(),
        })
    }

    /// Copy with a different live alias list
    pub fn with_aliases(&self, aliases: Vec<String>) -> Self {
        Self {
            aliases,
            ..self.clone()
        }
    }

    /// Payload registered remotely under `registered_name` (the name itself or an alias)
    pub fn remote_payload(&self, registered_name: &str) -> Value {
        let mut payload = match &self.schema {
            Value::Object(map) => map.clone(),
            _ => Default::default(),
        };
        payload.insert("name".to_string(), Value::String(registered_name.to_string()));
        Value::Object(payload)
    }
}

/// Lowercase ASCII letters, digits, `-` and `_`, 1..=32 characters
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}
