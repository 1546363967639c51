/*!
 * Command file filter
 *
 * Decides whether a path is a command file based on its name alone, so the
 * same check works for paths that were just deleted.
 */

use std::path::Path;

use tracing::warn;

/// Editor save artifacts that never hold a command definition
const ARTIFACT_SUFFIXES: &[&str] = &[".swp", ".swx", ".tmp", ".bak", "~"];
const ARTIFACT_NAMES: &[&str] = &["4913"];

#[derive(Debug, Clone)]
pub struct CommandFileFilter {
    extension: String,
    ignore_patterns: Vec<glob::Pattern>,
}

impl CommandFileFilter {
    pub fn new(extension: &str, ignore_patterns: &[String]) -> Self {
        let ignore_patterns = ignore_patterns
            .iter()
            .filter_map(|pattern| match glob::Pattern::new(pattern) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!("Ignoring invalid ignore pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
            ignore_patterns,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether `path` names a command file
    pub fn matches(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if file_name.starts_with('.') || is_artifact(file_name) {
            return false;
        }

        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false);
        if !has_extension {
            return false;
        }

        !self.is_ignored(path)
    }

    /// Whether a directory should be skipped while walking
    pub fn skips_directory(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        hidden || self.is_ignored(path)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches(&path_str))
    }
}

fn is_artifact(file_name: &str) -> bool {
    ARTIFACT_NAMES.contains(&file_name)
        || file_name.starts_with(".#")
        || ARTIFACT_SUFFIXES
            .iter()
            .any(|suffix| file_name.ends_with(suffix))
}
