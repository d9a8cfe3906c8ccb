//! Tree-wide behaviour switches.
//!
//! Each [`CommandTree`](crate::CommandTree) owns one [`Settings`] value;
//! there is no process-wide state. Settings can be kept next to an
//! application as YAML.
//!
//! # Example YAML
//!
//! ```yaml
//! prefix_matching: true
//! case_insensitive: false
//! command_sorting: false
//! traverse_run_hooks: true
//! suggestions_minimum_distance: 2
//! disable_suggestions: false
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Levenshtein threshold for "did you mean" suggestions.
pub const DEFAULT_SUGGESTION_DISTANCE: usize = 2;

/// Errors raised while reading or writing settings files.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Behaviour switches shared by every node of a tree.
///
/// Missing keys fall back to [`Settings::default`].
///
/// # Examples
///
/// ```
/// use cmdtree_core::Settings;
///
/// let settings: Settings = serde_yaml::from_str("prefix_matching: true").unwrap();
/// assert!(settings.prefix_matching);
/// assert_eq!(settings.suggestions_minimum_distance, 2);
/// assert!(settings.traverse_run_hooks);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Accept an unambiguous prefix of a subcommand name or alias.
    pub prefix_matching: bool,
    /// Compare subcommand names and aliases case-insensitively.
    pub case_insensitive: bool,
    /// List children sorted by name instead of declaration order.
    pub command_sorting: bool,
    /// Run persistent hooks of every ancestor instead of only the nearest.
    pub traverse_run_hooks: bool,
    /// Maximum edit distance for subcommand suggestions.
    pub suggestions_minimum_distance: usize,
    /// Never append suggestions to unknown-command errors.
    pub disable_suggestions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefix_matching: false,
            case_insensitive: false,
            command_sorting: false,
            traverse_run_hooks: true,
            suggestions_minimum_distance: DEFAULT_SUGGESTION_DISTANCE,
            disable_suggestions: false,
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](SettingsError::IoError) if the file cannot be
    /// read, or [`YamlError`](SettingsError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let settings = serde_yaml::from_reader(reader)?;
        Ok(settings)
    }

    /// Saves the settings as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](SettingsError::IoError) if the file cannot be
    /// written, or [`YamlError`](SettingsError::YamlError) if serialization
    /// fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Compares a typed token against a command name or alias, honouring
    /// [`case_insensitive`](Self::case_insensitive).
    pub(crate) fn names_match(&self, name: &str, typed: &str) -> bool {
        if self.case_insensitive {
            name.to_lowercase() == typed.to_lowercase()
        } else {
            name == typed
        }
    }

    /// Prefix test with the same case rules as [`names_match`](Self::names_match).
    pub(crate) fn has_prefix(&self, name: &str, prefix: &str) -> bool {
        if self.case_insensitive {
            name.to_lowercase().starts_with(&prefix.to_lowercase())
        } else {
            name.starts_with(prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_document_uses_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_deserialize_complete() {
        let yaml = r#"
prefix_matching: true
case_insensitive: true
command_sorting: true
traverse_run_hooks: false
suggestions_minimum_distance: 3
disable_suggestions: true
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert!(settings.prefix_matching);
        assert!(settings.case_insensitive);
        assert!(settings.command_sorting);
        assert!(!settings.traverse_run_hooks);
        assert_eq!(settings.suggestions_minimum_distance, 3);
        assert!(settings.disable_suggestions);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let mut settings = Settings::default();
        assert!(!settings.names_match("Build", "build"));
        settings.case_insensitive = true;
        assert!(settings.names_match("Build", "build"));
        assert!(settings.has_prefix("Build", "bu"));
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");

        let original = Settings {
            prefix_matching: true,
            ..Settings::default()
        };
        original.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
