//! YAML definitions of command trees.
//!
//! A definition describes the commands, flags and constraints of an
//! application. Building it yields a [`CommandTree`] whose runnable
//! commands print a JSON summary of the invocation they received.
//!
//! # Example YAML
//!
//! ```yaml
//! settings:
//!   prefix_matching: true
//! root:
//!   use: app
//!   version: 1.0.0
//!   persistent_flags:
//!     - name: config
//!       shorthand: c
//!       type: string
//!       filename_extensions: [yaml, yml]
//!   commands:
//!     - use: deploy <env>
//!       short: Deploy the application
//!       runnable: true
//!       args: { exact: 1 }
//!       valid_args: ["staging\tPre-production", "production"]
//!       flags:
//!         - name: replicas
//!           type: int
//!           default: 2
//! ```

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::Path;

use cmdtree_core::{
    Args, Command, CommandError, CommandId, CommandTree, Completion, Directive, Flag, FlagValue,
    GroupKind, Invocation, Settings,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or building a definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A flag default does not match the flag type.
    #[error("invalid default for flag '{flag}': {source}")]
    InvalidDefault {
        /// Flag name.
        flag: String,
        /// Conversion failure.
        source: serde_yaml::Error,
    },

    /// A flag declared without a name.
    #[error("command '{0}' declares a flag without a name")]
    EmptyFlagName(String),

    /// The tree rejected a command, flag or marker.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// A whole application: settings plus the root command.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeDefinition {
    /// Tree-wide behaviour switches.
    #[serde(default)]
    pub settings: Settings,
    /// The root command.
    pub root: CommandDefinition,
}

/// One command and its subtree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandDefinition {
    /// Use line; its first word is the command name.
    #[serde(rename = "use")]
    pub use_line: String,
    pub aliases: Vec<String>,
    pub suggest_for: Vec<String>,
    pub short: String,
    pub long: String,
    pub example: String,
    pub version: Option<String>,
    pub hidden: bool,
    /// Deprecation message; the command keeps working but warns.
    pub deprecated: Option<String>,
    pub args: Option<ArgsDefinition>,
    /// Candidates for positional completion, optionally `value\tdescription`.
    pub valid_args: Vec<String>,
    pub arg_aliases: Vec<String>,
    pub flags: Vec<FlagDefinition>,
    pub persistent_flags: Vec<FlagDefinition>,
    pub groups: Vec<GroupDefinition>,
    pub commands: Vec<CommandDefinition>,
    /// Attach a run callback printing the invocation summary.
    pub runnable: bool,
    /// Make the run callback fail with this message after printing.
    pub fail: Option<String>,
    pub disable_flag_parsing: bool,
    pub traverse_children: bool,
    pub non_interspersed: bool,
    pub silence_usage: bool,
    pub silence_errors: bool,
}

/// Positional argument rule. Several keys combine into one rule that
/// requires all of them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArgsDefinition {
    pub none: bool,
    pub only_valid: bool,
    pub minimum: Option<usize>,
    pub maximum: Option<usize>,
    pub exact: Option<usize>,
    pub range: Option<(usize, usize)>,
}

impl ArgsDefinition {
    fn to_args(&self) -> Args {
        let mut rules = Vec::new();
        if self.none {
            rules.push(Args::None);
        }
        if self.only_valid {
            rules.push(Args::OnlyValid);
        }
        if let Some(n) = self.minimum {
            rules.push(Args::Minimum(n));
        }
        if let Some(n) = self.maximum {
            rules.push(Args::Maximum(n));
        }
        if let Some(n) = self.exact {
            rules.push(Args::Exact(n));
        }
        if let Some((min, max)) = self.range {
            rules.push(Args::Range(min, max));
        }
        match rules.len() {
            0 => Args::Arbitrary,
            1 => rules.remove(0),
            _ => Args::MatchAll(rules),
        }
    }
}

/// Value type of a flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Bool,
    Count,
    #[default]
    String,
    Int,
    Float,
    StringList,
    IntList,
}

/// One flag declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlagDefinition {
    pub name: String,
    pub shorthand: Option<char>,
    #[serde(rename = "type")]
    pub kind: FlagKind,
    /// Default value; must match `type`.
    pub default: Option<serde_yaml::Value>,
    pub usage: String,
    pub hidden: bool,
    pub deprecated: Option<String>,
    pub required: bool,
    /// Static value completions, optionally `value\tdescription`.
    pub values: Vec<String>,
    /// Complete values as files with these extensions.
    pub filename_extensions: Option<Vec<String>>,
    /// Complete values as directories.
    pub dirname: bool,
}

/// A flag group constraint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDefinition {
    pub kind: GroupKind,
    pub flags: Vec<String>,
}

fn typed_default<T: serde::de::DeserializeOwned>(
    name: &str,
    value: &serde_yaml::Value,
) -> Result<T, DefinitionError> {
    serde_yaml::from_value(value.clone()).map_err(|source| DefinitionError::InvalidDefault {
        flag: name.to_string(),
        source,
    })
}

impl FlagDefinition {
    fn value(&self) -> Result<FlagValue, DefinitionError> {
        let name = self.name.as_str();
        let Some(default) = &self.default else {
            return Ok(match self.kind {
                FlagKind::Bool => FlagValue::Bool(false),
                FlagKind::Count => FlagValue::Count(0),
                FlagKind::String => FlagValue::String(String::new()),
                FlagKind::Int => FlagValue::Int(0),
                FlagKind::Float => FlagValue::Float(0.0),
                FlagKind::StringList => FlagValue::StringList(Vec::new()),
                FlagKind::IntList => FlagValue::IntList(Vec::new()),
            });
        };
        Ok(match self.kind {
            FlagKind::Bool => FlagValue::Bool(typed_default(name, default)?),
            FlagKind::Count => FlagValue::Count(typed_default(name, default)?),
            FlagKind::String => FlagValue::String(typed_default(name, default)?),
            FlagKind::Int => FlagValue::Int(typed_default(name, default)?),
            FlagKind::Float => FlagValue::Float(typed_default(name, default)?),
            FlagKind::StringList => FlagValue::StringList(typed_default(name, default)?),
            FlagKind::IntList => FlagValue::IntList(typed_default(name, default)?),
        })
    }

    fn to_flag(&self) -> Result<Flag, DefinitionError> {
        let mut flag = Flag::new(&self.name, self.value()?).with_usage(&self.usage);
        if let Some(shorthand) = self.shorthand {
            flag = flag.with_shorthand(shorthand);
        }
        if self.hidden {
            flag = flag.hidden();
        }
        if let Some(message) = &self.deprecated {
            flag = flag.deprecated(message);
        }
        Ok(flag)
    }

    /// Applies required markers, completion filters and static value
    /// completions once the flag is part of `id`.
    fn apply_markers(&self, tree: &mut CommandTree, id: CommandId) -> Result<(), DefinitionError> {
        if self.required {
            tree.mark_flag_required(id, &self.name)?;
        }
        if let Some(extensions) = &self.filename_extensions {
            let extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();
            tree.mark_flag_filename(id, &self.name, &extensions)?;
        }
        if self.dirname {
            tree.mark_flag_dirname(id, &self.name)?;
        }
        if !self.values.is_empty() {
            let values = self.values.clone();
            tree.register_flag_completion(id, &self.name, move |req| {
                let completions = values
                    .iter()
                    .filter(|value| value.starts_with(req.to_complete()))
                    .map(|value| Completion::parse(value))
                    .collect();
                (completions, Directive::NO_FILE_COMP)
            })?;
        }
        Ok(())
    }
}

/// What a runnable command prints.
#[derive(Debug, Serialize)]
struct InvocationSummary<'a> {
    command: String,
    called_as: &'a str,
    args: &'a [String],
    flags: BTreeMap<&'a str, &'a FlagValue>,
}

fn print_summary(inv: &Invocation<'_>) -> Result<(), serde_json::Error> {
    let tree = inv.tree();
    let flags = tree
        .all_flags(inv.command())
        .changed(tree.flag_store())
        .map(|flag| (flag.name.as_str(), &flag.value))
        .collect();
    let summary = InvocationSummary {
        command: inv.command_path(),
        called_as: inv.called_as(),
        args: inv.args(),
        flags,
    };
    let json = serde_json::to_string(&summary)?;
    inv.print(&format!("{json}\n"));
    Ok(())
}

impl CommandDefinition {
    fn to_command(&self) -> Result<Command, DefinitionError> {
        let mut command = Command::new(&self.use_line)
            .with_short(&self.short)
            .with_long(&self.long)
            .with_example(&self.example);
        for alias in &self.aliases {
            command = command.with_alias(alias);
        }
        for typo in &self.suggest_for {
            command = command.with_suggest_for(typo);
        }
        if let Some(version) = &self.version {
            command = command.with_version(version);
        }
        if self.hidden {
            command = command.hidden();
        }
        if let Some(message) = &self.deprecated {
            command = command.deprecated(message);
        }
        if let Some(args) = &self.args {
            command = command.with_args(args.to_args());
        }
        if !self.valid_args.is_empty() {
            let valid: Vec<&str> = self.valid_args.iter().map(String::as_str).collect();
            command = command.with_valid_args(&valid);
        }
        if !self.arg_aliases.is_empty() {
            let aliases: Vec<&str> = self.arg_aliases.iter().map(String::as_str).collect();
            command = command.with_arg_aliases(&aliases);
        }
        let unnamed = self.flags.iter().chain(&self.persistent_flags).any(|flag| flag.name.is_empty());
        if unnamed {
            return Err(DefinitionError::EmptyFlagName(self.use_line.clone()));
        }
        for flag in &self.flags {
            command = command.with_flag(flag.to_flag()?);
        }
        for flag in &self.persistent_flags {
            command = command.with_persistent_flag(flag.to_flag()?);
        }
        if self.disable_flag_parsing {
            command = command.disable_flag_parsing();
        }
        if self.traverse_children {
            command = command.traverse_children();
        }
        if self.non_interspersed {
            command = command.non_interspersed();
        }
        if self.silence_usage {
            command = command.silence_usage();
        }
        if self.silence_errors {
            command = command.silence_errors();
        }
        if self.runnable {
            let failure = self.fail.clone();
            command = command.with_run(move |inv| {
                print_summary(inv)?;
                match &failure {
                    Some(message) => Err(message.clone().into()),
                    None => Ok(()),
                }
            });
        }
        Ok(command)
    }

    fn apply_markers(&self, tree: &mut CommandTree, id: CommandId) -> Result<(), DefinitionError> {
        for flag in self.flags.iter().chain(&self.persistent_flags) {
            flag.apply_markers(tree, id)?;
        }
        for group in &self.groups {
            let names: Vec<&str> = group.flags.iter().map(String::as_str).collect();
            match group.kind {
                GroupKind::RequiredTogether => tree.mark_flags_required_together(id, &names)?,
                GroupKind::OneRequired => tree.mark_flags_one_required(id, &names)?,
                GroupKind::MutuallyExclusive => tree.mark_flags_mutually_exclusive(id, &names)?,
            }
        }
        Ok(())
    }

    fn attach(&self, tree: &mut CommandTree, parent: CommandId) -> Result<usize, DefinitionError> {
        let id = tree.add_command(parent, self.to_command()?)?;
        self.apply_markers(tree, id)?;
        let mut count = 1;
        for child in &self.commands {
            count += child.attach(tree, id)?;
        }
        Ok(count)
    }
}

impl TreeDefinition {
    /// Loads a definition from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DefinitionError::IoError) if the file cannot be
    /// read, or [`YamlError`](DefinitionError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let definition = serde_yaml::from_reader(reader)?;
        Ok(definition)
    }

    /// Builds the command tree.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDefault`](DefinitionError::InvalidDefault) for a
    /// default of the wrong type, or the tree's error for conflicting
    /// flags, empty names and markers on unknown flags.
    pub fn build(&self) -> Result<CommandTree, DefinitionError> {
        let mut tree = CommandTree::with_settings(self.root.to_command()?, self.settings.clone())?;
        let root = tree.root();
        self.root.apply_markers(&mut tree, root)?;
        let mut count = 1;
        for child in &self.root.commands {
            count += child.attach(&mut tree, root)?;
        }
        debug!(root = %tree.name(root), commands = count, "Built command tree");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> TreeDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_minimal_definition() {
        let definition = parse("root:\n  use: app\n");
        assert_eq!(definition.root.use_line, "app");
        assert!(definition.settings.traverse_run_hooks);
        let tree = definition.build().unwrap();
        assert_eq!(tree.name(tree.root()), "app");
        assert!(!tree.is_runnable(tree.root()));
    }

    #[test]
    fn test_args_keys_combine() {
        let args: ArgsDefinition = serde_yaml::from_str("{ only_valid: true, exact: 1 }").unwrap();
        match args.to_args() {
            Args::MatchAll(rules) => {
                assert_eq!(rules.len(), 2);
                assert!(matches!(rules[0], Args::OnlyValid));
                assert!(matches!(rules[1], Args::Exact(1)));
            }
            other => panic!("unexpected rule {other:?}"),
        }
        let range: ArgsDefinition = serde_yaml::from_str("range: [1, 3]").unwrap();
        assert!(matches!(range.to_args(), Args::Range(1, 3)));
        assert!(matches!(ArgsDefinition::default().to_args(), Args::Arbitrary));
    }

    #[test]
    fn test_flag_types_and_defaults() {
        let definition = parse(
            r#"
root:
  use: app
  flags:
    - name: replicas
      type: int
      default: 3
    - name: tags
      type: string_list
      default: [a, b]
    - name: verbose
      shorthand: v
      type: count
    - name: region
      default: eu
"#,
        );
        let tree = definition.build().unwrap();
        let root = tree.root();
        assert_eq!(tree.get_int(root, "replicas").unwrap(), 3);
        assert_eq!(tree.get_string_list(root, "tags").unwrap(), ["a", "b"]);
        assert_eq!(tree.get_count(root, "verbose").unwrap(), 0);
        assert_eq!(tree.get_string(root, "region").unwrap(), "eu");
        let verbose = tree.flag(tree.lookup_flag(root, "verbose").unwrap());
        assert_eq!(verbose.shorthand, Some('v'));
    }

    #[test]
    fn test_mistyped_default_is_rejected() {
        let definition = parse(
            r#"
root:
  use: app
  flags:
    - name: replicas
      type: int
      default: many
"#,
        );
        let err = definition.build().unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidDefault { ref flag, .. } if flag == "replicas"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: Result<TreeDefinition, _> = serde_yaml::from_str("root:\n  use: app\n  colour: red\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_markers_on_built_tree() {
        let definition = parse(
            r#"
root:
  use: app
  persistent_flags:
    - name: config
      required: true
      filename_extensions: [yaml]
  commands:
    - use: deploy
      runnable: true
      groups:
        - kind: mutually_exclusive
          flags: [json, yaml]
      flags:
        - name: json
          type: bool
        - name: yaml
          type: bool
"#,
        );
        let tree = definition.build().unwrap();
        let root = tree.root();
        let config = tree.flag(tree.lookup_flag(root, "config").unwrap());
        assert!(config.has_annotation(cmdtree_core::ANNOTATION_REQUIRED));
        assert_eq!(
            config.annotations.get(cmdtree_core::ANNOTATION_FILENAME_EXT),
            Some(&vec!["yaml".to_string()])
        );
        let deploy = tree.children(root)[0];
        assert!(tree.is_runnable(deploy));
        assert_eq!(tree.command_path(deploy), "app deploy");
    }

    #[test]
    fn test_unnamed_flag_is_rejected() {
        let definition = parse("root:\n  use: app\n  flags:\n    - type: bool\n");
        assert!(matches!(definition.build(), Err(DefinitionError::EmptyFlagName(ref u)) if u == "app"));
    }

    #[test]
    fn test_group_on_unknown_flag_fails() {
        let definition = parse(
            r#"
root:
  use: app
  flags:
    - name: json
      required: true
  commands:
    - use: deploy
      flags:
        - name: yaml
          required: true
          values: [a]
        - name: other
          filename_extensions: []
      groups: []
"#,
        );
        assert!(definition.build().is_ok());

        let broken = parse(
            r#"
root:
  use: app
  flags:
    - name: json
  commands:
    - use: deploy
      flags:
        - name: yaml
      groups:
        - kind: one_required
          flags: [yaml, missing]
"#,
        );
        assert!(matches!(broken.build(), Err(DefinitionError::Command(_))));
    }
}
