//! Plain-text help and usage rendering.
//!
//! # Example
//!
//! ```
//! use cmdtree_core::{Command, CommandTree, Flag};
//!
//! let mut tree = CommandTree::new(Command::new("app").with_short("Demo app")).unwrap();
//! let root = tree.root();
//! let serve = tree
//!     .add_command(
//!         root,
//!         Command::new("serve")
//!             .with_short("Start the server")
//!             .with_flag(Flag::int("port", 8080).with_shorthand('p').with_usage("port to listen on"))
//!             .with_run(|_| Ok(())),
//!     )
//!     .unwrap();
//!
//! let usage = tree.usage_text(serve);
//! assert!(usage.starts_with("Usage:\n  app serve [flags]\n"));
//! assert!(usage.contains("  -p, --port int   port to listen on (default 8080)"));
//!
//! let help = tree.help_text(root);
//! assert!(help.starts_with("Demo app\n\nUsage:\n  app [command]\n"));
//! assert!(help.contains("  serve       Start the server"));
//! ```

use std::fmt::Write as _;

use crate::command::{CommandId, CommandTree};
use crate::flag::{Flag, FlagSet, FlagStore, FlagValue};

/// Names in command lists are padded to at least this width.
const MIN_NAME_PADDING: usize = 11;

/// Type placeholder shown after the flag name; empty for boolean-like
/// flags.
fn value_placeholder(value: &FlagValue) -> &'static str {
    match value {
        FlagValue::Bool(_) => "",
        FlagValue::StringList(_) => "strings",
        FlagValue::IntList(_) => "ints",
        other => other.type_name(),
    }
}

fn flag_label(flag: &Flag) -> String {
    let mut label = match flag.shorthand {
        Some(c) => format!("  -{c}, --{}", flag.name),
        None => format!("      --{}", flag.name),
    };
    let placeholder = value_placeholder(&flag.value);
    if !placeholder.is_empty() {
        label.push(' ');
        label.push_str(placeholder);
    }
    label
}

fn flag_description(flag: &Flag) -> String {
    let mut description = flag.usage.clone();
    if !flag.default_value.is_zero() {
        match &flag.default_value {
            FlagValue::String(s) => {
                let _ = write!(description, " (default {s:?})");
            }
            other => {
                let _ = write!(description, " (default {})", other.render());
            }
        }
    }
    if let Some(message) = &flag.deprecated {
        let _ = write!(description, " (DEPRECATED: {message})");
    }
    description
}

/// One line per visible flag, descriptions aligned in a column.
fn flag_usages(set: &FlagSet, store: &FlagStore) -> String {
    let rows: Vec<(String, String)> = set
        .iter(store)
        .filter(|flag| !flag.hidden)
        .map(|flag| (flag_label(flag), flag_description(flag)))
        .collect();
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, description) in rows {
        let line = format!("{label:<width$}   {description}");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn has_visible(set: &FlagSet, store: &FlagStore) -> bool {
    set.iter(store).any(|flag| !flag.hidden)
}

impl CommandTree {
    /// Children listed under "Available Commands".
    fn listed_children(&self, id: CommandId) -> Vec<CommandId> {
        self.children(id)
            .into_iter()
            .filter(|child| self.is_available(*child) || Some(*child) == self.help_command)
            .collect()
    }

    /// Usage block of a command: use line, aliases, examples, subcommands,
    /// local and inherited flags.
    pub fn usage_text(&self, id: CommandId) -> String {
        let command = self.command(id);
        let path = self.command_path(id);
        let listed = self.listed_children(id);
        let has_subcommands = self.has_available_children(id);

        let mut out = String::from("Usage:");
        if self.is_runnable(id) {
            let _ = write!(out, "\n  {}", self.full_use_line(id));
        }
        if has_subcommands {
            let _ = write!(out, "\n  {path} [command]");
        }

        if !command.aliases.is_empty() {
            let mut names = vec![command.name().to_string()];
            names.extend(command.aliases.iter().cloned());
            let _ = write!(out, "\n\nAliases:\n  {}", names.join(", "));
        }

        if !command.example.is_empty() {
            let _ = write!(out, "\n\nExamples:\n{}", command.example);
        }

        if has_subcommands {
            let padding = listed
                .iter()
                .map(|child| self.name(*child).len())
                .max()
                .unwrap_or(0)
                .max(MIN_NAME_PADDING);
            out.push_str("\n\nAvailable Commands:");
            for child in &listed {
                let line = format!("  {:<padding$} {}", self.name(*child), self.command(*child).short);
                let _ = write!(out, "\n{}", line.trim_end());
            }
        }

        let local = self.local_flags(id);
        if has_visible(local, &self.flags) {
            let _ = write!(out, "\n\nFlags:\n{}", flag_usages(local, &self.flags).trim_end());
        }
        let inherited = self.inherited_flags(id);
        if has_visible(inherited, &self.flags) {
            let _ = write!(
                out,
                "\n\nGlobal Flags:\n{}",
                flag_usages(inherited, &self.flags).trim_end()
            );
        }

        if has_subcommands {
            let _ = write!(
                out,
                "\n\nUse \"{path} [command] --help\" for more information about a command."
            );
        }
        out.push('\n');
        out
    }

    /// Full help: the long description (or the short one), then usage.
    pub fn help_text(&self, id: CommandId) -> String {
        let command = self.command(id);
        let description = if command.long.is_empty() {
            command.short.trim_end()
        } else {
            command.long.trim_end()
        };
        let mut out = String::new();
        if !description.is_empty() {
            out.push_str(description);
            out.push_str("\n\n");
        }
        if self.is_runnable(id) || self.has_children(id) {
            out.push_str(&self.usage_text(id));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::{Command, CommandTree, Flag};

    #[test]
    fn test_flag_columns_align() {
        let mut tree = CommandTree::new(
            Command::new("app")
                .with_flag(Flag::bool("all").with_shorthand('a').with_usage("show all"))
                .with_flag(Flag::string("format", "table").with_usage("output format"))
                .with_flag(Flag::bool("secret").hidden())
                .with_run(|_| Ok(())),
        )
        .unwrap();
        let root = tree.root();
        tree.install_default_flags(root).unwrap();
        let usage = tree.usage_text(root);
        assert_eq!(
            usage,
            "Usage:\n  app [flags]\n\nFlags:\n\
             \x20 -a, --all             show all\n\
             \x20     --format string   output format (default \"table\")\n\
             \x20 -h, --help            help for app\n"
        );
    }

    #[test]
    fn test_global_flags_and_aliases() {
        let mut tree = CommandTree::new(
            Command::new("app").with_persistent_flag(Flag::count("verbose").with_shorthand('v')),
        )
        .unwrap();
        let root = tree.root();
        let get = tree
            .add_command(
                root,
                Command::new("get <name>")
                    .with_alias("g")
                    .with_example("  app get foo")
                    .with_run(|_| Ok(())),
            )
            .unwrap();
        let usage = tree.usage_text(get);
        assert!(usage.starts_with(
            "Usage:\n  app get <name> [flags]\n\nAliases:\n  get, g\n\nExamples:\n  app get foo\n"
        ));
        assert!(usage.ends_with("\n\nGlobal Flags:\n  -v, --verbose count\n"));
        assert!(!usage.contains("[command]"));
    }

    #[test]
    fn test_help_prefers_long_description() {
        let tree = CommandTree::new(
            Command::new("app")
                .with_short("short")
                .with_long("long text\n")
                .with_run(|_| Ok(())),
        )
        .unwrap();
        let help = tree.help_text(tree.root());
        assert!(help.starts_with("long text\n\nUsage:\n  app\n"));
    }

    #[test]
    fn test_help_of_group_without_usage() {
        let tree = CommandTree::new(Command::new("app").with_short("only text")).unwrap();
        assert_eq!(tree.help_text(tree.root()), "only text\n\n");
    }
}
