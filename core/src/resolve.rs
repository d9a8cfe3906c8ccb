//! Locating the target command for an argument vector.
//!
//! [`CommandTree::find`] skips flag-like tokens at each level and matches
//! the first remaining token against the children, leaving every flag for
//! the target to parse. [`CommandTree::traverse`] parses each ancestor's
//! flags as it descends and leaves only the target's flags unparsed.

use tracing::debug;

use crate::command::{CommandId, CommandTree};
use crate::error::{CommandError, Result};
use crate::flag::{FlagError, FlagSet, FlagStore, ParsedArgs};

/// Outcome of resolving an argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Target command.
    pub command: CommandId,
    /// Arguments left for the target: flags and positionals.
    pub args: Vec<String>,
    /// Name, alias, or full name of the prefix that selected the target;
    /// `None` when the target is the root.
    pub called_as: Option<String>,
}

pub(crate) enum NextMatch {
    Found {
        command: CommandId,
        called_as: String,
    },
    Ambiguous(Vec<CommandId>),
    NotFound,
}

/// Returns `true` if `--name` would consume the following token.
fn long_takes_value(flags: &FlagSet, store: &FlagStore, name: &str) -> bool {
    flags
        .lookup(name)
        .is_none_or(|flag| !store[flag].is_boolean())
}

/// Returns `true` if `-c` would consume the following token.
fn short_takes_value(flags: &FlagSet, store: &FlagStore, body: &str) -> bool {
    body.chars()
        .next()
        .and_then(|c| flags.lookup_shorthand(c))
        .is_none_or(|flag| !store[flag].is_boolean())
}

/// Returns `true` for `--name` or `-c` forms that take their value from
/// the next token.
fn consumes_next(flags: &FlagSet, store: &FlagStore, token: &str) -> bool {
    if token.contains('=') {
        return false;
    }
    if let Some(name) = token.strip_prefix("--") {
        return long_takes_value(flags, store, name);
    }
    token.len() == 2 && token.starts_with('-') && short_takes_value(flags, store, &token[1..])
}

/// `--x` with a non-empty name, or a single-dash token.
pub(crate) fn is_flag_arg(token: &str) -> bool {
    (token.len() >= 3 && token.starts_with("--"))
        || (token.len() >= 2 && token.starts_with('-') && !token.starts_with("--"))
}

impl CommandTree {
    /// Non-flag tokens of `args`, skipping values of value-taking flags and
    /// stopping at `--`.
    pub(crate) fn strip_flags(&self, id: CommandId, args: &[String]) -> Vec<String> {
        let flags = self.all_flags(id);
        let mut commands = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let token = &args[i];
            i += 1;
            if token == "--" {
                break;
            }
            if token.starts_with('-') {
                if consumes_next(flags, &self.flags, token) {
                    if args.len() - i <= 1 {
                        break;
                    }
                    i += 1;
                }
                continue;
            }
            if !token.is_empty() {
                commands.push(token.clone());
            }
        }
        commands
    }

    /// `args` without the first non-flag occurrence of `subcommand`.
    pub(crate) fn args_minus_first(&self, id: CommandId, args: &[String], subcommand: &str) -> Vec<String> {
        let flags = self.all_flags(id);
        let mut pos = 0;
        while pos < args.len() {
            let token = &args[pos];
            if token == "--" {
                break;
            }
            if token.starts_with('-') {
                if consumes_next(flags, &self.flags, token) {
                    pos += 1;
                }
            } else if token == subcommand {
                let mut rest = args.to_vec();
                rest.remove(pos);
                return rest;
            }
            pos += 1;
        }
        args.to_vec()
    }

    /// Matches `next` against the children of `id`: exact name or alias
    /// first, then a unique name-or-alias prefix when prefix matching is on.
    pub(crate) fn find_next(&self, id: CommandId, next: &str) -> NextMatch {
        let mut prefixed = Vec::new();
        for child in self.children(id) {
            if self.settings.names_match(self.name(child), next) || self.has_alias(child, next) {
                return NextMatch::Found {
                    command: child,
                    called_as: next.to_string(),
                };
            }
            if self.settings.prefix_matching {
                if let Some(matched) = self.name_or_alias_with_prefix(child, next) {
                    prefixed.push((child, matched));
                }
            }
        }
        match prefixed.len() {
            0 => NextMatch::NotFound,
            1 => {
                let (command, called_as) = prefixed.remove(0);
                NextMatch::Found { command, called_as }
            }
            _ => NextMatch::Ambiguous(prefixed.into_iter().map(|(c, _)| c).collect()),
        }
    }

    fn name_or_alias_with_prefix(&self, id: CommandId, prefix: &str) -> Option<String> {
        let command = self.command(id);
        std::iter::once(command.name())
            .chain(command.aliases.iter().map(String::as_str))
            .find(|candidate| self.settings.has_prefix(candidate, prefix))
            .map(str::to_string)
    }

    /// The rule applied when a command declares no argument validator: a
    /// root with children rejects an unrecognised leading token.
    fn legacy_args(&self, id: CommandId, args: &[String]) -> Result<()> {
        if !self.has_children(id) || self.parent(id).is_some() {
            return Ok(());
        }
        let Some(first) = args.first() else {
            return Ok(());
        };
        if let NextMatch::Ambiguous(candidates) = self.find_next(id, first) {
            return Err(CommandError::AmbiguousCommand {
                name: first.clone(),
                path: self.command_path(id),
                candidates: candidates.iter().map(|c| self.name(*c).to_string()).collect(),
            });
        }
        Err(CommandError::UnknownCommand {
            name: first.clone(),
            path: self.command_path(id),
            suggestions: self.find_suggestions(id, first),
        })
    }

    /// Resolves `args` by stripping flags at each level.
    ///
    /// Flag tokens are kept in the returned arguments for the target to
    /// parse.
    ///
    /// # Errors
    ///
    /// For a root with children and no argument validator, an unmatched
    /// leading token yields [`UnknownCommand`](CommandError::UnknownCommand)
    /// or, when it prefixes several children,
    /// [`AmbiguousCommand`](CommandError::AmbiguousCommand).
    ///
    /// # Examples
    ///
    /// ```
    /// use cmdtree_core::{Command, CommandTree, Flag, Settings};
    ///
    /// let settings = Settings { prefix_matching: true, ..Settings::default() };
    /// let mut tree = CommandTree::with_settings(
    ///     Command::new("app").with_persistent_flag(Flag::string("config", "")),
    ///     settings,
    /// )
    /// .unwrap();
    /// let root = tree.root();
    /// let alpha = tree.add_command(root, Command::new("alpha")).unwrap();
    /// tree.add_command(root, Command::new("beta")).unwrap();
    ///
    /// let args: Vec<String> = ["--config", "x.yml", "alp", "one"]
    ///     .iter()
    ///     .map(|s| s.to_string())
    ///     .collect();
    /// let found = tree.find(&args).unwrap();
    /// assert_eq!(found.command, alpha);
    /// assert_eq!(found.args, vec!["--config", "x.yml", "one"]);
    /// assert_eq!(found.called_as.as_deref(), Some("alpha"));
    /// ```
    pub fn find(&self, args: &[String]) -> Result<Resolution> {
        let mut current = self.root;
        let mut rest = args.to_vec();
        let mut called_as = None;
        loop {
            let stripped = self.strip_flags(current, &rest);
            let Some(next) = stripped.first() else {
                break;
            };
            match self.find_next(current, next) {
                NextMatch::Found {
                    command,
                    called_as: matched,
                } => {
                    rest = self.args_minus_first(current, &rest, next);
                    current = command;
                    called_as = Some(matched);
                }
                NextMatch::Ambiguous(_) | NextMatch::NotFound => break,
            }
        }
        if self.command(current).args.is_none() {
            self.legacy_args(current, &self.strip_flags(current, &rest))?;
        }
        debug!(path = %self.command_path(current), args = ?rest, "Resolved command");
        Ok(Resolution {
            command: current,
            args: rest,
            called_as,
        })
    }

    /// Resolves `args` by parsing each level's flags on the way down.
    ///
    /// Flags seen before a subcommand token are parsed against the command
    /// that owns that token. The target's own flags are never parsed here.
    ///
    /// # Errors
    ///
    /// Returns the [`FlagError`] of the first level whose flags fail to
    /// parse.
    pub fn traverse(&mut self, args: &[String]) -> Result<Resolution> {
        let mut current = self.root;
        let mut start = 0;
        let mut called_as = None;
        'levels: loop {
            let mut flags = Vec::new();
            let mut in_flag = false;
            for (offset, token) in args[start..].iter().enumerate() {
                let view = self.all_flags(current);
                if token.starts_with("--") && !token.contains('=') {
                    in_flag = long_takes_value(view, &self.flags, &token[2..]);
                    flags.push(token.clone());
                    continue;
                }
                if token.len() == 2
                    && token.starts_with('-')
                    && short_takes_value(view, &self.flags, &token[1..])
                {
                    in_flag = true;
                    flags.push(token.clone());
                    continue;
                }
                if in_flag {
                    in_flag = false;
                    flags.push(token.clone());
                    continue;
                }
                if is_flag_arg(token) {
                    flags.push(token.clone());
                    continue;
                }
                match self.find_next(current, token) {
                    NextMatch::Found {
                        command,
                        called_as: matched,
                    } => {
                        self.parse_flags(current, &flags)?;
                        current = command;
                        called_as = Some(matched);
                        start += offset + 1;
                        continue 'levels;
                    }
                    NextMatch::Ambiguous(_) | NextMatch::NotFound => break 'levels,
                }
            }
            break;
        }
        debug!(path = %self.command_path(current), "Traversed to command");
        Ok(Resolution {
            command: current,
            args: args[start..].to_vec(),
            called_as,
        })
    }

    /// Resolves with [`traverse`](Self::traverse) when the root asks for it,
    /// otherwise with [`find`](Self::find).
    ///
    /// # Errors
    ///
    /// See the two strategies.
    pub fn resolve(&mut self, args: &[String]) -> Result<Resolution> {
        if self.command(self.root).traverse_children {
            self.traverse(args)
        } else {
            self.find(args)
        }
    }

    /// Parses `args` against every flag visible on the command.
    ///
    /// With flag parsing disabled, every token is returned as positional.
    /// Deprecated flags produce a warning on the error output.
    ///
    /// # Errors
    ///
    /// Returns the first [`FlagError`].
    pub fn parse_flags(&mut self, id: CommandId, args: &[String]) -> std::result::Result<ParsedArgs, FlagError> {
        let command = self.command(id);
        if command.disable_flag_parsing {
            return Ok(ParsedArgs {
                positional: args.to_vec(),
                ..ParsedArgs::default()
            });
        }
        let interspersed = command.interspersed;
        let set = self.all_flags(id).clone();
        let parsed = set.parse(&mut self.flags, args, interspersed)?;
        for warning in &parsed.deprecation_warnings {
            self.print_err(&format!("{warning}\n"));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Args, Command, Flag, Settings};

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn tree(prefix_matching: bool) -> (CommandTree, CommandId, CommandId, CommandId) {
        let settings = Settings {
            prefix_matching,
            ..Settings::default()
        };
        let mut tree = CommandTree::with_settings(
            Command::new("app")
                .with_persistent_flag(Flag::string("config", "").with_shorthand('c'))
                .with_persistent_flag(Flag::bool("verbose").with_shorthand('v')),
            settings,
        )
        .unwrap();
        let root = tree.root();
        let alpha = tree
            .add_command(
                root,
                Command::new("alpha")
                    .with_alias("al")
                    .with_flag(Flag::int("count", 0))
                    .with_run(|_| Ok(())),
            )
            .unwrap();
        let beta = tree
            .add_command(root, Command::new("beta").with_run(|_| Ok(())))
            .unwrap();
        (tree, root, alpha, beta)
    }

    #[test]
    fn test_strip_flags_skips_values() {
        let (tree, root, _, _) = tree(false);
        assert_eq!(
            tree.strip_flags(root, &args(&["-c", "file", "-v", "alpha", "x"])),
            vec!["alpha", "x"]
        );
        assert_eq!(
            tree.strip_flags(root, &args(&["--unknown", "value", "alpha", "--", "beta"])),
            vec!["alpha"]
        );
        assert!(tree.strip_flags(root, &args(&["--config", "alpha"])).is_empty());
    }

    #[test]
    fn test_args_minus_first_skips_flag_values() {
        let (tree, root, _, _) = tree(false);
        assert_eq!(
            tree.args_minus_first(root, &args(&["-c", "alpha", "alpha", "x"]), "alpha"),
            vec!["-c", "alpha", "x"]
        );
    }

    #[test]
    fn test_find_by_name_and_alias() {
        let (tree, _, alpha, beta) = tree(false);
        let found = tree.find(&args(&["al", "--count", "3"])).unwrap();
        assert_eq!(found.command, alpha);
        assert_eq!(found.called_as.as_deref(), Some("al"));
        assert_eq!(found.args, vec!["--count", "3"]);
        assert_eq!(tree.find(&args(&["-v", "beta"])).unwrap().command, beta);
    }

    #[test]
    fn test_find_is_stable_with_decoy_flags() {
        let (tree, _, alpha, _) = tree(false);
        for argv in [
            vec!["alpha"],
            vec!["-v", "alpha"],
            vec!["--config", "x", "alpha", "--count=2"],
            vec!["-c", "y", "-v", "alpha", "-v", "--count", "5"],
        ] {
            assert_eq!(tree.find(&args(&argv)).unwrap().command, alpha);
        }
    }

    #[test]
    fn test_prefix_matching() {
        let (tree, _, alpha, _) = tree(true);
        let found = tree.find(&args(&["alp"])).unwrap();
        assert_eq!(found.command, alpha);
        assert_eq!(found.called_as.as_deref(), Some("alpha"));
        assert_eq!(tree.find(&args(&["a"])).unwrap().command, alpha);
    }

    #[test]
    fn test_ambiguous_prefix() {
        let (mut tree, root, _, _) = tree(true);
        tree.add_command(root, Command::new("apply")).unwrap();
        let err = tree.find(&args(&["a"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ambiguous command \"a\" for \"app\"; could be alpha, apply"
        );
    }

    #[test]
    fn test_prefix_disabled_reports_unknown_with_suggestions() {
        let (tree, _, _, _) = tree(false);
        let err = tree.find(&args(&["alph"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown command \"alph\" for \"app\"\n\nDid you mean this?\n\talpha\n"
        );
    }

    #[test]
    fn test_leaf_accepts_extra_args() {
        let (tree, _, alpha, _) = tree(false);
        let found = tree.find(&args(&["alpha", "x", "y"])).unwrap();
        assert_eq!(found.command, alpha);
        assert_eq!(found.args, vec!["x", "y"]);
    }

    #[test]
    fn test_root_with_validator_skips_legacy_rule() {
        let mut tree = CommandTree::new(Command::new("app").with_args(Args::Arbitrary)).unwrap();
        let root = tree.root();
        tree.add_command(root, Command::new("sub")).unwrap();
        assert_eq!(tree.find(&args(&["other"])).unwrap().command, root);
    }

    #[test]
    fn test_traverse_parses_ancestor_flags_only() {
        let (mut tree, root, alpha, _) = tree(false);
        let found = tree
            .traverse(&args(&["-c", "x.yml", "alpha", "--count", "4", "rest"]))
            .unwrap();
        assert_eq!(found.command, alpha);
        assert_eq!(found.args, vec!["--count", "4", "rest"]);
        assert_eq!(tree.get_string(root, "config").unwrap(), "x.yml");
        assert!(!tree.flag_changed(alpha, "count"));
    }

    #[test]
    fn test_traverse_stops_at_unknown_token() {
        let (mut tree, root, _, _) = tree(false);
        let found = tree.traverse(&args(&["-v", "gamma"])).unwrap();
        assert_eq!(found.command, root);
        assert_eq!(found.args, vec!["-v", "gamma"]);
        assert!(!tree.flag_changed(root, "verbose"));
    }

    #[test]
    fn test_traverse_reports_parse_errors() {
        let (mut tree, _, _, _) = tree(false);
        let err = tree.traverse(&args(&["--nope", "x", "alpha"])).unwrap_err();
        assert_eq!(err.to_string(), "unknown flag: --nope");
    }
}
