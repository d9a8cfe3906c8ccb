//! "Did you mean" suggestions for unknown subcommands.

use strsim::levenshtein;

use crate::command::{CommandId, CommandTree};

impl CommandTree {
    /// Names of available children that look like `typed`.
    ///
    /// A child qualifies if its lowercased name is within
    /// [`Settings::suggestions_minimum_distance`](crate::Settings::suggestions_minimum_distance)
    /// edits of the lowercased token, if its name starts with the token
    /// (ignoring case), or if one of its aliases or "suggest for" entries
    /// equals the token (ignoring case). Each child appears once, in
    /// listing order.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmdtree_core::{Command, CommandTree};
    ///
    /// let mut tree = CommandTree::new(Command::new("app")).unwrap();
    /// let root = tree.root();
    /// tree.add_command(root, Command::new("status").with_run(|_| Ok(()))).unwrap();
    /// tree.add_command(root, Command::new("stash").with_run(|_| Ok(()))).unwrap();
    ///
    /// assert_eq!(tree.suggestions_for(root, "stats"), vec!["status", "stash"]);
    /// assert_eq!(tree.suggestions_for(root, "STA"), vec!["status", "stash"]);
    /// assert!(tree.suggestions_for(root, "commit").is_empty());
    /// ```
    pub fn suggestions_for(&self, id: CommandId, typed: &str) -> Vec<String> {
        let max_distance = match self.settings.suggestions_minimum_distance {
            0 => crate::config::DEFAULT_SUGGESTION_DISTANCE,
            n => n,
        };
        let typed_lower = typed.to_lowercase();
        let mut suggestions = Vec::new();
        for child in self.children(id) {
            if !self.is_available(child) {
                continue;
            }
            let command = self.command(child);
            let name = command.name().to_lowercase();
            let by_distance = levenshtein(&typed_lower, &name) <= max_distance;
            let by_prefix = name.starts_with(&typed_lower);
            let by_alias = command
                .aliases
                .iter()
                .chain(command.suggest_for.iter())
                .any(|hint| hint.to_lowercase() == typed_lower);
            if by_distance || by_prefix || by_alias {
                suggestions.push(command.name().to_string());
            }
        }
        suggestions
    }

    /// Suggestions for an unknown-command error, empty when disabled.
    pub(crate) fn find_suggestions(&self, id: CommandId, typed: &str) -> Vec<String> {
        if self.settings.disable_suggestions {
            return Vec::new();
        }
        self.suggestions_for(id, typed)
    }
}
