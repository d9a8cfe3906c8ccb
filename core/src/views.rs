//! Merged flag views and typed flag access.
//!
//! Every node sees four sets, computed on first use and cached until the
//! node or one of its ancestors changes:
//!
//! - **local**: the node's own flags, then its persistent flags whose names
//!   are not already taken
//! - **inherited**: persistent flags of the ancestors (nearest first) whose
//!   names are not in local
//! - **all**: local followed by inherited
//! - **local non-persistent**: the node's own flags only
//!
//! The views hold [`FlagId`]s, so a value parsed through a descendant's
//! merged view is the same value its ancestor sees.

use crate::command::{CommandId, CommandTree};
use crate::flag::{FlagError, FlagId, FlagSet, FlagValue};

/// Cached merged flag sets of one node.
#[derive(Debug, Clone)]
pub(crate) struct FlagViews {
    local: FlagSet,
    inherited: FlagSet,
    all: FlagSet,
    local_non_persistent: FlagSet,
}

impl CommandTree {
    fn views(&self, id: CommandId) -> &FlagViews {
        self.nodes[id.0].views.get_or_init(|| self.build_views(id))
    }

    fn build_views(&self, id: CommandId) -> FlagViews {
        let node = &self.nodes[id.0];
        let normalize = node.normalize.clone();

        let mut local = FlagSet::with_normalizer(normalize.clone());
        for flag in node.local_flags.ids() {
            local.add_if_absent(&self.flags, flag);
        }
        let local_non_persistent = local.clone();
        for flag in node.persistent_flags.ids() {
            local.add_if_absent(&self.flags, flag);
        }

        let mut inherited = FlagSet::with_normalizer(normalize);
        let mut current = node.parent;
        while let Some(ancestor) = current {
            for flag in self.nodes[ancestor.0].persistent_flags.ids() {
                if !local.contains(&self.flags[flag].name) {
                    inherited.add_if_absent(&self.flags, flag);
                }
            }
            current = self.nodes[ancestor.0].parent;
        }

        let mut all = local.clone();
        for flag in inherited.ids() {
            all.add_if_absent(&self.flags, flag);
        }

        FlagViews {
            local,
            inherited,
            all,
            local_non_persistent,
        }
    }

    /// The node's own flags plus its persistent flags.
    pub fn local_flags(&self, id: CommandId) -> &FlagSet {
        &self.views(id).local
    }

    /// Persistent flags of ancestors not shadowed by a local flag.
    pub fn inherited_flags(&self, id: CommandId) -> &FlagSet {
        &self.views(id).inherited
    }

    /// Every flag visible on the node: local first, then inherited.
    pub fn all_flags(&self, id: CommandId) -> &FlagSet {
        &self.views(id).all
    }

    /// The node's own non-persistent flags.
    pub fn local_non_persistent_flags(&self, id: CommandId) -> &FlagSet {
        &self.views(id).local_non_persistent
    }

    /// Current value of a flag visible on the node.
    ///
    /// # Errors
    ///
    /// Returns [`NotDefined`](FlagError::NotDefined) if no such flag is
    /// visible.
    pub fn flag_value(&self, id: CommandId, name: &str) -> Result<&FlagValue, FlagError> {
        self.visible_flag(id, name).map(|flag| &self.flags[flag].value)
    }

    /// Returns `true` if the flag was set on the command line.
    pub fn flag_changed(&self, id: CommandId, name: &str) -> bool {
        self.lookup_flag(id, name)
            .is_some_and(|flag| self.flags[flag].changed)
    }

    fn visible_flag(&self, id: CommandId, name: &str) -> Result<FlagId, FlagError> {
        self.lookup_flag(id, name)
            .ok_or_else(|| FlagError::NotDefined(name.to_string()))
    }

    fn mismatch(&self, name: &str, expected: &'static str, actual: &FlagValue) -> FlagError {
        FlagError::TypeMismatch {
            name: name.to_string(),
            expected,
            actual: actual.type_name(),
        }
    }

    /// Value of a `bool` flag.
    ///
    /// # Errors
    ///
    /// [`NotDefined`](FlagError::NotDefined) or
    /// [`TypeMismatch`](FlagError::TypeMismatch).
    pub fn get_bool(&self, id: CommandId, name: &str) -> Result<bool, FlagError> {
        match self.flag_value(id, name)? {
            FlagValue::Bool(b) => Ok(*b),
            other => Err(self.mismatch(name, "bool", other)),
        }
    }

    /// Value of a `count` flag.
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_count(&self, id: CommandId, name: &str) -> Result<u32, FlagError> {
        match self.flag_value(id, name)? {
            FlagValue::Count(n) => Ok(*n),
            other => Err(self.mismatch(name, "count", other)),
        }
    }

    /// Value of a `string` flag.
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_string(&self, id: CommandId, name: &str) -> Result<&str, FlagError> {
        match self.flag_value(id, name)? {
            FlagValue::String(s) => Ok(s),
            other => Err(self.mismatch(name, "string", other)),
        }
    }

    /// Value of an `int` flag.
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_int(&self, id: CommandId, name: &str) -> Result<i64, FlagError> {
        match self.flag_value(id, name)? {
            FlagValue::Int(i) => Ok(*i),
            other => Err(self.mismatch(name, "int", other)),
        }
    }

    /// Value of a `float` flag.
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_float(&self, id: CommandId, name: &str) -> Result<f64, FlagError> {
        match self.flag_value(id, name)? {
            FlagValue::Float(f) => Ok(*f),
            other => Err(self.mismatch(name, "float", other)),
        }
    }

    /// Value of a `stringSlice` flag.
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_string_list(&self, id: CommandId, name: &str) -> Result<&[String], FlagError> {
        match self.flag_value(id, name)? {
            FlagValue::StringList(list) => Ok(list),
            other => Err(self.mismatch(name, "stringSlice", other)),
        }
    }

    /// Value of an `intSlice` flag.
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_int_list(&self, id: CommandId, name: &str) -> Result<&[i64], FlagError> {
        match self.flag_value(id, name)? {
            FlagValue::IntList(list) => Ok(list),
            other => Err(self.mismatch(name, "intSlice", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::{Command, CommandTree, Flag};

    fn names(tree: &CommandTree, set: &crate::FlagSet) -> Vec<String> {
        set.iter(tree.flag_store()).map(|f| f.name.clone()).collect()
    }

    #[test]
    fn test_merge_order_and_shadowing() {
        let mut tree = CommandTree::new(
            Command::new("root")
                .with_persistent_flag(Flag::bool("verbose"))
                .with_persistent_flag(Flag::string("config", "")),
        )
        .unwrap();
        let root = tree.root();
        let mid = tree
            .add_command(
                root,
                Command::new("mid").with_persistent_flag(Flag::string("profile", "")),
            )
            .unwrap();
        let leaf = tree
            .add_command(
                mid,
                Command::new("leaf")
                    .with_flag(Flag::int("config", 1))
                    .with_flag(Flag::bool("dry-run")),
            )
            .unwrap();

        assert_eq!(names(&tree, tree.local_flags(leaf)), vec!["config", "dry-run"]);
        assert_eq!(names(&tree, tree.inherited_flags(leaf)), vec!["profile", "verbose"]);
        assert_eq!(
            names(&tree, tree.all_flags(leaf)),
            vec!["config", "dry-run", "profile", "verbose"]
        );
        assert_eq!(tree.get_int(leaf, "config").unwrap(), 1);
    }

    #[test]
    fn test_local_non_persistent_excludes_persistent() {
        let tree = CommandTree::new(
            Command::new("root")
                .with_flag(Flag::bool("local"))
                .with_persistent_flag(Flag::bool("shared")),
        )
        .unwrap();
        let root = tree.root();
        assert_eq!(names(&tree, tree.local_flags(root)), vec!["local", "shared"]);
        assert_eq!(names(&tree, tree.local_non_persistent_flags(root)), vec!["local"]);
    }

    #[test]
    fn test_views_refresh_after_mutation() {
        let mut tree = CommandTree::new(Command::new("root")).unwrap();
        let root = tree.root();
        let child = tree.add_command(root, Command::new("child")).unwrap();
        assert!(tree.inherited_flags(child).is_empty());

        tree.add_persistent_flag(root, Flag::bool("debug")).unwrap();
        assert!(tree.inherited_flags(child).contains("debug"));
    }

    #[test]
    fn test_normalizer_applies_to_descendants() {
        let mut tree = CommandTree::new(
            Command::new("root").with_persistent_flag(Flag::bool("dry_run")),
        )
        .unwrap();
        let root = tree.root();
        let child = tree.add_command(root, Command::new("child")).unwrap();
        tree.set_normalize_func(root, Rc::new(|name: &str| name.replace('_', "-")));

        assert!(tree.all_flags(child).contains("dry-run"));
        assert!(tree.all_flags(child).contains("dry_run"));
        let late = tree.add_command(child, Command::new("late")).unwrap();
        assert!(tree.all_flags(late).contains("dry_run"));
    }

    #[test]
    fn test_typed_access_errors() {
        let tree = CommandTree::new(Command::new("root").with_flag(Flag::bool("x"))).unwrap();
        let root = tree.root();
        assert_eq!(
            tree.get_string(root, "x").unwrap_err().to_string(),
            "trying to get string value of flag \"x\" of type bool"
        );
        assert_eq!(
            tree.get_bool(root, "y").unwrap_err().to_string(),
            "flag accessed but not defined: y"
        );
    }
}
