//! Command definitions and the tree arena that owns them.
//!
//! A [`Command`] is a plain definition built with `with_*` methods. Adding
//! it to a [`CommandTree`] moves it into the arena, moves its flags into
//! the tree's [`FlagStore`], and returns a [`CommandId`]. Parent links are
//! ids, so a node never owns its parent and the tree needs no reference
//! counting.
//!
//! # Example
//!
//! ```
//! use cmdtree_core::{Command, CommandTree, Flag};
//!
//! let mut tree = CommandTree::new(
//!     Command::new("app").with_persistent_flag(Flag::bool("verbose").with_shorthand('v')),
//! )
//! .unwrap();
//! let root = tree.root();
//! let remote = tree.add_command(root, Command::new("remote")).unwrap();
//! let add = tree
//!     .add_command(remote, Command::new("add <name> <url>").with_alias("new"))
//!     .unwrap();
//!
//! assert_eq!(tree.command_path(add), "app remote add");
//! assert_eq!(tree.parent(add), Some(remote));
//! assert!(tree.inherited_flags(add).contains("verbose"));
//! ```

use std::cell::{OnceCell, RefCell, RefMut};
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use tracing::debug;

use crate::args::Args;
use crate::completion::{CompletionFn, CompletionRequest, FlagCompletionRegistry};
use crate::config::Settings;
use crate::directive::Directive;
use crate::error::{BoxError, CommandError, Result};
use crate::flag::{Flag, FlagId, FlagSet, FlagStore, NormalizeFn};
use crate::groups::{FlagGroup, GroupKind};
use crate::lifecycle::{Hooks, Invocation, Stage};
use crate::views::FlagViews;

/// Annotation marking a flag as required.
pub const ANNOTATION_REQUIRED: &str = "cmdtree_annotation_required_flag";
/// Annotation listing file extensions offered when completing a flag value.
pub const ANNOTATION_FILENAME_EXT: &str = "cmdtree_annotation_filename_extensions";
/// Annotation restricting flag-value completion to directories.
pub const ANNOTATION_SUBDIRS_IN_DIR: &str = "cmdtree_annotation_subdirs_in_dir";
/// Annotation marking a flag installed by the framework (help, version).
pub const ANNOTATION_SET_BY_FRAMEWORK: &str = "cmdtree_annotation_flag_set_by_framework";

/// Rewrites an error before it is printed and returned.
pub type ErrorTransformFn = Rc<dyn Fn(CommandError) -> CommandError>;

/// Handle to a node of a [`CommandTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub(crate) usize);

/// Definition of one command.
///
/// The first whitespace-separated token of [`use_line`](Command::use_line)
/// is the command's name.
///
/// # Examples
///
/// ```
/// use cmdtree_core::{Args, Command, Flag};
///
/// let build = Command::new("build [target]")
///     .with_alias("b")
///     .with_short("Compile the project")
///     .with_args(Args::Maximum(1))
///     .with_flag(Flag::bool("release").with_usage("optimised build"))
///     .with_run(|_inv| Ok(()));
///
/// assert_eq!(build.name(), "build");
/// assert!(build.is_runnable());
/// ```
pub struct Command {
    /// One-line usage; the first token is the name.
    pub use_line: String,
    /// Alternative names.
    pub aliases: Vec<String>,
    /// Typos for which this command is always suggested.
    pub suggest_for: Vec<String>,
    /// Short description shown in command lists and completions.
    pub short: String,
    /// Long description shown in help.
    pub long: String,
    /// Usage examples shown in help.
    pub example: String,
    /// Version string; enables the `--version` flag.
    pub version: Option<String>,
    /// Hide from command lists, suggestions, and completion.
    pub hidden: bool,
    /// Deprecation message printed when the command runs.
    pub deprecated: Option<String>,
    /// Positional-argument validator; `None` means the legacy rule.
    pub args: Option<Args>,
    /// Static positional-argument completions (`value` or `value\tdescription`).
    pub valid_args: Vec<String>,
    /// Accepted by [`Args::OnlyValid`] and offered last, but not listed.
    pub arg_aliases: Vec<String>,
    /// Dynamic positional-argument completion.
    pub valid_args_function: Option<CompletionFn>,
    /// Hand every raw argument to the run stage without parsing flags.
    pub disable_flag_parsing: bool,
    /// On the root: resolve with Traverse instead of Find.
    pub traverse_children: bool,
    /// Allow flags after the first positional argument.
    pub interspersed: bool,
    /// Do not print errors returned by this command.
    pub silence_errors: bool,
    /// Do not print usage when this command fails.
    pub silence_usage: bool,
    /// Flag-group constraints checked before the run stage.
    pub flag_groups: Vec<FlagGroup>,
    /// Rewrites resolution and validation errors of this subtree.
    pub error_transform: Option<ErrorTransformFn>,
    pub(crate) hooks: Hooks,
    flags: Vec<Flag>,
    persistent_flags: Vec<Flag>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("use_line", &self.use_line)
            .field("aliases", &self.aliases)
            .field("hidden", &self.hidden)
            .field("args", &self.args)
            .field("valid_args", &self.valid_args)
            .field("disable_flag_parsing", &self.disable_flag_parsing)
            .field("traverse_children", &self.traverse_children)
            .field("flag_groups", &self.flag_groups)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Creates a command from its use line.
    pub fn new(use_line: &str) -> Self {
        Self {
            use_line: use_line.to_string(),
            aliases: Vec::new(),
            suggest_for: Vec::new(),
            short: String::new(),
            long: String::new(),
            example: String::new(),
            version: None,
            hidden: false,
            deprecated: None,
            args: None,
            valid_args: Vec::new(),
            arg_aliases: Vec::new(),
            valid_args_function: None,
            disable_flag_parsing: false,
            traverse_children: false,
            interspersed: true,
            silence_errors: false,
            silence_usage: false,
            flag_groups: Vec::new(),
            error_transform: None,
            hooks: Hooks::default(),
            flags: Vec::new(),
            persistent_flags: Vec::new(),
        }
    }

    /// The first token of the use line.
    pub fn name(&self) -> &str {
        self.use_line.split_whitespace().next().unwrap_or("")
    }

    /// Returns `true` if a run callback is declared or registered.
    pub fn is_runnable(&self) -> bool {
        self.hooks.has(Stage::Run)
    }

    /// Adds an alias.
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    /// Adds a "suggest for" typo.
    pub fn with_suggest_for(mut self, typo: &str) -> Self {
        self.suggest_for.push(typo.to_string());
        self
    }

    /// Sets the short description.
    pub fn with_short(mut self, short: &str) -> Self {
        self.short = short.to_string();
        self
    }

    /// Sets the long description.
    pub fn with_long(mut self, long: &str) -> Self {
        self.long = long.to_string();
        self
    }

    /// Sets the examples block.
    pub fn with_example(mut self, example: &str) -> Self {
        self.example = example.to_string();
        self
    }

    /// Sets the version string.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Hides the command.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Marks the command deprecated.
    pub fn deprecated(mut self, message: &str) -> Self {
        self.deprecated = Some(message.to_string());
        self
    }

    /// Sets the positional-argument validator.
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = Some(args);
        self
    }

    /// Sets the static positional-argument completions.
    pub fn with_valid_args(mut self, valid: &[&str]) -> Self {
        self.valid_args = valid.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Sets the argument aliases.
    pub fn with_arg_aliases(mut self, aliases: &[&str]) -> Self {
        self.arg_aliases = aliases.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Sets the dynamic positional-argument completion.
    pub fn with_valid_args_function<F>(mut self, f: F) -> Self
    where
        F: Fn(&CompletionRequest<'_>) -> (Vec<crate::Completion>, Directive) + Send + Sync + 'static,
    {
        self.valid_args_function = Some(std::sync::Arc::new(f));
        self
    }

    /// Disables flag parsing for this command.
    pub fn disable_flag_parsing(mut self) -> Self {
        self.disable_flag_parsing = true;
        self
    }

    /// Resolves with Traverse (meaningful on the root).
    pub fn traverse_children(mut self) -> Self {
        self.traverse_children = true;
        self
    }

    /// Stops flag parsing at the first positional argument.
    pub fn non_interspersed(mut self) -> Self {
        self.interspersed = false;
        self
    }

    /// Silences error printing.
    pub fn silence_errors(mut self) -> Self {
        self.silence_errors = true;
        self
    }

    /// Silences usage printing on error.
    pub fn silence_usage(mut self) -> Self {
        self.silence_usage = true;
        self
    }

    /// Declares a local flag.
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    /// Declares a persistent flag, visible to every descendant.
    pub fn with_persistent_flag(mut self, flag: Flag) -> Self {
        self.persistent_flags.push(flag);
        self
    }

    /// Declares a flag-group constraint.
    pub fn with_flag_group(mut self, kind: GroupKind, flags: &[&str]) -> Self {
        self.flag_groups.push(FlagGroup::new(kind, flags));
        self
    }

    /// Sets the error transform for this subtree.
    pub fn with_error_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(CommandError) -> CommandError + 'static,
    {
        self.error_transform = Some(Rc::new(f));
        self
    }

    /// Declares the single callback of a lifecycle stage, replacing any
    /// earlier declaration.
    pub fn with_hook<F>(mut self, stage: Stage, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.hooks.declare(stage, Box::new(f));
        self
    }

    /// Declares the run callback.
    pub fn with_run<F>(self, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.with_hook(Stage::Run, f)
    }

    /// Declares the pre-run callback.
    pub fn with_pre_run<F>(self, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.with_hook(Stage::PreRun, f)
    }

    /// Declares the post-run callback.
    pub fn with_post_run<F>(self, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.with_hook(Stage::PostRun, f)
    }

    /// Declares the persistent pre-run callback.
    pub fn with_persistent_pre_run<F>(self, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.with_hook(Stage::PersistentPreRun, f)
    }

    /// Declares the persistent post-run callback.
    pub fn with_persistent_post_run<F>(self, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.with_hook(Stage::PersistentPostRun, f)
    }
}

/// One node of a [`CommandTree`].
pub struct CommandNode {
    pub(crate) command: Command,
    pub(crate) parent: Option<CommandId>,
    pub(crate) children: Vec<CommandId>,
    pub(crate) local_flags: FlagSet,
    pub(crate) persistent_flags: FlagSet,
    pub(crate) normalize: Option<NormalizeFn>,
    pub(crate) views: OnceCell<FlagViews>,
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("command", &self.command)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("local_flags", &self.local_flags)
            .field("persistent_flags", &self.persistent_flags)
            .finish_non_exhaustive()
    }
}

impl CommandNode {
    /// The command definition.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Shorthand for `command().name()`.
    pub fn name(&self) -> &str {
        self.command.name()
    }

    /// Flags declared directly on the node (not persistent).
    pub fn declared_flags(&self) -> &FlagSet {
        &self.local_flags
    }

    /// Persistent flags declared on the node.
    pub fn persistent_flags(&self) -> &FlagSet {
        &self.persistent_flags
    }
}

/// Arena of command nodes plus the flags, settings, and writers they share.
pub struct CommandTree {
    pub(crate) nodes: Vec<CommandNode>,
    pub(crate) flags: FlagStore,
    pub(crate) root: CommandId,
    pub(crate) settings: Settings,
    pub(crate) completions: FlagCompletionRegistry,
    pub(crate) help_command: Option<CommandId>,
    pub(crate) complete_command: Option<CommandId>,
    output: RefCell<Box<dyn Write>>,
    error_output: RefCell<Box<dyn Write>>,
}

impl fmt::Debug for CommandTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTree")
            .field("nodes", &self.nodes)
            .field("root", &self.root)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CommandTree {
    /// Creates a tree with default [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`EmptyName`](CommandError::EmptyName) or a flag declaration
    /// error.
    pub fn new(root: Command) -> Result<Self> {
        Self::with_settings(root, Settings::default())
    }

    /// Creates a tree with explicit settings.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_settings(root: Command, settings: Settings) -> Result<Self> {
        let mut tree = Self {
            nodes: Vec::new(),
            flags: FlagStore::default(),
            root: CommandId(0),
            settings,
            completions: FlagCompletionRegistry::default(),
            help_command: None,
            complete_command: None,
            output: RefCell::new(Box::new(std::io::stdout())),
            error_output: RefCell::new(Box::new(std::io::stderr())),
        };
        tree.root = tree.insert_node(root, None)?;
        Ok(tree)
    }

    /// Tree-wide settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable tree-wide settings.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Registry of flag-value completion callbacks.
    pub fn flag_completions(&self) -> &FlagCompletionRegistry {
        &self.completions
    }

    /// Replaces the standard output writer.
    pub fn set_output(&mut self, writer: impl Write + 'static) {
        self.output = RefCell::new(Box::new(writer));
    }

    /// Replaces the standard error writer.
    pub fn set_error_output(&mut self, writer: impl Write + 'static) {
        self.error_output = RefCell::new(Box::new(writer));
    }

    /// Borrows the output writer.
    pub fn output(&self) -> RefMut<'_, dyn Write> {
        RefMut::map(self.output.borrow_mut(), |w| w.as_mut())
    }

    /// Borrows the error writer.
    pub fn error_output(&self) -> RefMut<'_, dyn Write> {
        RefMut::map(self.error_output.borrow_mut(), |w| w.as_mut())
    }

    pub(crate) fn print_out(&self, text: &str) {
        if let Err(err) = self.output().write_all(text.as_bytes()) {
            debug!(error = %err, "Failed to write to output");
        }
    }

    pub(crate) fn print_err(&self, text: &str) {
        if let Err(err) = self.error_output().write_all(text.as_bytes()) {
            debug!(error = %err, "Failed to write to error output");
        }
    }

    /// The root node.
    pub fn root(&self) -> CommandId {
        self.root
    }

    /// Accesses a node.
    pub fn node(&self, id: CommandId) -> &CommandNode {
        &self.nodes[id.0]
    }

    /// Accesses a node's definition.
    pub fn command(&self, id: CommandId) -> &Command {
        &self.nodes[id.0].command
    }

    /// Node name.
    pub fn name(&self, id: CommandId) -> &str {
        self.nodes[id.0].name()
    }

    /// Parent of a node, `None` for the root and detached nodes.
    pub fn parent(&self, id: CommandId) -> Option<CommandId> {
        self.nodes[id.0].parent
    }

    /// Children in declaration order, or by name when
    /// [`Settings::command_sorting`] is set.
    pub fn children(&self, id: CommandId) -> Vec<CommandId> {
        let mut children = self.nodes[id.0].children.clone();
        if self.settings.command_sorting {
            children.sort_by(|a, b| self.name(*a).cmp(self.name(*b)));
        }
        children
    }

    /// Returns `true` if the node has at least one child.
    pub fn has_children(&self, id: CommandId) -> bool {
        !self.nodes[id.0].children.is_empty()
    }

    /// The node followed by each ancestor up to the root.
    pub fn ancestors(&self, id: CommandId) -> Vec<CommandId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.nodes[current.0].parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// The node and every node below it, parents before children.
    pub fn descendants(&self, id: CommandId) -> Vec<CommandId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev().copied());
        }
        out
    }

    /// Space-separated names from the root down to the node.
    pub fn command_path(&self, id: CommandId) -> String {
        let mut names: Vec<&str> = self.ancestors(id).iter().map(|a| self.name(*a)).collect();
        names.reverse();
        names.join(" ")
    }

    /// The node's use line prefixed with its parent's path, with
    /// `[flags]` appended when the command has visible flags.
    pub fn full_use_line(&self, id: CommandId) -> String {
        let command = self.command(id);
        let mut line = match self.parent(id) {
            Some(parent) => format!("{} {}", self.command_path(parent), command.use_line),
            None => command.use_line.clone(),
        };
        if self.has_available_flags(id) && !line.contains("[flags]") {
            line.push_str(" [flags]");
        }
        line
    }

    /// Returns `true` if a run callback is declared or registered.
    pub fn is_runnable(&self, id: CommandId) -> bool {
        self.command(id).is_runnable()
    }

    /// Returns `true` if the typed token equals one of the node's aliases.
    pub fn has_alias(&self, id: CommandId, typed: &str) -> bool {
        self.command(id)
            .aliases
            .iter()
            .any(|alias| self.settings.names_match(alias, typed))
    }

    /// Not hidden, not deprecated, not the help command, and either
    /// runnable or the parent of an available command.
    pub fn is_available(&self, id: CommandId) -> bool {
        let command = self.command(id);
        if command.deprecated.is_some() || command.hidden {
            return false;
        }
        if Some(id) == self.help_command {
            return false;
        }
        self.is_runnable(id) || self.has_available_children(id)
    }

    /// Returns `true` if any child is available.
    pub fn has_available_children(&self, id: CommandId) -> bool {
        self.nodes[id.0]
            .children
            .iter()
            .any(|child| self.is_available(*child))
    }

    /// Returns `true` if any visible flag is in scope.
    pub fn has_available_flags(&self, id: CommandId) -> bool {
        self.all_flags(id)
            .iter(&self.flags)
            .any(|flag| !flag.hidden && flag.deprecated.is_none())
    }

    /// The id of the auto-installed `help` command, once installed.
    pub fn help_command(&self) -> Option<CommandId> {
        self.help_command
    }

    pub(crate) fn insert_node(&mut self, mut command: Command, parent: Option<CommandId>) -> Result<CommandId> {
        if command.name().is_empty() {
            return Err(CommandError::EmptyName(command.use_line));
        }
        let mut local_flags = FlagSet::new();
        for flag in std::mem::take(&mut command.flags) {
            local_flags.declare(&mut self.flags, flag)?;
        }
        let mut persistent_flags = FlagSet::new();
        for flag in std::mem::take(&mut command.persistent_flags) {
            persistent_flags.declare(&mut self.flags, flag)?;
        }
        self.nodes.push(CommandNode {
            command,
            parent,
            children: Vec::new(),
            local_flags,
            persistent_flags,
            normalize: None,
            views: OnceCell::new(),
        });
        Ok(CommandId(self.nodes.len() - 1))
    }

    /// Adds a new child under `parent`.
    ///
    /// The child inherits the parent's normalization function.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyName`](CommandError::EmptyName) or a flag declaration
    /// error.
    pub fn add_command(&mut self, parent: CommandId, command: Command) -> Result<CommandId> {
        let id = self.insert_node(command, Some(parent))?;
        self.nodes[parent.0].children.push(id);
        if let Some(normalize) = self.nodes[parent.0].normalize.clone() {
            self.set_normalize_func(id, normalize);
        }
        debug!(parent = %self.command_path(parent), child = %self.name(id), "Added command");
        Ok(id)
    }

    /// Detaches `child` from `parent`. The node stays in the arena and can
    /// be re-attached with [`attach_command`](Self::attach_command).
    ///
    /// Returns `false` if `child` is not a child of `parent`.
    pub fn remove_command(&mut self, parent: CommandId, child: CommandId) -> bool {
        if self.nodes[child.0].parent != Some(parent) {
            return false;
        }
        self.nodes[parent.0].children.retain(|c| *c != child);
        self.nodes[child.0].parent = None;
        self.invalidate_subtree(child);
        true
    }

    /// Attaches a detached node under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyAttached`](CommandError::AlreadyAttached) if the
    /// node has a parent (or is the root), and
    /// [`CycleDetected`](CommandError::CycleDetected) if `parent` lies in
    /// the node's own subtree.
    pub fn attach_command(&mut self, parent: CommandId, child: CommandId) -> Result<()> {
        if self.nodes[child.0].parent.is_some() || child == self.root {
            return Err(CommandError::AlreadyAttached(self.name(child).to_string()));
        }
        if self.ancestors(parent).contains(&child) {
            return Err(CommandError::CycleDetected {
                child: self.name(child).to_string(),
                parent: self.name(parent).to_string(),
            });
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        match self.nodes[parent.0].normalize.clone() {
            Some(normalize) => self.set_normalize_func(child, normalize),
            None => self.invalidate_subtree(child),
        }
        Ok(())
    }

    /// Declares a local flag on an existing node.
    ///
    /// # Errors
    ///
    /// Returns a [`FlagError`](crate::FlagError) on name or shorthand
    /// collision within the node's local flags.
    pub fn add_flag(&mut self, id: CommandId, flag: Flag) -> Result<FlagId> {
        let flag_id = self.nodes[id.0].local_flags.declare(&mut self.flags, flag)?;
        self.invalidate_subtree(id);
        Ok(flag_id)
    }

    /// Declares a persistent flag on an existing node.
    ///
    /// # Errors
    ///
    /// Same as [`add_flag`](Self::add_flag), within the persistent flags.
    pub fn add_persistent_flag(&mut self, id: CommandId, flag: Flag) -> Result<FlagId> {
        let flag_id = self.nodes[id.0]
            .persistent_flags
            .declare(&mut self.flags, flag)?;
        self.invalidate_subtree(id);
        Ok(flag_id)
    }

    /// Accesses a flag by id.
    pub fn flag(&self, id: FlagId) -> &Flag {
        &self.flags[id]
    }

    /// The tree's flag arena.
    pub fn flag_store(&self) -> &FlagStore {
        &self.flags
    }

    /// Finds a flag visible on the command by long name.
    pub fn lookup_flag(&self, id: CommandId, name: &str) -> Option<FlagId> {
        self.all_flags(id).lookup(name)
    }

    /// Installs a flag-name normalization function on the node and every
    /// descendant, renaming their flags.
    pub fn set_normalize_func(&mut self, id: CommandId, normalize: NormalizeFn) {
        for node_id in self.descendants(id) {
            let node = &mut self.nodes[node_id.0];
            node.normalize = Some(Rc::clone(&normalize));
            node.local_flags
                .set_normalize_func(&mut self.flags, Rc::clone(&normalize));
            node.persistent_flags
                .set_normalize_func(&mut self.flags, Rc::clone(&normalize));
            node.views = OnceCell::new();
        }
    }

    pub(crate) fn invalidate_subtree(&mut self, id: CommandId) {
        for node_id in self.descendants(id) {
            self.nodes[node_id.0].views = OnceCell::new();
        }
    }

    fn own_flag(&self, id: CommandId, name: &str) -> Result<FlagId> {
        self.local_flags(id)
            .lookup(name)
            .ok_or_else(|| CommandError::FlagNotFound {
                command: self.command_path(id),
                flag: name.to_string(),
            })
    }

    fn annotate(&mut self, flag: FlagId, key: &str, values: Vec<String>) {
        self.flags
            .get_mut(flag)
            .annotations
            .insert(key.to_string(), values);
    }

    /// Marks a local or persistent flag of the node as required.
    ///
    /// # Errors
    ///
    /// Returns [`FlagNotFound`](CommandError::FlagNotFound).
    pub fn mark_flag_required(&mut self, id: CommandId, name: &str) -> Result<()> {
        let flag = self.own_flag(id, name)?;
        self.annotate(flag, ANNOTATION_REQUIRED, vec!["true".to_string()]);
        Ok(())
    }

    /// Marks a persistent flag of the node as required.
    ///
    /// # Errors
    ///
    /// Returns [`FlagNotFound`](CommandError::FlagNotFound) if the node has
    /// no persistent flag of that name.
    pub fn mark_persistent_flag_required(&mut self, id: CommandId, name: &str) -> Result<()> {
        let flag = self.nodes[id.0]
            .persistent_flags
            .lookup(name)
            .ok_or_else(|| CommandError::FlagNotFound {
                command: self.command_path(id),
                flag: name.to_string(),
            })?;
        self.annotate(flag, ANNOTATION_REQUIRED, vec!["true".to_string()]);
        Ok(())
    }

    /// Restricts value completion of the flag to the given file extensions.
    ///
    /// # Errors
    ///
    /// Returns [`FlagNotFound`](CommandError::FlagNotFound).
    pub fn mark_flag_filename(&mut self, id: CommandId, name: &str, extensions: &[&str]) -> Result<()> {
        let flag = self.own_flag(id, name)?;
        let values = extensions.iter().map(|e| e.to_string()).collect();
        self.annotate(flag, ANNOTATION_FILENAME_EXT, values);
        Ok(())
    }

    /// Restricts value completion of the flag to directories.
    ///
    /// # Errors
    ///
    /// Returns [`FlagNotFound`](CommandError::FlagNotFound).
    pub fn mark_flag_dirname(&mut self, id: CommandId, name: &str) -> Result<()> {
        let flag = self.own_flag(id, name)?;
        self.annotate(flag, ANNOTATION_SUBDIRS_IN_DIR, Vec::new());
        Ok(())
    }

    /// Restricts value completion of the flag to subdirectories of `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`FlagNotFound`](CommandError::FlagNotFound).
    pub fn mark_flag_subdirs_in(&mut self, id: CommandId, name: &str, dir: &str) -> Result<()> {
        let flag = self.own_flag(id, name)?;
        self.annotate(flag, ANNOTATION_SUBDIRS_IN_DIR, vec![dir.to_string()]);
        Ok(())
    }

    fn declare_group(&mut self, id: CommandId, kind: GroupKind, names: &[&str]) -> Result<()> {
        for name in names {
            if self.lookup_flag(id, name).is_none() {
                return Err(CommandError::FlagNotFound {
                    command: self.command_path(id),
                    flag: name.to_string(),
                });
            }
        }
        self.nodes[id.0]
            .command
            .flag_groups
            .push(FlagGroup::new(kind, names));
        Ok(())
    }

    /// If any of the flags is set, all of them must be.
    ///
    /// # Errors
    ///
    /// Returns [`FlagNotFound`](CommandError::FlagNotFound) if a member is
    /// not visible on the node.
    pub fn mark_flags_required_together(&mut self, id: CommandId, names: &[&str]) -> Result<()> {
        self.declare_group(id, GroupKind::RequiredTogether, names)
    }

    /// At least one of the flags must be set.
    ///
    /// # Errors
    ///
    /// Same as [`mark_flags_required_together`](Self::mark_flags_required_together).
    pub fn mark_flags_one_required(&mut self, id: CommandId, names: &[&str]) -> Result<()> {
        self.declare_group(id, GroupKind::OneRequired, names)
    }

    /// At most one of the flags may be set.
    ///
    /// # Errors
    ///
    /// Same as [`mark_flags_required_together`](Self::mark_flags_required_together).
    pub fn mark_flags_mutually_exclusive(&mut self, id: CommandId, names: &[&str]) -> Result<()> {
        self.declare_group(id, GroupKind::MutuallyExclusive, names)
    }

    /// Adds a callback to a lifecycle stage next to the declared one.
    pub fn register_hook<F>(&mut self, id: CommandId, stage: Stage, f: F)
    where
        F: Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.nodes[id.0].command.hooks.register(stage, Box::new(f));
    }

    /// Registers value completion for a flag visible on the command.
    ///
    /// # Errors
    ///
    /// Returns [`FlagNotFound`](CommandError::FlagNotFound) or
    /// [`CompletionAlreadyRegistered`](CommandError::CompletionAlreadyRegistered).
    pub fn register_flag_completion<F>(&mut self, id: CommandId, name: &str, f: F) -> Result<()>
    where
        F: Fn(&CompletionRequest<'_>) -> (Vec<crate::Completion>, Directive) + Send + Sync + 'static,
    {
        let flag = self
            .lookup_flag(id, name)
            .ok_or_else(|| CommandError::FlagNotFound {
                command: self.command_path(id),
                flag: name.to_string(),
            })?;
        self.completions.register(flag, name, std::sync::Arc::new(f))
    }
}
