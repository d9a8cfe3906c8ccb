//! The shell completion engine.
//!
//! Shells call the hidden `__complete` command (or `__completeNoDesc`) with
//! the words typed so far, the last one being the word under the cursor,
//! possibly empty. The answer is one candidate per line followed by
//! `:<directive>`.
//!
//! # Example
//!
//! ```
//! use cmdtree_core::{Command, CommandTree, Context, Directive, Flag};
//!
//! let mut tree = CommandTree::new(Command::new("app")).unwrap();
//! let root = tree.root();
//! let get = tree
//!     .add_command(
//!         root,
//!         Command::new("get")
//!             .with_flag(Flag::string("output", "").with_shorthand('o'))
//!             .with_valid_args(&["pods\tRunning pods", "nodes"])
//!             .with_run(|_| Ok(())),
//!     )
//!     .unwrap();
//! tree.register_flag_completion(get, "output", |_req| {
//!     (vec!["json".into(), "yaml".into()], Directive::NO_FILE_COMP)
//! })
//! .unwrap();
//!
//! fn words(w: &[&str]) -> Vec<String> {
//!     w.iter().map(|s| s.to_string()).collect()
//! }
//!
//! let outcome = tree.complete(&words(&["get", "p"]), &Context::new());
//! assert_eq!(outcome.command, get);
//! assert_eq!(outcome.completions[0].value, "pods");
//! assert_eq!(outcome.directive, Directive::NO_FILE_COMP);
//!
//! let outcome = tree.complete(&words(&["get", "-o", ""]), &Context::new());
//! let values: Vec<&str> = outcome.completions.iter().map(|c| c.value.as_str()).collect();
//! assert_eq!(values, ["json", "yaml"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::command::{
    ANNOTATION_FILENAME_EXT, ANNOTATION_REQUIRED, ANNOTATION_SET_BY_FRAMEWORK,
    ANNOTATION_SUBDIRS_IN_DIR, CommandId, CommandTree,
};
use crate::context::Context;
use crate::directive::Directive;
use crate::error::{CommandError, Result};
use crate::flag::{Flag, FlagId};
use crate::groups::{CompletionOverlay, completion_overlay};
use crate::resolve::is_flag_arg;

/// Name of the hidden completion request command.
pub const COMPLETE_COMMAND: &str = "__complete";
/// Alias of [`COMPLETE_COMMAND`] that strips descriptions.
pub const COMPLETE_NO_DESC_COMMAND: &str = "__completeNoDesc";

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Text inserted by the shell.
    pub value: String,
    /// Text shown next to the value by shells that support it.
    pub description: Option<String>,
}

impl Completion {
    /// Candidate with a description.
    pub fn with_description(value: &str, description: &str) -> Self {
        Self {
            value: value.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
        }
    }

    /// Parses `value` or `value\tdescription`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('\t') {
            Some((value, description)) => Self::with_description(value, description),
            None => Self {
                value: raw.to_string(),
                description: None,
            },
        }
    }

    /// The single output line for this candidate.
    fn render(&self, descriptions: bool) -> String {
        let line = match (&self.description, descriptions) {
            (Some(description), true) => format!("{}\t{}", self.value, description),
            _ => self.value.clone(),
        };
        line.lines().next().unwrap_or("").trim().to_string()
    }
}

impl From<&str> for Completion {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// What a completion callback is asked.
pub struct CompletionRequest<'a> {
    tree: &'a CommandTree,
    command: CommandId,
    args: &'a [String],
    to_complete: &'a str,
    context: &'a Context,
}

impl<'a> CompletionRequest<'a> {
    /// The whole tree, with flags parsed from the words typed so far.
    pub fn tree(&self) -> &'a CommandTree {
        self.tree
    }

    /// The command being completed.
    pub fn command(&self) -> CommandId {
        self.command
    }

    /// Positional arguments typed so far.
    pub fn args(&self) -> &'a [String] {
        self.args
    }

    /// The partial word under the cursor.
    pub fn to_complete(&self) -> &'a str {
        self.to_complete
    }

    /// Context of the request.
    pub fn context(&self) -> &'a Context {
        self.context
    }
}

/// Dynamic completion callback for flag values or positional arguments.
pub type CompletionFn =
    Arc<dyn Fn(&CompletionRequest<'_>) -> (Vec<Completion>, Directive) + Send + Sync>;

/// Flag-value completion callbacks, keyed by flag.
///
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct FlagCompletionRegistry {
    inner: Arc<RwLock<HashMap<FlagId, CompletionFn>>>,
}

impl fmt::Debug for FlagCompletionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.inner.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("FlagCompletionRegistry")
            .field("registered", &count)
            .finish()
    }
}

impl FlagCompletionRegistry {
    /// Registers the callback for a flag.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionAlreadyRegistered`](CommandError::CompletionAlreadyRegistered)
    /// if the flag already has one.
    pub fn register(&self, flag: FlagId, name: &str, f: CompletionFn) -> Result<()> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&flag) {
            return Err(CommandError::CompletionAlreadyRegistered(name.to_string()));
        }
        map.insert(flag, f);
        Ok(())
    }

    /// The callback registered for a flag.
    pub fn get(&self, flag: FlagId) -> Option<CompletionFn> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&flag)
            .cloned()
    }
}

/// Result of [`CommandTree::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// The command the words resolved to.
    pub command: CommandId,
    /// Candidates, in order.
    pub completions: Vec<Completion>,
    /// Shell directive.
    pub directive: Directive,
    /// What went wrong, if anything; candidates computed before the
    /// failure are still returned.
    pub error: Option<String>,
}

impl CompletionOutcome {
    fn new(command: CommandId, completions: Vec<Completion>, directive: Directive) -> Self {
        Self {
            command,
            completions,
            directive,
            error: None,
        }
    }

    fn failed(command: CommandId, error: String) -> Self {
        Self {
            command,
            completions: Vec::new(),
            directive: Directive::DEFAULT,
            error: Some(error),
        }
    }
}

/// The flag whose value is being completed, and the words left once that
/// flag is set aside.
struct FlagCheck {
    flag: Option<FlagId>,
    args: Vec<String>,
    to_complete: String,
    error: Option<String>,
}

/// A flag name as typed: `--name` or the last letter of `-abc`.
enum FlagName {
    Long(String),
    Short(char),
}

impl FlagName {
    fn from_token(token: &str) -> Option<Self> {
        match token.strip_prefix("--") {
            Some(long) if !long.is_empty() => Some(Self::Long(long.to_string())),
            Some(_) => None,
            None => token.strip_prefix('-')?.chars().last().map(Self::Short),
        }
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(name) => f.write_str(name),
            Self::Short(c) => write!(f, "{c}"),
        }
    }
}

fn flag_name_completions(id: FlagId, flag: &Flag, to_complete: &str, overlay: &CompletionOverlay) -> Vec<Completion> {
    if flag.hidden || flag.deprecated.is_some() || overlay.hidden.contains(&id) {
        return Vec::new();
    }
    let mut completions = Vec::new();
    let long = format!("--{}", flag.name);
    if long.starts_with(to_complete) {
        completions.push(Completion::with_description(&long, &flag.usage));
    }
    if let Some(c) = flag.shorthand {
        let short = format!("-{c}");
        if short.starts_with(to_complete) {
            completions.push(Completion::with_description(&short, &flag.usage));
        }
    }
    completions
}

impl CommandTree {
    /// Inherited flags then local flags, as completion visits them.
    fn completion_flag_order(&self, id: CommandId) -> Vec<FlagId> {
        self.inherited_flags(id)
            .ids()
            .chain(self.local_flags(id).ids())
            .collect()
    }

    fn complete_required_flags(&self, id: CommandId, to_complete: &str, overlay: &CompletionOverlay) -> Vec<Completion> {
        self.completion_flag_order(id)
            .into_iter()
            .filter(|fid| {
                let flag = &self.flags[*fid];
                (flag.has_annotation(ANNOTATION_REQUIRED) || overlay.required.contains(fid)) && !flag.changed
            })
            .flat_map(|fid| flag_name_completions(fid, &self.flags[fid], to_complete, overlay))
            .collect()
    }

    fn find_completion_flag(&self, id: CommandId, name: &FlagName) -> Option<FlagId> {
        match name {
            FlagName::Long(long) => self.all_flags(id).lookup(long),
            FlagName::Short(c) => self
                .local_flags(id)
                .lookup_shorthand(*c)
                .or_else(|| self.inherited_flags(id).lookup_shorthand(*c)),
        }
    }

    fn check_flag_completion(&self, id: CommandId, args: Vec<String>, last: String) -> FlagCheck {
        let not_a_flag = |args: Vec<String>, to_complete: String| FlagCheck {
            flag: None,
            args,
            to_complete,
            error: None,
        };
        if self.command(id).disable_flag_parsing {
            return not_a_flag(args, last);
        }

        let original = last.clone();
        let mut to_complete = last;
        let mut flag_name = None;
        let mut trimmed = args.clone();
        let mut with_equal = false;

        if is_flag_arg(&to_complete) {
            let Some(index) = to_complete.find('=') else {
                return not_a_flag(args, to_complete);
            };
            flag_name = FlagName::from_token(&to_complete[..index]);
            to_complete = to_complete[index + 1..].to_string();
            with_equal = true;
        }

        if flag_name.is_none() {
            if let Some(prev) = args.last() {
                if is_flag_arg(prev) && !prev.contains('=') {
                    flag_name = FlagName::from_token(prev);
                    trimmed.pop();
                }
            }
        }

        let Some(flag_name) = flag_name else {
            return not_a_flag(trimmed, to_complete);
        };

        let Some(flag) = self.find_completion_flag(id, &flag_name) else {
            return FlagCheck {
                flag: None,
                args,
                to_complete: original,
                error: Some(format!(
                    "subcommand '{}' does not support flag '{}'",
                    self.name(id),
                    flag_name
                )),
            };
        };

        if !with_equal && self.flags[flag].is_boolean() {
            return not_a_flag(args, to_complete);
        }
        FlagCheck {
            flag: Some(flag),
            args: trimmed,
            to_complete,
            error: None,
        }
    }

    /// Returns `true` if a framework-installed `--help` or `--version` was
    /// given.
    fn framework_flag_given(&self, id: CommandId) -> bool {
        ["version", "help"].iter().any(|name| {
            self.lookup_flag(id, name).is_some_and(|fid| {
                let flag = &self.flags[fid];
                flag.changed
                    && flag
                        .annotations
                        .get(ANNOTATION_SET_BY_FRAMEWORK)
                        .is_some_and(|values| !values.is_empty())
            })
        })
    }

    /// Computes completions for `words`, whose last element is the partial
    /// word under the cursor.
    ///
    /// Resets every flag, then parses the flags typed so far into the
    /// tree, so flag values are visible to completion callbacks. Failures are reported in
    /// [`CompletionOutcome::error`] and never panic.
    pub fn complete(&mut self, words: &[String], context: &Context) -> CompletionOutcome {
        self.flags.reset_all();
        let (to_complete, typed) = match words.split_last() {
            Some((last, rest)) => (last.clone(), rest.to_vec()),
            None => (String::new(), Vec::new()),
        };

        let resolution = match self.resolve(&typed) {
            Ok(resolution) => resolution,
            Err(err) => {
                debug!(error = %err, "Completion could not resolve a command");
                return CompletionOutcome::failed(
                    self.root,
                    format!("unable to find a command for arguments: {typed:?}"),
                );
            }
        };
        let target = resolution.command;
        let disable_flag_parsing = self.command(target).disable_flag_parsing;
        if !disable_flag_parsing {
            if let Err(err) = self.install_default_flags(target) {
                debug!(error = %err, "Could not install default flags");
            }
        }

        let check = self.check_flag_completion(target, resolution.args, to_complete);
        let to_complete = check.to_complete;

        // A trailing `--` counts as a positional only after an earlier `--`
        // or once non-interspersed parsing has stopped.
        let mut flag_completion = true;
        let dash_count = if disable_flag_parsing {
            0
        } else {
            let mut probe = check.args.clone();
            probe.push("--".to_string());
            let mut scratch = self.flags.clone();
            let set = self.all_flags(target).clone();
            set.parse(&mut scratch, &probe, self.command(target).interspersed)
                .map(|parsed| parsed.positional.len())
                .unwrap_or(0)
        };
        let parsed = match self.parse_flags(target, &check.args) {
            Ok(parsed) => parsed,
            Err(err) => {
                return CompletionOutcome::failed(
                    target,
                    format!("error while parsing flags from args {:?}: {err}", check.args),
                );
            }
        };
        if !disable_flag_parsing && dash_count > parsed.positional.len() {
            flag_completion = false;
        }
        if let Some(error) = check.error {
            if flag_completion {
                return CompletionOutcome::failed(target, error);
            }
        }

        if self.framework_flag_given(target) {
            return CompletionOutcome::new(target, Vec::new(), Directive::NO_FILE_COMP);
        }

        let args = if disable_flag_parsing {
            check.args
        } else {
            parsed.positional
        };
        let flag = check.flag.filter(|_| flag_completion);

        if let Some(fid) = flag {
            let annotations = &self.flags[fid].annotations;
            if let Some(extensions) = annotations.get(ANNOTATION_FILENAME_EXT) {
                if !extensions.is_empty() {
                    let completions = extensions.iter().map(|e| Completion::parse(e)).collect();
                    return CompletionOutcome::new(target, completions, Directive::FILTER_FILE_EXT);
                }
            }
            if let Some(dirs) = annotations.get(ANNOTATION_SUBDIRS_IN_DIR) {
                let completions = match dirs.as_slice() {
                    [dir] => vec![Completion::parse(dir)],
                    _ => Vec::new(),
                };
                return CompletionOutcome::new(target, completions, Directive::FILTER_DIRS);
            }
        }

        let overlay = completion_overlay(self, target);
        let mut completions = Vec::new();
        let mut directive = Directive::DEFAULT;

        let completing_flag_name = check.flag.is_none()
            && to_complete.starts_with('-')
            && !to_complete.contains('=')
            && flag_completion;
        if completing_flag_name {
            completions = self.complete_required_flags(target, &to_complete, &overlay);
            if completions.is_empty() {
                for fid in self.completion_flag_order(target) {
                    let candidate = &self.flags[fid];
                    if !candidate.changed || candidate.is_multi_valued() {
                        completions.extend(flag_name_completions(fid, candidate, &to_complete, &overlay));
                    }
                }
            }
            directive = if completions.len() == 1 && completions[0].value.ends_with('=') {
                Directive::NO_SPACE
            } else {
                Directive::NO_FILE_COMP
            };
            debug!(count = completions.len(), "Completed flag names");
            if !disable_flag_parsing {
                return CompletionOutcome::new(target, completions, directive);
            }
        } else if check.flag.is_none() {
            let local_flag_given = !self.command(self.root).traverse_children
                && self
                    .local_non_persistent_flags(target)
                    .changed(&self.flags)
                    .next()
                    .is_some();

            if args.is_empty() && !local_flag_given {
                for child in self.children(target) {
                    if self.is_available(child) || Some(child) == self.help_command {
                        let command = self.command(child);
                        if command.name().starts_with(to_complete.as_str()) {
                            completions.push(Completion::with_description(command.name(), &command.short));
                        }
                        directive = Directive::NO_FILE_COMP;
                    }
                }
            }

            completions.extend(self.complete_required_flags(target, &to_complete, &overlay));

            let command = self.command(target);
            if !command.valid_args.is_empty() {
                if args.is_empty() {
                    completions.extend(
                        command
                            .valid_args
                            .iter()
                            .filter(|valid| valid.starts_with(to_complete.as_str()))
                            .map(|valid| Completion::parse(valid)),
                    );
                    if completions.is_empty() {
                        completions.extend(
                            command
                                .arg_aliases
                                .iter()
                                .filter(|alias| alias.starts_with(to_complete.as_str()))
                                .map(|alias| Completion::parse(alias)),
                        );
                    } else {
                        directive = Directive::NO_FILE_COMP;
                    }
                }
                return CompletionOutcome::new(target, completions, directive);
            }
        }

        let callback = match flag {
            Some(fid) => self.completions.get(fid),
            None => self.command(target).valid_args_function.clone(),
        };
        if let Some(callback) = callback {
            let request = CompletionRequest {
                tree: self,
                command: target,
                args: &args,
                to_complete: &to_complete,
                context,
            };
            let (extra, callback_directive) = callback(&request);
            completions.extend(extra);
            directive = callback_directive;
        }
        CompletionOutcome::new(target, completions, directive)
    }

    /// Prints an outcome in the shell protocol: one candidate per line,
    /// then `:<directive>`; a summary of the directive goes to the error
    /// output.
    pub fn write_completions(&self, outcome: &CompletionOutcome, descriptions: bool) {
        if let Some(error) = &outcome.error {
            debug!(%error, "Completion finished with an error");
        }
        let mut out = String::new();
        for completion in &outcome.completions {
            out.push_str(&completion.render(descriptions));
            out.push('\n');
        }
        out.push_str(&format!(":{}\n", outcome.directive.bits()));
        self.print_out(&out);
        self.print_err(&format!(
            "Completion ended with directive: {}\n",
            outcome.directive.describe()
        ));
    }
}
