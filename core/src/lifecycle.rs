//! The execution pipeline.
//!
//! [`CommandTree::plan`] turns a resolved command into an ordered list of
//! [`Step`]s; [`CommandTree::execute`] resolves, plans, runs the steps, and
//! then always runs the cleanup steps. The order is:
//!
//! 1. persistent-initialize hooks (root to target), initialize
//! 2. default `--help`/`--version` flags, flag parsing, help/version
//!    short-circuit
//! 3. positional-argument validation
//! 4. persistent-pre-run hooks (root to target), pre-run
//! 5. required flags, flag groups
//! 6. run, post-run, persistent-post-run hooks (target to root)
//!
//! Cleanup runs finalize, then persistent-finalize hooks (target to root).
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use cmdtree_core::{Command, CommandTree, Stage};
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (a, b, c) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
//!
//! let mut tree = CommandTree::new(
//!     Command::new("app").with_persistent_pre_run(move |_| {
//!         a.borrow_mut().push("root pre-run");
//!         Ok(())
//!     }),
//! )
//! .unwrap();
//! let root = tree.root();
//! let sub = tree
//!     .add_command(
//!         root,
//!         Command::new("sub").with_run(move |inv| {
//!             b.borrow_mut().push("run");
//!             assert_eq!(inv.args(), ["x"]);
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//! tree.register_hook(sub, Stage::Finalize, move |_| {
//!     c.borrow_mut().push("finalize");
//!     Ok(())
//! });
//!
//! let args: Vec<String> = vec!["sub".into(), "x".into()];
//! assert_eq!(tree.execute(&args).unwrap(), sub);
//! assert_eq!(*log.borrow(), ["root pre-run", "run", "finalize"]);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::command::{ANNOTATION_REQUIRED, CommandId, CommandTree};
use crate::context::Context;
use crate::error::{BoxError, CommandError, Result};
use crate::flag::{FlagError, FlagValue};
use crate::groups::validate_flag_groups;
use crate::resolve::Resolution;

/// Lifecycle stage a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Runs for every ancestor, root first, before flag parsing.
    PersistentInitialize,
    /// Runs for the target before flag parsing.
    Initialize,
    /// Runs for every ancestor, root first, after argument validation.
    PersistentPreRun,
    /// Runs for the target after persistent pre-run.
    PreRun,
    /// The command's action.
    Run,
    /// Runs for the target after run.
    PostRun,
    /// Runs for every ancestor, target first, after post-run.
    PersistentPostRun,
    /// Always runs for the target once the pipeline ends.
    Finalize,
    /// Always runs for every ancestor, target first, after finalize.
    PersistentFinalize,
}

impl Stage {
    fn registered_first(self) -> bool {
        matches!(self, Self::PostRun | Self::PersistentPostRun)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PersistentInitialize => "persistent-initialize",
            Self::Initialize => "initialize",
            Self::PersistentPreRun => "persistent-pre-run",
            Self::PreRun => "pre-run",
            Self::Run => "run",
            Self::PostRun => "post-run",
            Self::PersistentPostRun => "persistent-post-run",
            Self::Finalize => "finalize",
            Self::PersistentFinalize => "persistent-finalize",
        };
        f.write_str(name)
    }
}

/// Lifecycle callback.
pub type HookFn = Box<dyn Fn(&Invocation<'_>) -> std::result::Result<(), BoxError>>;

/// Declared and registered callbacks of one command.
#[derive(Default)]
pub struct Hooks {
    declared: BTreeMap<Stage, HookFn>,
    registered: BTreeMap<Stage, Vec<HookFn>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages: Vec<Stage> = self.declared.keys().copied().collect();
        stages.extend(self.registered.keys().copied());
        stages.sort();
        stages.dedup();
        f.debug_struct("Hooks").field("stages", &stages).finish()
    }
}

/// Callbacks of one stage, in the order they run.
pub enum HookSlot<'a> {
    /// Nothing to run.
    Absent,
    /// Exactly one callback.
    Single(&'a HookFn),
    /// Declared and registered callbacks together.
    List(Vec<&'a HookFn>),
}

impl Hooks {
    pub(crate) fn declare(&mut self, stage: Stage, hook: HookFn) {
        self.declared.insert(stage, hook);
    }

    pub(crate) fn register(&mut self, stage: Stage, hook: HookFn) {
        self.registered.entry(stage).or_default().push(hook);
    }

    /// Returns `true` if any callback is attached to the stage.
    pub fn has(&self, stage: Stage) -> bool {
        self.declared.contains_key(&stage)
            || self.registered.get(&stage).is_some_and(|hooks| !hooks.is_empty())
    }

    /// Callbacks of the stage. The declared callback runs before the
    /// registered ones, except for post-run stages where it runs last.
    pub fn slot(&self, stage: Stage) -> HookSlot<'_> {
        let declared = self.declared.get(&stage);
        let registered: Vec<&HookFn> = self
            .registered
            .get(&stage)
            .map(|hooks| hooks.iter().collect())
            .unwrap_or_default();
        match (declared, registered.len()) {
            (None, 0) => HookSlot::Absent,
            (Some(hook), 0) => HookSlot::Single(hook),
            (None, 1) => HookSlot::Single(registered[0]),
            (None, _) => HookSlot::List(registered),
            (Some(hook), _) if stage.registered_first() => {
                let mut all = registered;
                all.push(hook);
                HookSlot::List(all)
            }
            (Some(hook), _) => {
                let mut all = vec![hook];
                all.extend(registered);
                HookSlot::List(all)
            }
        }
    }
}

/// What a hook sees of the current execution.
pub struct Invocation<'a> {
    tree: &'a CommandTree,
    command: CommandId,
    owner: CommandId,
    stage: Stage,
    args: &'a [String],
    args_len_at_dash: Option<usize>,
    context: &'a Context,
    called_as: Option<&'a str>,
}

impl<'a> Invocation<'a> {
    /// The whole tree.
    pub fn tree(&self) -> &'a CommandTree {
        self.tree
    }

    /// The executed command.
    pub fn command(&self) -> CommandId {
        self.command
    }

    /// The command declaring the running hook; differs from
    /// [`command`](Self::command) for persistent hooks of ancestors.
    pub fn owner(&self) -> CommandId {
        self.owner
    }

    /// The running stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Positional arguments; every raw argument when flag parsing is
    /// disabled.
    pub fn args(&self) -> &'a [String] {
        self.args
    }

    /// Number of positional arguments before `--`, if `--` was given.
    pub fn args_len_at_dash(&self) -> Option<usize> {
        self.args_len_at_dash
    }

    /// Execution context passed to [`CommandTree::execute_with_context`].
    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// The name or alias that selected the command.
    pub fn called_as(&self) -> &'a str {
        match self.called_as {
            Some(name) => name,
            None => self.tree.name(self.command),
        }
    }

    /// Path of the executed command.
    pub fn command_path(&self) -> String {
        self.tree.command_path(self.command)
    }

    /// See [`CommandTree::flag_value`].
    ///
    /// # Errors
    ///
    /// [`NotDefined`](FlagError::NotDefined).
    pub fn flag_value(&self, name: &str) -> std::result::Result<&'a FlagValue, FlagError> {
        self.tree.flag_value(self.command, name)
    }

    /// See [`CommandTree::flag_changed`].
    pub fn flag_changed(&self, name: &str) -> bool {
        self.tree.flag_changed(self.command, name)
    }

    /// See [`CommandTree::get_bool`].
    ///
    /// # Errors
    ///
    /// [`NotDefined`](FlagError::NotDefined) or
    /// [`TypeMismatch`](FlagError::TypeMismatch).
    pub fn get_bool(&self, name: &str) -> std::result::Result<bool, FlagError> {
        self.tree.get_bool(self.command, name)
    }

    /// See [`CommandTree::get_count`].
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_count(&self, name: &str) -> std::result::Result<u32, FlagError> {
        self.tree.get_count(self.command, name)
    }

    /// See [`CommandTree::get_string`].
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_string(&self, name: &str) -> std::result::Result<&'a str, FlagError> {
        self.tree.get_string(self.command, name)
    }

    /// See [`CommandTree::get_int`].
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_int(&self, name: &str) -> std::result::Result<i64, FlagError> {
        self.tree.get_int(self.command, name)
    }

    /// See [`CommandTree::get_float`].
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_float(&self, name: &str) -> std::result::Result<f64, FlagError> {
        self.tree.get_float(self.command, name)
    }

    /// See [`CommandTree::get_string_list`].
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_string_list(&self, name: &str) -> std::result::Result<&'a [String], FlagError> {
        self.tree.get_string_list(self.command, name)
    }

    /// See [`CommandTree::get_int_list`].
    ///
    /// # Errors
    ///
    /// Same as [`get_bool`](Self::get_bool).
    pub fn get_int_list(&self, name: &str) -> std::result::Result<&'a [i64], FlagError> {
        self.tree.get_int_list(self.command, name)
    }

    /// Writes to the tree's output.
    pub fn print(&self, text: &str) {
        self.tree.print_out(text);
    }

    /// Writes to the tree's error output.
    pub fn eprint(&self, text: &str) {
        self.tree.print_err(text);
    }
}

/// One step of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run the callbacks of `command` for `stage`.
    Hook {
        /// Stage to run.
        stage: Stage,
        /// Command whose callbacks run.
        command: CommandId,
    },
    /// Add `--help` and, with a version, `--version`.
    InstallDefaultFlags,
    /// Parse the target's flags.
    ParseFlags,
    /// Stop for `--help`, `--version`, or a non-runnable target.
    HandleHelpAndVersion,
    /// Apply the positional-argument validator.
    ValidateArgs,
    /// Check flags marked required.
    ValidateRequiredFlags,
    /// Check flag-group constraints.
    ValidateFlagGroups,
}

/// Ordered steps for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// Run in order until one fails or asks to stop.
    pub steps: Vec<Step>,
    /// Always run afterwards; a failure panics.
    pub cleanup: Vec<Step>,
}

enum Flow {
    Continue,
    Stop,
}

struct ExecState<'c> {
    raw: Vec<String>,
    positional: Vec<String>,
    args_len_at_dash: Option<usize>,
    context: &'c Context,
    called_as: Option<String>,
}

impl CommandTree {
    fn persistent_steps(&self, stage: Stage, target: CommandId, root_first: bool) -> Vec<Step> {
        let holders: Vec<CommandId> = self
            .ancestors(target)
            .into_iter()
            .filter(|id| self.command(*id).hooks.has(stage))
            .collect();
        let mut chosen = if self.settings.traverse_run_hooks {
            holders
        } else {
            holders.into_iter().take(1).collect()
        };
        if root_first {
            chosen.reverse();
        }
        chosen
            .into_iter()
            .map(|command| Step::Hook { stage, command })
            .collect()
    }

    fn target_step(&self, stage: Stage, target: CommandId) -> Option<Step> {
        self.command(target)
            .hooks
            .has(stage)
            .then_some(Step::Hook {
                stage,
                command: target,
            })
    }

    /// Builds the pipeline for a resolved command.
    ///
    /// With [`Settings::traverse_run_hooks`](crate::Settings::traverse_run_hooks)
    /// off, only the nearest command declaring a persistent stage runs it.
    pub fn plan(&self, target: CommandId) -> Pipeline {
        let mut steps = self.persistent_steps(Stage::PersistentInitialize, target, true);
        steps.extend(self.target_step(Stage::Initialize, target));
        steps.extend([
            Step::InstallDefaultFlags,
            Step::ParseFlags,
            Step::HandleHelpAndVersion,
            Step::ValidateArgs,
        ]);
        steps.extend(self.persistent_steps(Stage::PersistentPreRun, target, true));
        steps.extend(self.target_step(Stage::PreRun, target));
        steps.extend([Step::ValidateRequiredFlags, Step::ValidateFlagGroups]);
        steps.extend(self.target_step(Stage::Run, target));
        steps.extend(self.target_step(Stage::PostRun, target));
        steps.extend(self.persistent_steps(Stage::PersistentPostRun, target, false));

        let mut cleanup: Vec<Step> = self.target_step(Stage::Finalize, target).into_iter().collect();
        cleanup.extend(self.persistent_steps(Stage::PersistentFinalize, target, false));

        Pipeline { steps, cleanup }
    }

    /// Executes `args` with an empty [`Context`].
    ///
    /// # Errors
    ///
    /// See [`execute_with_context`](Self::execute_with_context).
    pub fn execute(&mut self, args: &[String]) -> Result<CommandId> {
        self.execute_with_context(args, Context::new())
    }

    /// Resolves `args`, runs the pipeline of the target, and reports
    /// failures on the error output.
    ///
    /// A help request prints help and returns `Ok`. A request for the
    /// hidden completion command answers it instead of running hooks.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, after the error transform
    /// for user-input errors.
    ///
    /// # Panics
    ///
    /// Panics if a finalize or persistent-finalize callback fails.
    pub fn execute_with_context(&mut self, args: &[String], context: Context) -> Result<CommandId> {
        self.flags.reset_all();
        self.init_default_help_command()?;
        if self.prepare_complete_command(args)? {
            return self.serve_completion_request(args, &context);
        }

        let resolution = match self.resolve(args) {
            Ok(resolution) => resolution,
            Err(err) => return Err(self.report_resolution_error(err)),
        };
        let target = resolution.command;
        if let Some(message) = &self.command(target).deprecated {
            warn!(command = %self.command_path(target), "Deprecated command used");
            self.print_err(&format!(
                "Command {:?} is deprecated, {}\n",
                self.name(target),
                message
            ));
        }

        match self.run_pipeline(resolution, &context) {
            Ok(()) => Ok(target),
            Err(err) if err.is_help_request() => {
                let help = self.help_text(target);
                self.print_out(&help);
                Ok(target)
            }
            Err(err) => Err(self.report_execution_error(target, err)),
        }
    }

    fn transform_error(&self, id: CommandId, err: CommandError) -> CommandError {
        if !err.is_user_input() {
            return err;
        }
        let transform = self
            .ancestors(id)
            .into_iter()
            .find_map(|a| self.command(a).error_transform.clone());
        match transform {
            Some(f) => f(err),
            None => err,
        }
    }

    fn report_resolution_error(&self, err: CommandError) -> CommandError {
        let err = self.transform_error(self.root, err);
        let root = self.command(self.root);
        if !root.silence_errors {
            self.print_err(&format!("Error: {err}\n"));
            if !root.silence_usage {
                self.print_err(&format!(
                    "Run '{} --help' for usage.\n",
                    self.command_path(self.root)
                ));
            }
        }
        err
    }

    pub(crate) fn report_execution_error(&self, target: CommandId, err: CommandError) -> CommandError {
        let err = self.transform_error(target, err);
        let root = self.command(self.root);
        let command = self.command(target);
        if !command.silence_errors && !root.silence_errors {
            self.print_err(&format!("Error: {err}\n"));
        }
        if !command.silence_usage && !root.silence_usage {
            let usage = self.usage_text(target);
            self.print_err(&format!("{usage}\n"));
        }
        err
    }

    fn run_pipeline(&mut self, resolution: Resolution, context: &Context) -> Result<()> {
        let target = resolution.command;
        let pipeline = self.plan(target);
        debug!(path = %self.command_path(target), steps = pipeline.steps.len(), "Running pipeline");

        let mut state = ExecState {
            raw: resolution.args,
            positional: Vec::new(),
            args_len_at_dash: None,
            context,
            called_as: resolution.called_as,
        };
        let outcome = self.run_steps(target, &pipeline.steps, &mut state);

        for step in &pipeline.cleanup {
            if let Step::Hook { stage, command } = *step {
                if let Err(err) = self.run_hook(stage, command, target, &state) {
                    panic!(
                        "{stage} callback of {:?} failed: {err}",
                        self.command_path(command)
                    );
                }
            }
        }
        outcome
    }

    fn run_steps(&mut self, target: CommandId, steps: &[Step], state: &mut ExecState<'_>) -> Result<()> {
        for step in steps {
            match self.run_step(*step, target, state)? {
                Flow::Continue => {}
                Flow::Stop => break,
            }
        }
        Ok(())
    }

    fn run_step(&mut self, step: Step, target: CommandId, state: &mut ExecState<'_>) -> Result<Flow> {
        match step {
            Step::Hook { stage, command } => {
                self.run_hook(stage, command, target, state)?;
            }
            Step::InstallDefaultFlags => self.install_default_flags(target)?,
            Step::ParseFlags => {
                let parsed = self.parse_flags(target, &state.raw)?;
                state.positional = parsed.positional;
                state.args_len_at_dash = parsed.args_len_at_dash;
            }
            Step::HandleHelpAndVersion => {
                if self.get_bool(target, "help")? {
                    return Err(CommandError::HelpRequested);
                }
                if let Some(version) = &self.command(target).version {
                    if self.get_bool(target, "version")? {
                        self.print_out(&format!("{} version {}\n", self.name(target), version));
                        return Ok(Flow::Stop);
                    }
                }
                if !self.is_runnable(target) {
                    return Err(CommandError::HelpRequested);
                }
            }
            Step::ValidateArgs => {
                let command = self.command(target);
                if let Some(rule) = &command.args {
                    rule.validate(
                        &state.positional,
                        &self.command_path(target),
                        &command.valid_args,
                        &command.arg_aliases,
                    )?;
                }
            }
            Step::ValidateRequiredFlags => {
                if !self.command(target).disable_flag_parsing {
                    self.validate_required_flags(target)?;
                }
            }
            Step::ValidateFlagGroups => {
                if !self.command(target).disable_flag_parsing {
                    validate_flag_groups(self, target)?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn validate_required_flags(&self, target: CommandId) -> Result<()> {
        let missing: Vec<String> = self
            .all_flags(target)
            .iter(&self.flags)
            .filter(|flag| {
                flag.annotations
                    .get(ANNOTATION_REQUIRED)
                    .and_then(|values| values.first())
                    .is_some_and(|value| value == "true")
                    && !flag.changed
            })
            .map(|flag| flag.name.clone())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CommandError::RequiredFlagsNotSet(missing))
        }
    }

    fn run_hook(&self, stage: Stage, owner: CommandId, target: CommandId, state: &ExecState<'_>) -> Result<()> {
        let invocation = Invocation {
            tree: self,
            command: target,
            owner,
            stage,
            args: &state.positional,
            args_len_at_dash: state.args_len_at_dash,
            context: state.context,
            called_as: state.called_as.as_deref(),
        };
        let hooks = match self.command(owner).hooks.slot(stage) {
            HookSlot::Absent => return Ok(()),
            HookSlot::Single(hook) => vec![hook],
            HookSlot::List(hooks) => hooks,
        };
        debug!(%stage, owner = %self.command_path(owner), count = hooks.len(), "Running hooks");
        for hook in hooks {
            hook(&invocation).map_err(|source| CommandError::Hook { stage, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::{Command, Settings};

    type Log = Rc<RefCell<Vec<String>>>;

    fn hook(log: &Log, label: &str) -> impl Fn(&Invocation<'_>) -> std::result::Result<(), BoxError> + 'static {
        let log = Rc::clone(log);
        let label = label.to_string();
        move |_| {
            log.borrow_mut().push(label.clone());
            Ok(())
        }
    }

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn tree(log: &Log, settings: Settings) -> (CommandTree, CommandId) {
        let mut tree = CommandTree::with_settings(
            Command::new("root")
                .with_hook(Stage::PersistentInitialize, hook(log, "root:p-init"))
                .with_persistent_pre_run(hook(log, "root:p-pre"))
                .with_persistent_post_run(hook(log, "root:p-post"))
                .with_hook(Stage::PersistentFinalize, hook(log, "root:p-fin")),
            settings,
        )
        .unwrap();
        let root = tree.root();
        let mid = tree
            .add_command(
                root,
                Command::new("mid")
                    .with_persistent_pre_run(hook(log, "mid:p-pre"))
                    .with_persistent_post_run(hook(log, "mid:p-post")),
            )
            .unwrap();
        let leaf = tree
            .add_command(
                mid,
                Command::new("leaf")
                    .with_hook(Stage::Initialize, hook(log, "leaf:init"))
                    .with_pre_run(hook(log, "leaf:pre"))
                    .with_run(hook(log, "leaf:run"))
                    .with_post_run(hook(log, "leaf:post"))
                    .with_hook(Stage::Finalize, hook(log, "leaf:fin")),
            )
            .unwrap();
        tree.set_output(std::io::sink());
        tree.set_error_output(std::io::sink());
        (tree, leaf)
    }

    #[test]
    fn test_full_order() {
        let log = Log::default();
        let (mut tree, leaf) = tree(&log, Settings::default());
        assert_eq!(tree.execute(&args(&["mid", "leaf"])).unwrap(), leaf);
        assert_eq!(
            *log.borrow(),
            [
                "root:p-init",
                "leaf:init",
                "root:p-pre",
                "mid:p-pre",
                "leaf:pre",
                "leaf:run",
                "leaf:post",
                "mid:p-post",
                "root:p-post",
                "leaf:fin",
                "root:p-fin",
            ]
        );
    }

    #[test]
    fn test_nearest_persistent_hook_only() {
        let log = Log::default();
        let settings = Settings {
            traverse_run_hooks: false,
            ..Settings::default()
        };
        let (mut tree, _) = tree(&log, settings);
        tree.execute(&args(&["mid", "leaf"])).unwrap();
        let log = log.borrow();
        assert!(log.contains(&"mid:p-pre".to_string()));
        assert!(!log.contains(&"root:p-pre".to_string()));
        assert!(log.contains(&"mid:p-post".to_string()));
        assert!(!log.contains(&"root:p-post".to_string()));
    }

    #[test]
    fn test_registered_hook_order() {
        let log = Log::default();
        let (mut tree, leaf) = tree(&log, Settings::default());
        tree.register_hook(leaf, Stage::PreRun, hook(&log, "leaf:pre+"));
        tree.register_hook(leaf, Stage::PostRun, hook(&log, "leaf:post+"));
        tree.register_hook(leaf, Stage::Finalize, hook(&log, "leaf:fin+"));
        tree.execute(&args(&["mid", "leaf"])).unwrap();
        let log = log.borrow();
        let pos = |label: &str| log.iter().position(|l| l == label).unwrap();
        assert!(pos("leaf:pre") < pos("leaf:pre+"));
        assert!(pos("leaf:post+") < pos("leaf:post"));
        assert!(pos("leaf:fin") < pos("leaf:fin+"));
    }

    #[test]
    fn test_failure_stops_pipeline_but_cleanup_runs() {
        let log = Log::default();
        let (mut tree, leaf) = tree(&log, Settings::default());
        tree.register_hook(leaf, Stage::PreRun, |_| Err("boom".into()));
        let err = tree.execute(&args(&["mid", "leaf"])).unwrap_err();
        assert!(matches!(err, CommandError::Hook { stage: Stage::PreRun, .. }));
        assert_eq!(err.to_string(), "boom");
        let log = log.borrow();
        assert!(!log.contains(&"leaf:run".to_string()));
        assert!(log.contains(&"leaf:fin".to_string()));
        assert!(log.contains(&"root:p-fin".to_string()));
    }

    #[test]
    #[should_panic(expected = "finalize callback of \"root mid leaf\" failed: cleanup")]
    fn test_finalize_failure_panics() {
        let log = Log::default();
        let (mut tree, leaf) = tree(&log, Settings::default());
        tree.register_hook(leaf, Stage::Finalize, |_| Err("cleanup".into()));
        let _ = tree.execute(&args(&["mid", "leaf"]));
    }

    #[test]
    fn test_missing_required_flags_local_then_inherited() {
        let mut tree = CommandTree::new(
            Command::new("root").with_persistent_flag(crate::Flag::string("token", "")),
        )
        .unwrap();
        let root = tree.root();
        let deploy = tree
            .add_command(
                root,
                Command::new("deploy")
                    .with_flag(crate::Flag::string("region", ""))
                    .with_flag(crate::Flag::string("env", ""))
                    .with_run(|_| Ok(())),
            )
            .unwrap();
        tree.mark_flag_required(root, "token").unwrap();
        tree.mark_flag_required(deploy, "region").unwrap();
        tree.mark_flag_required(deploy, "env").unwrap();
        tree.set_output(std::io::sink());
        tree.set_error_output(std::io::sink());

        let err = tree.execute(&args(&["deploy"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "required flag(s) \"region\", \"env\", \"token\" not set"
        );
    }

    #[test]
    fn test_plan_is_pure() {
        let log = Log::default();
        let (tree, leaf) = tree(&log, Settings::default());
        let plan = tree.plan(leaf);
        assert_eq!(plan, tree.plan(leaf));
        assert!(log.borrow().is_empty());
        assert_eq!(plan.cleanup.len(), 2);
        assert!(plan.steps.contains(&Step::ParseFlags));
    }

    fn noop(_: &Invocation<'_>) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    #[test]
    fn test_hook_slot_shapes() {
        let mut hooks = Hooks::default();
        assert!(matches!(hooks.slot(Stage::Run), HookSlot::Absent));
        hooks.declare(Stage::Run, Box::new(noop));
        assert!(matches!(hooks.slot(Stage::Run), HookSlot::Single(_)));
        hooks.register(Stage::Run, Box::new(noop));
        assert!(matches!(hooks.slot(Stage::Run), HookSlot::List(ref list) if list.len() == 2));
    }
}
