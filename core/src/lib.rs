//! Command trees for CLI applications.
//!
//! This crate models a program's commands as a tree and runs invocations
//! against it:
//!
//! - [`Command`]: a command definition with its use line, aliases, descriptions,
//!   flags, argument validator ([`Args`]), and lifecycle hooks.
//! - [`CommandTree`]: the arena owning every command and flag. Resolves an
//!   argument vector to its target command ([`CommandTree::find`],
//!   [`CommandTree::traverse`]), computes merged flag views, and executes
//!   the lifecycle pipeline ([`CommandTree::execute`]).
//! - [`Flag`], [`FlagSet`]: typed flags with shorthands, persistence down
//!   the tree, and [`FlagGroup`] constraints.
//! - [`CommandTree::complete`]: the shell completion engine answering the
//!   hidden `__complete` command with candidates and a [`Directive`].
//!
//! Tree-wide behaviour (prefix matching, case folding, sorting,
//! suggestions) is configured through [`Settings`], which can be loaded
//! from YAML.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use cmdtree_core::{Args, Command, CommandTree, Flag};
//!
//! let greeted = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&greeted);
//!
//! let mut tree = CommandTree::new(
//!     Command::new("greeter").with_persistent_flag(Flag::bool("loud").with_shorthand('l')),
//! )
//! .unwrap();
//! let root = tree.root();
//! let hello = tree
//!     .add_command(
//!         root,
//!         Command::new("hello <name>")
//!             .with_alias("hi")
//!             .with_args(Args::Exact(1))
//!             .with_run(move |inv| {
//!                 let mut name = inv.args()[0].clone();
//!                 if inv.get_bool("loud")? {
//!                     name = name.to_uppercase();
//!                 }
//!                 sink.borrow_mut().push(name);
//!                 Ok(())
//!             }),
//!     )
//!     .unwrap();
//!
//! let args: Vec<String> = ["hi", "-l", "ada"].iter().map(|s| s.to_string()).collect();
//! assert_eq!(tree.execute(&args).unwrap(), hello);
//! assert_eq!(*greeted.borrow(), ["ADA"]);
//! ```

mod args;
mod builtin;
mod command;
mod completion;
mod config;
mod context;
mod directive;
mod error;
mod flag;
mod groups;
mod lifecycle;
mod resolve;
mod suggest;
mod usage;
mod views;

pub use args::{Args, ArgsError, ArgsFn};
pub use command::{
    ANNOTATION_FILENAME_EXT, ANNOTATION_REQUIRED, ANNOTATION_SET_BY_FRAMEWORK,
    ANNOTATION_SUBDIRS_IN_DIR, Command, CommandId, CommandNode, CommandTree, ErrorTransformFn,
};
pub use completion::{
    COMPLETE_COMMAND, COMPLETE_NO_DESC_COMMAND, Completion, CompletionFn, CompletionOutcome,
    CompletionRequest, FlagCompletionRegistry,
};
pub use config::{Settings, SettingsError};
pub use context::Context;
pub use directive::Directive;
pub use error::{BoxError, CommandError, Result};
pub use flag::{Flag, FlagError, FlagId, FlagSet, FlagStore, FlagValue, NormalizeFn, ParsedArgs};
pub use groups::{FlagGroup, GroupError, GroupKind};
pub use lifecycle::{HookFn, HookSlot, Hooks, Invocation, Pipeline, Stage, Step};
pub use resolve::Resolution;
