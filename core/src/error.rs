//! Error types for command tree construction, resolution, and execution.
//!
//! [`CommandError`] is the umbrella type returned by
//! [`CommandTree::execute`](crate::CommandTree::execute). It wraps the
//! narrower error types of the flag parser ([`FlagError`]), the positional
//! argument validators ([`ArgsError`]) and the flag-group validator
//! ([`GroupError`]).

use thiserror::Error;

use crate::args::ArgsError;
use crate::flag::FlagError;
use crate::groups::GroupError;
use crate::lifecycle::Stage;

/// Boxed error returned by user callbacks (hooks, custom validators).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building or executing a command tree.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Flag parsing or typed flag access failed.
    #[error(transparent)]
    Flag(#[from] FlagError),

    /// Positional arguments were rejected by the command's validator.
    #[error(transparent)]
    Args(#[from] ArgsError),

    /// A declared flag-group constraint was violated.
    #[error(transparent)]
    Group(#[from] GroupError),

    /// The leading token did not name any subcommand of the root.
    #[error("unknown command {name:?} for {path:?}{}", format_suggestions(.suggestions))]
    UnknownCommand {
        /// Token the user typed.
        name: String,
        /// Command path of the node that rejected it.
        path: String,
        /// Ranked suggestions, possibly empty.
        suggestions: Vec<String>,
    },

    /// A prefix matched more than one subcommand.
    #[error("ambiguous command {name:?} for {path:?}; could be {}", .candidates.join(", "))]
    AmbiguousCommand {
        /// Prefix the user typed.
        name: String,
        /// Command path of the node whose children were searched.
        path: String,
        /// Names of every matching child, in declaration order.
        candidates: Vec<String>,
    },

    /// Flags marked as required were not given.
    ///
    /// Names follow the merged flag view of the command: its own flags in
    /// declaration order, then inherited persistent flags, nearest
    /// ancestor first.
    #[error("required flag(s) \"{}\" not set", .0.join("\", \""))]
    RequiredFlagsNotSet(Vec<String>),

    /// `--help` was given (or a non-runnable command was invoked).
    ///
    /// Never printed as an error; the executor renders help instead.
    #[error("help requested")]
    HelpRequested,

    /// A lifecycle hook returned an error.
    #[error("{source}")]
    Hook {
        /// Stage whose callback failed.
        stage: Stage,
        /// Error returned by the callback.
        #[source]
        source: BoxError,
    },

    /// A command's use line has no name token.
    #[error("command use line {0:?} does not start with a name")]
    EmptyName(String),

    /// Attaching the node would make it its own ancestor.
    #[error("cannot add command {child:?} under {parent:?}: it would become its own ancestor")]
    CycleDetected {
        /// Name of the node being attached.
        child: String,
        /// Name of the intended parent.
        parent: String,
    },

    /// The node already has a parent.
    #[error("command {0:?} already has a parent")]
    AlreadyAttached(String),

    /// A flag named in a declaration does not exist on the command.
    #[error("flag {flag:?} does not exist on command {command:?}")]
    FlagNotFound {
        /// Command path of the node searched.
        command: String,
        /// Flag name that was not found.
        flag: String,
    },

    /// A completion callback was already registered for the flag.
    #[error("flag {0:?} already has a completion function registered")]
    CompletionAlreadyRegistered(String),
}

impl CommandError {
    /// Returns `true` for the help short-circuit, which callers treat as
    /// success.
    pub fn is_help_request(&self) -> bool {
        matches!(self, Self::HelpRequested)
    }

    /// Returns `true` for resolution and validation failures caused by user
    /// input. These are the errors passed through a command's error
    /// transform before being printed.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Self::Flag(_)
                | Self::Args(_)
                | Self::Group(_)
                | Self::UnknownCommand { .. }
                | Self::AmbiguousCommand { .. }
                | Self::RequiredFlagsNotSet(_)
        )
    }
}

/// Renders the "Did you mean this?" block appended to unknown-command
/// errors. Empty when there are no suggestions.
pub(crate) fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nDid you mean this?\n");
    for suggestion in suggestions {
        out.push('\t');
        out.push_str(suggestion);
        out.push('\n');
    }
    out
}

/// Convenience alias for results with [`CommandError`].
pub type Result<T> = std::result::Result<T, CommandError>;
