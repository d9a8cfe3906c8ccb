//! Positional-argument validators.
//!
//! # Example
//!
//! ```
//! use cmdtree_core::{Args, ArgsError};
//!
//! let args = vec!["a".to_string(), "b".to_string()];
//! assert!(Args::Range(1, 2).validate(&args, "app", &[], &[]).is_ok());
//! assert_eq!(
//!     Args::Exact(1).validate(&args, "app", &[], &[]),
//!     Err(ArgsError::WrongCount { expected: 1, received: 2 })
//! );
//! ```

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::error::BoxError;

/// User-supplied validator.
pub type ArgsFn = Rc<dyn Fn(&[String]) -> Result<(), BoxError>>;

/// Errors raised by [`Args::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    /// The command takes no positional arguments.
    #[error("unknown command {arg:?} for {path:?}")]
    UnknownCommand {
        /// First extra argument.
        arg: String,
        /// Command path.
        path: String,
    },

    /// An argument is not in the valid list.
    #[error("invalid argument {arg:?} for {path:?}")]
    InvalidArgument {
        /// Offending argument.
        arg: String,
        /// Command path.
        path: String,
    },

    /// Fewer arguments than the minimum.
    #[error("requires at least {min} arg(s), only received {received}")]
    TooFew {
        /// Minimum accepted.
        min: usize,
        /// Number given.
        received: usize,
    },

    /// More arguments than the maximum.
    #[error("accepts at most {max} arg(s), received {received}")]
    TooMany {
        /// Maximum accepted.
        max: usize,
        /// Number given.
        received: usize,
    },

    /// Not exactly the expected number.
    #[error("accepts {expected} arg(s), received {received}")]
    WrongCount {
        /// Exact count required.
        expected: usize,
        /// Number given.
        received: usize,
    },

    /// Outside an inclusive range.
    #[error("accepts between {min} and {max} arg(s), received {received}")]
    OutOfRange {
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
        /// Number given.
        received: usize,
    },

    /// A custom validator failed.
    #[error("{0}")]
    Custom(String),
}

/// Rule applied to the positional arguments left after flag parsing.
#[derive(Clone)]
pub enum Args {
    /// Anything goes.
    Arbitrary,
    /// No positional arguments.
    None,
    /// Every argument must be a valid arg or an arg alias.
    OnlyValid,
    /// At least `n` arguments.
    Minimum(usize),
    /// At most `n` arguments.
    Maximum(usize),
    /// Exactly `n` arguments.
    Exact(usize),
    /// Between `min` and `max` arguments, inclusive.
    Range(usize, usize),
    /// Every rule must pass; the first failure is reported.
    MatchAll(Vec<Args>),
    /// User-supplied check.
    Custom(ArgsFn),
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arbitrary => write!(f, "Arbitrary"),
            Self::None => write!(f, "None"),
            Self::OnlyValid => write!(f, "OnlyValid"),
            Self::Minimum(n) => write!(f, "Minimum({n})"),
            Self::Maximum(n) => write!(f, "Maximum({n})"),
            Self::Exact(n) => write!(f, "Exact({n})"),
            Self::Range(min, max) => write!(f, "Range({min}, {max})"),
            Self::MatchAll(rules) => f.debug_tuple("MatchAll").field(rules).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Args {
    /// Wraps a closure as [`Args::Custom`].
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[String]) -> Result<(), BoxError> + 'static,
    {
        Self::Custom(Rc::new(f))
    }

    /// Checks `args` against the rule.
    ///
    /// `valid_args` entries may carry a tab-separated description, which is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns the [`ArgsError`] describing the first violation.
    pub fn validate(
        &self,
        args: &[String],
        path: &str,
        valid_args: &[String],
        arg_aliases: &[String],
    ) -> Result<(), ArgsError> {
        let received = args.len();
        match self {
            Self::Arbitrary => Ok(()),
            Self::None => match args.first() {
                Some(arg) => Err(ArgsError::UnknownCommand {
                    arg: arg.clone(),
                    path: path.to_string(),
                }),
                None => Ok(()),
            },
            Self::OnlyValid => {
                for arg in args {
                    let known = valid_args
                        .iter()
                        .map(|v| v.split('\t').next().unwrap_or(v))
                        .chain(arg_aliases.iter().map(String::as_str))
                        .any(|v| v == arg);
                    if !known {
                        return Err(ArgsError::InvalidArgument {
                            arg: arg.clone(),
                            path: path.to_string(),
                        });
                    }
                }
                Ok(())
            }
            Self::Minimum(min) if received < *min => Err(ArgsError::TooFew {
                min: *min,
                received,
            }),
            Self::Maximum(max) if received > *max => Err(ArgsError::TooMany {
                max: *max,
                received,
            }),
            Self::Exact(expected) if received != *expected => Err(ArgsError::WrongCount {
                expected: *expected,
                received,
            }),
            Self::Range(min, max) if received < *min || received > *max => {
                Err(ArgsError::OutOfRange {
                    min: *min,
                    max: *max,
                    received,
                })
            }
            Self::Minimum(_) | Self::Maximum(_) | Self::Exact(_) | Self::Range(..) => Ok(()),
            Self::MatchAll(rules) => rules
                .iter()
                .try_for_each(|rule| rule.validate(args, path, valid_args, arg_aliases)),
            Self::Custom(f) => f(args).map_err(|e| ArgsError::Custom(e.to_string())),
        }
    }
}
