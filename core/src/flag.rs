//! Flag definitions, the per-tree flag arena, and flag-set parsing.
//!
//! Flags are stored once in a [`FlagStore`] owned by the
//! [`CommandTree`](crate::CommandTree) and referenced by [`FlagId`]. A
//! [`FlagSet`] is an ordered, name-indexed list of ids, so an ancestor's
//! persistent flag and its entry in a descendant's merged view are the same
//! object: a value parsed through one is visible through the other.
//!
//! # Examples
//!
//! ```
//! use cmdtree_core::{Flag, FlagSet, FlagStore};
//!
//! let mut store = FlagStore::default();
//! let mut set = FlagSet::new();
//! set.declare(&mut store, Flag::bool("verbose").with_shorthand('v')).unwrap();
//! set.declare(&mut store, Flag::string("output", "-").with_shorthand('o')).unwrap();
//!
//! let args: Vec<String> = ["-vo", "out.txt", "input"].iter().map(|s| s.to_string()).collect();
//! let parsed = set.parse(&mut store, &args, true).unwrap();
//! assert_eq!(parsed.positional, vec!["input"]);
//!
//! let output = &store[set.lookup("output").unwrap()];
//! assert!(output.changed);
//! assert_eq!(output.value.render(), "out.txt");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Index;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

/// Folds flag names before insertion and lookup (e.g. `_` to `-`, case).
pub type NormalizeFn = Rc<dyn Fn(&str) -> String>;

/// Errors raised by flag declaration, parsing, and typed access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// `--name` does not exist in the set.
    #[error("unknown flag: --{0}")]
    UnknownFlag(String),

    /// A shorthand in a `-abc` bundle does not exist in the set.
    #[error("unknown shorthand flag: '{shorthand}' in -{bundle}")]
    UnknownShorthand {
        /// Offending shorthand character.
        shorthand: char,
        /// The whole bundle, without the leading dash.
        bundle: String,
    },

    /// A value-taking long flag was the last token.
    #[error("flag needs an argument: --{0}")]
    NeedsArgument(String),

    /// A value-taking shorthand was the last token.
    #[error("flag needs an argument: '{shorthand}' in -{bundle}")]
    ShorthandNeedsArgument {
        /// Shorthand that needed a value.
        shorthand: char,
        /// The whole bundle, without the leading dash.
        bundle: String,
    },

    /// The raw value could not be converted to the flag's type.
    #[error("invalid argument {value:?} for {flag:?} flag: {reason}")]
    InvalidValue {
        /// Raw value as typed.
        value: String,
        /// Display name, e.g. `-n, --num`.
        flag: String,
        /// Conversion failure.
        reason: String,
    },

    /// Token such as `--=x` or `---x`.
    #[error("bad flag syntax: {0}")]
    BadSyntax(String),

    /// A flag with this name already exists in the set.
    #[error("flag redefined: {0}")]
    Redefined(String),

    /// The shorthand is already taken by another flag of the set.
    #[error("unable to redefine '{shorthand}' shorthand: already used for flag {existing:?}")]
    ShorthandRedefined {
        /// The contested shorthand.
        shorthand: char,
        /// Name of the flag already holding it.
        existing: String,
    },

    /// Typed access to a flag that is not visible on the command.
    #[error("flag accessed but not defined: {0}")]
    NotDefined(String),

    /// Typed access with the wrong accessor.
    #[error("trying to get {expected} value of flag {name:?} of type {actual}")]
    TypeMismatch {
        /// Flag name.
        name: String,
        /// Type implied by the accessor.
        expected: &'static str,
        /// Actual value type.
        actual: &'static str,
    },
}

/// Handle to a flag in a [`FlagStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlagId(usize);

/// Typed flag value.
///
/// `Bool` and `Count` flags take no trailing value on the command line;
/// list flags are multi-valued and may be repeated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// `--flag`, `--flag=false`.
    Bool(bool),
    /// Incremented by every occurrence, e.g. `-vvv`.
    Count(u32),
    /// Any string.
    String(String),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Comma-separated and/or repeated strings.
    StringList(Vec<String>),
    /// Comma-separated and/or repeated integers.
    IntList(Vec<i64>),
}

impl FlagValue {
    /// Type name shown in usage output.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Count(_) => "count",
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::StringList(_) => "stringSlice",
            Self::IntList(_) => "intSlice",
        }
    }

    /// Returns `true` when the flag never consumes the following token.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Count(_))
    }

    /// Returns `true` when the flag may usefully be given more than once.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Self::StringList(_) | Self::IntList(_))
    }

    /// Value assumed when a boolean-like flag appears without `=value`.
    fn implicit_value(&self) -> Option<&'static str> {
        match self {
            Self::Bool(_) => Some("true"),
            Self::Count(_) => Some("+1"),
            _ => None,
        }
    }

    fn assign(&mut self, raw: &str, append: bool) -> Result<(), String> {
        match self {
            Self::Bool(b) => *b = parse_bool(raw)?,
            Self::Count(n) => {
                if raw == "+1" {
                    *n = n.saturating_add(1);
                } else {
                    *n = raw.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
                }
            }
            Self::String(s) => *s = raw.to_string(),
            Self::Int(i) => *i = raw.parse().map_err(|e: std::num::ParseIntError| e.to_string())?,
            Self::Float(f) => {
                *f = raw.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
            }
            Self::StringList(list) => {
                let items = split_list(raw);
                if append {
                    list.extend(items);
                } else {
                    *list = items;
                }
            }
            Self::IntList(list) => {
                let items = split_list(raw)
                    .iter()
                    .map(|item| item.parse::<i64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| e.to_string())?;
                if append {
                    list.extend(items);
                } else {
                    *list = items;
                }
            }
        }
        Ok(())
    }

    /// Renders the value the way usage output and JSON summaries show it.
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Count(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::StringList(list) => format!("[{}]", list.join(",")),
            Self::IntList(list) => {
                let items: Vec<String> = list.iter().map(i64::to_string).collect();
                format!("[{}]", items.join(","))
            }
        }
    }

    /// Returns `true` for the zero value of the type (hidden in usage).
    pub(crate) fn is_zero(&self) -> bool {
        match self {
            Self::Bool(b) => !b,
            Self::Count(n) => *n == 0,
            Self::String(s) => s.is_empty(),
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::StringList(list) => list.is_empty(),
            Self::IntList(list) => list.is_empty(),
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(format!("invalid boolean value {raw:?}")),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(String::from).collect()
}

/// A named option.
///
/// Build with one of the typed constructors and chain `with_*` methods.
///
/// # Examples
///
/// ```
/// use cmdtree_core::{Flag, FlagValue};
///
/// let port = Flag::int("port", 8080)
///     .with_shorthand('p')
///     .with_usage("port to listen on");
/// assert_eq!(port.display_name(), "-p, --port");
/// assert_eq!(port.value, FlagValue::Int(8080));
/// assert!(!port.is_boolean());
/// ```
#[derive(Debug, Clone)]
pub struct Flag {
    /// Long name, without dashes.
    pub name: String,
    /// Single-character short form.
    pub shorthand: Option<char>,
    /// One-line help text.
    pub usage: String,
    /// Current value.
    pub value: FlagValue,
    /// Value restored by [`reset`](Flag::reset).
    pub default_value: FlagValue,
    /// Whether the flag was set on the command line.
    pub changed: bool,
    /// Omit from usage output and completion.
    pub hidden: bool,
    /// Deprecation message; deprecated flags still parse but are not offered.
    pub deprecated: Option<String>,
    /// Free-form metadata (completion filters, required markers, ...).
    pub annotations: BTreeMap<String, Vec<String>>,
}

impl Flag {
    /// Creates a flag whose default is `value`.
    pub fn new(name: &str, value: FlagValue) -> Self {
        Self {
            name: name.to_string(),
            shorthand: None,
            usage: String::new(),
            default_value: value.clone(),
            value,
            changed: false,
            hidden: false,
            deprecated: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Boolean flag defaulting to `false`.
    pub fn bool(name: &str) -> Self {
        Self::new(name, FlagValue::Bool(false))
    }

    /// Counter flag defaulting to `0`.
    pub fn count(name: &str) -> Self {
        Self::new(name, FlagValue::Count(0))
    }

    /// String flag.
    pub fn string(name: &str, default: &str) -> Self {
        Self::new(name, FlagValue::String(default.to_string()))
    }

    /// Integer flag.
    pub fn int(name: &str, default: i64) -> Self {
        Self::new(name, FlagValue::Int(default))
    }

    /// Float flag.
    pub fn float(name: &str, default: f64) -> Self {
        Self::new(name, FlagValue::Float(default))
    }

    /// Repeatable string-list flag.
    pub fn string_list(name: &str, default: &[&str]) -> Self {
        Self::new(
            name,
            FlagValue::StringList(default.iter().map(|s| s.to_string()).collect()),
        )
    }

    /// Repeatable integer-list flag.
    pub fn int_list(name: &str, default: &[i64]) -> Self {
        Self::new(name, FlagValue::IntList(default.to_vec()))
    }

    /// Sets the short form.
    pub fn with_shorthand(mut self, shorthand: char) -> Self {
        self.shorthand = Some(shorthand);
        self
    }

    /// Sets the help text.
    pub fn with_usage(mut self, usage: &str) -> Self {
        self.usage = usage.to_string();
        self
    }

    /// Hides the flag from usage output and completion.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Marks the flag as deprecated.
    pub fn deprecated(mut self, message: &str) -> Self {
        self.deprecated = Some(message.to_string());
        self
    }

    /// Attaches an annotation.
    pub fn with_annotation(mut self, key: &str, values: &[&str]) -> Self {
        self.annotations.insert(
            key.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// See [`FlagValue::is_boolean`].
    pub fn is_boolean(&self) -> bool {
        self.value.is_boolean()
    }

    /// See [`FlagValue::is_multi_valued`].
    pub fn is_multi_valued(&self) -> bool {
        self.value.is_multi_valued()
    }

    /// Returns `true` if the annotation key is present (even if empty).
    pub fn has_annotation(&self, key: &str) -> bool {
        self.annotations.contains_key(key)
    }

    /// `-s, --name` or `--name`.
    pub fn display_name(&self) -> String {
        match self.shorthand {
            Some(c) => format!("-{c}, --{}", self.name),
            None => format!("--{}", self.name),
        }
    }

    /// Assigns a raw command-line value and marks the flag changed.
    ///
    /// The first assignment to a list flag replaces its default; later
    /// assignments append.
    pub fn set(&mut self, raw: &str) -> Result<(), FlagError> {
        let append = self.changed;
        self.value
            .assign(raw, append)
            .map_err(|reason| FlagError::InvalidValue {
                value: raw.to_string(),
                flag: self.display_name(),
                reason,
            })?;
        self.changed = true;
        Ok(())
    }

    /// Restores the default value and clears [`changed`](Flag::changed).
    pub fn reset(&mut self) {
        self.value = self.default_value.clone();
        self.changed = false;
    }
}

/// Arena owning every flag of a tree.
#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    flags: Vec<Flag>,
}

impl FlagStore {
    /// Moves a flag into the arena.
    pub fn insert(&mut self, flag: Flag) -> FlagId {
        self.flags.push(flag);
        FlagId(self.flags.len() - 1)
    }

    /// Mutable access to a stored flag.
    pub fn get_mut(&mut self, id: FlagId) -> &mut Flag {
        &mut self.flags[id.0]
    }

    /// Resets every flag to its default.
    pub fn reset_all(&mut self) {
        for flag in &mut self.flags {
            flag.reset();
        }
    }
}

impl Index<FlagId> for FlagStore {
    type Output = Flag;

    fn index(&self, id: FlagId) -> &Flag {
        &self.flags[id.0]
    }
}

/// Result of [`FlagSet::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    /// Tokens that were not flags or flag values, in order.
    pub positional: Vec<String>,
    /// Number of positional arguments seen before `--`, if `--` was present.
    pub args_len_at_dash: Option<usize>,
    /// One line per deprecated flag that was used.
    pub deprecation_warnings: Vec<String>,
}

/// Ordered, name-indexed collection of flag ids.
#[derive(Clone, Default)]
pub struct FlagSet {
    order: Vec<FlagId>,
    by_name: HashMap<String, FlagId>,
    by_shorthand: HashMap<char, FlagId>,
    normalize: Option<NormalizeFn>,
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagSet")
            .field("flags", &self.order)
            .field("normalized", &self.normalize.is_some())
            .finish()
    }
}

impl FlagSet {
    /// Creates an empty set without name normalization.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_normalizer(normalize: Option<NormalizeFn>) -> Self {
        Self {
            normalize,
            ..Self::default()
        }
    }

    /// Applies the set's normalization function, if any.
    pub fn normalize_name(&self, name: &str) -> String {
        match &self.normalize {
            Some(f) => f(name),
            None => name.to_string(),
        }
    }

    /// Adds a new flag to `store` and to this set.
    ///
    /// The flag's name is rewritten to its normalized form.
    ///
    /// # Errors
    ///
    /// Returns [`Redefined`](FlagError::Redefined) or
    /// [`ShorthandRedefined`](FlagError::ShorthandRedefined) on collisions;
    /// the store is left untouched in that case.
    pub fn declare(&mut self, store: &mut FlagStore, mut flag: Flag) -> Result<FlagId, FlagError> {
        flag.name = self.normalize_name(&flag.name);
        if self.by_name.contains_key(&flag.name) {
            return Err(FlagError::Redefined(flag.name));
        }
        if let Some(c) = flag.shorthand {
            if let Some(existing) = self.by_shorthand.get(&c) {
                return Err(FlagError::ShorthandRedefined {
                    shorthand: c,
                    existing: store[*existing].name.clone(),
                });
            }
        }
        let id = store.insert(flag);
        self.push(store, id);
        Ok(id)
    }

    /// Adds an existing flag unless a flag of the same (normalized) name is
    /// already present. A shorthand already taken keeps its first owner.
    ///
    /// Returns `true` if the flag was added.
    pub fn add_if_absent(&mut self, store: &FlagStore, id: FlagId) -> bool {
        let key = self.normalize_name(&store[id].name);
        if self.by_name.contains_key(&key) {
            return false;
        }
        self.push(store, id);
        true
    }

    fn push(&mut self, store: &FlagStore, id: FlagId) {
        let flag = &store[id];
        self.by_name.insert(self.normalize_name(&flag.name), id);
        if let Some(c) = flag.shorthand {
            self.by_shorthand.entry(c).or_insert(id);
        }
        self.order.push(id);
    }

    /// Installs a normalization function, renaming member flags and
    /// rebuilding the indexes.
    pub(crate) fn set_normalize_func(&mut self, store: &mut FlagStore, normalize: NormalizeFn) {
        self.normalize = Some(normalize);
        let order = std::mem::take(&mut self.order);
        self.by_name.clear();
        self.by_shorthand.clear();
        for id in order {
            let renamed = self.normalize_name(&store[id].name);
            store.get_mut(id).name = renamed;
            self.push(store, id);
        }
    }

    /// Finds a flag by long name (normalized first).
    pub fn lookup(&self, name: &str) -> Option<FlagId> {
        self.by_name.get(&self.normalize_name(name)).copied()
    }

    /// Finds a flag by shorthand.
    pub fn lookup_shorthand(&self, shorthand: char) -> Option<FlagId> {
        self.by_shorthand.get(&shorthand).copied()
    }

    /// Returns `true` if a flag with this name is in the set.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Flag ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = FlagId> + '_ {
        self.order.iter().copied()
    }

    /// Visits every flag in insertion order.
    pub fn iter<'s>(&'s self, store: &'s FlagStore) -> impl Iterator<Item = &'s Flag> + 's {
        self.order.iter().map(move |id| &store[*id])
    }

    /// Visits only flags set on the command line.
    pub fn changed<'s>(&'s self, store: &'s FlagStore) -> impl Iterator<Item = &'s Flag> + 's {
        self.iter(store).filter(|flag| flag.changed)
    }

    /// Number of flags in the set.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the set has no flags.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Parses `args`, assigning values into `store`.
    ///
    /// Supports `--name=value`, `--name value`, bare boolean `--name`,
    /// shorthand bundles (`-abc`, `-ovalue`, `-o=value`, `-o value`), a lone
    /// `-` as a positional, and `--` as terminator. With `interspersed`
    /// disabled, the first positional ends flag parsing.
    ///
    /// # Errors
    ///
    /// Returns the first [`FlagError`] encountered; flags parsed before it
    /// keep their new values.
    pub fn parse(
        &self,
        store: &mut FlagStore,
        args: &[String],
        interspersed: bool,
    ) -> Result<ParsedArgs, FlagError> {
        let mut parsed = ParsedArgs::default();
        let mut i = 0;
        while i < args.len() {
            let token = &args[i];
            i += 1;

            if token.len() < 2 || !token.starts_with('-') {
                parsed.positional.push(token.clone());
                if !interspersed {
                    parsed.positional.extend(args[i..].iter().cloned());
                    break;
                }
                continue;
            }

            if token == "--" {
                parsed.args_len_at_dash = Some(parsed.positional.len());
                parsed.positional.extend(args[i..].iter().cloned());
                break;
            }

            i = match token.strip_prefix("--") {
                Some(long) => self.parse_long(store, long, token, args, i, &mut parsed)?,
                None => self.parse_shorthands(store, &token[1..], args, i, &mut parsed)?,
            };
        }
        Ok(parsed)
    }

    fn parse_long(
        &self,
        store: &mut FlagStore,
        body: &str,
        token: &str,
        args: &[String],
        mut next: usize,
        parsed: &mut ParsedArgs,
    ) -> Result<usize, FlagError> {
        let (name, inline) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };
        if name.is_empty() || name.starts_with('-') {
            return Err(FlagError::BadSyntax(token.to_string()));
        }
        let id = self
            .lookup(name)
            .ok_or_else(|| FlagError::UnknownFlag(name.to_string()))?;

        let value = match (inline, store[id].value.implicit_value()) {
            (Some(value), _) => value.to_string(),
            (None, Some(implicit)) => implicit.to_string(),
            (None, None) if next < args.len() => {
                next += 1;
                args[next - 1].clone()
            }
            (None, None) => return Err(FlagError::NeedsArgument(name.to_string())),
        };
        self.assign(store, id, &value, parsed)?;
        Ok(next)
    }

    fn parse_shorthands(
        &self,
        store: &mut FlagStore,
        bundle: &str,
        args: &[String],
        mut next: usize,
        parsed: &mut ParsedArgs,
    ) -> Result<usize, FlagError> {
        let mut rest = bundle;
        while let Some(c) = rest.chars().next() {
            let after = &rest[c.len_utf8()..];
            let id = self
                .lookup_shorthand(c)
                .ok_or_else(|| FlagError::UnknownShorthand {
                    shorthand: c,
                    bundle: bundle.to_string(),
                })?;

            let value = if let Some(inline) = after.strip_prefix('=') {
                rest = "";
                inline.to_string()
            } else if let Some(implicit) = store[id].value.implicit_value() {
                rest = after;
                implicit.to_string()
            } else if !after.is_empty() {
                rest = "";
                after.to_string()
            } else if next < args.len() {
                rest = "";
                next += 1;
                args[next - 1].clone()
            } else {
                return Err(FlagError::ShorthandNeedsArgument {
                    shorthand: c,
                    bundle: bundle.to_string(),
                });
            };
            self.assign(store, id, &value, parsed)?;
        }
        Ok(next)
    }

    fn assign(
        &self,
        store: &mut FlagStore,
        id: FlagId,
        value: &str,
        parsed: &mut ParsedArgs,
    ) -> Result<(), FlagError> {
        let flag = store.get_mut(id);
        flag.set(value)?;
        if let Some(message) = &flag.deprecated {
            parsed
                .deprecation_warnings
                .push(format!("Flag --{} has been deprecated, {}", flag.name, message));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> (FlagStore, FlagSet) {
        let mut store = FlagStore::default();
        let mut set = FlagSet::new();
        set.declare(&mut store, Flag::bool("all").with_shorthand('a'))
            .unwrap();
        set.declare(&mut store, Flag::count("verbose").with_shorthand('v'))
            .unwrap();
        set.declare(&mut store, Flag::string("output", "").with_shorthand('o'))
            .unwrap();
        set.declare(&mut store, Flag::int("num", 1).with_shorthand('n'))
            .unwrap();
        set.declare(&mut store, Flag::string_list("tag", &["x"]))
            .unwrap();
        (store, set)
    }

    fn value(store: &FlagStore, set: &FlagSet, name: &str) -> FlagValue {
        store[set.lookup(name).unwrap()].value.clone()
    }

    #[test]
    fn test_long_forms() {
        let (mut store, set) = sample();
        let parsed = set
            .parse(&mut store, &args(&["--output=a", "--num", "3", "--all", "pos"]), true)
            .unwrap();
        assert_eq!(parsed.positional, vec!["pos"]);
        assert_eq!(value(&store, &set, "output"), FlagValue::String("a".into()));
        assert_eq!(value(&store, &set, "num"), FlagValue::Int(3));
        assert_eq!(value(&store, &set, "all"), FlagValue::Bool(true));
    }

    #[test]
    fn test_shorthand_bundle_with_trailing_value() {
        let (mut store, set) = sample();
        set.parse(&mut store, &args(&["-avvofile"]), true).unwrap();
        assert_eq!(value(&store, &set, "all"), FlagValue::Bool(true));
        assert_eq!(value(&store, &set, "verbose"), FlagValue::Count(2));
        assert_eq!(value(&store, &set, "output"), FlagValue::String("file".into()));
    }

    #[test]
    fn test_shorthand_value_in_next_token_and_equals() {
        let (mut store, set) = sample();
        set.parse(&mut store, &args(&["-n", "7", "-o=x"]), true).unwrap();
        assert_eq!(value(&store, &set, "num"), FlagValue::Int(7));
        assert_eq!(value(&store, &set, "output"), FlagValue::String("x".into()));
    }

    #[test]
    fn test_list_first_assignment_replaces_default() {
        let (mut store, set) = sample();
        set.parse(&mut store, &args(&["--tag", "a,b", "--tag=c"]), true)
            .unwrap();
        assert_eq!(
            value(&store, &set, "tag"),
            FlagValue::StringList(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn test_double_dash_terminates() {
        let (mut store, set) = sample();
        let parsed = set
            .parse(&mut store, &args(&["a", "--", "--all", "-"]), true)
            .unwrap();
        assert_eq!(parsed.positional, vec!["a", "--all", "-"]);
        assert_eq!(parsed.args_len_at_dash, Some(1));
        assert_eq!(value(&store, &set, "all"), FlagValue::Bool(false));
    }

    #[test]
    fn test_non_interspersed_stops_at_first_positional() {
        let (mut store, set) = sample();
        let parsed = set
            .parse(&mut store, &args(&["-a", "cmd", "--num", "2"]), false)
            .unwrap();
        assert_eq!(parsed.positional, vec!["cmd", "--num", "2"]);
        assert_eq!(value(&store, &set, "num"), FlagValue::Int(1));
    }

    #[test]
    fn test_errors() {
        let (mut store, set) = sample();
        assert_eq!(
            set.parse(&mut store, &args(&["--nope"]), true).unwrap_err(),
            FlagError::UnknownFlag("nope".into())
        );
        assert_eq!(
            set.parse(&mut store, &args(&["-az"]), true)
                .unwrap_err()
                .to_string(),
            "unknown shorthand flag: 'z' in -az"
        );
        assert_eq!(
            set.parse(&mut store, &args(&["--output"]), true)
                .unwrap_err()
                .to_string(),
            "flag needs an argument: --output"
        );
        assert_eq!(
            set.parse(&mut store, &args(&["-n", "abc"]), true)
                .unwrap_err()
                .to_string(),
            "invalid argument \"abc\" for \"-n, --num\" flag: invalid digit found in string"
        );
    }

    #[test]
    fn test_declare_rejects_duplicates() {
        let (mut store, mut set) = sample();
        assert_eq!(
            set.declare(&mut store, Flag::bool("all")).unwrap_err(),
            FlagError::Redefined("all".into())
        );
        assert!(matches!(
            set.declare(&mut store, Flag::bool("again").with_shorthand('a')),
            Err(FlagError::ShorthandRedefined { shorthand: 'a', .. })
        ));
    }

    #[test]
    fn test_normalization_folds_lookups() {
        let (mut store, mut set) = sample();
        set.set_normalize_func(&mut store, Rc::new(|name: &str| name.to_lowercase()));
        assert_eq!(set.lookup("OUTPUT"), set.lookup("output"));
        assert!(set.lookup("OUTPUT").is_some());
    }

    #[test]
    fn test_deprecated_flag_warns() {
        let mut store = FlagStore::default();
        let mut set = FlagSet::new();
        set.declare(&mut store, Flag::bool("old").deprecated("use --new"))
            .unwrap();
        let parsed = set.parse(&mut store, &args(&["--old"]), true).unwrap();
        assert_eq!(
            parsed.deprecation_warnings,
            vec!["Flag --old has been deprecated, use --new"]
        );
    }
}
