//! Execution context threaded from the caller to hooks and completion
//! callbacks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation signal plus string values attached to one execution.
///
/// Contexts form a chain: [`child`](Context::child) and
/// [`with_value`](Context::with_value) derive a new context that sees the
/// parent's values and is cancelled whenever the parent is, while values
/// added to or cancellation of the child never reach the parent. The
/// engine only passes the context along; checking
/// [`is_cancelled`](Context::is_cancelled) is up to the callbacks.
///
/// # Examples
///
/// ```
/// use cmdtree_core::Context;
///
/// let parent = Context::new().with_value("profile", "dev");
/// let child = parent.child().with_value("region", "eu");
///
/// assert_eq!(child.value("profile"), Some("dev"));
/// assert_eq!(parent.value("region"), None);
///
/// child.cancel();
/// assert!(child.is_cancelled());
/// assert!(!parent.is_cancelled());
///
/// parent.cancel();
/// assert!(parent.child().is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: BTreeMap<String, String>,
    own: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl Context {
    /// Creates an empty, uncancelled context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a context with its own cancellation flag.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Arc::clone(&self.own));
        Self {
            values: self.values.clone(),
            own: Arc::new(AtomicBool::new(false)),
            ancestors,
        }
    }

    /// Derives a child context carrying one more value.
    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut child = self.child();
        child.values.insert(key.into(), value.into());
        child
    }

    /// Looks up a value set on this context or any parent.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.own.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if this context or any parent was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.own.load(Ordering::SeqCst)
            || self.ancestors.iter().any(|flag| flag.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_flow_down_only() {
        let root = Context::new().with_value("a", "1");
        let child = root.with_value("b", "2");
        assert_eq!(child.value("a"), Some("1"));
        assert_eq!(child.value("b"), Some("2"));
        assert_eq!(root.value("b"), None);
    }

    #[test]
    fn test_cancellation_reaches_grandchildren() {
        let root = Context::new();
        let grandchild = root.child().child();
        assert!(!grandchild.is_cancelled());
        root.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_clone_shares_cancellation() {
        let ctx = Context::new();
        let copy = ctx.clone();
        copy.cancel();
        assert!(ctx.is_cancelled());
    }
}
