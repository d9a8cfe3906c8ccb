//! Shell completion directives.

use bitflags::bitflags;

bitflags! {
    /// Bitmask telling the shell how to present completions.
    ///
    /// The empty value, [`Directive::DEFAULT`], lets the shell behave
    /// normally. [`Directive::ERROR`] is a standalone signal.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmdtree_core::Directive;
    ///
    /// let d = Directive::NO_SPACE | Directive::NO_FILE_COMP;
    /// assert_eq!(d.bits(), 6);
    /// assert_eq!(d.describe(), "ShellCompDirectiveNoSpace, ShellCompDirectiveNoFileComp");
    /// assert_eq!(Directive::DEFAULT.describe(), "ShellCompDirectiveDefault");
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Directive: u32 {
        /// An error occurred; completions should be ignored.
        const ERROR = 1;
        /// Do not add a space after the completion.
        const NO_SPACE = 1 << 1;
        /// Do not fall back to file completion.
        const NO_FILE_COMP = 1 << 2;
        /// Completions are file extensions to filter by.
        const FILTER_FILE_EXT = 1 << 3;
        /// Complete directory names only; a single completion names the
        /// directory to look in.
        const FILTER_DIRS = 1 << 4;
        /// Keep the order in which completions were returned.
        const KEEP_ORDER = 1 << 5;
    }
}

impl Directive {
    /// Let the shell apply its default behaviour.
    pub const DEFAULT: Self = Self::empty();

    /// First value above every defined bit.
    pub(crate) const MAX: u32 = 1 << 6;

    /// Human-readable list of the set bits, written to standard error
    /// after a completion request.
    pub fn describe(self) -> String {
        if self.bits() >= Self::MAX {
            return format!("ERROR: unexpected directive value: {}", self.bits());
        }
        if self.contains(Self::ERROR) {
            return "ShellCompDirectiveError".to_string();
        }
        let mut parts = Vec::new();
        if self.contains(Self::NO_SPACE) {
            parts.push("ShellCompDirectiveNoSpace");
        }
        if self.contains(Self::NO_FILE_COMP) {
            parts.push("ShellCompDirectiveNoFileComp");
        }
        if self.contains(Self::FILTER_FILE_EXT) {
            parts.push("ShellCompDirectiveFilterFileExt");
        }
        if self.contains(Self::FILTER_DIRS) {
            parts.push("ShellCompDirectiveFilterDirs");
        }
        if self.contains(Self::KEEP_ORDER) {
            parts.push("ShellCompDirectiveKeepOrder");
        }
        if parts.is_empty() {
            return "ShellCompDirectiveDefault".to_string();
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_standalone() {
        let d = Directive::ERROR | Directive::NO_SPACE;
        assert_eq!(d.describe(), "ShellCompDirectiveError");
    }

    #[test]
    fn test_bits_match_wire_values() {
        assert_eq!(Directive::ERROR.bits(), 1);
        assert_eq!(Directive::NO_SPACE.bits(), 2);
        assert_eq!(Directive::NO_FILE_COMP.bits(), 4);
        assert_eq!(Directive::FILTER_FILE_EXT.bits(), 8);
        assert_eq!(Directive::FILTER_DIRS.bits(), 16);
        assert_eq!(Directive::KEEP_ORDER.bits(), 32);
        assert_eq!(Directive::DEFAULT.bits(), 0);
        assert_eq!(Directive::all().bits() + 1, Directive::MAX);
    }

    #[test]
    fn test_undefined_bits_are_reported() {
        let d = Directive::from_bits_retain(64);
        assert_eq!(d.describe(), "ERROR: unexpected directive value: 64");
    }
}
