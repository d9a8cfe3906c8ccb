//! Flag-group constraints.
//!
//! Groups are declared on a command and apply to that command and, for
//! members that are persistent flags, to its descendants. Only members
//! visible on the executed command take part; the error message still
//! names the whole group.

use std::collections::HashSet;

use thiserror::Error;

use crate::command::{CommandId, CommandTree};
use crate::flag::FlagId;

/// Kind of constraint a [`FlagGroup`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// If any member is set, all must be.
    RequiredTogether,
    /// At least one member must be set.
    OneRequired,
    /// At most one member may be set.
    MutuallyExclusive,
}

/// Ordered set of flag names plus the constraint over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagGroup {
    /// Constraint kind.
    pub kind: GroupKind,
    /// Member flag names, in declaration order.
    pub flags: Vec<String>,
}

impl FlagGroup {
    /// Creates a group.
    pub fn new(kind: GroupKind, flags: &[&str]) -> Self {
        Self {
            kind,
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A violated flag-group constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// Some but not all members of a required-together group were set.
    #[error("[{}] must be set together, but [{}] were not set", .group.join(" "), .missing.join(" "))]
    NotTogether {
        /// Every member of the group.
        group: Vec<String>,
        /// Members that were not set.
        missing: Vec<String>,
    },

    /// No member of a one-required group was set.
    #[error("at least one of the flags in the group [{}] is required", .group.join(" "))]
    NoneSet {
        /// Every member of the group.
        group: Vec<String>,
    },

    /// More than one member of a mutually-exclusive group was set.
    #[error(
        "if any flags in the group [{}] are set none of the others can be; [{}] were all set",
        .group.join(" "),
        .set.join(" ")
    )]
    Exclusive {
        /// Every member of the group.
        group: Vec<String>,
        /// Members that were set.
        set: Vec<String>,
    },
}

struct Member<'g> {
    name: &'g str,
    id: FlagId,
    changed: bool,
}

fn groups_in_scope(tree: &CommandTree, id: CommandId) -> Vec<&FlagGroup> {
    tree.ancestors(id)
        .into_iter()
        .rev()
        .flat_map(|node| tree.command(node).flag_groups.iter())
        .collect()
}

fn visible_members<'g>(tree: &CommandTree, id: CommandId, group: &'g FlagGroup) -> Vec<Member<'g>> {
    let all = tree.all_flags(id);
    group
        .flags
        .iter()
        .filter_map(|name| {
            all.lookup(name).map(|flag| Member {
                name: name.as_str(),
                id: flag,
                changed: tree.flag(flag).changed,
            })
        })
        .collect()
}

fn check(group: &FlagGroup, members: &[Member<'_>]) -> Result<(), GroupError> {
    if members.is_empty() {
        return Ok(());
    }
    let set: Vec<String> = members
        .iter()
        .filter(|m| m.changed)
        .map(|m| m.name.to_string())
        .collect();
    match group.kind {
        GroupKind::RequiredTogether if !set.is_empty() && set.len() < members.len() => {
            Err(GroupError::NotTogether {
                group: group.flags.clone(),
                missing: members
                    .iter()
                    .filter(|m| !m.changed)
                    .map(|m| m.name.to_string())
                    .collect(),
            })
        }
        GroupKind::OneRequired if set.is_empty() => Err(GroupError::NoneSet {
            group: group.flags.clone(),
        }),
        GroupKind::MutuallyExclusive if set.len() > 1 => Err(GroupError::Exclusive {
            group: group.flags.clone(),
            set,
        }),
        _ => Ok(()),
    }
}

/// Checks every group in scope: required-together groups first, then
/// one-required, then mutually-exclusive, each in declaration order (root
/// first). The first violation is returned.
pub(crate) fn validate_flag_groups(tree: &CommandTree, id: CommandId) -> Result<(), GroupError> {
    let groups = groups_in_scope(tree, id);
    for kind in [
        GroupKind::RequiredTogether,
        GroupKind::OneRequired,
        GroupKind::MutuallyExclusive,
    ] {
        for group in groups.iter().filter(|g| g.kind == kind) {
            check(group, &visible_members(tree, id, group))?;
        }
    }
    Ok(())
}

/// How flag groups change flag-name completion on a command.
#[derive(Debug, Default)]
pub(crate) struct CompletionOverlay {
    /// Offered as if marked required.
    pub(crate) required: HashSet<FlagId>,
    /// Not offered at all.
    pub(crate) hidden: HashSet<FlagId>,
}

/// Derives the completion overlay from the flags set so far.
///
/// A set member of a required-together group makes the other members
/// required. A one-required group with no member set makes every member
/// required. A set member of a mutually-exclusive group hides the others.
pub(crate) fn completion_overlay(tree: &CommandTree, id: CommandId) -> CompletionOverlay {
    let mut overlay = CompletionOverlay::default();
    for group in groups_in_scope(tree, id) {
        let members = visible_members(tree, id, group);
        let any_set = members.iter().any(|m| m.changed);
        match group.kind {
            GroupKind::RequiredTogether if any_set => {
                overlay.required.extend(members.iter().map(|m| m.id));
            }
            GroupKind::OneRequired if !any_set => {
                overlay.required.extend(members.iter().map(|m| m.id));
            }
            GroupKind::MutuallyExclusive if any_set => {
                overlay
                    .hidden
                    .extend(members.iter().filter(|m| !m.changed).map(|m| m.id));
            }
            _ => {}
        }
    }
    overlay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, Flag};

    fn tree_with(kind: GroupKind) -> (CommandTree, CommandId) {
        let tree = CommandTree::new(
            Command::new("app")
                .with_flag(Flag::string("a", ""))
                .with_flag(Flag::string("b", ""))
                .with_flag(Flag::string("c", ""))
                .with_flag_group(kind, &["a", "b", "c"]),
        )
        .unwrap();
        let root = tree.root();
        (tree, root)
    }

    fn set(tree: &mut CommandTree, id: CommandId, names: &[&str]) {
        for name in names {
            let flag = tree.lookup_flag(id, name).unwrap();
            tree.flags.get_mut(flag).set("x").unwrap();
        }
    }

    #[test]
    fn test_required_together_reports_missing_subset() {
        let (mut tree, root) = tree_with(GroupKind::RequiredTogether);
        assert!(validate_flag_groups(&tree, root).is_ok());
        set(&mut tree, root, &["a"]);
        assert_eq!(
            validate_flag_groups(&tree, root).unwrap_err().to_string(),
            "[a b c] must be set together, but [b c] were not set"
        );
        set(&mut tree, root, &["b", "c"]);
        assert!(validate_flag_groups(&tree, root).is_ok());
    }

    #[test]
    fn test_one_required() {
        let (mut tree, root) = tree_with(GroupKind::OneRequired);
        assert_eq!(
            validate_flag_groups(&tree, root).unwrap_err().to_string(),
            "at least one of the flags in the group [a b c] is required"
        );
        set(&mut tree, root, &["c"]);
        assert!(validate_flag_groups(&tree, root).is_ok());
    }

    #[test]
    fn test_mutually_exclusive() {
        let (mut tree, root) = tree_with(GroupKind::MutuallyExclusive);
        assert!(validate_flag_groups(&tree, root).is_ok());
        set(&mut tree, root, &["b"]);
        assert!(validate_flag_groups(&tree, root).is_ok());
        set(&mut tree, root, &["c"]);
        assert_eq!(
            validate_flag_groups(&tree, root).unwrap_err().to_string(),
            "if any flags in the group [a b c] are set none of the others can be; [b c] were all set"
        );
    }

    #[test]
    fn test_required_together_checked_before_exclusive() {
        let mut tree = CommandTree::new(
            Command::new("app")
                .with_flag(Flag::string("x", ""))
                .with_flag(Flag::string("y", ""))
                .with_flag(Flag::string("z", ""))
                .with_flag_group(GroupKind::MutuallyExclusive, &["x", "y"])
                .with_flag_group(GroupKind::RequiredTogether, &["y", "z"]),
        )
        .unwrap();
        let root = tree.root();
        set(&mut tree, root, &["x", "y"]);
        assert!(matches!(
            validate_flag_groups(&tree, root),
            Err(GroupError::NotTogether { .. })
        ));
    }

    #[test]
    fn test_completion_overlay() {
        let (mut tree, root) = tree_with(GroupKind::MutuallyExclusive);
        set(&mut tree, root, &["a"]);
        let overlay = completion_overlay(&tree, root);
        assert!(overlay.hidden.contains(&tree.lookup_flag(root, "b").unwrap()));
        assert!(!overlay.hidden.contains(&tree.lookup_flag(root, "a").unwrap()));

        let (tree, root) = tree_with(GroupKind::OneRequired);
        let overlay = completion_overlay(&tree, root);
        assert_eq!(overlay.required.len(), 3);
    }
}
