//! What to do when a branch head moved under a pending commit.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use verso_types::ContentKey;

/// Rebase policy for a commit whose base is no longer the branch head.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebasePolicy {
    /// Fail as soon as the head is not the base.
    AbortOnMove,
    /// Rebuild on the new head unless commits since the base touched any of
    /// this commit's keys.
    #[default]
    RebaseDisjoint,
    /// Rebuild on the new head regardless of what changed.
    AlwaysRebase,
}

/// Outcome of consulting a [`RebasePolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebaseDecision {
    /// Rebuild the commit on the current head.
    Rebase,
    /// Refuse because the head moved at all.
    Abort,
    /// Refuse because these keys were touched on both sides.
    Conflict(Vec<ContentKey>),
}

impl RebasePolicy {
    /// Whether deciding needs the keys touched since the base.
    pub fn needs_intervening_keys(&self) -> bool {
        matches!(self, Self::RebaseDisjoint)
    }

    /// Decide given the keys touched on the branch since the base
    /// (`theirs`) and the keys this commit touches (`ours`).
    pub fn decide(
        &self,
        theirs: &BTreeSet<ContentKey>,
        ours: &BTreeSet<ContentKey>,
    ) -> RebaseDecision {
        match self {
            Self::AbortOnMove => RebaseDecision::Abort,
            Self::AlwaysRebase => RebaseDecision::Rebase,
            Self::RebaseDisjoint => {
                let overlap: Vec<ContentKey> = ours.intersection(theirs).cloned().collect();
                if overlap.is_empty() {
                    RebaseDecision::Rebase
                } else {
                    RebaseDecision::Conflict(overlap)
                }
            }
        }
    }
}
