//! Order-independent membership comparison.

use std::collections::BTreeSet;

/// Difference between the members a resource currently has and the members
/// it should have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipDiff<T> {
    /// Desired members that are absent.
    pub missing: Vec<T>,

    /// Current members that should not be there.
    pub extra: Vec<T>,
}

impl<T: Ord + Clone> MembershipDiff<T> {
    /// Compares two collections as sets; ordering and duplicates are ignored.
    pub fn between<C, D>(current: C, desired: D) -> Self
    where
        C: IntoIterator<Item = T>,
        D: IntoIterator<Item = T>,
    {
        let current: BTreeSet<T> = current.into_iter().collect();
        let desired: BTreeSet<T> = desired.into_iter().collect();

        Self {
            missing: desired.difference(&current).cloned().collect(),
            extra: current.difference(&desired).cloned().collect(),
        }
    }

    /// Returns true if both sides hold the same set.
    pub fn is_converged(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}
