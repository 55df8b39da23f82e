//! Scale planning.
//!
//! Converts an operator request into the concrete set of creations or
//! removals, given the ordinals of the instances that are live right now.

use std::collections::BTreeSet;

/// Direction of an explicit scale request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleDirection {
    Up,
    Down,
}

impl std::fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleRequest {
    /// Converge on an absolute fleet size.
    To(u32),

    /// Add or remove an explicit number of instances, skipping the
    /// desired-vs-current comparison.
    Explicit { direction: ScaleDirection, count: u32 },
}

impl ScaleRequest {
    /// Parses `+N`, `-N` (explicit) or `N` (absolute).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(count) = raw.strip_prefix('+') {
            return Some(Self::Explicit {
                direction: ScaleDirection::Up,
                count: count.parse().ok()?,
            });
        }
        if let Some(count) = raw.strip_prefix('-') {
            return Some(Self::Explicit {
                direction: ScaleDirection::Down,
                count: count.parse().ok()?,
            });
        }
        raw.parse().ok().map(Self::To)
    }
}

/// The decided action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalePlan {
    /// Fleet already has the requested size.
    Unchanged { size: u32 },

    /// An explicit request for zero instances; nothing is done.
    Rejected { direction: ScaleDirection },

    /// Create one instance per listed ordinal.
    Up { indices: Vec<u32> },

    /// Remove this many instances from the front of the registry listing.
    Down { count: u32 },
}

impl ScalePlan {
    /// Returns true if the plan calls for provider writes.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Unchanged { .. } | Self::Rejected { .. })
    }
}

/// Decides how to move from the live ordinals to the requested size.
///
/// Scale-down never removes more instances than exist.
pub fn plan_scale(live: &[u32], request: ScaleRequest) -> ScalePlan {
    let current = u32::try_from(live.len()).unwrap_or(u32::MAX);

    let (direction, count) = match request {
        ScaleRequest::Explicit { direction, count } => {
            if count == 0 {
                return ScalePlan::Rejected { direction };
            }
            (direction, count)
        }
        ScaleRequest::To(desired) if desired > current => (ScaleDirection::Up, desired - current),
        ScaleRequest::To(desired) if desired < current => {
            (ScaleDirection::Down, current - desired)
        }
        ScaleRequest::To(_) => return ScalePlan::Unchanged { size: current },
    };

    match direction {
        ScaleDirection::Up => ScalePlan::Up {
            indices: allocate_indices(live, count),
        },
        ScaleDirection::Down => match count.min(current) {
            0 => ScalePlan::Unchanged { size: current },
            count => ScalePlan::Down { count },
        },
    }
}

/// Returns the `count` lowest ordinals not held by a live instance.
///
/// Gaps left by earlier removals are filled before the range is extended.
pub fn allocate_indices(live: &[u32], count: u32) -> Vec<u32> {
    let taken: BTreeSet<u32> = live.iter().copied().collect();

    (0u32..)
        .filter(|i| !taken.contains(i))
        .take(count as usize)
        .collect()
}
