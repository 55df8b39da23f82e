//! Reconciliation primitives.
//!
//! Pure building blocks shared by the fleet engine. Nothing here talks to a
//! provider; every function is deterministic given its inputs, which keeps
//! the decisions testable without any fakes.
//!
//! - **Polling**: unbounded, fixed-interval waits that only a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) can stop.
//! - **Membership**: order-independent comparison of a load balancer's
//!   backends against the live fleet.
//! - **Scaling**: turning a requested size into concrete creations or
//!   removals, including which ordinals new instances receive.
//!
//! # Invariants
//!
//! - Waits never give up on their own; cancellation is the only exit besides
//!   success or a fatal probe error.
//! - A membership diff is empty iff both sides hold the same set of ids.
//! - Newly allocated ordinals never collide with a live instance.

mod membership;
mod poll;
mod scale;

use std::time::Duration;

pub use membership::MembershipDiff;
pub use poll::{NoopObserver, PollError, PollObserver, PollPolicy, Poller};
pub use scale::{allocate_indices, plan_scale, ScaleDirection, ScalePlan, ScaleRequest};

/// Interval between readiness probes (network address, SSH, load balancer IP).
pub const READINESS_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between public DNS resolution attempts.
pub const PROPAGATION_INTERVAL: Duration = Duration::from_secs(10);

/// Granularity of the human-visible countdown during propagation waits.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
