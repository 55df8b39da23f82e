//! # upfleet-testing
//!
//! In-memory stand-ins for the systems an upfleet fleet is built from. Each
//! fake keeps enough state to behave like the real thing across a whole
//! scenario (created instances show up in later listings, written files can
//! be read back) and records every call so tests can assert on side effects,
//! including the absence of provider writes.

mod cloud;
mod remote;
mod resolver;

pub use cloud::{CloudCall, FakeCloud};
pub use remote::{FakeRemote, FakeSession};
pub use resolver::FakeResolver;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a fake's state; a panicking test must not poison sibling tasks.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
