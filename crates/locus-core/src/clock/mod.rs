//! Logical clock capability.
//!
//! The reconciler never reads ambient time. It is handed a [`Clock`] and
//! stamps local edits with `clock.now_millis()`.
//!
//! - [`SystemClock`]: local wall-clock time.
//! - [`AnchoredClock`]: server time extrapolated from an anchor,
//!   `server_time + (now - client_time_at_anchor)`.
//! - [`ManualClock`]: explicitly set time, for tests and simulation.

pub mod skew;
pub mod timestamp;

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of logical timestamps in milliseconds since the Unix epoch.
pub trait Clock {
    fn now_millis(&self) -> i64;

    /// Hook called with the server time of each complete snapshot.
    fn observe_server_time(&mut self, _server_time: i64) {}
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    fn observe_server_time(&mut self, server_time: i64) {
        (**self).observe_server_time(server_time);
    }
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Pairing of a server-reported time with the local time it was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub server_time: i64,
    pub client_time: i64,
}

/// Server time extrapolated from an [`Anchor`] using a local clock.
///
/// Without an anchor it falls through to the inner clock unchanged.
#[derive(Debug, Clone, Default)]
pub struct AnchoredClock<C> {
    inner: C,
    anchor: Option<Anchor>,
}

impl<C: Clock> AnchoredClock<C> {
    /// Wrap `inner` with no anchor.
    pub const fn new(inner: C) -> Self {
        Self {
            inner,
            anchor: None,
        }
    }

    /// Record that the server reported `server_time` at the current local time.
    pub fn anchor_to(&mut self, server_time: i64) {
        self.anchor = Some(Anchor {
            server_time,
            client_time: self.inner.now_millis(),
        });
    }

    /// Replace the anchor outright.
    pub const fn set_anchor(&mut self, anchor: Option<Anchor>) {
        self.anchor = anchor;
    }

    /// The current anchor, if any.
    #[must_use]
    pub const fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    pub const fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}

impl<C: Clock> Clock for AnchoredClock<C> {
    fn now_millis(&self) -> i64 {
        let now = self.inner.now_millis();
        match self.anchor {
            Some(anchor) => anchor
                .server_time
                .saturating_add(now.saturating_sub(anchor.client_time)),
            None => now,
        }
    }

    fn observe_server_time(&mut self, server_time: i64) {
        self.anchor_to(server_time);
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_millis: i64) {
        self.now.fetch_add(delta_millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}
