//! Time-boxed movement constraints.
//!
//! A constraint temporarily denies moving, rotating or sprinting. Every
//! constraint is held as a lease with a deadline on a monotonic clock; the
//! effective permissions are the logical AND over all active leases.

use std::time::Duration;

use bevy::prelude::*;

/// A permission override. `false` denies the axis while the constraint is active.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementConstraint {
    pub allows_move: bool,
    pub allows_rotate: bool,
    pub allows_sprint: bool,
}

impl Default for MovementConstraint {
    fn default() -> Self {
        Self {
            allows_move: true,
            allows_rotate: true,
            allows_sprint: true,
        }
    }
}

impl MovementConstraint {
    pub fn new(allows_move: bool, allows_rotate: bool) -> Self {
        Self {
            allows_move,
            allows_rotate,
            allows_sprint: true,
        }
    }

    /// Deny every axis (stun, cutscene).
    pub fn frozen() -> Self {
        Self {
            allows_move: false,
            allows_rotate: false,
            allows_sprint: false,
        }
    }

    /// Deny movement, keep looking around.
    pub fn rooted() -> Self {
        Self {
            allows_move: false,
            ..default()
        }
    }

    /// Deny sprint only.
    pub fn no_sprint() -> Self {
        Self {
            allows_sprint: false,
            ..default()
        }
    }

    pub fn with_sprint(mut self, allows_sprint: bool) -> Self {
        self.allows_sprint = allows_sprint;
        self
    }
}

/// Effective permissions after combining every active constraint.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub can_move: bool,
    pub can_rotate: bool,
    pub can_sprint: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self::ALL
    }
}

impl Permissions {
    pub const ALL: Self = Self {
        can_move: true,
        can_rotate: true,
        can_sprint: true,
    };

    fn restrict(self, constraint: &MovementConstraint) -> Self {
        Self {
            can_move: self.can_move && constraint.allows_move,
            can_rotate: self.can_rotate && constraint.allows_rotate,
            can_sprint: self.can_sprint && constraint.allows_sprint,
        }
    }
}

/// Returned by [`MovementConstraints::push`], used for early release.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(u64);

#[derive(Reflect, Debug, Clone, Copy)]
struct ConstraintLease {
    handle: ConstraintHandle,
    constraint: MovementConstraint,
    expires_at: Duration,
}

/// The active constraint stack of one character.
///
/// The stack keeps its own notion of "now", advanced between ticks by the
/// expiry system. Pushing is relative to that clock, so a constraint pushed
/// during a tick is in force for the rest of that tick.
///
/// A fresh stack's clock starts at zero. Leases pushed before the stack first
/// meets the game clock are measured from that meeting, see
/// [`MovementConstraints::start_clock`].
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct MovementConstraints {
    now: Duration,
    started: bool,
    next_id: u64,
    leases: Vec<ConstraintLease>,
    permissions: Permissions,
}

impl MovementConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint for `duration`. Permissions update immediately.
    pub fn push(&mut self, constraint: MovementConstraint, duration: Duration) -> ConstraintHandle {
        let handle = ConstraintHandle(self.next_id);
        self.next_id += 1;
        self.leases.push(ConstraintLease {
            handle,
            constraint,
            expires_at: self.now.saturating_add(duration),
        });
        self.permissions = self.permissions.restrict(&constraint);
        debug!(
            "Constraint {:?} pushed for {:?}: {:?}",
            handle, duration, constraint
        );
        handle
    }

    /// Remove a constraint before its deadline.
    ///
    /// Returns `false` when the handle already expired or was released.
    pub fn release(&mut self, handle: ConstraintHandle) -> bool {
        let before = self.leases.len();
        self.leases.retain(|lease| lease.handle != handle);
        let released = self.leases.len() != before;
        if released {
            self.evaluate();
            debug!("Constraint {:?} released early", handle);
        }
        released
    }

    /// Join the game clock at `now`.
    ///
    /// Deadlines of leases pushed so far move forward by the time between the
    /// stack's own clock and `now`, so their full duration counts from here.
    /// Only the first call has an effect, and none once [`advance`](Self::advance)
    /// has run.
    pub fn start_clock(&mut self, now: Duration) {
        if self.started {
            return;
        }
        self.started = true;
        let offset = now.saturating_sub(self.now);
        for lease in &mut self.leases {
            lease.expires_at = lease.expires_at.saturating_add(offset);
        }
        self.now = self.now.max(now);
    }

    /// Whether the stack has joined the game clock.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Move the clock forward and drop every lease whose deadline has passed.
    ///
    /// The clock never runs backwards. Returns the number of expired leases.
    pub fn advance(&mut self, now: Duration) -> usize {
        self.started = true;
        self.now = self.now.max(now);
        let current = self.now;
        let before = self.leases.len();
        self.leases.retain(|lease| lease.expires_at > current);
        let expired = before - self.leases.len();
        if expired > 0 {
            self.evaluate();
            debug!("{} constraint(s) expired, now {:?}", expired, self.permissions);
        }
        expired
    }

    /// AND of all active constraints. Fully permitted when empty.
    #[inline]
    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn is_active(&self, handle: ConstraintHandle) -> bool {
        self.leases.iter().any(|lease| lease.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// The stack's current clock.
    pub fn now(&self) -> Duration {
        self.now
    }

    fn evaluate(&mut self) {
        self.permissions = self
            .leases
            .iter()
            .fold(Permissions::ALL, |acc, lease| acc.restrict(&lease.constraint));
    }
}
