//! Batched regroup scheduler.
//!
//! Topology edits that might split a component do not recompute immediately;
//! they mark the touched group dirty. Once per [`REGROUP_INTERVAL`] of
//! simulated time the engine drains the dirty set and remakes each group
//! once, so a burst of edits within one interval costs a single flood fill
//! per group.
//!
//! # Design
//!
//! - The scheduler phase is an explicit type, [`Phase`]. Groups created
//!   while a batch is in flight (by remakes) are parked in
//!   `Batching::pending` and only join the active set when the batch ends,
//!   so a batch never observes groups it created itself.
//! - Active and dirty sets are [`BTreeSet`]s: deterministic drain order.

use std::collections::BTreeSet;

use crate::fixed::Fixed64;
use crate::id::GroupId;

/// Simulated time between dirty-set drains.
pub const REGROUP_INTERVAL: Fixed64 = Fixed64::ONE;

/// Scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// A batch is draining; groups registered mid-batch wait in `pending`.
    Batching { pending: Vec<GroupId> },
}

/// Tracks live groups, the dirty set, and the regroup cadence.
#[derive(Debug, Default)]
pub struct GroupManager {
    active: BTreeSet<GroupId>,
    dirty: BTreeSet<GroupId>,
    accumulator: Fixed64,
    phase: Phase,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group. Mid-batch registrations are deferred to batch end.
    pub fn add_group(&mut self, group: GroupId) {
        match &mut self.phase {
            Phase::Idle => {
                self.active.insert(group);
            }
            Phase::Batching { pending } => pending.push(group),
        }
    }

    /// Unregister a group everywhere. Idempotent.
    pub fn remove_group(&mut self, group: GroupId) {
        self.active.remove(&group);
        self.dirty.remove(&group);
        if let Phase::Batching { pending } = &mut self.phase {
            pending.retain(|&g| g != group);
        }
    }

    /// Flag a group for remake at the next drain. Idempotent.
    pub fn mark_dirty(&mut self, group: GroupId) {
        self.dirty.insert(group);
    }

    pub fn is_dirty(&self, group: GroupId) -> bool {
        self.dirty.contains(&group)
    }

    pub fn is_active(&self, group: GroupId) -> bool {
        self.active.contains(&group)
    }

    pub fn active_groups(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.active.iter().copied()
    }

    /// Advance the cadence clock. Returns true when a drain is due.
    pub fn advance(&mut self, dt: Fixed64) -> bool {
        self.accumulator += dt;
        if self.accumulator >= REGROUP_INTERVAL {
            self.accumulator = Fixed64::ZERO;
            true
        } else {
            false
        }
    }

    /// Enter batching and take the dirty set, in ascending id order.
    pub fn begin_batch(&mut self) -> Vec<GroupId> {
        debug_assert!(matches!(self.phase, Phase::Idle));
        self.phase = Phase::Batching {
            pending: Vec::new(),
        };
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Leave batching, promoting mid-batch registrations to the active set.
    pub fn end_batch(&mut self) {
        let phase = std::mem::take(&mut self.phase);
        match phase {
            Phase::Batching { pending } => {
                self.active.extend(pending);
            }
            Phase::Idle => debug_assert!(false, "end_batch without begin_batch"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
