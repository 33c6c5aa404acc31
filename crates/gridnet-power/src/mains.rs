//! Priority-tiered mains power network.
//!
//! Suppliers pool their output; consumers register a draw and a priority
//! tier. Distribution walks tiers from most to least critical:
//!
//! - A tier whose demand fits in the remaining pool is served in full.
//! - The first tier that does not fit gets `draw * remaining / demand`
//!   each, floored to the Q32.32 integer grid. The floor remainder is
//!   deliberately discarded, never redistributed.
//! - Every tier after a starved tier receives nothing.
//!
//! Supply and per-tier demand are delta-maintained on registration changes;
//! the walk itself runs only while `allocations_dirty` is set.
//!
//! The network reports undersupply as a brownout and yields a [`Transition`]
//! only on the edge, so callers can emit one event per state change.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gridnet_core::fixed::Fixed64;
use gridnet_core::group::NetworkGroup;
use gridnet_core::id::{NetTag, NodeId};

use crate::{Transition, MAINS};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Consumer priority tier. Lower value is served first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Priority(pub u8);

impl Priority {
    pub const HIGH: Priority = Priority(0);
    pub const MEDIUM: Priority = Priority(1);
    pub const LOW: Priority = Priority(2);
}

/// One consumer's registration and its share from the last allocation walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerLoad {
    pub draw: Fixed64,
    pub priority: Priority,
    pub received: Fixed64,
}

// ---------------------------------------------------------------------------
// MainsNetwork
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MainsNetwork {
    members: Vec<NodeId>,
    suppliers: BTreeMap<NodeId, Fixed64>,
    consumers: BTreeMap<NodeId, ConsumerLoad>,
    total_supply: Fixed64,
    tier_demand: BTreeMap<Priority, Fixed64>,
    allocations_dirty: bool,
    was_brownout: bool,
    last_deficit: Fixed64,
}

impl MainsNetwork {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            suppliers: BTreeMap::new(),
            consumers: BTreeMap::new(),
            total_supply: Fixed64::ZERO,
            tier_demand: BTreeMap::new(),
            // Force a walk before the first read.
            allocations_dirty: true,
            was_brownout: false,
            last_deficit: Fixed64::ZERO,
        }
    }

    // -- registration -------------------------------------------------------

    /// Register a supplier. Double registration is a caller bug.
    pub fn add_supplier(&mut self, node: NodeId, rate: Fixed64) {
        debug_assert!(!self.suppliers.contains_key(&node));
        debug_assert!(rate >= Fixed64::ZERO);
        self.total_supply += rate;
        self.suppliers.insert(node, rate);
        self.allocations_dirty = true;
    }

    /// Unregister a supplier. Unknown nodes are ignored.
    pub fn remove_supplier(&mut self, node: NodeId) {
        if let Some(rate) = self.suppliers.remove(&node) {
            self.total_supply -= rate;
            self.allocations_dirty = true;
        }
    }

    /// Change a supplier's output rate in place.
    pub fn update_supplier(&mut self, node: NodeId, rate: Fixed64) {
        debug_assert!(rate >= Fixed64::ZERO);
        let Some(old) = self.suppliers.get_mut(&node) else {
            debug_assert!(false, "update of unregistered supplier");
            return;
        };
        self.total_supply += rate - *old;
        *old = rate;
        self.allocations_dirty = true;
    }

    /// Register a consumer. Double registration is a caller bug.
    pub fn add_consumer(&mut self, node: NodeId, draw: Fixed64, priority: Priority) {
        debug_assert!(!self.consumers.contains_key(&node));
        debug_assert!(draw >= Fixed64::ZERO);
        *self.tier_demand.entry(priority).or_default() += draw;
        self.consumers.insert(
            node,
            ConsumerLoad {
                draw,
                priority,
                received: Fixed64::ZERO,
            },
        );
        self.allocations_dirty = true;
    }

    /// Unregister a consumer. Unknown nodes are ignored.
    pub fn remove_consumer(&mut self, node: NodeId) {
        if let Some(load) = self.consumers.remove(&node) {
            self.shrink_tier(load.priority, load.draw);
            self.allocations_dirty = true;
        }
    }

    /// Change a consumer's draw in place.
    pub fn update_consumer_draw(&mut self, node: NodeId, draw: Fixed64) {
        debug_assert!(draw >= Fixed64::ZERO);
        let Some(load) = self.consumers.get_mut(&node) else {
            debug_assert!(false, "update of unregistered consumer");
            return;
        };
        let (old, priority) = (load.draw, load.priority);
        load.draw = draw;
        self.shrink_tier(priority, old);
        *self.tier_demand.entry(priority).or_default() += draw;
        self.allocations_dirty = true;
    }

    /// Move a consumer to another tier.
    pub fn update_consumer_priority(&mut self, node: NodeId, priority: Priority) {
        let Some(load) = self.consumers.get_mut(&node) else {
            debug_assert!(false, "update of unregistered consumer");
            return;
        };
        let (draw, old) = (load.draw, load.priority);
        if old == priority {
            return;
        }
        load.priority = priority;
        self.shrink_tier(old, draw);
        *self.tier_demand.entry(priority).or_default() += draw;
        self.allocations_dirty = true;
    }

    fn shrink_tier(&mut self, tier: Priority, by: Fixed64) {
        if let Some(demand) = self.tier_demand.get_mut(&tier) {
            *demand -= by;
            if *demand <= Fixed64::ZERO {
                self.tier_demand.remove(&tier);
            }
        }
    }

    // -- allocation ---------------------------------------------------------

    /// Run the allocation walk if anything changed since the last one.
    /// Returns the brownout edge, if this walk crossed one.
    pub fn recompute_allocations(&mut self) -> Option<Transition> {
        if !self.allocations_dirty {
            return None;
        }
        self.allocations_dirty = false;

        let mut remaining = self.total_supply;
        let mut demand_total = Fixed64::ZERO;
        let mut granted_total = Fixed64::ZERO;
        let mut starved = false;
        let tiers: Vec<Priority> = self.tier_demand.keys().copied().collect();
        for tier in tiers {
            let demand = self.tier_demand[&tier];
            if demand <= Fixed64::ZERO {
                continue;
            }
            demand_total += demand;
            if starved || remaining <= Fixed64::ZERO {
                for load in self.consumers.values_mut().filter(|l| l.priority == tier) {
                    load.received = Fixed64::ZERO;
                }
                continue;
            }
            if remaining >= demand {
                for load in self.consumers.values_mut().filter(|l| l.priority == tier) {
                    load.received = load.draw;
                }
                remaining -= demand;
                granted_total += demand;
            } else {
                // demand > remaining > 0 here, so the division is safe.
                // Multiply first: dividing first truncates the ratio and can
                // shave a whole unit off an exactly-representable grant.
                for load in self.consumers.values_mut().filter(|l| l.priority == tier) {
                    let grant = (load.draw * remaining / demand).floor();
                    load.received = grant;
                    granted_total += grant;
                }
                // Floor remainder is dropped, not carried to lower tiers.
                remaining = Fixed64::ZERO;
                starved = true;
            }
        }

        self.last_deficit = demand_total - granted_total;
        let brownout = self.last_deficit > Fixed64::ZERO;
        let transition = match (self.was_brownout, brownout) {
            (false, true) => Some(Transition::Entered),
            (true, false) => Some(Transition::Cleared),
            _ => None,
        };
        self.was_brownout = brownout;
        transition
    }

    // -- queries ------------------------------------------------------------

    pub fn total_supply(&self) -> Fixed64 {
        self.total_supply
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn supplier_count(&self) -> usize {
        self.suppliers.len()
    }

    /// Power granted to a consumer by the last walk. Zero for non-consumers.
    pub fn received(&self, node: NodeId) -> Fixed64 {
        self.consumers
            .get(&node)
            .map(|l| l.received)
            .unwrap_or(Fixed64::ZERO)
    }

    pub fn consumer(&self, node: NodeId) -> Option<&ConsumerLoad> {
        self.consumers.get(&node)
    }

    pub fn in_brownout(&self) -> bool {
        self.was_brownout
    }

    /// Unserved demand as of the last walk.
    pub fn deficit(&self) -> Fixed64 {
        self.last_deficit
    }

    pub fn needs_recompute(&self) -> bool {
        self.allocations_dirty
    }
}

impl Default for MainsNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkGroup for MainsNetwork {
    fn tag(&self) -> NetTag {
        MAINS
    }

    fn members(&self) -> &[NodeId] {
        &self.members
    }

    fn add_member(&mut self, node: NodeId) {
        debug_assert!(!self.members.contains(&node));
        self.members.push(node);
    }

    fn remove_member(&mut self, node: NodeId) {
        debug_assert!(self.members.contains(&node));
        self.members.retain(|&n| n != node);
        self.remove_supplier(node);
        self.remove_consumer(node);
    }

    fn absorb(&mut self, other: Box<dyn NetworkGroup>) {
        let Ok(other) = other.into_any().downcast::<MainsNetwork>() else {
            debug_assert!(false, "mains group absorbed a foreign flavor");
            return;
        };
        self.total_supply += other.total_supply;
        for (tier, demand) in other.tier_demand {
            *self.tier_demand.entry(tier).or_default() += demand;
        }
        self.suppliers.extend(other.suppliers);
        self.consumers.extend(other.consumers);
        self.was_brownout |= other.was_brownout;
        self.allocations_dirty = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gridnet_core::fixed::f64_to_fixed64;
    use slotmap::SlotMap;

    fn nid(sm: &mut SlotMap<NodeId, ()>) -> NodeId {
        sm.insert(())
    }

    fn fx(v: f64) -> Fixed64 {
        f64_to_fixed64(v)
    }

    // -- full and partial tiers ---------------------------------------------

    #[test]
    fn full_supply_serves_everyone() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let c1 = nid(&mut sm);
        let c2 = nid(&mut sm);
        net.add_supplier(s, fx(100.0));
        net.add_consumer(c1, fx(40.0), Priority::HIGH);
        net.add_consumer(c2, fx(30.0), Priority::LOW);
        assert_eq!(net.recompute_allocations(), None);
        assert_eq!(net.received(c1), fx(40.0));
        assert_eq!(net.received(c2), fx(30.0));
        assert!(!net.in_brownout());
        assert_eq!(net.deficit(), Fixed64::ZERO);
    }

    #[test]
    fn starved_tier_splits_fractionally_with_floor() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let h1 = nid(&mut sm);
        let h2 = nid(&mut sm);
        let l1 = nid(&mut sm);
        let l2 = nid(&mut sm);
        net.add_supplier(s, fx(100.0));
        net.add_consumer(h1, fx(40.0), Priority::HIGH);
        net.add_consumer(h2, fx(20.0), Priority::HIGH);
        net.add_consumer(l1, fx(50.0), Priority::LOW);
        net.add_consumer(l2, fx(30.0), Priority::LOW);

        assert_eq!(net.recompute_allocations(), Some(Transition::Entered));
        // High tier full; low tier splits 40 remaining over 80 demand.
        assert_eq!(net.received(h1), fx(40.0));
        assert_eq!(net.received(h2), fx(20.0));
        assert_eq!(net.received(l1), fx(25.0));
        assert_eq!(net.received(l2), fx(15.0));
        assert!(net.in_brownout());
        assert_eq!(net.deficit(), fx(40.0));
    }

    #[test]
    fn tiers_below_starved_tier_get_nothing() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let high = nid(&mut sm);
        let mid = nid(&mut sm);
        let low = nid(&mut sm);
        net.add_supplier(s, fx(50.0));
        net.add_consumer(high, fx(40.0), Priority::HIGH);
        net.add_consumer(mid, fx(15.0), Priority::MEDIUM);
        net.add_consumer(low, fx(10.0), Priority::LOW);

        net.recompute_allocations();
        assert_eq!(net.received(high), fx(40.0));
        // 10 remaining over 15 demand; the sole consumer gets all 10.
        assert_eq!(net.received(mid), fx(10.0));
        // Low tier stays dark once a higher tier has starved.
        assert_eq!(net.received(low), Fixed64::ZERO);
    }

    #[test]
    fn floor_rounding_never_overallocates() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let a = nid(&mut sm);
        let b = nid(&mut sm);
        let c = nid(&mut sm);
        net.add_supplier(s, fx(10.0));
        net.add_consumer(a, fx(7.0), Priority::HIGH);
        net.add_consumer(b, fx(7.0), Priority::HIGH);
        net.add_consumer(c, fx(7.0), Priority::HIGH);

        net.recompute_allocations();
        let granted = net.received(a) + net.received(b) + net.received(c);
        assert!(granted <= fx(10.0));
        // 10/21 of 7 is 3.33..; floor grants whole units.
        assert_eq!(net.received(a), fx(3.0));
    }

    #[test]
    fn exact_ratios_grant_whole_units() {
        // draw * remaining / demand must be computed in that order: 10/30
        // truncates in Q32.32, and 30 * trunc(10/30) would floor to 9.
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let c = nid(&mut sm);
        net.add_supplier(s, fx(10.0));
        net.add_consumer(c, fx(30.0), Priority::HIGH);
        net.recompute_allocations();
        assert_eq!(net.received(c), fx(10.0));
        assert_eq!(net.deficit(), fx(20.0));
    }

    #[test]
    fn zero_supply_grants_zero_everywhere() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let c = nid(&mut sm);
        net.add_consumer(c, fx(25.0), Priority::HIGH);
        assert_eq!(net.recompute_allocations(), Some(Transition::Entered));
        assert_eq!(net.received(c), Fixed64::ZERO);
        assert_eq!(net.deficit(), fx(25.0));
    }

    #[test]
    fn zero_demand_is_not_a_brownout() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        net.add_supplier(s, fx(100.0));
        assert_eq!(net.recompute_allocations(), None);
        assert!(!net.in_brownout());
    }

    // -- brownout edges -----------------------------------------------------

    #[test]
    fn brownout_transitions_fire_once_per_edge() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let c = nid(&mut sm);
        net.add_supplier(s, fx(10.0));
        net.add_consumer(c, fx(30.0), Priority::HIGH);

        assert_eq!(net.recompute_allocations(), Some(Transition::Entered));
        // No change, no walk, no edge.
        assert_eq!(net.recompute_allocations(), None);

        net.update_supplier(s, fx(30.0));
        assert_eq!(net.recompute_allocations(), Some(Transition::Cleared));
        net.update_supplier(s, fx(40.0));
        assert_eq!(net.recompute_allocations(), None);
    }

    #[test]
    fn recompute_skips_when_clean() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        net.add_supplier(s, fx(5.0));
        assert!(net.needs_recompute());
        net.recompute_allocations();
        assert!(!net.needs_recompute());
        assert_eq!(net.recompute_allocations(), None);
    }

    // -- registration maintenance -------------------------------------------

    #[test]
    fn supplier_updates_track_total() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s1 = nid(&mut sm);
        let s2 = nid(&mut sm);
        net.add_supplier(s1, fx(10.0));
        net.add_supplier(s2, fx(5.0));
        assert_eq!(net.total_supply(), fx(15.0));
        net.update_supplier(s1, fx(20.0));
        assert_eq!(net.total_supply(), fx(25.0));
        net.remove_supplier(s2);
        assert_eq!(net.total_supply(), fx(20.0));
    }

    #[test]
    fn consumer_priority_change_moves_demand() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let c1 = nid(&mut sm);
        let c2 = nid(&mut sm);
        net.add_supplier(s, fx(30.0));
        net.add_consumer(c1, fx(30.0), Priority::HIGH);
        net.add_consumer(c2, fx(30.0), Priority::LOW);
        net.recompute_allocations();
        assert_eq!(net.received(c1), fx(30.0));
        assert_eq!(net.received(c2), Fixed64::ZERO);

        // Swap the tiers; the supply follows the new critical consumer.
        net.update_consumer_priority(c1, Priority::LOW);
        net.update_consumer_priority(c2, Priority::HIGH);
        net.recompute_allocations();
        assert_eq!(net.received(c1), Fixed64::ZERO);
        assert_eq!(net.received(c2), fx(30.0));
    }

    #[test]
    fn remove_member_drops_registrations() {
        let mut sm = SlotMap::with_key();
        let mut net = MainsNetwork::new();
        let s = nid(&mut sm);
        let c = nid(&mut sm);
        net.add_member(s);
        net.add_member(c);
        net.add_supplier(s, fx(10.0));
        net.add_consumer(c, fx(10.0), Priority::HIGH);
        net.remove_member(s);
        assert_eq!(net.total_supply(), Fixed64::ZERO);
        assert_eq!(net.supplier_count(), 0);
        assert_eq!(net.members(), &[c]);
    }

    // -- merging ------------------------------------------------------------

    #[test]
    fn absorb_folds_supply_and_demand() {
        let mut sm = SlotMap::with_key();
        let mut a = MainsNetwork::new();
        let mut b = MainsNetwork::new();
        let s1 = nid(&mut sm);
        let s2 = nid(&mut sm);
        let c1 = nid(&mut sm);
        let c2 = nid(&mut sm);
        a.add_supplier(s1, fx(50.0));
        a.add_consumer(c1, fx(20.0), Priority::HIGH);
        b.add_supplier(s2, fx(25.0));
        b.add_consumer(c2, fx(40.0), Priority::LOW);
        a.recompute_allocations();
        b.recompute_allocations();

        a.absorb(Box::new(b));
        assert_eq!(a.total_supply(), fx(75.0));
        assert_eq!(a.consumer_count(), 2);
        assert!(a.needs_recompute());
        a.recompute_allocations();
        // Merged pool now covers both consumers in full.
        assert_eq!(a.received(c1), fx(20.0));
        assert_eq!(a.received(c2), fx(40.0));
        assert!(!a.in_brownout());
    }

    #[test]
    fn absorb_carries_brownout_state() {
        let mut sm = SlotMap::with_key();
        let mut a = MainsNetwork::new();
        let mut b = MainsNetwork::new();
        let s = nid(&mut sm);
        let c = nid(&mut sm);
        a.add_supplier(s, fx(100.0));
        a.recompute_allocations();
        b.add_consumer(c, fx(10.0), Priority::HIGH);
        assert_eq!(b.recompute_allocations(), Some(Transition::Entered));

        a.absorb(Box::new(b));
        // The merged net is brown until the next walk clears it.
        assert!(a.in_brownout());
        assert_eq!(a.recompute_allocations(), Some(Transition::Cleared));
    }
}
