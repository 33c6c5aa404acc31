//! Battery-buffered power network.
//!
//! Loads on a buffered net draw from a chain of batteries instead of a live
//! supply pool. Each simulation step the aggregate load (scaled by the step
//! length) drains batteries strictly in registration order: the first
//! battery empties completely before the second is touched. The net is
//! *energized* while the chain covers the step's demand.
//!
//! Battery charge is handed in by the caller each step rather than stored
//! in the group, so charge survives the group being discarded and remade
//! after a topology split.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

use gridnet_core::fixed::Fixed64;
use gridnet_core::group::NetworkGroup;
use gridnet_core::id::{NetTag, NodeId};

use crate::{Transition, BUFFERED};

/// One battery's charge state, owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStore {
    pub charge: Fixed64,
    pub capacity: Fixed64,
}

impl BatteryStore {
    pub fn new(charge: Fixed64, capacity: Fixed64) -> Self {
        debug_assert!(charge >= Fixed64::ZERO && charge <= capacity);
        Self { charge, capacity }
    }

    pub fn is_empty(&self) -> bool {
        self.charge <= Fixed64::ZERO
    }

    pub fn is_full(&self) -> bool {
        self.charge >= self.capacity
    }
}

// ---------------------------------------------------------------------------
// BufferedNetwork
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct BufferedNetwork {
    members: Vec<NodeId>,
    /// Batteries, in the order they registered. Drain order.
    receiver_order: Vec<NodeId>,
    loads: BTreeMap<NodeId, Fixed64>,
    aggregate_load: Fixed64,
    energized: bool,
}

impl BufferedNetwork {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            receiver_order: Vec::new(),
            loads: BTreeMap::new(),
            aggregate_load: Fixed64::ZERO,
            // A net with no demand is trivially energized.
            energized: true,
        }
    }

    // -- registration -------------------------------------------------------

    /// Register a battery at the back of the drain order.
    pub fn add_battery(&mut self, node: NodeId) {
        debug_assert!(!self.receiver_order.contains(&node));
        self.receiver_order.push(node);
    }

    pub fn remove_battery(&mut self, node: NodeId) {
        self.receiver_order.retain(|&n| n != node);
    }

    /// Register a load. Double registration is a caller bug.
    pub fn add_load(&mut self, node: NodeId, draw: Fixed64) {
        debug_assert!(!self.loads.contains_key(&node));
        debug_assert!(draw >= Fixed64::ZERO);
        self.aggregate_load += draw;
        self.loads.insert(node, draw);
    }

    pub fn remove_load(&mut self, node: NodeId) {
        if let Some(draw) = self.loads.remove(&node) {
            self.aggregate_load -= draw;
        }
    }

    /// Change a load's draw in place.
    pub fn update_load(&mut self, node: NodeId, draw: Fixed64) {
        debug_assert!(draw >= Fixed64::ZERO);
        let Some(old) = self.loads.get_mut(&node) else {
            debug_assert!(false, "update of unregistered load");
            return;
        };
        self.aggregate_load += draw - *old;
        *old = draw;
    }

    // -- simulation ---------------------------------------------------------

    /// Drain one step's demand from the battery chain. Returns the
    /// energized-state edge, if this step crossed one.
    pub fn tick(
        &mut self,
        dt: Fixed64,
        stores: &mut SecondaryMap<NodeId, BatteryStore>,
    ) -> Option<Transition> {
        let mut needed = self.aggregate_load * dt;
        for &node in &self.receiver_order {
            if needed <= Fixed64::ZERO {
                break;
            }
            let Some(store) = stores.get_mut(node) else {
                debug_assert!(false, "battery without a charge store");
                continue;
            };
            let take = store.charge.min(needed);
            store.charge -= take;
            needed -= take;
        }
        let energized = needed <= Fixed64::ZERO;
        let transition = match (self.energized, energized) {
            (true, false) => Some(Transition::Entered),
            (false, true) => Some(Transition::Cleared),
            _ => None,
        };
        self.energized = energized;
        transition
    }

    /// Push charge into the chain front to back. Returns the amount the
    /// chain actually accepted.
    pub fn charge(
        &mut self,
        amount: Fixed64,
        stores: &mut SecondaryMap<NodeId, BatteryStore>,
    ) -> Fixed64 {
        debug_assert!(amount >= Fixed64::ZERO);
        let mut left = amount;
        for &node in &self.receiver_order {
            if left <= Fixed64::ZERO {
                break;
            }
            let Some(store) = stores.get_mut(node) else {
                continue;
            };
            let room = store.capacity - store.charge;
            let put = room.min(left);
            store.charge += put;
            left -= put;
        }
        amount - left
    }

    // -- queries ------------------------------------------------------------

    pub fn energized(&self) -> bool {
        self.energized
    }

    pub fn receiver_count(&self) -> usize {
        self.receiver_order.len()
    }

    pub fn load_count(&self) -> usize {
        self.loads.len()
    }

    pub fn aggregate_load(&self) -> Fixed64 {
        self.aggregate_load
    }

    /// Total charge still in the chain.
    pub fn stored_charge(&self, stores: &SecondaryMap<NodeId, BatteryStore>) -> Fixed64 {
        self.receiver_order
            .iter()
            .filter_map(|&n| stores.get(n))
            .map(|s| s.charge)
            .fold(Fixed64::ZERO, |acc, c| acc + c)
    }
}

impl Default for BufferedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkGroup for BufferedNetwork {
    fn tag(&self) -> NetTag {
        BUFFERED
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
        self.remove_battery(node);
        self.remove_load(node);
    }

    fn absorb(&mut self, other: Box<dyn NetworkGroup>) {
        let Ok(other) = other.into_any().downcast::<BufferedNetwork>() else {
            debug_assert!(false, "buffered group absorbed a foreign flavor");
            return;
        };
        // The absorbed chain drains after the surviving one.
        self.receiver_order.extend(other.receiver_order);
        self.aggregate_load += other.aggregate_load;
        self.loads.extend(other.loads);
        self.energized &= other.energized;
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
