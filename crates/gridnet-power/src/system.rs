//! The power subsystem facade.
//!
//! Owns a [`GroupingEngine`] with the two power flavors registered, a role
//! table, and the battery charge stores. Device lifecycle goes in the top,
//! [`PowerEvent`]s come out of [`PowerSystem::update`], and read queries go
//! through the total [`NetView`].
//!
//! # Design
//!
//! - Roles live in a [`SecondaryMap`] beside the graph. When regrouping
//!   hands a node to a freshly made group, the role table tells us which
//!   registrations to replay into the new payload. Merges move payloads
//!   wholesale and need no replay.
//! - Battery charge is keyed by node here, not stored in groups, so a
//!   split or merge never creates or destroys energy.

use slotmap::SecondaryMap;

use gridnet_core::engine::{GroupEvent, GroupingEngine};
use gridnet_core::factory::{FactoryError, GroupFactory};
use gridnet_core::fixed::{Fixed64, Ticks};
use gridnet_core::id::{GroupId, NetTag, NodeId};

use crate::buffered::{BatteryStore, BufferedNetwork};
use crate::connector::NetView;
use crate::mains::{MainsNetwork, Priority};
use crate::{Transition, BUFFERED, MAINS};

// ---------------------------------------------------------------------------
// Roles and events
// ---------------------------------------------------------------------------

/// What a device does on its network. Fixed at insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Pure connectivity on a mains net.
    Wire,
    /// Feeds the mains pool.
    Supplier { rate: Fixed64 },
    /// Draws from the mains pool at a priority tier.
    Consumer { draw: Fixed64, priority: Priority },
    /// Charge storage on a buffered net.
    Battery { charge: Fixed64, capacity: Fixed64 },
    /// Draws from the battery chain.
    Load { draw: Fixed64 },
}

impl DeviceRole {
    /// The network flavor this role belongs on.
    pub fn tag(&self) -> NetTag {
        match self {
            DeviceRole::Wire | DeviceRole::Supplier { .. } | DeviceRole::Consumer { .. } => MAINS,
            DeviceRole::Battery { .. } | DeviceRole::Load { .. } => BUFFERED,
        }
    }
}

/// Per-network fault edges, stamped with the step they occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// A mains net can no longer serve all demand.
    Brownout {
        group: GroupId,
        deficit: Fixed64,
        tick: Ticks,
    },
    /// A mains net serves all demand again.
    Restored { group: GroupId, tick: Ticks },
    /// A buffered net's chain failed to cover a step.
    Drained { group: GroupId, tick: Ticks },
    /// A buffered net's chain covers its demand again.
    Energized { group: GroupId, tick: Ticks },
}

// ---------------------------------------------------------------------------
// PowerSystem
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PowerSystem {
    engine: GroupingEngine,
    roles: SecondaryMap<NodeId, DeviceRole>,
    batteries: SecondaryMap<NodeId, BatteryStore>,
    tick: Ticks,
}

impl PowerSystem {
    pub fn new() -> Self {
        let mut factory = GroupFactory::new();
        factory
            .register(MAINS, || Box::new(MainsNetwork::new()))
            .expect("mains tag registers once");
        factory
            .register(BUFFERED, || Box::new(BufferedNetwork::new()))
            .expect("buffered tag registers once");
        Self {
            engine: GroupingEngine::new(factory),
            roles: SecondaryMap::new(),
            batteries: SecondaryMap::new(),
            tick: 0,
        }
    }

    // -- device lifecycle ---------------------------------------------------

    /// Insert a device. The role decides the network flavor; the device
    /// starts on its own singleton network until connected.
    pub fn add_device(&mut self, role: DeviceRole) -> Result<NodeId, FactoryError> {
        let mut events = Vec::new();
        let node = self.engine.add_device(role.tag(), &mut events)?;
        self.roles.insert(node, role);
        if let DeviceRole::Battery { charge, capacity } = role {
            self.batteries.insert(node, BatteryStore::new(charge, capacity));
        }
        self.apply_group_events(&events);
        Ok(node)
    }

    /// Remove a device and every registration it holds.
    pub fn remove_device(&mut self, node: NodeId) {
        let mut events = Vec::new();
        self.engine.remove_device(node, &mut events);
        self.roles.remove(node);
        self.batteries.remove(node);
    }

    /// Connect two devices. Same-flavor devices merge networks immediately.
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        let mut events = Vec::new();
        self.engine.connect(a, b, &mut events);
        self.apply_group_events(&events);
    }

    /// Disconnect two devices. A resulting split becomes visible at the
    /// next update that crosses the regroup interval.
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) {
        self.engine.disconnect(a, b);
    }

    // -- live parameter changes ---------------------------------------------

    /// Change a supplier's output rate.
    pub fn update_supplier_rate(&mut self, node: NodeId, rate: Fixed64) {
        let Some(DeviceRole::Supplier { rate: stored }) = self.roles.get_mut(node) else {
            debug_assert!(false, "rate update on a non-supplier");
            return;
        };
        *stored = rate;
        if let Some(net) = self.mains_of_mut(node) {
            net.update_supplier(node, rate);
        }
    }

    /// Change a consumer's draw.
    pub fn update_consumer_draw(&mut self, node: NodeId, draw: Fixed64) {
        let Some(DeviceRole::Consumer { draw: stored, .. }) = self.roles.get_mut(node) else {
            debug_assert!(false, "draw update on a non-consumer");
            return;
        };
        *stored = draw;
        if let Some(net) = self.mains_of_mut(node) {
            net.update_consumer_draw(node, draw);
        }
    }

    /// Move a consumer to another priority tier.
    pub fn update_consumer_priority(&mut self, node: NodeId, priority: Priority) {
        let Some(DeviceRole::Consumer {
            priority: stored, ..
        }) = self.roles.get_mut(node)
        else {
            debug_assert!(false, "priority update on a non-consumer");
            return;
        };
        *stored = priority;
        if let Some(net) = self.mains_of_mut(node) {
            net.update_consumer_priority(node, priority);
        }
    }

    /// Change a buffered load's draw.
    pub fn update_load(&mut self, node: NodeId, draw: Fixed64) {
        let Some(DeviceRole::Load { draw: stored }) = self.roles.get_mut(node) else {
            debug_assert!(false, "load update on a non-load");
            return;
        };
        *stored = draw;
        if let Some(net) = self.buffered_of_mut(node) {
            net.update_load(node, draw);
        }
    }

    // -- simulation ---------------------------------------------------------

    /// Advance one step: run any due regroup, replay roles into remade
    /// groups, then simulate every power network. Returns fault edges.
    pub fn update(&mut self, dt: Fixed64) -> Vec<PowerEvent> {
        self.tick += 1;
        let group_events = self.engine.tick(dt);
        self.apply_group_events(&group_events);

        let mut events = Vec::new();
        for gid in self.engine.group_ids() {
            let Some(group) = self.engine.group_mut(gid) else {
                continue;
            };
            if let Some(mains) = group.as_any_mut().downcast_mut::<MainsNetwork>() {
                match mains.recompute_allocations() {
                    Some(Transition::Entered) => events.push(PowerEvent::Brownout {
                        group: gid,
                        deficit: mains.deficit(),
                        tick: self.tick,
                    }),
                    Some(Transition::Cleared) => events.push(PowerEvent::Restored {
                        group: gid,
                        tick: self.tick,
                    }),
                    None => {}
                }
            } else if let Some(buffered) = group.as_any_mut().downcast_mut::<BufferedNetwork>() {
                match buffered.tick(dt, &mut self.batteries) {
                    Some(Transition::Entered) => events.push(PowerEvent::Drained {
                        group: gid,
                        tick: self.tick,
                    }),
                    Some(Transition::Cleared) => events.push(PowerEvent::Energized {
                        group: gid,
                        tick: self.tick,
                    }),
                    None => {}
                }
            }
        }
        events
    }

    /// Replay device roles into freshly made groups. Only `NodeAssigned`
    /// matters here: merges keep the surviving payload, and detached nodes
    /// are handled by the groups themselves.
    fn apply_group_events(&mut self, events: &[GroupEvent]) {
        for event in events {
            let &GroupEvent::NodeAssigned { node, group } = event else {
                continue;
            };
            let Some(&role) = self.roles.get(node) else {
                debug_assert!(false, "assigned node has no role");
                continue;
            };
            let Some(payload) = self.engine.group_mut(group) else {
                continue;
            };
            match role {
                DeviceRole::Wire => {}
                DeviceRole::Supplier { rate } => {
                    if let Some(net) = payload.as_any_mut().downcast_mut::<MainsNetwork>() {
                        net.add_supplier(node, rate);
                    }
                }
                DeviceRole::Consumer { draw, priority } => {
                    if let Some(net) = payload.as_any_mut().downcast_mut::<MainsNetwork>() {
                        net.add_consumer(node, draw, priority);
                    }
                }
                DeviceRole::Battery { .. } => {
                    if let Some(net) = payload.as_any_mut().downcast_mut::<BufferedNetwork>() {
                        net.add_battery(node);
                    }
                }
                DeviceRole::Load { draw } => {
                    if let Some(net) = payload.as_any_mut().downcast_mut::<BufferedNetwork>() {
                        net.add_load(node, draw);
                    }
                }
            }
        }
    }

    /// Push charge into the battery chain of the network `node` sits on.
    /// Returns the amount the chain accepted; zero off-buffered.
    pub fn charge_network(&mut self, node: NodeId, amount: Fixed64) -> Fixed64 {
        let Some(gid) = self.engine.group_of(node) else {
            return Fixed64::ZERO;
        };
        let Some(group) = self.engine.group_mut(gid) else {
            return Fixed64::ZERO;
        };
        match group.as_any_mut().downcast_mut::<BufferedNetwork>() {
            Some(net) => net.charge(amount, &mut self.batteries),
            None => Fixed64::ZERO,
        }
    }

    // -- queries ------------------------------------------------------------

    /// The network a device sits on. Total: never panics, never null.
    pub fn network(&self, node: NodeId) -> NetView<'_> {
        let Some(gid) = self.engine.group_of(node) else {
            return NetView::Disconnected;
        };
        let Some(group) = self.engine.group(gid) else {
            return NetView::Disconnected;
        };
        if let Some(mains) = group.as_any().downcast_ref::<MainsNetwork>() {
            NetView::Mains(mains)
        } else if let Some(buffered) = group.as_any().downcast_ref::<BufferedNetwork>() {
            NetView::Buffered(buffered)
        } else {
            NetView::Disconnected
        }
    }

    /// Power granted to a consumer as of the last update.
    pub fn received_power(&self, node: NodeId) -> Fixed64 {
        self.network(node).received_power(node)
    }

    pub fn energized(&self, node: NodeId) -> bool {
        self.network(node).energized()
    }

    /// Remaining charge of a battery device. Zero for non-batteries.
    pub fn battery_charge(&self, node: NodeId) -> Fixed64 {
        self.batteries
            .get(node)
            .map(|s| s.charge)
            .unwrap_or(Fixed64::ZERO)
    }

    pub fn role(&self, node: NodeId) -> Option<DeviceRole> {
        self.roles.get(node).copied()
    }

    pub fn engine(&self) -> &GroupingEngine {
        &self.engine
    }

    // -- helpers ------------------------------------------------------------

    fn mains_of_mut(&mut self, node: NodeId) -> Option<&mut MainsNetwork> {
        let gid = self.engine.group_of(node)?;
        self.engine
            .group_mut(gid)?
            .as_any_mut()
            .downcast_mut::<MainsNetwork>()
    }

    fn buffered_of_mut(&mut self, node: NodeId) -> Option<&mut BufferedNetwork> {
        let gid = self.engine.group_of(node)?;
        self.engine
            .group_mut(gid)?
            .as_any_mut()
            .downcast_mut::<BufferedNetwork>()
    }
}

impl Default for PowerSystem {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
