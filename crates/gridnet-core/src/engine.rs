//! The grouping engine.
//!
//! Owns the device graph, the live group payloads, the flavor factory, and
//! the regroup scheduler. All structural edits flow through it:
//!
//! - Adding a device spawns a fresh singleton group immediately.
//! - Connecting two same-tag devices in different groups merges eagerly,
//!   smaller group into larger.
//! - Disconnecting or removing a device only marks the touched group dirty;
//!   the split (if any) is discovered by flood fill at the next batched
//!   regroup.
//!
//! Callers observe structural changes through [`GroupEvent`]s appended to a
//! caller-supplied buffer, in the order they happened.

use slotmap::SlotMap;
use std::collections::{BTreeSet, VecDeque};

use crate::factory::{FactoryError, GroupFactory};
use crate::fixed::Fixed64;
use crate::graph::{DeviceGraph, Membership};
use crate::group::NetworkGroup;
use crate::id::{GroupId, NetTag, NodeId};
use crate::manager::GroupManager;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Structural changes, emitted in occurrence order.
///
/// `NodeAssigned` fires whenever a node lands in a *newly created* group
/// (singleton spawn or post-split remake). Merges move members wholesale and
/// fire a single `GroupAbsorbed` instead; the surviving group's payload
/// already carries every registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEvent {
    GroupFormed { group: GroupId, tag: NetTag },
    GroupDiscarded { group: GroupId },
    GroupAbsorbed { into: GroupId, from: GroupId },
    NodeAssigned { node: NodeId, group: GroupId },
    NodeDetached { node: NodeId },
}

// ---------------------------------------------------------------------------
// GroupingEngine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GroupingEngine {
    graph: DeviceGraph,
    groups: SlotMap<GroupId, Box<dyn NetworkGroup>>,
    factory: GroupFactory,
    manager: GroupManager,
}

impl GroupingEngine {
    pub fn new(factory: GroupFactory) -> Self {
        Self {
            graph: DeviceGraph::new(),
            groups: SlotMap::with_key(),
            factory,
            manager: GroupManager::new(),
        }
    }

    // -- structural edits ---------------------------------------------------

    /// Insert a device and spawn its singleton group.
    ///
    /// The flavor constructor runs before the graph is touched, so an
    /// unregistered tag leaves the engine unchanged.
    pub fn add_device(
        &mut self,
        tag: NetTag,
        events: &mut Vec<GroupEvent>,
    ) -> Result<NodeId, FactoryError> {
        let mut group = self.factory.create(tag)?;
        let node = self.graph.add_node(tag);
        group.add_member(node);
        let gid = self.groups.insert(group);
        self.graph.set_membership(node, Membership::Assigned(gid));
        self.manager.add_group(gid);
        events.push(GroupEvent::GroupFormed { group: gid, tag });
        events.push(GroupEvent::NodeAssigned { node, group: gid });
        Ok(node)
    }

    /// Record an edge between two devices. Same-tag devices in different
    /// groups merge immediately; cross-tag edges only update adjacency.
    pub fn connect(&mut self, a: NodeId, b: NodeId, events: &mut Vec<GroupEvent>) {
        if !self.graph.contains(a) || !self.graph.contains(b) || a == b {
            return;
        }
        self.graph.connect(a, b);
        if self.graph.tag(a) != self.graph.tag(b) {
            return;
        }
        let (Some(ga), Some(gb)) = (
            self.graph.membership(a).group(),
            self.graph.membership(b).group(),
        ) else {
            return;
        };
        if ga == gb {
            return;
        }
        // Larger group survives so fewer memberships get rewritten.
        let (dst, src) = if self.groups[ga].member_count() >= self.groups[gb].member_count() {
            (ga, gb)
        } else {
            (gb, ga)
        };
        self.combine_groups(dst, src, events);
    }

    /// Remove an edge. Both endpoint groups are marked dirty; whether the
    /// component actually split is decided at the next batched regroup.
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) {
        self.graph.disconnect(a, b);
        if let Some(g) = self.graph.membership(a).group() {
            self.manager.mark_dirty(g);
        }
        if let Some(g) = self.graph.membership(b).group() {
            self.manager.mark_dirty(g);
        }
    }

    /// Remove a device entirely. Its group sheds the member and, if anything
    /// remains, gets remade later; an emptied group is discarded now.
    pub fn remove_device(&mut self, node: NodeId, events: &mut Vec<GroupEvent>) {
        if !self.graph.contains(node) {
            return;
        }
        if let Some(gid) = self.graph.membership(node).group() {
            let group = &mut self.groups[gid];
            group.remove_member(node);
            events.push(GroupEvent::NodeDetached { node });
            if group.is_empty() {
                self.groups.remove(gid);
                self.manager.remove_group(gid);
                events.push(GroupEvent::GroupDiscarded { group: gid });
            } else {
                self.manager.mark_dirty(gid);
            }
        }
        self.graph.remove_node(node);
    }

    // -- merging ------------------------------------------------------------

    /// Merge `src` into `dst`: re-point memberships, move members, fold the
    /// payload. Merging a group into itself is a caller bug and a no-op.
    fn combine_groups(&mut self, dst: GroupId, src: GroupId, events: &mut Vec<GroupEvent>) {
        if dst == src {
            debug_assert!(false, "combine_groups with identical groups");
            return;
        }
        let Some(src_group) = self.groups.remove(src) else {
            debug_assert!(false, "combine_groups with dead source");
            return;
        };
        for &node in src_group.members() {
            self.graph.set_membership(node, Membership::Assigned(dst));
            self.groups[dst].add_member(node);
        }
        self.groups[dst].absorb(src_group);
        self.manager.remove_group(src);
        events.push(GroupEvent::GroupAbsorbed {
            into: dst,
            from: src,
        });
    }

    // -- regrouping ---------------------------------------------------------

    /// Advance the regroup clock; when an interval elapses, drain the dirty
    /// set and remake each group once. Returns the events in order.
    pub fn tick(&mut self, dt: Fixed64) -> Vec<GroupEvent> {
        let mut events = Vec::new();
        if !self.manager.advance(dt) {
            return events;
        }
        let dirty = self.manager.begin_batch();
        for gid in dirty {
            // A dirty group can have been absorbed since it was marked.
            if self.groups.contains_key(gid) {
                self.remake_group(gid, &mut events);
            }
        }
        self.manager.end_batch();
        events
    }

    /// Discard a group and re-derive its components by flood fill.
    ///
    /// Every former member goes `Unassigned`, then each still-unassigned
    /// seed (in the group's insertion order) grows a new group over the
    /// same-tag nodes reachable from it.
    fn remake_group(&mut self, gid: GroupId, events: &mut Vec<GroupEvent>) {
        let Some(old) = self.groups.remove(gid) else {
            return;
        };
        self.manager.remove_group(gid);
        events.push(GroupEvent::GroupDiscarded { group: gid });

        let tag = old.tag();
        let members: Vec<NodeId> = old.members().to_vec();
        for &node in &members {
            self.graph.set_membership(node, Membership::Unassigned);
        }

        for &seed in &members {
            if !self.graph.contains(seed) || self.graph.membership(seed).group().is_some() {
                continue;
            }
            let component = self.flood_fill(seed, tag);
            let Ok(group) = self.factory.create(tag) else {
                debug_assert!(false, "tag lost its constructor after group creation");
                continue;
            };
            let new_gid = self.groups.insert(group);
            events.push(GroupEvent::GroupFormed {
                group: new_gid,
                tag,
            });
            for &node in &component {
                self.groups[new_gid].add_member(node);
                self.graph
                    .set_membership(node, Membership::Assigned(new_gid));
                events.push(GroupEvent::NodeAssigned {
                    node,
                    group: new_gid,
                });
            }
            self.manager.add_group(new_gid);
        }
    }

    /// Breadth-first walk over same-tag, currently-unassigned nodes.
    fn flood_fill(&self, seed: NodeId, tag: NetTag) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([seed]);
        let mut component = Vec::new();
        seen.insert(seed);
        while let Some(node) = queue.pop_front() {
            component.push(node);
            for &next in self.graph.neighbors(node) {
                if seen.contains(&next) {
                    continue;
                }
                if self.graph.tag(next) != Some(tag) {
                    continue;
                }
                if self.graph.membership(next).group().is_some() {
                    continue;
                }
                seen.insert(next);
                queue.push_back(next);
            }
        }
        component
    }

    // -- accessors ----------------------------------------------------------

    pub fn graph(&self) -> &DeviceGraph {
        &self.graph
    }

    pub fn group(&self, id: GroupId) -> Option<&dyn NetworkGroup> {
        self.groups.get(id).map(|b| b.as_ref())
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Box<dyn NetworkGroup>> {
        self.groups.get_mut(id)
    }

    /// The group a node currently belongs to, if assigned.
    pub fn group_of(&self, node: NodeId) -> Option<GroupId> {
        self.graph.membership(node).group()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.manager.active_groups().collect()
    }

    pub fn manager(&self) -> &GroupManager {
        &self.manager
    }

    pub fn mark_dirty(&mut self, group: GroupId) {
        self.manager.mark_dirty(group);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
