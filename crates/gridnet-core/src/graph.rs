//! Device connectivity graph.
//!
//! # Design
//!
//! - Nodes live in a [`SlotMap`] arena keyed by [`NodeId`]; removal never
//!   invalidates other handles.
//! - Undirected adjacency is a [`SecondaryMap`] of neighbor lists kept
//!   separate from node payloads, so edge edits never touch node data.
//! - Each node records its [`NetTag`] (fixed at insertion) and its current
//!   [`Membership`]. The graph itself knows nothing about groups; the engine
//!   drives membership transitions.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

use crate::id::{GroupId, NetTag, NodeId};

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Which group a node currently belongs to.
///
/// `Unassigned` is a legal, observable state: freshly inserted nodes and
/// nodes inside a regroup window sit here until the engine assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Membership {
    #[default]
    Unassigned,
    Assigned(GroupId),
}

impl Membership {
    /// The assigned group, if any.
    pub fn group(self) -> Option<GroupId> {
        match self {
            Membership::Unassigned => None,
            Membership::Assigned(g) => Some(g),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceGraph
// ---------------------------------------------------------------------------

/// Per-node record stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub tag: NetTag,
    pub membership: Membership,
}

/// Node arena plus undirected adjacency index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceGraph {
    nodes: SlotMap<NodeId, NodeData>,
    adjacency: SecondaryMap<NodeId, Vec<NodeId>>,
}

impl DeviceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node with the given tag, initially unassigned.
    pub fn add_node(&mut self, tag: NetTag) -> NodeId {
        let id = self.nodes.insert(NodeData {
            tag,
            membership: Membership::Unassigned,
        });
        self.adjacency.insert(id, Vec::new());
        id
    }

    /// Remove a node and every edge touching it. Removing an absent node is
    /// a no-op.
    pub fn remove_node(&mut self, node: NodeId) {
        if self.nodes.remove(node).is_none() {
            return;
        }
        if let Some(neighbors) = self.adjacency.remove(node) {
            for n in neighbors {
                if let Some(list) = self.adjacency.get_mut(n) {
                    list.retain(|&x| x != node);
                }
            }
        }
    }

    /// Add an undirected edge. Self-edges, duplicate edges, and edges to
    /// absent nodes are ignored.
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        if a == b || !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return;
        }
        let list_a = &mut self.adjacency[a];
        if list_a.contains(&b) {
            return;
        }
        list_a.push(b);
        self.adjacency[b].push(a);
    }

    /// Remove an undirected edge. Removing an absent edge is a no-op.
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) {
        if let Some(list) = self.adjacency.get_mut(a) {
            list.retain(|&x| x != b);
        }
        if let Some(list) = self.adjacency.get_mut(b) {
            list.retain(|&x| x != a);
        }
    }

    /// Neighbors of a node. Absent nodes have no neighbors.
    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tag(&self, node: NodeId) -> Option<NetTag> {
        self.nodes.get(node).map(|d| d.tag)
    }

    pub fn membership(&self, node: NodeId) -> Membership {
        self.nodes
            .get(node)
            .map(|d| d.membership)
            .unwrap_or(Membership::Unassigned)
    }

    /// Set a node's membership. Setting on an absent node is a no-op.
    pub fn set_membership(&mut self, node: NodeId, membership: Membership) {
        if let Some(data) = self.nodes.get_mut(node) {
            data.membership = membership;
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate all live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.nodes.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
