//! Shared helpers for grouping tests.
//!
//! Enabled for this crate's own tests and, via the `test-utils` feature,
//! for downstream crates' test suites.

use std::any::Any;

use crate::engine::GroupingEngine;
use crate::factory::GroupFactory;
use crate::group::NetworkGroup;
use crate::id::{NetTag, NodeId};

pub const TEST_TAG: NetTag = NetTag(7);

/// Minimal flavor: members only, no derived state.
#[derive(Debug)]
pub struct TestGroup {
    tag: NetTag,
    members: Vec<NodeId>,
}

impl TestGroup {
    pub fn new(tag: NetTag) -> Self {
        Self {
            tag,
            members: Vec::new(),
        }
    }
}

impl NetworkGroup for TestGroup {
    fn tag(&self) -> NetTag {
        self.tag
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
    }

    fn absorb(&mut self, _other: Box<dyn NetworkGroup>) {}

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

/// An engine with [`TEST_TAG`] and a couple of extra tags registered.
pub fn test_engine() -> GroupingEngine {
    let mut factory = GroupFactory::new();
    for tag in [TEST_TAG, NetTag(8), NetTag(9)] {
        factory
            .register(tag, move || Box::new(TestGroup::new(tag)))
            .expect("fresh factory");
    }
    GroupingEngine::new(factory)
}

/// Asserts the partition invariant: every node is assigned to exactly one
/// live group that lists it, and every group member points back.
pub fn assert_partition(engine: &GroupingEngine) {
    for (node, data) in engine.graph().nodes() {
        let gid = data
            .membership
            .group()
            .unwrap_or_else(|| panic!("node {node:?} unassigned outside a regroup window"));
        let group = engine
            .group(gid)
            .unwrap_or_else(|| panic!("node {node:?} assigned to dead group {gid:?}"));
        assert!(
            group.members().contains(&node),
            "group {gid:?} does not list its member {node:?}"
        );
        assert_eq!(group.tag(), data.tag, "tag mismatch for node {node:?}");
    }
    for gid in engine.group_ids() {
        let group = engine.group(gid).expect("active group must be live");
        assert!(!group.is_empty(), "active group {gid:?} is empty");
        for &node in group.members() {
            assert_eq!(
                engine.graph().membership(node).group(),
                Some(gid),
                "member {node:?} of {gid:?} points elsewhere"
            );
        }
    }
}
