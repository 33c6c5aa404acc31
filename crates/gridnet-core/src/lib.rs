//! Gridnet Core -- the device-network grouping engine.
//!
//! Spatially-connected simulation entities (cables, terminals, batteries,
//! shielding segments) are clustered into *groups*: maintained connected
//! components of a device graph, one per network flavor. Groups are created,
//! merged, and split incrementally as devices appear, disappear, and change
//! their physical connectivity at arbitrary simulation ticks.
//!
//! # Design
//!
//! - Devices are stable [`id::NodeId`] handles into an arena; adjacency is a
//!   separate index, never an embedded pointer.
//! - Each node carries an explicit membership state machine:
//!   `Unassigned | Assigned(GroupId)`. The mid-recompute window is a typed
//!   state, not a transient null.
//! - Network flavors implement the [`group::NetworkGroup`] trait and plug in
//!   through the [`factory::GroupFactory`] tag registry; the engine never
//!   knows a concrete flavor.
//! - Splits are detected by full recomputation (flood fill), batched through
//!   the [`manager::GroupManager`] on a fixed cadence so many edits within
//!   one interval cost a single remake per dirty group.
//! - Merges happen eagerly on connect: re-point the smaller group's members
//!   and fold its payload into the larger via [`group::NetworkGroup::absorb`].
//!
//! # Key Types
//!
//! - [`engine::GroupingEngine`] -- owns the graph, the live groups, and the
//!   regroup scheduler; every structural edit goes through it.
//! - [`graph::DeviceGraph`] -- node arena plus undirected adjacency index.
//! - [`manager::GroupManager`] -- batched dirty-set scheduler with an
//!   explicit `Idle | Batching` phase type.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod engine;
pub mod factory;
pub mod fixed;
pub mod graph;
pub mod group;
pub mod id;
pub mod manager;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
