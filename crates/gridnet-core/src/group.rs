//! The network-group trait.
//!
//! A group is the payload attached to one connected component of the device
//! graph: the mains net holds supplier and consumer registrations, the
//! buffered net holds battery drain order, a pipe net would hold gas mix.
//! The engine manipulates groups only through this trait; flavor-specific
//! state is reached by downcasting through [`NetworkGroup::as_any`].

use std::any::Any;
use std::fmt::Debug;

use crate::id::{NetTag, NodeId};

/// Flavor-specific payload of one connected component.
///
/// Implementations must keep `members()` in insertion order: power
/// distribution over a buffered net drains batteries in the order they were
/// added, and that order has to survive engine bookkeeping.
pub trait NetworkGroup: Debug {
    /// The flavor this group was created for.
    fn tag(&self) -> NetTag;

    /// Current members, in insertion order.
    fn members(&self) -> &[NodeId];

    /// Record a new member. The engine guarantees the node carries this
    /// group's tag and is not already a member.
    fn add_member(&mut self, node: NodeId);

    /// Drop a member and every piece of derived state keyed on it.
    /// Removing a non-member is a bug in the caller.
    fn remove_member(&mut self, node: NodeId);

    /// Fold another group's payload into this one. The engine has already
    /// moved the members over with [`NetworkGroup::add_member`]; this hook
    /// only migrates flavor state (supply caches, drain order, ...).
    fn absorb(&mut self, other: Box<dyn NetworkGroup>);

    fn member_count(&self) -> usize {
        self.members().len()
    }

    fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Consume the box for downcasting inside [`NetworkGroup::absorb`].
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}
