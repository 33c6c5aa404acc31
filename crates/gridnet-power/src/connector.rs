//! Read-only view of the network a device sits on.
//!
//! Every query is total: a device that is not on any network answers
//! through the explicit [`NetView::Disconnected`] variant with zeros and
//! falses, never through a panic or a null.

use gridnet_core::fixed::Fixed64;
use gridnet_core::id::NodeId;

use crate::buffered::BufferedNetwork;
use crate::mains::MainsNetwork;

/// What a device sees when it looks at "its network".
#[derive(Debug, Clone, Copy)]
pub enum NetView<'a> {
    Disconnected,
    Mains(&'a MainsNetwork),
    Buffered(&'a BufferedNetwork),
}

impl NetView<'_> {
    pub fn is_connected(&self) -> bool {
        !matches!(self, NetView::Disconnected)
    }

    /// Pooled supply rate. Zero off-mains.
    pub fn total_supply(&self) -> Fixed64 {
        match self {
            NetView::Mains(net) => net.total_supply(),
            _ => Fixed64::ZERO,
        }
    }

    pub fn consumer_count(&self) -> usize {
        match self {
            NetView::Mains(net) => net.consumer_count(),
            _ => 0,
        }
    }

    /// Batteries in the drain chain. Zero off-buffered.
    pub fn receiver_count(&self) -> usize {
        match self {
            NetView::Buffered(net) => net.receiver_count(),
            _ => 0,
        }
    }

    /// Whether the network currently meets its demand. A mains net is
    /// energized outside brownout; a disconnected device never is.
    pub fn energized(&self) -> bool {
        match self {
            NetView::Disconnected => false,
            NetView::Mains(net) => !net.in_brownout(),
            NetView::Buffered(net) => net.energized(),
        }
    }

    /// Power granted to this consumer by the last allocation. Zero for
    /// anything that is not a mains consumer.
    pub fn received_power(&self, node: NodeId) -> Fixed64 {
        match self {
            NetView::Mains(net) => net.received(node),
            _ => Fixed64::ZERO,
        }
    }
}
