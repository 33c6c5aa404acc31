//! Gridnet Power -- power distribution over grouped device networks.
//!
//! Two network flavors sit on top of the grouping engine:
//!
//! - [`mains::MainsNetwork`] ([`MAINS`]): suppliers feed a shared pool that
//!   is distributed to consumers by priority tier. A tier that cannot be
//!   fully served splits the remainder fractionally with floor rounding;
//!   lower tiers then receive nothing. Undersupply is a *brownout*.
//! - [`buffered::BufferedNetwork`] ([`BUFFERED`]): loads drain a chain of
//!   batteries in registration order. A network whose batteries cannot cover
//!   the step's demand goes de-energized.
//!
//! [`system::PowerSystem`] wires both flavors into one facade: device
//! lifecycle, per-step simulation, and read-only queries through the
//! total [`connector::NetView`] (disconnected devices answer zero, never
//! panic).
//!
//! # Design
//!
//! - All quantities are Q32.32 fixed-point and every cache is
//!   delta-maintained;
//!   the full allocation walk runs only when something changed.
//! - State transitions (brownout entered/cleared, battery bank drained/
//!   re-energized) surface as events exactly once per edge, not per step.
//! - Battery charge lives outside the group payload so it survives the
//!   discard-and-remake cycle of a topology split.

pub mod buffered;
pub mod connector;
pub mod mains;
pub mod system;

use gridnet_core::id::NetTag;

/// Tag for priority-tiered mains networks.
pub const MAINS: NetTag = NetTag(0);

/// Tag for battery-buffered networks.
pub const BUFFERED: NetTag = NetTag(1);

/// Edge of a per-network fault condition. For mains the fault is brownout;
/// for buffered networks it is loss of charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Entered,
    Cleared,
}
