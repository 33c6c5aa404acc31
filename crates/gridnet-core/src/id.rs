use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a network-capable device node in the connectivity graph.
    pub struct NodeId;

    /// Identifies a live network group (a maintained connected component).
    pub struct GroupId;
}

/// Identifies a network flavor (mains power, battery-buffered, pipes, ...).
/// Cheap to copy and compare. A group only ever contains nodes of one tag,
/// and flood fills never cross a tag boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetTag(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_tag_equality() {
        let a = NetTag(0);
        let b = NetTag(0);
        let c = NetTag(1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn net_tag_is_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(NetTag(0), "mains");
        map.insert(NetTag(1), "buffered");
        assert_eq!(map[&NetTag(0)], "mains");
    }

    #[test]
    fn node_ids_are_distinct() {
        let mut sm = slotmap::SlotMap::<NodeId, ()>::with_key();
        let a = sm.insert(());
        let b = sm.insert(());
        assert_ne!(a, b);
    }
}
