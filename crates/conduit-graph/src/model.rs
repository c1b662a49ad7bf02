use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use conduit_lattice::BlockPos;

use crate::algebra::Component;
use crate::error::NetworkError;

// ─────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        ///
        /// Ids are allocated from a monotonic per-owner counter, so a given
        /// event sequence produces the same ids on every run.
        #[repr(transparent)]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub(crate) u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_newtype!(
    /// Opaque identifier of a [`Node`] within its network.
    NodeId,
    "n"
);
id_newtype!(
    /// Opaque identifier of an [`Edge`] within its network.
    EdgeId,
    "e"
);
id_newtype!(
    /// Opaque identifier of a network within its manager.
    NetworkId,
    "net"
);

/// Monotonic id source shared by all three id kinds.
#[derive(Debug, Default, Clone)]
pub(crate) struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub(crate) fn next_raw(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

// ─────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────

/// A graph vertex covering one or more mutually adjacent block positions.
///
/// Most nodes cover a single position (junctions, endpoints, machines);
/// extendable positions fuse into multi-position nodes. A node carries
/// exactly one component for all its positions and an unordered set of
/// incident edges; its degree is the size of that set.
#[derive(Debug, Clone)]
pub struct Node<C> {
    id: NodeId,
    pub(crate) block_positions: BTreeSet<BlockPos>,
    pub(crate) component: C,
    pub(crate) edges: BTreeSet<EdgeId>,
}

impl<C: Component> Node<C> {
    pub(crate) fn singleton(id: NodeId, pos: BlockPos, component: C) -> Self {
        let mut block_positions = BTreeSet::new();
        block_positions.insert(pos);
        Self { id, block_positions, component, edges: BTreeSet::new() }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The positions this node covers. Never empty.
    pub fn block_positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.block_positions.iter().copied()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.block_positions.contains(&pos)
    }

    /// The aggregate component for every position of this node.
    pub fn component(&self) -> &C {
        &self.component
    }

    /// Ids of the incident edges.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().copied()
    }

    /// Number of incident edges.
    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    /// Any one position of the node (the smallest, for determinism).
    pub(crate) fn representative(&self) -> BlockPos {
        *self.block_positions.iter().next().expect("node covers at least one position")
    }
}

// ─────────────────────────────────────────────
// Edge
// ─────────────────────────────────────────────

/// A compressed pass-through run connecting two (not necessarily distinct)
/// nodes.
///
/// `start_pos`/`end_pos` are the node-side anchor positions: each belongs to
/// its endpoint node and is lattice-adjacent to the first/last intermediate
/// block (or to the other anchor when `intermediate_blocks` is empty — a
/// *direct link*). The edge's component aggregates the intermediates only;
/// node positions are counted by their nodes.
#[derive(Debug, Clone)]
pub struct Edge<C> {
    id: EdgeId,
    pub(crate) start: NodeId,
    pub(crate) end: NodeId,
    pub(crate) start_pos: BlockPos,
    pub(crate) end_pos: BlockPos,
    pub(crate) intermediate_blocks: Vec<BlockPos>,
    pub(crate) component: C,
}

impl<C: Component> Edge<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: EdgeId,
        start: NodeId,
        start_pos: BlockPos,
        end: NodeId,
        end_pos: BlockPos,
        intermediate_blocks: Vec<BlockPos>,
        component: C,
    ) -> Self {
        Self { id, start, end, start_pos, end_pos, intermediate_blocks, component }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }

    pub fn start_pos(&self) -> BlockPos {
        self.start_pos
    }

    pub fn end_pos(&self) -> BlockPos {
        self.end_pos
    }

    /// The ordered run of positions strictly between the endpoints.
    pub fn intermediate_blocks(&self) -> &[BlockPos] {
        &self.intermediate_blocks
    }

    /// The aggregate component of the edge's own blocks.
    pub fn component(&self) -> &C {
        &self.component
    }

    /// Edge length in block-to-block segments.
    pub fn length(&self) -> usize {
        self.intermediate_blocks.len() + 1
    }

    /// True for an edge whose two endpoints are the same node.
    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }

    /// True for an edge with no intermediate blocks.
    pub fn is_direct_link(&self) -> bool {
        self.intermediate_blocks.is_empty()
    }

    /// The endpoint opposite `node`.
    ///
    /// For a loop edge both endpoints are `node` and it is returned back.
    pub fn opposite(&self, node: NodeId) -> Result<NodeId, NetworkError> {
        if node == self.start {
            Ok(self.end)
        } else if node == self.end {
            Ok(self.start)
        } else {
            Err(NetworkError::NotAnEndpoint { edge: self.id, node })
        }
    }

    /// The anchor position on `node`'s side.
    pub(crate) fn anchor_at(&self, node: NodeId) -> BlockPos {
        if node == self.start {
            self.start_pos
        } else {
            self.end_pos
        }
    }

    /// Intermediates ordered so the walk leaves `from` and arrives at the
    /// opposite endpoint. For a loop edge `from_anchor` disambiguates which
    /// end to leave by.
    pub(crate) fn path_from(&self, from: NodeId, from_anchor: BlockPos) -> Vec<BlockPos> {
        let leaves_start =
            if self.is_loop() { self.start_pos == from_anchor } else { from == self.start };
        if leaves_start {
            self.intermediate_blocks.clone()
        } else {
            self.intermediate_blocks.iter().rev().copied().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::BlockCount;

    fn p(x: i32) -> BlockPos {
        BlockPos::new(x, 0, 0)
    }

    #[test]
    fn id_display_is_prefixed() {
        assert_eq!(NodeId(3).to_string(), "n3");
        assert_eq!(EdgeId(0).to_string(), "e0");
        assert_eq!(NetworkId(12).to_string(), "net12");
    }

    #[test]
    fn allocator_is_monotonic() {
        let mut alloc = IdAllocator::default();
        assert_eq!(alloc.next_raw(), 0);
        assert_eq!(alloc.next_raw(), 1);
        assert_eq!(alloc.next_raw(), 2);
    }

    #[test]
    fn edge_length_counts_segments() {
        let e = Edge::new(
            EdgeId(0),
            NodeId(0),
            p(0),
            NodeId(1),
            p(3),
            vec![p(1), p(2)],
            BlockCount(2),
        );
        assert_eq!(e.length(), 3);
        assert!(!e.is_direct_link());
        assert!(!e.is_loop());
    }

    #[test]
    fn opposite_rejects_strangers() {
        let e = Edge::new(EdgeId(0), NodeId(0), p(0), NodeId(1), p(1), vec![], BlockCount(0));
        assert_eq!(e.opposite(NodeId(0)).unwrap(), NodeId(1));
        assert_eq!(e.opposite(NodeId(1)).unwrap(), NodeId(0));
        assert!(e.opposite(NodeId(9)).is_err());
    }

    #[test]
    fn path_from_orients_by_endpoint() {
        let e = Edge::new(
            EdgeId(0),
            NodeId(0),
            p(0),
            NodeId(1),
            p(3),
            vec![p(1), p(2)],
            BlockCount(2),
        );
        assert_eq!(e.path_from(NodeId(0), p(0)), vec![p(1), p(2)]);
        assert_eq!(e.path_from(NodeId(1), p(3)), vec![p(2), p(1)]);
    }

    #[test]
    fn loop_path_is_oriented_by_anchor() {
        // loop on node 0 anchored at (0) and (3): 0 -> 1 -> 2 -> 3
        let e = Edge::new(
            EdgeId(0),
            NodeId(0),
            p(0),
            NodeId(0),
            p(3),
            vec![p(1), p(2)],
            BlockCount(2),
        );
        assert!(e.is_loop());
        assert_eq!(e.path_from(NodeId(0), p(0)), vec![p(1), p(2)]);
        assert_eq!(e.path_from(NodeId(0), p(3)), vec![p(2), p(1)]);
    }
}
