use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use conduit_lattice::BlockPos;

use crate::algebra::Component;
use crate::error::NetworkError;
use crate::model::{Edge, EdgeId, IdAllocator, NetworkId, Node, NodeId};
use crate::rules::NetworkRules;

// ─────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────

/// One maximal connected component of network blocks, compressed into a
/// graph of nodes and multi-block edges.
///
/// Junctions, endpoints, and always-node positions become [`Node`]s; linear
/// pass-through runs between them collapse into single [`Edge`]s. Every
/// single-block placement or removal updates the graph incrementally and
/// leaves it indistinguishable (up to element identity) from a
/// [`rebuild`](Network::rebuild) over the same component map.
///
/// Networks are owned and created by the
/// [`NetworkManager`](crate::manager::NetworkManager); callers receive
/// shared references through its lookup API and the hook callbacks.
pub struct Network<C: Component> {
    id: NetworkId,
    rules: Arc<dyn NetworkRules>,

    /// Every member position → its raw per-block component record.
    /// Node-covered positions carry their node's aggregate (rewritten on
    /// merge and detach); intermediates keep their placement-time value.
    component_map: HashMap<BlockPos, C>,

    nodes: BTreeMap<NodeId, Node<C>>,
    edges: BTreeMap<EdgeId, Edge<C>>,

    /// Node block position → owning node.
    node_map: HashMap<BlockPos, NodeId>,
    /// Intermediate block position → owning edge.
    edge_block_map: HashMap<BlockPos, EdgeId>,

    ids: IdAllocator,
}

impl<C: Component> Network<C> {
    pub(crate) fn new(id: NetworkId, rules: Arc<dyn NetworkRules>) -> Self {
        Self {
            id,
            rules,
            component_map: HashMap::new(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            node_map: HashMap::new(),
            edge_block_map: HashMap::new(),
            ids: IdAllocator::default(),
        }
    }

    // ── Read surface ───────────────────────────────────

    pub fn id(&self) -> NetworkId {
        self.id
    }

    /// Number of member block positions.
    pub fn size(&self) -> usize {
        self.component_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_map.is_empty()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.component_map.contains_key(&pos)
    }

    /// All member positions, in unspecified order.
    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.component_map.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<C>> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge<C>> {
        self.edges.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node<C>> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge<C>> {
        self.edges.get(&id)
    }

    /// The node covering `pos`, if `pos` is a node position.
    pub fn node_at(&self, pos: BlockPos) -> Option<&Node<C>> {
        self.nodes.get(self.node_map.get(&pos)?)
    }

    /// The edge owning `pos` as an intermediate block.
    pub fn edge_at(&self, pos: BlockPos) -> Option<&Edge<C>> {
        self.edges.get(self.edge_block_map.get(&pos)?)
    }

    pub fn is_node(&self, pos: BlockPos) -> bool {
        self.node_map.contains_key(&pos)
    }

    /// The raw per-block component record at `pos`.
    pub fn component_at(&self, pos: BlockPos) -> Option<&C> {
        self.component_map.get(&pos)
    }

    /// In-network neighbors of `pos` read off the graph structure, O(degree).
    ///
    /// Same set as [`calculate_network_neighbors`](Self::calculate_network_neighbors)
    /// on a consistent graph, but usable without walking the lattice; layers
    /// built on top (e.g. a dynamics engine) use this for propagation.
    pub fn network_neighbors(&self, pos: BlockPos) -> Vec<BlockPos> {
        if let Some(&nid) = self.node_map.get(&pos) {
            let Some(node) = self.nodes.get(&nid) else {
                return Vec::new();
            };
            let mut out: Vec<BlockPos> = pos
                .neighbors()
                .into_iter()
                .filter(|q| node.block_positions.contains(q) && self.rules.are_connected(pos, *q))
                .collect();
            for eid in node.edge_ids() {
                let Some(e) = self.edges.get(&eid) else {
                    continue;
                };
                if e.start == nid && e.start_pos == pos {
                    out.push(e.intermediate_blocks.first().copied().unwrap_or(e.end_pos));
                }
                if e.end == nid && e.end_pos == pos {
                    out.push(e.intermediate_blocks.last().copied().unwrap_or(e.start_pos));
                }
            }
            out
        } else if let Some(&eid) = self.edge_block_map.get(&pos) {
            let Some(e) = self.edges.get(&eid) else {
                return Vec::new();
            };
            let Some(i) = e.intermediate_blocks.iter().position(|&b| b == pos) else {
                return Vec::new();
            };
            let prev = if i == 0 { e.start_pos } else { e.intermediate_blocks[i - 1] };
            let next = if i + 1 == e.intermediate_blocks.len() {
                e.end_pos
            } else {
                e.intermediate_blocks[i + 1]
            };
            vec![prev, next]
        } else {
            Vec::new()
        }
    }

    /// Partition the member positions into lattice-connected components.
    ///
    /// A single-block removal can disconnect a network without the engine
    /// noticing; callers use this to decide whether a
    /// [`recalculate_networks`](crate::manager::NetworkManager::recalculate_networks)
    /// is due.
    pub fn connected_components(&self) -> Vec<Vec<BlockPos>> {
        let mut seeds: Vec<BlockPos> = self.component_map.keys().copied().collect();
        seeds.sort();

        let mut visited: HashSet<BlockPos> = HashSet::new();
        let mut out = Vec::new();
        for seed in seeds {
            if visited.contains(&seed) {
                continue;
            }
            let mut comp = vec![seed];
            visited.insert(seed);
            let mut queue = VecDeque::from([seed]);
            while let Some(p) = queue.pop_front() {
                for q in p.neighbors() {
                    if self.component_map.contains_key(&q)
                        && !visited.contains(&q)
                        && self.rules.are_connected(p, q)
                    {
                        visited.insert(q);
                        comp.push(q);
                        queue.push_back(q);
                    }
                }
            }
            comp.sort();
            out.push(comp);
        }
        out
    }

    // ── Lattice-walk read surface ──────────────────────

    /// In-network neighbors of `pos` computed from the lattice and the
    /// component map alone. Safe while the graph is mid-mutation.
    pub(crate) fn calculate_network_neighbors(&self, pos: BlockPos) -> Vec<BlockPos> {
        pos.neighbors()
            .into_iter()
            .filter(|&q| self.component_map.contains_key(&q) && self.rules.are_connected(pos, q))
            .collect()
    }

    /// Must `pos` be represented as a node?
    pub(crate) fn should_be_node(&self, pos: BlockPos) -> bool {
        self.rules.is_always_node(pos) || self.calculate_network_neighbors(pos).len() != 2
    }

    /// Like [`should_be_node`](Self::should_be_node), with `neighbors`
    /// already computed, and additionally forcing node status for an
    /// extendable position next to another extendable one — such pairs must
    /// fuse into one node regardless of degree.
    fn wants_node(&self, pos: BlockPos, neighbors: &[BlockPos]) -> bool {
        self.rules.is_always_node(pos)
            || neighbors.len() != 2
            || (self.rules.is_extendable_node(pos)
                && neighbors.iter().any(|&q| self.rules.is_extendable_node(q)))
    }

    // ── Raw component-map access (registry plumbing) ───

    pub(crate) fn raw_components(&self) -> &HashMap<BlockPos, C> {
        &self.component_map
    }

    /// Insert a raw component record without touching the graph. The caller
    /// owns the follow-up [`rebuild`](Self::rebuild).
    pub(crate) fn insert_raw(&mut self, pos: BlockPos, component: C) {
        self.component_map.insert(pos, component);
    }

    pub(crate) fn absorb_raw(&mut self, entries: impl IntoIterator<Item = (BlockPos, C)>) {
        self.component_map.extend(entries);
    }

    // ── Element bookkeeping ────────────────────────────

    fn spawn_node(&mut self, pos: BlockPos, component: C) -> NodeId {
        let id = NodeId(self.ids.next_raw());
        self.nodes.insert(id, Node::singleton(id, pos, component));
        self.node_map.insert(pos, id);
        id
    }

    /// Drop a node and its position index entries. Incident edges are the
    /// caller's problem.
    fn discard_node(&mut self, id: NodeId) -> Option<Node<C>> {
        let node = self.nodes.remove(&id)?;
        for &p in &node.block_positions {
            self.node_map.remove(&p);
        }
        Some(node)
    }

    /// Create and index an edge; both endpoint nodes learn about it.
    #[allow(clippy::too_many_arguments)]
    fn link(
        &mut self,
        start: NodeId,
        start_pos: BlockPos,
        end: NodeId,
        end_pos: BlockPos,
        intermediate_blocks: Vec<BlockPos>,
        component: C,
    ) -> EdgeId {
        let id = EdgeId(self.ids.next_raw());
        let edge = Edge::new(id, start, start_pos, end, end_pos, intermediate_blocks, component);
        for &b in &edge.intermediate_blocks {
            self.edge_block_map.insert(b, id);
        }
        if let Some(n) = self.nodes.get_mut(&start) {
            n.edges.insert(id);
        }
        if let Some(n) = self.nodes.get_mut(&end) {
            n.edges.insert(id);
        }
        self.edges.insert(id, edge);
        id
    }

    /// Remove an edge from every index and from its endpoints' edge sets.
    fn deregister_edge(&mut self, id: EdgeId) -> Option<Edge<C>> {
        let edge = self.edges.remove(&id)?;
        for &b in &edge.intermediate_blocks {
            self.edge_block_map.remove(&b);
        }
        if let Some(n) = self.nodes.get_mut(&edge.start) {
            n.edges.remove(&id);
        }
        if let Some(n) = self.nodes.get_mut(&edge.end) {
            n.edges.remove(&id);
        }
        Some(edge)
    }

    // ── add_block ──────────────────────────────────────

    /// Incrementally add the block at `pos` carrying `component`.
    ///
    /// `pos` must be lattice-connected to this network (or the network must
    /// be empty); the registry guarantees that by routing. Adding an already
    /// present position is a no-op.
    pub fn add_block(&mut self, pos: BlockPos, component: C) -> Result<(), NetworkError> {
        if self.component_map.contains_key(&pos) {
            return Ok(());
        }
        self.component_map.insert(pos, component.clone());
        let neighbors = self.calculate_network_neighbors(pos);
        trace!(network = %self.id, %pos, neighbors = neighbors.len(), "add_block");

        if self.wants_node(pos, &neighbors) {
            self.place_as_node(pos, component, &neighbors)
        } else {
            self.place_as_intermediate(pos, component, &neighbors)
        }
    }

    fn place_as_node(
        &mut self,
        pos: BlockPos,
        component: C,
        neighbors: &[BlockPos],
    ) -> Result<(), NetworkError> {
        self.spawn_node(pos, component);
        let pos_extendable = self.rules.is_extendable_node(pos);

        for &q in neighbors {
            let fuse = pos_extendable && self.rules.is_extendable_node(q);

            let q_node = match self.node_map.get(&q) {
                Some(&n) => n,
                None => {
                    let eid = self
                        .edge_block_map
                        .get(&q)
                        .copied()
                        .ok_or(NetworkError::NoElementAt(q))?;
                    self.split_edge_at(eid, q)?
                }
            };

            // earlier neighbors may already have fused q into our node
            let my = self.node_map.get(&pos).copied().ok_or(NetworkError::NoElementAt(pos))?;
            if q_node == my {
                continue;
            }

            if fuse {
                self.merge_nodes(my, q_node)?;
            } else {
                self.link(my, pos, q_node, q, Vec::new(), C::from_length(0));
                self.collapse_degree_two_node(q_node)?;
            }
        }
        Ok(())
    }

    fn place_as_intermediate(
        &mut self,
        pos: BlockPos,
        component: C,
        neighbors: &[BlockPos],
    ) -> Result<(), NetworkError> {
        let [n1, n2] = neighbors else {
            return Err(NetworkError::DegreeInvariant { pos, found: neighbors.len() });
        };
        let (n1, n2) = (*n1, *n2);

        // n1 first; n1's split can move n2 onto a different edge, so n2 is
        // resolved with fresh lookups afterwards
        let r1 = self.node_or_split(n1)?;
        let r2 = self.node_or_split(n2)?;

        self.link(r1, n1, r2, n2, vec![pos], component);

        self.collapse_degree_two_node(r1)?;
        if r2 != r1 {
            self.collapse_degree_two_node(r2)?;
        }
        Ok(())
    }

    /// The node covering `q`, splitting the edge under `q` if needed.
    fn node_or_split(&mut self, q: BlockPos) -> Result<NodeId, NetworkError> {
        if let Some(&n) = self.node_map.get(&q) {
            return Ok(n);
        }
        let eid = self.edge_block_map.get(&q).copied().ok_or(NetworkError::NoElementAt(q))?;
        self.split_edge_at(eid, q)
    }

    // ── remove_block ───────────────────────────────────

    /// Incrementally remove the block at `pos`. Unknown positions are a
    /// no-op.
    ///
    /// Removal never re-partitions the network: a removal that disconnects
    /// it leaves one `Network` holding several lattice components until the
    /// registry's recompute runs.
    pub fn remove_block(&mut self, pos: BlockPos) -> Result<(), NetworkError> {
        if !self.component_map.contains_key(&pos) {
            return Ok(());
        }
        trace!(network = %self.id, %pos, "remove_block");

        if let Some(&nid) = self.node_map.get(&pos) {
            let multi = self.nodes.get(&nid).map_or(false, |n| n.block_positions.len() > 1);
            if multi {
                self.detach_from_multi_node(nid, pos)
            } else {
                self.remove_singleton_node(nid, pos)
            }
        } else if let Some(&eid) = self.edge_block_map.get(&pos) {
            self.remove_edge_intermediate(eid, pos)
        } else {
            Err(NetworkError::NoElementAt(pos))
        }
    }

    /// Detach one position from a multi-position node, leaving the node in
    /// place for its remaining blocks.
    fn detach_from_multi_node(&mut self, nid: NodeId, pos: BlockPos) -> Result<(), NetworkError> {
        // read the record before deleting it
        let entry =
            self.component_map.get(&pos).cloned().ok_or(NetworkError::MissingComponent(pos))?;
        self.component_map.remove(&pos);
        self.node_map.remove(&pos);

        let (updated, edge_ids) = {
            let node = self.nodes.get_mut(&nid).ok_or(NetworkError::NodeNotFound(nid))?;
            node.block_positions.remove(&pos);
            node.component = node.component.del(&entry);
            (node.component.clone(), node.edges.iter().copied().collect::<Vec<_>>())
        };

        // remaining positions carry the updated aggregate
        let remaining: Vec<BlockPos> = self
            .nodes
            .get(&nid)
            .map(|n| n.block_positions.iter().copied().collect())
            .unwrap_or_default();
        for &p in &remaining {
            self.component_map.insert(p, updated.clone());
        }

        // edges anchored at the detached position re-anchor onto a surviving
        // node position, or lose this end entirely
        for eid in edge_ids {
            self.reanchor_or_resect(eid, nid, pos, &remaining)?;
        }
        debug!(network = %self.id, node = %nid, %pos, "detached block from multi-node");
        Ok(())
    }

    /// `pos` was detached from node `nid`; fix up one incident edge whose
    /// anchor may have pointed at `pos`. Anchors slide to another node
    /// position still adjacent to the path; an end that cannot slide is cut
    /// off and its orphaned run gets a tip node.
    fn reanchor_or_resect(
        &mut self,
        eid: EdgeId,
        nid: NodeId,
        pos: BlockPos,
        remaining: &[BlockPos],
    ) -> Result<(), NetworkError> {
        let (fix_start, fix_end) = match self.edges.get(&eid) {
            Some(e) => {
                (e.start == nid && e.start_pos == pos, e.end == nid && e.end_pos == pos)
            }
            None => return Ok(()),
        };
        if !fix_start && !fix_end {
            return Ok(());
        }

        // the replacement anchor for a side must stay adjacent to that
        // side's outermost path block
        let slide_target = |e: &Edge<C>, is_start: bool| -> BlockPos {
            if e.is_direct_link() {
                if is_start {
                    e.end_pos
                } else {
                    e.start_pos
                }
            } else if is_start {
                e.intermediate_blocks[0]
            } else {
                e.intermediate_blocks[e.intermediate_blocks.len() - 1]
            }
        };
        let find_slide = |net: &Self, e: &Edge<C>, is_start: bool| -> Option<BlockPos> {
            let touch = slide_target(e, is_start);
            remaining
                .iter()
                .copied()
                .find(|&r| r.is_adjacent_to(touch) && net.rules.are_connected(r, touch))
        };

        let (start_slide, end_slide) = {
            let e = self.edges.get(&eid).ok_or(NetworkError::EdgeNotFound(eid))?;
            (
                if fix_start { find_slide(self, e, true) } else { None },
                if fix_end { find_slide(self, e, false) } else { None },
            )
        };

        if let Some(r) = start_slide {
            if let Some(e) = self.edges.get_mut(&eid) {
                e.start_pos = r;
            }
        }
        if let Some(r) = end_slide {
            if let Some(e) = self.edges.get_mut(&eid) {
                e.end_pos = r;
            }
        }

        let lost_start = fix_start && start_slide.is_none();
        let lost_end = fix_end && end_slide.is_none();
        if lost_start || lost_end {
            let Some(e) = self.deregister_edge(eid) else {
                return Ok(());
            };
            if lost_start && lost_end {
                self.resect_loop(e);
            } else if !e.is_direct_link() {
                self.resect_edge_losing(e, lost_start);
            }
        }
        Ok(())
    }

    /// Remove a single-position node and resect each incident edge: direct
    /// links vanish, longer edges get a fresh tip node at the path block
    /// next to the gap.
    fn remove_singleton_node(&mut self, nid: NodeId, pos: BlockPos) -> Result<(), NetworkError> {
        let node = self.discard_node(nid).ok_or(NetworkError::NodeNotFound(nid))?;
        self.component_map.remove(&pos);

        let mut former_opposites: Vec<NodeId> = Vec::new();
        for eid in node.edge_ids() {
            let Some(e) = self.deregister_edge(eid) else {
                continue;
            };
            if e.is_loop() {
                self.resect_loop(e);
            } else {
                let lost_is_start = e.start == nid;
                let opposite = if lost_is_start { e.end } else { e.start };
                if !former_opposites.contains(&opposite) {
                    former_opposites.push(opposite);
                }
                if !e.is_direct_link() {
                    self.resect_edge_losing(e, lost_is_start);
                }
            }
        }

        for f in former_opposites {
            self.collapse_degree_two_node(f)?;
        }
        debug!(network = %self.id, node = %nid, %pos, "removed singleton node");
        Ok(())
    }

    /// `e` has been deregistered and the endpoint on one side is gone.
    /// Promote the path block adjacent to the gap to a tip node and relink
    /// the remainder to the surviving endpoint. Requires a non-empty path.
    fn resect_edge_losing(&mut self, e: Edge<C>, lost_is_start: bool) -> Option<NodeId> {
        let blocks = &e.intermediate_blocks;
        debug_assert!(!blocks.is_empty());

        let tip = if lost_is_start { blocks[0] } else { *blocks.last()? };
        let tip_component = C::from_length(1);
        let rest_component = if blocks.len() > 1 {
            e.component.del(&tip_component)
        } else {
            C::from_length(0)
        };
        // inner path ordered from the surviving endpoint toward the tip
        let inner: Vec<BlockPos> = if lost_is_start {
            blocks[1..].iter().rev().copied().collect()
        } else {
            blocks[..blocks.len() - 1].to_vec()
        };
        let (survivor, survivor_anchor) =
            if lost_is_start { (e.end, e.end_pos) } else { (e.start, e.start_pos) };

        let tip_node = self.spawn_node(tip, tip_component);
        self.link(survivor, survivor_anchor, tip_node, tip, inner, rest_component);
        Some(tip_node)
    }

    /// Both endpoints of a loop edge sat on a node that is gone. The path
    /// survives as a free-standing run: a tip node at each end, the inner
    /// blocks as the edge between them.
    fn resect_loop(&mut self, e: Edge<C>) {
        let blocks = &e.intermediate_blocks;
        match blocks.len() {
            0 => {}
            1 => {
                self.spawn_node(blocks[0], e.component.clone());
            }
            n => {
                let (a, b) = (blocks[0], blocks[n - 1]);
                let tip_component = C::from_length(1);
                let inner = blocks[1..n - 1].to_vec();
                let inner_component = if n > 2 {
                    e.component.del(&tip_component).del(&tip_component)
                } else {
                    C::from_length(0)
                };
                let na = self.spawn_node(a, tip_component.clone());
                let nb = self.spawn_node(b, tip_component);
                self.link(na, a, nb, b, inner, inner_component);
            }
        }
    }

    /// Remove one intermediate block, resecting the edge into at most two
    /// stubs, each ending in a freshly promoted tip node.
    fn remove_edge_intermediate(&mut self, eid: EdgeId, pos: BlockPos) -> Result<(), NetworkError> {
        let e = self.deregister_edge(eid).ok_or(NetworkError::EdgeNotFound(eid))?;
        self.component_map.remove(&pos);

        let i = e
            .intermediate_blocks
            .iter()
            .position(|&b| b == pos)
            .ok_or(NetworkError::NotAnIntermediate { edge: eid, pos })?;
        let first = &e.intermediate_blocks[..i];
        let second = &e.intermediate_blocks[i + 1..];

        let removed = C::from_length(1);
        let remainder = e.component.del(&removed);
        let (left, right) = match (first.is_empty(), second.is_empty()) {
            (true, true) => (C::from_length(0), C::from_length(0)),
            (true, false) => (C::from_length(0), remainder),
            (false, true) => (remainder, C::from_length(0)),
            (false, false) => remainder.partition(first.len(), second.len()),
        };

        if let Some((&tip, inner)) = first.split_last() {
            let tip_component = C::from_length(1);
            let stub = if first.len() > 1 { left.del(&tip_component) } else { C::from_length(0) };
            let t = self.spawn_node(tip, tip_component);
            self.link(e.start, e.start_pos, t, tip, inner.to_vec(), stub);
        }
        if let Some((&tip, inner)) = second.split_first() {
            let tip_component = C::from_length(1);
            let stub = if second.len() > 1 { right.del(&tip_component) } else { C::from_length(0) };
            let t = self.spawn_node(tip, tip_component);
            let inner_rev: Vec<BlockPos> = inner.iter().rev().copied().collect();
            self.link(e.end, e.end_pos, t, tip, inner_rev, stub);
        }

        self.collapse_degree_two_node(e.start)?;
        if e.end != e.start {
            self.collapse_degree_two_node(e.end)?;
        }
        debug!(network = %self.id, edge = %eid, %pos, "resected edge at removed block");
        Ok(())
    }

    // ── Structural primitives ──────────────────────────

    /// Promote the intermediate `pos` of edge `eid` to a node, splitting the
    /// edge in two. Fails if `pos` is not on that edge.
    ///
    /// The new node takes a unit component out of the edge; the rest is
    /// partitioned across the two stubs proportionally to their lengths,
    /// with each length clamped to at least 1 so zero-length stubs (direct
    /// links) still take a share — intentional compatibility with the
    /// behavior callers already depend on.
    pub(crate) fn split_edge_at(&mut self, eid: EdgeId, pos: BlockPos) -> Result<NodeId, NetworkError> {
        {
            let e = self.edges.get(&eid).ok_or(NetworkError::EdgeNotFound(eid))?;
            if !e.intermediate_blocks.contains(&pos) {
                return Err(NetworkError::NotAnIntermediate { edge: eid, pos });
            }
        }
        let e = self.deregister_edge(eid).ok_or(NetworkError::EdgeNotFound(eid))?;
        let i = e
            .intermediate_blocks
            .iter()
            .position(|&b| b == pos)
            .ok_or(NetworkError::NotAnIntermediate { edge: eid, pos })?;

        let left_blocks = e.intermediate_blocks[..i].to_vec();
        let right_blocks = e.intermediate_blocks[i + 1..].to_vec();

        let node_component = C::from_length(1);
        let remainder = e.component.del(&node_component);
        let (left, right) = remainder.partition(left_blocks.len().max(1), right_blocks.len().max(1));

        let nid = self.spawn_node(pos, node_component);
        self.link(e.start, e.start_pos, nid, pos, left_blocks, left);
        self.link(nid, pos, e.end, e.end_pos, right_blocks, right);
        trace!(network = %self.id, edge = %eid, %pos, node = %nid, "split edge");
        Ok(nid)
    }

    /// Fold `dropped` into `keep`: edges re-point, positions union, the
    /// components add, and every merged position's component-map record is
    /// rewritten to the new aggregate. Edges running between the two nodes
    /// are discarded (the pair is now interior to one node).
    pub(crate) fn merge_nodes(&mut self, keep: NodeId, dropped: NodeId) -> Result<(), NetworkError> {
        if keep == dropped {
            return Ok(());
        }
        let old = self.nodes.remove(&dropped).ok_or(NetworkError::NodeNotFound(dropped))?;
        if !self.nodes.contains_key(&keep) {
            return Err(NetworkError::NodeNotFound(keep));
        }

        for eid in old.edge_ids().collect::<Vec<_>>() {
            let between = self.edges.get(&eid).map_or(false, |e| {
                (e.start == keep && e.end == dropped) || (e.start == dropped && e.end == keep)
            });
            if between {
                self.deregister_edge(eid);
                continue;
            }
            if let Some(e) = self.edges.get_mut(&eid) {
                if e.start == dropped {
                    e.start = keep;
                }
                if e.end == dropped {
                    e.end = keep;
                }
            }
            if let Some(k) = self.nodes.get_mut(&keep) {
                k.edges.insert(eid);
            }
        }

        let merged = {
            let k = self.nodes.get_mut(&keep).ok_or(NetworkError::NodeNotFound(keep))?;
            for &p in &old.block_positions {
                k.block_positions.insert(p);
            }
            k.component = k.component.add(&old.component);
            k.component.clone()
        };
        for &p in &old.block_positions {
            self.node_map.insert(p, keep);
        }
        let all: Vec<BlockPos> = self
            .nodes
            .get(&keep)
            .map(|n| n.block_positions.iter().copied().collect())
            .unwrap_or_default();
        for p in all {
            self.component_map.insert(p, merged.clone());
        }
        debug!(network = %self.id, %keep, %dropped, "merged nodes");
        Ok(())
    }

    /// Fold a pass-through node back into a single edge.
    ///
    /// Applies only when the node covers one position, has exactly two
    /// distinct incident edges, is not an always-node, still has lattice
    /// degree 2, and is not fused to an extendable neighbor; otherwise this
    /// is a no-op. A node whose two edge slots are one loop edge is also
    /// left alone — removing it would leave a node-less cycle.
    pub(crate) fn collapse_degree_two_node(&mut self, nid: NodeId) -> Result<(), NetworkError> {
        let edge_ids = {
            let Some(node) = self.nodes.get(&nid) else {
                return Ok(());
            };
            if node.block_positions.len() != 1 || node.edges.len() != 2 {
                return Ok(());
            }
            let pos = node.representative();
            // still a forced node (always, or lattice degree moved off 2)?
            if self.should_be_node(pos) {
                return Ok(());
            }
            let neighbors = self.calculate_network_neighbors(pos);
            if self.rules.is_extendable_node(pos)
                && neighbors.iter().any(|&q| self.rules.is_extendable_node(q))
            {
                return Ok(());
            }
            let ids: Vec<EdgeId> = node.edge_ids().collect();
            if ids.iter().any(|id| self.edges.get(id).map_or(true, |e| e.is_loop())) {
                return Ok(());
            }
            ids
        };
        let &[id1, id2] = edge_ids.as_slice() else {
            return Ok(());
        };

        let e1 = self.deregister_edge(id1).ok_or(NetworkError::EdgeNotFound(id1))?;
        let e2 = self.deregister_edge(id2).ok_or(NetworkError::EdgeNotFound(id2))?;
        let node = self.discard_node(nid).ok_or(NetworkError::NodeNotFound(nid))?;
        let pos = node.representative();

        let a = e1.opposite(nid)?;
        let b = e2.opposite(nid)?;
        let a_anchor = e1.anchor_at(a);
        let b_anchor = e2.anchor_at(b);

        let mut path = e1.path_from(a, a_anchor);
        path.push(pos);
        path.extend(e2.path_from(nid, e2.anchor_at(nid)));

        let component = e1.component.add(node.component()).add(&e2.component);
        self.link(a, a_anchor, b, b_anchor, path, component);
        trace!(network = %self.id, node = %nid, %pos, "collapsed pass-through node");
        Ok(())
    }

    // ── rebuild ────────────────────────────────────────

    /// Throw the graph away and re-derive it from the component map.
    ///
    /// This is the reference semantics: any sequence of incremental updates
    /// must leave the network indistinguishable (up to element identity)
    /// from a rebuild over the same component map.
    pub fn rebuild(&mut self) -> Result<(), NetworkError> {
        self.nodes.clear();
        self.edges.clear();
        self.node_map.clear();
        self.edge_block_map.clear();

        let mut positions: Vec<BlockPos> = self.component_map.keys().copied().collect();
        positions.sort();

        // pass 1: every junction/endpoint/always position becomes a
        // singleton node seeded from its component record
        for &p in &positions {
            let neighbors = self.calculate_network_neighbors(p);
            if self.wants_node(p, &neighbors) {
                let c = self
                    .component_map
                    .get(&p)
                    .cloned()
                    .ok_or(NetworkError::MissingComponent(p))?;
                self.spawn_node(p, c);
            }
        }

        // pass 1b: fuse adjacent extendable nodes
        for &p in &positions {
            if !self.rules.is_extendable_node(p) || !self.node_map.contains_key(&p) {
                continue;
            }
            for q in self.calculate_network_neighbors(p) {
                if !self.rules.is_extendable_node(q) {
                    continue;
                }
                let (Some(&mine), Some(&theirs)) = (self.node_map.get(&p), self.node_map.get(&q))
                else {
                    continue;
                };
                if mine != theirs {
                    self.merge_nodes(mine, theirs)?;
                }
            }
        }

        // pass 2: walk out of every node position; adjacent nodes get a
        // direct link (one per unordered position pair), runs of pass-through
        // blocks get traced into a single edge each
        let mut traced: HashSet<BlockPos> = HashSet::new();
        let mut linked: HashSet<(BlockPos, BlockPos)> = HashSet::new();
        let node_ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for nid in node_ids {
            let node_positions: Vec<BlockPos> = match self.nodes.get(&nid) {
                Some(n) => n.block_positions.iter().copied().collect(),
                None => continue,
            };
            for np in node_positions {
                for q in self.calculate_network_neighbors(np) {
                    if let Some(&qn) = self.node_map.get(&q) {
                        if qn == nid {
                            continue;
                        }
                        let key = if np < q { (np, q) } else { (q, np) };
                        if linked.insert(key) {
                            self.link(nid, np, qn, q, Vec::new(), C::from_length(0));
                        }
                    } else if !traced.contains(&q) {
                        let (path, end_node, end_anchor) = self.trace_run(np, q)?;
                        let mut component = C::from_length(0);
                        for &b in &path {
                            traced.insert(b);
                            let c = self
                                .component_map
                                .get(&b)
                                .ok_or(NetworkError::MissingComponent(b))?;
                            component = component.add(c);
                        }
                        self.link(nid, np, end_node, end_anchor, path, component);
                    }
                }
            }
        }
        debug!(
            network = %self.id,
            blocks = self.component_map.len(),
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "rebuilt graph"
        );
        Ok(())
    }

    /// Follow a run of pass-through blocks starting at `first` (entered from
    /// node position `from`) until it hits a node. Returns the ordered run,
    /// the terminating node, and its anchor position.
    fn trace_run(
        &self,
        from: BlockPos,
        first: BlockPos,
    ) -> Result<(Vec<BlockPos>, NodeId, BlockPos), NetworkError> {
        let mut path = vec![first];
        let mut prev = from;
        let mut cur = first;
        loop {
            let neighbors = self.calculate_network_neighbors(cur);
            let mut onward = neighbors.iter().copied().filter(|&q| q != prev);
            let (next, extra) = (onward.next(), onward.next());
            let Some(next) = next else {
                return Err(NetworkError::DegreeInvariant { pos: cur, found: neighbors.len() });
            };
            if extra.is_some() {
                return Err(NetworkError::DegreeInvariant { pos: cur, found: neighbors.len() });
            }
            if let Some(&n) = self.node_map.get(&next) {
                return Ok((path, n, next));
            }
            path.push(next);
            prev = cur;
            cur = next;
        }
    }
}

impl<C: Component> fmt::Display for Network<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Network[{}: {} blocks, {} nodes, {} edges]",
            self.id,
            self.component_map.len(),
            self.nodes.len(),
            self.edges.len()
        )
    }
}

impl<C: Component> fmt::Debug for Network<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Network");
        s.field("id", &self.id).field("blocks", &self.component_map.len());
        s.field("nodes", &self.nodes.values().collect::<Vec<_>>());
        s.field("edges", &self.edges.values().collect::<Vec<_>>());
        s.finish()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
