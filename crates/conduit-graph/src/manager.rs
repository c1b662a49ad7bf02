use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use conduit_lattice::BlockPos;

use crate::algebra::Component;
use crate::error::NetworkError;
use crate::hooks::{NetworkHooks, NoopHooks};
use crate::model::{IdAllocator, NetworkId};
use crate::network::Network;
use crate::rules::NetworkRules;

// ─────────────────────────────────────────────
// NetworkManager
// ─────────────────────────────────────────────

/// The registry owning every network of one network type.
///
/// Routes world events to the right [`Network`]: an isolated placement
/// spawns a fresh network, a placement next to one network extends it
/// incrementally, and a placement bridging several coalesces them (raw
/// component maps are absorbed and the merged graph is rebuilt — incremental
/// merge cannot reconstruct structure across networks without scanning).
///
/// Removal is intentionally cheaper than it could be: a single-block removal
/// that disconnects a network is *not* detected here. Callers run
/// [`recalculate_networks`](Self::recalculate_networks) after bulk removals
/// or on load; [`Network::connected_components`] tells them when they must.
///
/// The position map is sharded ([`DashMap`]) so external readers may consult
/// it between mutations without a global lock; mutations themselves are
/// single-threaded (`&mut self`).
pub struct NetworkManager<C: Component> {
    rules: Arc<dyn NetworkRules>,
    hooks: Box<dyn NetworkHooks<C>>,
    pos_to_network: DashMap<BlockPos, NetworkId>,
    networks: BTreeMap<NetworkId, Network<C>>,
    ids: IdAllocator,
}

impl<C: Component> NetworkManager<C> {
    /// A manager with the given predicates and no hooks.
    pub fn new(rules: Arc<dyn NetworkRules>) -> Self {
        Self::with_hooks(rules, Box::new(NoopHooks))
    }

    /// A manager with predicates and a lifecycle callback table.
    pub fn with_hooks(rules: Arc<dyn NetworkRules>, hooks: Box<dyn NetworkHooks<C>>) -> Self {
        Self {
            rules,
            hooks,
            pos_to_network: DashMap::new(),
            networks: BTreeMap::new(),
            ids: IdAllocator::default(),
        }
    }

    // ── Lookup ─────────────────────────────────────────

    /// The network owning `pos`, if any.
    pub fn network_at(&self, pos: BlockPos) -> Option<&Network<C>> {
        let id = *self.pos_to_network.get(&pos)?;
        self.networks.get(&id)
    }

    /// The raw component record at `pos`, if any network owns it.
    pub fn component_at(&self, pos: BlockPos) -> Option<&C> {
        self.network_at(pos)?.component_at(pos)
    }

    /// Every active network, in id order.
    pub fn all_networks(&self) -> impl Iterator<Item = &Network<C>> {
        self.networks.values()
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    /// Total number of tracked positions across all networks.
    pub fn position_count(&self) -> usize {
        self.pos_to_network.len()
    }

    // ── Mutation ───────────────────────────────────────

    /// Route a block placement at `pos` carrying `component`.
    ///
    /// Returns the network the block ended up in. Placing onto an already
    /// tracked position changes nothing and returns its current owner.
    pub fn on_block_placed(
        &mut self,
        pos: BlockPos,
        component: C,
    ) -> Result<&Network<C>, NetworkError> {
        if let Some(id) = self.pos_to_network.get(&pos).map(|r| *r) {
            return self.networks.get(&id).ok_or(NetworkError::NetworkNotFound(id));
        }

        // distinct neighboring networks, in first-seen neighbor order
        let mut neighbor_nets: Vec<NetworkId> = Vec::new();
        for q in pos.neighbors() {
            if let Some(r) = self.pos_to_network.get(&q) {
                let id = *r;
                if !neighbor_nets.contains(&id) {
                    neighbor_nets.push(id);
                }
            }
        }

        let target = match neighbor_nets.as_slice() {
            [] => self.place_isolated(pos, component)?,
            [only] => self.place_extending(*only, pos, component)?,
            [first, rest @ ..] => self.place_bridging(*first, rest.to_vec(), pos, component)?,
        };

        let network = self.networks.get(&target).ok_or(NetworkError::NetworkNotFound(target))?;
        self.hooks.on_block_added(network);
        self.hooks.on_graph_updated(network);
        Ok(network)
    }

    fn place_isolated(&mut self, pos: BlockPos, component: C) -> Result<NetworkId, NetworkError> {
        let id = NetworkId(self.ids.next_raw());
        let mut network = Network::new(id, Arc::clone(&self.rules));
        network.add_block(pos, component)?;
        self.networks.insert(id, network);
        self.pos_to_network.insert(pos, id);
        debug!(network = %id, %pos, "created network for isolated placement");
        if let Some(network) = self.networks.get(&id) {
            self.hooks.on_network_created(network);
        }
        Ok(id)
    }

    fn place_extending(
        &mut self,
        id: NetworkId,
        pos: BlockPos,
        component: C,
    ) -> Result<NetworkId, NetworkError> {
        let network = self.networks.get_mut(&id).ok_or(NetworkError::NetworkNotFound(id))?;
        network.add_block(pos, component)?;
        self.pos_to_network.insert(pos, id);
        Ok(id)
    }

    fn place_bridging(
        &mut self,
        target: NetworkId,
        absorbed: Vec<NetworkId>,
        pos: BlockPos,
        component: C,
    ) -> Result<NetworkId, NetworkError> {
        debug!(
            network = %target,
            merged = absorbed.len(),
            %pos,
            "placement bridges networks, absorbing and rebuilding"
        );
        for other_id in absorbed {
            let Some(other) = self.networks.remove(&other_id) else {
                continue;
            };
            for p in other.positions() {
                self.pos_to_network.insert(p, target);
            }
            {
                let target_net = self
                    .networks
                    .get_mut(&target)
                    .ok_or(NetworkError::NetworkNotFound(target))?;
                target_net
                    .absorb_raw(other.raw_components().iter().map(|(p, c)| (*p, c.clone())));
            }
            // reported before the merged graph is rebuilt
            self.hooks.on_network_destroyed(&other);
        }

        let target_net =
            self.networks.get_mut(&target).ok_or(NetworkError::NetworkNotFound(target))?;
        target_net.insert_raw(pos, component);
        self.pos_to_network.insert(pos, target);
        target_net.rebuild()?;
        Ok(target)
    }

    /// Route a block removal at `pos`. Unknown positions are a no-op.
    pub fn on_block_removed(&mut self, pos: BlockPos) -> Result<(), NetworkError> {
        let Some((_, id)) = self.pos_to_network.remove(&pos) else {
            return Ok(());
        };
        let Some(network) = self.networks.get_mut(&id) else {
            return Ok(());
        };
        network.remove_block(pos)?;

        if network.is_empty() {
            if let Some(network) = self.networks.remove(&id) {
                debug!(network = %id, "network emptied, destroying");
                self.hooks.on_network_destroyed(&network);
            }
        } else if let Some(network) = self.networks.get(&id) {
            self.hooks.on_block_removed(network);
            self.hooks.on_graph_updated(network);
        }
        Ok(())
    }

    /// Recompute every network from scratch.
    ///
    /// Flood-fills the currently tracked positions into lattice-connected
    /// components (honoring [`NetworkRules::are_connected`]), creates one
    /// network per component with components supplied by `component_source`,
    /// and rebuilds each graph. This is the expensive path that repairs
    /// whatever incremental removal could not express — call it on load and
    /// after bulk removals.
    pub fn recalculate_networks(
        &mut self,
        mut component_source: impl FnMut(BlockPos) -> C,
    ) -> Result<(), NetworkError> {
        let mut keys: Vec<BlockPos> = self.pos_to_network.iter().map(|r| *r.key()).collect();
        keys.sort();
        let key_set: HashSet<BlockPos> = keys.iter().copied().collect();

        self.pos_to_network.clear();
        self.networks.clear();

        let mut visited: HashSet<BlockPos> = HashSet::new();
        for &start in &keys {
            if visited.contains(&start) {
                continue;
            }
            let mut component_blocks = vec![start];
            visited.insert(start);
            let mut queue = VecDeque::from([start]);
            while let Some(p) = queue.pop_front() {
                for q in p.neighbors() {
                    if key_set.contains(&q)
                        && !visited.contains(&q)
                        && self.rules.are_connected(p, q)
                    {
                        visited.insert(q);
                        component_blocks.push(q);
                        queue.push_back(q);
                    }
                }
            }

            let id = NetworkId(self.ids.next_raw());
            let mut network = Network::new(id, Arc::clone(&self.rules));
            for &p in &component_blocks {
                network.insert_raw(p, component_source(p));
                self.pos_to_network.insert(p, id);
            }
            network.rebuild()?;
            self.networks.insert(id, network);
            if let Some(network) = self.networks.get(&id) {
                self.hooks.on_network_created(network);
            }
        }
        debug!(networks = self.networks.len(), "recalculated all networks");
        Ok(())
    }

    /// Drop every network and forget every position.
    pub fn clear(&mut self) {
        for (_, network) in std::mem::take(&mut self.networks) {
            self.hooks.on_network_destroyed(&network);
        }
        self.pos_to_network.clear();
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::algebra::BlockCount;
    use crate::rules::DefaultRules;

    fn p(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(x, y, z)
    }

    fn manager() -> NetworkManager<BlockCount> {
        NetworkManager::new(Arc::new(DefaultRules))
    }

    fn place(m: &mut NetworkManager<BlockCount>, pos: BlockPos) -> NetworkId {
        let id = m
            .on_block_placed(pos, BlockCount::from_length(1))
            .expect("on_block_placed")
            .id();
        assert_registry_consistent(m);
        id
    }

    fn assert_registry_consistent(m: &NetworkManager<BlockCount>) {
        let mut seen = 0usize;
        for net in m.all_networks() {
            assert!(!net.is_empty(), "registry holds an empty network");
            for pos in net.positions() {
                seen += 1;
                let owner = m.network_at(pos).expect("tracked position");
                assert_eq!(owner.id(), net.id(), "pos_to_network out of sync at {pos}");
            }
        }
        assert_eq!(seen, m.position_count());
    }

    #[test]
    fn isolated_placement_creates_a_network() {
        let mut m = manager();
        let id = place(&mut m, p(0, 0, 0));
        assert_eq!(m.network_count(), 1);
        let net = m.network_at(p(0, 0, 0)).expect("network");
        assert_eq!(net.id(), id);
        assert_eq!(net.size(), 1);
        assert_eq!(m.component_at(p(0, 0, 0)), Some(&BlockCount(1)));
    }

    #[test]
    fn adjacent_placement_extends_the_same_network() {
        let mut m = manager();
        let a = place(&mut m, p(0, 0, 0));
        let b = place(&mut m, p(1, 0, 0));
        assert_eq!(a, b);
        assert_eq!(m.network_count(), 1);
        assert_eq!(m.network_at(p(1, 0, 0)).map(|n| n.size()), Some(2));
    }

    #[test]
    fn placing_on_an_occupied_position_changes_nothing() {
        let mut m = manager();
        place(&mut m, p(0, 0, 0));
        place(&mut m, p(1, 0, 0));
        let before: Vec<usize> = m.all_networks().map(Network::size).collect();
        place(&mut m, p(1, 0, 0));
        let after: Vec<usize> = m.all_networks().map(Network::size).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn bridging_placement_absorbs_the_smaller_network() {
        let mut m = manager();
        for x in [0, 1] {
            place(&mut m, p(x, 0, 0));
        }
        for x in [3, 4] {
            place(&mut m, p(x, 0, 0));
        }
        assert_eq!(m.network_count(), 2);

        place(&mut m, p(2, 0, 0));
        assert_eq!(m.network_count(), 1);
        let net = m.network_at(p(2, 0, 0)).expect("merged network");
        assert_eq!(net.size(), 5);
        // the merged graph is rebuilt: two end nodes, one compressed edge
        assert_eq!(net.nodes().count(), 2);
        let edge = net.edges().next().expect("edge");
        assert_eq!(
            edge.intermediate_blocks(),
            &[p(1, 0, 0), p(2, 0, 0), p(3, 0, 0)]
        );
    }

    #[test]
    fn removal_of_last_block_destroys_the_network() {
        let mut m = manager();
        place(&mut m, p(0, 0, 0));
        m.on_block_removed(p(0, 0, 0)).expect("remove");
        assert_eq!(m.network_count(), 0);
        assert_eq!(m.position_count(), 0);
        assert!(m.network_at(p(0, 0, 0)).is_none());
    }

    #[test]
    fn removal_of_unknown_position_is_a_noop() {
        let mut m = manager();
        place(&mut m, p(0, 0, 0));
        m.on_block_removed(p(5, 5, 5)).expect("no-op");
        assert_eq!(m.network_count(), 1);
        assert_eq!(m.position_count(), 1);
    }

    #[test]
    fn disconnecting_removal_keeps_one_network_until_recalculated() {
        let mut m = manager();
        for x in 0..5 {
            place(&mut m, p(x, 0, 0));
        }
        m.on_block_removed(p(2, 0, 0)).expect("remove");
        assert_registry_consistent(&m);

        // split not detected incrementally, but observable
        assert_eq!(m.network_count(), 1);
        let net = m.network_at(p(0, 0, 0)).expect("still one network");
        assert_eq!(net.connected_components().len(), 2);

        m.recalculate_networks(|_| BlockCount::from_length(1)).expect("recalculate");
        assert_registry_consistent(&m);
        assert_eq!(m.network_count(), 2);
        assert_ne!(
            m.network_at(p(0, 0, 0)).map(|n| n.id()),
            m.network_at(p(3, 0, 0)).map(|n| n.id())
        );
    }

    #[test]
    fn clear_forgets_everything() {
        let mut m = manager();
        for x in 0..3 {
            place(&mut m, p(x, 0, 0));
        }
        place(&mut m, p(9, 9, 9));
        m.clear();
        assert_eq!(m.network_count(), 0);
        assert_eq!(m.position_count(), 0);
    }

    // ── hooks ──────────────────────────────────────────

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl NetworkHooks<BlockCount> for Recorder {
        fn on_network_created(&mut self, n: &Network<BlockCount>) {
            self.0.lock().expect("lock").push(format!("created {}", n.id()));
        }
        fn on_network_destroyed(&mut self, n: &Network<BlockCount>) {
            self.0.lock().expect("lock").push(format!("destroyed {}", n.id()));
        }
        fn on_block_added(&mut self, n: &Network<BlockCount>) {
            self.0.lock().expect("lock").push(format!("added {}", n.id()));
        }
        fn on_block_removed(&mut self, n: &Network<BlockCount>) {
            self.0.lock().expect("lock").push(format!("removed {}", n.id()));
        }
        fn on_graph_updated(&mut self, n: &Network<BlockCount>) {
            self.0.lock().expect("lock").push(format!("updated {}", n.id()));
        }
    }

    #[test]
    fn hooks_fire_in_lifecycle_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut m: NetworkManager<BlockCount> = NetworkManager::with_hooks(
            Arc::new(DefaultRules),
            Box::new(Recorder(Arc::clone(&log))),
        );

        m.on_block_placed(p(0, 0, 0), BlockCount(1)).expect("place");
        m.on_block_placed(p(1, 0, 0), BlockCount(1)).expect("place");
        m.on_block_removed(p(1, 0, 0)).expect("remove");
        m.on_block_removed(p(0, 0, 0)).expect("remove");

        let log = log.lock().expect("lock");
        assert_eq!(
            log.as_slice(),
            [
                "created net0",
                "added net0",
                "updated net0",
                "added net0",
                "updated net0",
                "removed net0",
                "updated net0",
                "destroyed net0",
            ]
        );
    }

    #[test]
    fn bridge_merge_reports_absorbed_networks_destroyed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut m: NetworkManager<BlockCount> = NetworkManager::with_hooks(
            Arc::new(DefaultRules),
            Box::new(Recorder(Arc::clone(&log))),
        );

        m.on_block_placed(p(0, 0, 0), BlockCount(1)).expect("place");
        m.on_block_placed(p(2, 0, 0), BlockCount(1)).expect("place");
        log.lock().expect("lock").clear();

        m.on_block_placed(p(1, 0, 0), BlockCount(1)).expect("bridge");
        let log = log.lock().expect("lock");
        // the +x neighbor is scanned first, so net1 is the merge target and
        // net0 dies before the merged graph reports the add
        assert_eq!(log.as_slice(), ["destroyed net0", "added net1", "updated net1"]);
    }
}
