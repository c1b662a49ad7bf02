//! pipe_factory — builds a small factory floor and narrates the graph.
//!
//! Layout (y = 0 plane, machines are always-nodes, the tank is extendable):
//!
//! ```text
//!   M1 ── pipe ── junction ── pipe ── M2
//!                    │
//!                  [tank]
//!                  [tank]
//! ```
//!
//! Then a pipe in the middle is broken, the world is recomputed, and the
//! resulting networks are printed.
//!
//! Usage:
//!   RUST_LOG=conduit_graph=debug cargo run -p conduit-graph --example pipe_factory

use std::collections::HashSet;
use std::sync::Arc;

use conduit_graph::{BlockCount, BlockPos, Component, NetworkManager, NetworkRules};

struct FactoryRules {
    machines: HashSet<BlockPos>,
    tanks: HashSet<BlockPos>,
}

impl NetworkRules for FactoryRules {
    fn is_always_node(&self, pos: BlockPos) -> bool {
        self.machines.contains(&pos)
    }
    fn is_extendable_node(&self, pos: BlockPos) -> bool {
        self.tanks.contains(&pos)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("conduit_graph=debug")),
        )
        .init();

    let p = BlockPos::new;
    let machines = HashSet::from([p(0, 0, 0), p(8, 0, 0)]);
    let tanks = HashSet::from([p(4, -1, 0), p(4, -2, 0)]);
    let mut manager: NetworkManager<BlockCount> =
        NetworkManager::new(Arc::new(FactoryRules { machines, tanks }));

    // the spine with a machine at each end
    for x in 0..=8 {
        manager.on_block_placed(p(x, 0, 0), BlockCount::from_length(1)).expect("place");
    }
    // the tank hanging under the middle
    for y in [-1, -2] {
        manager.on_block_placed(p(4, y, 0), BlockCount::from_length(1)).expect("place");
    }

    println!("after construction:");
    for network in manager.all_networks() {
        println!("  {network}");
        for node in network.nodes() {
            let positions: Vec<String> = node.block_positions().map(|b| b.to_string()).collect();
            println!(
                "    node {} covers [{}], degree {}",
                node.id(),
                positions.join(", "),
                node.degree()
            );
        }
        for edge in network.edges() {
            println!(
                "    edge {} {} -> {}, length {}",
                edge.id(),
                edge.start_pos(),
                edge.end_pos(),
                edge.length()
            );
        }
    }

    // break the pipe next to the first machine
    manager.on_block_removed(p(2, 0, 0)).expect("remove");
    let network = manager.network_at(p(0, 0, 0)).expect("network");
    println!(
        "\nafter breaking (2,0,0): {} lattice component(s) in {}",
        network.connected_components().len(),
        network
    );

    // the registry does not split on its own; recompute to separate them
    manager.recalculate_networks(|_| BlockCount::from_length(1)).expect("recalculate");
    println!("\nafter recalculation:");
    for network in manager.all_networks() {
        println!("  {network}");
    }
}
