use conduit_lattice::BlockPos;

/// The pluggable predicates a host wires into a network type.
///
/// Supplied once at manager construction and shared by every network the
/// manager owns. All three have defaults; a bare `DefaultRules` gives plain
/// six-neighbor pipe semantics.
pub trait NetworkRules: Send + Sync {
    /// Must `pos` be a graph node regardless of its degree? (Machines,
    /// sinks, sources.)
    fn is_always_node(&self, _pos: BlockPos) -> bool {
        false
    }

    /// Does `pos` fuse with lattice-adjacent extendable positions into one
    /// multi-position node? (Tanks, multi-block machines.)
    fn is_extendable_node(&self, _pos: BlockPos) -> bool {
        false
    }

    /// Connectivity filter on top of lattice adjacency. Invoked wherever the
    /// engine walks the lattice (incremental updates, rebuild, and the
    /// registry's flood fill). The default accepts every adjacent pair.
    fn are_connected(&self, a: BlockPos, b: BlockPos) -> bool {
        a.is_adjacent_to(b)
    }
}

/// Plain pipe semantics: nothing is special, adjacency is connectivity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRules;

impl NetworkRules for DefaultRules {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_connect_adjacent_only() {
        let rules = DefaultRules;
        let a = BlockPos::new(0, 0, 0);
        assert!(rules.are_connected(a, BlockPos::new(0, 0, 1)));
        assert!(!rules.are_connected(a, BlockPos::new(0, 1, 1)));
        assert!(!rules.is_always_node(a));
        assert!(!rules.is_extendable_node(a));
    }
}
