use thiserror::Error;

use conduit_lattice::BlockPos;

use crate::model::{EdgeId, NetworkId, NodeId};

/// Structural invariant violations.
///
/// These are programmer errors: a well-behaved event stream never produces
/// them. They abort the current public call and the affected network must be
/// treated as unrecoverable (a partial mutation may have been applied).
/// Unknown-position lookups are *not* errors — they return `None` or no-op.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("{pos} is not an intermediate block of edge {edge}")]
    NotAnIntermediate { edge: EdgeId, pos: BlockPos },

    #[error("node {node} is not an endpoint of edge {edge}")]
    NotAnEndpoint { edge: EdgeId, node: NodeId },

    #[error("non-node block at {pos} has {found} in-network neighbors, expected exactly 2")]
    DegreeInvariant { pos: BlockPos, found: usize },

    #[error("position {0} has no component-map entry")]
    MissingComponent(BlockPos),

    #[error("no graph element owns position {0}")]
    NoElementAt(BlockPos),

    #[error("network not found: {0}")]
    NetworkNotFound(NetworkId),
}
