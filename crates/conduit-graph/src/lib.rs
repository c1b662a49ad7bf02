//! # conduit-graph
//!
//! Incremental, compressed graph engine over a 3D block lattice.
//!
//! Given a stream of "block placed" / "block removed" events, the engine
//! maintains one [`Network`] per maximal connected component of network
//! blocks. Within a network, junctions and endpoints are [`Node`]s and
//! linear pass-through runs are compressed into single multi-block
//! [`Edge`]s. Per-block payloads (the [`Component`] algebra) ride along on
//! every graph element and are partitioned, merged, and recombined so the
//! total is conserved through every structural change.
//!
//! - [`manager::NetworkManager`] — the registry: routes events, creates,
//!   merges, and destroys networks, fires lifecycle hooks
//! - [`network::Network`]        — one connected component's compressed graph
//! - [`algebra::Component`]      — the client payload algebra
//! - [`rules::NetworkRules`]     — host predicates (always-node, extendable,
//!   connectivity filter)
//! - [`hooks::NetworkHooks`]     — lifecycle callback table
//!
//! Physics/flux simulation, persistence, and world I/O live in the host;
//! this crate is only the structural core. All entry points run to
//! completion on the caller's thread — between any two public calls the
//! structures are consistent, and external readers need only coarse
//! exclusion around writers.

pub mod algebra;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod model;
pub mod network;
pub mod rules;

pub use algebra::{BlockCount, Component};
pub use error::NetworkError;
pub use hooks::{NetworkHooks, NoopHooks};
pub use manager::NetworkManager;
pub use model::{Edge, EdgeId, NetworkId, Node, NodeId};
pub use network::Network;
pub use rules::{DefaultRules, NetworkRules};

pub use conduit_lattice::{BlockPos, Direction};
