//! Error types for mesh construction, reload, and integrity audits.

use thiserror::Error;

use crate::node::NodeId;

/// Errors surfaced by mesh persistence and by the integrity audit.
///
/// Failed flips are deliberately not represented here: a rejected flip is a
/// normal outcome, reported in the flip's return value.
#[derive(Error, Debug)]
pub enum MeshError {
    /// An I/O error while reading or writing a mesh file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not the expected attribute map.
    #[error("malformed mesh document: {0}")]
    Json(#[from] serde_json::Error),

    /// A map key that does not parse as a decimal node id.
    #[error("node key {key:?} is not a decimal id")]
    BadNodeKey {
        /// The offending key.
        key: String,
    },

    /// Two map entries resolved to the same node id.
    #[error("node id {id} appears more than once")]
    DuplicateNode {
        /// The duplicated id.
        id: NodeId,
    },

    /// Node ids must be dense in `[0, N)`.
    #[error("node ids are not dense: {expected} nodes but id {found} present")]
    SparseIds {
        /// Number of nodes in the document.
        expected: usize,
        /// The out-of-range id encountered.
        found: NodeId,
    },

    /// A ring references an id outside the store.
    #[error("node {node} lists unknown neighbor {neighbor}")]
    UnknownNeighbor {
        /// The node whose ring is invalid.
        node: NodeId,
        /// The id that does not exist.
        neighbor: NodeId,
    },

    /// Adjacency must be mutual.
    #[error("node {a} lists {b} as neighbor but not the other way around")]
    AsymmetricAdjacency {
        /// One side of the edge.
        a: NodeId,
        /// The side missing the back reference.
        b: NodeId,
    },

    /// A ring entry repeats, or consecutive ring entries do not close a
    /// triangle.
    #[error("ring of node {node} is not a triangle fan at slot {slot}")]
    BrokenFan {
        /// The node whose ring is invalid.
        node: NodeId,
        /// Ring position of the violation.
        slot: usize,
    },

    /// A bulk node fell below the degree floor.
    #[error("bulk node {node} has {degree} neighbors")]
    DegreeTooLow {
        /// The underpopulated node.
        node: NodeId,
        /// Its ring size.
        degree: usize,
    },

    /// A bulk edge must border exactly two triangles.
    #[error("edge ({a}, {b}) has {shared} common neighbors, expected 2")]
    NonManifoldEdge {
        /// First endpoint.
        a: NodeId,
        /// Second endpoint.
        b: NodeId,
        /// Number of common neighbors found.
        shared: usize,
    },

    /// A cached edge vector disagrees with the endpoint positions.
    #[error("cached edge of node {node} at slot {slot} is stale")]
    StaleEdgeCache {
        /// The node holding the cache.
        node: NodeId,
        /// Ring position of the stale entry.
        slot: usize,
    },

    /// The running totals no longer match a fresh per-node sum.
    #[error("running {quantity} total {stored} drifted from per-node sum {recomputed}")]
    TotalsDrift {
        /// Which quantity drifted.
        quantity: &'static str,
        /// The running value.
        stored: f64,
        /// The freshly summed value.
        recomputed: f64,
    },
}
