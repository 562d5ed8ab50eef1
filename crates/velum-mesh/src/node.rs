//! Per-vertex records and the indexed node store.

use smallvec::SmallVec;
use velum_math::Vec3;

/// Stable index of a node inside a [`NodeStore`].
///
/// Ids are dense in `[0, N)` and never recycled: displacement and edge flips
/// move and rewire nodes but never create or destroy them.
pub type NodeId = usize;

/// Sentinel id meaning "no such node".
///
/// The maximum of the signed 64-bit range, so that any arithmetic or indexing
/// with a poisoned id fails loudly instead of aliasing a real node.
pub const NO_NODE: NodeId = i64::MAX as NodeId;

/// Inline ring capacity. Bulk nodes of a triangulated surface average six
/// neighbors; flips push individual nodes a little above that, and the ring
/// spills to the heap only past this capacity.
pub(crate) const RING_INLINE: usize = 8;

pub(crate) type Ring<T> = SmallVec<[T; RING_INLINE]>;

/// A mesh vertex: position, ordered neighbor ring, cached edge vectors, and
/// the local geometric quantities derived from them.
///
/// The ring is cyclically ordered: consecutive entries (with wraparound) are
/// themselves mutually adjacent, so the ring is a closed fan of triangles
/// around this node. `edges[k]` always holds
/// `position(ring[k]) - position(self)`; the two arrays are mutated together.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) position: Vec3,
    pub(crate) area: f64,
    pub(crate) volume: f64,
    pub(crate) bending_energy: f64,
    pub(crate) curvature: Vec3,
    pub(crate) ring: Ring<NodeId>,
    pub(crate) edges: Ring<Vec3>,
    pub(crate) proximity: Vec<NodeId>,
}

impl Node {
    pub(crate) fn bare(id: NodeId, position: Vec3) -> Self {
        Self {
            id,
            position,
            area: 0.0,
            volume: 0.0,
            bending_energy: 0.0,
            curvature: Vec3::zeros(),
            ring: Ring::new(),
            edges: Ring::new(),
            proximity: Vec::new(),
        }
    }

    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Lab-frame position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Voronoi-like area associated with this node.
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Signed tetrahedral contribution of this node's cell to the enclosed
    /// volume, measured relative to the origin.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Bending-energy density `‖K‖²·A/2` of this node, with `K` the discrete
    /// mean-curvature vector: the Canham–Helfrich integrand at unit rigidity.
    pub fn bending_energy(&self) -> f64 {
        self.bending_energy
    }

    /// Discrete mean-curvature vector.
    pub fn curvature(&self) -> Vec3 {
        self.curvature
    }

    /// The cyclically ordered neighbor ring.
    pub fn ring(&self) -> &[NodeId] {
        &self.ring
    }

    /// Cached edge vectors, parallel to [`Node::ring`].
    pub fn edges(&self) -> &[Vec3] {
        &self.edges
    }

    /// Nodes currently within the proximity cutoff (not necessarily ring
    /// neighbors). Rebuilt wholesale by
    /// [`Membrane::rebuild_proximity`](crate::Membrane::rebuild_proximity).
    pub fn proximity(&self) -> &[NodeId] {
        &self.proximity
    }

    /// Number of ring neighbors.
    pub fn degree(&self) -> usize {
        self.ring.len()
    }

    /// Position of `neighbor` in the ring, if it is a neighbor.
    pub fn ring_index_of(&self, neighbor: NodeId) -> Option<usize> {
        self.ring.iter().position(|&n| n == neighbor)
    }

    /// Cached edge vector towards `neighbor`.
    ///
    /// Panics if `neighbor` is not in the ring: asking for the edge to a
    /// non-neighbor is a programmer error, not a recoverable condition.
    pub fn edge_to(&self, neighbor: NodeId) -> Vec3 {
        match self.ring_index_of(neighbor) {
            Some(k) => self.edges[k],
            None => panic!(
                "node {} has no neighbor {}; ring is {:?}",
                self.id, neighbor, self.ring
            ),
        }
    }
}

/// Dense, indexed collection of [`Node`]s.
///
/// Pure data plus the two topology primitives used by the edge-flip rewrite.
/// Everything that has to keep geometry coherent lives on
/// [`Membrane`](crate::Membrane); the store itself never touches derived
/// quantities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStore {
    nodes: Vec<Node>,
}

impl NodeStore {
    pub(crate) fn from_positions(positions: Vec<Vec3>) -> Self {
        let nodes = positions
            .into_iter()
            .enumerate()
            .map(|(id, p)| Node::bare(id, p))
            .collect();
        Self { nodes }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node with the given id. Panics on an out-of-range id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Iterate over all nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Insert `new_id` into `center`'s ring before ring position `at` and
    /// cache the corresponding edge vector.
    ///
    /// Topology primitive only: the partner node and all derived geometry are
    /// left untouched, so the caller is responsible for restoring the mesh
    /// invariants before returning to user code.
    pub(crate) fn emplace_neighbor(&mut self, center: NodeId, new_id: NodeId, at: usize) {
        let edge = self.nodes[new_id].position - self.nodes[center].position;
        let node = &mut self.nodes[center];
        node.ring.insert(at, new_id);
        node.edges.insert(at, edge);
    }

    /// Remove `other` (and its cached edge) from `center`'s ring. No-op when
    /// `other` is not a neighbor.
    pub(crate) fn pop_neighbor(&mut self, center: NodeId, other: NodeId) {
        let node = &mut self.nodes[center];
        if let Some(k) = node.ring.iter().position(|&n| n == other) {
            node.ring.remove(k);
            node.edges.remove(k);
        }
    }

    /// Remove the ring entry at an exact position. Used for index-exact
    /// rollback of a tentative flip rewrite.
    pub(crate) fn remove_neighbor_at(&mut self, center: NodeId, at: usize) {
        let node = &mut self.nodes[center];
        node.ring.remove(at);
        node.edges.remove(at);
    }
}
