//! The membrane core: topology plus coherent geometry maintenance.
//!
//! All mutation of a mesh goes through [`Membrane`]: node displacement and
//! edge flips recompute the affected neighborhood from first principles and
//! apply the exact local delta to the running global totals, so the mesh
//! never needs a full rescan during steady-state simulation.

use log::debug;
use velum_math::Vec3;

use crate::aggregate::SurfaceQuantities;
use crate::error::MeshError;
use crate::geometry::refresh_vertex;
use crate::node::{Node, NodeId, NodeStore, Ring, NO_NODE};

/// Degree floor: every bulk node keeps at least this many neighbors, so a
/// node may donate an edge only while its ring is strictly larger.
pub const MIN_DEGREE: usize = 5;

/// Topological flavor of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshKind {
    /// Closed surface of spherical topology; every node is bulk.
    Spherical,
    /// Rectangular patch with a frozen frame of boundary nodes.
    Planar,
}

/// Outcome of an edge-flip request.
///
/// When the flip was not applied, both apex ids hold [`NO_NODE`] so that any
/// downstream use of a rejected report fails loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipReport {
    /// Whether the mesh was rewired.
    pub applied: bool,
    /// Receiver that preceded the donated edge in the first donor's ring.
    pub opposite_prev: NodeId,
    /// Receiver that followed the donated edge in the first donor's ring.
    pub opposite_next: NodeId,
}

impl FlipReport {
    /// The poisoned report returned for every rejected flip.
    pub const REJECTED: FlipReport = FlipReport {
        applied: false,
        opposite_prev: NO_NODE,
        opposite_next: NO_NODE,
    };
}

/// Ring positions touched by one edge rewrite, recorded so a tentative
/// rewrite can be rolled back index-exactly.
struct Rewire {
    donor_a: NodeId,
    donor_b: NodeId,
    prev: NodeId,
    next: NodeId,
    slot_b_in_a: usize,
    slot_a_in_b: usize,
    slot_next_in_prev: usize,
    slot_prev_in_next: usize,
}

/// A dynamically triangulated surface with coherent per-node geometry and
/// running global totals.
#[derive(Debug, Clone)]
pub struct Membrane {
    store: NodeStore,
    kind: MeshKind,
    frozen: Vec<bool>,
    totals: SurfaceQuantities,
}

impl Membrane {
    /// Build a membrane from raw topology: positions, cyclically ordered
    /// rings, and the frozen-boundary flags. Computes every cached edge,
    /// every derived scalar, and the global totals.
    pub(crate) fn assemble(
        kind: MeshKind,
        positions: Vec<Vec3>,
        rings: Vec<Vec<NodeId>>,
        frozen: Vec<bool>,
    ) -> Self {
        let mut store = NodeStore::from_positions(positions);
        for (id, ring) in rings.into_iter().enumerate() {
            let node = store.node_mut(id);
            node.ring = Ring::from_vec(ring);
            node.edges = Ring::from_elem(Vec3::zeros(), node.ring.len());
        }
        let mut mesh = Self {
            store,
            kind,
            frozen,
            totals: SurfaceQuantities::zero(),
        };
        for id in 0..mesh.store.len() {
            refresh_vertex(&mut mesh.store, id, mesh.frozen[id]);
        }
        let mut totals = SurfaceQuantities::zero();
        for node in mesh.store.iter() {
            totals += node;
        }
        mesh.totals = totals;
        mesh
    }

    /// Topological flavor of this mesh.
    pub fn kind(&self) -> MeshKind {
        self.kind
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.store.len()
    }

    /// The node with the given id. Panics on an out-of-range id.
    pub fn node(&self, id: NodeId) -> &Node {
        self.store.node(id)
    }

    /// The underlying node store (read-only).
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Iterate over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.store.iter()
    }

    /// Whether `id` belongs to the frozen boundary frame. Always false on a
    /// spherical mesh.
    pub fn is_boundary(&self, id: NodeId) -> bool {
        self.frozen[id]
    }

    /// Ids of the frozen boundary nodes.
    pub fn boundary_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frozen
            .iter()
            .enumerate()
            .filter(|(_, &f)| f)
            .map(|(id, _)| id)
    }

    /// Running global totals.
    pub fn totals(&self) -> SurfaceQuantities {
        self.totals
    }

    /// Total surface area.
    pub fn area(&self) -> f64 {
        self.totals.area
    }

    /// Total enclosed volume (signed, relative to the origin).
    pub fn volume(&self) -> f64 {
        self.totals.volume
    }

    /// Total bending energy at unit rigidity.
    pub fn bending_energy(&self) -> f64 {
        self.totals.bending_energy
    }

    /// Mean of all node positions.
    pub fn mass_center(&self) -> Vec3 {
        let mut sum = Vec3::zeros();
        for node in self.store.iter() {
            sum += node.position();
        }
        sum / self.store.len() as f64
    }

    /// Sum of the surface quantities over `id` and its ring.
    pub fn two_ring_totals(&self, id: NodeId) -> SurfaceQuantities {
        let mut sum = SurfaceQuantities::from(self.store.node(id));
        for &neighbor in self.store.node(id).ring() {
            sum += self.store.node(neighbor);
        }
        sum
    }

    /// Recompute the local geometry of `id` and each of its ring neighbors.
    pub fn update_two_ring(&mut self, id: NodeId) {
        refresh_vertex(&mut self.store, id, self.frozen[id]);
        let ring: Ring<NodeId> = Ring::from_slice(self.store.node(id).ring());
        for neighbor in ring {
            refresh_vertex(&mut self.store, neighbor, self.frozen[neighbor]);
        }
    }

    /// Move node `id` by `delta` and bring the two-ring neighborhood and the
    /// global totals back into agreement.
    ///
    /// Bond-length admission is the driver's job, not this method's. Panics
    /// when asked to move a frozen boundary node: their positions are
    /// immutable by contract.
    pub fn displace(&mut self, id: NodeId, delta: Vec3) {
        assert!(
            !self.frozen[id],
            "node {id} is part of the frozen boundary and cannot move"
        );
        let before = self.two_ring_totals(id);
        self.store.node_mut(id).position += delta;
        self.update_two_ring(id);
        let after = self.two_ring_totals(id);
        self.totals += after - before;
    }

    /// Flip the edge between neighbors `a` and `b` onto their two common
    /// neighbors, provided every admission guard passes.
    ///
    /// Guards, in order: the whole diamond must be bulk; both donors must be
    /// able to spare an edge (ring strictly larger than [`MIN_DEGREE`]); the
    /// receiver span must lie inside `(min_len_sq, max_len_sq)`; the donors
    /// must share exactly two neighbors; and after a tentative rewrite the
    /// receivers must share exactly two neighbors — otherwise the rewrite is
    /// rolled back index-exactly and the flip reported as not applied.
    ///
    /// Panics if `b` is not currently a neighbor of `a` (programmer error).
    pub fn flip_edge(
        &mut self,
        a: NodeId,
        b: NodeId,
        min_len_sq: f64,
        max_len_sq: f64,
    ) -> FlipReport {
        let slot = match self.store.node(a).ring_index_of(b) {
            Some(slot) => slot,
            None => panic!("flip requested for non-adjacent nodes {a} and {b}"),
        };
        let degree = self.store.node(a).degree();
        let prev = self.store.node(a).ring()[(slot + degree - 1) % degree];
        let next = self.store.node(a).ring()[(slot + 1) % degree];

        if self.frozen[a] || self.frozen[b] || self.frozen[prev] || self.frozen[next] {
            return FlipReport::REJECTED;
        }
        if degree <= MIN_DEGREE || self.store.node(b).degree() <= MIN_DEGREE {
            return FlipReport::REJECTED;
        }
        let span = self.store.node(next).position() - self.store.node(prev).position();
        let span_sq = span.norm_squared();
        if span_sq <= min_len_sq || span_sq >= max_len_sq {
            return FlipReport::REJECTED;
        }
        if self.common_neighbor_count(a, b) != 2 {
            return FlipReport::REJECTED;
        }

        let before = self.diamond_totals(a, b, prev, next);
        let rewire = self.rewire(a, b);
        if self.common_neighbor_count(prev, next) != 2 {
            // The receivers were already adjacent on the far side of the
            // quadrilateral; undo the tentative rewrite.
            self.unwire(rewire);
            return FlipReport::REJECTED;
        }
        self.update_diamond(a, b, prev, next);
        let after = self.diamond_totals(a, b, prev, next);
        self.totals += after - before;

        FlipReport {
            applied: true,
            opposite_prev: prev,
            opposite_next: next,
        }
    }

    /// Reverse the most recent successful flip of edge `(a, b)` using the
    /// recorded report.
    ///
    /// Trusts its arguments completely: call it at most once per successful
    /// flip, with no other mutation in between. Every ring comes back in
    /// its exact cyclic order (the stored rotation may differ, which is the
    /// same topology); the global totals get the exact reverse delta.
    pub fn unflip_edge(&mut self, a: NodeId, b: NodeId, report: FlipReport) {
        debug_assert!(report.applied, "unflip of a rejected flip");
        let (prev, next) = (report.opposite_prev, report.opposite_next);
        let before = self.diamond_totals(a, b, prev, next);
        self.rewire(prev, next);
        self.update_diamond(a, b, prev, next);
        let after = self.diamond_totals(a, b, prev, next);
        self.totals += after - before;
    }

    /// Rebuild every proximity list: each unordered pair closer than
    /// `radius` is entered symmetrically. Naïve O(N²); callers pick a radius
    /// a small multiple of the maximum bond length and rebuild as their move
    /// amplitude demands.
    pub fn rebuild_proximity(&mut self, radius: f64) {
        let radius_sq = radius * radius;
        let count = self.store.len();
        for id in 0..count {
            self.store.node_mut(id).proximity.clear();
        }
        for i in 0..count {
            for j in (i + 1)..count {
                let d = self.store.node(j).position() - self.store.node(i).position();
                if d.norm_squared() < radius_sq {
                    self.store.node_mut(i).proximity.push(j);
                    self.store.node_mut(j).proximity.push(i);
                }
            }
        }
        debug!("rebuilt proximity lists for {count} nodes at cutoff {radius}");
    }

    pub(crate) fn set_proximity(&mut self, id: NodeId, list: Vec<NodeId>) {
        self.store.node_mut(id).proximity = list;
    }

    /// Unchecked edge rewrite: transfer the edge held by `donor_a` and
    /// `donor_b` to their ring-previous and ring-next common neighbors.
    ///
    /// Each receiver is spliced into the other receiver's ring directly
    /// after the donor the ring walk came from — the unique insertion point
    /// that keeps rings counterclockwise and closed-fan. Geometry is not
    /// touched; callers recompute the diamond.
    fn rewire(&mut self, donor_a: NodeId, donor_b: NodeId) -> Rewire {
        let slot_b_in_a = self
            .store
            .node(donor_a)
            .ring_index_of(donor_b)
            .expect("rewire of non-adjacent nodes");
        let degree = self.store.node(donor_a).degree();
        let ring = self.store.node(donor_a).ring();
        let prev = ring[(slot_b_in_a + degree - 1) % degree];
        let next = ring[(slot_b_in_a + 1) % degree];

        let slot_next_in_prev = self
            .store
            .node(prev)
            .ring_index_of(donor_a)
            .expect("receiver lost its donor");
        self.store.emplace_neighbor(prev, next, slot_next_in_prev);

        let slot_prev_in_next = self
            .store
            .node(next)
            .ring_index_of(donor_b)
            .expect("receiver lost its donor");
        self.store.emplace_neighbor(next, prev, slot_prev_in_next);

        let slot_a_in_b = self
            .store
            .node(donor_b)
            .ring_index_of(donor_a)
            .expect("donors disagree about adjacency");
        self.store.remove_neighbor_at(donor_a, slot_b_in_a);
        self.store.remove_neighbor_at(donor_b, slot_a_in_b);

        Rewire {
            donor_a,
            donor_b,
            prev,
            next,
            slot_b_in_a,
            slot_a_in_b,
            slot_next_in_prev,
            slot_prev_in_next,
        }
    }

    /// Exact inverse of [`Membrane::rewire`], by recorded ring positions.
    fn unwire(&mut self, r: Rewire) {
        self.store.emplace_neighbor(r.donor_b, r.donor_a, r.slot_a_in_b);
        self.store.emplace_neighbor(r.donor_a, r.donor_b, r.slot_b_in_a);
        self.store.remove_neighbor_at(r.next, r.slot_prev_in_next);
        self.store.remove_neighbor_at(r.prev, r.slot_next_in_prev);
    }

    fn update_diamond(&mut self, a: NodeId, b: NodeId, prev: NodeId, next: NodeId) {
        for id in [a, b, prev, next] {
            refresh_vertex(&mut self.store, id, self.frozen[id]);
        }
    }

    fn diamond_totals(&self, a: NodeId, b: NodeId, prev: NodeId, next: NodeId) -> SurfaceQuantities {
        let mut sum = SurfaceQuantities::zero();
        for id in [a, b, prev, next] {
            sum += self.store.node(id);
        }
        sum
    }

    fn common_neighbor_count(&self, a: NodeId, b: NodeId) -> usize {
        let other = self.store.node(b);
        self.store
            .node(a)
            .ring()
            .iter()
            .filter(|&&n| other.ring_index_of(n).is_some())
            .count()
    }

    /// Audit every structural and geometric invariant of the mesh.
    ///
    /// Checks ring symmetry, edge-cache coherence, closed triangle fans and
    /// two-triangles-per-edge for bulk nodes, the degree floor, and the
    /// agreement of the running totals with a fresh per-node sum. Intended
    /// for tests and for embedders that mutate meshes through reload paths.
    pub fn validate(&self) -> Result<(), MeshError> {
        const EDGE_TOL: f64 = 1e-9;
        const TOTAL_TOL: f64 = 1e-8;

        for node in self.store.iter() {
            let id = node.id();
            let degree = node.degree();
            let bulk = !self.frozen[id];

            if bulk && degree < MIN_DEGREE {
                return Err(MeshError::DegreeTooLow { node: id, degree });
            }

            for (k, &neighbor) in node.ring().iter().enumerate() {
                if neighbor >= self.store.len() {
                    return Err(MeshError::UnknownNeighbor { node: id, neighbor });
                }
                if node.ring()[..k].contains(&neighbor) {
                    return Err(MeshError::BrokenFan { node: id, slot: k });
                }
                if self.store.node(neighbor).ring_index_of(id).is_none() {
                    return Err(MeshError::AsymmetricAdjacency { a: id, b: neighbor });
                }
                let expected = self.store.node(neighbor).position() - node.position();
                if (node.edges()[k] - expected).norm() > EDGE_TOL {
                    return Err(MeshError::StaleEdgeCache { node: id, slot: k });
                }
                if bulk {
                    let successor = node.ring()[(k + 1) % degree];
                    if self
                        .store
                        .node(neighbor)
                        .ring_index_of(successor)
                        .is_none()
                    {
                        return Err(MeshError::BrokenFan { node: id, slot: k });
                    }
                    if !self.frozen[neighbor] {
                        let shared = self.common_neighbor_count(id, neighbor);
                        if shared != 2 {
                            return Err(MeshError::NonManifoldEdge {
                                a: id,
                                b: neighbor,
                                shared,
                            });
                        }
                    }
                }
            }
        }

        let mut fresh = SurfaceQuantities::zero();
        for node in self.store.iter() {
            fresh += node;
        }
        let drift = [
            ("area", self.totals.area, fresh.area),
            ("volume", self.totals.volume, fresh.volume),
            ("bending energy", self.totals.bending_energy, fresh.bending_energy),
        ];
        for (quantity, stored, recomputed) in drift {
            if (stored - recomputed).abs() > TOTAL_TOL * recomputed.abs().max(1.0) {
                return Err(MeshError::TotalsDrift {
                    quantity,
                    stored,
                    recomputed,
                });
            }
        }
        Ok(())
    }
}
