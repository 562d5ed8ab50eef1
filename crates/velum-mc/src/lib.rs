#![warn(missing_docs)]

//! Metropolis Monte-Carlo driver for velum membranes.
//!
//! The thinnest useful wrapper over the mesh core: it proposes node
//! displacements and edge flips, guards proposals against bond-length
//! violations, and accepts or reverses each one under the Metropolis rule,
//! leaning on the mesh's reversibility guarantees (`displace` by the
//! opposite delta, `unflip_edge` with the recorded report). Counters record
//! every outcome for diagnostics; they never influence decisions.
//!
//! # Example
//!
//! ```rust,no_run
//! use rand::{rngs::StdRng, SeedableRng};
//! use velum_mc::MetropolisUpdater;
//! use velum_mesh::{Membrane, Node, Vec3};
//!
//! let mut mesh = Membrane::icosphere(3, 1.0, 0.4);
//! let mut rng = StdRng::seed_from_u64(1);
//! // Squeeze the membrane towards a target volume.
//! let energy = |node: &Node, mesh: &Membrane| {
//!     let excess = mesh.volume() - 4.0;
//!     100.0 * excess * excess + node.bending_energy()
//! };
//! let mut mc = MetropolisUpdater::new(&mut mesh, energy, &mut rng, 0.1, 0.45, 1.0);
//! for _ in 0..1000 {
//!     mc.sweep(0.05);
//! }
//! println!("{:?}", mc.stats());
//! ```

use rand::Rng;
use serde::Serialize;
use velum_math::Vec3;
use velum_mesh::{Membrane, Node, NodeId};

/// Read-only outcome counters of a [`MetropolisUpdater`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateStatistics {
    /// Displacement proposals issued, including guarded and reversed ones.
    pub move_attempts: u64,
    /// Displacements rejected up front by the bond-length guards.
    pub move_bond_rejections: u64,
    /// Displacements undone by the acceptance rule.
    pub move_reversals: u64,
    /// Flip proposals issued, including rejected and reversed ones.
    pub flip_attempts: u64,
    /// Flips the mesh refused to apply (topology or bond-length guards).
    pub flip_rejections: u64,
    /// Applied flips undone by the acceptance rule.
    pub flip_reversals: u64,
}

impl UpdateStatistics {
    /// Zero all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Accept/reject wrapper around mesh displacement and edge flips.
///
/// Holds the mesh exclusively for its lifetime; the random source and the
/// energy function are borrowed. The energy function may read any geometry
/// but must not mutate — it is evaluated at the proposal's node before and
/// after the trial update.
pub struct MetropolisUpdater<'a, E, R> {
    mesh: &'a mut Membrane,
    energy: E,
    rng: &'a mut R,
    min_bond_sq: f64,
    max_bond_sq: f64,
    temperature: f64,
    stats: UpdateStatistics,
}

impl<'a, E, R> MetropolisUpdater<'a, E, R>
where
    E: Fn(&Node, &Membrane) -> f64,
    R: Rng,
{
    /// Create a driver over `mesh` with bond-length window
    /// `(min_bond, max_bond)` and thermal scale `temperature` (`kT`).
    ///
    /// A zero temperature selects greedy mode: every uphill update is
    /// undone.
    pub fn new(
        mesh: &'a mut Membrane,
        energy: E,
        rng: &'a mut R,
        min_bond: f64,
        max_bond: f64,
        temperature: f64,
    ) -> Self {
        Self {
            mesh,
            energy,
            rng,
            min_bond_sq: min_bond * min_bond,
            max_bond_sq: max_bond * max_bond,
            stats: UpdateStatistics::default(),
            temperature,
        }
    }

    /// The wrapped mesh.
    pub fn mesh(&self) -> &Membrane {
        self.mesh
    }

    /// Outcome counters so far.
    pub fn stats(&self) -> &UpdateStatistics {
        &self.stats
    }

    /// Zero the outcome counters.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Current thermal scale `kT`.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Change the thermal scale, e.g. for annealing schedules.
    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    /// Propose moving `node` by `delta`; returns whether the move stuck.
    ///
    /// The node must be mobile: proposing a frozen boundary node panics in
    /// the mesh core. Order of business: bond-length guards, trial
    /// displacement, Metropolis acceptance, undo by the opposite delta when
    /// the trial is refused.
    pub fn propose_move(&mut self, node: NodeId, delta: Vec3) -> bool {
        self.stats.move_attempts += 1;
        if self.move_breaks_bonds(node, delta) {
            self.stats.move_bond_rejections += 1;
            return false;
        }

        let energy_before = (self.energy)(self.mesh.node(node), self.mesh);
        self.mesh.displace(node, delta);
        let energy_after = (self.energy)(self.mesh.node(node), self.mesh);

        if self.rejects(energy_after - energy_before) {
            self.mesh.displace(node, -delta);
            self.stats.move_reversals += 1;
            return false;
        }
        true
    }

    /// Propose flipping the edge from `node` to a uniformly random ring
    /// neighbor; returns whether a flip stuck.
    pub fn propose_flip(&mut self, node: NodeId) -> bool {
        let degree = self.mesh.node(node).degree();
        let pick = self.rng.gen_range(0..degree);
        let neighbor = self.mesh.node(node).ring()[pick];
        self.propose_flip_with(node, neighbor)
    }

    /// Propose flipping the edge between `node` and `neighbor`.
    ///
    /// `neighbor` is a global node id and must currently sit in `node`'s
    /// ring; anything else is a programmer error and panics in the mesh
    /// core.
    pub fn propose_flip_with(&mut self, node: NodeId, neighbor: NodeId) -> bool {
        self.stats.flip_attempts += 1;

        let energy_before = (self.energy)(self.mesh.node(node), self.mesh);
        let report = self
            .mesh
            .flip_edge(node, neighbor, self.min_bond_sq, self.max_bond_sq);
        if !report.applied {
            self.stats.flip_rejections += 1;
            return false;
        }

        let energy_after = (self.energy)(self.mesh.node(node), self.mesh);
        if self.rejects(energy_after - energy_before) {
            self.mesh.unflip_edge(node, neighbor, report);
            self.stats.flip_reversals += 1;
            return false;
        }
        true
    }

    /// One Monte-Carlo sweep: per node one displacement proposal at a
    /// uniformly random mobile node with a step drawn from
    /// `[-max_step, max_step]³`, then per node one flip proposal at a
    /// uniformly random node.
    pub fn sweep(&mut self, max_step: f64) {
        let count = self.mesh.node_count();
        for _ in 0..count {
            let node = self.rng.gen_range(0..count);
            if self.mesh.is_boundary(node) {
                continue;
            }
            let delta = Vec3::new(
                self.rng.gen_range(-max_step..max_step),
                self.rng.gen_range(-max_step..max_step),
                self.rng.gen_range(-max_step..max_step),
            );
            self.propose_move(node, delta);
        }
        for _ in 0..count {
            let node = self.rng.gen_range(0..count);
            self.propose_flip(node);
        }
    }

    /// Whether the Metropolis rule refuses an energy change of `delta_e`.
    fn rejects(&mut self, delta_e: f64) -> bool {
        if delta_e <= 0.0 {
            return false;
        }
        if self.temperature > 0.0 {
            let u: f64 = self.rng.gen();
            u > (-delta_e / self.temperature).exp()
        } else {
            true
        }
    }

    /// A move is inadmissible when a ring edge would leave the bond window
    /// from inside, or a proximity pair would drop below the lower bound
    /// from above.
    fn move_breaks_bonds(&self, node: NodeId, delta: Vec3) -> bool {
        let record = self.mesh.node(node);
        let moved = record.position() + delta;
        let inside = |d: f64| d > self.min_bond_sq && d < self.max_bond_sq;

        for (k, &neighbor) in record.ring().iter().enumerate() {
            let old = record.edges()[k].norm_squared();
            let new = (self.mesh.node(neighbor).position() - moved).norm_squared();
            if inside(old) && !inside(new) {
                return true;
            }
        }
        for &other in record.proximity() {
            let p = self.mesh.node(other).position();
            let old = (p - record.position()).norm_squared();
            let new = (p - moved).norm_squared();
            if new < self.min_bond_sq && old >= self.min_bond_sq {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Pulls every node towards the origin; any outward move is uphill.
    fn radial_energy(node: &Node, _mesh: &Membrane) -> f64 {
        node.position().norm_squared()
    }

    /// Bond window that accepts every icosphere edge comfortably.
    const LOOSE_MIN: f64 = 0.05;
    const LOOSE_MAX: f64 = 1.5;

    #[test]
    fn greedy_mode_keeps_downhill_moves() {
        let mut mesh = Membrane::icosphere(2, 1.0, 0.6);
        let mut rng = StdRng::seed_from_u64(42);
        let mut mc =
            MetropolisUpdater::new(&mut mesh, radial_energy, &mut rng, LOOSE_MIN, LOOSE_MAX, 0.0);

        let inward = -0.001 * mc.mesh().node(0).position();
        assert!(mc.propose_move(0, inward));
        assert_eq!(mc.stats().move_attempts, 1);
        assert_eq!(mc.stats().move_reversals, 0);
        assert!(mc.mesh().node(0).position().norm() < 1.0);
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn greedy_mode_reverses_uphill_moves_exactly() {
        let mut mesh = Membrane::icosphere(2, 1.0, 0.6);
        let reference = mesh.clone();
        let mut rng = StdRng::seed_from_u64(42);
        let mut mc =
            MetropolisUpdater::new(&mut mesh, radial_energy, &mut rng, LOOSE_MIN, LOOSE_MAX, 0.0);

        let outward = 0.001 * mc.mesh().node(0).position();
        assert!(!mc.propose_move(0, outward));
        assert_eq!(mc.stats().move_reversals, 1);
        assert_eq!(mc.stats().move_bond_rejections, 0);

        for id in 0..reference.node_count() {
            assert_abs_diff_eq!(
                (mc.mesh().node(id).position() - reference.node(id).position()).norm(),
                0.0,
                epsilon = 1e-15
            );
            assert_abs_diff_eq!(
                mc.mesh().node(id).area(),
                reference.node(id).area(),
                epsilon = 1e-12
            );
        }
        assert_abs_diff_eq!(mc.mesh().area(), reference.area(), epsilon = 1e-12);
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn bond_guard_stops_stretching_moves_before_any_energy_work() {
        let mut mesh = Membrane::icosphere(2, 1.0, 0.6);
        let reference = mesh.clone();
        let mut rng = StdRng::seed_from_u64(3);
        let mut mc =
            MetropolisUpdater::new(&mut mesh, radial_energy, &mut rng, LOOSE_MIN, LOOSE_MAX, 1.0);

        // Two radii outward tears every bond past the window.
        assert!(!mc.propose_move(0, 2.0 * mc.mesh().node(0).position()));
        assert_eq!(mc.stats().move_bond_rejections, 1);
        assert_eq!(mc.stats().move_attempts, 1);
        assert_eq!(mc.stats().move_reversals, 0);
        assert_eq!(
            mc.mesh().node(0).position(),
            reference.node(0).position()
        );
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn proximity_guard_stops_approaches_below_the_floor() {
        // The cutoff reaches past the first shell (edges ~0.37, second
        // shell ~0.65 on this mesh).
        let mut mesh = Membrane::icosphere(2, 1.0, 0.8);
        // Find a proximity partner of node 0 that is not a ring neighbor.
        let target = mesh
            .node(0)
            .proximity()
            .iter()
            .copied()
            .find(|&p| mesh.node(0).ring_index_of(p).is_none())
            .expect("proximity cutoff covers the second shell");
        let gap = mesh.node(target).position() - mesh.node(0).position();

        let mut rng = StdRng::seed_from_u64(3);
        let mut mc =
            MetropolisUpdater::new(&mut mesh, radial_energy, &mut rng, 0.3, 1.5, 1.0);
        // Step almost the whole way towards the partner.
        assert!(!mc.propose_move(0, 0.95 * gap));
        assert_eq!(mc.stats().move_bond_rejections, 1);
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn flips_on_pentagon_meshes_are_counted_as_rejections() {
        let mut mesh = Membrane::icosphere(0, 1.0, 2.0);
        let mut rng = StdRng::seed_from_u64(9);
        let mut mc =
            MetropolisUpdater::new(&mut mesh, radial_energy, &mut rng, 0.05, 2.5, 1.0);
        for _ in 0..20 {
            assert!(!mc.propose_flip(0));
        }
        assert_eq!(mc.stats().flip_attempts, 20);
        assert_eq!(mc.stats().flip_rejections, 20);
        assert_eq!(mc.stats().flip_reversals, 0);
        mc.mesh().validate().unwrap();
    }

    /// Equality of rings as cyclic sequences, ignoring the stored rotation.
    fn same_cyclic_order(a: &[NodeId], b: &[NodeId]) -> bool {
        a.len() == b.len()
            && (a.is_empty()
                || (0..a.len()).any(|shift| (0..a.len()).all(|k| a[k] == b[(k + shift) % b.len()])))
    }

    #[test]
    fn uphill_flips_are_reversed() {
        let mut mesh = Membrane::icosphere(2, 1.0, 0.6);
        let reference = mesh.clone();

        // Losing a neighbor costs energy, so every applied flip at the
        // proposal node is uphill and must be undone in greedy mode.
        let degree_energy = |node: &Node, _: &Membrane| -(node.degree() as f64);
        let mut rng = StdRng::seed_from_u64(11);
        let mut mc = MetropolisUpdater::new(
            &mut mesh,
            degree_energy,
            &mut rng,
            LOOSE_MIN,
            LOOSE_MAX,
            0.0,
        );

        for node in 0..mc.mesh().node_count() {
            let ring: Vec<NodeId> = mc.mesh().node(node).ring().to_vec();
            for neighbor in ring {
                assert!(!mc.propose_flip_with(node, neighbor));
            }
        }
        assert!(
            mc.stats().flip_reversals > 0,
            "no flip ever passed the guards"
        );

        for id in 0..reference.node_count() {
            assert!(same_cyclic_order(
                mc.mesh().node(id).ring(),
                reference.node(id).ring()
            ));
        }
        assert_abs_diff_eq!(mc.mesh().area(), reference.area(), epsilon = 1e-10);
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn downhill_flips_stick() {
        let mut mesh = Membrane::icosphere(2, 1.0, 0.6);
        let degree_energy = |node: &Node, _: &Membrane| node.degree() as f64;
        let mut rng = StdRng::seed_from_u64(5);
        let mut mc = MetropolisUpdater::new(
            &mut mesh,
            degree_energy,
            &mut rng,
            LOOSE_MIN,
            LOOSE_MAX,
            0.0,
        );

        let mut stuck = None;
        'search: for node in 0..mc.mesh().node_count() {
            let ring: Vec<NodeId> = mc.mesh().node(node).ring().to_vec();
            for neighbor in ring {
                if mc.propose_flip_with(node, neighbor) {
                    stuck = Some((node, neighbor));
                    break 'search;
                }
            }
        }
        let (node, neighbor) = stuck.expect("some flip should be downhill and admissible");
        assert!(mc.mesh().node(node).ring_index_of(neighbor).is_none());
        assert_eq!(mc.stats().flip_reversals, 0);
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn hot_sweeps_keep_the_mesh_consistent() {
        let mut mesh = Membrane::icosphere(2, 1.0, 0.6);
        let mut rng = StdRng::seed_from_u64(1234);
        let energy = |node: &Node, _: &Membrane| node.bending_energy();
        let mut mc =
            MetropolisUpdater::new(&mut mesh, energy, &mut rng, LOOSE_MIN, LOOSE_MAX, 2.0);

        for _ in 0..5 {
            mc.sweep(0.02);
        }
        let stats = *mc.stats();
        // 92 nodes, one move and one flip proposal each, five sweeps.
        assert_eq!(stats.move_attempts, 5 * 92);
        assert_eq!(stats.flip_attempts, 5 * 92);
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn planar_sweeps_never_touch_the_frame() {
        let mut mesh = Membrane::rectangle(8, 8, 7.0, 7.0, 1.6);
        let frame: Vec<(NodeId, Vec3)> = mesh
            .boundary_ids()
            .map(|id| (id, mesh.node(id).position()))
            .collect();

        let mut rng = StdRng::seed_from_u64(77);
        let energy = |node: &Node, _: &Membrane| node.bending_energy();
        let mut mc = MetropolisUpdater::new(&mut mesh, energy, &mut rng, 0.2, 1.9, 1.0);
        for _ in 0..3 {
            mc.sweep(0.05);
        }
        for (id, position) in frame {
            assert_eq!(mc.mesh().node(id).position(), position);
            assert_eq!(mc.mesh().node(id).area(), 0.0);
        }
        mc.mesh().validate().unwrap();
    }

    #[test]
    fn annealing_changes_the_acceptance_regime() {
        let mut mesh = Membrane::icosphere(1, 1.0, 0.6);
        let mut rng = StdRng::seed_from_u64(2);
        let mut mc =
            MetropolisUpdater::new(&mut mesh, radial_energy, &mut rng, LOOSE_MIN, LOOSE_MAX, 1.5);
        assert_eq!(mc.temperature(), 1.5);
        mc.set_temperature(0.0);
        // Greedy now: the same uphill proposal is always reversed.
        let outward = 0.002 * mc.mesh().node(4).position();
        assert!(!mc.propose_move(4, outward));
        assert_eq!(mc.stats().move_reversals, 1);
    }

    #[test]
    fn statistics_reset_zeroes_every_counter() {
        let mut mesh = Membrane::icosphere(0, 1.0, 2.0);
        let mut rng = StdRng::seed_from_u64(8);
        let mut mc =
            MetropolisUpdater::new(&mut mesh, radial_energy, &mut rng, 0.05, 2.5, 1.0);
        mc.propose_flip(0);
        assert_ne!(*mc.stats(), UpdateStatistics::default());
        mc.reset_stats();
        assert_eq!(*mc.stats(), UpdateStatistics::default());
    }
}
