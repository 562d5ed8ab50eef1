//! Mesh seeding: icosahedral sphere subdivision and the rectangular patch.

use std::collections::{HashMap, HashSet};

use log::debug;
use velum_math::Vec3;

use crate::mesh::{Membrane, MeshKind};
use crate::node::NodeId;

/// Exact identity of a subdivision lattice point, used to deduplicate the
/// points shared between faces without ever comparing floating positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lattice {
    /// One of the twelve seed vertices.
    Corner(usize),
    /// `step` subdivisions along the seed edge `(lo, hi)`, counted from `lo`.
    Edge { lo: usize, hi: usize, step: usize },
    /// Interior grid point of one seed face.
    Inner { face: usize, i: usize, j: usize },
}

fn edge_key(from: usize, to: usize, step: usize, frequency: usize) -> Lattice {
    if from < to {
        Lattice::Edge {
            lo: from,
            hi: to,
            step,
        }
    } else {
        Lattice::Edge {
            lo: to,
            hi: from,
            step: frequency - step,
        }
    }
}

/// The twelve vertices and twenty faces of a regular icosahedron built on
/// three orthogonal golden rectangles.
fn icosahedron() -> (Vec<Vec3>, [[usize; 3]; 20]) {
    let phi = (1.0 + 5f64.sqrt()) / 2.0;
    let vertices = vec![
        Vec3::new(-1.0, phi, 0.0),
        Vec3::new(1.0, phi, 0.0),
        Vec3::new(-1.0, -phi, 0.0),
        Vec3::new(1.0, -phi, 0.0),
        Vec3::new(0.0, -1.0, phi),
        Vec3::new(0.0, 1.0, phi),
        Vec3::new(0.0, -1.0, -phi),
        Vec3::new(0.0, 1.0, -phi),
        Vec3::new(phi, 0.0, -1.0),
        Vec3::new(phi, 0.0, 1.0),
        Vec3::new(-phi, 0.0, -1.0),
        Vec3::new(-phi, 0.0, 1.0),
    ];
    let faces = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    (vertices, faces)
}

/// Order the neighbors of `center` into a fan by walking mutual adjacency.
/// Closed rings may start anywhere (the smallest id, for determinism); open
/// fans of boundary nodes start at a chain end.
fn order_fan(center: NodeId, adjacency: &[HashSet<NodeId>]) -> Vec<NodeId> {
    let members = &adjacency[center];
    let within = |u: NodeId| {
        adjacency[u]
            .iter()
            .filter(|x| members.contains(*x))
            .count()
    };
    let start = members
        .iter()
        .copied()
        .filter(|&u| within(u) == 1)
        .min()
        .or_else(|| members.iter().copied().min())
        .expect("node has no neighbors");

    let mut fan = Vec::with_capacity(members.len());
    fan.push(start);
    let mut current = start;
    while fan.len() < members.len() {
        let next = adjacency[current]
            .iter()
            .copied()
            .find(|x| members.contains(x) && !fan.contains(x))
            .expect("neighborhood is not a simple fan");
        fan.push(next);
        current = next;
    }
    fan
}

/// Flip the fan's direction of travel whenever the summed face normals point
/// against `outward`. A closed ring keeps its first entry (only the travel
/// direction changes); an open chain is reversed end to end.
fn orient_fan(fan: &mut [NodeId], positions: &[Vec3], center: NodeId, outward: Vec3, closed: bool) {
    let p = positions[center];
    let pairs = if closed { fan.len() } else { fan.len() - 1 };
    let mut winding = 0.0;
    for k in 0..pairs {
        let e0 = positions[fan[k]] - p;
        let e1 = positions[fan[(k + 1) % fan.len()]] - p;
        winding += e0.cross(&e1).dot(&outward);
    }
    if winding < 0.0 {
        if closed {
            fan[1..].reverse();
        } else {
            fan.reverse();
        }
    }
}

fn adjacency_of(triangles: &[[NodeId; 3]], count: usize) -> Vec<HashSet<NodeId>> {
    let mut adjacency = vec![HashSet::new(); count];
    for t in triangles {
        for (u, v) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            adjacency[u].insert(v);
            adjacency[v].insert(u);
        }
    }
    adjacency
}

impl Membrane {
    /// Closed sphere of radius `radius` from an icosahedron subdivided with
    /// `level` equidistant points on every seed edge.
    ///
    /// Produces exactly `12 + 30·level + 20·level·(level − 1)/2` nodes: the
    /// seed vertices keep five neighbors, every added node gets six. All
    /// rings are oriented counterclockwise as seen from outside, proximity
    /// lists are built at `verlet_radius`, and the global totals are summed
    /// once here.
    pub fn icosphere(level: usize, radius: f64, verlet_radius: f64) -> Membrane {
        let (seed_vertices, seed_faces) = icosahedron();
        let frequency = level + 1;

        let mut ids: HashMap<Lattice, NodeId> = HashMap::new();
        let mut positions: Vec<Vec3> = Vec::new();
        let mut triangles: Vec<[NodeId; 3]> = Vec::new();

        for (face_index, &[va, vb, vc]) in seed_faces.iter().enumerate() {
            // Barycentric grid over this face; i weights vb, j weights vc.
            let side = frequency + 1;
            let mut grid = vec![usize::MAX; side * side];
            for i in 0..=frequency {
                for j in 0..=(frequency - i) {
                    let key = if i == 0 && j == 0 {
                        Lattice::Corner(va)
                    } else if i == frequency {
                        Lattice::Corner(vb)
                    } else if j == frequency {
                        Lattice::Corner(vc)
                    } else if j == 0 {
                        edge_key(va, vb, i, frequency)
                    } else if i == 0 {
                        edge_key(va, vc, j, frequency)
                    } else if i + j == frequency {
                        edge_key(vb, vc, j, frequency)
                    } else {
                        Lattice::Inner {
                            face: face_index,
                            i,
                            j,
                        }
                    };
                    let id = *ids.entry(key).or_insert_with(|| {
                        let remainder = (frequency - i - j) as f64;
                        let p = (seed_vertices[va] * remainder
                            + seed_vertices[vb] * i as f64
                            + seed_vertices[vc] * j as f64)
                            / frequency as f64;
                        positions.push(p);
                        positions.len() - 1
                    });
                    grid[i * side + j] = id;
                }
            }
            for i in 0..frequency {
                for j in 0..(frequency - i) {
                    triangles.push([
                        grid[i * side + j],
                        grid[(i + 1) * side + j],
                        grid[i * side + j + 1],
                    ]);
                    if i + j + 1 < frequency {
                        triangles.push([
                            grid[(i + 1) * side + j],
                            grid[(i + 1) * side + j + 1],
                            grid[i * side + j + 1],
                        ]);
                    }
                }
            }
        }

        for p in &mut positions {
            *p = p.normalize() * radius;
        }

        let count = positions.len();
        let adjacency = adjacency_of(&triangles, count);
        let center = positions.iter().fold(Vec3::zeros(), |acc, p| acc + p) / count as f64;

        let mut rings = Vec::with_capacity(count);
        for id in 0..count {
            let mut fan = order_fan(id, &adjacency);
            orient_fan(&mut fan, &positions, id, positions[id] - center, true);
            rings.push(fan);
        }

        let mut mesh = Membrane::assemble(MeshKind::Spherical, positions, rings, vec![false; count]);
        mesh.rebuild_proximity(verlet_radius);
        debug!(
            "seeded icosphere: level {level}, {count} nodes, area {:.6}, volume {:.6}",
            mesh.area(),
            mesh.volume()
        );
        mesh
    }

    /// Flat rectangular patch of `nx × ny` nodes spanning `lx × ly` in the
    /// `z = 0` plane, triangulated with alternating cell diagonals.
    ///
    /// Nodes on the outer frame form the frozen boundary: their positions
    /// never change and their surface quantities stay zero. Bulk rings are
    /// oriented upward, judged against a reference point slightly above the
    /// patch's mass center.
    pub fn rectangle(nx: usize, ny: usize, lx: f64, ly: f64, verlet_radius: f64) -> Membrane {
        assert!(nx >= 3 && ny >= 3, "a patch needs interior nodes");
        let count = nx * ny;
        let dx = lx / (nx - 1) as f64;
        let dy = ly / (ny - 1) as f64;

        let mut positions = Vec::with_capacity(count);
        for row in 0..ny {
            for col in 0..nx {
                positions.push(Vec3::new(col as f64 * dx, row as f64 * dy, 0.0));
            }
        }
        let at = |row: usize, col: usize| row * nx + col;

        // Alternating the diagonal by column keeps every interior node at
        // degree six, which is what the degree floor and the flip guards
        // assume of bulk nodes.
        let mut triangles = Vec::with_capacity(2 * (nx - 1) * (ny - 1));
        for row in 0..(ny - 1) {
            for col in 0..(nx - 1) {
                let p00 = at(row, col);
                let p10 = at(row, col + 1);
                let p01 = at(row + 1, col);
                let p11 = at(row + 1, col + 1);
                if col % 2 == 0 {
                    triangles.push([p00, p10, p11]);
                    triangles.push([p00, p11, p01]);
                } else {
                    triangles.push([p00, p10, p01]);
                    triangles.push([p10, p11, p01]);
                }
            }
        }

        let frozen: Vec<bool> = (0..count)
            .map(|id| {
                let row = id / nx;
                let col = id % nx;
                row == 0 || row == ny - 1 || col == 0 || col == nx - 1
            })
            .collect();

        let adjacency = adjacency_of(&triangles, count);
        let center = positions.iter().fold(Vec3::zeros(), |acc, p| acc + p) / count as f64;
        let overhead = center + Vec3::new(0.0, 0.0, 0.01 * lx.max(ly));

        let mut rings = Vec::with_capacity(count);
        for id in 0..count {
            let mut fan = order_fan(id, &adjacency);
            orient_fan(
                &mut fan,
                &positions,
                id,
                overhead - positions[id],
                !frozen[id],
            );
            rings.push(fan);
        }

        let mut mesh = Membrane::assemble(MeshKind::Planar, positions, rings, frozen);
        mesh.rebuild_proximity(verlet_radius);
        debug!(
            "seeded rectangular patch: {nx}x{ny} nodes over {lx}x{ly}, area {:.6}",
            mesh.area()
        );
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn seed_node_count(level: usize) -> usize {
        12 + 30 * level + 20 * level * level.saturating_sub(1) / 2
    }

    #[test]
    fn node_count_matches_the_closed_form() {
        for level in 0..5 {
            let mesh = Membrane::icosphere(level, 1.0, 0.4);
            assert_eq!(mesh.node_count(), seed_node_count(level));
        }
        assert_eq!(seed_node_count(3), 162);
        assert_eq!(seed_node_count(4), 252);
    }

    #[test]
    fn subdivision_keeps_twelve_pentagons() {
        let mesh = Membrane::icosphere(2, 1.0, 0.4);
        let fives = mesh.nodes().filter(|n| n.degree() == 5).count();
        let sixes = mesh.nodes().filter(|n| n.degree() == 6).count();
        assert_eq!(fives, 12);
        assert_eq!(fives + sixes, mesh.node_count());
    }

    #[test]
    fn every_node_sits_on_the_sphere() {
        let mesh = Membrane::icosphere(3, 2.5, 1.0);
        for node in mesh.nodes() {
            assert_relative_eq!(node.position().norm(), 2.5, max_relative = 1e-12);
        }
        mesh.validate().unwrap();
    }

    #[test]
    fn totals_converge_towards_the_smooth_sphere() {
        let coarse = Membrane::icosphere(2, 1.0, 0.4);
        let fine = Membrane::icosphere(4, 1.0, 0.4);
        assert_eq!(fine.node_count(), 252);

        let sphere_area = 4.0 * PI;
        let sphere_volume = 4.0 * PI / 3.0;

        let area_err = |m: &Membrane| (sphere_area - m.area()) / sphere_area;
        let volume_err = |m: &Membrane| (sphere_volume - m.volume()) / sphere_volume;

        // Inscribed, so always from below; errors shrink with refinement.
        assert!(area_err(&fine) > 0.0 && area_err(&fine) < 0.02);
        assert!(volume_err(&fine) > 0.0 && volume_err(&fine) < 0.03);
        assert!(area_err(&coarse) > area_err(&fine));
        assert!(volume_err(&coarse) > volume_err(&fine));
    }

    #[test]
    fn bending_energy_approaches_the_smooth_sphere_limit() {
        // The Canham–Helfrich integral of a sphere at unit rigidity is 8π,
        // independent of radius.
        let limit = 8.0 * PI;
        let coarse = Membrane::icosphere(2, 1.0, 0.4);
        let fine = Membrane::icosphere(4, 1.0, 0.4);
        let err = |m: &Membrane| (limit - m.bending_energy()) / limit;
        assert!(err(&fine) > 0.0 && err(&fine) < 0.02);
        assert!(err(&coarse) > err(&fine));
    }

    #[test]
    fn rings_wind_counterclockwise_seen_from_outside() {
        let mesh = Membrane::icosphere(1, 1.0, 0.6);
        for node in mesh.nodes() {
            let outward = node.position();
            let mut winding = 0.0;
            let degree = node.degree();
            for k in 0..degree {
                let e0 = node.edges()[k];
                let e1 = node.edges()[(k + 1) % degree];
                winding += e0.cross(&e1).dot(&outward);
            }
            assert!(winding > 0.0, "ring of node {} winds inward", node.id());
        }
    }

    #[test]
    fn patch_frame_is_frozen_and_flat_bulk_is_curvature_free() {
        let mesh = Membrane::rectangle(10, 10, 9.0, 9.0, 1.5);
        assert_eq!(mesh.node_count(), 100);
        assert_eq!(mesh.boundary_ids().count(), 36);
        mesh.validate().unwrap();

        for node in mesh.nodes() {
            if mesh.is_boundary(node.id()) {
                assert_eq!(node.area(), 0.0);
                assert_eq!(node.volume(), 0.0);
                assert_eq!(node.bending_energy(), 0.0);
                assert_eq!(node.curvature(), Vec3::zeros());
            } else {
                assert!(node.curvature().norm() < 1e-10);
                assert!(node.area() > 0.0);
            }
        }
    }

    #[test]
    fn patch_bulk_rings_wind_counterclockwise_from_above() {
        let mesh = Membrane::rectangle(6, 5, 5.0, 4.0, 1.5);
        let up = Vec3::new(0.0, 0.0, 1.0);
        for node in mesh.nodes() {
            if mesh.is_boundary(node.id()) {
                continue;
            }
            let degree = node.degree();
            let mut winding = 0.0;
            for k in 0..degree {
                let e0 = node.edges()[k];
                let e1 = node.edges()[(k + 1) % degree];
                winding += e0.cross(&e1).dot(&up);
            }
            assert!(winding > 0.0);
        }
    }

    #[test]
    fn patch_flips_touching_the_frame_are_rejected() {
        let mut mesh = Membrane::rectangle(10, 10, 9.0, 9.0, 1.5);
        let boundary: Vec<_> = mesh.boundary_ids().collect();
        for &id in &boundary {
            let ring: Vec<_> = mesh.node(id).ring().to_vec();
            for b in ring {
                assert!(!mesh.flip_edge(id, b, 0.0, f64::INFINITY).applied);
            }
        }
        mesh.validate().unwrap();
    }

    #[test]
    fn moving_bulk_next_to_the_frame_keeps_boundary_quantities_zero() {
        let mut mesh = Membrane::rectangle(10, 10, 9.0, 9.0, 1.5);
        // Node (1, 1) touches four frame nodes.
        let id = 11;
        assert!(!mesh.is_boundary(id));
        mesh.displace(id, Vec3::new(0.05, -0.02, 0.3));
        assert!(mesh.node(id).curvature().norm() > 1e-6);
        for &n in mesh.node(id).ring() {
            if mesh.is_boundary(n) {
                assert_eq!(mesh.node(n).area(), 0.0);
                assert_eq!(mesh.node(n).bending_energy(), 0.0);
            }
        }
        mesh.validate().unwrap();
    }

    #[test]
    #[should_panic(expected = "frozen boundary")]
    fn moving_a_frame_node_is_fatal() {
        let mut mesh = Membrane::rectangle(6, 6, 5.0, 5.0, 1.5);
        mesh.displace(0, Vec3::new(0.1, 0.0, 0.0));
    }
}
