//! Local geometry update laws: mixed areas, face normals, and the discrete
//! mean-curvature accumulation over a node's triangle fan.

use velum_math::{cotangent, Vec3, DEGENERACY_EPS};

use crate::node::{NodeId, NodeStore};

/// Node-associated portion of one triangle's area (Meyer et al.).
///
/// `e0`, `e1` are the edges from the node to two consecutive ring neighbors,
/// `triangle_area` the full area of that triangle, and `cot0`, `cot1` the
/// cotangents of the angles at the two neighbors. Non-obtuse triangles get
/// the Voronoi area; a triangle obtuse at the node contributes half its
/// area, one obtuse at a neighbor a quarter.
pub(crate) fn mixed_area(e0: &Vec3, e1: &Vec3, triangle_area: f64, cot0: f64, cot1: f64) -> f64 {
    if cot0 > 0.0 && cot1 > 0.0 {
        if e0.dot(e1) > 0.0 {
            0.125 * (cot1 * e0.norm_squared() + cot0 * e1.norm_squared())
        } else {
            0.5 * triangle_area
        }
    } else {
        0.25 * triangle_area
    }
}

/// Recompute everything derived at one node from its stored position and
/// ring: cached edge vectors first, then area, signed volume contribution,
/// mean-curvature vector, and bending-energy density.
///
/// Frozen (boundary) nodes get the edge refresh but keep all scalars at
/// zero. A zero-area face trips the debug assertion; release builds carry on
/// and let the arithmetic produce NaN, on the assumption that the driver's
/// bond-length guards keep the simulation away from degenerate triangles.
pub(crate) fn refresh_vertex(store: &mut NodeStore, id: NodeId, frozen: bool) {
    let degree = store.node(id).degree();
    let center = store.node(id).position();
    for k in 0..degree {
        let neighbor = store.node(id).ring()[k];
        let edge = store.node(neighbor).position() - center;
        store.node_mut(id).edges[k] = edge;
    }

    if frozen {
        let node = store.node_mut(id);
        node.area = 0.0;
        node.volume = 0.0;
        node.bending_energy = 0.0;
        node.curvature = Vec3::zeros();
        return;
    }

    let mut area = 0.0;
    let mut oriented_area = Vec3::zeros();
    let mut kappa = Vec3::zeros();
    {
        let node = store.node(id);
        for j in 0..degree {
            let e0 = node.edges[j];
            let e1 = node.edges[(j + 1) % degree];
            // The rim runs between the two neighbors, opposite this node.
            let rim = e1 - e0;
            let cot0 = cotangent(&e0, &-rim);
            let cot1 = cotangent(&e1, &rim);
            let face = e0.cross(&e1);
            let face_norm = face.norm();
            debug_assert!(
                face_norm > DEGENERACY_EPS,
                "degenerate face in the fan of node {id} at ring slot {j}"
            );
            let patch = mixed_area(&e0, &e1, 0.5 * face_norm, cot0, cot1);
            area += patch;
            oriented_area += (patch / face_norm) * face;
            kappa -= cot1 * e0 + cot0 * e1;
        }
    }

    let node = store.node_mut(id);
    node.area = area;
    node.volume = center.dot(&oriented_area) / 3.0;
    node.curvature = -kappa / (2.0 * area);
    node.bending_energy = kappa.norm_squared() / (8.0 * area);
}
