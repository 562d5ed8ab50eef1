//! JSON persistence: an attribute map keyed by decimal node id.
//!
//! The dump carries everything downstream analysis wants (positions,
//! connectivity, proximity, and the derived scalars); reload trusts only
//! positions, connectivity, and proximity, and recomputes every derived
//! quantity, so a reloaded mesh always satisfies the aggregate-consistency
//! invariant. Cached edge vectors are never stored. Reload reconstructs a
//! spherical mesh; the format has no boundary notion, so planar reload is
//! deliberately unsupported.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use velum_math::Vec3;

use crate::error::MeshError;
use crate::mesh::{Membrane, MeshKind};
use crate::node::NodeId;

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    area: f64,
    volume: f64,
    bending_energy_unit: f64,
    position: [f64; 3],
    curvature_vec: [f64; 3],
    neighbor_ids: Vec<NodeId>,
    proximity_ids: Vec<NodeId>,
}

impl Membrane {
    /// Serialize the mesh as a JSON attribute map keyed by decimal node id.
    pub fn to_json_string(&self) -> Result<String, MeshError> {
        let mut map = BTreeMap::new();
        for node in self.nodes() {
            let p = node.position();
            let k = node.curvature();
            map.insert(
                node.id().to_string(),
                NodeRecord {
                    area: node.area(),
                    volume: node.volume(),
                    bending_energy_unit: node.bending_energy(),
                    position: [p.x, p.y, p.z],
                    curvature_vec: [k.x, k.y, k.z],
                    neighbor_ids: node.ring().to_vec(),
                    proximity_ids: node.proximity().to_vec(),
                },
            );
        }
        Ok(serde_json::to_string_pretty(&map)?)
    }

    /// Rebuild a spherical mesh from its JSON attribute map.
    ///
    /// Fails on anything malformed: non-decimal keys, duplicate or
    /// non-dense ids, rings that are asymmetric or not closed fans. Edge
    /// caches, derived scalars, and totals are recomputed from the loaded
    /// positions and connectivity.
    pub fn from_json_str(text: &str) -> Result<Membrane, MeshError> {
        let map: BTreeMap<String, NodeRecord> = serde_json::from_str(text)?;
        let count = map.len();

        let mut positions = vec![Vec3::zeros(); count];
        let mut rings: Vec<Vec<NodeId>> = vec![Vec::new(); count];
        let mut proximity: Vec<Vec<NodeId>> = vec![Vec::new(); count];
        let mut seen = vec![false; count];

        for (key, record) in map {
            let id: NodeId = key
                .parse()
                .map_err(|_| MeshError::BadNodeKey { key: key.clone() })?;
            if id >= count {
                return Err(MeshError::SparseIds {
                    expected: count,
                    found: id,
                });
            }
            if seen[id] {
                return Err(MeshError::DuplicateNode { id });
            }
            seen[id] = true;

            for &neighbor in &record.neighbor_ids {
                if neighbor >= count {
                    return Err(MeshError::UnknownNeighbor { node: id, neighbor });
                }
            }
            let [x, y, z] = record.position;
            positions[id] = Vec3::new(x, y, z);
            rings[id] = record.neighbor_ids;
            proximity[id] = record.proximity_ids;
        }

        let mut mesh = Membrane::assemble(MeshKind::Spherical, positions, rings, vec![false; count]);
        for (id, list) in proximity.into_iter().enumerate() {
            mesh.set_proximity(id, list);
        }
        mesh.validate()?;
        debug!("reloaded spherical mesh with {count} nodes");
        Ok(mesh)
    }

    /// Write the JSON attribute map to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MeshError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Read a spherical mesh back from a file written by [`Membrane::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Membrane, MeshError> {
        Membrane::from_json_str(&fs::read_to_string(path)?)
    }
}
