//! Additive bundle of the global surface quantities.

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Total area, enclosed volume, and bending energy of a set of nodes.
///
/// Componentwise additive, so a local pre/post difference can be applied to
/// the running global totals without ever rescanning the mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceQuantities {
    /// Sum of per-node associated areas.
    pub area: f64,
    /// Sum of per-node signed volume contributions.
    pub volume: f64,
    /// Sum of per-node bending-energy densities.
    pub bending_energy: f64,
}

impl SurfaceQuantities {
    /// The zero bundle.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl Add for SurfaceQuantities {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            area: self.area + rhs.area,
            volume: self.volume + rhs.volume,
            bending_energy: self.bending_energy + rhs.bending_energy,
        }
    }
}

impl Sub for SurfaceQuantities {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            area: self.area - rhs.area,
            volume: self.volume - rhs.volume,
            bending_energy: self.bending_energy - rhs.bending_energy,
        }
    }
}

impl AddAssign for SurfaceQuantities {
    fn add_assign(&mut self, rhs: Self) {
        self.area += rhs.area;
        self.volume += rhs.volume;
        self.bending_energy += rhs.bending_energy;
    }
}

impl SubAssign for SurfaceQuantities {
    fn sub_assign(&mut self, rhs: Self) {
        self.area -= rhs.area;
        self.volume -= rhs.volume;
        self.bending_energy -= rhs.bending_energy;
    }
}

impl AddAssign<&Node> for SurfaceQuantities {
    fn add_assign(&mut self, node: &Node) {
        self.area += node.area;
        self.volume += node.volume;
        self.bending_energy += node.bending_energy;
    }
}

impl From<&Node> for SurfaceQuantities {
    fn from(node: &Node) -> Self {
        Self {
            area: node.area,
            volume: node.volume,
            bending_energy: node.bending_energy,
        }
    }
}
