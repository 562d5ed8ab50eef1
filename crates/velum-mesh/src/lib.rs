#![warn(missing_docs)]

//! Dynamically triangulated surface meshes for membrane Monte-Carlo
//! simulation.
//!
//! A [`Membrane`] is a closed (spherical) or bounded (planar) triangular
//! mesh of nodes. Every node carries its cyclically ordered neighbor ring,
//! cached edge vectors, and the geometry derived from them: a Voronoi-like
//! associated area, a signed volume contribution, the discrete
//! mean-curvature vector, and the Canham–Helfrich bending density at unit
//! rigidity. Two local rewrites — node displacement and edge flip — keep all
//! of it coherent by recomputing only the affected neighborhood and applying
//! the exact delta to the running global totals.
//!
//! # Example
//!
//! ```rust
//! use velum_mesh::{Membrane, Vec3};
//!
//! let mut mesh = Membrane::icosphere(2, 1.0, 0.5);
//! mesh.displace(0, Vec3::new(0.01, 0.0, -0.01));
//! let report = mesh.flip_edge(0, mesh.node(0).ring()[0], 0.0, f64::INFINITY);
//! assert!(mesh.validate().is_ok());
//! # let _ = report;
//! ```

mod aggregate;
mod build;
mod error;
mod geometry;
mod io;
mod mesh;
mod node;

pub use aggregate::SurfaceQuantities;
pub use error::MeshError;
pub use mesh::{FlipReport, Membrane, MeshKind, MIN_DEGREE};
pub use node::{Node, NodeId, NodeStore, NO_NODE};
pub use velum_math::{cotangent, Vec3};
