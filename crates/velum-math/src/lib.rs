#![warn(missing_docs)]

//! Math types for the velum membrane engine.
//!
//! Thin wrappers around nalgebra providing the vector type and the small
//! trigonometric helpers the discrete-curvature machinery is built on.

/// A vector (or a point relative to the lab-frame origin) in 3D space.
///
/// Value semantics, trivially copyable. Indexing with `v[k]` panics for
/// `k > 2`; division and normalization do not check for zero — callers are
/// responsible.
pub type Vec3 = nalgebra::Vector3<f64>;

/// Threshold below which a face normal is considered degenerate.
///
/// Only consulted by debug assertions; release builds let the arithmetic
/// run and produce whatever NaN/Inf it produces.
pub const DEGENERACY_EPS: f64 = 1e-300;

/// Cotangent of the angle between `a` and `b`: `a·b / ‖a×b‖`.
///
/// Unchecked: parallel inputs divide by zero.
#[inline]
pub fn cotangent(a: &Vec3, b: &Vec3) -> f64 {
    a.dot(b) / a.cross(b).norm()
}
