//! Oriented cutting planes and the geometric diversity predicate.

use nalgebra::Vector3;

use crate::cfg::SelectCfg;

/// Oriented cutting plane `n · x = offset`, `n` a unit normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneCut {
    pub n: Vector3<f64>,
    pub offset: f64,
}

impl PlaneCut {
    #[inline]
    pub fn new(n: Vector3<f64>, offset: f64) -> Self {
        Self { n, offset }
    }

    /// Read a plane from a feature-row tail `[nx, ny, nz, offset]`.
    ///
    /// Panics if `tail` has fewer than four entries; callers validate the
    /// engine's feature width up front.
    #[inline]
    pub fn from_tail(tail: &[f64]) -> Self {
        Self {
            n: Vector3::new(tail[0], tail[1], tail[2]),
            offset: tail[3],
        }
    }
}

/// Whether two oriented planes are geometrically distinct enough to coexist
/// among cuts of the same beam element.
///
/// Near-parallel normals (`|a·b| > parallel_dot`) whose offsets differ by
/// less than `offset_scale * |a·b|` count as duplicates. Symmetric in its
/// arguments; no state.
#[inline]
pub fn is_diverse(a: &PlaneCut, b: &PlaneCut, cfg: &SelectCfg) -> bool {
    let dot = a.n.dot(&b.n).abs();
    if dot > cfg.parallel_dot && (a.offset - b.offset).abs() < cfg.offset_scale * dot {
        return false;
    }
    true
}
