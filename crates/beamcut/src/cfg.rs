//! Tolerance and schedule defaults for beam selection.
//!
//! Policy
//! - Defaults match the reference planner and are not meant for routine
//!   tuning. They are grouped in one struct so tests and ablations can vary
//!   them without touching call sites.

/// Selection configuration: feasibility cutoffs, the adaptive residual
/// tolerance schedule, and the plane-diversity thresholds.
#[derive(Clone, Copy, Debug)]
pub struct SelectCfg {
    /// Rows with a volume fraction below this are infeasible and zeroed.
    pub min_volume: f64,
    /// Raw local rewards below this signal candidate exhaustion: the walk
    /// over the descending-reward order stops at the first such row.
    pub exhausted_reward: f64,
    /// Initial residual tolerance for a round.
    pub epsilon_start: f64,
    /// Multiplier applied to the tolerance after each full pass.
    pub epsilon_growth: f64,
    /// The round gives up once the tolerance exceeds this cap.
    pub epsilon_cap: f64,
    /// Normals with `|a·b|` above this count as parallel for the
    /// diversity predicate.
    pub parallel_dot: f64,
    /// Parallel planes with offsets closer than `offset_scale * |a·b|` are
    /// duplicates.
    pub offset_scale: f64,
}

impl Default for SelectCfg {
    fn default() -> Self {
        Self {
            min_volume: 0.1,
            exhausted_reward: 1e-4,
            epsilon_start: 1e-4,
            epsilon_growth: 5.0,
            epsilon_cap: 1e3,
            parallel_dot: 0.95,
            offset_scale: 2.0,
        }
    }
}

impl SelectCfg {
    /// Upper bound on relaxation passes before the tolerance exceeds the cap.
    pub fn max_passes(&self) -> usize {
        let mut eps = self.epsilon_start;
        let mut n = 0;
        while eps <= self.epsilon_cap {
            eps *= self.epsilon_growth;
            n += 1;
        }
        n
    }
}
