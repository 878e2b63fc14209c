//! Adaptive-tolerance greedy selection over a sorted candidate table.
//!
//! Two-level structure: repeated greedy passes over the descending-reward
//! order, nested inside a geometrically relaxing residual tolerance. Each
//! pass prefers high-reward, low-residual, geometrically diverse cuts; when
//! the low-residual pool is too small to fill the beam, the tolerance grows
//! by `epsilon_growth` and the same order is walked again. The round gives
//! up once the tolerance exceeds `epsilon_cap`.

use nalgebra::DVector;

use crate::beam::Beam;
use crate::candidate::CandidateTable;
use crate::cfg::SelectCfg;
use crate::plane::{is_diverse, PlaneCut};
use crate::station::{CutExecutor, ExportedCut, PolyId};

/// One accepted candidate: its realized polyhedron plus everything the
/// controller needs to extend the beam and register trajectory data.
#[derive(Clone, Debug)]
pub struct AcceptedCut {
    pub origin: usize,
    pub reward: f64,
    pub residual: f64,
    pub plane: PlaneCut,
    pub poly: PolyId,
    pub features: DVector<f64>,
}

/// Outcome of one round's selection.
#[derive(Clone, Debug)]
pub struct Selection {
    pub accepted: Vec<AcceptedCut>,
    /// True once any accepted reward exceeds the pre-round global best.
    pub improved: bool,
    /// Cut-away pieces retained when exporting is enabled.
    pub exported: Vec<ExportedCut>,
    /// Relaxation passes run; bounded by `SelectCfg::max_passes`.
    pub passes: usize,
}

/// Select up to `width` diverse, high-reward candidates from `table`,
/// materializing each accepted cut through `cutter`.
pub fn select<C: CutExecutor>(
    table: &CandidateTable,
    beam: &Beam,
    width: usize,
    best_so_far: f64,
    export: bool,
    cfg: &SelectCfg,
    cutter: &mut C,
) -> Selection {
    SelectRunner {
        table,
        beam,
        width,
        best_so_far,
        export,
        cfg,
        cutter,
        accepted: Vec::new(),
        exported: Vec::new(),
        epsilon_best: 0.0,
        improved: false,
    }
    .run()
}

/// Selection runner carrying shared context and accumulators.
struct SelectRunner<'a, C> {
    table: &'a CandidateTable,
    beam: &'a Beam,
    width: usize,
    best_so_far: f64,
    export: bool,
    cfg: &'a SelectCfg,
    cutter: &'a mut C,
    accepted: Vec<AcceptedCut>,
    exported: Vec<ExportedCut>,
    /// Best reward accepted so far this round; rows below it cannot help.
    epsilon_best: f64,
    improved: bool,
}

impl<C: CutExecutor> SelectRunner<'_, C> {
    fn run(mut self) -> Selection {
        let mut epsilon = self.cfg.epsilon_start;
        let mut passes = 0;
        while self.accepted.len() < self.width {
            self.pass(epsilon);
            passes += 1;
            if self.accepted.len() >= self.width {
                break;
            }
            if !self.accepted.is_empty() {
                self.epsilon_best = self
                    .accepted
                    .iter()
                    .map(|a| a.reward)
                    .fold(f64::NEG_INFINITY, f64::max);
            }
            epsilon *= self.cfg.epsilon_growth;
            if epsilon > self.cfg.epsilon_cap {
                break;
            }
        }
        tracing::debug!(
            accepted = self.accepted.len(),
            passes,
            improved = self.improved,
            "selection finished"
        );
        Selection {
            accepted: self.accepted,
            improved: self.improved,
            exported: self.exported,
            passes,
        }
    }

    /// One greedy walk over the sorted order at residual tolerance
    /// `epsilon`. Re-walks re-evaluate every row; already-accepted rows
    /// reject themselves through the per-origin diversity check.
    fn pass(&mut self, epsilon: f64) {
        for cand in self.table.sorted() {
            if self.accepted.len() >= self.width {
                break;
            }
            // Later rows in descending-reward order are no better: stop.
            if cand.local_reward < self.cfg.exhausted_reward {
                break;
            }
            if cand.residual > epsilon {
                continue;
            }
            if cand.reward < self.epsilon_best {
                break;
            }
            let duplicate = self
                .accepted
                .iter()
                .filter(|a| a.origin == cand.origin)
                .any(|a| !is_diverse(&a.plane, &cand.plane, self.cfg));
            if duplicate {
                continue;
            }
            let origin_poly = self.beam.get(cand.origin).poly;
            let outcome = match self.cutter.cut(origin_poly, &cand.plane, self.export) {
                Ok(o) => o,
                Err(err) => {
                    tracing::warn!(%err, origin = cand.origin, row = cand.row, "plane cut failed");
                    continue;
                }
            };
            if let Some(exported) = outcome.exported {
                self.exported.push(ExportedCut {
                    part: outcome.part,
                    exported,
                });
            }
            if cand.reward > self.best_so_far {
                self.improved = true;
            }
            self.accepted.push(AcceptedCut {
                origin: cand.origin,
                reward: cand.reward,
                residual: cand.residual,
                plane: cand.plane,
                poly: outcome.part,
                features: cand.features().clone(),
            });
        }
    }
}
