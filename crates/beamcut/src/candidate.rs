//! Per-round candidate aggregation: immutable records, feasibility
//! filtering, and a deterministic descending-reward order.
//!
//! Each candidate is produced by a pure transform of one raw engine row,
//! folding in the origin element's cumulative reward and residual and
//! snapshotting the raw local reward before it is combined. Row semantics
//! never depend on evaluation order.

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector};

use crate::cfg::SelectCfg;
use crate::plane::PlaneCut;
use crate::station::{COL_PLANE, COL_RESIDUAL, COL_REWARD, COL_VOLUME};

/// One offered cut on one beam element.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Beam element this row was rendered from.
    pub origin: usize,
    /// Row index within that element's rendered batch.
    pub row: usize,
    pub volume_fraction: f64,
    /// Raw local reward, snapshotted before folding. Values below the
    /// exhaustion threshold mark the end of the useful sorted prefix.
    pub local_reward: f64,
    /// Cumulative reward: local plus the origin's cumulative reward.
    pub reward: f64,
    /// Cumulative residual: local plus the origin's cumulative residual.
    pub residual: f64,
    pub plane: PlaneCut,
    features: DVector<f64>,
}

impl Candidate {
    /// Transform one raw engine row. `parent_reward` and `parent_residual`
    /// come from the origin beam element. Infeasible rows (volume fraction
    /// below `cfg.min_volume`) have volume, rewards, and residual zeroed;
    /// the zeroed snapshot then trips the exhaustion sentinel during
    /// selection.
    fn from_row(
        origin: usize,
        row: usize,
        raw: &[f64],
        parent_reward: f64,
        parent_residual: f64,
        cfg: &SelectCfg,
    ) -> Self {
        let feasible = raw[COL_VOLUME] >= cfg.min_volume;
        let local = if feasible { raw[COL_REWARD] } else { 0.0 };
        let reward = if feasible { local + parent_reward } else { 0.0 };
        let residual = if feasible {
            raw[COL_RESIDUAL] + parent_residual
        } else {
            0.0
        };
        let plane = PlaneCut::from_tail(&raw[COL_PLANE..COL_PLANE + 4]);

        // Retained row layout: the raw row widened by one snapshot column,
        // `[volume, reward, aux, aux, residual, snapshot, plane.., extra..]`.
        let mut features = DVector::zeros(raw.len() + 1);
        if feasible {
            features[0] = raw[COL_VOLUME];
            features[1] = reward;
            features[2] = raw[2];
            features[3] = raw[3];
            features[4] = residual;
            features[5] = local;
        }
        for (k, v) in raw[COL_PLANE..].iter().enumerate() {
            features[COL_PLANE + 1 + k] = *v;
        }

        Self {
            origin,
            row,
            volume_fraction: if feasible { raw[COL_VOLUME] } else { 0.0 },
            local_reward: local,
            reward,
            residual,
            plane,
            features,
        }
    }

    /// Transformed feature row, retained for the trajectory sink.
    pub fn features(&self) -> &DVector<f64> {
        &self.features
    }
}

/// All candidates of one round, merged across beam elements, with a
/// deterministic order over cumulative reward.
#[derive(Clone, Debug)]
pub struct CandidateTable {
    candidates: Vec<Candidate>,
    order: Vec<usize>,
}

impl CandidateTable {
    /// Merge per-element render batches. Each item pairs a feature matrix
    /// with the origin element's cumulative `(reward, residual)`.
    pub fn build<I>(batches: I, cfg: &SelectCfg) -> Self
    where
        I: IntoIterator<Item = (DMatrix<f64>, f64, f64)>,
    {
        let mut candidates = Vec::new();
        for (origin, (rows, parent_reward, parent_residual)) in batches.into_iter().enumerate() {
            for r in 0..rows.nrows() {
                let raw: Vec<f64> = rows.row(r).iter().copied().collect();
                candidates.push(Candidate::from_row(
                    origin,
                    r,
                    &raw,
                    parent_reward,
                    parent_residual,
                    cfg,
                ));
            }
        }

        // Reward descending, then origin and row ascending, so round
        // outcomes are reproducible under reward ties.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&i, &j| {
            let (a, b) = (&candidates[i], &candidates[j]);
            b.reward
                .partial_cmp(&a.reward)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.origin.cmp(&b.origin))
                .then_with(|| a.row.cmp(&b.row))
        });

        Self { candidates, order }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates in the pinned descending-reward order.
    pub fn sorted(&self) -> impl Iterator<Item = &Candidate> {
        self.order.iter().map(move |&i| &self.candidates[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // volume, local reward, aux, aux, local residual, plane
    fn row(volume: f64, reward: f64, residual: f64, nz: f64, offset: f64) -> Vec<f64> {
        vec![volume, reward, 0.0, 0.0, residual, 0.0, 0.0, nz, offset]
    }

    fn batch(rows: &[Vec<f64>]) -> DMatrix<f64> {
        DMatrix::from_row_iterator(rows.len(), 9, rows.iter().flatten().copied())
    }

    #[test]
    fn folds_parent_reward_and_residual() {
        let cfg = SelectCfg::default();
        let m = batch(&[row(0.5, 0.3, 0.01, 1.0, 0.2)]);
        let table = CandidateTable::build(vec![(m, 0.4, 0.02)], &cfg);
        let c = table.sorted().next().unwrap();
        assert!((c.reward - 0.7).abs() < 1e-12);
        assert!((c.residual - 0.03).abs() < 1e-12);
        assert!((c.local_reward - 0.3).abs() < 1e-12);
        // Snapshot column sits between residual and plane.
        assert!((c.features()[5] - 0.3).abs() < 1e-12);
        assert!((c.features()[1] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn infeasible_rows_are_zeroed() {
        let cfg = SelectCfg::default();
        let m = batch(&[row(0.05, 0.9, 0.01, 1.0, 0.2)]);
        let table = CandidateTable::build(vec![(m, 0.4, 0.02)], &cfg);
        let c = table.sorted().next().unwrap();
        assert_eq!(c.volume_fraction, 0.0);
        assert_eq!(c.reward, 0.0);
        assert_eq!(c.residual, 0.0);
        assert_eq!(c.local_reward, 0.0);
        // The plane tail survives zeroing.
        assert!((c.plane.offset - 0.2).abs() < 1e-12);
        assert_eq!(c.features()[1], 0.0);
        assert_eq!(c.features()[5], 0.0);
    }

    #[test]
    fn order_is_reward_desc_then_origin_then_row() {
        let cfg = SelectCfg::default();
        let m0 = batch(&[row(0.5, 0.6, 0.0, 1.0, 0.1), row(0.5, 0.8, 0.0, 1.0, 0.2)]);
        let m1 = batch(&[row(0.5, 0.8, 0.0, 1.0, 0.3)]);
        // Same parent rewards, so two candidates tie at 0.8.
        let table = CandidateTable::build(vec![(m0, 0.0, 0.0), (m1, 0.0, 0.0)], &cfg);
        let got: Vec<(usize, usize, f64)> =
            table.sorted().map(|c| (c.origin, c.row, c.reward)).collect();
        assert_eq!(got.len(), 3);
        // Tie broken by origin asc, then row asc.
        assert_eq!((got[0].0, got[0].1), (0, 1));
        assert_eq!((got[1].0, got[1].1), (1, 0));
        assert_eq!((got[2].0, got[2].1), (0, 0));
    }
}
