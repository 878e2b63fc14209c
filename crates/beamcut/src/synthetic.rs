//! Deterministic synthetic part engine for demos and integration tests.
//!
//! Model
//! - A part is a unit volume budget. Every cut multiplies the remainder's
//!   budget by `volume_decay`, so offered volume fractions shrink across
//!   rounds and eventually fall below the feasibility threshold, which
//!   terminates every search.
//! - Rendering is reproducible: each polyhedron draws from an RNG seeded by
//!   mixing the session seed with the polyhedron handle, so the same seed
//!   and part path replay the same search.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::plane::PlaneCut;
use crate::station::{
    CutError, CutExecutor, CutOutcome, EngineError, PartEngine, PolyId, MIN_FEATURES,
};

/// Synthetic engine configuration.
#[derive(Clone, Copy, Debug)]
pub struct SyntheticCfg {
    /// Candidate rows rendered per polyhedron.
    pub candidates_per_poly: usize,
    /// Volume budget multiplier applied by each cut. Below 1.
    pub volume_decay: f64,
    /// Upper bound on a candidate's local residual.
    pub residual_scale: f64,
    /// Session seed, mixed with the part path on `reset`.
    pub seed: u64,
}

impl Default for SyntheticCfg {
    fn default() -> Self {
        Self {
            candidates_per_poly: 24,
            volume_decay: 0.55,
            residual_scale: 0.02,
            seed: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PolyState {
    volume: f64,
}

/// In-memory stand-in for the native geometry backend. Implements both the
/// render and cut seams.
#[derive(Clone, Debug)]
pub struct SyntheticEngine {
    cfg: SyntheticCfg,
    mixed_seed: u64,
    polys: Vec<PolyState>,
}

impl SyntheticEngine {
    pub fn new(cfg: SyntheticCfg) -> Self {
        Self {
            cfg,
            mixed_seed: cfg.seed,
            polys: Vec::new(),
        }
    }

    /// SplitMix64-style mixing, cheap and stable.
    fn mix(mut x: u64) -> u64 {
        x ^= x >> 30;
        x = x.wrapping_mul(0xbf58476d1ce4e5b9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94d049bb133111eb);
        x ^ (x >> 31)
    }

    fn rng_for(&self, poly: PolyId) -> StdRng {
        let k = Self::mix(self.mixed_seed ^ Self::mix(poly.0.wrapping_add(0x9e3779b97f4a7c15)));
        StdRng::seed_from_u64(k)
    }

    fn state(&self, poly: PolyId) -> Option<PolyState> {
        self.polys.get(poly.0 as usize).copied()
    }

    fn push(&mut self, st: PolyState) -> PolyId {
        let id = PolyId(self.polys.len() as u64);
        self.polys.push(st);
        id
    }
}

fn unit_normal<R: Rng>(rng: &mut R) -> [f64; 3] {
    loop {
        let x = rng.gen::<f64>() * 2.0 - 1.0;
        let y = rng.gen::<f64>() * 2.0 - 1.0;
        let z = rng.gen::<f64>() * 2.0 - 1.0;
        let n = (x * x + y * y + z * z).sqrt();
        if n > 1e-3 && n <= 1.0 {
            return [x / n, y / n, z / n];
        }
    }
}

impl PartEngine for SyntheticEngine {
    fn reset(&mut self, part: &Path) -> Result<(), EngineError> {
        if part.as_os_str().is_empty() {
            return Err(EngineError::BadPart(part.to_path_buf()));
        }
        let mut h = DefaultHasher::new();
        part.hash(&mut h);
        self.mixed_seed = Self::mix(self.cfg.seed ^ h.finish());
        self.polys = vec![PolyState { volume: 1.0 }];
        Ok(())
    }

    fn root_poly(&self) -> PolyId {
        PolyId(0)
    }

    fn num_features(&self) -> usize {
        MIN_FEATURES
    }

    fn render(&mut self, poly: PolyId) -> Result<DMatrix<f64>, EngineError> {
        let st = self
            .state(poly)
            .ok_or(EngineError::UnknownPoly(poly))?;
        let mut rng = self.rng_for(poly);
        let k = self.cfg.candidates_per_poly;
        let mut rows = DMatrix::zeros(k, MIN_FEATURES);
        for r in 0..k {
            let n = unit_normal(&mut rng);
            let offset = rng.gen::<f64>() * 2.0 - 1.0;
            // Offered volume shrinks with the remainder's budget; the
            // local reward tracks removed volume.
            let volume = st.volume * rng.gen::<f64>();
            let reward = volume * (0.5 + 0.5 * rng.gen::<f64>());
            let residual = rng.gen::<f64>() * self.cfg.residual_scale;
            rows[(r, 0)] = volume;
            rows[(r, 1)] = reward;
            rows[(r, 4)] = residual;
            rows[(r, 5)] = n[0];
            rows[(r, 6)] = n[1];
            rows[(r, 7)] = n[2];
            rows[(r, 8)] = offset;
        }
        Ok(rows)
    }
}

impl CutExecutor for SyntheticEngine {
    fn cut(
        &mut self,
        poly: PolyId,
        plane: &PlaneCut,
        export: bool,
    ) -> Result<CutOutcome, CutError> {
        let st = self
            .state(poly)
            .ok_or_else(|| CutError(format!("unknown polyhedron handle {:?}", poly)))?;
        // Planes at the extreme of the offset range miss the part.
        if plane.offset.abs() >= 0.999 {
            return Err(CutError("cut plane misses the part".into()));
        }
        let part = self.push(PolyState {
            volume: st.volume * self.cfg.volume_decay,
        });
        let exported = export.then(|| {
            self.push(PolyState {
                volume: st.volume * (1.0 - self.cfg.volume_decay),
            })
        });
        Ok(CutOutcome { part, exported })
    }
}
