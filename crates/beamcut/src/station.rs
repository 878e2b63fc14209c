//! Collaborator seams: part engine, cut executor, trajectory sink.
//!
//! The search core stays agnostic of the geometry backend. It sees
//! polyhedra as opaque handles, consumes feature-row matrices with the
//! layout documented below, and hands accepted candidates to a trajectory
//! sink owned by the host.

use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::plane::PlaneCut;

/// Opaque handle to an engine-owned polyhedron.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PolyId(pub u64);

/// Feature-row column layout produced by [`PartEngine::render`].
///
/// `[volume, local reward, aux, aux, local residual, nx, ny, nz, offset]`.
/// Engines may append further columns after the plane; the first
/// `MIN_FEATURES` are mandatory.
pub const COL_VOLUME: usize = 0;
pub const COL_REWARD: usize = 1;
pub const COL_RESIDUAL: usize = 4;
pub const COL_PLANE: usize = 5;
pub const MIN_FEATURES: usize = 9;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid part path: {0}")]
    BadPart(PathBuf),
    #[error("unknown polyhedron handle {0:?}")]
    UnknownPoly(PolyId),
    #[error("render failed: {0}")]
    Render(String),
}

/// Non-fatal per-candidate failure of cut materialization.
#[derive(Debug, Error)]
#[error("plane cut failed: {0}")]
pub struct CutError(pub String);

/// Trajectory persistence failure, surfaced by the host's sink.
#[derive(Debug, Error)]
#[error("trajectory persistence failed: {0}")]
pub struct SinkError(pub String);

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError(e.to_string())
    }
}

/// Geometry backend: loads a part and renders candidate feature rows for a
/// selected polyhedron.
pub trait PartEngine {
    /// Load a part from disk. Failure is fatal to the search session.
    fn reset(&mut self, part: &Path) -> Result<(), EngineError>;

    /// Handle of the whole loaded part.
    fn root_poly(&self) -> PolyId;

    /// Width of rendered feature rows; at least [`MIN_FEATURES`].
    fn num_features(&self) -> usize;

    /// Render one feature row per offered cut of `poly`.
    fn render(&mut self, poly: PolyId) -> Result<DMatrix<f64>, EngineError>;
}

/// Result of materializing one cut: the primary remainder and, when
/// exporting, the cut-away piece.
#[derive(Clone, Copy, Debug)]
pub struct CutOutcome {
    pub part: PolyId,
    pub exported: Option<PolyId>,
}

/// Accepted cut retained for later segmentation export.
#[derive(Clone, Copy, Debug)]
pub struct ExportedCut {
    pub part: PolyId,
    pub exported: PolyId,
}

/// Materializes an accepted plane cut. Errors are per-candidate and
/// non-fatal; the selector logs and moves on.
pub trait CutExecutor {
    fn cut(&mut self, poly: PolyId, plane: &PlaneCut, export: bool)
        -> Result<CutOutcome, CutError>;
}

/// Host-owned trajectory store. The search registers one level per round,
/// one node per accepted candidate, and the round's feature batch; at the
/// end it asks the sink to persist.
pub trait TrajectorySink {
    /// Open the next trajectory level. Called once per round, before
    /// selection, regardless of the round's outcome.
    fn advance_level(&mut self);

    /// Record an accepted candidate: which beam element it came from, its
    /// index in the round's accepted order, and its cumulative reward.
    fn add_node(&mut self, origin: usize, feature_index: usize, reward: f64);

    /// Record the round's accepted feature rows; `valid` is the count of
    /// meaningful rows.
    fn add_feature_batch(&mut self, rows: Vec<DVector<f64>>, valid: usize);

    fn persist(&mut self, stem: &Path) -> Result<(), SinkError>;

    fn persist_edges(&mut self, stem: &Path) -> Result<(), SinkError>;

    /// Export the best segmentation found, given the per-round exported
    /// geometry retained during selection.
    fn export_best_segmentation(
        &mut self,
        stem: &Path,
        exported: &[Vec<ExportedCut>],
    ) -> Result<(), SinkError>;
}

/// Sink that drops everything. Useful for benchmarks and termination tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl TrajectorySink for NullSink {
    fn advance_level(&mut self) {}
    fn add_node(&mut self, _origin: usize, _feature_index: usize, _reward: f64) {}
    fn add_feature_batch(&mut self, _rows: Vec<DVector<f64>>, _valid: usize) {}
    fn persist(&mut self, _stem: &Path) -> Result<(), SinkError> {
        Ok(())
    }
    fn persist_edges(&mut self, _stem: &Path) -> Result<(), SinkError> {
        Ok(())
    }
    fn export_best_segmentation(
        &mut self,
        _stem: &Path,
        _exported: &[Vec<ExportedCut>],
    ) -> Result<(), SinkError> {
        Ok(())
    }
}
