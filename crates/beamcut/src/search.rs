//! Round loop: render, aggregate, select, commit or stop.
//!
//! The controller owns the beam across rounds. A round that improves on the
//! best reward seen so far commits the selector's accepted elements as the
//! next beam and registers them with the trajectory sink; a round that does
//! not improve rolls back completely, leaving the prior beam untouched, and
//! ends the search.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use nalgebra::DVector;
use thiserror::Error;

use crate::beam::{Beam, BeamElement};
use crate::candidate::CandidateTable;
use crate::cfg::SelectCfg;
use crate::select::select;
use crate::station::{
    CutExecutor, EngineError, ExportedCut, PartEngine, SinkError, TrajectorySink, MIN_FEATURES,
};

/// Search variant tag, kept for hosts that dispatch on planner kind.
pub const SEARCH_KIND: &str = "Normal";

/// Extension point for learned candidate scoring. Accepted at construction
/// and exposed to hosts; the selection logic itself never consults it.
pub trait ScoreHook {
    fn score(&self, features: &DVector<f64>) -> f64;
}

/// Host-facing knobs for one search session.
#[derive(Clone, Debug)]
pub struct SearchOpts {
    /// Beam width `W`: accepted candidates per round.
    pub width: usize,
    /// Directory the output stem is placed under.
    pub output_dir: PathBuf,
    /// Retain per-round exported geometry and export the best segmentation.
    pub export: bool,
    pub cfg: SelectCfg,
}

impl SearchOpts {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            output_dir: PathBuf::from("."),
            export: false,
            cfg: SelectCfg::default(),
        }
    }
}

/// Terminal summary of a finished search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// Rounds run, counting the final non-improving one.
    pub rounds: usize,
    pub best_reward: f64,
    /// Beam size after the last committed round.
    pub beam_len: usize,
    /// Output path stem the trajectory artifacts were persisted under.
    pub stem: PathBuf,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("beam width must be positive")]
    ZeroWidth,
    #[error("engine feature width {0} is below the required {MIN_FEATURES}")]
    FeatureWidth(usize),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Beam-search controller over one loaded part.
///
/// `E` is the geometry backend, serving both renders and cut
/// materialization; `T` is the host's trajectory sink.
pub struct BeamSearch<E, T> {
    engine: E,
    trajs: T,
    part: PathBuf,
    opts: SearchOpts,
    hook: Option<Box<dyn ScoreHook>>,
    beam: Beam,
    round: usize,
    best_so_far: f64,
    /// Per-round exported geometry, recorded even for the failed final
    /// round, mirroring the trajectory level counter.
    exported: Vec<Vec<ExportedCut>>,
}

impl<E, T> BeamSearch<E, T>
where
    E: PartEngine + CutExecutor,
    T: TrajectorySink,
{
    /// Load `part` into the engine and set up an empty session. Engine
    /// reset failure is fatal: a session cannot exist without a part.
    pub fn new(
        mut engine: E,
        trajs: T,
        part: &Path,
        hook: Option<Box<dyn ScoreHook>>,
        opts: SearchOpts,
    ) -> Result<Self, SearchError> {
        if opts.width == 0 {
            return Err(SearchError::ZeroWidth);
        }
        engine.reset(part)?;
        let n_features = engine.num_features();
        if n_features < MIN_FEATURES {
            return Err(SearchError::FeatureWidth(n_features));
        }
        Ok(Self {
            engine,
            trajs,
            part: part.to_path_buf(),
            opts,
            hook,
            beam: Beam::default(),
            round: 0,
            best_so_far: 0.0,
            exported: Vec::new(),
        })
    }

    pub fn kind(&self) -> &'static str {
        SEARCH_KIND
    }

    /// The stored scoring hook, if any. Not consulted by selection.
    pub fn score_hook(&self) -> Option<&dyn ScoreHook> {
        self.hook.as_deref()
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn beam(&self) -> &Beam {
        &self.beam
    }

    /// Run rounds until one fails to improve, then persist the trajectory.
    pub fn start_search(&mut self) -> Result<SearchOutcome, SearchError> {
        self.beam = Beam::seeded(self.engine.root_poly());
        self.round = 0;
        tracing::info!(part = %self.part.display(), width = self.opts.width, "search start");
        loop {
            let improved = self.advance_round()?;
            self.round += 1;
            if !improved {
                break;
            }
        }
        let stem = self.output_stem();
        self.trajs.persist(&stem)?;
        self.trajs.persist_edges(&stem)?;
        if self.opts.export {
            self.trajs.export_best_segmentation(&stem, &self.exported)?;
        }
        tracing::info!(
            rounds = self.round,
            best = self.best_so_far,
            stem = %stem.display(),
            "search done"
        );
        Ok(SearchOutcome {
            rounds: self.round,
            best_reward: self.best_so_far,
            beam_len: self.beam.len(),
            stem,
        })
    }

    /// One round: render every beam element, build the candidate table,
    /// select, and commit on improvement. Returns whether the round
    /// improved on the pre-round best.
    fn advance_round(&mut self) -> Result<bool, SearchError> {
        self.best_so_far = self.beam.best_reward();
        tracing::debug!(
            round = self.round,
            beam = self.beam.len(),
            best = self.best_so_far,
            "round start"
        );

        let mut batches = Vec::with_capacity(self.beam.len());
        for elem in self.beam.iter() {
            let rows = self.engine.render(elem.poly)?;
            batches.push((rows, elem.reward, elem.residual));
        }
        let table = CandidateTable::build(batches, &self.opts.cfg);

        self.trajs.advance_level();
        let sel = select(
            &table,
            &self.beam,
            self.opts.width,
            self.best_so_far,
            self.opts.export,
            &self.opts.cfg,
            &mut self.engine,
        );
        self.exported.push(sel.exported);

        if !sel.improved {
            // Full rollback: the prior beam stays committed as-is.
            return Ok(false);
        }

        for (idx, acc) in sel.accepted.iter().enumerate() {
            self.trajs.add_node(acc.origin, idx, acc.reward);
        }
        let rows: Vec<DVector<f64>> = sel.accepted.iter().map(|a| a.features.clone()).collect();
        let valid = rows.len();
        self.trajs.add_feature_batch(rows, valid);

        let next: Vec<BeamElement> = sel
            .accepted
            .into_iter()
            .map(|a| {
                let parent = self.beam.get(a.origin);
                BeamElement {
                    poly: a.poly,
                    reward: a.reward,
                    residual: a.residual,
                    ancestry: parent.ancestry.child(a.poly, a.reward),
                }
            })
            .collect();
        self.beam.replace(next);
        Ok(true)
    }

    /// Output directory joined with the part file name, extension stripped.
    fn output_stem(&self) -> PathBuf {
        let base = self
            .part
            .file_stem()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("part"));
        self.opts.output_dir.join(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::PlaneCut;
    use crate::station::{CutError, CutOutcome, PolyId};
    use nalgebra::DMatrix;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Scripted engine: a fixed sequence of render batches, replayed per
    /// round for every poly, with fresh handles for cuts.
    struct ScriptEngine {
        rounds: Vec<Vec<Vec<f64>>>,
        next: u64,
        renders: usize,
        features: usize,
    }

    impl ScriptEngine {
        fn new(rounds: Vec<Vec<Vec<f64>>>) -> Self {
            Self {
                rounds,
                next: 1,
                renders: 0,
                features: 9,
            }
        }
    }

    impl PartEngine for ScriptEngine {
        fn reset(&mut self, part: &Path) -> Result<(), EngineError> {
            if part.as_os_str().is_empty() {
                return Err(EngineError::BadPart(part.to_path_buf()));
            }
            Ok(())
        }
        fn root_poly(&self) -> PolyId {
            PolyId(0)
        }
        fn num_features(&self) -> usize {
            self.features
        }
        fn render(&mut self, _poly: PolyId) -> Result<DMatrix<f64>, EngineError> {
            self.renders += 1;
            let round = (self.renders - 1).min(self.rounds.len() - 1);
            let rows = &self.rounds[round];
            Ok(DMatrix::from_row_iterator(
                rows.len(),
                9,
                rows.iter().flatten().copied(),
            ))
        }
    }

    impl CutExecutor for ScriptEngine {
        fn cut(
            &mut self,
            _poly: PolyId,
            _plane: &PlaneCut,
            _export: bool,
        ) -> Result<CutOutcome, CutError> {
            let part = PolyId(self.next);
            self.next += 1;
            Ok(CutOutcome {
                part,
                exported: None,
            })
        }
    }

    #[derive(Default)]
    struct Recording {
        levels: usize,
        nodes: Vec<(usize, usize, f64)>,
        batches: Vec<usize>,
        persisted: bool,
        edges_persisted: bool,
        exports: usize,
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Rc<RefCell<Recording>>);

    impl TrajectorySink for RecordingSink {
        fn advance_level(&mut self) {
            self.0.borrow_mut().levels += 1;
        }
        fn add_node(&mut self, origin: usize, feature_index: usize, reward: f64) {
            self.0.borrow_mut().nodes.push((origin, feature_index, reward));
        }
        fn add_feature_batch(&mut self, rows: Vec<DVector<f64>>, valid: usize) {
            assert_eq!(rows.len(), valid);
            self.0.borrow_mut().batches.push(valid);
        }
        fn persist(&mut self, _stem: &Path) -> Result<(), SinkError> {
            self.0.borrow_mut().persisted = true;
            Ok(())
        }
        fn persist_edges(&mut self, _stem: &Path) -> Result<(), SinkError> {
            self.0.borrow_mut().edges_persisted = true;
            Ok(())
        }
        fn export_best_segmentation(
            &mut self,
            _stem: &Path,
            exported: &[Vec<ExportedCut>],
        ) -> Result<(), SinkError> {
            self.0.borrow_mut().exports = exported.len();
            Ok(())
        }
    }

    fn row(volume: f64, reward: f64, n: [f64; 3], offset: f64) -> Vec<f64> {
        vec![volume, reward, 0.0, 0.0, 0.0, n[0], n[1], n[2], offset]
    }

    fn infeasible_round() -> Vec<Vec<f64>> {
        vec![row(0.01, 0.9, [1.0, 0.0, 0.0], 0.1)]
    }

    #[test]
    fn engine_reset_failure_is_fatal() {
        let engine = ScriptEngine::new(vec![infeasible_round()]);
        let res = BeamSearch::new(
            engine,
            RecordingSink::default(),
            Path::new(""),
            None,
            SearchOpts::new(2),
        );
        assert!(matches!(res, Err(SearchError::Engine(_))));
    }

    #[test]
    fn zero_width_is_rejected() {
        let engine = ScriptEngine::new(vec![infeasible_round()]);
        let res = BeamSearch::new(
            engine,
            RecordingSink::default(),
            Path::new("part.off"),
            None,
            SearchOpts::new(0),
        );
        assert!(matches!(res, Err(SearchError::ZeroWidth)));
    }

    #[test]
    fn rejects_narrow_feature_rows() {
        let mut engine = ScriptEngine::new(vec![infeasible_round()]);
        engine.features = 5;
        let res = BeamSearch::new(
            engine,
            RecordingSink::default(),
            Path::new("part.off"),
            None,
            SearchOpts::new(2),
        );
        assert!(matches!(res, Err(SearchError::FeatureWidth(5))));
    }

    #[test]
    fn all_infeasible_round_stops_without_touching_beam() {
        let engine = ScriptEngine::new(vec![infeasible_round()]);
        let sink = RecordingSink::default();
        let rec = sink.0.clone();
        let mut search = BeamSearch::new(
            engine,
            sink,
            Path::new("part.off"),
            None,
            SearchOpts::new(2),
        )
        .unwrap();
        let out = search.start_search().unwrap();
        assert_eq!(out.rounds, 1);
        assert_eq!(out.best_reward, 0.0);
        // Prior beam (the seeded root) survives the failed round intact.
        assert_eq!(search.beam().len(), 1);
        assert_eq!(search.beam().get(0).poly, PolyId(0));
        assert_eq!(search.beam().get(0).ancestry.len(), 1);
        let rec = rec.borrow();
        assert_eq!(rec.levels, 1);
        assert!(rec.nodes.is_empty());
        assert!(rec.persisted);
        assert!(rec.edges_persisted);
    }

    #[test]
    fn successful_rounds_extend_ancestry_and_register_nodes() {
        // Round 1 offers two diverse cuts; later renders are infeasible, so
        // the search stops after one committed round.
        let good = vec![
            row(0.5, 0.8, [1.0, 0.0, 0.0], 0.3),
            row(0.5, 0.6, [0.0, 1.0, 0.0], 0.4),
        ];
        let engine = ScriptEngine::new(vec![good, infeasible_round()]);
        let sink = RecordingSink::default();
        let rec = sink.0.clone();
        let mut search = BeamSearch::new(
            engine,
            sink,
            Path::new("parts/bunny.off"),
            None,
            SearchOpts::new(2),
        )
        .unwrap();
        let out = search.start_search().unwrap();
        assert_eq!(out.rounds, 2);
        assert!((out.best_reward - 0.8).abs() < 1e-12);
        assert_eq!(out.beam_len, 2);
        // Ancestry length equals committed rounds + 1.
        for elem in search.beam().iter() {
            assert_eq!(elem.ancestry.len(), 2);
        }
        let rec = rec.borrow();
        assert_eq!(rec.levels, 2);
        assert_eq!(rec.nodes, vec![(0, 0, 0.8), (0, 1, 0.6)]);
        assert_eq!(rec.batches, vec![2]);
    }

    #[test]
    fn output_stem_strips_directory_and_extension() {
        let engine = ScriptEngine::new(vec![infeasible_round()]);
        let sink = RecordingSink::default();
        let mut opts = SearchOpts::new(1);
        opts.output_dir = PathBuf::from("out");
        let mut search = BeamSearch::new(
            engine,
            sink,
            Path::new("models/widget.off"),
            None,
            opts,
        )
        .unwrap();
        let out = search.start_search().unwrap();
        assert_eq!(out.stem, PathBuf::from("out/widget"));
    }

    #[test]
    fn export_flag_forwards_per_round_geometry() {
        let engine = ScriptEngine::new(vec![infeasible_round()]);
        let sink = RecordingSink::default();
        let rec = sink.0.clone();
        let mut opts = SearchOpts::new(1);
        opts.export = true;
        let mut search =
            BeamSearch::new(engine, sink, Path::new("part.off"), None, opts).unwrap();
        search.start_search().unwrap();
        // One (empty) per-round export entry, recorded even on failure.
        assert_eq!(rec.borrow().exports, 1);
    }
}
