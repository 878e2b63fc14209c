//! Host-side trajectory store: levels of accepted nodes and feature rows,
//! persisted as tabular artifacts.
//!
//! Layout on disk for a stem `out/part`:
//! - `out/part.nodes.csv`: one row per accepted candidate
//!   (`level, node, origin, reward`).
//! - `out/part.edges.csv`: parent links between consecutive levels; at
//!   level 0 the parent is the seeded root element.
//! - `out/part.features.parquet`: the per-level feature batches.
//! - `out/part.segmentation.json`: manifest of the best root-to-leaf
//!   chain with its exported geometry handles (export runs only).

use std::fs::{self, File};
use std::path::Path;

use beamcut::station::{ExportedCut, SinkError, TrajectorySink};
use nalgebra::DVector;
use polars::prelude::*;
use serde::Serialize;

#[derive(Debug, Default)]
struct Level {
    /// `(origin, feature_index, reward)` per accepted candidate.
    nodes: Vec<(usize, usize, f64)>,
    features: Vec<DVector<f64>>,
    valid: usize,
}

/// In-memory trajectory station handed to the search as its sink.
#[derive(Debug, Default)]
pub struct TrajStation {
    levels: Vec<Level>,
}

impl TrajStation {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> &mut Level {
        if self.levels.is_empty() {
            self.levels.push(Level::default());
        }
        self.levels.last_mut().expect("levels non-empty")
    }

    fn ensure_parent(path: &Path) -> Result<(), SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn pl(e: PolarsError) -> SinkError {
        SinkError(e.to_string())
    }

    /// Index chain of the best leaf, walking `origin` links back to level 0.
    /// Returns one node index per level, root-most first.
    fn best_chain(&self) -> Option<Vec<usize>> {
        let last = self.levels.iter().rposition(|l| !l.nodes.is_empty())?;
        let (leaf, _) = self.levels[last]
            .nodes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.2.total_cmp(&b.2))?;
        let mut chain = vec![0usize; last + 1];
        chain[last] = leaf;
        for l in (1..=last).rev() {
            let (origin, _, _) = self.levels[l].nodes[chain[l]];
            chain[l - 1] = origin;
        }
        Some(chain)
    }
}

#[derive(Serialize)]
struct SegmentStep {
    level: usize,
    node: usize,
    reward: f64,
    part: Option<u64>,
    exported: Option<u64>,
}

impl TrajectorySink for TrajStation {
    fn advance_level(&mut self) {
        self.levels.push(Level::default());
    }

    fn add_node(&mut self, origin: usize, feature_index: usize, reward: f64) {
        self.current().nodes.push((origin, feature_index, reward));
    }

    fn add_feature_batch(&mut self, rows: Vec<DVector<f64>>, valid: usize) {
        let level = self.current();
        level.features = rows;
        level.valid = valid;
    }

    fn persist(&mut self, stem: &Path) -> Result<(), SinkError> {
        let nodes_path = stem.with_extension("nodes.csv");
        Self::ensure_parent(&nodes_path)?;

        let mut levels: Vec<u32> = Vec::new();
        let mut nodes: Vec<u32> = Vec::new();
        let mut origins: Vec<u32> = Vec::new();
        let mut rewards: Vec<f64> = Vec::new();
        for (l, level) in self.levels.iter().enumerate() {
            for (i, (origin, _, reward)) in level.nodes.iter().enumerate() {
                levels.push(l as u32);
                nodes.push(i as u32);
                origins.push(*origin as u32);
                rewards.push(*reward);
            }
        }
        let mut df = df!(
            "level" => &levels,
            "node" => &nodes,
            "origin" => &origins,
            "reward" => &rewards
        )
        .map_err(Self::pl)?;
        let file = File::create(&nodes_path)?;
        CsvWriter::new(file).finish(&mut df).map_err(Self::pl)?;

        // Feature batches go to parquet; columns are padded to the widest
        // row with NaN.
        let feats_path = stem.with_extension("features.parquet");
        let width = self
            .levels
            .iter()
            .flat_map(|l| l.features.iter())
            .map(|v| v.len())
            .max()
            .unwrap_or(0);
        let mut f_levels: Vec<u32> = Vec::new();
        let mut f_rows: Vec<u32> = Vec::new();
        for (l, level) in self.levels.iter().enumerate() {
            for i in 0..level.valid.min(level.features.len()) {
                f_levels.push(l as u32);
                f_rows.push(i as u32);
            }
        }
        let mut cols: Vec<Series> = vec![
            Series::new("level".into(), &f_levels),
            Series::new("row".into(), &f_rows),
        ];
        for c in 0..width {
            let vals: Vec<f64> = self
                .levels
                .iter()
                .flat_map(|l| l.features.iter().take(l.valid.min(l.features.len())))
                .map(|v| if c < v.len() { v[c] } else { f64::NAN })
                .collect();
            cols.push(Series::new(format!("f{c}").as_str().into(), &vals));
        }
        let mut fdf = DataFrame::new(cols).map_err(Self::pl)?;
        let ffile = File::create(&feats_path)?;
        ParquetWriter::new(ffile).finish(&mut fdf).map_err(Self::pl)?;
        Ok(())
    }

    fn persist_edges(&mut self, stem: &Path) -> Result<(), SinkError> {
        let path = stem.with_extension("edges.csv");
        Self::ensure_parent(&path)?;
        let mut levels: Vec<u32> = Vec::new();
        let mut parents: Vec<u32> = Vec::new();
        let mut children: Vec<u32> = Vec::new();
        for (l, level) in self.levels.iter().enumerate() {
            for (i, (origin, _, _)) in level.nodes.iter().enumerate() {
                levels.push(l as u32);
                parents.push(*origin as u32);
                children.push(i as u32);
            }
        }
        let mut df = df!(
            "level" => &levels,
            "parent" => &parents,
            "child" => &children
        )
        .map_err(Self::pl)?;
        let file = File::create(&path)?;
        CsvWriter::new(file).finish(&mut df).map_err(Self::pl)?;
        Ok(())
    }

    fn export_best_segmentation(
        &mut self,
        stem: &Path,
        exported: &[Vec<ExportedCut>],
    ) -> Result<(), SinkError> {
        let path = stem.with_extension("segmentation.json");
        Self::ensure_parent(&path)?;
        let chain = self.best_chain().unwrap_or_default();
        let steps: Vec<SegmentStep> = chain
            .iter()
            .enumerate()
            .map(|(level, &node)| {
                let (_, _, reward) = self.levels[level].nodes[node];
                let cut = exported.get(level).and_then(|round| round.get(node));
                SegmentStep {
                    level,
                    node,
                    reward,
                    part: cut.map(|c| c.part.0),
                    exported: cut.map(|c| c.exported.0),
                }
            })
            .collect();
        let doc = serde_json::json!({
            "stem": stem.to_string_lossy(),
            "steps": steps,
        });
        fs::write(&path, serde_json::to_vec_pretty(&doc).map_err(|e| SinkError(e.to_string()))?)?;
        Ok(())
    }
}
