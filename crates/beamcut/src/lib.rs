//! Beam-guided search over sequential plane-cut decompositions of a solid
//! part, for fabrication-oriented planning (multi-axis additive
//! manufacturing).
//!
//! The core is the per-round pipeline: aggregate candidate cuts rendered for
//! every beam element ([`candidate::CandidateTable`]), select a diverse,
//! high-reward subset under an adaptive residual tolerance
//! ([`select::select`]), and carry the accepted elements into the next round
//! ([`search::BeamSearch`]). The geometry backend, cut materialization, and
//! trajectory persistence are collaborators behind the traits in
//! [`station`]; [`synthetic`] provides a deterministic stand-in backend for
//! demos and integration tests.

pub mod beam;
pub mod candidate;
pub mod cfg;
pub mod plane;
pub mod search;
pub mod select;
pub mod station;
pub mod synthetic;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::beam::{Ancestry, Beam, BeamElement};
    pub use crate::candidate::{Candidate, CandidateTable};
    pub use crate::cfg::SelectCfg;
    pub use crate::plane::{is_diverse, PlaneCut};
    pub use crate::search::{BeamSearch, ScoreHook, SearchError, SearchOpts, SearchOutcome};
    pub use crate::select::{select, AcceptedCut, Selection};
    pub use crate::station::{
        CutExecutor, CutOutcome, EngineError, ExportedCut, PartEngine, PolyId, SinkError,
        TrajectorySink,
    };
    pub use crate::synthetic::{SyntheticCfg, SyntheticEngine};
}
