//! Primitive selection: drive a MIQCP backend over a serialized energy problem.
//!
//! Each run reads one energy problem (one binary decision variable per candidate
//! primitive), asks a backend for a minimizing 0/1 vector with a bounded retry
//! budget, and turns the answer back into geometry: which candidates survive,
//! how their pairwise constraints look, and what the energy of the pick is.
//!
//! Layout
//! - `problem`, `sparse_io`: energy problem storage and evaluation.
//! - `backend`, `bnb`: optimizer capability surface and the in-process engine.
//! - `driver`: the retry/escalation loop and run orchestration.
//! - `selection`, `diagnostics`, `output`: post-processing and artifacts.
//!
//! API Policy
//! - This crate is project-internal. There is no stable public API; the CLI in
//!   `crates/cli` is the only intended caller besides tests and benches.

pub mod backend;
pub mod bnb;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod output;
pub mod primitive;
pub mod problem;
pub mod selection;
pub mod sparse_io;

#[cfg(test)]
mod testutil;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use backend::{create_optimizer, Backend, ObjSense, OptStatus, Optimizer, SearchAlgorithm};
pub use config::SolveConfig;
pub use driver::{Driver, RunReport};
pub use error::{ArtifactError, ConfigError, ProblemError, SolveError, StructuralMismatch};
pub use primitive::{Primitive, PrimitiveIo, PrimitiveSet, ShapeKind, Status};
pub use problem::{EnergyBreakdown, EnergyProblem, EnergyTerms, ProblemWeights};

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::backend::{Backend, ObjSense, OptStatus, Optimizer, SearchAlgorithm};
    pub use crate::config::SolveConfig;
    pub use crate::driver::{Driver, RunReport};
    pub use crate::primitive::{Primitive, PrimitiveIo, PrimitiveSet, ShapeKind, Status};
    pub use crate::problem::{EnergyBreakdown, EnergyProblem};
    pub use nalgebra::Vector3 as Vec3;
}
