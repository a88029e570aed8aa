//! Error taxonomy for a solve run.
//!
//! - `ConfigError`: fatal before or while loading; never retried.
//! - `SolveError::AttemptsExhausted`: every attempt was rejected.
//! - `StructuralMismatch`: decision vector disagrees with the problem or candidates.
//! - `ArtifactError`: one output file failed; recorded, other artifacts still written.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::Backend;

/// Boxed error returned by collaborators (primitive I/O).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reading or validating an energy problem.
#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {msg}")]
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    #[error("dimension mismatch: {0}")]
    Dimension(String),

    #[error("no problem loaded")]
    NotLoaded,
}

/// Invalid invocation; reported before any solve attempt succeeds or is retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown backend `{0}` (expected mosek, bonmin or gurobi)")]
    UnknownBackend(String),

    #[error("backend `{0}` is not built into this binary")]
    BackendUnavailable(Backend),

    #[error("algorithm mode {0} is out of range 0..=5")]
    AlgorithmMode(u8),

    #[error("max attempts must be at least 1")]
    NoAttempts,

    #[error("starting point {0} does not exist")]
    MissingStartingPoint(PathBuf),

    #[error("reading starting point: {0}")]
    StartingPoint(#[source] ProblemError),

    #[error("reading problem: {0}")]
    Problem(#[source] ProblemError),
}

/// Decision vector length disagrees with what the problem or candidates need.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("decision vector has {len} entries but {expected} are required by {what}")]
pub struct StructuralMismatch {
    pub len: usize,
    pub expected: usize,
    pub what: &'static str,
}

/// Terminal outcome of a run that did not succeed.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("solve: no acceptable solution after {attempts} attempt(s)")]
    AttemptsExhausted { attempts: u32 },

    #[error("post-processing: {0}")]
    Structural(#[from] StructuralMismatch),

    #[error("candidates: reading {path}: {source}")]
    Candidates {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

/// Output file kinds produced by a successful run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Solution,
    Primitives,
    Diagnostics,
    EnergyLedger,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Solution => "solution",
            ArtifactKind::Primitives => "primitives",
            ArtifactKind::Diagnostics => "diagnostics",
            ArtifactKind::EnergyLedger => "energy ledger",
        };
        f.write_str(s)
    }
}

/// A single artifact that could not be written.
#[derive(Debug, Error)]
#[error("writing {kind} artifact {path}: {source}")]
pub struct ArtifactError {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    #[source]
    pub source: BoxError,
}
