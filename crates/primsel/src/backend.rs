//! Optimizer capability surface and backend selection.
//!
//! The backend set is closed (`Backend`), and every backend is driven through
//! the same `Optimizer` trait: read, configure, update, optimize, and expose
//! the loaded matrices for post-processing. Knobs that only a branch-and-bound
//! backend understands have no-op defaults.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::bnb::BranchAndBound;
use crate::error::{ConfigError, ProblemError};
use crate::problem::EnergyProblem;

/// Supported MIQCP backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mosek,
    Bonmin,
    Gurobi,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Mosek => "mosek",
            Backend::Bonmin => "bonmin",
            Backend::Gurobi => "gurobi",
        }
    }

    /// Whether the backend takes an algorithm mode, a node budget and a starting point.
    pub fn uses_node_budget(self) -> bool {
        matches!(self, Backend::Bonmin)
    }

    /// Whether this build can instantiate the backend. `bonmin` is gated by the
    /// cargo feature of the same name; the commercial backends have no bindings.
    pub fn is_available(self) -> bool {
        match self {
            Backend::Bonmin => cfg!(feature = "bonmin"),
            Backend::Mosek | Backend::Gurobi => false,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mosek" => Ok(Backend::Mosek),
            "bonmin" => Ok(Backend::Bonmin),
            "gurobi" => Ok(Backend::Gurobi),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Search strategy of a branch-and-bound backend, indexed 0..=5.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SearchAlgorithm {
    /// Plain branch-and-bound.
    #[default]
    BranchAndBound,
    OuterApproximation,
    QuesadaGrossmann,
    HybridOuterApproximation,
    EcpCuts,
    IteratedFeasibilityPump,
}

impl SearchAlgorithm {
    pub const ALL: [SearchAlgorithm; 6] = [
        SearchAlgorithm::BranchAndBound,
        SearchAlgorithm::OuterApproximation,
        SearchAlgorithm::QuesadaGrossmann,
        SearchAlgorithm::HybridOuterApproximation,
        SearchAlgorithm::EcpCuts,
        SearchAlgorithm::IteratedFeasibilityPump,
    ];

    pub fn index(self) -> u8 {
        Self::ALL.iter().position(|&a| a == self).unwrap_or(0) as u8
    }
}

impl TryFrom<u8> for SearchAlgorithm {
    type Error = ConfigError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(mode as usize)
            .copied()
            .ok_or(ConfigError::AlgorithmMode(mode))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjSense {
    Minimize,
    Maximize,
}

/// Backend status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptStatus {
    Ok,
    NodeLimit,
    TimeLimit,
    Infeasible,
    /// Backend-specific failure code.
    Error(i32),
}

impl OptStatus {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == OptStatus::Ok
    }
}

/// A MIQCP backend instance. One instance serves exactly one solve attempt.
pub trait Optimizer {
    /// Load a serialized problem directory.
    fn read(&mut self, dir: &Path) -> Result<(), ProblemError>;

    /// The loaded problem, if any.
    fn problem(&self) -> Option<&EnergyProblem>;

    fn set_time_limit(&mut self, seconds: f64);

    fn set_algorithm(&mut self, _algorithm: SearchAlgorithm) {}

    fn set_node_limit(&mut self, _nodes: u64) {}

    fn set_starting_point(&mut self, _x0: &[f64]) {}

    /// Prepare internal structures; must report `Ok` before `optimize`.
    fn update(&mut self) -> OptStatus;

    /// Solve; returns the status and the (possibly empty) decision vector.
    fn optimize(&mut self, sense: ObjSense) -> (OptStatus, Vec<f64>);
}

/// Instantiate an optimizer for `backend`, or fail if it is not built in.
pub fn create_optimizer(backend: Backend) -> Result<Box<dyn Optimizer>, ConfigError> {
    if !backend.is_available() {
        return Err(ConfigError::BackendUnavailable(backend));
    }
    match backend {
        Backend::Bonmin => Ok(Box::new(BranchAndBound::new())),
        Backend::Mosek | Backend::Gurobi => Err(ConfigError::BackendUnavailable(backend)),
    }
}
