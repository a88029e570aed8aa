//! Immutable run configuration.
//!
//! Built once per invocation (the CLI converts its parsed arguments) and passed
//! by reference into the driver. Budget constants live here so the escalation
//! schedule is visible in one place.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::backend::{Backend, SearchAlgorithm};
use crate::error::ConfigError;

/// Default solver wall-clock limit in seconds.
pub const DEFAULT_TIME_LIMIT: f64 = 360.0;
/// Default number of solve attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
/// Node budget granted per attempt: attempt `k` (zero-based) gets `(1 + k) * NODE_BUDGET_STEP`.
pub const NODE_BUDGET_STEP: u64 = 100;
/// Default energy ledger file name, relative to the problem's parent directory.
pub const DEFAULT_ENERGY_FILE: &str = "energy.csv";
/// Constraint feasibility tolerance of the in-process backend.
pub(crate) const FEAS_EPS: f64 = 1e-6;

/// Node budget of zero-based attempt `attempt`.
#[inline]
pub fn node_limit(attempt: u32) -> u64 {
    (1 + attempt as u64) * NODE_BUDGET_STEP
}

/// Everything one solve run needs.
#[derive(Clone, Debug, Serialize)]
pub struct SolveConfig {
    pub backend: Backend,
    /// Directory holding the serialized energy problem.
    pub problem_dir: PathBuf,
    /// Seconds; non-positive disables the limit.
    pub time_limit: f64,
    pub algorithm: SearchAlgorithm,
    /// Output directory relative to the candidates file's parent.
    pub rel_out_dir: PathBuf,
    pub starting_point: Option<PathBuf>,
    pub candidates: Option<PathBuf>,
    pub energy_file: String,
    pub max_attempts: u32,
    pub verbose: bool,
}

impl SolveConfig {
    pub fn new(backend: Backend, problem_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            problem_dir: problem_dir.into(),
            time_limit: DEFAULT_TIME_LIMIT,
            algorithm: SearchAlgorithm::default(),
            rel_out_dir: PathBuf::from("."),
            starting_point: None,
            candidates: None,
            energy_file: DEFAULT_ENERGY_FILE.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            verbose: false,
        }
    }

    pub fn with_candidates(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates = Some(path.into());
        self
    }

    pub fn with_starting_point(mut self, path: impl Into<PathBuf>) -> Self {
        self.starting_point = Some(path.into());
        self
    }

    pub fn with_rel_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rel_out_dir = dir.into();
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = seconds;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Checks that need the filesystem but no backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if let Some(x0) = &self.starting_point {
            if !x0.exists() {
                return Err(ConfigError::MissingStartingPoint(x0.clone()));
            }
        }
        Ok(())
    }

    /// Energy ledger path: next to the problem directory.
    pub fn energy_ledger_path(&self) -> PathBuf {
        let parent = self
            .problem_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        parent.join(&self.energy_file)
    }
}
