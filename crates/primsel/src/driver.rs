//! Solve driver: retry/escalation around a backend, then post-processing.
//!
//! State machine per run
//! - `Init`: instantiate a fresh optimizer (unavailable backend is fatal).
//! - `Configured`: problem read (failure is fatal), time limit, and for
//!   branch-and-bound backends the algorithm mode, node budget
//!   `(1 + attempt) * 100` and optional starting point.
//! - `Solving`: `update()`, then `optimize(Minimize)` only if update was ok.
//! - `Success` if the backend status is ok and the vector is non-empty with a
//!   nonzero accumulated sum; otherwise `Retry` back to `Init` until the attempt
//!   budget is spent, which ends the run in `Exhausted`.
//! - `Fatal`: unavailable backend, unreadable problem or starting point, and
//!   post-processing failures. Never retried.
//!
//! The optimizer is a `Box<dyn Optimizer>` owned by a single attempt and dropped
//! at the end of it on every path.
//!
//! The sum test accumulates into an integer, truncating after every addition,
//! so vectors of small fractional values count as zero.

use std::path::{Path, PathBuf};

use crate::backend::{create_optimizer, Backend, ObjSense, OptStatus, Optimizer};
use crate::config::{node_limit, SolveConfig};
use crate::diagnostics;
use crate::error::{ArtifactError, ArtifactKind, BoxError, ConfigError, ProblemError, SolveError};
use crate::output::{self, ArtifactPaths};
use crate::primitive::PrimitiveIo;
use crate::problem::{selected_column, EnergyBreakdown, EnergyProblem};
use crate::selection;
use crate::sparse_io::{format_sparse, read_dense_column};

/// Driver states, logged on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Configured,
    Solving,
    Retry,
    Success,
    /// Every attempt was rejected.
    Exhausted,
    Fatal,
}

/// Why an attempt was not accepted.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    Update(OptStatus),
    Optimize(OptStatus),
    Empty,
    ZeroSum,
}

/// Sum of `x` with integer accumulation: truncated toward zero after each step.
pub fn accumulate_truncated(x: &[f64]) -> i64 {
    x.iter().fold(0i64, |acc, &v| (acc as f64 + v) as i64)
}

/// Terminal state of a run that failed with `err`.
pub fn terminal_state(err: &SolveError) -> DriverState {
    match err {
        SolveError::AttemptsExhausted { .. } => DriverState::Exhausted,
        _ => DriverState::Fatal,
    }
}

/// Accept or reject one backend answer.
pub fn judge(status: OptStatus, x: &[f64]) -> Result<(), Rejection> {
    if !status.is_ok() {
        return Err(Rejection::Optimize(status));
    }
    if x.is_empty() {
        return Err(Rejection::Empty);
    }
    if accumulate_truncated(x) == 0 {
        return Err(Rejection::ZeroSum);
    }
    Ok(())
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunReport {
    pub backend: Backend,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub x: Vec<f64>,
    pub energy: EnergyBreakdown,
    pub iteration: Option<u32>,
    pub selected: usize,
    pub deferred: usize,
    pub written: Vec<(ArtifactKind, PathBuf)>,
    pub failures: Vec<ArtifactError>,
}

impl RunReport {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Path> {
        self.written
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, p)| p.as_path())
    }

    fn record(&mut self, kind: ArtifactKind, path: PathBuf, result: Result<(), BoxError>) {
        match result {
            Ok(()) => {
                tracing::info!(%kind, path = %path.display(), "artifact written");
                self.written.push((kind, path));
            }
            Err(source) => {
                let err = ArtifactError { kind, path, source };
                tracing::error!(error = %err, "artifact failed");
                self.failures.push(err);
            }
        }
    }
}

/// Drives one solve run.
pub struct Driver<'a> {
    cfg: &'a SolveConfig,
    io: &'a dyn PrimitiveIo,
}

impl<'a> Driver<'a> {
    pub fn new(cfg: &'a SolveConfig, io: &'a dyn PrimitiveIo) -> Self {
        Self { cfg, io }
    }

    /// Solve with the backends built into this crate.
    pub fn solve(&self) -> Result<RunReport, SolveError> {
        self.solve_with(create_optimizer)
    }

    /// Solve with optimizers produced by `factory`, one per attempt.
    pub fn solve_with<F>(&self, mut factory: F) -> Result<RunReport, SolveError>
    where
        F: FnMut(Backend) -> Result<Box<dyn Optimizer>, ConfigError>,
    {
        let cfg = self.cfg;
        cfg.validate().inspect_err(|e| fatal("validate", e))?;
        let start = match &cfg.starting_point {
            Some(path) => Some(
                read_dense_column(path)
                    .map_err(ConfigError::StartingPoint)
                    .inspect_err(|e| fatal("starting point", e))?,
            ),
            None => None,
        };

        for attempt in 0..cfg.max_attempts {
            transition(DriverState::Init, attempt);
            let mut opt = factory(cfg.backend).inspect_err(|e| fatal("backend", e))?;
            opt.read(&cfg.problem_dir)
                .map_err(ConfigError::Problem)
                .inspect_err(|e| fatal("read problem", e))?;
            self.configure(opt.as_mut(), attempt, start.as_deref());
            transition(DriverState::Configured, attempt);

            transition(DriverState::Solving, attempt);
            match run_attempt(opt.as_mut()) {
                Ok(x) => {
                    transition(DriverState::Success, attempt);
                    return self.finish(opt.as_ref(), x, attempt + 1);
                }
                Err(why) => {
                    tracing::warn!(attempt, reason = ?why, "attempt rejected");
                    transition(DriverState::Retry, attempt);
                }
            }
        }

        let err = SolveError::AttemptsExhausted {
            attempts: cfg.max_attempts,
        };
        transition(terminal_state(&err), cfg.max_attempts);
        tracing::error!(error = %err, "run failed");
        Err(err)
    }

    fn configure(&self, opt: &mut dyn Optimizer, attempt: u32, start: Option<&[f64]>) {
        let cfg = self.cfg;
        if cfg.time_limit > 0.0 {
            opt.set_time_limit(cfg.time_limit);
        }
        if cfg.backend.uses_node_budget() {
            let nodes = node_limit(attempt);
            tracing::info!(attempt, node_limit = nodes, algorithm = ?cfg.algorithm, "configure");
            opt.set_algorithm(cfg.algorithm);
            opt.set_node_limit(nodes);
            if let Some(x0) = start {
                opt.set_starting_point(x0);
            }
        }
    }

    /// Post-process an accepted vector and write the artifacts.
    fn finish(
        &self,
        opt: &dyn Optimizer,
        x: Vec<f64>,
        attempts: u32,
    ) -> Result<RunReport, SolveError> {
        let cfg = self.cfg;
        let problem = opt
            .problem()
            .ok_or(ConfigError::Problem(ProblemError::NotLoaded))?;
        let energy = problem.energy(&x)?;
        tracing::info!(
            total = energy.total(),
            data = energy.data,
            pairwise = energy.pairwise,
            attempts,
            "solution accepted"
        );

        let mut report = RunReport {
            backend: cfg.backend,
            attempts,
            x,
            energy,
            iteration: None,
            selected: 0,
            deferred: 0,
            written: Vec::new(),
            failures: Vec::new(),
        };

        let x_path = cfg.problem_dir.join("x.csv");
        let solution = format_sparse(&selected_column(&report.x));
        let res = output::write_atomic(&x_path, solution.as_bytes()).map_err(BoxError::from);
        report.record(ArtifactKind::Solution, x_path, res);

        match &cfg.candidates {
            Some(candidates) => self.write_selection(problem, candidates, &mut report)?,
            None => tracing::warn!("no candidates given, selected primitives are not saved"),
        }

        let ledger = cfg.energy_ledger_path();
        let res = output::append_ledger_row(&ledger, &report.energy).map_err(BoxError::from);
        report.record(ArtifactKind::EnergyLedger, ledger, res);

        Ok(report)
    }

    fn write_selection(
        &self,
        problem: &EnergyProblem,
        candidates: &Path,
        report: &mut RunReport,
    ) -> Result<(), SolveError> {
        let cfg = self.cfg;
        tracing::debug!(path = %candidates.display(), "reading candidates");
        let mut prims = self
            .io
            .read_primitives(candidates)
            .map_err(|source| SolveError::Candidates {
                path: candidates.to_path_buf(),
                source,
            })
            .inspect_err(|e| fatal("read candidates", e))?;

        let sel = selection::apply(&mut prims, &report.x).inspect_err(|e| fatal("selection", e))?;
        report.selected = sel.selected().count();
        report.deferred = sel.deferred().count();
        tracing::info!(
            selected = report.selected,
            deferred = report.deferred,
            cluster_vars_start = sel.cluster_vars_start,
            "selection"
        );

        let graph = diagnostics::record(problem, &sel, &report.x);
        let paths = ArtifactPaths::new(candidates, &cfg.rel_out_dir, cfg.backend);
        report.iteration = Some(paths.iteration);

        let res = output::write_atomic(&paths.diagnostics, graph.to_graphviz().as_bytes())
            .map_err(BoxError::from);
        report.record(ArtifactKind::Diagnostics, paths.diagnostics.clone(), res);

        let res = output::write_primitives(self.io, &sel.to_set(), &paths.primitives).map(|backup| {
            if let Some(b) = backup {
                tracing::info!(backup = %b.display(), "previous primitives backed up");
            }
        });
        report.record(ArtifactKind::Primitives, paths.primitives, res);
        Ok(())
    }
}

fn run_attempt(opt: &mut dyn Optimizer) -> Result<Vec<f64>, Rejection> {
    tracing::debug!("calling problem update");
    let status = opt.update();
    if !status.is_ok() {
        return Err(Rejection::Update(status));
    }
    tracing::debug!("calling problem optimize");
    let (status, x) = opt.optimize(ObjSense::Minimize);
    judge(status, &x)?;
    tracing::debug!(sum = accumulate_truncated(&x), len = x.len(), "optimizer output");
    Ok(x)
}

fn transition(state: DriverState, attempt: u32) {
    tracing::debug!(?state, attempt, "driver");
}

fn fatal(stage: &str, err: &dyn std::error::Error) {
    tracing::debug!(state = ?DriverState::Fatal, "driver");
    tracing::error!(stage, error = %err, "run failed");
}

#[cfg(test)]
mod tests;
