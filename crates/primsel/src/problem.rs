//! Energy problem storage and evaluation.
//!
//! Problem directory layout
//! - `linobj.csv`: linear objective, n x 1.
//! - `qo.csv`: quadratic objective, n x n.
//! - `bounds.csv`: one `lo,hi` line per constraint (absent: no constraints).
//! - `a.csv`: linear constraint rows, m x n (absent: all zero).
//! - `qc_<k>.csv`: quadratic part of constraint k, n x n (absent: empty).
//!
//! Constraint k reads `lo_k <= x'Q_k x + a_k'x <= hi_k`.
//!
//! Evaluation order
//! - `x'L`: entries of `L` in storage order.
//! - `x'Qx`: per outer index j of `Q` (columns, CSC), `t_j = sum_i x_i Q_ij` over
//!   the stored entries of column j, then `sum_j t_j x_j` in ascending j. This is
//!   the order a sparse `(x' * Q) * x` product takes, so results are reproducible.

use std::fs;
use std::path::Path;

use serde::Serialize;
use sprs::{CsMat, TriMat};

use crate::error::{ProblemError, StructuralMismatch};
use crate::sparse_io::{parse_bounds, read_sparse};

/// Serialized energy problem, indexed by decision-vector position.
#[derive(Clone, Debug)]
pub struct EnergyProblem {
    linear: CsMat<f64>,
    quadratic: CsMat<f64>,
    constraint_rows: CsMat<f64>,
    constraints: Vec<CsMat<f64>>,
    bounds: Vec<(f64, f64)>,
}

impl EnergyProblem {
    /// Unconstrained problem from a linear objective (n x 1) and quadratic objective (n x n).
    pub fn new(linear: CsMat<f64>, quadratic: CsMat<f64>) -> Result<Self, ProblemError> {
        let n = linear.rows();
        Self::with_constraints(
            linear,
            quadratic,
            CsMat::zero((0, n)),
            Vec::new(),
            Vec::new(),
        )
    }

    /// Full problem; validates every dimension against `n = linear.rows()`.
    pub fn with_constraints(
        linear: CsMat<f64>,
        quadratic: CsMat<f64>,
        constraint_rows: CsMat<f64>,
        constraints: Vec<CsMat<f64>>,
        bounds: Vec<(f64, f64)>,
    ) -> Result<Self, ProblemError> {
        let n = linear.rows();
        if linear.cols() != 1 {
            return Err(ProblemError::Dimension(format!(
                "linear objective is {}x{}, expected {n}x1",
                linear.rows(),
                linear.cols()
            )));
        }
        if quadratic.shape() != (n, n) {
            return Err(ProblemError::Dimension(format!(
                "quadratic objective is {:?}, expected ({n}, {n})",
                quadratic.shape()
            )));
        }
        let m = bounds.len();
        if constraint_rows.shape() != (m, n) {
            return Err(ProblemError::Dimension(format!(
                "linear constraints are {:?}, expected ({m}, {n})",
                constraint_rows.shape()
            )));
        }
        if constraints.len() != m {
            return Err(ProblemError::Dimension(format!(
                "{} quadratic constraint matrices for {m} bounds",
                constraints.len()
            )));
        }
        if let Some((k, q)) = constraints
            .iter()
            .enumerate()
            .find(|(_, q)| q.shape() != (n, n))
        {
            return Err(ProblemError::Dimension(format!(
                "quadratic constraint {k} is {:?}, expected ({n}, {n})",
                q.shape()
            )));
        }
        Ok(Self {
            linear: linear.to_csc(),
            quadratic: quadratic.to_csc(),
            constraint_rows: constraint_rows.to_csr(),
            constraints: constraints.into_iter().map(|q| q.to_csc()).collect(),
            bounds,
        })
    }

    /// Load a problem directory (see module docs for the layout).
    pub fn read_dir(dir: &Path) -> Result<Self, ProblemError> {
        let linear = read_sparse(&dir.join("linobj.csv"))?;
        let quadratic = read_sparse(&dir.join("qo.csv"))?;
        let n = linear.rows();

        let bounds_path = dir.join("bounds.csv");
        let bounds = if bounds_path.exists() {
            let text = fs::read_to_string(&bounds_path).map_err(|source| ProblemError::Io {
                path: bounds_path.clone(),
                source,
            })?;
            parse_bounds(&text, &bounds_path)?
        } else {
            Vec::new()
        };
        let m = bounds.len();

        let a_path = dir.join("a.csv");
        let constraint_rows = if a_path.exists() {
            read_sparse(&a_path)?
        } else {
            CsMat::zero((m, n))
        };

        let mut constraints = Vec::with_capacity(m);
        for k in 0..m {
            let q_path = dir.join(format!("qc_{k}.csv"));
            if q_path.exists() {
                constraints.push(read_sparse(&q_path)?);
            } else {
                constraints.push(CsMat::zero((n, n)));
            }
        }
        Self::with_constraints(linear, quadratic, constraint_rows, constraints, bounds)
    }

    /// Number of decision variables.
    #[inline]
    pub fn dim(&self) -> usize {
        self.linear.rows()
    }

    pub fn linear_objective(&self) -> &CsMat<f64> {
        &self.linear
    }

    pub fn quadratic_objective(&self) -> &CsMat<f64> {
        &self.quadratic
    }

    pub fn constraint_count(&self) -> usize {
        self.bounds.len()
    }

    pub fn quadratic_constraint(&self, k: usize) -> &CsMat<f64> {
        &self.constraints[k]
    }

    pub fn constraint_bounds(&self, k: usize) -> (f64, f64) {
        self.bounds[k]
    }

    /// Value of constraint k's body `x'Q_k x + a_k'x`.
    pub fn constraint_value(&self, k: usize, x: &[f64]) -> f64 {
        let lin = self
            .constraint_rows
            .outer_view(k)
            .map(|row| row.iter().map(|(j, &v)| v * x[j]).sum::<f64>())
            .unwrap_or(0.0);
        quad_form(&self.constraints[k], x) + lin
    }

    /// True if every constraint holds within `eps`.
    pub fn is_feasible(&self, x: &[f64], eps: f64) -> bool {
        (0..self.constraint_count()).all(|k| {
            let (lo, hi) = self.bounds[k];
            let v = self.constraint_value(k, x);
            v >= lo - eps && v <= hi + eps
        })
    }

    /// Summed distance of every constraint body from its bounds; 0 when feasible.
    pub fn violation(&self, x: &[f64]) -> f64 {
        (0..self.constraint_count())
            .map(|k| {
                let (lo, hi) = self.bounds[k];
                let v = self.constraint_value(k, x);
                (lo - v).max(0.0) + (v - hi).max(0.0)
            })
            .sum()
    }

    fn check_dim(&self, x: &[f64]) -> Result<(), StructuralMismatch> {
        if x.len() != self.dim() {
            return Err(StructuralMismatch {
                len: x.len(),
                expected: self.dim(),
                what: "the energy problem",
            });
        }
        Ok(())
    }

    /// Data, pairwise and total energy of `x`.
    pub fn energy(&self, x: &[f64]) -> Result<EnergyBreakdown, StructuralMismatch> {
        self.check_dim(x)?;
        let data = linear_form(&self.linear, x);
        let pairwise = quad_form(&self.quadratic, x);
        Ok(EnergyBreakdown { data, pairwise })
    }

    /// Split the linear term into data and complexity parts using the weights
    /// the problem was formulated with: every selected variable pays
    /// `weights.complexity`, the rest of `x'L` is data cost.
    pub fn decompose(
        &self,
        x: &[f64],
        weights: ProblemWeights,
    ) -> Result<EnergyTerms, StructuralMismatch> {
        self.check_dim(x)?;
        let complexity = x.iter().map(|&xi| xi * weights.complexity).sum::<f64>();
        let data = linear_form(&self.linear, x) - complexity;
        let pairwise = quad_form(&self.quadratic, x);
        Ok(EnergyTerms {
            data,
            pairwise,
            complexity,
            weights,
        })
    }
}

/// `x'L` for a column vector `L`, accumulated in storage order.
fn linear_form(l: &CsMat<f64>, x: &[f64]) -> f64 {
    let mut acc = 0.0;
    for (&v, (r, _)) in l.iter() {
        acc += x[r] * v;
    }
    acc
}

/// `x'Mx` accumulated per outer index (see module docs).
pub fn quad_form(m: &CsMat<f64>, x: &[f64]) -> f64 {
    let mut acc = 0.0;
    for (outer, lane) in m.outer_iterator().enumerate() {
        let mut t = 0.0;
        for (inner, &v) in lane.iter() {
            t += x[inner] * v;
        }
        acc += t * x[outer];
    }
    acc
}

/// Sparse column holding the entries of `x` that round to a positive value.
pub fn selected_column(x: &[f64]) -> CsMat<f64> {
    let mut t = TriMat::new((x.len(), 1));
    for (i, &v) in x.iter().enumerate() {
        if v.round() > 0.0 {
            t.add_triplet(i, 0, v);
        }
    }
    t.to_csc()
}

/// Energy of one solution, as written to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EnergyBreakdown {
    pub data: f64,
    pub pairwise: f64,
}

impl EnergyBreakdown {
    #[inline]
    pub fn total(&self) -> f64 {
        self.data + self.pairwise
    }
}

/// Weights the upstream formulation used for its three energy terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProblemWeights {
    pub data: f64,
    pub pairwise: f64,
    pub complexity: f64,
}

impl Default for ProblemWeights {
    fn default() -> Self {
        Self {
            data: 1.0,
            pairwise: 1.0,
            complexity: 1.0,
        }
    }
}

/// Weighted energy split into data, pairwise and complexity terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EnergyTerms {
    pub data: f64,
    pub pairwise: f64,
    pub complexity: f64,
    pub weights: ProblemWeights,
}

impl EnergyTerms {
    pub fn total(&self) -> f64 {
        self.data + self.pairwise + self.complexity
    }

    /// Terms divided by their weights (zero weight yields zero).
    pub fn unweighted(&self) -> [f64; 3] {
        let div = |v: f64, w: f64| if w == 0.0 { 0.0 } else { v / w };
        [
            div(self.data, self.weights.data),
            div(self.pairwise, self.weights.pairwise),
            div(self.complexity, self.weights.complexity),
        ]
    }
}
