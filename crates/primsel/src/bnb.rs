//! In-process binary branch-and-bound backend.
//!
//! Serves the `bonmin` backend: every decision variable is binary, variables
//! are fixed in index order, and a node's bound minimizes every objective term
//! independently over the free variables. Feasibility is checked on complete
//! assignments only. Before the search, a one-flip descent from the starting
//! point (or the all-off vector) seeds the incumbent; it is not charged to the
//! node budget, so the budget bounds how far the search improves an answer and
//! not whether one is found. The search stops at the node budget or the time
//! limit and returns the incumbent if one exists.
//!
//! Node selection follows the algorithm mode: `BranchAndBound` explores by best
//! bound; every other mode dives depth-first, which reaches feasible leaves
//! with fewer nodes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::backend::{ObjSense, OptStatus, Optimizer, SearchAlgorithm};
use crate::config::FEAS_EPS;
use crate::error::ProblemError;
use crate::problem::EnergyProblem;

const PRUNE_EPS: f64 = 1e-12;
const GREEDY_PASSES: usize = 8;

/// Branch-and-bound optimizer over 0/1 decision vectors.
#[derive(Debug)]
pub struct BranchAndBound {
    problem: Option<EnergyProblem>,
    time_limit: Option<Duration>,
    node_limit: u64,
    algorithm: SearchAlgorithm,
    start: Option<Vec<f64>>,
    ready: bool,
    nodes_explored: u64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchAndBound {
    pub fn new() -> Self {
        Self {
            problem: None,
            time_limit: None,
            node_limit: u64::MAX,
            algorithm: SearchAlgorithm::default(),
            start: None,
            ready: false,
            nodes_explored: 0,
        }
    }

    /// Optimizer with an already loaded problem.
    pub fn with_problem(problem: EnergyProblem) -> Self {
        Self {
            problem: Some(problem),
            ..Self::new()
        }
    }

    /// Nodes processed by the last `optimize` call.
    pub fn nodes_explored(&self) -> u64 {
        self.nodes_explored
    }
}

/// Signed objective in coordinate form, shared by bounds and leaf evaluation.
struct Objective {
    linear: Vec<f64>,
    quadratic: Vec<(usize, usize, f64)>,
}

impl Objective {
    fn new(problem: &EnergyProblem, sense: ObjSense) -> Self {
        let sign = match sense {
            ObjSense::Minimize => 1.0,
            ObjSense::Maximize => -1.0,
        };
        let mut linear = vec![0.0; problem.dim()];
        for (&v, (r, _)) in problem.linear_objective().iter() {
            linear[r] += sign * v;
        }
        let quadratic = problem
            .quadratic_objective()
            .iter()
            .map(|(&v, (r, c))| (r, c, sign * v))
            .collect();
        Self { linear, quadratic }
    }

    fn value(&self, x: &[f64]) -> f64 {
        let lin: f64 = self.linear.iter().zip(x).map(|(l, xi)| l * xi).sum();
        let quad: f64 = self
            .quadratic
            .iter()
            .map(|&(r, c, v)| x[r] * v * x[c])
            .sum();
        lin + quad
    }

    /// Each term minimized on its own over the free variables.
    fn lower_bound(&self, fixed: &[Option<bool>]) -> f64 {
        let mut lb = 0.0;
        for (l, f) in self.linear.iter().zip(fixed) {
            match f {
                Some(true) => lb += l,
                Some(false) => {}
                None => lb += l.min(0.0),
            }
        }
        for &(r, c, v) in &self.quadratic {
            match (fixed[r], fixed[c]) {
                (Some(false), _) | (_, Some(false)) => {}
                (Some(true), Some(true)) => lb += v,
                _ => lb += v.min(0.0),
            }
        }
        lb
    }
}

#[derive(Clone, Debug)]
struct Node {
    fixed: Vec<Option<bool>>,
    depth: usize,
    bound: f64,
}

/// Heap entry: lowest bound first, deeper node on ties.
struct Queued(Node);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .bound
            .partial_cmp(&self.0.bound)
            .unwrap_or(Ordering::Equal)
            .then(self.0.depth.cmp(&other.0.depth))
    }
}

enum Frontier {
    Dive(Vec<Node>),
    BestBound(BinaryHeap<Queued>),
}

impl Frontier {
    fn new(algorithm: SearchAlgorithm) -> Self {
        match algorithm {
            SearchAlgorithm::BranchAndBound => Frontier::BestBound(BinaryHeap::new()),
            _ => Frontier::Dive(Vec::new()),
        }
    }

    fn push(&mut self, node: Node) {
        match self {
            Frontier::Dive(stack) => stack.push(node),
            Frontier::BestBound(heap) => heap.push(Queued(node)),
        }
    }

    fn pop(&mut self) -> Option<Node> {
        match self {
            Frontier::Dive(stack) => stack.pop(),
            Frontier::BestBound(heap) => heap.pop().map(|q| q.0),
        }
    }
}

/// Round to 0/1.
fn to_binary_values(x: &[f64]) -> Vec<f64> {
    x.iter()
        .map(|v| if v.round() > 0.0 { 1.0 } else { 0.0 })
        .collect()
}

/// One-flip descent from `x`: while infeasible a flip must lower the
/// violation, once feasible it must lower the objective. Returns the end point
/// if it is feasible. Runs before the search and is not charged to the node
/// budget.
fn greedy_descent(
    problem: &EnergyProblem,
    objective: &Objective,
    mut x: Vec<f64>,
) -> Option<(f64, Vec<f64>)> {
    let mut violation = problem.violation(&x);
    let mut value = objective.value(&x);
    for _ in 0..GREEDY_PASSES {
        let mut improved = false;
        for i in 0..x.len() {
            x[i] = 1.0 - x[i];
            let v = problem.violation(&x);
            let f = objective.value(&x);
            let better = if violation > FEAS_EPS {
                v < violation - FEAS_EPS
            } else {
                v <= FEAS_EPS && f < value - PRUNE_EPS
            };
            if better {
                violation = v;
                value = f;
                improved = true;
            } else {
                x[i] = 1.0 - x[i];
            }
        }
        if !improved {
            break;
        }
    }
    problem
        .is_feasible(&x, FEAS_EPS)
        .then(|| (objective.value(&x), x))
}

fn to_binary(fixed: &[Option<bool>]) -> Vec<f64> {
    fixed
        .iter()
        .map(|v| if *v == Some(true) { 1.0 } else { 0.0 })
        .collect()
}

impl Optimizer for BranchAndBound {
    fn read(&mut self, dir: &Path) -> Result<(), ProblemError> {
        self.problem = Some(EnergyProblem::read_dir(dir)?);
        self.ready = false;
        Ok(())
    }

    fn problem(&self) -> Option<&EnergyProblem> {
        self.problem.as_ref()
    }

    fn set_time_limit(&mut self, seconds: f64) {
        self.time_limit =
            (seconds > 0.0 && seconds.is_finite()).then(|| Duration::from_secs_f64(seconds));
    }

    fn set_algorithm(&mut self, algorithm: SearchAlgorithm) {
        self.algorithm = algorithm;
    }

    fn set_node_limit(&mut self, nodes: u64) {
        self.node_limit = nodes;
    }

    fn set_starting_point(&mut self, x0: &[f64]) {
        self.start = Some(x0.to_vec());
    }

    fn update(&mut self) -> OptStatus {
        self.ready = self.problem.is_some();
        if self.ready {
            OptStatus::Ok
        } else {
            OptStatus::Error(-1)
        }
    }

    fn optimize(&mut self, sense: ObjSense) -> (OptStatus, Vec<f64>) {
        self.nodes_explored = 0;
        let problem = match (&self.problem, self.ready) {
            (Some(p), true) => p,
            _ => return (OptStatus::Error(-2), Vec::new()),
        };
        let n = problem.dim();
        let objective = Objective::new(problem, sense);
        let started = Instant::now();

        let seed = match &self.start {
            Some(x0) if x0.len() == n => to_binary_values(x0),
            Some(x0) => {
                tracing::debug!(len = x0.len(), n, "starting point ignored");
                vec![0.0; n]
            }
            None => vec![0.0; n],
        };
        let mut incumbent = greedy_descent(problem, &objective, seed);
        if let Some((value, _)) = &incumbent {
            tracing::debug!(value, "greedy incumbent");
        }

        let root_fixed = vec![None; n];
        let mut frontier = Frontier::new(self.algorithm);
        frontier.push(Node {
            bound: objective.lower_bound(&root_fixed),
            fixed: root_fixed,
            depth: 0,
        });

        let mut status = OptStatus::Ok;
        while let Some(node) = frontier.pop() {
            if self.nodes_explored >= self.node_limit {
                status = OptStatus::NodeLimit;
                break;
            }
            if self.time_limit.is_some_and(|limit| started.elapsed() >= limit) {
                status = OptStatus::TimeLimit;
                break;
            }
            self.nodes_explored += 1;

            let best = incumbent.as_ref().map_or(f64::INFINITY, |(v, _)| *v);
            if node.bound >= best - PRUNE_EPS {
                continue;
            }
            if node.depth == n {
                let x = to_binary(&node.fixed);
                if problem.is_feasible(&x, FEAS_EPS) {
                    let value = objective.value(&x);
                    if value < best {
                        incumbent = Some((value, x));
                    }
                }
                continue;
            }
            for value in [false, true] {
                let mut fixed = node.fixed.clone();
                fixed[node.depth] = Some(value);
                let bound = objective.lower_bound(&fixed);
                if bound < best - PRUNE_EPS {
                    frontier.push(Node {
                        fixed,
                        depth: node.depth + 1,
                        bound,
                    });
                }
            }
        }

        tracing::debug!(
            nodes = self.nodes_explored,
            ?status,
            algorithm = ?self.algorithm,
            incumbent = incumbent.as_ref().map(|(v, _)| *v),
            "branch-and-bound finished"
        );
        match incumbent {
            Some((_, x)) => (OptStatus::Ok, x),
            None if status == OptStatus::Ok => (OptStatus::Infeasible, Vec::new()),
            None => (status, Vec::new()),
        }
    }
}
