//! Interaction graph of a solved problem.
//!
//! One node per decision slot, one undirected edge per nonzero entry of any
//! quadratic constraint matrix. Edges are stored as ordered pairs `(min, max)`,
//! so the two halves of a symmetric matrix produce a single edge. Selected
//! primitives name their node `p<gid>,<dir_gid>` and anchor it at their position;
//! auxiliary slots are named `<index>_on` / `<index>_off`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use nalgebra::Vector3;

use crate::problem::EnergyProblem;
use crate::selection::{is_on, Selection};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphNode {
    pub name: Option<String>,
    pub pos: Option<Vector3<f64>>,
    /// Linear objective coefficient of the slot.
    pub cost: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionGraph {
    nodes: BTreeMap<usize, GraphNode>,
    edges: BTreeSet<(usize, usize)>,
}

impl InteractionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph with one node per slot, costs taken from the linear objective.
    pub fn for_problem(problem: &EnergyProblem) -> Self {
        let mut g = Self::new();
        for i in 0..problem.dim() {
            g.nodes.insert(i, GraphNode::default());
        }
        for (&v, (r, _)) in problem.linear_objective().iter() {
            g.nodes.entry(r).or_default().cost += v;
        }
        g
    }

    pub fn set_node_name(&mut self, id: usize, name: impl Into<String>) {
        self.nodes.entry(id).or_default().name = Some(name.into());
    }

    pub fn set_node_pos(&mut self, id: usize, pos: Vector3<f64>) {
        self.nodes.entry(id).or_default().pos = Some(pos);
    }

    /// Insert the undirected edge `{a, b}`; returns false if it already existed.
    pub fn add_edge(&mut self, a: usize, b: usize) -> bool {
        self.nodes.entry(a).or_default();
        self.nodes.entry(b).or_default();
        self.edges.insert((a.min(b), a.max(b)))
    }

    pub fn node(&self, id: usize) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (usize, &GraphNode)> + '_ {
        self.nodes.iter().map(|(&i, n)| (i, n))
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add an edge for every nonzero entry of every non-empty constraint matrix.
    pub fn add_constraint_edges(&mut self, problem: &EnergyProblem) {
        for k in 0..problem.constraint_count() {
            let qk = problem.quadratic_constraint(k);
            if qk.nnz() == 0 {
                continue;
            }
            for (&v, (row, col)) in qk.iter() {
                if v != 0.0 {
                    self.add_edge(row, col);
                }
            }
        }
    }

    /// Graphviz `graph` document; nodes then edges, both in ascending order.
    pub fn to_graphviz(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "graph diag {{");
        let _ = writeln!(out, "  node [shape=circle];");
        for (id, node) in self.nodes() {
            let label = node.name.clone().unwrap_or_else(|| id.to_string());
            let _ = write!(out, "  {id} [label=\"{}\"", label.replace('"', "\\\""));
            if let Some(p) = node.pos {
                let _ = write!(out, ", pos=\"{},{},{}\"", p.x, p.y, p.z);
            }
            let _ = writeln!(out, ", cost=\"{}\"];", node.cost);
        }
        for (a, b) in &self.edges {
            let _ = writeln!(out, "  {a} -- {b};");
        }
        let _ = writeln!(out, "}}");
        out
    }
}

/// Build the diagnostics graph for one accepted solution.
pub fn record(problem: &EnergyProblem, selection: &Selection, x: &[f64]) -> InteractionGraph {
    let mut g = InteractionGraph::for_problem(problem);
    for (slot, prim) in selection.selected() {
        g.set_node_name(slot, prim.display_name());
        g.set_node_pos(slot, prim.pos);
    }
    for (i, &v) in x.iter().enumerate().skip(selection.cluster_vars_start) {
        let state = if is_on(v) { "on" } else { "off" };
        g.set_node_name(i, format!("{i}_{state}"));
    }
    g.add_constraint_edges(problem);
    g
}
