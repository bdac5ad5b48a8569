//! Dependency graph of pipeline actions.
//!
//! Nodes are actions (build, convert, bridge, embed, upload) and an edge
//! `a → b` means `a` happens before `b`. Edges that would close a cycle are
//! refused when they are added, so every graph this module hands out has a
//! topological order.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;

use crate::target::TargetRole;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  /// The edge would make `downstream` a prerequisite of itself.
  #[error("edge {upstream} -> {downstream} would create a dependency cycle")]
  CycleRejected { upstream: Action, downstream: Action },

  #[error("dependency cycle detected")]
  CycleDetected,
}

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "target")]
pub enum Action {
  /// Compile a target through the outer build tool.
  Build(TargetRole),
  /// Convert a target's hex image into a raw binary.
  ConvertHex(TargetRole),
  /// Bring the child binary into the host tree.
  Bridge,
  /// Expand the bridged binary into C source.
  Embed,
  /// Flash a target.
  Upload(TargetRole),
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Action::Build(role) => write!(f, "build({})", role),
      Action::ConvertHex(role) => write!(f, "bin({})", role),
      Action::Bridge => write!(f, "bridge"),
      Action::Embed => write!(f, "embed"),
      Action::Upload(role) => write!(f, "upload({})", role),
    }
  }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
  graph: DiGraph<Action, ()>,
  nodes: HashMap<Action, NodeIndex>,
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// The full stitch pipeline.
  ///
  /// ```text
  /// build(child) → bin(child) → bridge → embed → build(host) → upload(host) → upload(child)
  /// ```
  ///
  /// plus the explicit `bin(child) → upload(host)` edge: the host upload may
  /// never run against a binary that was not converted in this run.
  pub fn pipeline() -> Result<Self, GraphError> {
    let mut graph = Self::new();
    let chain = [
      Action::Build(TargetRole::Child),
      Action::ConvertHex(TargetRole::Child),
      Action::Bridge,
      Action::Embed,
      Action::Build(TargetRole::Host),
      Action::Upload(TargetRole::Host),
      Action::Upload(TargetRole::Child),
    ];
    for pair in chain.windows(2) {
      graph.add_edge(pair[0], pair[1])?;
    }
    graph.add_edge(Action::ConvertHex(TargetRole::Child), Action::Upload(TargetRole::Host))?;
    Ok(graph)
  }

  /// Add a node (no-op if present).
  pub fn add_action(&mut self, action: Action) -> NodeIndex {
    if let Some(&idx) = self.nodes.get(&action) {
      return idx;
    }
    let idx = self.graph.add_node(action);
    self.nodes.insert(action, idx);
    idx
  }

  /// Declare that `upstream` happens before `downstream`.
  pub fn add_edge(&mut self, upstream: Action, downstream: Action) -> Result<(), GraphError> {
    let from = self.add_action(upstream);
    let to = self.add_action(downstream);

    if from == to || has_path_connecting(&self.graph, to, from, None) {
      return Err(GraphError::CycleRejected { upstream, downstream });
    }
    if !self.graph.contains_edge(from, to) {
      self.graph.add_edge(from, to, ());
    }
    Ok(())
  }

  /// Whether `a` must run before `b`.
  pub fn precedes(&self, a: Action, b: Action) -> bool {
    match (self.nodes.get(&a), self.nodes.get(&b)) {
      (Some(&from), Some(&to)) => from != to && has_path_connecting(&self.graph, from, to, None),
      _ => false,
    }
  }

  /// Actions in an order where every dependency comes first.
  pub fn execution_order(&self) -> Result<Vec<Action>, GraphError> {
    let sorted = toposort(&self.graph, None).map_err(|_| GraphError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx]).collect())
  }

  /// The subset of `execution_order` that `goal` depends on, goal included.
  pub fn order_for(&self, goal: Action) -> Result<Vec<Action>, GraphError> {
    Ok(
      self
        .execution_order()?
        .into_iter()
        .filter(|&a| a == goal || self.precedes(a, goal))
        .collect(),
    )
  }

  /// Group actions into stages; every action's dependencies are in an
  /// earlier stage.
  pub fn stages(&self) -> Result<Vec<Vec<Action>>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in self.graph.node_indices() {
      in_degree.insert(idx, self.graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut stages = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(GraphError::CycleDetected);
      }
      ready.sort();

      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      stages.push(ready.into_iter().map(|idx| self.graph[idx]).collect());
    }

    Ok(stages)
  }

  /// Direct prerequisites of an action.
  pub fn dependencies(&self, action: Action) -> Vec<Action> {
    let Some(&idx) = self.nodes.get(&action) else {
      return Vec::new();
    };
    let mut deps: Vec<Action> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep])
      .collect();
    deps.sort();
    deps
  }

  /// All edges as `(upstream, downstream)` pairs.
  pub fn edges(&self) -> Vec<(Action, Action)> {
    self
      .graph
      .edge_indices()
      .filter_map(|e| self.graph.edge_endpoints(e))
      .map(|(a, b)| (self.graph[a], self.graph[b]))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }
}
