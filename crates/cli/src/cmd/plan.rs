//! Implementation of the `fwstitch plan` command.
//!
//! Prints the actions a goal runs in dependency order. The graph is fixed,
//! so no configuration is needed.

use anyhow::{Context, Result};
use serde::Serialize;

use fwstitch_lib::graph::{Action, DependencyGraph};
use fwstitch_lib::pipeline::Goal;

use super::{GlobalOpts, PlanGoal};
use crate::output::{print_info, print_json, symbols};

#[derive(Serialize)]
struct PlanOutput {
  goal: Goal,
  order: Vec<Action>,
  edges: Vec<(Action, Action)>,
}

pub fn cmd_plan(opts: &GlobalOpts, goal: PlanGoal) -> Result<()> {
  let graph = DependencyGraph::pipeline().context("Failed to build dependency graph")?;
  let goal = goal.goal();
  let order = goal.actions(&graph).context("Failed to order actions")?;

  if opts.output.is_json() {
    let mut edges: Vec<_> = graph
      .edges()
      .into_iter()
      .filter(|(a, b)| order.contains(a) && order.contains(b))
      .collect();
    edges.sort();
    return print_json(&PlanOutput { goal, order, edges });
  }

  print_info(&format!("{} action(s)", order.len()));
  for (i, action) in order.iter().enumerate() {
    let deps: Vec<String> = graph
      .dependencies(*action)
      .into_iter()
      .filter(|d| order.contains(d))
      .map(|d| d.to_string())
      .collect();
    if deps.is_empty() {
      println!("  {}. {}", i + 1, action);
    } else {
      println!("  {}. {} {} after {}", i + 1, action, symbols::ARROW, deps.join(", "));
    }
  }

  Ok(())
}
