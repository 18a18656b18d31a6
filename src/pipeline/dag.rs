// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! DAG (Directed Acyclic Graph) view of a compiled plan
//!
//! Builds the step dependency graph, detects cycles, and renders the
//! graph for humans.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use crate::engine::{CompiledStep, RunPolicy};
use crate::errors::{DroverError, DroverResult};

/// Dependency graph over the steps of a plan. Node weights are step
/// indices; edges point from a dependency to its dependent.
pub struct DagBuilder {
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    names: Vec<String>,
    policies: Vec<RunPolicy>,
}

impl DagBuilder {
    /// Build and validate the graph of `steps`
    pub fn build(steps: &[CompiledStep]) -> DroverResult<Self> {
        let mut graph = DiGraph::with_capacity(steps.len(), steps.len());
        let mut name_to_index = HashMap::with_capacity(steps.len());

        for (idx, step) in steps.iter().enumerate() {
            let node = graph.add_node(idx);
            name_to_index.insert(step.name.clone(), node);
        }

        for step in steps {
            let step_node = name_to_index[&step.name];
            for dep in &step.depends_on {
                let dep_node = name_to_index.get(dep).ok_or_else(|| {
                    DroverError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                if !graph.contains_edge(*dep_node, step_node) {
                    graph.add_edge(*dep_node, step_node, ());
                }
            }
        }

        let builder = Self {
            graph,
            name_to_index,
            names: steps.iter().map(|s| s.name.clone()).collect(),
            policies: steps.iter().map(|s| s.run_policy).collect(),
        };
        builder.validate_acyclic()?;
        Ok(builder)
    }

    fn validate_acyclic(&self) -> DroverResult<()> {
        if toposort(&self.graph, None).is_ok() {
            return Ok(());
        }
        Err(DroverError::CircularDependency {
            steps: self.cycle_members(),
        })
    }

    /// Steps on a cycle, in plan order. A strongly connected component
    /// with more than one node, or a node with a self edge, is a cycle.
    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<usize> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|n| self.graph[n])
            .collect();
        members.sort_unstable();
        members.into_iter().map(|i| self.names[i].clone()).collect()
    }

    /// Step indices in an order where dependencies come first. Ties keep
    /// plan order.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut done = vec![false; remaining.len()];

        while order.len() < remaining.len() {
            let Some(next) = (0..remaining.len()).find(|&i| !done[i] && remaining[i] == 0) else {
                break;
            };
            done[next] = true;
            order.push(next);
            for dependent in self
                .graph
                .neighbors_directed(NodeIndex::new(next), Direction::Outgoing)
            {
                remaining[dependent.index()] -= 1;
            }
        }

        order
    }

    /// Step names in topological order
    pub fn topological_order_names(&self) -> Vec<String> {
        self.topological_order()
            .into_iter()
            .map(|i| self.names[i].clone())
            .collect()
    }

    /// Direct dependencies of a step, in plan order
    pub fn dependencies(&self, step: &str) -> Option<Vec<String>> {
        self.neighbors(step, Direction::Incoming)
    }

    /// Direct dependents of a step, in plan order
    pub fn dependents(&self, step: &str) -> Option<Vec<String>> {
        self.neighbors(step, Direction::Outgoing)
    }

    fn neighbors(&self, step: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(step)?;
        let mut indices: Vec<usize> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n])
            .collect();
        indices.sort_unstable();
        Some(indices.into_iter().map(|i| self.names[i].clone()).collect())
    }

    /// Check if step `a` depends (directly or transitively) on step `b`
    pub fn depends_on(&self, a: &str, b: &str) -> bool {
        let (Some(node_a), Some(node_b)) = (self.name_to_index.get(a), self.name_to_index.get(b))
        else {
            return false;
        };
        node_a != node_b && petgraph::algo::has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(from, to)| (self.graph[from], self.graph[to]))
    }

    /// Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (idx, name) in self.names.iter().enumerate() {
            out.push_str(&format!("    s{}[\"{}\"]\n", idx, name.replace('"', "'")));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    s{} --> s{}\n", from, to));
        }

        out
    }

    /// Graphviz DOT; skipped steps are dashed
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (name, policy) in self.names.iter().zip(&self.policies) {
            if *policy == RunPolicy::Never {
                out.push_str(&format!(
                    "    \"{}\" [style=\"rounded,dashed\"];\n",
                    escape_dot(name)
                ));
            } else {
                out.push_str(&format!("    \"{}\";\n", escape_dot(name)));
            }
        }
        out.push('\n');

        for (from, to) in self.edges() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                escape_dot(&self.names[from]),
                escape_dot(&self.names[to])
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Numbered execution order with policies and dependencies
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        for (i, idx) in self.topological_order().into_iter().enumerate() {
            let name = &self.names[idx];
            let deps = self.dependencies(name).unwrap_or_default();

            out.push_str(&format!("{}. {} ({})", i + 1, name, self.policies[idx]));
            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }
            out.push('\n');
        }

        out
    }
}

fn escape_dot(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}
