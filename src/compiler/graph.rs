// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Dependency graph builder for compiled steps
//!
//! Synthesizes a serial chain when the pipeline declares no explicit
//! graph, wires steps to the checkout step, and validates that every
//! edge resolves and that the result is acyclic.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, Control, DfsEvent};
use std::collections::{HashMap, HashSet};

use crate::engine::Step;
use crate::errors::PodrunError;

/// Reserved name of the checkout step
pub const CLONE_STEP: &str = "clone";

/// Whether any step declares explicit dependencies
pub fn is_graph(steps: &[Step]) -> bool {
    steps.iter().any(|s| !s.depends_on.is_empty())
}

/// Make each step depend on its predecessor
pub fn configure_serial(steps: &mut [Step]) {
    for i in 1..steps.len() {
        steps[i].depends_on = vec![steps[i - 1].name.clone()];
    }
}

/// Make every dependency-free step depend on the checkout step
pub fn configure_clone_deps(steps: &mut [Step]) {
    for step in steps.iter_mut() {
        if step.name == CLONE_STEP {
            continue;
        }
        if step.depends_on.is_empty() {
            step.depends_on = vec![CLONE_STEP.to_string()];
        }
    }
}

/// Drop dangling checkout dependencies when there is no checkout step
pub fn remove_clone_deps(steps: &mut [Step]) {
    if steps.iter().any(|s| s.name == CLONE_STEP) {
        return;
    }
    for step in steps.iter_mut() {
        if step.depends_on.len() == 1 && step.depends_on[0] == CLONE_STEP {
            step.depends_on.clear();
        }
    }
}

/// Run the graph passes in order: serial-or-graph, then clone wiring
pub fn configure(steps: &mut [Step]) {
    if !is_graph(steps) {
        configure_serial(steps);
    }
    if steps.iter().any(|s| s.name == CLONE_STEP) {
        configure_clone_deps(steps);
    } else {
        remove_clone_deps(steps);
    }
}

/// Dependency graph over compiled steps, edges point from dependency to dependent
pub struct StepGraph {
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    index_to_name: HashMap<NodeIndex, String>,
}

impl StepGraph {
    /// Build the graph, failing on unknown dependencies or cycles
    pub fn build(steps: &[Step]) -> Result<Self, PodrunError> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();
        let mut index_to_name = HashMap::new();

        for (idx, step) in steps.iter().enumerate() {
            let node = graph.add_node(idx);
            name_to_index.insert(step.name.clone(), node);
            index_to_name.insert(node, step.name.clone());
        }

        for step in steps {
            let node = name_to_index[&step.name];
            for dep in &step.depends_on {
                let dep_node =
                    name_to_index
                        .get(dep)
                        .ok_or_else(|| PodrunError::UnknownDependency {
                            step: step.name.clone(),
                            dependency: dep.clone(),
                        })?;
                if !graph.contains_edge(*dep_node, node) {
                    graph.add_edge(*dep_node, node, ());
                }
            }
        }

        let built = Self {
            graph,
            name_to_index,
            index_to_name,
        };
        built.topological_order()?;
        Ok(built)
    }

    /// Step indices in an order that respects every edge
    pub fn topological_order(&self) -> Result<Vec<usize>, PodrunError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|cycle| PodrunError::CircularDependency {
                steps: self.cycle_members(cycle.node_id()),
            })
    }

    /// Walk back-edges from `start` until it is reached again
    fn cycle_members(&self, start: NodeIndex) -> Vec<String> {
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut closing = None;

        depth_first_search(&self.graph, Some(start), |event| match event {
            DfsEvent::TreeEdge(from, to) => {
                parent.insert(to, from);
                Control::Continue
            }
            DfsEvent::BackEdge(from, to) if to == start => {
                closing = Some(from);
                Control::Break(())
            }
            _ => Control::Continue,
        });

        let mut members = vec![self.index_to_name[&start].clone()];
        let Some(mut node) = closing else {
            return members;
        };
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        while node != start && seen.insert(node) {
            path.push(self.index_to_name[&node].clone());
            match parent.get(&node) {
                Some(p) => node = *p,
                None => break,
            }
        }
        path.reverse();
        members.extend(path);
        members.push(self.index_to_name[&start].clone());
        members
    }

    /// Direct dependencies of a step
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.neighbors(name, petgraph::Direction::Incoming)
    }

    /// Steps that depend directly on a step
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.neighbors(name, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: petgraph::Direction) -> Vec<String> {
        let Some(node) = self.name_to_index.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.index_to_name[&n].clone())
            .collect();
        names.sort();
        names
    }

    fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(from, to)| {
                (
                    self.index_to_name[&from].as_str(),
                    self.index_to_name[&to].as_str(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    fn names_in_order(&self) -> Vec<&str> {
        let mut nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        nodes.sort_by_key(|n| self.graph[*n]);
        nodes
            .into_iter()
            .map(|n| self.index_to_name[&n].as_str())
            .collect()
    }
}

/// Render the execution order with run policies
pub fn render_text(steps: &[Step]) -> Result<String, PodrunError> {
    let graph = StepGraph::build(steps)?;
    let mut out = String::new();

    for (i, idx) in graph.topological_order()?.into_iter().enumerate() {
        let step = &steps[idx];
        out.push_str(&format!("{}. {} ({})", i + 1, step.name, step.run_policy));
        if step.detach {
            out.push_str(" [detached]");
        }
        let deps = graph.dependencies(&step.name);
        if !deps.is_empty() {
            out.push_str(&format!(" [depends: {}]", deps.join(", ")));
        }
        out.push('\n');
    }

    Ok(out)
}

/// Render the graph in Graphviz DOT format
pub fn render_dot(steps: &[Step]) -> Result<String, PodrunError> {
    let graph = StepGraph::build(steps)?;
    let mut out = String::from("digraph pipeline {\n");
    out.push_str("    rankdir=TB;\n");
    out.push_str("    node [shape=box, style=rounded];\n\n");

    for (from, to) in graph.edges() {
        out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
    }
    for name in graph.names_in_order() {
        if graph.dependencies(name).is_empty() && graph.dependents(name).is_empty() {
            out.push_str(&format!("    \"{}\";\n", name));
        }
    }

    out.push_str("}\n");
    Ok(out)
}

/// Render the graph as a Mermaid flowchart
pub fn render_mermaid(steps: &[Step]) -> Result<String, PodrunError> {
    let graph = StepGraph::build(steps)?;
    let mut out = String::from("graph TD\n");

    for (i, name) in graph.names_in_order().into_iter().enumerate() {
        out.push_str(&format!("    s{}[\"{}\"]\n", i, name));
    }
    let ids: HashMap<&str, usize> = graph
        .names_in_order()
        .into_iter()
        .enumerate()
        .map(|(i, n)| (n, i))
        .collect();
    for (from, to) in graph.edges() {
        out.push_str(&format!("    s{} --> s{}\n", ids[from], ids[to]));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(spec: &[(&str, &[&str])]) -> Vec<Step> {
        spec.iter()
            .map(|(name, deps)| Step {
                name: name.to_string(),
                depends_on: deps.iter().map(|d| d.to_string()).collect(),
                ..Step::default()
            })
            .collect()
    }

    fn deps(steps: &[Step]) -> Vec<Vec<String>> {
        steps.iter().map(|s| s.depends_on.clone()).collect()
    }

    #[test]
    fn test_serial_chain() {
        let mut s = steps(&[("a", &[]), ("b", &[]), ("c", &[]), ("d", &[])]);
        assert!(!is_graph(&s));
        configure_serial(&mut s);

        assert!(s[0].depends_on.is_empty());
        for i in 1..s.len() {
            assert_eq!(s[i].depends_on, vec![s[i - 1].name.clone()]);
        }
    }

    #[test]
    fn test_explicit_graph_is_preserved() {
        let mut s = steps(&[("a", &[]), ("b", &[]), ("c", &["a"])]);
        assert!(is_graph(&s));
        configure(&mut s);
        assert_eq!(deps(&s), vec![vec![], vec![], vec!["a".to_string()]]);
    }

    #[test]
    fn test_clone_injection() {
        let mut s = steps(&[("clone", &[]), ("a", &[]), ("b", &[]), ("c", &[])]);
        configure_clone_deps(&mut s);

        assert!(s[0].depends_on.is_empty());
        for step in &s[1..] {
            assert_eq!(step.depends_on, vec!["clone"]);
        }
    }

    #[test]
    fn test_clone_injection_leaves_explicit_deps() {
        let mut s = steps(&[("clone", &[]), ("a", &[]), ("b", &["a"])]);
        configure(&mut s);
        assert_eq!(s[1].depends_on, vec!["clone"]);
        assert_eq!(s[2].depends_on, vec!["a"]);
    }

    #[test]
    fn test_serial_with_clone() {
        let mut s = steps(&[("clone", &[]), ("build", &[]), ("test", &[])]);
        configure(&mut s);
        assert!(s[0].depends_on.is_empty());
        assert_eq!(s[1].depends_on, vec!["clone"]);
        assert_eq!(s[2].depends_on, vec!["build"]);
    }

    #[test]
    fn test_clone_removal() {
        let mut s = steps(&[("a", &["clone"]), ("b", &["clone", "a"]), ("c", &["a"])]);
        remove_clone_deps(&mut s);
        assert!(s[0].depends_on.is_empty());
        assert_eq!(s[1].depends_on, vec!["clone", "a"]);
        assert_eq!(s[2].depends_on, vec!["a"]);
    }

    #[test]
    fn test_clone_removal_noop_when_present() {
        let mut s = steps(&[("clone", &[]), ("a", &["clone"])]);
        remove_clone_deps(&mut s);
        assert_eq!(s[1].depends_on, vec!["clone"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let s = steps(&[("a", &["missing"])]);
        let result = StepGraph::build(&s);
        assert!(matches!(
            result,
            Err(PodrunError::UnknownDependency { ref dependency, .. }) if dependency == "missing"
        ));
    }

    #[test]
    fn test_cycle_detection() {
        let s = steps(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
        match StepGraph::build(&s) {
            Err(PodrunError::CircularDependency { steps }) => {
                assert_eq!(steps.first(), steps.last());
                assert!(steps.len() >= 4);
            }
            other => panic!("expected cycle, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let s = steps(&[("a", &["a"])]);
        assert!(matches!(
            StepGraph::build(&s),
            Err(PodrunError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_diamond_order() {
        let s = steps(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        let graph = StepGraph::build(&s).unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order[0], 0);
        assert_eq!(order[3], 3);
        assert_eq!(graph.dependencies("d"), vec!["b", "c"]);
        assert_eq!(graph.dependents("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_renderers() {
        let s = steps(&[("clone", &[]), ("build", &["clone"]), ("lint", &[])]);

        let text = render_text(&s).unwrap();
        assert!(text.contains("build (on-success) [depends: clone]"));

        let dot = render_dot(&s).unwrap();
        assert!(dot.contains("\"clone\" -> \"build\";"));
        assert!(dot.contains("    \"lint\";"));

        let mermaid = render_mermaid(&s).unwrap();
        assert!(mermaid.starts_with("graph TD"));
        assert!(mermaid.contains("s0 --> s1"));
    }
}
