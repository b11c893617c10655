// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A small directed graph over dense node ids with a topological sort
//! that is stable with respect to node insertion order, so identical
//! inputs always produce identical output order.

use indexmap::IndexSet;
use itertools::Itertools;

pub struct Graph {
    /// adjacency[a] holds b for every edge a -> b ("a before b").
    adjacency: Vec<IndexSet<usize>>,
}

impl Graph {
    pub fn new(node_count: usize) -> Self {
        Graph {
            adjacency: vec![IndexSet::new(); node_count],
        }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        if from != to {
            self.adjacency[from].insert(to);
        }
    }

    pub fn remove_edge(&mut self, from: usize, to: usize) {
        self.adjacency[from].shift_remove(&to);
    }

    pub fn contains_edge(&self, from: usize, to: usize) -> bool {
        self.adjacency[from].contains(&to)
    }

    /// Kahn's algorithm with a lowest-insertion-index tie break. Returns
    /// `None` when the graph has a cycle.
    pub fn topological_sort(&self) -> Option<Vec<usize>> {
        let n = self.node_count();
        let mut in_degree = vec![0usize; n];
        for targets in &self.adjacency {
            for &t in targets {
                in_degree[t] += 1;
            }
        }
        let mut result = Vec::with_capacity(n);
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        while let Some(&node) = ready.first() {
            ready.remove(0);
            result.push(node);
            for &t in &self.adjacency[node] {
                in_degree[t] -= 1;
                if in_degree[t] == 0 {
                    // Keep `ready` sorted by node id so ties resolve to
                    // insertion order.
                    let pos = ready.partition_point(|&r| r < t);
                    ready.insert(pos, t);
                }
            }
        }
        if result.len() == n {
            Some(result)
        } else {
            None
        }
    }

    /// Graphviz rendering for cycle reports.
    pub fn dump_dot(&self, node_names: &[String]) -> String {
        let name = |i: usize| {
            node_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("n{}", i))
        };
        let edges = (0..self.node_count())
            .flat_map(|from| {
                self.adjacency[from]
                    .iter()
                    .map(move |&to| format!("    \"{}\" -> \"{}\";", name(from), name(to)))
            })
            .join("\n");
        format!("digraph dependencies {{\n{}\n}}\n", edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_respects_edges_and_insertion_order() {
        let mut g = Graph::new(4);
        g.add_edge(3, 0);
        g.add_edge(1, 0);
        let order = g.topological_sort().unwrap();
        let pos = |n: usize| order.iter().position(|&x| x == n).unwrap();
        assert!(pos(3) < pos(0));
        assert!(pos(1) < pos(0));
        // 1 and 2 are unconstrained; insertion order breaks the tie.
        assert!(pos(1) < pos(2));
    }

    #[test]
    fn cycle_is_detected() {
        let mut g = Graph::new(2);
        g.add_edge(0, 1);
        g.add_edge(1, 0);
        assert!(g.topological_sort().is_none());
    }

    #[test]
    fn identical_graphs_sort_identically() {
        let build = || {
            let mut g = Graph::new(5);
            g.add_edge(4, 2);
            g.add_edge(2, 0);
            g.add_edge(3, 0);
            g
        };
        assert_eq!(
            build().topological_sort().unwrap(),
            build().topological_sort().unwrap()
        );
    }

    #[test]
    fn dot_dump_names_nodes() {
        let mut g = Graph::new(2);
        g.add_edge(0, 1);
        let dot = g.dump_dot(&["int".to_string(), "double".to_string()]);
        assert!(dot.contains("\"int\" -> \"double\";"));
    }
}
