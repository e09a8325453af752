//! The resolution graph.
//!
//! Nodes are recipe names held in a petgraph arena; edges are indices. The
//! graph is built fresh for each (root, target) pair and never outlives the
//! resolution that built it. Traversal state lives in the traversal, not in
//! the graph.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

/// Directed graph of `recipe -> dependency` edges.
#[derive(Debug, Default)]
pub struct ResolutionGraph {
  graph: DiGraph<String, ()>,
  indices: HashMap<String, NodeIndex>,
}

impl ResolutionGraph {
  /// Build a graph from adjacency lists. Every dependency becomes a node,
  /// whether or not it has its own entry.
  pub fn from_edges(edges: &BTreeMap<String, Vec<String>>) -> Self {
    let mut graph = Self::default();
    for (from, deps) in edges {
      let from = graph.node(from);
      for dep in deps {
        let to = graph.node(dep);
        graph.graph.update_edge(from, to, ());
      }
    }
    graph
  }

  fn node(&mut self, name: &str) -> NodeIndex {
    if let Some(idx) = self.indices.get(name) {
      return *idx;
    }
    let idx = self.graph.add_node(name.to_string());
    self.indices.insert(name.to_string(), idx);
    idx
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Direct dependencies of `name`, sorted.
  pub fn dependencies(&self, name: &str) -> Vec<&str> {
    let Some(idx) = self.indices.get(name) else {
      return Vec::new();
    };
    let mut deps: Vec<&str> = self
      .graph
      .neighbors_directed(*idx, Direction::Outgoing)
      .map(|n| self.graph[n].as_str())
      .collect();
    deps.sort_unstable();
    deps
  }

  /// Depth-first, dependency-first order of everything reachable from `root`.
  ///
  /// Children are visited in name order, so the result depends only on the
  /// graph. Returns the cycle path (first node repeated at the end) if one is
  /// reachable.
  pub fn dependency_order(&self, root: &str) -> Result<Vec<String>, Vec<String>> {
    let Some(&root) = self.indices.get(root) else {
      return Ok(vec![root.to_string()]);
    };

    let mut walk = Walk {
      graph: self,
      done: HashSet::new(),
      stack: Vec::new(),
      on_stack: HashSet::new(),
      order: Vec::new(),
    };
    walk.visit(root)?;
    Ok(walk.order)
  }
}

struct Walk<'g> {
  graph: &'g ResolutionGraph,
  done: HashSet<NodeIndex>,
  stack: Vec<NodeIndex>,
  on_stack: HashSet<NodeIndex>,
  order: Vec<String>,
}

impl Walk<'_> {
  fn visit(&mut self, node: NodeIndex) -> Result<(), Vec<String>> {
    if self.done.contains(&node) {
      return Ok(());
    }
    if self.on_stack.contains(&node) {
      return Err(self.cycle_from(node));
    }

    self.stack.push(node);
    self.on_stack.insert(node);

    let mut children: Vec<NodeIndex> = self
      .graph
      .graph
      .neighbors_directed(node, Direction::Outgoing)
      .collect();
    children.sort_by(|a, b| self.graph.graph[*a].cmp(&self.graph.graph[*b]));
    for child in children {
      self.visit(child)?;
    }

    self.stack.pop();
    self.on_stack.remove(&node);
    self.done.insert(node);
    self.order.push(self.graph.graph[node].clone());
    Ok(())
  }

  fn cycle_from(&self, node: NodeIndex) -> Vec<String> {
    let start = self.stack.iter().position(|n| *n == node).unwrap_or(0);
    self.stack[start..]
      .iter()
      .chain(std::iter::once(&node))
      .map(|n| self.graph.graph[*n].clone())
      .collect()
  }
}
