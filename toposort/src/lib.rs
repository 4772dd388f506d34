// Kahn's algorithm, emitting nodes in insertion order whenever the graph leaves a choice.
pub use errors::SortError;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
pub mod errors;

/// A dependency graph. An edge `(dependency, dependent)` means `dependency`
/// must come before `dependent` in the sorted output.
#[derive(Debug, Clone)]
pub struct Graph<Node> {
    nodes: Vec<Node>,
    edges: Vec<(Node, Node)>,
}

impl<Node: Eq + Clone> Default for Graph<Node> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Node: Eq + Clone> Graph<Node> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds `node` unless it is already present.
    pub fn add_node(&mut self, node: Node) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    /// Records that `dependency` must be emitted before `dependent`.
    /// Both nodes are added when missing; duplicate edges are ignored.
    pub fn add_edge(&mut self, dependency: Node, dependent: Node) {
        self.add_node(dependency.clone());
        self.add_node(dependent.clone());

        let edge = (dependency, dependent);
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(Node, Node)] {
        &self.edges
    }
}

/// Sorts `graph` so that every dependency precedes its dependents.
///
/// Among nodes that are ready at the same time, the one added first wins, so
/// a graph without edges comes back in insertion order.
///
/// # Example
/// ```
/// let mut graph = bone_toposort::Graph::new();
/// graph.add_node("cdist");
/// graph.add_edge("dist", "cdist");
///
/// let sorted = bone_toposort::sort(&graph).unwrap();
/// assert_eq!(sorted, vec!["dist", "cdist"]);
/// ```
pub fn sort<Node: Hash + Eq + Clone>(graph: &Graph<Node>) -> Result<Vec<Node>, SortError<Node>> {
    let position: HashMap<&Node, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node, index))
        .collect();

    let mut in_degree = vec![0usize; graph.nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];

    for (dependency, dependent) in &graph.edges {
        let from = position[dependency];
        let to = position[dependent];
        dependents[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: VecDeque<usize> = (0..graph.nodes.len())
        .filter(|index| in_degree[*index] == 0)
        .collect();

    let mut sorted = Vec::with_capacity(graph.nodes.len());

    while let Some(index) = ready.pop_front() {
        sorted.push(index);

        let mut released = Vec::new();
        for &next in &dependents[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                released.push(next);
            }
        }
        // keep insertion order among the nodes this one released
        released.sort_unstable();
        ready.extend(released);
    }

    if sorted.len() == graph.nodes.len() {
        Ok(sorted
            .into_iter()
            .map(|index| graph.nodes[index].clone())
            .collect())
    } else {
        let unresolved = (0..graph.nodes.len())
            .filter(|index| in_degree[*index] > 0)
            .map(|index| graph.nodes[index].clone())
            .collect();

        Err(SortError::CycleDetected { unresolved })
    }
}
