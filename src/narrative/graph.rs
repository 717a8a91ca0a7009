//! Story graph: a scratch [`GraphBuilder`] that is frozen into an immutable
//! [`StoryGraph`] once its invariants have been checked.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use schemars::JsonSchema;
use serde::Serialize;

use super::consequence::Consequence;
use super::synthesizer::Choice;
use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Start,
    Scene(usize),
    Branch { scene: usize, variant: usize },
    Ending,
}

impl NodeId {
    pub fn key(&self) -> String {
        match self {
            NodeId::Start => "START".to_string(),
            NodeId::Scene(i) => format!("scene_{i}"),
            NodeId::Branch { scene, variant } => format!("scene_{scene}_branch_{variant}"),
            NodeId::Ending => "ENDING".to_string(),
        }
    }

    pub fn scene_index(&self) -> Option<usize> {
        match self {
            NodeId::Scene(i) | NodeId::Branch { scene: i, .. } => Some(*i),
            NodeId::Start | NodeId::Ending => None,
        }
    }

    /// Position along the story. Every edge must strictly increase it.
    fn rank(&self) -> usize {
        match self {
            NodeId::Start => 0,
            NodeId::Scene(i) | NodeId::Branch { scene: i, .. } => i + 1,
            NodeId::Ending => usize::MAX,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryNode {
    pub id: NodeId,
    pub title: String,
    pub description: String,
    /// How many scenes this node sits into a divergence (0 on the main path).
    pub branch_depth: usize,
    pub is_ending: bool,
}

/// The choice an edge stands for, with its consequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeLabel {
    pub choice: Choice,
    pub consequence: Consequence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// `None` for edges the reader does not choose (leaving `START`).
    pub label: Option<EdgeLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceKind {
    ChapterBoundary,
    Periodic,
    PreEnding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConvergencePoint {
    pub after_scene_index: usize,
    #[serde(rename = "type")]
    pub kind: ConvergenceKind,
    pub reason: String,
}

/// Bounds checked when freezing.
#[derive(Debug, Clone, Copy)]
pub struct GraphLimits {
    pub scene_count: usize,
    pub max_choices: usize,
    pub max_branch_depth: usize,
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<StoryNode>,
    index: HashMap<NodeId, usize>,
    edges: Vec<StoryEdge>,
    convergence_points: Vec<ConvergencePoint>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Adds a node; a node with the same id is replaced.
    pub fn add_node(&mut self, node: StoryNode) {
        match self.index.get(&node.id) {
            Some(&slot) => self.nodes[slot] = node,
            None => {
                self.index.insert(node.id, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, label: Option<EdgeLabel>) {
        self.edges.push(StoryEdge { from, to, label });
    }

    pub fn set_convergence_points(&mut self, points: Vec<ConvergencePoint>) {
        self.convergence_points = points;
    }

    /// Checks the graph and returns its immutable form. Nodes that cannot be
    /// reached from `START` are dropped first (`ENDING` always stays).
    pub fn freeze(self, limits: GraphLimits) -> Result<StoryGraph, GraphError> {
        for edge in &self.edges {
            if !self.contains(&edge.from) || !self.contains(&edge.to) {
                return Err(GraphError::DanglingEdge {
                    from: edge.from.key(),
                    to: edge.to.key(),
                });
            }
            if edge.to.rank() <= edge.from.rank() {
                return Err(GraphError::BackwardEdge {
                    from: edge.from.key(),
                    to: edge.to.key(),
                });
            }
        }

        let reachable = reachable_from(NodeId::Start, &self.edges);
        let nodes: Vec<StoryNode> = self
            .nodes
            .into_iter()
            .filter(|n| n.is_ending || reachable.contains(&n.id))
            .collect();
        let edges: Vec<StoryEdge> = self
            .edges
            .into_iter()
            .filter(|e| reachable.contains(&e.from))
            .collect();
        let index: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let graph = StoryGraph {
            nodes,
            index,
            edges,
            convergence_points: self.convergence_points,
            max_branch_depth: limits.max_branch_depth,
        };
        graph.check(limits)?;
        Ok(graph)
    }
}

fn reachable_from(root: NodeId, edges: &[StoryEdge]) -> HashSet<NodeId> {
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for edge in edges.iter().filter(|e| e.from == id) {
            if seen.insert(edge.to) {
                queue.push_back(edge.to);
            }
        }
    }
    seen
}

/// Immutable branching story. Every node reaches `ENDING`.
#[derive(Debug, Clone)]
pub struct StoryGraph {
    nodes: Vec<StoryNode>,
    index: HashMap<NodeId, usize>,
    edges: Vec<StoryEdge>,
    convergence_points: Vec<ConvergencePoint>,
    max_branch_depth: usize,
}

impl StoryGraph {
    pub fn nodes(&self) -> &[StoryNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[StoryEdge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&StoryNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &StoryEdge> + '_ {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// The first node a reader sees: scene 0, or `ENDING` for an empty story.
    pub fn first_node(&self) -> NodeId {
        self.outgoing(NodeId::Start)
            .next()
            .map(|e| e.to)
            .unwrap_or(NodeId::Ending)
    }

    pub fn ending(&self) -> Option<&StoryNode> {
        self.node(&NodeId::Ending)
    }

    pub fn convergence_points(&self) -> &[ConvergencePoint] {
        &self.convergence_points
    }

    /// Branch depth limit the graph was checked against.
    pub fn max_branch_depth(&self) -> usize {
        self.max_branch_depth
    }

    /// Edges the reader chooses.
    pub fn choice_count(&self) -> usize {
        self.edges.iter().filter(|e| e.label.is_some()).count()
    }

    /// Longest number of edges from each node to `ENDING`.
    pub fn distances_to_ending(&self) -> HashMap<NodeId, usize> {
        let mut order: Vec<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        order.sort_by_key(|id| std::cmp::Reverse(id.rank()));

        let mut dist = HashMap::with_capacity(order.len());
        for id in order {
            let d = self
                .outgoing(id)
                .filter_map(|e| dist.get(&e.to).map(|d| d + 1))
                .max()
                .unwrap_or(0);
            dist.insert(id, d);
        }
        dist
    }

    fn check(&self, limits: GraphLimits) -> Result<(), GraphError> {
        if self.node(&NodeId::Ending).is_none() {
            return Err(GraphError::DeadEnd(NodeId::Start.key()));
        }

        for node in &self.nodes {
            if node.is_ending {
                continue;
            }
            let degree = self.outgoing(node.id).count();
            if degree == 0 {
                return Err(GraphError::DeadEnd(node.id.key()));
            }
            if degree > limits.max_choices {
                return Err(GraphError::FanOut {
                    node: node.id.key(),
                    degree,
                    limit: limits.max_choices,
                });
            }
        }

        let dist = self.distances_to_ending();
        for node in &self.nodes {
            let remaining = match node.id.scene_index() {
                Some(i) => limits.scene_count.saturating_sub(i),
                None if node.is_ending => 0,
                None => limits.scene_count + 1,
            };
            let limit = limits.max_branch_depth + remaining;
            let steps = dist.get(&node.id).copied().unwrap_or(0);
            if steps > limit {
                return Err(GraphError::PathTooLong {
                    node: node.id.key(),
                    steps,
                    limit,
                });
            }
        }
        Ok(())
    }
}
