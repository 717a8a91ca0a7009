//! Path convergence: assembles scenes, choices and consequences into a
//! bounded branching graph whose every path ends on the author's ending.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use super::chunker::Chunk;
use super::consequence::Consequence;
use super::graph::{
    ConvergenceKind, ConvergencePoint, EdgeLabel, GraphBuilder, GraphLimits, NodeId, StoryGraph,
    StoryNode,
};
use super::synthesizer::{Choice, Scene};
use crate::config::ConvergenceConfig;
use crate::error::GraphError;

/// Sentences of the final chunk kept as the ending.
const ENDING_SENTENCES: usize = 3;

/// Smallest spacing between periodic convergence points.
const MIN_PERIODIC_INTERVAL: usize = 3;

pub fn periodic_interval(scene_count: usize) -> usize {
    (scene_count / 5).max(MIN_PERIODIC_INTERVAL)
}

/// Whether every choice at scene `index` must lead to the same next scene:
/// near the end, or on a periodic index. Scene 0 is always periodic.
pub fn should_converge(index: usize, scene_count: usize, buffer: usize) -> bool {
    index + buffer >= scene_count || index % periodic_interval(scene_count) == 0
}

/// The author's ending: the last sentences of the final chunk, verbatim.
/// Falls back to the whole text when there is nothing to take them from.
pub fn extract_ending(chunks: &[Chunk], source: &str) -> String {
    match chunks.last() {
        Some(last) if !last.sentences.is_empty() => {
            let start = last.sentences.len().saturating_sub(ENDING_SENTENCES);
            last.sentences[start..].join(" ")
        }
        _ => source.trim().to_string(),
    }
}

pub struct PathConvergenceEngine {
    convergence_buffer: usize,
    max_branch_depth: usize,
    max_choices: usize,
}

/// A node waiting to be built, with the branch it belongs to.
struct Pending {
    id: NodeId,
    depth: usize,
    lead: Option<String>,
}

impl PathConvergenceEngine {
    pub fn new(config: &ConvergenceConfig, max_choices: usize) -> Self {
        Self {
            convergence_buffer: config.convergence_buffer,
            max_branch_depth: config.max_branch_depth.max(1),
            max_choices,
        }
    }

    pub fn should_converge(&self, index: usize, scene_count: usize) -> bool {
        should_converge(index, scene_count, self.convergence_buffer)
    }

    /// Builds the story graph. `source` is the original input text, used
    /// unchanged as the ending when there are no scenes.
    pub fn converge(
        &self,
        scenes: &[Scene],
        choices: &[Choice],
        consequences: &[Consequence],
        chunks: &[Chunk],
        source: &str,
    ) -> Result<StoryGraph, GraphError> {
        let n = scenes.len();
        let labels = group_choices(choices, consequences);

        let mut builder = GraphBuilder::new();
        builder.add_node(StoryNode {
            id: NodeId::Start,
            title: "Start".to_string(),
            description: String::new(),
            branch_depth: 0,
            is_ending: false,
        });
        let ending_text = if n == 0 {
            source.to_string()
        } else {
            extract_ending(chunks, source)
        };
        builder.add_node(StoryNode {
            id: NodeId::Ending,
            title: "The End".to_string(),
            description: ending_text,
            branch_depth: 0,
            is_ending: true,
        });

        if n == 0 {
            debug!("No scenes, linking START straight to ENDING");
            builder.add_edge(NodeId::Start, NodeId::Ending, None);
        } else {
            builder.add_edge(NodeId::Start, NodeId::Scene(0), None);
        }

        let mut queued = HashSet::new();
        let mut queue = VecDeque::new();
        if n > 0 {
            queued.insert(NodeId::Scene(0));
            queue.push_back(Pending {
                id: NodeId::Scene(0),
                depth: 0,
                lead: None,
            });
        }

        while let Some(pending) = queue.pop_front() {
            let Some(i) = pending.id.scene_index() else {
                continue;
            };
            let scene = &scenes[i];
            builder.add_node(self.node_for(scene, &pending));

            let scene_labels = labels.get(scene.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let targets = self.targets(i, n, &pending, scene_labels.len().max(1));

            for (k, target) in targets.into_iter().enumerate() {
                let label = scene_labels.get(k).cloned();
                let opening = label.as_ref().map(|l| l.consequence.text.clone());
                builder.add_edge(pending.id, target, label);

                if target == NodeId::Ending || !queued.insert(target) {
                    continue;
                }
                let (depth, lead) = match target {
                    NodeId::Branch { .. } if pending.depth == 0 => (1, opening),
                    NodeId::Branch { .. } => (pending.depth + 1, pending.lead.clone()),
                    _ => (0, None),
                };
                queue.push_back(Pending {
                    id: target,
                    depth,
                    lead,
                });
            }
        }

        builder.set_convergence_points(convergence_points(scenes));
        let graph = builder.freeze(GraphLimits {
            scene_count: n,
            max_choices: self.max_choices,
            max_branch_depth: self.max_branch_depth,
        })?;
        debug!(
            "Story graph: {} nodes, {} edges, {} convergence points",
            graph.nodes().len(),
            graph.edges().len(),
            graph.convergence_points().len()
        );
        Ok(graph)
    }

    /// Where each of `count` choices at scene `i` leads.
    fn targets(&self, i: usize, n: usize, from: &Pending, count: usize) -> Vec<NodeId> {
        let next = i + 1;
        if next == n {
            return vec![NodeId::Ending; count];
        }
        if self.should_converge(i, n) {
            return vec![NodeId::Scene(next); count];
        }
        match from.id {
            NodeId::Branch { variant, .. } => {
                let target = if from.depth >= self.max_branch_depth {
                    NodeId::Scene(next)
                } else {
                    NodeId::Branch {
                        scene: next,
                        variant,
                    }
                };
                vec![target; count]
            }
            _ => (0..count)
                .map(|k| NodeId::Branch {
                    scene: next,
                    variant: k,
                })
                .collect(),
        }
    }

    fn node_for(&self, scene: &Scene, pending: &Pending) -> StoryNode {
        let number = scene.metadata.index + 1;
        let mut title = match &scene.metadata.section_title {
            Some(section) => format!("{section}, scene {number}"),
            None => format!("Scene {number}"),
        };
        if let NodeId::Branch { variant, .. } = pending.id {
            title.push_str(&format!(" (path {})", variant + 1));
        }
        let description = match &pending.lead {
            Some(lead) => format!("{lead} {}", scene.summary_text),
            None => scene.summary_text.clone(),
        };
        StoryNode {
            id: pending.id,
            title,
            description,
            branch_depth: pending.depth,
            is_ending: false,
        }
    }
}

/// Choices per scene id, in choice order, each paired with its consequence.
/// Choices without a consequence are left out.
fn group_choices<'a>(
    choices: &'a [Choice],
    consequences: &'a [Consequence],
) -> HashMap<&'a str, Vec<EdgeLabel>> {
    let by_choice: HashMap<&str, &Consequence> = consequences
        .iter()
        .map(|c| (c.choice_id.as_str(), c))
        .collect();

    let mut grouped: HashMap<&str, Vec<EdgeLabel>> = HashMap::new();
    for choice in choices {
        if let Some(consequence) = by_choice.get(choice.id.as_str()) {
            grouped
                .entry(choice.scene_id.as_str())
                .or_default()
                .push(EdgeLabel {
                    choice: choice.clone(),
                    consequence: (*consequence).clone(),
                });
        }
    }
    grouped
}

/// Chapter boundaries, periodic indices and the pre-ending scene, sorted by
/// scene index with the first entry kept on ties.
pub fn convergence_points(scenes: &[Scene]) -> Vec<ConvergencePoint> {
    let n = scenes.len();
    let mut points = Vec::new();

    for pair in scenes.windows(2) {
        if pair[1].metadata.section_index > pair[0].metadata.section_index {
            points.push(ConvergencePoint {
                after_scene_index: pair[0].metadata.index,
                kind: ConvergenceKind::ChapterBoundary,
                reason: format!(
                    "section {} ends after this scene",
                    pair[0].metadata.section_index
                ),
            });
        }
    }

    let interval = periodic_interval(n);
    for i in (0..n).step_by(interval) {
        points.push(ConvergencePoint {
            after_scene_index: i,
            kind: ConvergenceKind::Periodic,
            reason: format!("every {interval} scenes"),
        });
    }

    if n >= 3 {
        points.push(ConvergencePoint {
            after_scene_index: n - 3,
            kind: ConvergenceKind::PreEnding,
            reason: "all paths gather before the ending".to_string(),
        });
    }

    points.sort_by_key(|p| p.after_scene_index);
    points.dedup_by_key(|p| p.after_scene_index);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::consequence::ConsequenceMapper;
    use crate::narrative::detector::Confidence;
    use crate::narrative::patterns::Category;
    use crate::narrative::style::default_persona;
    use crate::narrative::synthesizer::{ChoiceType, SceneMetadata};

    fn scene(i: usize, section_index: usize) -> Scene {
        Scene {
            id: format!("scene_{i}"),
            decision_point_id: format!("dp_{i}_3"),
            chunk_id: format!("chunk_{i}"),
            summary_text: format!("Summary {i}."),
            metadata: SceneMetadata {
                index: i,
                chunk_index: i,
                section_index,
                section_title: None,
                category: Category::General,
                confidence: Confidence::Medium,
                decision_text: String::new(),
                generated: false,
            },
        }
    }

    fn story(n: usize, per_scene: usize) -> (Vec<Scene>, Vec<Choice>, Vec<Consequence>) {
        let scenes: Vec<Scene> = (0..n).map(|i| scene(i, i / 4)).collect();
        let mapper = ConsequenceMapper::new(default_persona());
        let mut choices = Vec::new();
        for s in &scenes {
            for k in 0..per_scene {
                choices.push(Choice {
                    id: format!("{}_choice_{k}", s.id),
                    scene_id: s.id.clone(),
                    text: format!("Option {k}."),
                    choice_type: ChoiceType::ALL[k],
                    weight: 1.0,
                });
            }
        }
        let consequences = choices.iter().map(|c| mapper.map(c)).collect();
        (scenes, choices, consequences)
    }

    fn engine(buffer: usize, depth: usize) -> PathConvergenceEngine {
        PathConvergenceEngine::new(
            &ConvergenceConfig {
                convergence_buffer: buffer,
                max_branch_depth: depth,
            },
            2,
        )
    }

    fn chunk(sentences: &[&str]) -> Chunk {
        let mut c = Chunk::empty();
        c.sentences = sentences.iter().map(|s| s.to_string()).collect();
        c.content = c.sentences.join(" ");
        c
    }

    #[test]
    fn test_should_converge_formula() {
        // interval = max(3, 10 / 5) = 3
        let hits: Vec<usize> = (0..10).filter(|&i| should_converge(i, 10, 2)).collect();
        assert_eq!(hits, vec![0, 3, 6, 8, 9]);
        // interval = max(3, 20 / 5) = 4
        let hits: Vec<usize> = (0..20).filter(|&i| should_converge(i, 20, 2)).collect();
        assert_eq!(hits, vec![0, 4, 8, 12, 16, 18, 19]);
        assert!(should_converge(0, 1, 2));
    }

    #[test]
    fn test_zero_scenes_links_start_to_ending() {
        let graph = engine(2, 3)
            .converge(&[], &[], &[], &[], "  The whole tale.  ")
            .unwrap();
        assert_eq!(graph.first_node(), NodeId::Ending);
        assert_eq!(graph.ending().unwrap().description, "  The whole tale.  ");
        assert_eq!(graph.nodes().len(), 2);
    }

    #[test]
    fn test_ending_is_last_three_sentences_verbatim() {
        let chunks = vec![chunk(&["A.", "B."]), chunk(&["C.", "D.", "E.", "F."])];
        assert_eq!(extract_ending(&chunks, "ignored"), "D. E. F.");
        assert_eq!(extract_ending(&[chunk(&["Only."])], "x"), "Only.");
    }

    #[test]
    fn test_divergent_scene_branches_then_remerges() {
        let (scenes, choices, consequences) = story(10, 2);
        let chunks = vec![chunk(&["The end came."])];
        let graph = engine(2, 3)
            .converge(&scenes, &choices, &consequences, &chunks, "")
            .unwrap();

        // scene 0 converges (periodic), scene 1 diverges.
        let from_zero: Vec<NodeId> = graph.outgoing(NodeId::Scene(0)).map(|e| e.to).collect();
        assert_eq!(from_zero, vec![NodeId::Scene(1); 2]);
        let from_one: Vec<NodeId> = graph.outgoing(NodeId::Scene(1)).map(|e| e.to).collect();
        assert_eq!(
            from_one,
            vec![
                NodeId::Branch { scene: 2, variant: 0 },
                NodeId::Branch { scene: 2, variant: 1 }
            ]
        );
        // Each branch keeps its own track, then merges after periodic index 3.
        let branch = NodeId::Branch { scene: 2, variant: 1 };
        assert!(
            graph
                .outgoing(branch)
                .all(|e| e.to == NodeId::Branch { scene: 3, variant: 1 })
        );
        let deeper = NodeId::Branch { scene: 3, variant: 1 };
        assert!(graph.outgoing(deeper).all(|e| e.to == NodeId::Scene(4)));
        assert_eq!(graph.node(&branch).unwrap().branch_depth, 1);
        assert_eq!(graph.node(&deeper).unwrap().branch_depth, 2);
        assert!(graph.node(&NodeId::Scene(2)).is_none());
        assert!(graph.node(&NodeId::Scene(3)).is_none());

        let from_last: Vec<NodeId> = graph.outgoing(NodeId::Scene(9)).map(|e| e.to).collect();
        assert_eq!(from_last, vec![NodeId::Ending; 2]);
        assert_eq!(graph.ending().unwrap().description, "The end came.");
    }

    #[test]
    fn test_branch_description_leads_with_consequence() {
        let (scenes, choices, consequences) = story(10, 2);
        let graph = engine(2, 3)
            .converge(&scenes, &choices, &consequences, &[], "")
            .unwrap();
        let opening = graph
            .outgoing(NodeId::Scene(1))
            .find(|e| e.to == NodeId::Branch { scene: 2, variant: 0 })
            .and_then(|e| e.label.as_ref())
            .unwrap();
        let node = graph.node(&NodeId::Branch { scene: 2, variant: 0 }).unwrap();
        assert!(node.description.starts_with(&opening.consequence.text));
        assert!(node.description.ends_with("Summary 2."));
        assert_eq!(node.title, "Scene 3 (path 1)");
    }

    #[test]
    fn test_branch_depth_is_capped() {
        // With a large story the periodic interval is wide; depth 1 forces
        // every branch to merge on the very next scene.
        let (scenes, choices, consequences) = story(40, 2);
        let graph = engine(2, 1)
            .converge(&scenes, &choices, &consequences, &[], "")
            .unwrap();
        assert!(graph.nodes().iter().all(|n| n.branch_depth <= 1));
        let dist = graph.distances_to_ending();
        assert_eq!(dist[&NodeId::Start], 41);
    }

    #[test]
    fn test_every_node_reaches_ending() {
        for n in [1, 2, 3, 5, 9, 17] {
            let (scenes, choices, consequences) = story(n, 2);
            let graph = engine(2, 3)
                .converge(&scenes, &choices, &consequences, &[], "")
                .unwrap();
            let dist = graph.distances_to_ending();
            for node in graph.nodes() {
                assert!(node.is_ending || dist[&node.id] > 0, "{n}: {}", node.id);
            }
            assert!(dist[&NodeId::Start] <= n + 1 + 3);
        }
    }

    #[test]
    fn test_scene_without_choices_still_moves_on() {
        let (scenes, _, _) = story(2, 0);
        let graph = engine(2, 3).converge(&scenes, &[], &[], &[], "").unwrap();
        assert_eq!(graph.outgoing(NodeId::Scene(0)).count(), 1);
        assert_eq!(graph.choice_count(), 0);
    }

    #[test]
    fn test_convergence_overlay_sorted_and_deduplicated() {
        let scenes: Vec<Scene> = (0..10).map(|i| scene(i, i / 4)).collect();
        let points = convergence_points(&scenes);
        let indices: Vec<usize> = points.iter().map(|p| p.after_scene_index).collect();
        assert_eq!(indices, vec![0, 3, 6, 7, 9]);
        // 3 and 7 are also periodic / pre-ending; the chapter boundary came first.
        let kinds: Vec<ConvergenceKind> = points.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ConvergenceKind::Periodic,
                ConvergenceKind::ChapterBoundary,
                ConvergenceKind::Periodic,
                ConvergenceKind::ChapterBoundary,
                ConvergenceKind::Periodic,
            ]
        );
        let short = convergence_points(&[scene(0, 0), scene(1, 0), scene(2, 0), scene(3, 0)]);
        assert_eq!(short[1].kind, ConvergenceKind::PreEnding);
    }
}
