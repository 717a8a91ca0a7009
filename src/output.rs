//! Serializable story structure handed to readers and UIs.

use std::collections::BTreeMap;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Serialize;

use crate::error::PipelineWarning;
use crate::narrative::graph::{ConvergencePoint, NodeId, StoryGraph};
use crate::pipeline::StoryRun;

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryOutput {
    pub start_scene: String,
    /// Every scene and branch variant, plus `ENDING`, keyed by id.
    pub scenes: BTreeMap<String, OutputScene>,
    pub metadata: StoryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputScene {
    pub title: String,
    pub description: String,
    pub choices: Vec<OutputChoice>,
    pub is_ending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputChoice {
    pub text: String,
    pub next_scene: String,
    #[serde(rename = "type")]
    pub choice_type: String,
    pub consequence: String,
    pub emotional_tone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub target_age: String,
    pub persona: String,
    /// Scenes and branch variants, not counting `START` or `ENDING`.
    pub total_scenes: usize,
    pub total_choices: usize,
    pub convergence_points: Vec<ConvergencePoint>,
    pub max_branch_depth: usize,
    pub content_hash: String,
    pub warnings: Vec<PipelineWarning>,
    /// RFC 3339 timestamp.
    pub generated_at: String,
}

impl StoryOutput {
    pub fn from_run(run: &StoryRun) -> Self {
        let graph = &run.graph;
        let scenes = graph
            .nodes()
            .iter()
            .filter(|n| n.id != NodeId::Start)
            .map(|node| {
                let scene = OutputScene {
                    title: node.title.clone(),
                    description: node.description.clone(),
                    choices: choices_from(graph, node.id),
                    is_ending: node.is_ending,
                };
                (node.id.key(), scene)
            })
            .collect::<BTreeMap<_, _>>();

        Self {
            start_scene: graph.first_node().key(),
            metadata: StoryMetadata {
                title: run.input.title.clone(),
                author: run.input.author.clone(),
                target_age: run.age.to_string(),
                persona: run.persona.key.to_string(),
                total_scenes: scenes.values().filter(|s| !s.is_ending).count(),
                total_choices: graph.choice_count(),
                convergence_points: graph.convergence_points().to_vec(),
                max_branch_depth: graph.max_branch_depth(),
                content_hash: run.content_hash.clone(),
                warnings: run.warnings.clone(),
                generated_at: Utc::now().to_rfc3339(),
            },
            scenes,
        }
    }

    /// JSON Schema of the output document.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(StoryOutput)).unwrap_or_default()
    }
}

fn choices_from(graph: &StoryGraph, id: NodeId) -> Vec<OutputChoice> {
    graph
        .outgoing(id)
        .filter_map(|edge| {
            let label = edge.label.as_ref()?;
            Some(OutputChoice {
                text: label.choice.text.clone(),
                next_scene: edge.to.key(),
                choice_type: label.choice.choice_type.as_str().to_string(),
                consequence: label.consequence.text.clone(),
                emotional_tone: label.consequence.emotional_tone.as_str().to_string(),
            })
        })
        .collect()
}
