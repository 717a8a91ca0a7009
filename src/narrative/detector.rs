use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::chunker::Chunk;
use super::patterns::{CATEGORY_RULES, CHOICE_CUES, Category, GENERAL_WEIGHT};
use crate::config::DetectionConfig;
use crate::error::PipelineWarning;

/// Minimum sentence distance between two kept points, counted across chunk
/// boundaries.
pub const MIN_SENTENCE_SPACING: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::None => "none",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    fn value(&self) -> f64 {
        match self {
            Confidence::None => 0.0,
            Confidence::Low => 1.0,
            Confidence::Medium => 2.0,
            Confidence::High => 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPoint {
    pub id: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    pub sentence_index: usize,
    pub category: Category,
    pub category_weight: f64,
    pub confidence: Confidence,
    pub matched_pattern: String,
    /// Relative position in the document, in `[0, 1]`.
    pub position: f64,
}

impl DecisionPoint {
    /// `confidence × categoryWeight`.
    pub fn score(&self) -> f64 {
        self.confidence.value() * self.category_weight
    }

    fn document_order(&self, other: &Self) -> Ordering {
        (self.chunk_index, self.sentence_index).cmp(&(other.chunk_index, other.sentence_index))
    }

    /// Higher score first, earlier in the document on ties.
    fn rank_order(&self, other: &Self) -> Ordering {
        other
            .score()
            .total_cmp(&self.score())
            .then_with(|| self.document_order(other))
    }
}

/// Points plus whatever the detector had to warn about.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub points: Vec<DecisionPoint>,
    pub warnings: Vec<PipelineWarning>,
}

struct Rule {
    source: &'static str,
    regex: Regex,
}

impl Rule {
    fn compile(source: &'static str) -> Self {
        Self {
            source,
            regex: Regex::new(&format!("(?i){source}")).unwrap(),
        }
    }
}

struct CategoryMatcher {
    category: Category,
    weight: f64,
    rules: Vec<Rule>,
}

impl CategoryMatcher {
    fn first_match(&self, text: &str) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|r| r.regex.is_match(text))
            .map(|r| r.source)
    }
}

/// Scores sentences against the category tables and keeps a bounded,
/// well-spaced set of decision points.
pub struct DecisionPointDetector {
    config: DetectionConfig,
    categories: Vec<CategoryMatcher>,
    cues: Vec<Rule>,
}

impl DecisionPointDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        let categories = CATEGORY_RULES
            .iter()
            .map(|rules| CategoryMatcher {
                category: rules.category,
                weight: rules.weight,
                rules: rules.patterns.iter().map(|p| Rule::compile(p)).collect(),
            })
            .collect();
        let cues = CHOICE_CUES.iter().map(|p| Rule::compile(p)).collect();

        Self {
            config: config.clone(),
            categories,
            cues,
        }
    }

    pub fn detect(&self, chunks: &[Chunk]) -> Vec<DecisionPoint> {
        self.detect_report(chunks).points
    }

    /// Like [`detect`](Self::detect) but also returns degenerate-input warnings.
    pub fn detect_report(&self, chunks: &[Chunk]) -> Detection {
        let mut detection = Detection::default();

        let with_sentences = chunks.iter().filter(|c| !c.sentences.is_empty()).count();
        if with_sentences == 0 {
            warn!("no sentences to scan for decision points");
            detection.warnings.push(PipelineWarning::NoSentences);
        }

        for chunk in chunks {
            if chunk.sentences.is_empty() {
                if !chunk.content.trim().is_empty() {
                    warn!("skipping chunk {} with content but no sentences", chunk.id);
                    detection.warnings.push(PipelineWarning::SkippedChunk {
                        chunk_id: chunk.id.clone(),
                        reason: "content without sentences".to_string(),
                    });
                }
                continue;
            }
            let candidates = self.scan_chunk(chunk, chunks.len());
            let mut kept = dedup_by_spacing(candidates, |p| p.sentence_index);
            self.cap_per_chunk(&mut kept);
            detection.points.extend(kept);
        }

        detection.points.sort_by(|a, b| a.document_order(b));
        let starts = fresh_sentence_starts(chunks);
        detection.points = dedup_by_spacing(std::mem::take(&mut detection.points), |p| {
            global_sentence(&starts, chunks, p)
        });

        if detection.points.len() > self.config.max_decision_points {
            debug!(
                "trimming {} decision points to {}",
                detection.points.len(),
                self.config.max_decision_points
            );
            detection.points.sort_by(|a, b| a.rank_order(b));
            detection.points.truncate(self.config.max_decision_points);
            detection.points.sort_by(|a, b| a.document_order(b));
        }

        if detection.points.len() < self.config.min_decision_points {
            warn!(
                "only {} decision points found (minimum {})",
                detection.points.len(),
                self.config.min_decision_points
            );
            detection.warnings.push(PipelineWarning::TooFewDecisionPoints {
                found: detection.points.len(),
                min: self.config.min_decision_points,
            });
        }

        debug!("detected {} decision points", detection.points.len());
        detection
    }

    /// Every candidate sentence of one chunk, in sentence order.
    fn scan_chunk(&self, chunk: &Chunk, total_chunks: usize) -> Vec<DecisionPoint> {
        let sentences = &chunk.sentences;
        let last = sentences.len() - 1;
        let mut points = Vec::new();

        for (i, sentence) in sentences.iter().enumerate().skip(chunk.overlap_count) {
            if !self.has_signal(sentence) {
                continue;
            }

            let lo = i.saturating_sub(self.config.context_window);
            let hi = (i + self.config.context_window).min(last);
            let window = sentences[lo..=hi].join(" ");

            let category_hit = self
                .categories
                .iter()
                .find_map(|c| c.first_match(&window).map(|p| (c, p)));
            let cue_hit = self.first_cue(&window);

            let confidence = match (category_hit.is_some(), cue_hit.is_some()) {
                (true, true) => Confidence::High,
                (true, false) => Confidence::Medium,
                (false, true) => Confidence::Low,
                (false, false) => Confidence::None,
            };
            if confidence == Confidence::None || confidence < self.config.min_confidence {
                continue;
            }

            let (category, category_weight, matched_pattern) = match (category_hit, cue_hit) {
                (Some((c, pattern)), _) => (c.category, c.weight, pattern),
                (None, Some(pattern)) => (Category::General, GENERAL_WEIGHT, pattern),
                (None, None) => continue,
            };

            let position = (chunk.index as f64 + i as f64 / sentences.len() as f64)
                / total_chunks.max(1) as f64;

            points.push(DecisionPoint {
                id: format!("dp_{}_{}", chunk.index, i),
                chunk_id: chunk.id.clone(),
                chunk_index: chunk.index,
                sentence_index: i,
                category,
                category_weight,
                confidence,
                matched_pattern: matched_pattern.to_string(),
                position: position.clamp(0.0, 1.0),
            });
        }

        points
    }

    /// A sentence is a candidate only when its own text carries a signal.
    fn has_signal(&self, sentence: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.first_match(sentence).is_some())
            || self.first_cue(sentence).is_some()
    }

    fn first_cue(&self, text: &str) -> Option<&'static str> {
        self.cues
            .iter()
            .find(|r| r.regex.is_match(text))
            .map(|r| r.source)
    }

    fn cap_per_chunk(&self, points: &mut Vec<DecisionPoint>) {
        if points.len() <= self.config.max_points_per_chunk {
            return;
        }
        points.sort_by(|a, b| a.rank_order(b));
        points.truncate(self.config.max_points_per_chunk);
        points.sort_by(|a, b| a.document_order(b));
    }
}

/// Keeps at most one point per neighbourhood of [`MIN_SENTENCE_SPACING`]
/// sentences. A close follower replaces its predecessor only with strictly
/// higher confidence.
fn dedup_by_spacing(
    mut points: Vec<DecisionPoint>,
    position: impl Fn(&DecisionPoint) -> usize,
) -> Vec<DecisionPoint> {
    points.sort_by_key(|p| position(p));
    let mut kept: Vec<DecisionPoint> = Vec::with_capacity(points.len());

    for point in points {
        match kept.last_mut() {
            Some(prev) if position(&point) - position(prev) < MIN_SENTENCE_SPACING => {
                if point.confidence > prev.confidence {
                    *prev = point;
                }
            }
            _ => kept.push(point),
        }
    }

    kept
}

/// Document-wide index of each chunk's first fresh sentence, by chunk index.
fn fresh_sentence_starts(chunks: &[Chunk]) -> HashMap<usize, usize> {
    let mut next = 0;
    chunks
        .iter()
        .map(|chunk| {
            let start = next;
            next += chunk.fresh_sentences().len();
            (chunk.index, start)
        })
        .collect()
}

/// Position of a point's sentence in the whole document. Points never sit
/// on overlap sentences.
fn global_sentence(
    starts: &HashMap<usize, usize>,
    chunks: &[Chunk],
    point: &DecisionPoint,
) -> usize {
    let overlap = chunks
        .iter()
        .find(|c| c.index == point.chunk_index)
        .map_or(0, |c| c.overlap_count);
    let start = starts.get(&point.chunk_index).copied().unwrap_or(0);
    start + point.sentence_index.saturating_sub(overlap)
}
