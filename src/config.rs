/// Configuration module for storyfork.
///
/// Handles loading, validating, and providing default configuration values
/// for every pipeline stage.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::narrative::detector::Confidence;

// ── Default value functions ──────────────────────────────────────────

fn default_max_chunk_size() -> usize {
    1500
}

fn default_overlap_size() -> usize {
    200
}

fn default_context_window() -> usize {
    1
}

fn default_min_confidence() -> Confidence {
    Confidence::Low
}

fn default_max_points_per_chunk() -> usize {
    3
}

fn default_min_decision_points() -> usize {
    3
}

fn default_max_decision_points() -> usize {
    12
}

fn default_max_choices_per_point() -> usize {
    2
}

fn default_convergence_buffer() -> usize {
    2
}

fn default_max_branch_depth() -> usize {
    3
}

fn default_api_key_env() -> String {
    "STORYFORK_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_retries() -> u32 {
    1
}

fn default_target_age() -> String {
    "8-10".to_string()
}

fn default_persona() -> String {
    "storyteller".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Age band used when the input does not name one.
    #[serde(default = "default_target_age")]
    pub default_target_age: String,

    /// Persona used when the input does not name one.
    #[serde(default = "default_persona")]
    pub default_persona: String,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub convergence: ConvergenceConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Character budget per chunk.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Character cap on the sentences carried into the next chunk.
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Neighbouring sentences on each side tested together with a candidate.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: Confidence,

    #[serde(default = "default_max_points_per_chunk")]
    pub max_points_per_chunk: usize,

    #[serde(default = "default_min_decision_points")]
    pub min_decision_points: usize,

    #[serde(default = "default_max_decision_points")]
    pub max_decision_points: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SynthesisConfig {
    #[serde(default = "default_max_choices_per_point")]
    pub max_choices_per_point: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConvergenceConfig {
    /// Scenes before the end that always converge.
    #[serde(default = "default_convergence_buffer")]
    pub convergence_buffer: usize,

    #[serde(default = "default_max_branch_depth")]
    pub max_branch_depth: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Text-generation service URL. Templates only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding the bearer token for `endpoint`.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts after the first failure before falling back.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            default_target_age: default_target_age(),
            default_persona: default_persona(),
            chunking: ChunkingConfig::default(),
            detection: DetectionConfig::default(),
            synthesis: SynthesisConfig::default(),
            convergence: ConvergenceConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            min_confidence: default_min_confidence(),
            max_points_per_chunk: default_max_points_per_chunk(),
            min_decision_points: default_min_decision_points(),
            max_decision_points: default_max_decision_points(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_choices_per_point: default_max_choices_per_point(),
        }
    }
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            convergence_buffer: default_convergence_buffer(),
            max_branch_depth: default_max_branch_depth(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON or TOML file (chosen by extension).
    ///
    /// If the file does not exist, returns the default config. Unparseable
    /// content is reported and replaced by defaults as well.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = Path::new(config_path);

        if !path.exists() {
            info!("{config_path} not found, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {config_path}"))?;

        let parsed = if is_toml(path) {
            toml::from_str::<Config>(&data).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Config>(&data).map_err(|e| e.to_string())
        };

        match parsed {
            Ok(cfg) => {
                info!("Loaded configuration from {config_path}");
                Ok(cfg)
            }
            Err(e) => {
                warn!("Invalid config in {config_path}: {e}");
                warn!("Using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// Save configuration to a file, as TOML when the extension says so and
    /// pretty JSON otherwise.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = if is_toml(Path::new(path)) {
            toml::to_string_pretty(self).context("failed to marshal config")?
        } else {
            serde_json::to_string_pretty(self).context("failed to marshal config")?
        };
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("chunking.max_chunk_size", self.chunking.max_chunk_size),
            (
                "detection.max_points_per_chunk",
                self.detection.max_points_per_chunk,
            ),
            (
                "detection.max_decision_points",
                self.detection.max_decision_points,
            ),
            (
                "convergence.max_branch_depth",
                self.convergence.max_branch_depth,
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::NotPositive { field });
            }
        }
        if self.generation.timeout_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "generation.timeout_ms",
            });
        }

        if self.chunking.overlap_size >= self.chunking.max_chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunking.overlap_size,
                max: self.chunking.max_chunk_size,
            });
        }

        if self.detection.max_decision_points < self.detection.min_decision_points {
            return Err(ConfigError::DecisionBounds {
                min: self.detection.min_decision_points,
                max: self.detection.max_decision_points,
            });
        }

        if !(2..=4).contains(&self.synthesis.max_choices_per_point) {
            return Err(ConfigError::ChoiceBounds(
                self.synthesis.max_choices_per_point,
            ));
        }

        if let Some(endpoint) = &self.generation.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Endpoint(endpoint.clone()));
            }
        }

        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

// ── Tests ────────────────────────────────────────────────────────────
