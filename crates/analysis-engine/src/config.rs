//! Rule and taxonomy configuration
//!
//! Every vocabulary the engine matches against is data, not code. A rule file
//! is TOML with one section per component:
//!
//! ```toml
//! version = "2026.1"
//!
//! [segmentation]
//! abbreviations = ["dr", "mr", "ndis"]
//!
//! [detector]
//! bias_detection_threshold = 0.7
//! evidence_markers = ['\bfor\s+example\b']
//!
//! [detector.normalization]
//! unsupported-claim = 12.0
//!
//! [[detector.rules]]
//! id = "unsupported-claim.always"
//! category = "unsupported-claim"
//! pattern = '\balways\s+\w+'
//! weight = 3.0
//! severity = "high"
//! suppress_when_evidenced = true
//! ```
//!
//! The file is parsed once, every pattern is compiled once, and the result is an
//! immutable [`AnalysisConfig`] that is shared read-only between requests.

use crate::comparator::ComparatorSettings;
use crate::coverage::ContextChecklist;
use crate::detector::RuleSet;
use crate::error::ConfigurationError;
use crate::goals::GoalTaxonomy;
use crate::segmenter::SegmenterSettings;
use crate::similarity::SimilaritySettings;
use serde::{Deserialize, Serialize};
use shared_types::{Category, GoalId, GuardianshipOption, Polarity, Severity};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Built-in rule set shipped with the engine
pub const BUILTIN_RULES: &str = include_str!("../config/default_rules.toml");

/// Environment variable naming an alternative rule file
pub const RULES_PATH_ENV: &str = "ANALYST_RULES_PATH";
pub const BIAS_THRESHOLD_ENV: &str = "ANALYST_BIAS_DETECTION_THRESHOLD";
pub const TEMPLATE_THRESHOLD_ENV: &str = "ANALYST_TEMPLATE_SIMILARITY_THRESHOLD";

/// Raw rule file as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Version tag of the rule file, echoed into analysis output
    pub version: String,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    pub comparator: ComparatorConfig,
    pub goals: GoalsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SegmentationConfig {
    /// Tokens (lowercase, without the trailing period) that never end a sentence
    #[serde(default)]
    pub abbreviations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Category is flagged when its score reaches this fraction of 10
    #[serde(default = "default_bias_threshold")]
    pub bias_detection_threshold: f64,
    /// Context radius (chars) for rules that do not set their own
    #[serde(default = "default_context_window")]
    pub default_context_window: usize,
    /// Patterns whose presence in a match's context counts as supporting evidence
    #[serde(default)]
    pub evidence_markers: Vec<String>,
    /// Weight sum that maps to a score of 10, keyed by category slug
    pub normalization: BTreeMap<String, f64>,
    pub rules: Vec<PatternRuleConfig>,
    #[serde(default)]
    pub context_elements: Vec<ContextElementConfig>,
}

fn default_bias_threshold() -> f64 {
    0.7
}

fn default_context_window() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRuleConfig {
    pub id: String,
    pub category: Category,
    pub pattern: String,
    pub weight: f64,
    pub severity: Severity,
    #[serde(default)]
    pub context_window: Option<usize>,
    #[serde(default)]
    pub explanation: String,
    /// Drop the match when an evidence marker appears in its context
    #[serde(default)]
    pub suppress_when_evidenced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextElementConfig {
    pub name: String,
    pub patterns: Vec<String>,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Words per shingle
    #[serde(default = "default_shingle_size")]
    pub shingle_size: usize,
    /// Units with fewer tokens never form a retained pair
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    /// Pairs scoring at or above this are template-reuse matches
    #[serde(default = "default_template_threshold")]
    pub template_similarity_threshold: f64,
    /// Share of matched units (percent) above which a document counts as reused
    #[serde(default = "default_reuse_flag_percentage")]
    pub reuse_flag_percentage: f64,
    #[serde(default = "default_high_reuse_percentage")]
    pub high_reuse_percentage: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            shingle_size: default_shingle_size(),
            min_tokens: default_min_tokens(),
            template_similarity_threshold: default_template_threshold(),
            reuse_flag_percentage: default_reuse_flag_percentage(),
            high_reuse_percentage: default_high_reuse_percentage(),
        }
    }
}

fn default_shingle_size() -> usize {
    3
}

fn default_min_tokens() -> usize {
    5
}

fn default_template_threshold() -> f64 {
    0.75
}

fn default_reuse_flag_percentage() -> f64 {
    30.0
}

fn default_high_reuse_percentage() -> f64 {
    80.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparatorConfig {
    /// Content-word Jaccard above which a negation mismatch is a contradiction
    #[serde(default = "default_negation_overlap")]
    pub negation_overlap_threshold: f64,
    pub negators: Vec<String>,
    pub topics: Vec<TopicConfig>,
    #[serde(default)]
    pub descriptors: Vec<DescriptorConfig>,
    pub severity_scale: Vec<SeverityLevelConfig>,
}

fn default_negation_overlap() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub key: String,
    pub terms: Vec<String>,
}

/// A descriptor and the forms that assert its opposite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorConfig {
    pub positive: String,
    pub negative: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityLevelConfig {
    pub level: u8,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalsConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// How many supporting units are checked against contradictions
    #[serde(default = "default_top_evidence")]
    pub top_evidence: usize,
    pub taxonomy: Vec<GoalConfig>,
}

fn default_epsilon() -> f64 {
    1e-9
}

fn default_top_evidence() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalConfig {
    pub id: GoalId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub vocabulary: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<GoalPatternConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalPatternConfig {
    pub option: GuardianshipOption,
    pub polarity: Polarity,
    pub theme: String,
    pub pattern: String,
    #[serde(default = "default_goal_weight")]
    pub weight: f64,
}

fn default_goal_weight() -> f64 {
    1.0
}

/// Compiled, validated configuration passed explicitly into every component
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub version: String,
    pub segmentation: SegmenterSettings,
    pub detector: RuleSet,
    pub coverage: ContextChecklist,
    pub similarity: SimilaritySettings,
    pub comparator: ComparatorSettings,
    pub goals: GoalTaxonomy,
}

impl AnalysisConfig {
    /// Compile the rule set shipped with the engine
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    /// Load and compile a rule file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loading rule configuration");
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigurationError> {
        let raw: RuleConfig = toml::from_str(s)?;
        Self::compile(raw)
    }

    /// Load configuration honouring environment overrides
    ///
    /// Expected variables (all optional):
    /// - ANALYST_RULES_PATH: rule file to use instead of the built-in set
    /// - ANALYST_BIAS_DETECTION_THRESHOLD: overrides `detector.bias_detection_threshold`
    /// - ANALYST_TEMPLATE_SIMILARITY_THRESHOLD: overrides `similarity.template_similarity_threshold`
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let content = match std::env::var(RULES_PATH_ENV) {
            Ok(path) => fs::read_to_string(&path).map_err(|source| ConfigurationError::Io {
                path: path.into(),
                source,
            })?,
            Err(_) => BUILTIN_RULES.to_string(),
        };
        let mut raw: RuleConfig = toml::from_str(&content)?;

        if let Some(threshold) = env_f64(BIAS_THRESHOLD_ENV)? {
            raw.detector.bias_detection_threshold = threshold;
        }
        if let Some(threshold) = env_f64(TEMPLATE_THRESHOLD_ENV)? {
            raw.similarity.template_similarity_threshold = threshold;
        }

        Self::compile(raw)
    }

    pub fn compile(raw: RuleConfig) -> Result<Self, ConfigurationError> {
        if raw.version.trim().is_empty() {
            return Err(ConfigurationError::invalid("version", "must not be empty"));
        }

        let config = Self {
            segmentation: SegmenterSettings::from_config(&raw.segmentation),
            detector: RuleSet::compile(&raw.detector)?,
            coverage: ContextChecklist::compile(&raw.detector.context_elements)?,
            similarity: SimilaritySettings::from_config(&raw.similarity)?,
            comparator: ComparatorSettings::compile(&raw.comparator)?,
            goals: GoalTaxonomy::compile(&raw.goals)?,
            version: raw.version,
        };

        debug!(
            version = %config.version,
            rules = config.detector.rules().len(),
            topics = config.comparator.topic_count(),
            "Compiled analysis configuration"
        );
        Ok(config)
    }
}

fn env_f64(name: &str) -> Result<Option<f64>, ConfigurationError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ConfigurationError::invalid(name, e.to_string())),
        Err(_) => Ok(None),
    }
}

/// Validate a fraction in [0, 1]
pub(crate) fn check_unit_interval(field: &str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(
            field,
            format!("expected a value between 0 and 1, got {}", value),
        ))
    }
}

/// Validate a non-negative finite weight
pub(crate) fn check_weight(field: &str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(
            field,
            format!("expected a non-negative weight, got {}", value),
        ))
    }
}
