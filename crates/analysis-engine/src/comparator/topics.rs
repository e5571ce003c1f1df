//! Topic grouping strategies
//!
//! Deciding which claims in two documents talk about the same thing is
//! heuristic, so grouping sits behind a trait. The default grouper combines a
//! configured topic lexicon with "Label: value" headings found in the text.

use crate::config::TopicConfig;
use crate::error::ConfigurationError;
use crate::patterns::compile_terms;
use lazy_static::lazy_static;
use regex::Regex;
use shared_types::TextUnit;
use std::collections::HashSet;

lazy_static! {
    /// "Risk assessment: moderate", "Living arrangements - supported"
    static ref HEADING_PATTERN: Regex =
        Regex::new(r"^\s*([A-Za-z][A-Za-z '&/]{2,48}?)\s*[:\u{2013}-]\s+\S").unwrap();
}

/// Assigns coarse topic keys to text units
pub trait TopicGrouper: Send + Sync {
    /// Normalised topic keys for a unit, without duplicates; empty when the unit
    /// carries no salient topic
    fn topics(&self, unit: &TextUnit) -> Vec<String>;

    /// Get the name of this grouper
    fn name(&self) -> &str;
}

/// Lowercase, collapse whitespace and singularise each word, so that
/// "Risk  Assessments" and "risk assessment" share a key
pub fn normalize_topic(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| singularize(&word.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn singularize(word: &str) -> String {
    let len = word.chars().count();
    if len > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if len > 3
        && word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
    {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

#[derive(Debug, Clone)]
struct LexiconTopic {
    key: String,
    regex: Regex,
}

/// Default grouper: topic lexicon plus heading labels
#[derive(Debug, Clone, Default)]
pub struct LexiconTopicGrouper {
    topics: Vec<LexiconTopic>,
    use_headings: bool,
}

impl LexiconTopicGrouper {
    pub fn compile(configs: &[TopicConfig]) -> Result<Self, ConfigurationError> {
        let mut topics = Vec::with_capacity(configs.len());
        for config in configs {
            let key = normalize_topic(&config.key);
            if key.is_empty() {
                return Err(ConfigurationError::invalid(
                    "comparator.topics.key",
                    "topic key must not be empty",
                ));
            }
            let regex = compile_terms(&format!("comparator.topics.{}", key), &config.terms)?;
            topics.push(LexiconTopic { key, regex });
        }
        Ok(Self {
            topics,
            use_headings: true,
        })
    }

    /// Group on lexicon terms only
    pub fn without_headings(mut self) -> Self {
        self.use_headings = false;
        self
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn heading(&self, text: &str) -> Option<String> {
        if !self.use_headings {
            return None;
        }
        let caps = HEADING_PATTERN.captures(text)?;
        let key = normalize_topic(caps.get(1)?.as_str());
        (!key.is_empty()).then_some(key)
    }
}

impl TopicGrouper for LexiconTopicGrouper {
    fn topics(&self, unit: &TextUnit) -> Vec<String> {
        let mut keys: Vec<String> = self
            .topics
            .iter()
            .filter(|topic| topic.regex.is_match(&unit.text))
            .map(|topic| topic.key.clone())
            .collect();

        if let Some(heading) = self.heading(&unit.text) {
            keys.push(heading);
        }

        let mut seen = HashSet::new();
        keys.retain(|k| seen.insert(k.clone()));
        keys
    }

    fn name(&self) -> &str {
        "lexicon"
    }
}

/// Union of the topics assigned by several groupers
#[derive(Default)]
pub struct CompositeTopicGrouper {
    groupers: Vec<Box<dyn TopicGrouper>>,
}

impl CompositeTopicGrouper {
    pub fn new() -> Self {
        Self {
            groupers: Vec::new(),
        }
    }

    pub fn add_grouper(mut self, grouper: Box<dyn TopicGrouper>) -> Self {
        self.groupers.push(grouper);
        self
    }
}

impl TopicGrouper for CompositeTopicGrouper {
    fn topics(&self, unit: &TextUnit) -> Vec<String> {
        let mut seen = HashSet::new();
        self.groupers
            .iter()
            .flat_map(|g| g.topics(unit))
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }

    fn name(&self) -> &str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit(text: &str) -> TextUnit {
        TextUnit {
            id: "d:u0".into(),
            document_id: "d".into(),
            text: text.into(),
            page_number: 1,
            char_start: 0,
            char_end: text.chars().count(),
            unit_index: 0,
        }
    }

    fn grouper() -> LexiconTopicGrouper {
        LexiconTopicGrouper::compile(&[
            TopicConfig {
                key: "Living Arrangements".into(),
                terms: vec!["accommodation".into(), "living arrangement".into()],
            },
            TopicConfig {
                key: "behaviour".into(),
                terms: vec!["behaviour".into(), "behavior".into()],
            },
        ])
        .unwrap()
    }

    struct FixedGrouper(&'static str);

    impl TopicGrouper for FixedGrouper {
        fn topics(&self, _unit: &TextUnit) -> Vec<String> {
            vec![self.0.to_string()]
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("  Risk   Assessments "), "risk assessment");
        assert_eq!(normalize_topic("Family Activities"), "family activity");
        assert_eq!(normalize_topic("Status"), "status");
        assert_eq!(normalize_topic("Address"), "address");
    }

    #[test]
    fn test_lexicon_and_heading_topics() {
        let topics = grouper().topics(&unit("Risk assessment: his behaviour in accommodation is settled."));
        assert_eq!(topics, vec!["living arrangement", "behaviour", "risk assessment"]);
    }

    #[test]
    fn test_near_duplicate_headings_share_a_key() {
        let g = grouper();
        assert_eq!(g.topics(&unit("Risk Assessments: high")), g.topics(&unit("risk assessment - moderate")));
    }

    #[test]
    fn test_headings_can_be_disabled() {
        let topics = grouper().without_headings().topics(&unit("Risk assessment: high"));
        assert!(topics.is_empty());
    }

    #[test]
    fn test_unit_without_topic() {
        assert!(grouper().topics(&unit("The weather was mild today.")).is_empty());
    }

    #[test]
    fn test_composite_unions_topics() {
        let composite = CompositeTopicGrouper::new()
            .add_grouper(Box::new(grouper()))
            .add_grouper(Box::new(FixedGrouper("behaviour")))
            .add_grouper(Box::new(FixedGrouper("client")));
        assert_eq!(
            composite.topics(&unit("Behaviour was calm.")),
            vec!["behaviour", "client"]
        );
        assert_eq!(composite.name(), "composite");
    }
}
