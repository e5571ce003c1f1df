//! Dated events extracted from segmented documents

use crate::extractors::extract_dates;
use crate::segmenter::SegmentedDocument;
use chrono::NaiveDate;
use shared_types::{EventCategory, Severity, TimelineEvent};
use std::collections::HashSet;
use tracing::debug;

const EVENT_CHARS: usize = 200;
const DEDUP_PREFIX_CHARS: usize = 50;

/// Keyword groups checked in order; the first group with a hit wins
const CATEGORY_KEYWORDS: [(EventCategory, &[&str]); 5] = [
    (
        EventCategory::Appointment,
        &["appointment", "meeting", "visit", "consultation"],
    ),
    (EventCategory::Assessment, &["assessment", "evaluation", "review"]),
    (EventCategory::Incident, &["incident", "event", "occurred", "happened"]),
    (EventCategory::Decision, &["decision", "determination", "ruling"]),
    (EventCategory::Documentation, &["report", "document", "letter"]),
];

const HIGH_SIGNIFICANCE_KEYWORDS: &[&str] = &[
    "guardianship",
    "transfer",
    "appointment",
    "decision",
    "determination",
    "critical",
    "significant",
    "major",
    "important",
];

pub fn categorize_event(event: &str) -> EventCategory {
    let lower = event.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or(EventCategory::Other)
}

pub fn assess_significance(event: &str) -> Severity {
    let lower = event.to_lowercase();
    if HIGH_SIGNIFICANCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Severity::High
    } else if event.chars().count() > 100 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Every dated unit of a document as a timeline event, sorted by date
pub fn extract_timeline(document: &SegmentedDocument) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    for unit in &document.units {
        let event: String = unit.trimmed().chars().take(EVENT_CHARS).collect();
        for mention in extract_dates(&unit.text) {
            events.push(TimelineEvent {
                date: mention.date,
                category: categorize_event(&event),
                significance: assess_significance(&event),
                event: event.clone(),
                document_id: unit.document_id.clone(),
                unit_id: unit.id.clone(),
                page_number: unit.page_number,
            });
        }
    }

    let events = sort_and_dedup(events);
    debug!(document_id = %document.document_id, events = events.len(), "Timeline extracted");
    events
}

/// Timelines of several documents merged into one chronology
pub fn combined_timeline(documents: &[SegmentedDocument]) -> Vec<TimelineEvent> {
    sort_and_dedup(documents.iter().flat_map(extract_timeline).collect())
}

fn sort_and_dedup(mut events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    events.sort_by_key(|e| e.date);
    let mut seen: HashSet<(String, NaiveDate, String)> = HashSet::new();
    events.retain(|e| {
        let prefix: String = e.event.chars().take(DEDUP_PREFIX_CHARS).collect();
        seen.insert((e.document_id.clone(), e.date, prefix))
    });
    events
}
