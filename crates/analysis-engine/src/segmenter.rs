//! Text normalizer and segmenter
//!
//! Splits extracted document text into sentence and paragraph units. Every unit
//! is the exact slice of the input between two boundaries, so the units of a
//! document are contiguous and reproduce the input when concatenated.

use crate::config::SegmentationConfig;
use crate::error::SegmentationError;
use serde::{Deserialize, Serialize};
use shared_types::TextUnit;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Boundary suppression settings
#[derive(Debug, Clone, Default)]
pub struct SegmenterSettings {
    abbreviations: HashSet<String>,
}

impl SegmenterSettings {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        let abbreviations = config
            .abbreviations
            .iter()
            .map(|a| a.trim().trim_end_matches('.').to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        Self { abbreviations }
    }

    /// True when a period after `token` does not end a sentence
    pub fn is_abbreviation(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        if self.abbreviations.contains(&lower) {
            return true;
        }
        // Single-letter initials ("J. Smith")
        let mut chars = lower.chars();
        matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
    }
}

/// Page-boundary map: (char offset, page number) pairs in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMap {
    boundaries: Vec<(usize, u32)>,
}

impl PageMap {
    pub fn new(boundaries: Vec<(usize, u32)>) -> Self {
        Self { boundaries }
    }

    pub fn boundaries(&self) -> &[(usize, u32)] {
        &self.boundaries
    }

    pub fn page_count(&self) -> usize {
        self.boundaries.len().max(1)
    }

    fn validate(&self, document_id: &str, len: usize) -> Result<(), SegmentationError> {
        let inconsistent = |reason: String| SegmentationError::InconsistentPageMap {
            document_id: document_id.to_string(),
            reason,
        };

        let Some(&(first_offset, first_page)) = self.boundaries.first() else {
            return Ok(());
        };
        if first_offset != 0 {
            return Err(inconsistent(format!(
                "first boundary must be at offset 0, found {}",
                first_offset
            )));
        }
        if first_page == 0 {
            return Err(inconsistent("page numbers start at 1".to_string()));
        }

        for window in self.boundaries.windows(2) {
            let (prev_offset, prev_page) = window[0];
            let (offset, page) = window[1];
            if offset <= prev_offset {
                return Err(inconsistent(format!(
                    "offset {} does not follow offset {}",
                    offset, prev_offset
                )));
            }
            if page <= prev_page {
                return Err(inconsistent(format!(
                    "page {} at offset {} does not follow page {}",
                    page, offset, prev_page
                )));
            }
        }

        if let Some(&(offset, _)) = self.boundaries.iter().find(|(offset, _)| *offset > len) {
            return Err(SegmentationError::BoundaryOutOfRange {
                document_id: document_id.to_string(),
                offset,
                len,
            });
        }

        Ok(())
    }

    /// Page containing `offset`: the last boundary at or before it
    pub fn page_at(&self, offset: usize) -> u32 {
        let idx = self.boundaries.partition_point(|(start, _)| *start <= offset);
        if idx == 0 {
            1
        } else {
            self.boundaries[idx - 1].1
        }
    }
}

/// Extracted text of one document, as handed over by the extraction layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInput {
    pub document_id: String,
    /// Human-readable label used in contradiction records
    pub label: String,
    pub text: String,
    #[serde(default)]
    pub page_map: PageMap,
}

impl DocumentInput {
    pub fn new(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        let document_id = document_id.into();
        Self {
            label: document_id.clone(),
            document_id,
            text: text.into(),
            page_map: PageMap::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_page_map(mut self, page_map: PageMap) -> Self {
        self.page_map = page_map;
        self
    }

    /// Join per-page text with blank lines and record where each page starts
    pub fn from_pages<S: AsRef<str>>(document_id: impl Into<String>, pages: &[S]) -> Self {
        let mut text = String::new();
        let mut boundaries = Vec::with_capacity(pages.len());
        let mut offset = 0;

        for (idx, page) in pages.iter().enumerate() {
            if idx > 0 {
                text.push_str("\n\n");
                offset += 2;
            }
            boundaries.push((offset, idx as u32 + 1));
            text.push_str(page.as_ref());
            offset += page.as_ref().chars().count();
        }

        Self::new(document_id, text).with_page_map(PageMap::new(boundaries))
    }
}

/// Output of the segmenter for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedDocument {
    pub document_id: String,
    pub label: String,
    pub units: Vec<TextUnit>,
    pub char_len: usize,
    pub page_count: usize,
}

impl SegmentedDocument {
    pub fn unit(&self, unit_id: &str) -> Option<&TextUnit> {
        self.units.iter().find(|u| u.id == unit_id)
    }
}

const TERMINALS: [char; 4] = ['.', '!', '?', '\u{2026}'];
const CLOSERS: [char; 6] = ['"', '\'', ')', ']', '\u{201D}', '\u{2019}'];

/// Segment one document into text units
#[instrument(skip_all, fields(document_id = %input.document_id))]
pub fn segment(
    input: &DocumentInput,
    settings: &SegmenterSettings,
) -> Result<SegmentedDocument, SegmentationError> {
    if input.text.trim().is_empty() {
        return Err(SegmentationError::EmptyInput {
            document_id: input.document_id.clone(),
        });
    }

    let chars: Vec<char> = input.text.chars().collect();
    input.page_map.validate(&input.document_id, chars.len())?;

    let mut byte_offsets: Vec<usize> = input.text.char_indices().map(|(b, _)| b).collect();
    byte_offsets.push(input.text.len());

    let starts = unit_starts(&chars, settings);
    let mut units = Vec::with_capacity(starts.len());

    for (unit_index, &char_start) in starts.iter().enumerate() {
        let char_end = starts.get(unit_index + 1).copied().unwrap_or(chars.len());
        units.push(TextUnit {
            id: TextUnit::make_id(&input.document_id, unit_index),
            document_id: input.document_id.clone(),
            text: input.text[byte_offsets[char_start]..byte_offsets[char_end]].to_string(),
            page_number: input.page_map.page_at(char_start),
            char_start,
            char_end,
            unit_index,
        });
    }

    debug!(units = units.len(), chars = chars.len(), "Segmented document");

    Ok(SegmentedDocument {
        document_id: input.document_id.clone(),
        label: input.label.clone(),
        units,
        char_len: chars.len(),
        page_count: input.page_map.page_count(),
    })
}

/// Char offsets where units begin; always starts with 0
fn unit_starts(chars: &[char], settings: &SegmenterSettings) -> Vec<usize> {
    let n = chars.len();
    let mut starts = vec![0];
    let mut in_quote = false;
    let mut has_content = false;
    let mut i = 0;

    while i < n {
        let c = chars[i];

        if c.is_whitespace() {
            let run_end = whitespace_run_end(chars, i);
            let newlines = chars[i..run_end].iter().filter(|&&ch| ch == '\n').count();
            if newlines >= 2 {
                // Paragraph break
                in_quote = false;
                if has_content && run_end < n {
                    starts.push(run_end);
                    has_content = false;
                }
            }
            i = run_end;
            continue;
        }

        has_content = true;

        match c {
            '"' => in_quote = !in_quote,
            '\u{201C}' => in_quote = true,
            '\u{201D}' => in_quote = false,
            _ => {}
        }

        if !TERMINALS.contains(&c) {
            i += 1;
            continue;
        }

        let mut j = i;
        while j < n && TERMINALS.contains(&chars[j]) {
            j += 1;
        }
        while j < n && CLOSERS.contains(&chars[j]) {
            match chars[j] {
                '"' => in_quote = !in_quote,
                '\u{201D}' => in_quote = false,
                _ => {}
            }
            j += 1;
        }

        let at_break = j == n || chars[j].is_whitespace();
        let suppressed = in_quote || (c == '.' && settings.is_abbreviation(&token_before(chars, i)));

        if at_break && !suppressed {
            let run_end = whitespace_run_end(chars, j);
            if chars[j..run_end].iter().filter(|&&ch| ch == '\n').count() >= 2 {
                in_quote = false;
            }
            if run_end < n {
                starts.push(run_end);
                has_content = false;
            }
            i = run_end;
        } else {
            i = j;
        }
    }

    starts
}

fn whitespace_run_end(chars: &[char], from: usize) -> usize {
    let mut end = from;
    while end < chars.len() && chars[end].is_whitespace() {
        end += 1;
    }
    end
}

/// Word immediately before a period, including inner periods ("e.g")
fn token_before(chars: &[char], period: usize) -> String {
    let mut start = period;
    while start > 0 && (chars[start - 1].is_alphanumeric() || chars[start - 1] == '.') {
        start -= 1;
    }
    chars[start..period].iter().collect::<String>().trim_matches('.').to_string()
}
