/// Smallest addressable span of document text, in reading order.
///
/// `text` is the exact slice `[char_start, char_end)` of the source text, so
/// concatenating every unit of a document reproduces the input.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextUnit {
    pub id: String, // e.g. "report-a:u3"
    pub document_id: String,
    pub text: String,
    pub page_number: u32,
    pub char_start: usize, // Unicode scalar offset into the document text
    pub char_end: usize,
    pub unit_index: usize,
}

impl TextUnit {
    pub fn make_id(document_id: &str, unit_index: usize) -> String {
        format!("{}:u{}", document_id, unit_index)
    }

    /// Unit text without the surrounding whitespace it owns
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Detection categories a pattern rule can belong to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    ExplicitBias,
    ImplicitBias,
    CulturalInsensitivity,
    Stigma,
    DeficitLanguage,
    FamilyUndermining,
    UnsupportedClaim,
    OmissionMarker,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::ExplicitBias,
        Category::ImplicitBias,
        Category::CulturalInsensitivity,
        Category::Stigma,
        Category::DeficitLanguage,
        Category::FamilyUndermining,
        Category::UnsupportedClaim,
        Category::OmissionMarker,
    ];

    /// Wire name, as used in rule files and JSON output
    pub fn slug(&self) -> &'static str {
        match self {
            Category::ExplicitBias => "explicit-bias",
            Category::ImplicitBias => "implicit-bias",
            Category::CulturalInsensitivity => "cultural-insensitivity",
            Category::Stigma => "stigma",
            Category::DeficitLanguage => "deficit-language",
            Category::FamilyUndermining => "family-undermining",
            Category::UnsupportedClaim => "unsupported-claim",
            Category::OmissionMarker => "omission-marker",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Category::ALL.iter().copied().find(|c| c.slug() == slug)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::ExplicitBias => "Explicit Bias",
            Category::ImplicitBias => "Implicit Bias",
            Category::CulturalInsensitivity => "Cultural Insensitivity",
            Category::Stigma => "Stigmatizing Language",
            Category::DeficitLanguage => "Deficit Language",
            Category::FamilyUndermining => "Family Undermining",
            Category::UnsupportedClaim => "Unsupported Claim",
            Category::OmissionMarker => "Omission Marker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MatchedSpan {
    pub text: String,
    pub start: usize, // Char offset within the unit
    pub end: usize,
    pub doc_start: usize, // Char offset within the document
    pub doc_end: usize,
}

/// One match of a pattern rule against a text unit
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Finding {
    pub category: Category,
    pub rule_id: String,
    pub unit_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub matched_span: MatchedSpan,
    pub weight: f64,
    pub severity: Severity,
    pub context_snippet: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    pub score: f64, // 0-10
    pub finding_count: usize,
    pub total_weight: f64,
    pub confidence: f64, // 0-1
    pub flagged: bool,
}

/// Missing context element in a practitioner report
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContextGap {
    pub element: String,
    pub description: String,
    pub impact: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimilarityPair {
    pub unit_a: String,
    pub unit_b: String,
    pub score: f64, // Jaccard, 0-1
    pub source_doc_a: String,
    pub source_doc_b: String,
    pub page_a: u32,
    pub page_b: u32,
}

/// Run of consecutive units in one document mirrored by consecutive units in another
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchingBlock {
    pub unit_ids_a: Vec<String>,
    pub unit_ids_b: Vec<String>,
    pub page_a: u32,
    pub page_b: u32,
    pub text: String, // Excerpt from document A, at most 200 chars
    pub length: usize, // Chars covered in document A
    pub min_score: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TemplateReuseReport {
    pub source_doc: String,
    pub target_doc: String,
    pub percentage_similarity: f64,
    pub eligible_units: usize,
    pub matched_units: usize,
    pub is_template_reused: bool,
    pub severity: Severity,
    pub matching_blocks: Vec<MatchingBlock>,
    pub pairs: Vec<SimilarityPair>,
    pub units_scanned: usize, // Units of the source document compared before any deadline
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DateMismatch,
    SeverityChange,
    Omission,
    DirectContradiction,
}

impl ConflictType {
    /// Severity is a function of the conflict type, never scored independently
    pub fn severity(&self) -> Severity {
        match self {
            ConflictType::DirectContradiction | ConflictType::SeverityChange => Severity::High,
            ConflictType::DateMismatch => Severity::Medium,
            ConflictType::Omission => Severity::Low,
        }
    }
}

/// A claim quoted from one side of a contradiction
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClaimRef {
    pub document_id: String,
    pub unit_id: String,
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContradictionRecord {
    pub topic: String,
    pub claim_a: ClaimRef,
    pub claim_b: ClaimRef,
    pub doc_label_a: String,
    pub doc_label_b: String,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub explanation: String,
}

impl ContradictionRecord {
    pub fn involves_unit(&self, unit_id: &str) -> bool {
        self.claim_a.unit_id == unit_id || self.claim_b.unit_id == unit_id
    }
}

/// One row of the per-topic contradiction matrix
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TopicConflictRow {
    pub topic: String,
    pub record_count: usize,
    pub conflict_types: Vec<ConflictType>,
    pub highest_severity: Severity,
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Appointment,
    Assessment,
    Incident,
    Decision,
    Documentation,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimelineEvent {
    pub date: chrono::NaiveDate,
    pub event: String, // Trimmed unit text, at most 200 chars
    pub document_id: String,
    pub unit_id: String,
    pub page_number: u32,
    pub category: EventCategory,
    pub significance: Severity,
}
