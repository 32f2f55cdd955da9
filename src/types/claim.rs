//! Claim types - the target claim and extracted claim instances.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Description of the claim being verified for a person.
///
/// The spec is question-agnostic: the claim type keys the output record,
/// the description is handed verbatim to the extractor, and the query
/// template drives retrieval. Templates use `{PERSON}` and `{CLAIM}`
/// placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSpec {
    /// Stable key for the (person, claim-type) record, e.g. "hlp_membership".
    pub claim_type: String,

    /// Natural-language statement of what to establish, e.g.
    /// "membership of a UN High-Level Panel and the year of appointment".
    pub description: String,

    /// Retrieval query template; `{PERSON}` and `{CLAIM}` are substituted
    /// each round.
    pub query_template: String,
}

impl ClaimSpec {
    /// Create a claim spec with the default query template.
    pub fn new(claim_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            description: description.into(),
            query_template: "{PERSON} {CLAIM}".to_string(),
        }
    }

    /// Override the retrieval query template.
    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = template.into();
        self
    }
}

/// The extracted value of a claim: what was found, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimValue {
    /// The subject of the claim, e.g. a panel name.
    pub subject: String,

    /// The year attached to the claim, if the evidence stated one.
    pub year: Option<i32>,
}

impl ClaimValue {
    /// Create a claim value.
    pub fn new(subject: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            subject: subject.into(),
            year,
        }
    }

    /// Normalized subject for comparison: lowercased, whitespace collapsed.
    fn normalized_subject(&self) -> String {
        self.subject
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether two values state the same fact.
    ///
    /// Subjects compare case- and whitespace-insensitively. A missing year
    /// on either side does not disagree with a stated year; two stated but
    /// different years do.
    pub fn agrees_with(&self, other: &ClaimValue) -> bool {
        if self.normalized_subject() != other.normalized_subject() {
            return false;
        }
        match (self.year, other.year) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Whether two values materially disagree (same comparison as
    /// [`agrees_with`](Self::agrees_with), negated). Split out so call
    /// sites read as the policy they implement.
    pub fn disagrees_with(&self, other: &ClaimValue) -> bool {
        !self.agrees_with(other)
    }
}

impl std::fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({year})", self.subject),
            None => f.write_str(&self.subject),
        }
    }
}

/// A candidate answer produced by the extractor from one evidence window.
///
/// Created transiently per retrieval round; never mutated, only
/// accumulated into the corroboration record's evidence log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimInstance {
    /// The extracted value.
    pub value: ClaimValue,

    /// The chunk the extractor drew from. An instance with no traceable
    /// source chunk is invalid and discarded before it reaches the
    /// resolver.
    pub chunk_id: Uuid,

    /// The chunk's parent document.
    pub document_id: Uuid,

    /// Publisher domain signature of the source document.
    pub domain: String,

    /// Text of the evidence chunk the value was drawn from. Kept on the
    /// instance so the provenance resolver can run its near-duplicate
    /// test and the persisted record is auditable without the corpus.
    pub evidence_text: String,

    /// Extractor confidence in [0, 1].
    ///
    /// Used only as a tie-breaker when choosing a group's representative
    /// instance, never as a substitute for independent-source counting.
    pub confidence: f32,

    /// Free-text justification from the extractor.
    pub justification: String,
}

/// Outcome of one extraction call.
///
/// "No claim found" is a first-class, non-error result: absence of
/// evidence for the target claim in a given chunk is common and expected.
#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    /// A structured claim was extracted from the evidence.
    Found(ClaimInstance),

    /// The evidence does not support the target claim.
    NotFound,
}

impl ExtractOutcome {
    /// The instance, if one was found.
    pub fn into_instance(self) -> Option<ClaimInstance> {
        match self {
            ExtractOutcome::Found(instance) => Some(instance),
            ExtractOutcome::NotFound => None,
        }
    }
}
