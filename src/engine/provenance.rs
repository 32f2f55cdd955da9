//! Provenance resolution - deciding whether a new claim instance is an
//! independent source, a duplicate of an already-counted one, or a
//! conflict.
//!
//! Two documents count as the same underlying source when they share a
//! publisher domain signature or their evidence texts are near-duplicates
//! (mirrors, syndicated copies, scraped reposts). Duplicate takes
//! precedence over conflict: a mirror of an accepted source that garbles
//! the claim is still the same source, not a dispute.

use crate::types::claim::ClaimInstance;
use crate::types::config::ProvenanceConfig;
use crate::types::record::CorroborationRecord;

/// The provenance-relevant view of one claim instance's source.
#[derive(Debug, Clone, Copy)]
pub struct SourceSignature<'a> {
    /// Publisher domain signature; empty when the URL was malformed.
    pub domain: &'a str,

    /// Evidence chunk text.
    pub text: &'a str,
}

impl<'a> SourceSignature<'a> {
    fn of(instance: &'a ClaimInstance) -> Self {
        Self {
            domain: &instance.domain,
            text: &instance.evidence_text,
        }
    }
}

/// Decides whether two sources are the same underlying source.
///
/// Implementations must be symmetric: `same_source(a, b)` and
/// `same_source(b, a)` agree. The resolver restores transitivity at the
/// group level by merging groups a new instance bridges.
pub trait MirrorDetector: Send + Sync {
    fn same_source(&self, a: SourceSignature<'_>, b: SourceSignature<'_>) -> bool;
}

/// Default detector: shared domain signature, or near-duplicate evidence
/// text by word-shingle Jaccard overlap.
#[derive(Debug, Clone)]
pub struct DomainOverlapDetector {
    overlap_threshold: f64,
    shingle_len: usize,
}

impl DomainOverlapDetector {
    pub fn new(config: &ProvenanceConfig) -> Self {
        Self {
            overlap_threshold: config.overlap_threshold,
            shingle_len: config.shingle_len.max(1),
        }
    }
}

impl MirrorDetector for DomainOverlapDetector {
    fn same_source(&self, a: SourceSignature<'_>, b: SourceSignature<'_>) -> bool {
        // An empty signature (malformed URL) matches nothing by domain.
        if !a.domain.is_empty() && a.domain == b.domain {
            return true;
        }
        text_overlap(a.text, b.text, self.shingle_len) >= self.overlap_threshold
    }
}

/// Jaccard overlap of lowercased word shingles.
///
/// Texts shorter than one shingle are compared as a single shingle.
/// Either text having no words yields 0.0 so empty evidence never
/// collapses distinct sources.
pub fn text_overlap(a: &str, b: &str, shingle_len: usize) -> f64 {
    let shingles_a = shingles(a, shingle_len);
    let shingles_b = shingles(b, shingle_len);
    if shingles_a.is_empty() || shingles_b.is_empty() {
        return 0.0;
    }

    let intersection = shingles_a.intersection(&shingles_b).count();
    let union = shingles_a.len() + shingles_b.len() - intersection;
    intersection as f64 / union as f64
}

fn shingles(text: &str, shingle_len: usize) -> std::collections::BTreeSet<String> {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return std::collections::BTreeSet::new();
    }
    if words.len() <= shingle_len {
        return std::iter::once(words.join(" ")).collect();
    }
    words
        .windows(shingle_len)
        .map(|window| window.join(" "))
        .collect()
}

/// How a new instance relates to the sources already on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No existing group shares the instance's source, and no accepted
    /// value disputes it.
    NewIndependent,

    /// The instance's source is already counted.
    DuplicateOf {
        /// The group to absorb into (smallest matching id).
        group: u32,

        /// Every group the instance matched. More than one means the
        /// instance bridges groups that must be merged.
        bridged: Vec<u32>,
    },

    /// The instance materially disagrees with an accepted value from a
    /// different source.
    Conflicting { disputed_group: u32 },
}

/// Classifies instances against a record. Pure: never mutates the record.
pub struct ProvenanceResolver {
    detector: Box<dyn MirrorDetector>,
}

impl ProvenanceResolver {
    pub fn new(detector: Box<dyn MirrorDetector>) -> Self {
        Self { detector }
    }

    /// Resolve one instance against the record's accepted groups.
    ///
    /// Duplicate detection runs first: sameness of source is decided
    /// before agreement of values, so a disagreeing mirror is a duplicate,
    /// not a conflict.
    pub fn resolve(&self, instance: &ClaimInstance, record: &CorroborationRecord) -> Resolution {
        let signature = SourceSignature::of(instance);

        let mut bridged: Vec<u32> = record
            .groups
            .iter()
            .filter(|group| {
                group
                    .instances()
                    .any(|member| self.detector.same_source(signature, SourceSignature::of(member)))
            })
            .map(|group| group.id)
            .collect();

        if !bridged.is_empty() {
            bridged.sort_unstable();
            return Resolution::DuplicateOf {
                group: bridged[0],
                bridged,
            };
        }

        if let Some(disputed) = record
            .groups
            .iter()
            .find(|group| instance.value.disagrees_with(&group.best.value))
        {
            return Resolution::Conflicting {
                disputed_group: disputed.id,
            };
        }

        Resolution::NewIndependent
    }
}
