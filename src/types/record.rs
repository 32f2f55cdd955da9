//! Corroboration record - the running state and persisted output of a run.
//!
//! One record exists per (person, claim-type) pair, owned exclusively by
//! one run of the state machine. It is the sole artifact consumed by
//! downstream reporting: final status, independent-source count, accepted
//! source groups, conflict log, and the full round trace.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::claim::{ClaimInstance, ClaimValue};
use crate::types::corpus::Person;

/// Terminal and non-terminal states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Still looking for evidence. Initial state; also the state a
    /// cancelled run is left in so it can be resumed.
    #[default]
    Searching,

    /// The claim is corroborated by the required number of independent
    /// sources. Terminal.
    Confirmed,

    /// The corpus was exhausted (or never had candidates) before the
    /// threshold was reached. Terminal; partial evidence is retained.
    Unconfirmed,
}

impl RunStatus {
    /// Whether the run is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Confirmed | RunStatus::Unconfirmed)
    }
}

/// Why a run ended `unconfirmed`.
///
/// Distinguishes "no evidence exists" from "evidence found but
/// insufficient" - both are surfaced differently downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconfirmedReason {
    /// Retrieval returned nothing on the very first round.
    EmptyCorpus,

    /// Every candidate chunk was examined without reaching the threshold.
    CorpusExhausted,

    /// The round cap was reached before the corpus was exhausted.
    RoundCapReached,

    /// The query embedding could not be produced and no earlier embedding
    /// was available to reuse.
    RetrievalUnavailable,
}

/// An equivalence class of documents judged to originate from the same
/// underlying source (mirrors, syndicated copies, same publisher).
///
/// Membership is symmetric and transitive; groups that turn out to share
/// a source are merged rather than double counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceGroup {
    /// Record-local identifier, assigned in acceptance order.
    pub id: u32,

    /// Representative document (the best instance's source).
    pub representative: Uuid,

    /// All member documents.
    pub members: BTreeSet<Uuid>,

    /// Domain signatures seen across members.
    pub domains: BTreeSet<String>,

    /// The best claim instance for this group: highest extractor
    /// confidence among instances that agree with the accepted value.
    /// First seen wins ties.
    pub best: ClaimInstance,

    /// Duplicate instances absorbed into this group.
    pub corroborating: Vec<ClaimInstance>,
}

impl SourceGroup {
    fn new(id: u32, instance: ClaimInstance) -> Self {
        let mut members = BTreeSet::new();
        members.insert(instance.document_id);
        let mut domains = BTreeSet::new();
        if !instance.domain.is_empty() {
            domains.insert(instance.domain.clone());
        }
        Self {
            id,
            representative: instance.document_id,
            members,
            domains,
            best: instance,
            corroborating: Vec::new(),
        }
    }

    /// Every instance in the group, best first.
    pub fn instances(&self) -> impl Iterator<Item = &ClaimInstance> {
        std::iter::once(&self.best).chain(self.corroborating.iter())
    }

    fn absorb(&mut self, instance: ClaimInstance) {
        self.members.insert(instance.document_id);
        if !instance.domain.is_empty() {
            self.domains.insert(instance.domain.clone());
        }
        // Promotion requires agreement with the accepted value; a mirror
        // restating the claim differently stays corroborating only.
        if instance.value.agrees_with(&self.best.value)
            && instance.confidence > self.best.confidence
        {
            self.representative = instance.document_id;
            let previous = std::mem::replace(&mut self.best, instance);
            self.corroborating.push(previous);
        } else {
            self.corroborating.push(instance);
        }
    }

    /// Merge another group into this one (set union; best instance by
    /// confidence among agreeing values).
    fn merge(&mut self, other: SourceGroup) {
        self.members.extend(other.members);
        self.domains.extend(other.domains);
        let SourceGroup {
            best, corroborating, ..
        } = other;
        self.absorb(best);
        for instance in corroborating {
            self.absorb(instance);
        }
    }
}

/// A claim instance that materially disagreed with an accepted group.
///
/// Conflicts are logged, never auto-resolved; they flag the record for
/// human review before downstream use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEntry {
    /// The disagreeing instance.
    pub instance: ClaimInstance,

    /// The group whose accepted value it disputes.
    pub disputed_group: u32,

    /// The accepted value at the time of the conflict.
    pub accepted_value: ClaimValue,

    /// When the conflict was recorded.
    pub noted_at: DateTime<Utc>,
}

/// What happened in one round of the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Retrieval produced no unexamined candidates.
    NoCandidates,

    /// Evidence was examined but no claim was extracted.
    NotFound,

    /// A new independent source was accepted.
    NewIndependent { group: u32 },

    /// The instance duplicated an already-counted source.
    Duplicate { group: u32 },

    /// The instance conflicted with an accepted value.
    Conflicting,

    /// A provider failed after retries; the round degraded to no result.
    Degraded,
}

/// Per-round trace entry - the evidence trail of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTrace {
    /// 1-based round number.
    pub round: u32,

    /// The retrieval query used this round.
    pub query: String,

    /// Chunks examined this round.
    pub examined_chunks: Vec<Uuid>,

    /// Round outcome.
    pub outcome: RoundOutcome,
}

/// The running state for one (person, claim-type) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorroborationRecord {
    /// The person this run is scoped to.
    pub person: Person,

    /// The claim type being verified.
    pub claim_type: String,

    /// Current status.
    pub status: RunStatus,

    /// Why the run ended `unconfirmed`, when it did.
    pub unconfirmed_reason: Option<UnconfirmedReason>,

    /// Accepted independent source groups, in acceptance order.
    pub groups: Vec<SourceGroup>,

    /// Conflict log.
    pub conflicts: Vec<ConflictEntry>,

    /// Every chunk examined so far. Strictly grows across rounds, which
    /// is what bounds the run at |corpus| rounds.
    pub examined_chunks: BTreeSet<Uuid>,

    /// Fully-completed evidence rounds.
    pub rounds: u32,

    /// Per-round evidence trail.
    pub trace: Vec<RoundTrace>,

    /// Embedding model version the run's queries used. Recorded because
    /// cross-model similarity comparisons are invalid.
    pub embedding_model: Option<String>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl CorroborationRecord {
    /// Create a fresh record in the `searching` state.
    pub fn new(person: Person, claim_type: impl Into<String>) -> Self {
        Self {
            person,
            claim_type: claim_type.into(),
            status: RunStatus::Searching,
            unconfirmed_reason: None,
            groups: Vec::new(),
            conflicts: Vec::new(),
            examined_chunks: BTreeSet::new(),
            rounds: 0,
            trace: Vec::new(),
            embedding_model: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Number of independent sources accepted so far.
    pub fn independent_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether the run is finished.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The accepted claim value, from the first group's best instance.
    pub fn accepted_value(&self) -> Option<&ClaimValue> {
        self.groups.first().map(|g| &g.best.value)
    }

    /// Accept an instance as a new independent source. Returns the new
    /// group's id.
    pub fn accept(&mut self, instance: ClaimInstance) -> u32 {
        let id = self.next_group_id();
        self.groups.push(SourceGroup::new(id, instance));
        id
    }

    /// Absorb a duplicate instance into an existing group.
    pub fn absorb(&mut self, group_id: u32, instance: ClaimInstance) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.id == group_id) {
            group.absorb(instance);
        }
    }

    /// Merge a set of groups that turned out to share a source. The
    /// smallest id survives and is returned. Unknown ids are ignored, so
    /// repeated merges are harmless.
    pub fn merge_groups(&mut self, ids: &[u32]) -> Option<u32> {
        let mut sorted: Vec<u32> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let (&keep, rest) = sorted.split_first()?;
        if !self.groups.iter().any(|g| g.id == keep) {
            return None;
        }
        for &id in rest {
            if let Some(pos) = self.groups.iter().position(|g| g.id == id) {
                let absorbed = self.groups.remove(pos);
                if let Some(target) = self.groups.iter_mut().find(|g| g.id == keep) {
                    target.merge(absorbed);
                }
            }
        }
        self.groups.iter().find(|g| g.id == keep).map(|g| g.id)
    }

    /// Log a conflicting instance. Never mutates accepted groups.
    pub fn record_conflict(
        &mut self,
        instance: ClaimInstance,
        disputed_group: u32,
        accepted_value: ClaimValue,
    ) {
        self.conflicts.push(ConflictEntry {
            instance,
            disputed_group,
            accepted_value,
            noted_at: Utc::now(),
        });
    }

    /// Mark chunks examined.
    pub fn mark_examined(&mut self, chunks: impl IntoIterator<Item = Uuid>) {
        self.examined_chunks.extend(chunks);
    }

    /// Transition to `confirmed`. Terminal.
    pub fn confirm(&mut self) {
        self.status = RunStatus::Confirmed;
        self.finished_at = Some(Utc::now());
    }

    /// Transition to `unconfirmed` with a reason. Terminal; partial
    /// evidence (count 0 or 1) is retained.
    pub fn exhaust(&mut self, reason: UnconfirmedReason) {
        self.status = RunStatus::Unconfirmed;
        self.unconfirmed_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    fn next_group_id(&self) -> u32 {
        self.groups.iter().map(|g| g.id + 1).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::claim::ClaimValue;

    fn instance(domain: &str, confidence: f32) -> ClaimInstance {
        instance_with_value(domain, confidence, "High-Level Panel on X", Some(2014))
    }

    fn instance_with_value(
        domain: &str,
        confidence: f32,
        subject: &str,
        year: Option<i32>,
    ) -> ClaimInstance {
        ClaimInstance {
            value: ClaimValue::new(subject, year),
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            domain: domain.to_string(),
            evidence_text: format!("{subject} evidence text"),
            confidence,
            justification: "stated directly".to_string(),
        }
    }

    #[test]
    fn accept_then_absorb_keeps_count_at_one() {
        let mut record = CorroborationRecord::new(Person::new("A B"), "hlp");
        let id = record.accept(instance("a.org", 0.8));
        record.absorb(id, instance("a-mirror.org", 0.6));

        assert_eq!(record.independent_count(), 1);
        let group = &record.groups[0];
        assert_eq!(group.members.len(), 2);
        assert_eq!(group.corroborating.len(), 1);
        assert_eq!(group.domains.len(), 2);
    }

    #[test]
    fn absorb_promotes_higher_confidence_agreeing_instance() {
        let mut record = CorroborationRecord::new(Person::new("A B"), "hlp");
        let id = record.accept(instance("a.org", 0.5));
        let better = instance("a.org", 0.9);
        let better_doc = better.document_id;
        record.absorb(id, better);

        assert_eq!(record.groups[0].representative, better_doc);
        assert!((record.groups[0].best.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn absorb_never_promotes_disagreeing_instance() {
        let mut record = CorroborationRecord::new(Person::new("A B"), "hlp");
        let first = instance("a.org", 0.5);
        let first_doc = first.document_id;
        let id = record.accept(first);

        // Same source, higher confidence, but a different year.
        record.absorb(
            id,
            instance_with_value("a.org", 0.9, "High-Level Panel on X", Some(2015)),
        );

        assert_eq!(record.groups[0].representative, first_doc);
        assert_eq!(record.groups[0].best.value.year, Some(2014));
    }

    #[test]
    fn merge_groups_keeps_smallest_id() {
        let mut record = CorroborationRecord::new(Person::new("A B"), "hlp");
        let a = record.accept(instance("a.org", 0.7));
        let b = record.accept(instance("b.org", 0.8));
        assert_eq!(record.independent_count(), 2);

        let kept = record.merge_groups(&[b, a]).unwrap();
        assert_eq!(kept, a);
        assert_eq!(record.independent_count(), 1);
        assert_eq!(record.groups[0].members.len(), 2);

        // Merging again is a no-op.
        record.merge_groups(&[a, b]);
        assert_eq!(record.independent_count(), 1);
    }

    #[test]
    fn terminal_transitions_set_finished_at() {
        let mut record = CorroborationRecord::new(Person::new("A B"), "hlp");
        assert!(!record.is_terminal());

        record.exhaust(UnconfirmedReason::CorpusExhausted);
        assert!(record.is_terminal());
        assert!(record.finished_at.is_some());
        assert_eq!(
            record.unconfirmed_reason,
            Some(UnconfirmedReason::CorpusExhausted)
        );
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = CorroborationRecord::new(Person::new("Amina J. Mohammed"), "hlp");
        record.accept(instance("un.org", 0.9));
        record.trace.push(RoundTrace {
            round: 1,
            query: "Amina J. Mohammed panel".into(),
            examined_chunks: vec![Uuid::new_v4()],
            outcome: RoundOutcome::NewIndependent { group: 0 },
        });

        let json = serde_json::to_string(&record).unwrap();
        let back: CorroborationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.independent_count(), 1);
        assert_eq!(back.trace.len(), 1);
        assert_eq!(back.status, RunStatus::Searching);
    }
}
