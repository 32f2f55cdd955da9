//! The corroboration round loop.
//!
//! Each round: build the query, embed it, retrieve unexamined candidates,
//! rerank, hand the top window to the extractor, resolve provenance, and
//! update the record. The loop ends when enough independent sources are
//! accepted (`confirmed`) or the corpus runs out (`unconfirmed`).

use tokio_util::sync::CancellationToken;

use crate::engine::provenance::{
    DomainOverlapDetector, MirrorDetector, ProvenanceResolver, Resolution,
};
use crate::engine::retrieve;
use crate::engine::retry::with_retry;
use crate::error::{EngineError, Result};
use crate::traits::embedder::Embedder;
use crate::traits::extractor::ClaimExtractor;
use crate::traits::reranker::{RankedChunk, Reranker};
use crate::traits::store::CorpusStore;
use crate::types::claim::{ClaimInstance, ClaimSpec, ClaimValue, ExtractOutcome};
use crate::types::config::EngineConfig;
use crate::types::corpus::{CorpusChunk, Embedding, Person};
use crate::types::record::{
    CorroborationRecord, RoundOutcome, RoundTrace, RunStatus, UnconfirmedReason,
};

/// Drives corroboration runs over a corpus store and three providers.
///
/// The engine is stateless across runs; all run state lives in the
/// [`CorroborationRecord`], so a run cancelled mid-way can be resumed
/// from its persisted record.
pub struct CorroborationEngine<S, E, R, X> {
    store: S,
    embedder: E,
    reranker: R,
    extractor: X,
    config: EngineConfig,
    resolver: ProvenanceResolver,
}

impl<S, E, R, X> CorroborationEngine<S, E, R, X>
where
    S: CorpusStore,
    E: Embedder,
    R: Reranker,
    X: ClaimExtractor,
{
    /// Create an engine with the default mirror detector built from the
    /// config's provenance tunables.
    pub fn new(store: S, embedder: E, reranker: R, extractor: X, config: EngineConfig) -> Self {
        let detector = DomainOverlapDetector::new(&config.provenance);
        Self {
            store,
            embedder,
            reranker,
            extractor,
            config,
            resolver: ProvenanceResolver::new(Box::new(detector)),
        }
    }

    /// Replace the mirror detector.
    pub fn with_detector(mut self, detector: Box<dyn MirrorDetector>) -> Self {
        self.resolver = ProvenanceResolver::new(detector);
        self
    }

    /// Run corroboration for one (person, claim-type) pair to a terminal
    /// status.
    pub async fn run(&self, person: &Person, spec: &ClaimSpec) -> Result<CorroborationRecord> {
        let mut record = CorroborationRecord::new(person.clone(), spec.claim_type.clone());
        self.resume(&mut record, spec, &CancellationToken::new())
            .await?;
        Ok(record)
    }

    /// Continue a run from its record until terminal or cancelled.
    ///
    /// Cancellation is observed between rounds only; a cancelled run
    /// returns `Ok` with the record still `searching`, ready to resume.
    /// A terminal record is returned unchanged.
    pub async fn resume(
        &self,
        record: &mut CorroborationRecord,
        spec: &ClaimSpec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if record.is_terminal() {
            return Ok(());
        }
        if record.person.canonical_name.trim().is_empty() {
            return Err(EngineError::Config("person has an empty name".into()));
        }
        // A zero window would stop the examined set from growing, which
        // is the termination guarantee.
        if self.config.evidence_window == 0 {
            return Err(EngineError::Config("evidence_window must be at least 1".into()));
        }
        if self.config.required_sources == 0 {
            return Err(EngineError::Config("required_sources must be at least 1".into()));
        }

        tracing::info!(
            person = %record.person,
            claim_type = %spec.claim_type,
            rounds_so_far = record.rounds,
            "corroboration run starting"
        );

        // The most recent successful query embedding, reused if a later
        // embed call fails outright.
        let mut last_embedding: Option<Embedding> = None;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(person = %record.person, "run cancelled between rounds");
                return Ok(());
            }
            if let Some(cap) = self.config.max_rounds {
                if record.rounds >= cap {
                    record.exhaust(UnconfirmedReason::RoundCapReached);
                    break;
                }
            }

            let query = round_query(&record.person, spec, record.accepted_value());

            let embedding = match with_retry(&self.config.retry, "embed", || {
                self.embedder.embed(&query)
            })
            .await
            {
                Ok(embedding) => {
                    last_embedding = Some(embedding.clone());
                    embedding
                }
                Err(err) => match last_embedding.clone() {
                    Some(previous) => {
                        tracing::warn!(error = %err, "embed failed, reusing previous query embedding");
                        previous
                    }
                    None => {
                        tracing::error!(error = %err, "embed failed with no embedding to fall back to");
                        record.exhaust(UnconfirmedReason::RetrievalUnavailable);
                        break;
                    }
                },
            };
            if record.embedding_model.is_none() {
                record.embedding_model = Some(embedding.model.clone());
            }

            let candidates = retrieve::rank_candidates(
                &self.store,
                &record.person,
                &embedding,
                &record.examined_chunks,
                &self.config,
            )
            .await?;

            if candidates.is_empty() {
                let reason = if record.examined_chunks.is_empty() {
                    UnconfirmedReason::EmptyCorpus
                } else {
                    UnconfirmedReason::CorpusExhausted
                };
                // A probe that examined nothing is traced but does not
                // count as a round.
                record.trace.push(RoundTrace {
                    round: record.rounds + 1,
                    query,
                    examined_chunks: Vec::new(),
                    outcome: RoundOutcome::NoCandidates,
                });
                record.exhaust(reason);
                break;
            }

            let window = self.rerank_window(&query, candidates).await;
            let evidence: Vec<CorpusChunk> =
                window.iter().map(|ranked| ranked.chunk.clone()).collect();
            let examined: Vec<uuid::Uuid> =
                evidence.iter().map(|chunk| chunk.chunk.id).collect();

            let extraction = match with_retry(&self.config.retry, "extract", || {
                self.extractor.extract(&record.person, spec, &evidence)
            })
            .await
            {
                Ok(outcome) => Some(outcome),
                Err(EngineError::MalformedExtraction { raw }) => {
                    tracing::warn!(raw, "malformed extractor output treated as not found");
                    Some(ExtractOutcome::NotFound)
                }
                Err(err) if err.is_transient() => {
                    tracing::warn!(error = %err, "extractor unavailable, degrading round");
                    None
                }
                Err(err) => return Err(err),
            };

            record.mark_examined(examined.iter().copied());
            record.rounds += 1;
            let round = record.rounds;

            let outcome = match extraction {
                None => RoundOutcome::Degraded,
                Some(ExtractOutcome::NotFound) => RoundOutcome::NotFound,
                Some(ExtractOutcome::Found(instance)) => {
                    self.resolve_instance(record, instance, &evidence)
                }
            };

            tracing::debug!(
                person = %record.person,
                round,
                outcome = ?outcome,
                independent = record.independent_count(),
                "round complete"
            );
            record.trace.push(RoundTrace {
                round,
                query,
                examined_chunks: examined,
                outcome,
            });

            if record.independent_count() >= self.config.required_sources {
                record.confirm();
                break;
            }
        }

        tracing::info!(
            person = %record.person,
            claim_type = %spec.claim_type,
            status = ?record.status,
            independent = record.independent_count(),
            conflicts = record.conflicts.len(),
            rounds = record.rounds,
            "corroboration run finished"
        );
        debug_assert!(record.status != RunStatus::Searching);
        Ok(())
    }

    /// Rerank the candidate set, falling back to similarity order when
    /// the reranker fails after retries.
    async fn rerank_window(&self, query: &str, candidates: Vec<RankedChunk>) -> Vec<RankedChunk> {
        let top_n = self.config.rerank_top_n;
        let reranked = with_retry(&self.config.retry, "rerank", || {
            self.reranker.rerank(query, candidates.clone(), top_n)
        })
        .await;

        let ordered = match reranked {
            Ok(ranked) => ranked,
            Err(err) => {
                tracing::warn!(error = %err, "rerank failed, falling back to similarity order");
                candidates.into_iter().take(top_n).collect()
            }
        };
        ordered
            .into_iter()
            .take(self.config.evidence_window)
            .collect()
    }

    /// Anchor the instance to its evidence chunk and classify it against
    /// the record's accepted groups.
    fn resolve_instance(
        &self,
        record: &mut CorroborationRecord,
        mut instance: ClaimInstance,
        evidence: &[CorpusChunk],
    ) -> RoundOutcome {
        // The window chunk, not the extractor, is the source of truth for
        // provenance fields. An instance pointing outside the window has
        // no traceable source and is discarded.
        let Some(source) = evidence
            .iter()
            .find(|chunk| chunk.chunk.id == instance.chunk_id)
        else {
            tracing::warn!(
                chunk = %instance.chunk_id,
                "extractor referenced a chunk outside the evidence window, discarding"
            );
            return RoundOutcome::NotFound;
        };
        instance.document_id = source.document.id;
        instance.domain = source.document.domain.clone();
        instance.evidence_text = source.chunk.text.clone();

        match self.resolver.resolve(&instance, record) {
            Resolution::NewIndependent => {
                let group = record.accept(instance);
                tracing::info!(group, "accepted new independent source");
                RoundOutcome::NewIndependent { group }
            }
            Resolution::DuplicateOf { group, bridged } => {
                let target = if bridged.len() > 1 {
                    tracing::info!(?bridged, "instance bridges groups, merging");
                    record.merge_groups(&bridged).unwrap_or(group)
                } else {
                    group
                };
                record.absorb(target, instance);
                RoundOutcome::Duplicate { group: target }
            }
            Resolution::Conflicting { disputed_group } => {
                let accepted = record
                    .groups
                    .iter()
                    .find(|group| group.id == disputed_group)
                    .map(|group| group.best.value.clone());
                if let Some(accepted) = accepted {
                    tracing::warn!(
                        disputed_group,
                        accepted = %accepted,
                        found = %instance.value,
                        "conflicting claim value recorded for review"
                    );
                    record.record_conflict(instance, disputed_group, accepted);
                }
                RoundOutcome::Conflicting
            }
        }
    }
}

/// Build the retrieval query for a round.
///
/// `{PERSON}` and `{CLAIM}` placeholders are filled from the run inputs.
/// Once a value has been accepted it is appended so later rounds steer
/// toward corroborating (or disputing) that specific value.
fn round_query(person: &Person, spec: &ClaimSpec, accepted: Option<&ClaimValue>) -> String {
    let base = spec
        .query_template
        .replace("{PERSON}", &person.canonical_name)
        .replace("{CLAIM}", &spec.description);
    match accepted {
        Some(value) => format!("{base} {value}"),
        None => base,
    }
}
