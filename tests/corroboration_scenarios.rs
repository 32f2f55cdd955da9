//! End-to-end corroboration scenarios over the in-memory store and mock
//! providers.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use corroboration::testing::{hashed_vector, MockEmbedder, MockExtractor, MockReranker};
use corroboration::{
    ClaimSpec, ClaimValue, CorpusChunk, CorpusStore, CorroborationEngine, Chunk, Document,
    Embedding, EngineConfig, EngineError, MemoryCorpus, Person, Result, RetryPolicy, RoundOutcome,
    RunStatus, UnconfirmedReason,
};

const MODEL: &str = "embed-v4.0";

fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn person() -> Person {
    Person::new("Amina J. Mohammed")
}

fn spec() -> ClaimSpec {
    ClaimSpec::new(
        "hlp_membership",
        "membership of a UN High-Level Panel and the year of appointment",
    )
}

fn panel_value() -> ClaimValue {
    ClaimValue::new("High-Level Panel on Digital Cooperation", Some(2018))
}

async fn ingest(store: &MemoryCorpus, person: &Person, url: &str, rank: u32, text: &str) {
    let document = Document::new(url).with_rank(rank);
    let chunk = Chunk::new(document.id, 0, text);
    let embedding = Embedding::new(MODEL, hashed_vector(text));
    store
        .ingest_document(person, document, vec![(chunk, embedding)])
        .await
        .unwrap();
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: std::time::Duration::from_millis(1),
        max_backoff: std::time::Duration::from_millis(4),
        ..RetryPolicy::default()
    }
}

const PANEL_TEXT: &str = "Amina J. Mohammed was appointed to the High-Level Panel \
    on Digital Cooperation in 2018 by the Secretary-General, joining a group of \
    twenty members drawn from government, industry, and academia.";

#[tokio::test]
async fn mirrored_coverage_counts_as_one_source() {
    init_logs();
    let store = MemoryCorpus::new();
    let subject = person();
    // Same article syndicated on two different domains.
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;
    ingest(&store, &subject, "https://news-mirror.net/copy", 2, PANEL_TEXT).await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new().rule("High-Level Panel", panel_value(), 0.9),
        EngineConfig::default(),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Unconfirmed);
    assert_eq!(
        record.unconfirmed_reason,
        Some(UnconfirmedReason::CorpusExhausted)
    );
    assert_eq!(record.independent_count(), 1);

    let group = &record.groups[0];
    assert_eq!(group.members.len(), 2);
    assert!(group.domains.contains("un.org"));
    assert!(group.domains.contains("news-mirror.net"));
    assert!(record
        .trace
        .iter()
        .any(|round| matches!(round.outcome, RoundOutcome::Duplicate { .. })));
}

#[tokio::test]
async fn two_independent_publishers_confirm() {
    init_logs();
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;
    ingest(
        &store,
        &subject,
        "https://reuters.com/profile",
        2,
        "In her career summary, the agency noted her 2018 appointment to the \
         UN High-Level Panel on Digital Cooperation among other roles.",
    )
    .await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new().rule("High-Level Panel", panel_value(), 0.9),
        EngineConfig::default(),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Confirmed);
    assert_eq!(record.independent_count(), 2);
    assert_eq!(record.rounds, 2);
    assert!(record.finished_at.is_some());
    assert_eq!(record.embedding_model.as_deref(), Some(MODEL));
    assert_eq!(record.accepted_value(), Some(&panel_value()));
}

#[tokio::test]
async fn no_mentions_exhausts_the_corpus() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://a.org/1", 1, "She studied architecture in Kaduna.").await;
    ingest(&store, &subject, "https://b.org/2", 2, "Later she worked on education reform.").await;
    ingest(&store, &subject, "https://c.org/3", 3, "Her ministry oversaw several projects.").await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new(),
        EngineConfig::default(),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Unconfirmed);
    assert_eq!(
        record.unconfirmed_reason,
        Some(UnconfirmedReason::CorpusExhausted)
    );
    assert_eq!(record.independent_count(), 0);
    // One round per chunk, plus a traced probe that found nothing left.
    assert_eq!(record.rounds, 3);
    assert_eq!(record.examined_chunks.len(), 3);
    assert_eq!(record.trace.len(), 4);
    assert_eq!(record.trace[3].outcome, RoundOutcome::NoCandidates);
}

#[tokio::test]
async fn disagreeing_independent_source_is_logged_not_counted() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(
        &store,
        &subject,
        "https://www.un.org/panel",
        1,
        "The Secretary-General announced she joined in 2018 as a panel co-chair.",
    )
    .await;
    ingest(
        &store,
        &subject,
        "https://some-blog.example/post",
        2,
        "According to this retrospective she actually joined in 2019 instead.",
    )
    .await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        // Force the 2018 account into the first round regardless of
        // hash-embedding similarity order.
        MockReranker::new().boosting("joined in 2018"),
        MockExtractor::new()
            .rule(
                "joined in 2018",
                ClaimValue::new("High-Level Panel on Digital Cooperation", Some(2018)),
                0.9,
            )
            .rule(
                "joined in 2019",
                ClaimValue::new("High-Level Panel on Digital Cooperation", Some(2019)),
                0.8,
            ),
        EngineConfig::default(),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Unconfirmed);
    assert_eq!(record.independent_count(), 1);
    assert_eq!(record.conflicts.len(), 1);

    let conflict = &record.conflicts[0];
    assert_eq!(conflict.disputed_group, 0);
    assert_eq!(conflict.accepted_value.year, Some(2018));
    assert_eq!(conflict.instance.value.year, Some(2019));
    // The accepted group is untouched by the conflict.
    assert_eq!(record.groups[0].best.value.year, Some(2018));
}

#[tokio::test]
async fn bridging_mirror_merges_groups() {
    let store = MemoryCorpus::new();
    let subject = person();
    let copy_text = "A syndicated beta profile restating the 2018 panel appointment \
        in the very same words across outlets and wire services everywhere.";
    ingest(
        &store,
        &subject,
        "https://a.org/original",
        1,
        "An alpha report of the 2018 panel appointment in its own words.",
    )
    .await;
    ingest(&store, &subject, "https://b.org/copy", 2, copy_text).await;
    // Same publisher as the first, same text as the second.
    ingest(&store, &subject, "https://a.org/reprint", 3, copy_text).await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new().boosting("alpha"),
        MockExtractor::new()
            .rule("alpha", panel_value(), 0.9)
            .rule("beta", panel_value(), 0.8),
        EngineConfig::default().with_required_sources(3),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Unconfirmed);
    // The reprint bridged both groups into one.
    assert_eq!(record.independent_count(), 1);
    assert_eq!(record.groups[0].id, 0);
    assert_eq!(record.groups[0].members.len(), 3);
    assert!(record
        .trace
        .iter()
        .any(|round| round.outcome == RoundOutcome::Duplicate { group: 0 }));
}

#[tokio::test]
async fn empty_corpus_is_unconfirmed_without_rounds() {
    let engine = CorroborationEngine::new(
        MemoryCorpus::new(),
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new(),
        EngineConfig::default(),
    );

    let record = engine.run(&person(), &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Unconfirmed);
    assert_eq!(
        record.unconfirmed_reason,
        Some(UnconfirmedReason::EmptyCorpus)
    );
    assert_eq!(record.rounds, 0);
    assert_eq!(record.trace.len(), 1);
    assert_eq!(record.trace[0].outcome, RoundOutcome::NoCandidates);
}

#[tokio::test]
async fn round_cap_stops_a_large_corpus() {
    let store = MemoryCorpus::new();
    let subject = person();
    for i in 0..10 {
        ingest(
            &store,
            &subject,
            &format!("https://site{i}.org/page"),
            i + 1,
            &format!("Filler biography text number {i} with no panel mention."),
        )
        .await;
    }

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new(),
        EngineConfig::default().with_max_rounds(2),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Unconfirmed);
    assert_eq!(
        record.unconfirmed_reason,
        Some(UnconfirmedReason::RoundCapReached)
    );
    assert_eq!(record.rounds, 2);
}

struct LeakyStore {
    inner: MemoryCorpus,
}

#[async_trait]
impl CorpusStore for LeakyStore {
    async fn list_chunks(&self, _person: &Person) -> Result<Vec<CorpusChunk>> {
        // Always returns Mallory's corpus, whoever asks.
        self.inner.list_chunks(&Person::new("Mallory")).await
    }
}

#[tokio::test]
async fn leaked_foreign_chunks_abort_the_run() {
    let inner = MemoryCorpus::new();
    ingest(
        &inner,
        &Person::new("Mallory"),
        "https://mallory.example/bio",
        1,
        "A chunk about somebody else entirely.",
    )
    .await;

    let engine = CorroborationEngine::new(
        LeakyStore { inner },
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new(),
        EngineConfig::default(),
    );

    let err = engine.run(&person(), &spec()).await.unwrap_err();
    assert!(matches!(err, EngineError::ScopeViolation { .. }));
}

#[tokio::test]
async fn cancelled_run_resumes_from_its_record() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;
    ingest(
        &store,
        &subject,
        "https://reuters.com/profile",
        2,
        "A wire summary noting her 2018 seat on the High-Level Panel in passing.",
    )
    .await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new().rule("High-Level Panel", panel_value(), 0.9),
        EngineConfig::default(),
    );

    let mut record =
        corroboration::CorroborationRecord::new(subject.clone(), "hlp_membership");
    let cancelled = CancellationToken::new();
    cancelled.cancel();
    engine
        .resume(&mut record, &spec(), &cancelled)
        .await
        .unwrap();
    assert_eq!(record.status, RunStatus::Searching);
    assert_eq!(record.rounds, 0);

    engine
        .resume(&mut record, &spec(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.status, RunStatus::Confirmed);
    assert_eq!(record.independent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn extractor_outage_degrades_the_round_and_continues() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;
    ingest(
        &store,
        &subject,
        "https://reuters.com/profile",
        2,
        "Another account of the 2018 High-Level Panel appointment, differently worded.",
    )
    .await;

    let retry = fast_retry();
    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        // Exactly one round's worth of attempts fail.
        MockExtractor::new()
            .rule("High-Level Panel", panel_value(), 0.9)
            .failing(retry.max_attempts),
        EngineConfig::default().with_retry(retry),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.trace[0].outcome, RoundOutcome::Degraded);
    // The degraded chunk was still examined, so the run moved on and
    // found the remaining source.
    assert_eq!(record.status, RunStatus::Unconfirmed);
    assert_eq!(record.independent_count(), 1);
    assert_eq!(record.examined_chunks.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn reranker_outage_falls_back_to_similarity_order() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;
    ingest(
        &store,
        &subject,
        "https://reuters.com/profile",
        2,
        "A separate report on the 2018 High-Level Panel seat from the wire desk.",
    )
    .await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new().failing(u32::MAX),
        MockExtractor::new().rule("High-Level Panel", panel_value(), 0.9),
        EngineConfig::default().with_retry(fast_retry()),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Confirmed);
    assert_eq!(record.independent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn embedder_outage_with_no_cache_is_retrieval_unavailable() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL).failing(u32::MAX),
        MockReranker::new(),
        MockExtractor::new(),
        EngineConfig::default().with_retry(fast_retry()),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert_eq!(record.status, RunStatus::Unconfirmed);
    assert_eq!(
        record.unconfirmed_reason,
        Some(UnconfirmedReason::RetrievalUnavailable)
    );
    assert_eq!(record.rounds, 0);
}

#[tokio::test]
async fn malformed_extractor_output_is_a_not_found_round() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new()
            .rule("High-Level Panel", panel_value(), 0.9)
            .malformed(1),
        EngineConfig::default(),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    // The only chunk was spent on the malformed round.
    assert_eq!(record.trace[0].outcome, RoundOutcome::NotFound);
    assert_eq!(record.independent_count(), 0);
    assert_eq!(record.status, RunStatus::Unconfirmed);
}

#[tokio::test]
async fn progress_is_monotonic_and_bounded_by_corpus_size() {
    let store = MemoryCorpus::new();
    let subject = person();
    let corpus_size = 5;
    for i in 0..corpus_size {
        ingest(
            &store,
            &subject,
            &format!("https://site{i}.org/page"),
            i + 1,
            &format!("Unrelated paragraph number {i} about other work."),
        )
        .await;
    }

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new(),
        EngineConfig::default(),
    );

    let record = engine.run(&subject, &spec()).await.unwrap();
    assert!(record.rounds <= corpus_size);

    // No chunk is ever examined twice across rounds.
    let mut seen = std::collections::BTreeSet::new();
    for round in &record.trace {
        for chunk in &round.examined_chunks {
            assert!(seen.insert(*chunk), "chunk examined twice");
        }
    }
    assert_eq!(seen.len(), corpus_size as usize);
}

#[tokio::test]
async fn duplicate_suppression_is_order_independent() {
    // The mirror scenario run twice, with the examination order flipped
    // by the reranker, lands on the same count either way.
    for boost in ["original wording", "mirror wording"] {
        let store = MemoryCorpus::new();
        let subject = person();
        ingest(
            &store,
            &subject,
            "https://a.org/story",
            1,
            "original wording of the shared 2018 panel appointment story text here",
        )
        .await;
        ingest(
            &store,
            &subject,
            "https://a.org/amp",
            2,
            "mirror wording of the shared 2018 panel appointment story text here",
        )
        .await;

        let engine = CorroborationEngine::new(
            store,
            MockEmbedder::new(MODEL),
            MockReranker::new().boosting(boost),
            MockExtractor::new().rule("panel appointment", panel_value(), 0.9),
            EngineConfig::default(),
        );

        let record = engine.run(&subject, &spec()).await.unwrap();
        assert_eq!(record.independent_count(), 1, "boost: {boost}");
        assert_eq!(record.status, RunStatus::Unconfirmed);
        assert_eq!(record.groups[0].members.len(), 2);
    }
}

#[tokio::test]
async fn resuming_a_terminal_record_changes_nothing() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;

    let engine = CorroborationEngine::new(
        store,
        MockEmbedder::new(MODEL),
        MockReranker::new(),
        MockExtractor::new().rule("High-Level Panel", panel_value(), 0.9),
        EngineConfig::default(),
    );

    let mut record = engine.run(&subject, &spec()).await.unwrap();
    let rounds_before = record.rounds;
    let finished_before = record.finished_at;

    engine
        .resume(&mut record, &spec(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.rounds, rounds_before);
    assert_eq!(record.finished_at, finished_before);
}

#[tokio::test]
async fn later_rounds_query_with_the_accepted_value() {
    let store = MemoryCorpus::new();
    let subject = person();
    ingest(&store, &subject, "https://www.un.org/panel", 1, PANEL_TEXT).await;
    ingest(
        &store,
        &subject,
        "https://reuters.com/profile",
        2,
        "Wire coverage of the 2018 High-Level Panel appointment announcement.",
    )
    .await;

    let embedder = std::sync::Arc::new(MockEmbedder::new(MODEL));
    let engine = CorroborationEngine::new(
        store,
        embedder.clone(),
        MockReranker::new(),
        MockExtractor::new().rule("High-Level Panel", panel_value(), 0.9),
        EngineConfig::default(),
    );
    engine.run(&subject, &spec()).await.unwrap();

    let queries = embedder.calls().await;
    assert!(queries[0].contains("Amina J. Mohammed"));
    assert!(!queries[0].contains("(2018)"));
    // After the first acceptance the query steers toward the value.
    assert!(queries[1].contains("High-Level Panel on Digital Cooperation (2018)"));
}
