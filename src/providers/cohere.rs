//! Cohere-backed providers: query embedding, reranking, and claim
//! extraction over the v2 HTTP API.
//!
//! One client implements all three provider traits. Network and HTTP
//! failures surface as transient provider errors so the engine's retry
//! and degradation policies apply; malformed model output from the
//! extractor degrades to a not-found outcome rather than failing a run.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::traits::embedder::Embedder;
use crate::traits::extractor::ClaimExtractor;
use crate::traits::reranker::{RankedChunk, Reranker};
use crate::types::claim::{ClaimInstance, ClaimSpec, ClaimValue, ExtractOutcome};
use crate::types::corpus::{CorpusChunk, Embedding, Person};

const DEFAULT_BASE_URL: &str = "https://api.cohere.com";
const DEFAULT_EMBED_MODEL: &str = "embed-v4.0";
const DEFAULT_RERANK_MODEL: &str = "rerank-v3.5";
const DEFAULT_CHAT_MODEL: &str = "command-a-03-2025";

/// Cohere API client configuration.
pub struct CohereConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub embed_model: String,
    pub rerank_model: String,
    pub chat_model: String,
}

impl CohereConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }

    /// Override the API base URL (for proxies and test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Cohere client implementing [`Embedder`], [`Reranker`], and
/// [`ClaimExtractor`].
pub struct CohereClient {
    http: reqwest::Client,
    config: CohereConfig,
}

impl CohereClient {
    pub fn new(config: CohereConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|err| EngineError::provider(operation, err))?
            .error_for_status()
            .map_err(|err| EngineError::provider(operation, err))?;
        response
            .json::<Resp>()
            .await
            .map_err(|err| EngineError::provider(operation, err))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: Vec<&'a str>,
    input_type: &'a str,
    embedding_types: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbedVectors,
}

#[derive(Deserialize)]
struct EmbedVectors {
    float: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for CohereClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbedRequest {
            model: &self.config.embed_model,
            texts: vec![text],
            input_type: "search_query",
            embedding_types: vec!["float"],
        };
        let response: EmbedResponse = self.post("embed", "/v2/embed", &request).await?;
        let vector = response
            .embeddings
            .float
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::provider(
                    "embed",
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "empty embed response"),
                )
            })?;
        Ok(Embedding::new(self.config.embed_model.clone(), vector))
    }

    fn model_version(&self) -> &str {
        &self.config.embed_model
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl Reranker for CohereClient {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedChunk>,
        top_n: usize,
    ) -> Result<Vec<RankedChunk>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let request = RerankRequest {
            model: &self.config.rerank_model,
            query,
            documents: candidates
                .iter()
                .map(|candidate| candidate.chunk.chunk.text.as_str())
                .collect(),
            top_n,
        };
        let response: RerankResponse = self.post("rerank", "/v2/rerank", &request).await?;

        // Results map back to candidates by index only; an out-of-range
        // index from the API is dropped rather than trusted.
        let mut ordered = Vec::with_capacity(response.results.len().min(candidates.len()));
        let mut pool: Vec<Option<RankedChunk>> = candidates.into_iter().map(Some).collect();
        for result in response.results {
            if let Some(slot) = pool.get_mut(result.index) {
                if let Some(mut candidate) = slot.take() {
                    candidate.relevance = Some(result.relevance_score);
                    ordered.push(candidate);
                }
            }
        }
        ordered.truncate(top_n);
        Ok(ordered)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Vec<ChatContent>,
}

#[derive(Deserialize)]
struct ChatContent {
    text: String,
}

/// The JSON object the extraction prompt asks the model to return.
#[derive(Deserialize)]
struct ExtractionPayload {
    found: bool,
    subject: Option<String>,
    year: Option<i32>,
    chunk: Option<usize>,
    confidence: Option<f32>,
    justification: Option<String>,
}

#[async_trait]
impl ClaimExtractor for CohereClient {
    async fn extract(
        &self,
        person: &Person,
        spec: &ClaimSpec,
        evidence: &[CorpusChunk],
    ) -> Result<ExtractOutcome> {
        if evidence.is_empty() {
            return Ok(ExtractOutcome::NotFound);
        }
        let prompt = extraction_prompt(person, spec, evidence);
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };
        let response: ChatResponse = self.post("extract", "/v2/chat", &request).await?;
        let raw: String = response
            .message
            .content
            .into_iter()
            .map(|part| part.text)
            .collect();
        Ok(parse_extraction(&raw, evidence))
    }
}

/// Build the extraction prompt: the claim to establish, the person, and
/// the numbered evidence chunks, with a strict JSON output contract.
fn extraction_prompt(person: &Person, spec: &ClaimSpec, evidence: &[CorpusChunk]) -> String {
    let mut prompt = format!(
        "You are verifying a biographical claim about {person}.\n\
         Claim to establish: {}\n\n\
         Evidence chunks:\n",
        spec.description
    );
    for (position, chunk) in evidence.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", position + 1, chunk.chunk.text));
    }
    prompt.push_str(
        "\nAnswer with a single JSON object and nothing else:\n\
         {\"found\": bool, \"subject\": string or null, \"year\": integer or null, \
         \"chunk\": evidence number the claim was drawn from, \
         \"confidence\": number 0 to 1, \"justification\": string}\n\
         Only report what the evidence states about this specific person. \
         If the evidence does not support the claim, return {\"found\": false}.",
    );
    prompt
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse model output into an outcome.
///
/// Anything that fails to parse, or that cannot be traced back to one of
/// the supplied evidence chunks, is a not-found outcome; extraction never
/// fails a run on bad model output.
fn parse_extraction(raw: &str, evidence: &[CorpusChunk]) -> ExtractOutcome {
    let payload: ExtractionPayload = match serde_json::from_str(strip_code_fences(raw)) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, raw, "unparseable extraction output treated as not found");
            return ExtractOutcome::NotFound;
        }
    };
    if !payload.found {
        return ExtractOutcome::NotFound;
    }
    let Some(subject) = payload.subject.filter(|subject| !subject.trim().is_empty()) else {
        tracing::warn!(raw, "extraction claimed found without a subject");
        return ExtractOutcome::NotFound;
    };
    // Chunk numbers are 1-based in the prompt.
    let source = payload
        .chunk
        .and_then(|number| number.checked_sub(1))
        .and_then(|index| evidence.get(index));
    let Some(source) = source else {
        tracing::warn!(raw, "extraction cited no traceable evidence chunk");
        return ExtractOutcome::NotFound;
    };

    ExtractOutcome::Found(ClaimInstance {
        value: ClaimValue::new(subject, payload.year),
        chunk_id: source.chunk.id,
        document_id: source.document.id,
        domain: source.document.domain.clone(),
        evidence_text: source.chunk.text.clone(),
        confidence: payload.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        justification: payload.justification.unwrap_or_default(),
    })
}
