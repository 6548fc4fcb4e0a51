// Analysis Engine
// End-to-end pipeline: admission, cache, short-circuit, chunked concurrent
// model dispatch, span reconciliation, merge, cache store

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::cache::ResponseCache;
use super::chunker::{pair_chunks, Chunk, ChunkPair};
use super::invoker::{InvokeError, ModelInvoker};
use super::merger::merge_chunk_results;
use super::parser::{self, ParseError};
use super::prompts;
use super::rate_limiter::RateLimiter;
use super::reconciler;
use super::short_circuit::maybe_short_circuit;
use crate::models::{CompareRequest, DiffResponse, RateLimitStatus, SensitivityLevel};
use crate::services::config_store::EngineConfig;
use crate::services::providers::get_api_key;
use crate::services::text_processor::{sanitize_text, validate_length};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    AdmissionDenied { retry_after_secs: u64 },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("model capability unavailable: {0}")]
    Unavailable(String),
    #[error("model call failed: {0}")]
    Model(#[from] InvokeError),
    #[error("model returned an unusable response: {0}")]
    ResponseInvalid(String),
    #[error("analysis timed out after {0}s")]
    Timeout(u64),
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> Self {
        Self::ResponseInvalid(err.to_string())
    }
}

impl EngineError {
    /// HTTP status the transport layer should surface for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AdmissionDenied { .. } => 429,
            Self::Validation(_) => 400,
            Self::Unavailable(_) => 503,
            Self::Model(err) => {
                if err.upstream_status().is_some() {
                    502
                } else {
                    500
                }
            }
            Self::ResponseInvalid(_) => 500,
            Self::Timeout(_) => 504,
        }
    }
}

/// Semantic difference analysis engine.
///
/// Owns the model invoker for its own lifetime and holds handles to the
/// process-scoped cache and rate limiter, which outlive any one engine
/// and are shared across concurrent requests.
pub struct DiffEngine {
    config: EngineConfig,
    invoker: Arc<ModelInvoker>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
}

impl DiffEngine {
    /// Build an engine with its own cache and rate limiter. Fails when no
    /// API key is configured for the model capability.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let api_key = get_api_key("openai")
            .ok_or_else(|| EngineError::Unavailable("API key not configured".to_string()))?;
        let cache = Arc::new(ResponseCache::new(
            config.cache_ttl_secs,
            config.cache_capacity,
        ));
        let limiter = Arc::new(RateLimiter::new(
            config.requests_per_window,
            config.window_secs,
            config.burst,
            config.bucket_idle_secs,
        ));
        Ok(Self::with_stores(config, api_key, cache, limiter))
    }

    /// Build an engine around externally owned stores. This is the
    /// composition point for a process that shares one cache and one
    /// limiter across several engines or with its transport layer.
    pub fn with_stores(
        config: EngineConfig,
        api_key: String,
        cache: Arc<ResponseCache>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        info!(
            "[ENGINE] initialized: default_model={} premium_model={}",
            config.default_model, config.premium_model
        );
        let invoker = Arc::new(ModelInvoker::new(&config, api_key));
        Self {
            config,
            invoker,
            cache,
            limiter,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Remaining admission budget for one caller (for response headers).
    pub fn rate_limit_status(&self, caller_id: &str) -> RateLimitStatus {
        self.limiter.status(caller_id)
    }

    /// Verify the model capability is reachable.
    pub async fn health_check(&self) -> bool {
        self.invoker.health_check(&self.config.default_model).await
    }

    /// Analyze semantic differences between the request's two texts.
    ///
    /// The whole pipeline runs under the request timeout. Identical
    /// requests within the cache TTL return byte-identical responses and
    /// trigger exactly one model invocation.
    pub async fn analyze_diff(
        &self,
        caller_id: &str,
        request: &CompareRequest,
    ) -> Result<DiffResponse, EngineError> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        match tokio::time::timeout(timeout, self.run_pipeline(caller_id, request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("[ENGINE] request timed out after {}s", timeout.as_secs());
                Err(EngineError::Timeout(timeout.as_secs()))
            }
        }
    }

    async fn run_pipeline(
        &self,
        caller_id: &str,
        request: &CompareRequest,
    ) -> Result<DiffResponse, EngineError> {
        // Admission
        if !self.limiter.admit(caller_id, 1) {
            return Err(EngineError::AdmissionDenied {
                retry_after_secs: self.limiter.retry_after_secs(caller_id, 1),
            });
        }

        // Sanitize both texts so the model, the reconciler, and the client
        // all see the same byte offsets
        let original = sanitize_text(&request.original_text);
        let generated = sanitize_text(&request.generated_text);

        if original.is_empty() || generated.is_empty() {
            return Err(EngineError::Validation(
                "original_text and generated_text must be non-empty".to_string(),
            ));
        }
        validate_length(&original, self.config.max_text_chars).map_err(EngineError::Validation)?;
        validate_length(&generated, self.config.max_text_chars).map_err(EngineError::Validation)?;

        let sensitivity = request.sensitivity;
        let model = if request.premium_mode {
            self.config.premium_model.clone()
        } else {
            self.config.default_model.clone()
        };

        info!(
            "[ENGINE] analysis start: sensitivity={} original_len={} generated_len={} model={}",
            sensitivity.as_str(),
            original.len(),
            generated.len(),
            model
        );

        // Cache
        if let Some(cached) = self.cache.get(&original, &generated, sensitivity.as_str()) {
            info!("[ENGINE] returning cached response");
            return Ok(cached);
        }

        // Short-circuit near-identical inputs without a model call
        if let Some(response) =
            maybe_short_circuit(&original, &generated, self.config.short_circuit_threshold)
        {
            self.cache
                .put(&original, &generated, sensitivity.as_str(), response.clone());
            return Ok(response);
        }

        let combined_chars = original.chars().count() + generated.chars().count();
        let response = if combined_chars > self.config.chunk_threshold_chars {
            let pairs = pair_chunks(&original, &generated, self.config.max_chunk_chars);
            info!("[ENGINE] chunked analysis: {} chunk pairs", pairs.len());
            self.analyze_chunked(&model, sensitivity, &pairs).await?
        } else {
            let pair = ChunkPair {
                original: Chunk {
                    text: original.clone(),
                    offset: 0,
                },
                generated: Chunk {
                    text: generated.clone(),
                    offset: 0,
                },
            };
            analyze_chunk(
                Arc::clone(&self.invoker),
                model,
                Arc::new(prompts::system_prompt(sensitivity)),
                pair,
                self.config.safety_threshold,
                None,
            )
            .await?
        };

        self.cache
            .put(&original, &generated, sensitivity.as_str(), response.clone());

        info!(
            "[ENGINE] analysis complete: risk_score={} change_level={:?} changes={}",
            response.summary.risk_score,
            response.summary.semantic_change_level,
            response.changes.len()
        );

        Ok(response)
    }

    /// Dispatch chunk pairs as concurrent tasks bounded by the semaphore,
    /// then merge results in input order (not completion order).
    async fn analyze_chunked(
        &self,
        model: &str,
        sensitivity: SensitivityLevel,
        pairs: &[ChunkPair],
    ) -> Result<DiffResponse, EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chunks.max(1)));
        let system_prompt = Arc::new(prompts::system_prompt(sensitivity));
        let mut join_set: JoinSet<(usize, Result<DiffResponse, EngineError>)> = JoinSet::new();
        let mut dispatched = 0usize;

        for (index, pair) in pairs.iter().enumerate() {
            if pair.is_empty() {
                continue;
            }
            dispatched += 1;

            let invoker = Arc::clone(&self.invoker);
            let semaphore = Arc::clone(&semaphore);
            let system_prompt = Arc::clone(&system_prompt);
            let model = model.to_string();
            let pair = pair.clone();
            let safety_threshold = self.config.safety_threshold;

            join_set.spawn(async move {
                let result = analyze_chunk(
                    invoker,
                    model,
                    system_prompt,
                    pair,
                    safety_threshold,
                    Some(semaphore),
                )
                .await;
                (index, result)
            });
        }

        let mut results: Vec<Option<DiffResponse>> = Vec::with_capacity(pairs.len());
        results.resize_with(pairs.len(), || None);
        let mut failures = 0usize;
        let mut last_err: Option<EngineError> = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(response))) => results[index] = Some(response),
                Ok((index, Err(err))) => {
                    // One failed chunk degrades to an empty result instead
                    // of failing the whole request
                    warn!("[ENGINE] chunk {} failed: {}", index, err);
                    failures += 1;
                    last_err = Some(err);
                }
                Err(join_err) => {
                    warn!("[ENGINE] chunk task panicked: {}", join_err);
                    failures += 1;
                }
            }
        }

        // Every chunk failing means the model is effectively down; surface
        // the terminal error instead of fabricating a clean verdict
        if dispatched > 0 && failures == dispatched {
            return Err(last_err
                .unwrap_or_else(|| EngineError::ResponseInvalid("all chunks failed".to_string())));
        }

        let ordered: Vec<DiffResponse> = results
            .into_iter()
            .map(|r| r.unwrap_or_else(DiffResponse::no_changes))
            .collect();

        Ok(merge_chunk_results(
            ordered,
            pairs,
            self.config.safety_threshold,
        ))
    }
}

/// Analyze one chunk pair: prompt, invoke, parse, reconcile, finalize.
/// The semaphore permit is held only for the model call itself.
async fn analyze_chunk(
    invoker: Arc<ModelInvoker>,
    model: String,
    system_prompt: Arc<String>,
    pair: ChunkPair,
    safety_threshold: u8,
    semaphore: Option<Arc<Semaphore>>,
) -> Result<DiffResponse, EngineError> {
    let user_prompt = prompts::user_prompt(&pair.original.text, &pair.generated.text);

    let raw = match semaphore {
        Some(semaphore) => {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| EngineError::Unavailable("dispatcher shut down".to_string()))?;
            invoker.analyze(&model, &system_prompt, &user_prompt).await?
        }
        None => invoker.analyze(&model, &system_prompt, &user_prompt).await?,
    };

    let mut doc = parser::parse_document(&raw)?;
    let stats = reconciler::reconcile(&mut doc, &pair.original.text, &pair.generated.text);
    if stats.removed > 0 {
        info!(
            "[ENGINE] chunk at offset {} dropped {} unverifiable changes",
            pair.original.offset, stats.removed
        );
    }

    Ok(parser::finalize(doc, safety_threshold))
}
