// Analysis Module
// Semantic diff pipeline organized into specialized submodules:
// - rate_limiter: per-caller token-bucket admission control
// - cache: content-hash response caching with TTL and bounded capacity
// - short_circuit: similarity gate that skips trivial comparisons
// - chunker: paragraph-aligned splitting of oversized text pairs
// - prompts: system/user prompts for the comparison model call
// - invoker: model call with retry and exponential backoff
// - parser: lenient parsing of the raw model document
// - reconciler: span verification against the literal source text
// - merger: chunk result merging with global offsets
// - engine: end-to-end orchestration

pub mod cache;
pub mod chunker;
pub mod engine;
pub mod invoker;
pub mod merger;
pub mod parser;
pub mod prompts;
pub mod rate_limiter;
pub mod reconciler;
pub mod short_circuit;

// Re-export commonly used items
pub use cache::{cache_key, CacheStats, ResponseCache};
pub use chunker::{pair_chunks, split_into_chunks, Chunk, ChunkPair};
pub use engine::{DiffEngine, EngineError};
pub use invoker::{backoff_delay, InvokeError, ModelInvoker};
pub use merger::merge_chunk_results;
pub use parser::{extract_json, level_for_risk, parse_document, ParseError};
pub use prompts::{sensitivity_description, system_prompt, user_prompt};
pub use rate_limiter::RateLimiter;
pub use reconciler::{reconcile, ReconcileStats};
pub use short_circuit::{maybe_short_circuit, similarity_ratio};
