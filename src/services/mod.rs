// ContextDiff Core Services

pub mod analysis;
pub mod config_store;
pub mod providers;
pub mod text_processor;

pub use config_store::*;
pub use providers::*;
pub use text_processor::*;

// Re-export the analysis pipeline surface
pub use analysis::{
    cache_key,
    maybe_short_circuit,
    pair_chunks,
    similarity_ratio,
    split_into_chunks,
    CacheStats,
    DiffEngine,
    EngineError,
    InvokeError,
    ModelInvoker,
    RateLimiter,
    ResponseCache,
};
