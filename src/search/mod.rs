// Module declarations
pub mod corpus;
pub mod index_cache;
pub mod query;
pub mod scorer;
pub mod tokenizer;
pub mod types;

// Re-export public APIs
pub use corpus::{CorpusBuilder, IndexedEntry, SearchIndex};
pub use index_cache::{DEFAULT_TTL, IndexCache, IndexStatus};
pub use query::search;
pub use scorer::{BRAND_FILTERED_WEIGHTS, GLOBAL_WEIGHTS, ScoreWeights, score};
pub use tokenizer::{TokenMatch, tokenize};
pub use types::{SearchFilters, SearchResult, SearchResultType};
