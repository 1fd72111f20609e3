//! Hybrid retrieval over a `codescope-store` database: semantic (embedding)
//! search, lexical (BM25) search, and in-memory call-graph traversal.

pub mod call_graph;
pub mod embedding_search;
pub mod lexical;

pub use call_graph::{build_call_graph, find_all_callees, find_all_callers, CallGraphNode};
pub use embedding_search::{search_by_embedding, EmbeddingSearchFilter, ScoredChunk};
pub use lexical::{search_chunks_lexical, search_files_lexical};
