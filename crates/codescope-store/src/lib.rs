//! Unified code-intelligence storage engine: file and module statistics, a
//! code-structure graph, a semantic chunk store with dense embeddings, and a
//! lexical full-text index, all living in one SQLite-family database with
//! coordinated transactional writers.

pub mod chunk_store;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod file_store;
pub mod fts;
pub mod graph_store;
pub mod interface_inferencer;
pub mod model;
pub mod module_store;
pub mod schema;
pub mod time;
pub mod vector_index;

pub use coordinator::Store;
pub use error::{Result, StoreError};
pub use model::*;
