//! Lexical (BM25) search over chunk text and whole-file content. Thin
//! pass-throughs to the storage crate's FTS5-backed readers; kept here so
//! callers have one place to reach for either kind of text search alongside
//! semantic search and call-graph traversal.

use anyhow::Result;
use codescope_store::model::{LexicalChunkMatch, LexicalFileMatch};
use codescope_store::Store;

pub fn search_chunks_lexical(store: &Store, query: &str, limit: usize) -> Result<Vec<LexicalChunkMatch>> {
    Ok(codescope_store::chunk_store::query_fts(store, query, limit)?)
}

pub fn search_files_lexical(store: &Store, query: &str, limit: usize) -> Result<Vec<LexicalFileMatch>> {
    Ok(codescope_store::file_store::search_file_content(store, query, limit)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescope_store::model::{FileRecord, NewChunk};
    use codescope_store::time::now_iso8601;

    fn store_with_content() -> Store {
        let store = Store::open_in_memory_with_dimension(3).unwrap();
        codescope_store::file_store::write_file(
            &store,
            &FileRecord {
                path: "lib.rs".to_string(),
                language: Some("rust".to_string()),
                module_path: "pkg".to_string(),
                is_test: false,
                line_count: 3,
                code_line_count: 3,
                comment_line_count: 0,
                blank_line_count: 0,
                size_bytes: 40,
                content_hash: "h".to_string(),
                last_modified: now_iso8601(),
                indexed_at: now_iso8601(),
                content: Some("fn widget_factory() -> Widget { todo!() }".to_string()),
            },
        )
        .unwrap();

        codescope_store::chunk_store::write_chunks(
            &store,
            &[NewChunk {
                file_path: "lib.rs".to_string(),
                chunk_type: "function".to_string(),
                title: Some("widget_factory".to_string()),
                text: "fn widget_factory() -> Widget { todo!() }".to_string(),
                embedding: vec![0.1, 0.2, 0.3],
                start_line: Some(1),
                end_line: Some(1),
            }],
        )
        .unwrap();
        store
    }

    #[test]
    fn finds_matching_chunk_and_file_content() {
        let store = store_with_content();
        let chunks = search_chunks_lexical(&store, "widget_factory", 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].snippet.contains("<mark>"));

        let files = search_files_lexical(&store, "widget_factory", 10).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file.path, "lib.rs");
    }

    #[test]
    fn no_match_returns_empty() {
        let store = store_with_content();
        assert!(search_chunks_lexical(&store, "nonexistent", 10).unwrap().is_empty());
    }
}
