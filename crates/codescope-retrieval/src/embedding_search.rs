//! Semantic search: overfetch candidates from the ANN index, load the
//! surviving primary rows under any caller-supplied equality filters, then
//! reorder by exact distance.

use anyhow::Result;
use codescope_store::chunk_store::{get_chunks_by_ids_filtered, ChunkFilter};
use codescope_store::vector_index::knn;
use codescope_store::{ChunkRecord, Store};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A chunk scored against a query embedding. Ascending distance: the first
/// element is the closest match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub distance: f32,
}

/// Equality filters applied to the chunk set before ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSearchFilter {
    pub chunk_type: Option<String>,
    pub file_path: Option<String>,
}

/// How many extra candidates to pull from the ANN index per requested
/// result, so that rows dropped by an equality filter still leave enough
/// candidates to fill `k`.
const OVERFETCH_FACTOR: usize = 2;

/// Finds the `k` chunks nearest `query_embedding`, optionally restricted by
/// `filter`. Pulls `2k` candidates from the vector index, loads the
/// surviving rows in one query, then sorts the (small) remaining set by
/// exact distance and truncates to `k` — an O(n log n) reorder over the
/// overfetched candidates, never a full table scan.
pub fn search_by_embedding(
    store: &Store,
    query_embedding: &[f32],
    filter: &EmbeddingSearchFilter,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let overfetch = k.saturating_mul(OVERFETCH_FACTOR).max(k);
    let candidates = knn(store, query_embedding, overfetch)?;
    if candidates.is_empty() {
        debug!("ANN index returned no candidates");
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = candidates.iter().map(|c| c.chunk_id).collect();
    let store_filter = ChunkFilter {
        chunk_type: filter.chunk_type.clone(),
        file_path: filter.file_path.clone(),
    };
    let rows = get_chunks_by_ids_filtered(store, &ids, &store_filter)?;

    let distance_by_id: HashMap<i64, f32> =
        candidates.into_iter().map(|c| (c.chunk_id, c.distance)).collect();

    let mut scored: Vec<ScoredChunk> = rows
        .into_iter()
        .filter_map(|chunk| {
            let distance = *distance_by_id.get(&chunk.id)?;
            Some(ScoredChunk { chunk, distance })
        })
        .collect();

    scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    debug!(requested = k, overfetched = ids.len(), returned = scored.len(), "semantic search complete");
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescope_store::{FileRecord, NewChunk};

    fn store_with_chunks() -> Store {
        let store = Store::open_in_memory_with_dimension(3).unwrap();
        codescope_store::file_store::write_file(
            &store,
            &FileRecord {
                path: "a.rs".to_string(),
                language: Some("rust".to_string()),
                module_path: "pkg".to_string(),
                is_test: false,
                line_count: 10,
                code_line_count: 8,
                comment_line_count: 1,
                blank_line_count: 1,
                size_bytes: 10,
                content_hash: "h".to_string(),
                last_modified: codescope_store::time::now_iso8601(),
                indexed_at: codescope_store::time::now_iso8601(),
                content: None,
            },
        )
        .unwrap();

        let chunks = vec![
            NewChunk {
                file_path: "a.rs".to_string(),
                chunk_type: "function".to_string(),
                title: Some("near".to_string()),
                text: "fn near() {}".to_string(),
                embedding: vec![1.0, 0.0, 0.0],
                start_line: Some(1),
                end_line: Some(1),
            },
            NewChunk {
                file_path: "a.rs".to_string(),
                chunk_type: "function".to_string(),
                title: Some("mid".to_string()),
                text: "fn mid() {}".to_string(),
                embedding: vec![0.7, 0.7, 0.0],
                start_line: Some(2),
                end_line: Some(2),
            },
            NewChunk {
                file_path: "a.rs".to_string(),
                chunk_type: "comment".to_string(),
                title: None,
                text: "// far".to_string(),
                embedding: vec![0.0, 1.0, 0.0],
                start_line: Some(3),
                end_line: Some(3),
            },
        ];
        codescope_store::chunk_store::write_chunks(&store, &chunks).unwrap();
        store
    }

    #[test]
    fn results_are_ordered_by_ascending_distance() {
        let store = store_with_chunks();
        let results = search_by_embedding(&store, &[1.0, 0.0, 0.0], &EmbeddingSearchFilter::default(), 3).unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert_eq!(results[0].chunk.title.as_deref(), Some("near"));
    }

    #[test]
    fn exact_match_has_near_zero_distance() {
        let store = store_with_chunks();
        let results = search_by_embedding(&store, &[1.0, 0.0, 0.0], &EmbeddingSearchFilter::default(), 1).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].distance <= 1e-2);
    }

    #[test]
    fn truncates_to_k() {
        let store = store_with_chunks();
        let results = search_by_embedding(&store, &[1.0, 0.0, 0.0], &EmbeddingSearchFilter::default(), 2).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn chunk_type_filter_excludes_other_types() {
        let store = store_with_chunks();
        let filter = EmbeddingSearchFilter {
            chunk_type: Some("comment".to_string()),
            file_path: None,
        };
        let results = search_by_embedding(&store, &[1.0, 0.0, 0.0], &filter, 3).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_type, "comment");
    }

    #[test]
    fn k_zero_returns_empty_without_querying() {
        let store = store_with_chunks();
        let results = search_by_embedding(&store, &[1.0, 0.0, 0.0], &EmbeddingSearchFilter::default(), 0).unwrap();
        assert!(results.is_empty());
    }
}
