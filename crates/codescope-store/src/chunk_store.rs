//! Writer and reader for semantic [`ChunkRecord`]s, coordinating the primary
//! table, the lexical `chunks_fts` mirror, and the `chunks_vec` ANN index in
//! a single transaction so the three projections never drift apart.

use crate::codec::{deserialize_embedding_ctx, serialize_embedding};
use crate::coordinator::Store;
use crate::error::{classify_write_error, Result};
use crate::fts::{build_fts_query, snippet_expr, DEFAULT_SNIPPET_ELLIPSIS_TOKENS};
use crate::model::{ChunkRecord, LexicalChunkMatch, NewChunk};
use crate::time::now_iso8601;
use crate::vector_index;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<ChunkRecord> {
    let embedding_bytes: Vec<u8> = row.get(5)?;
    let embedding = deserialize_embedding_ctx(&embedding_bytes, "chunk").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Blob, Box::new(e))
    })?;
    Ok(ChunkRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        chunk_type: row.get(2)?,
        title: row.get(3)?,
        text: row.get(4)?,
        embedding,
        start_line: row.get(6)?,
        end_line: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const SELECT_CHUNK_COLUMNS: &str =
    "id, file_path, chunk_type, title, text, embedding, start_line, end_line, created_at, updated_at";

fn insert_chunk(conn: &Connection, chunk: &NewChunk, now: &str) -> Result<i64> {
    let embedding_bytes = serialize_embedding(&chunk.embedding);
    conn.execute(
        "INSERT INTO chunks (file_path, chunk_type, title, text, embedding, start_line, end_line, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            chunk.file_path,
            chunk.chunk_type,
            chunk.title,
            chunk.text,
            embedding_bytes,
            zero_to_null(chunk.start_line),
            zero_to_null(chunk.end_line),
            now,
            now,
        ],
    )
    .map_err(|e| classify_write_error(e, "Chunk", chunk.file_path.clone()))?;
    let id = conn.last_insert_rowid();
    vector_index::upsert(conn, id, &chunk.embedding)?;
    conn.execute(
        "INSERT INTO chunks_fts(chunk_id, text) VALUES (?1, ?2)",
        params![id, chunk.text],
    )?;
    Ok(id)
}

fn zero_to_null(line: Option<i64>) -> Option<i64> {
    match line {
        Some(0) => None,
        other => other,
    }
}

/// Replaces every chunk in the store with `chunks`, in one transaction:
/// primary rows, vector index, and lexical mirror are all deleted then
/// rebuilt together. Empty input is a no-op.
pub fn write_chunks(store: &Store, chunks: &[NewChunk]) -> Result<Vec<i64>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    let now = now_iso8601();
    store.with_txn(|conn| {
        conn.execute_batch(
            "DELETE FROM chunks; DELETE FROM chunks_vec; DELETE FROM chunks_fts;",
        )?;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ids.push(insert_chunk(conn, chunk, &now)?);
        }
        tracing::debug!(count = chunks.len(), "replaced all chunks");
        Ok(ids)
    })
}

/// Replaces chunks belonging to the files mentioned in `chunks`, leaving
/// chunks of every other file untouched.
pub fn write_chunks_incremental(store: &Store, chunks: &[NewChunk]) -> Result<Vec<i64>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    let now = now_iso8601();
    let touched_files: BTreeSet<&str> = chunks.iter().map(|c| c.file_path.as_str()).collect();

    store.with_txn(|conn| {
        for file_path in &touched_files {
            let existing_ids: Vec<i64> = {
                let mut stmt = conn.prepare("SELECT id FROM chunks WHERE file_path = ?1")?;
                stmt.query_map([file_path], |row| row.get(0))?
                    .collect::<std::result::Result<_, _>>()?
            };
            for id in existing_ids {
                vector_index::delete(conn, id)?;
                conn.execute("DELETE FROM chunks_fts WHERE chunk_id = ?1", [id])?;
            }
            conn.execute("DELETE FROM chunks WHERE file_path = ?1", [file_path])?;
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ids.push(insert_chunk(conn, chunk, &now)?);
        }
        tracing::debug!(
            files = touched_files.len(),
            count = chunks.len(),
            "incrementally replaced chunks"
        );
        Ok(ids)
    })
}

/// Equality filters applied alongside an `id IN (...)` restriction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkFilter {
    pub chunk_type: Option<String>,
    pub file_path: Option<String>,
}

/// Loads chunk rows whose id is in `ids` and which satisfy every set field
/// of `filter`, in a single query. Row order is unspecified — callers doing
/// similarity search reorder by the distance they already have.
pub fn get_chunks_by_ids_filtered(store: &Store, ids: &[i64], filter: &ChunkFilter) -> Result<Vec<ChunkRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    store.with_conn(|conn| {
        let placeholders: String = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let mut sql = format!("SELECT {SELECT_CHUNK_COLUMNS} FROM chunks WHERE id IN ({placeholders})");
        if filter.chunk_type.is_some() {
            sql.push_str(" AND chunk_type = ?");
        }
        if filter.file_path.is_some() {
            sql.push_str(" AND file_path = ?");
        }
        let mut stmt = conn.prepare(&sql)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
        if let Some(ct) = &filter.chunk_type {
            bound.push(ct);
        }
        if let Some(fp) = &filter.file_path {
            bound.push(fp);
        }
        let rows = stmt
            .query_map(bound.as_slice(), row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_chunks_by_ids(store: &Store, ids: &[i64]) -> Result<Vec<ChunkRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    store.with_conn(|conn| {
        let placeholders: String = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT {SELECT_CHUNK_COLUMNS} FROM chunks WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let bound: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
        let rows = stmt
            .query_map(bound.as_slice(), row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_all_chunks(store: &Store) -> Result<Vec<ChunkRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {SELECT_CHUNK_COLUMNS} FROM chunks"))?;
        let rows = stmt
            .query_map([], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Chunks belonging to `file_path`, ordered by start line.
pub fn get_chunks_by_file(store: &Store, file_path: &str) -> Result<Vec<ChunkRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_CHUNK_COLUMNS} FROM chunks WHERE file_path = ?1 ORDER BY start_line"
        ))?;
        let rows = stmt
            .query_map([file_path], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Chunks of a given `chunk_type`, ordered by file path then start line.
pub fn get_chunks_by_type(store: &Store, chunk_type: &str) -> Result<Vec<ChunkRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_CHUNK_COLUMNS} FROM chunks WHERE chunk_type = ?1 ORDER BY file_path, start_line"
        ))?;
        let rows = stmt
            .query_map([chunk_type], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_chunk(store: &Store, id: i64) -> Result<Option<ChunkRecord>> {
    store.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {SELECT_CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
            [id],
            row_to_chunk,
        )
        .optional()
        .map_err(Into::into)
    })
}

/// Lexical search over chunk text: BM25 match, joined back to primary rows,
/// ordered by descending score (higher is better), with a highlighted
/// snippet per match.
pub fn query_fts(store: &Store, query: &str, limit: usize) -> Result<Vec<LexicalChunkMatch>> {
    query_fts_with_ellipsis(store, query, limit, DEFAULT_SNIPPET_ELLIPSIS_TOKENS)
}

pub fn query_fts_with_ellipsis(
    store: &Store,
    query: &str,
    limit: usize,
    ellipsis_tokens: i32,
) -> Result<Vec<LexicalChunkMatch>> {
    store.with_conn(|conn| {
        let sql = format!(
            "SELECT c.{cols}, bm25(chunks_fts) as rank, {snippet}
             FROM chunks_fts
             JOIN chunks c ON c.id = chunks_fts.chunk_id
             WHERE chunks_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
            cols = SELECT_CHUNK_COLUMNS
                .split(", ")
                .collect::<Vec<_>>()
                .join(", c."),
            snippet = snippet_expr("chunks_fts", 1, ellipsis_tokens),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![build_fts_query(query, false), limit as i64], |row| {
                let chunk = row_to_chunk(row)?;
                // bm25() is negative-is-better in SQLite's FTS5; expose the
                // flipped sign so callers can treat "higher is better"
                // uniformly regardless of backend convention.
                let raw_rank: f64 = row.get(10)?;
                let snippet: String = row.get(11)?;
                Ok((chunk, -raw_rank, snippet))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(chunk, bm25_score, snippet)| LexicalChunkMatch {
                chunk,
                bm25_score,
                snippet,
            })
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(file_path: &str, text: &str) -> NewChunk {
        NewChunk {
            file_path: file_path.to_string(),
            chunk_type: "function".to_string(),
            title: Some("f".to_string()),
            text: text.to_string(),
            embedding: vec![0.1, 0.2, 0.3],
            start_line: Some(1),
            end_line: Some(10),
        }
    }

    fn store_with_files(paths: &[&str]) -> Store {
        let store = Store::open_in_memory_with_dimension(3).unwrap();
        for p in paths {
            crate::file_store::write_file(
                &store,
                &crate::model::FileRecord {
                    path: p.to_string(),
                    language: Some("rust".to_string()),
                    module_path: "pkg".to_string(),
                    is_test: false,
                    line_count: 10,
                    code_line_count: 8,
                    comment_line_count: 1,
                    blank_line_count: 1,
                    size_bytes: 100,
                    content_hash: "abc".to_string(),
                    last_modified: now_iso8601(),
                    indexed_at: now_iso8601(),
                    content: Some("fn f() {}".to_string()),
                },
            )
            .unwrap();
        }
        store
    }

    #[test]
    fn write_chunks_replaces_all_and_projects_coherently() {
        let store = store_with_files(&["a.rs", "b.rs"]);
        let ids = write_chunks(&store, &[sample("a.rs", "hello world"), sample("b.rs", "goodbye world")]).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(get_all_chunks(&store).unwrap().len(), 2);

        let ids2 = write_chunks(&store, &[sample("a.rs", "only one now")]).unwrap();
        assert_eq!(ids2.len(), 1);
        assert_eq!(get_all_chunks(&store).unwrap().len(), 1);
    }

    #[test]
    fn write_chunks_empty_is_noop() {
        let store = store_with_files(&["a.rs"]);
        write_chunks(&store, &[sample("a.rs", "one")]).unwrap();
        let ids = write_chunks(&store, &[]).unwrap();
        assert!(ids.is_empty());
        assert_eq!(get_all_chunks(&store).unwrap().len(), 1);
    }

    #[test]
    fn incremental_write_preserves_other_files_chunks() {
        let store = store_with_files(&["a.rs", "b.rs"]);
        write_chunks(&store, &[sample("a.rs", "alpha"), sample("b.rs", "beta")]).unwrap();
        write_chunks_incremental(&store, &[sample("a.rs", "alpha updated")]).unwrap();

        let a_chunks = get_chunks_by_file(&store, "a.rs").unwrap();
        let b_chunks = get_chunks_by_file(&store, "b.rs").unwrap();
        assert_eq!(a_chunks.len(), 1);
        assert_eq!(a_chunks[0].text, "alpha updated");
        assert_eq!(b_chunks.len(), 1);
        assert_eq!(b_chunks[0].text, "beta");
    }

    #[test]
    fn fts_search_finds_matching_chunk_text() {
        let store = store_with_files(&["a.rs"]);
        write_chunks(&store, &[sample("a.rs", "parses an abstract syntax tree")]).unwrap();
        let hits = query_fts(&store, "abstract AND syntax", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("<mark>"));
    }

    #[test]
    fn zero_line_bounds_are_stored_as_null() {
        let store = store_with_files(&["a.rs"]);
        let mut chunk = sample("a.rs", "whole file chunk");
        chunk.start_line = Some(0);
        chunk.end_line = Some(0);
        write_chunks(&store, &[chunk]).unwrap();
        let c = &get_all_chunks(&store).unwrap()[0];
        assert_eq!(c.start_line, None);
        assert_eq!(c.end_line, None);
    }
}
