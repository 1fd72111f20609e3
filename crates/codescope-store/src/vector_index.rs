//! The `chunks_vec` ANN virtual table: a `vec0` index keyed by chunk id at a
//! fixed dimension. The virtual table has no upsert; every write here is
//! delete-then-insert.

use crate::codec::serialize_embedding;
use crate::coordinator::Store;
use crate::error::{Result, StoreError};
use crate::model::ScoredChunkId;
use rusqlite::{params, Connection};

pub(crate) fn upsert(conn: &Connection, chunk_id: i64, embedding: &[f32]) -> Result<()> {
    conn.execute("DELETE FROM chunks_vec WHERE chunk_id = ?1", [chunk_id])?;
    conn.execute(
        "INSERT INTO chunks_vec(chunk_id, embedding) VALUES (?1, ?2)",
        params![chunk_id, serialize_embedding(embedding)],
    )?;
    Ok(())
}

pub(crate) fn delete(conn: &Connection, chunk_id: i64) -> Result<()> {
    conn.execute("DELETE FROM chunks_vec WHERE chunk_id = ?1", [chunk_id])?;
    Ok(())
}

/// Returns up to `k` `{chunk_id, distance}` pairs ordered by ascending
/// cosine distance to `query_embedding`.
pub fn knn(store: &Store, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunkId>> {
    let expected = store.embedding_dimension();
    if query_embedding.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            actual: query_embedding.len(),
        });
    }
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT chunk_id, distance FROM chunks_vec
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance",
        )?;
        let bytes = serialize_embedding(query_embedding);
        let rows = stmt
            .query_map(params![bytes, k as i64], |row| {
                Ok(ScoredChunkId {
                    chunk_id: row.get(0)?,
                    distance: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
