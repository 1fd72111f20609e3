//! Writer and reader for [`FileRecord`]s. Content sync into `files_fts` is
//! handled entirely by the schema triggers (see `schema.rs`); this module
//! only ever touches the primary `files` table, plus one explicit
//! belt-and-braces delete on `delete_file`.

use crate::coordinator::Store;
use crate::error::{classify_write_error, Result};
use crate::fts::{build_fts_query, snippet_expr, DEFAULT_SNIPPET_ELLIPSIS_TOKENS};
use crate::model::{FileRecord, LexicalFileMatch};
use rusqlite::{params, OptionalExtension};

const SELECT_FILE_COLUMNS: &str = "path, language, module_path, is_test, line_count, code_line_count, \
     comment_line_count, blank_line_count, size_bytes, content_hash, last_modified, indexed_at, content";

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        language: row.get(1)?,
        module_path: row.get(2)?,
        is_test: row.get::<_, i64>(3)? != 0,
        line_count: row.get(4)?,
        code_line_count: row.get(5)?,
        comment_line_count: row.get(6)?,
        blank_line_count: row.get(7)?,
        size_bytes: row.get(8)?,
        content_hash: row.get(9)?,
        last_modified: row.get(10)?,
        indexed_at: row.get(11)?,
        content: row.get(12)?,
    })
}

/// Upserts a file by path, replacing any existing row in full.
pub fn write_file(store: &Store, file: &FileRecord) -> Result<()> {
    store.with_conn(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO files
                (path, language, module_path, is_test, line_count, code_line_count,
                 comment_line_count, blank_line_count, size_bytes, content_hash,
                 last_modified, indexed_at, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                file.path,
                file.language,
                file.module_path,
                file.is_test as i64,
                file.line_count,
                file.code_line_count,
                file.comment_line_count,
                file.blank_line_count,
                file.size_bytes,
                file.content_hash,
                file.last_modified,
                file.indexed_at,
                file.content,
            ],
        )
        .map_err(|e| classify_write_error(e, "File", file.path.clone()))?;
        Ok(())
    })
}

/// Upserts every file in one transaction using a single prepared statement.
pub fn write_file_stats_batch(store: &Store, files: &[FileRecord]) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }
    store.with_txn(|conn| {
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO files
                (path, language, module_path, is_test, line_count, code_line_count,
                 comment_line_count, blank_line_count, size_bytes, content_hash,
                 last_modified, indexed_at, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for file in files {
            stmt.execute(params![
                file.path,
                file.language,
                file.module_path,
                file.is_test as i64,
                file.line_count,
                file.code_line_count,
                file.comment_line_count,
                file.blank_line_count,
                file.size_bytes,
                file.content_hash,
                file.last_modified,
                file.indexed_at,
                file.content,
            ])
            .map_err(|e| classify_write_error(e, "File", file.path.clone()))?;
        }
        tracing::debug!(count = files.len(), "batch-wrote file stats");
        Ok(())
    })
}

/// Deletes a file; cascades to every dependent row. The lexical row is also
/// deleted explicitly, belt-and-braces, alongside the cascade/trigger path.
pub fn delete_file(store: &Store, path: &str) -> Result<()> {
    store.with_txn(|conn| {
        conn.execute("DELETE FROM files_fts WHERE path = ?1", [path])?;
        conn.execute("DELETE FROM files WHERE path = ?1", [path])?;
        Ok(())
    })
}

pub fn get_file_by_path(store: &Store, path: &str) -> Result<Option<FileRecord>> {
    store.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {SELECT_FILE_COLUMNS} FROM files WHERE path = ?1"),
            [path],
            row_to_file,
        )
        .optional()
        .map_err(Into::into)
    })
}

pub fn get_files_by_language(store: &Store, language: &str) -> Result<Vec<FileRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_FILE_COLUMNS} FROM files WHERE language = ?1 ORDER BY path"
        ))?;
        let rows = stmt
            .query_map([language], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_files_by_module(store: &Store, module_path: &str) -> Result<Vec<FileRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_FILE_COLUMNS} FROM files WHERE module_path = ?1 ORDER BY path"
        ))?;
        let rows = stmt
            .query_map([module_path], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lexical search over file content, joined to the primary row, ordered by
/// descending BM25 score.
pub fn search_file_content(store: &Store, query: &str, limit: usize) -> Result<Vec<LexicalFileMatch>> {
    store.with_conn(|conn| {
        let sql = format!(
            "SELECT f.{cols}, bm25(files_fts) as rank, {snippet}
             FROM files_fts
             JOIN files f ON f.path = files_fts.path
             WHERE files_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
            cols = SELECT_FILE_COLUMNS.split(", ").collect::<Vec<_>>().join(", f."),
            snippet = snippet_expr("files_fts", 1, DEFAULT_SNIPPET_ELLIPSIS_TOKENS),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![build_fts_query(query, false), limit as i64], |row| {
                let file = row_to_file(row)?;
                let raw_rank: f64 = row.get(13)?;
                let snippet: String = row.get(14)?;
                Ok((file, -raw_rank, snippet))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(file, bm25_score, snippet)| LexicalFileMatch {
                file,
                bm25_score,
                snippet,
            })
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now_iso8601;

    fn sample(path: &str, module: &str, content: Option<&str>) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            language: Some("rust".to_string()),
            module_path: module.to_string(),
            is_test: false,
            line_count: 10,
            code_line_count: 8,
            comment_line_count: 1,
            blank_line_count: 1,
            size_bytes: 128,
            content_hash: "deadbeef".to_string(),
            last_modified: now_iso8601(),
            indexed_at: now_iso8601(),
            content: content.map(str::to_string),
        }
    }

    #[test]
    fn write_and_read_round_trips() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &sample("a.rs", "pkg", Some("fn main() {}"))).unwrap();
        let got = get_file_by_path(&store, "a.rs").unwrap().unwrap();
        assert_eq!(got.module_path, "pkg");
        assert_eq!(got.content.as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn binary_file_has_no_lexical_row() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &sample("bin.dat", "pkg", None)).unwrap();
        let hits = search_file_content(&store, "anything", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn text_file_is_searchable() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &sample("a.rs", "pkg", Some("fn parse_tree() {}"))).unwrap();
        let hits = search_file_content(&store, "parse_tree", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file.path, "a.rs");
    }

    #[test]
    fn delete_cascades_and_clears_lexical_row() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &sample("a.rs", "pkg", Some("hello"))).unwrap();
        delete_file(&store, "a.rs").unwrap();
        assert!(get_file_by_path(&store, "a.rs").unwrap().is_none());
        assert!(search_file_content(&store, "hello", 10).unwrap().is_empty());
    }

    #[test]
    fn batch_write_inserts_all_files_in_one_transaction() {
        let store = Store::open_in_memory().unwrap();
        write_file_stats_batch(
            &store,
            &[sample("a.rs", "pkg", None), sample("b.rs", "pkg", None)],
        )
        .unwrap();
        assert!(get_file_by_path(&store, "a.rs").unwrap().is_some());
        assert!(get_file_by_path(&store, "b.rs").unwrap().is_some());
    }
}
