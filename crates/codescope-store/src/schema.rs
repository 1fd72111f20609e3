//! Schema creation and forward-only migration.
//!
//! Non-virtual tables and indexes are created inside a single transaction.
//! Virtual tables (FTS5, the `vec0` ANN index) and triggers are created
//! outside that transaction — SQLite refuses `CREATE VIRTUAL TABLE` inside an
//! explicit transaction alongside ordinary DDL in some builds, so the two
//! steps are kept separate here rather than relying on that working.

use crate::error::{Result, StoreError};
use rusqlite::Connection;

pub const SCHEMA_VERSION: &str = "2.1";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

const CORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    language TEXT,
    module_path TEXT NOT NULL,
    is_test INTEGER NOT NULL,
    line_count INTEGER NOT NULL,
    code_line_count INTEGER NOT NULL,
    comment_line_count INTEGER NOT NULL,
    blank_line_count INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    content TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_module ON files(module_path);
CREATE INDEX IF NOT EXISTS idx_files_language ON files(language);

CREATE TABLE IF NOT EXISTS types (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
    module_path TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL DEFAULT 0,
    end_line INTEGER NOT NULL DEFAULT 0,
    start_pos INTEGER NOT NULL DEFAULT 0,
    end_pos INTEGER NOT NULL DEFAULT 0,
    is_exported INTEGER NOT NULL,
    field_count INTEGER NOT NULL DEFAULT 0,
    method_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_types_file ON types(file_path);
CREATE INDEX IF NOT EXISTS idx_types_module ON types(module_path);

CREATE TABLE IF NOT EXISTS type_fields (
    id TEXT PRIMARY KEY,
    type_id TEXT NOT NULL REFERENCES types(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    field_type TEXT NOT NULL,
    position INTEGER NOT NULL,
    is_method INTEGER NOT NULL,
    is_exported INTEGER NOT NULL,
    param_count INTEGER,
    return_count INTEGER
);
CREATE INDEX IF NOT EXISTS idx_type_fields_type ON type_fields(type_id);

CREATE TABLE IF NOT EXISTS functions (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
    module_path TEXT NOT NULL,
    name TEXT NOT NULL,
    start_line INTEGER NOT NULL DEFAULT 0,
    end_line INTEGER NOT NULL DEFAULT 0,
    start_pos INTEGER NOT NULL DEFAULT 0,
    end_pos INTEGER NOT NULL DEFAULT 0,
    line_count INTEGER NOT NULL,
    is_exported INTEGER NOT NULL,
    is_method INTEGER NOT NULL,
    receiver_type_id TEXT REFERENCES types(id) ON DELETE SET NULL,
    receiver_type_name TEXT,
    param_count INTEGER NOT NULL,
    return_count INTEGER NOT NULL,
    cyclomatic_complexity INTEGER
);
CREATE INDEX IF NOT EXISTS idx_functions_file ON functions(file_path);
CREATE INDEX IF NOT EXISTS idx_functions_module ON functions(module_path);
CREATE INDEX IF NOT EXISTS idx_functions_receiver ON functions(receiver_type_id);

CREATE TABLE IF NOT EXISTS function_parameters (
    function_id TEXT NOT NULL REFERENCES functions(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT,
    type_name TEXT NOT NULL,
    is_return INTEGER NOT NULL,
    is_variadic INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_function_parameters_function ON function_parameters(function_id);

CREATE TABLE IF NOT EXISTS imports (
    file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
    path TEXT NOT NULL,
    is_std INTEGER NOT NULL,
    is_external INTEGER NOT NULL,
    is_relative INTEGER NOT NULL,
    decl_line INTEGER NOT NULL,
    UNIQUE(file_path, path)
);
CREATE INDEX IF NOT EXISTS idx_imports_file ON imports(file_path);

CREATE TABLE IF NOT EXISTS type_relationships (
    from_type_id TEXT NOT NULL REFERENCES types(id) ON DELETE CASCADE,
    to_type_id TEXT NOT NULL REFERENCES types(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    source_file TEXT,
    source_line INTEGER,
    UNIQUE(from_type_id, to_type_id, kind)
);
CREATE INDEX IF NOT EXISTS idx_type_relationships_from ON type_relationships(from_type_id);
CREATE INDEX IF NOT EXISTS idx_type_relationships_to ON type_relationships(to_type_id);

CREATE TABLE IF NOT EXISTS function_calls (
    caller_id TEXT NOT NULL REFERENCES functions(id) ON DELETE CASCADE,
    callee_id TEXT REFERENCES functions(id) ON DELETE SET NULL,
    callee_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line INTEGER NOT NULL,
    column INTEGER
);
CREATE INDEX IF NOT EXISTS idx_function_calls_caller ON function_calls(caller_id);
CREATE INDEX IF NOT EXISTS idx_function_calls_callee ON function_calls(callee_id);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
    chunk_type TEXT NOT NULL,
    title TEXT,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    start_line INTEGER,
    end_line INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path);
CREATE INDEX IF NOT EXISTS idx_chunks_type ON chunks(chunk_type);

CREATE TABLE IF NOT EXISTS module_rollups (
    module_path TEXT PRIMARY KEY,
    file_count INTEGER NOT NULL,
    test_file_count INTEGER NOT NULL,
    line_count INTEGER NOT NULL,
    type_count INTEGER NOT NULL,
    exported_type_count INTEGER NOT NULL,
    function_count INTEGER NOT NULL,
    exported_function_count INTEGER NOT NULL,
    import_count INTEGER NOT NULL,
    external_import_count INTEGER NOT NULL,
    depth INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const FILE_FTS_TRIGGERS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(path UNINDEXED, content);

CREATE TRIGGER IF NOT EXISTS files_fts_ai AFTER INSERT ON files BEGIN
    DELETE FROM files_fts WHERE path = new.path;
    INSERT INTO files_fts(path, content) SELECT new.path, new.content WHERE new.content IS NOT NULL;
END;

CREATE TRIGGER IF NOT EXISTS files_fts_au AFTER UPDATE OF content ON files BEGIN
    DELETE FROM files_fts WHERE path = old.path;
    INSERT INTO files_fts(path, content) SELECT new.path, new.content WHERE new.content IS NOT NULL;
END;

CREATE TRIGGER IF NOT EXISTS files_fts_ad AFTER DELETE ON files WHEN old.content IS NOT NULL BEGIN
    DELETE FROM files_fts WHERE path = old.path;
END;
"#;

const CHUNK_FTS: &str = "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(chunk_id UNINDEXED, text);";

/// Creates every non-virtual table/index in one transaction, then the two
/// virtual tables and the file-content sync triggers outside of it, then
/// bootstraps `cache_metadata`. Safe to call on an already-initialized
/// database (every statement is `IF NOT EXISTS`).
pub fn init_schema(conn: &Connection, embedding_dimension: usize) -> Result<()> {
    conn.execute_batch(&format!("BEGIN IMMEDIATE;\n{CORE_SCHEMA}\nCOMMIT;"))?;

    conn.execute_batch(FILE_FTS_TRIGGERS)?;
    conn.execute_batch(CHUNK_FTS)?;
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_vec USING vec0(chunk_id INTEGER PRIMARY KEY, embedding float[{embedding_dimension}]);"
    ))?;

    bootstrap_metadata(conn, embedding_dimension)?;
    Ok(())
}

fn bootstrap_metadata(conn: &Connection, embedding_dimension: usize) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_metadata(key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO cache_metadata(key, value) VALUES ('branch', 'main')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO cache_metadata(key, value) VALUES ('last_indexed', '')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO cache_metadata(key, value) VALUES ('embedding_dimensions', ?1)",
        [embedding_dimension.to_string()],
    )?;
    Ok(())
}

/// Reads `schema_version` from `cache_metadata`, or `None` if the schema has
/// never been bootstrapped.
pub fn read_schema_version(conn: &Connection) -> Result<Option<String>> {
    use rusqlite::OptionalExtension;
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM cache_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}

/// Reads the configured embedding dimension from `cache_metadata`.
pub fn read_embedding_dimension(conn: &Connection) -> Result<usize> {
    let value: String = conn.query_row(
        "SELECT value FROM cache_metadata WHERE key = 'embedding_dimensions'",
        [],
        |row| row.get(0),
    )?;
    value
        .parse()
        .map_err(|_| StoreError::SchemaVersionUnsupported {
            found: format!("embedding_dimensions={value}"),
            expected: "a positive integer".to_string(),
        })
}

/// Applies the forward-only migration from schema 2.0 to 2.1: adds
/// `start_pos`/`end_pos` to `types`/`functions` (defaulting to 0), adds a
/// nullable `content` column to `files`, and installs the file-content FTS
/// triggers. No-op (and safe to call again) once the database is at 2.1.
pub fn migrate(conn: &Connection, embedding_dimension: usize) -> Result<()> {
    let version = match read_schema_version(conn)? {
        None => {
            init_schema(conn, embedding_dimension)?;
            return Ok(());
        }
        Some(v) => v,
    };

    if version == SCHEMA_VERSION {
        return Ok(());
    }

    if version != "2.0" {
        return Err(StoreError::SchemaVersionUnsupported {
            found: version,
            expected: SCHEMA_VERSION.to_string(),
        });
    }

    conn.execute_batch("BEGIN IMMEDIATE;")?;
    let result = (|| -> Result<()> {
        add_column_if_missing(conn, "types", "start_pos", "INTEGER NOT NULL DEFAULT 0")?;
        add_column_if_missing(conn, "types", "end_pos", "INTEGER NOT NULL DEFAULT 0")?;
        add_column_if_missing(conn, "functions", "start_pos", "INTEGER NOT NULL DEFAULT 0")?;
        add_column_if_missing(conn, "functions", "end_pos", "INTEGER NOT NULL DEFAULT 0")?;
        add_column_if_missing(conn, "files", "content", "TEXT")?;
        conn.execute(
            "UPDATE cache_metadata SET value = ?1 WHERE key = 'schema_version'",
            [SCHEMA_VERSION],
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")?;
            conn.execute_batch(FILE_FTS_TRIGGERS)?;
            tracing::info!("migrated schema from 2.0 to {SCHEMA_VERSION}");
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

fn add_column_if_missing(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<_, _>>()?;
    if existing.iter().any(|c| c == column) {
        return Ok(());
    }
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl};"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, DEFAULT_EMBEDDING_DIMENSION).unwrap();
        init_schema(&conn, DEFAULT_EMBEDDING_DIMENSION).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap().as_deref(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn bootstrap_sets_reserved_keys() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 128).unwrap();
        assert_eq!(read_embedding_dimension(&conn).unwrap(), 128);
        let branch: String = conn
            .query_row("SELECT value FROM cache_metadata WHERE key = 'branch'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(branch, "main");
    }
}
