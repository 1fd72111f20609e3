//! Module-level rollups, aggregated from `files`, `types`, `functions`, and
//! `imports`. A module's membership is exact: rows whose `module_path`
//! equals the module being aggregated (no path-prefix rollup across
//! submodules) — this keeps `aggregate_all_modules`'s "one rollup per
//! distinct module path observed in files" contract unambiguous.

use crate::coordinator::Store;
use crate::error::Result;
use crate::model::ModuleRollup;
use crate::time::now_iso8601;
use rusqlite::{params, Connection, OptionalExtension};

fn depth_of(module_path: &str) -> i64 {
    module_path.matches('/').count() as i64
}

fn aggregate_module_tx(conn: &Connection, module_path: &str, now: &str) -> Result<()> {
    let file_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM files WHERE module_path = ?1",
        [module_path],
        |r| r.get(0),
    )?;

    if file_count == 0 {
        conn.execute("DELETE FROM module_rollups WHERE module_path = ?1", [module_path])?;
        return Ok(());
    }

    let (test_file_count, line_count): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(is_test), 0), COALESCE(SUM(line_count), 0)
         FROM files WHERE module_path = ?1",
        [module_path],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let (type_count, exported_type_count): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_exported), 0) FROM types WHERE module_path = ?1",
        [module_path],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let (function_count, exported_function_count): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_exported), 0) FROM functions WHERE module_path = ?1",
        [module_path],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let (import_count, external_import_count): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(i.is_external), 0)
         FROM imports i JOIN files f ON f.path = i.file_path
         WHERE f.module_path = ?1",
        [module_path],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let rollup = ModuleRollup {
        module_path: module_path.to_string(),
        file_count,
        test_file_count,
        line_count,
        type_count,
        exported_type_count,
        function_count,
        exported_function_count,
        import_count,
        external_import_count,
        depth: depth_of(module_path),
        updated_at: now.to_string(),
    };

    conn.execute(
        "INSERT OR REPLACE INTO module_rollups
            (module_path, file_count, test_file_count, line_count, type_count,
             exported_type_count, function_count, exported_function_count,
             import_count, external_import_count, depth, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            rollup.module_path,
            rollup.file_count,
            rollup.test_file_count,
            rollup.line_count,
            rollup.type_count,
            rollup.exported_type_count,
            rollup.function_count,
            rollup.exported_function_count,
            rollup.import_count,
            rollup.external_import_count,
            rollup.depth,
            rollup.updated_at,
        ],
    )?;
    Ok(())
}

/// Recomputes (or deletes, if the module now has no files) the rollup for
/// one module. Idempotent: re-running with no intervening writes yields the
/// same counts.
pub fn aggregate_module(store: &Store, module_path: &str) -> Result<()> {
    let now = now_iso8601();
    store.with_txn(|conn| aggregate_module_tx(conn, module_path, &now))
}

/// Clears every rollup in one transaction, then recomputes one per distinct
/// module path observed in `files`, each in its own transaction.
pub fn aggregate_all_modules(store: &Store) -> Result<usize> {
    store.with_txn(|conn| {
        conn.execute("DELETE FROM module_rollups", [])?;
        Ok(())
    })?;

    let modules: Vec<String> = store.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT module_path FROM files")?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    for module_path in &modules {
        aggregate_module(store, module_path)?;
    }
    tracing::info!(modules = modules.len(), "aggregated all modules");
    Ok(modules.len())
}

pub fn get_module_rollup(store: &Store, module_path: &str) -> Result<Option<ModuleRollup>> {
    store.with_conn(|conn| {
        conn.query_row(
            "SELECT module_path, file_count, test_file_count, line_count, type_count,
                    exported_type_count, function_count, exported_function_count,
                    import_count, external_import_count, depth, updated_at
             FROM module_rollups WHERE module_path = ?1",
            [module_path],
            |row| {
                Ok(ModuleRollup {
                    module_path: row.get(0)?,
                    file_count: row.get(1)?,
                    test_file_count: row.get(2)?,
                    line_count: row.get(3)?,
                    type_count: row.get(4)?,
                    exported_type_count: row.get(5)?,
                    function_count: row.get(6)?,
                    exported_function_count: row.get(7)?,
                    import_count: row.get(8)?,
                    external_import_count: row.get(9)?,
                    depth: row.get(10)?,
                    updated_at: row.get(11)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::write_file;
    use crate::model::FileRecord;

    fn file(path: &str, module: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            language: Some("rust".to_string()),
            module_path: module.to_string(),
            is_test: false,
            line_count: 10,
            code_line_count: 8,
            comment_line_count: 1,
            blank_line_count: 1,
            size_bytes: 50,
            content_hash: "h".to_string(),
            last_modified: now_iso8601(),
            indexed_at: now_iso8601(),
            content: None,
        }
    }

    #[test]
    fn depth_counts_path_separators() {
        assert_eq!(depth_of("pkg"), 0);
        assert_eq!(depth_of("pkg/sub"), 1);
        assert_eq!(depth_of("pkg/sub/leaf"), 2);
    }

    #[test]
    fn aggregate_module_computes_totals() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &file("a.rs", "pkg/sub")).unwrap();
        write_file(&store, &file("b.rs", "pkg/sub")).unwrap();
        aggregate_module(&store, "pkg/sub").unwrap();
        let rollup = get_module_rollup(&store, "pkg/sub").unwrap().unwrap();
        assert_eq!(rollup.file_count, 2);
        assert_eq!(rollup.line_count, 20);
        assert_eq!(rollup.depth, 1);
    }

    #[test]
    fn aggregate_module_deletes_rollup_when_module_empty() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &file("a.rs", "pkg")).unwrap();
        aggregate_module(&store, "pkg").unwrap();
        assert!(get_module_rollup(&store, "pkg").unwrap().is_some());

        crate::file_store::delete_file(&store, "a.rs").unwrap();
        aggregate_module(&store, "pkg").unwrap();
        assert!(get_module_rollup(&store, "pkg").unwrap().is_none());
    }

    #[test]
    fn aggregate_module_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &file("a.rs", "pkg")).unwrap();
        aggregate_module(&store, "pkg").unwrap();
        let first = get_module_rollup(&store, "pkg").unwrap().unwrap();
        aggregate_module(&store, "pkg").unwrap();
        let second = get_module_rollup(&store, "pkg").unwrap().unwrap();
        assert_eq!(first.file_count, second.file_count);
        assert_eq!(first.line_count, second.line_count);
    }

    #[test]
    fn aggregate_all_modules_covers_every_distinct_module() {
        let store = Store::open_in_memory().unwrap();
        write_file(&store, &file("a.rs", "pkg/a")).unwrap();
        write_file(&store, &file("b.rs", "pkg/b")).unwrap();
        let n = aggregate_all_modules(&store).unwrap();
        assert_eq!(n, 2);
        assert!(get_module_rollup(&store, "pkg/a").unwrap().is_some());
        assert!(get_module_rollup(&store, "pkg/b").unwrap().is_some());
    }
}
