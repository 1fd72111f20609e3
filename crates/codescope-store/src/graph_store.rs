//! Writer and reader for the code-structure graph: types, their fields,
//! functions, parameters, imports, and the two kinds of edges
//! (`type_relationships`, `function_calls`).

use crate::coordinator::Store;
use crate::error::{classify_write_error, Result};
use crate::model::{
    FunctionCallRecord, FunctionParameterRecord, FunctionRecord, ImportRecord, RelationshipKind,
    TypeFieldRecord, TypeKind, TypeRecord, TypeRelationshipRecord,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Outcome of a full graph rebuild: nodes are inserted unconditionally,
/// edges are filtered out (and counted, not fatal) when they reference a
/// type or function absent from this batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphWriteReport {
    pub types_written: usize,
    pub type_fields_written: usize,
    pub functions_written: usize,
    pub function_parameters_written: usize,
    pub relationships_written: usize,
    pub relationships_filtered: usize,
    pub calls_written: usize,
    pub calls_filtered: usize,
}

fn insert_type(conn: &Connection, t: &TypeRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO types (id, file_path, module_path, name, kind, start_line, end_line,
                             start_pos, end_pos, is_exported, field_count, method_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            t.id,
            t.file_path,
            t.module_path,
            t.name,
            t.kind.as_str(),
            t.start_line,
            t.end_line,
            t.start_pos,
            t.end_pos,
            t.is_exported as i64,
            t.field_count,
            t.method_count,
        ],
    )
    .map_err(|e| classify_write_error(e, "Type", t.id.clone()))?;
    Ok(())
}

fn insert_type_field(conn: &Connection, f: &TypeFieldRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO type_fields (id, type_id, name, field_type, position, is_method,
                                   is_exported, param_count, return_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            f.id,
            f.type_id,
            f.name,
            f.field_type,
            f.position,
            f.is_method as i64,
            f.is_exported as i64,
            f.param_count,
            f.return_count,
        ],
    )
    .map_err(|e| classify_write_error(e, "TypeField", f.id.clone()))?;
    Ok(())
}

fn insert_function(conn: &Connection, fun: &FunctionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO functions (id, file_path, module_path, name, start_line, end_line,
                                 start_pos, end_pos, line_count, is_exported, is_method,
                                 receiver_type_id, receiver_type_name, param_count,
                                 return_count, cyclomatic_complexity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            fun.id,
            fun.file_path,
            fun.module_path,
            fun.name,
            fun.start_line,
            fun.end_line,
            fun.start_pos,
            fun.end_pos,
            fun.line_count,
            fun.is_exported as i64,
            fun.is_method as i64,
            fun.receiver_type_id,
            fun.receiver_type_name,
            fun.param_count,
            fun.return_count,
            fun.cyclomatic_complexity,
        ],
    )
    .map_err(|e| classify_write_error(e, "Function", fun.id.clone()))?;
    Ok(())
}

fn insert_function_parameter(conn: &Connection, p: &FunctionParameterRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO function_parameters (function_id, position, name, type_name, is_return, is_variadic)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![p.function_id, p.position, p.name, p.type_name, p.is_return as i64, p.is_variadic as i64],
    )
    .map_err(|e| classify_write_error(e, "FunctionParameter", p.function_id.clone()))?;
    Ok(())
}

/// Attempts one edge insert inside a savepoint; on constraint failure, rolls
/// back just that savepoint and reports the row as filtered rather than
/// aborting the surrounding transaction.
fn try_insert_edge(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<bool> {
    conn.execute_batch("SAVEPOINT edge_insert;")?;
    match conn.execute(sql, params) {
        Ok(_) => {
            conn.execute_batch("RELEASE edge_insert;")?;
            Ok(true)
        }
        Err(e) => {
            conn.execute_batch("ROLLBACK TO edge_insert; RELEASE edge_insert;")?;
            tracing::warn!(error = %e, "dropped FK-violating graph edge during rebuild");
            Ok(false)
        }
    }
}

pub(crate) fn insert_relationship(conn: &Connection, r: &TypeRelationshipRecord) -> Result<bool> {
    try_insert_edge(
        conn,
        "INSERT INTO type_relationships (from_type_id, to_type_id, kind, source_file, source_line)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![r.from_type_id, r.to_type_id, r.kind.as_str(), r.source_file, r.source_line],
    )
}

fn insert_call(conn: &Connection, c: &FunctionCallRecord) -> Result<bool> {
    try_insert_edge(
        conn,
        "INSERT INTO function_calls (caller_id, callee_id, callee_name, file_path, line, column)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![c.caller_id, c.callee_id, c.callee_name, c.file_path, c.line, c.column],
    )
}

/// Full rebuild of the code-structure graph: the six graph tables (edges
/// first, then nodes) are truncated inside one transaction, then
/// repopulated node-first so edges can reference the nodes just inserted.
/// `imports` are not part of this rebuild — they key off `files`, not the
/// type/function graph, and are written independently (see
/// [`write_imports`]).
#[allow(clippy::too_many_arguments)]
pub fn write_graph_data(
    store: &Store,
    types: &[TypeRecord],
    type_fields: &[TypeFieldRecord],
    functions: &[FunctionRecord],
    function_parameters: &[FunctionParameterRecord],
    relationships: &[TypeRelationshipRecord],
    calls: &[FunctionCallRecord],
) -> Result<GraphWriteReport> {
    store.with_txn(|conn| {
        conn.execute_batch(
            "DELETE FROM type_relationships;
             DELETE FROM function_calls;
             DELETE FROM function_parameters;
             DELETE FROM type_fields;
             DELETE FROM functions;
             DELETE FROM types;",
        )?;

        for t in types {
            insert_type(conn, t)?;
        }
        for f in type_fields {
            insert_type_field(conn, f)?;
        }
        for fun in functions {
            insert_function(conn, fun)?;
        }
        for p in function_parameters {
            insert_function_parameter(conn, p)?;
        }

        let mut relationships_written = 0;
        let mut relationships_filtered = 0;
        for r in relationships {
            if insert_relationship(conn, r)? {
                relationships_written += 1;
            } else {
                relationships_filtered += 1;
            }
        }

        let mut calls_written = 0;
        let mut calls_filtered = 0;
        for c in calls {
            if insert_call(conn, c)? {
                calls_written += 1;
            } else {
                calls_filtered += 1;
            }
        }

        tracing::info!(
            types = types.len(),
            functions = functions.len(),
            relationships_written,
            relationships_filtered,
            calls_written,
            calls_filtered,
            "rebuilt code-structure graph"
        );

        Ok(GraphWriteReport {
            types_written: types.len(),
            type_fields_written: type_fields.len(),
            functions_written: functions.len(),
            function_parameters_written: function_parameters.len(),
            relationships_written,
            relationships_filtered,
            calls_written,
            calls_filtered,
        })
    })
}

pub fn write_imports(store: &Store, imports: &[ImportRecord]) -> Result<()> {
    if imports.is_empty() {
        return Ok(());
    }
    store.with_txn(|conn| {
        for i in imports {
            conn.execute(
                "INSERT OR REPLACE INTO imports (file_path, path, is_std, is_external, is_relative, decl_line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![i.file_path, i.path, i.is_std as i64, i.is_external as i64, i.is_relative as i64, i.decl_line],
            )
            .map_err(|e| classify_write_error(e, "Import", format!("{}:{}", i.file_path, i.path)))?;
        }
        Ok(())
    })
}

fn row_to_type(row: &rusqlite::Row) -> rusqlite::Result<TypeRecord> {
    let kind_str: String = row.get(4)?;
    let kind = TypeKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            Box::new(crate::error::StoreError::InvalidEnumValue {
                entity: "TypeKind",
                value: kind_str.clone(),
            }),
        )
    })?;
    Ok(TypeRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        module_path: row.get(2)?,
        name: row.get(3)?,
        kind,
        start_line: row.get(5)?,
        end_line: row.get(6)?,
        start_pos: row.get(7)?,
        end_pos: row.get(8)?,
        is_exported: row.get::<_, i64>(9)? != 0,
        field_count: row.get(10)?,
        method_count: row.get(11)?,
    })
}

const SELECT_TYPE_COLUMNS: &str =
    "id, file_path, module_path, name, kind, start_line, end_line, start_pos, end_pos, is_exported, field_count, method_count";

pub fn get_type(store: &Store, id: &str) -> Result<Option<TypeRecord>> {
    store.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {SELECT_TYPE_COLUMNS} FROM types WHERE id = ?1"),
            [id],
            row_to_type,
        )
        .optional()
        .map_err(Into::into)
    })
}

pub fn get_types_by_file(store: &Store, file_path: &str) -> Result<Vec<TypeRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_TYPE_COLUMNS} FROM types WHERE file_path = ?1 ORDER BY start_line"
        ))?;
        let rows = stmt
            .query_map([file_path], row_to_type)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn row_to_function(row: &rusqlite::Row) -> rusqlite::Result<FunctionRecord> {
    Ok(FunctionRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        module_path: row.get(2)?,
        name: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        start_pos: row.get(6)?,
        end_pos: row.get(7)?,
        line_count: row.get(8)?,
        is_exported: row.get::<_, i64>(9)? != 0,
        is_method: row.get::<_, i64>(10)? != 0,
        receiver_type_id: row.get(11)?,
        receiver_type_name: row.get(12)?,
        param_count: row.get(13)?,
        return_count: row.get(14)?,
        cyclomatic_complexity: row.get(15)?,
    })
}

const SELECT_FUNCTION_COLUMNS: &str = "id, file_path, module_path, name, start_line, end_line, start_pos, \
     end_pos, line_count, is_exported, is_method, receiver_type_id, receiver_type_name, param_count, \
     return_count, cyclomatic_complexity";

pub fn get_function(store: &Store, id: &str) -> Result<Option<FunctionRecord>> {
    store.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {SELECT_FUNCTION_COLUMNS} FROM functions WHERE id = ?1"),
            [id],
            row_to_function,
        )
        .optional()
        .map_err(Into::into)
    })
}

pub fn get_functions_by_file(store: &Store, file_path: &str) -> Result<Vec<FunctionRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_FUNCTION_COLUMNS} FROM functions WHERE file_path = ?1 ORDER BY start_line"
        ))?;
        let rows = stmt
            .query_map([file_path], row_to_function)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_functions_by_receiver(store: &Store, receiver_type_id: &str) -> Result<Vec<FunctionRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_FUNCTION_COLUMNS} FROM functions WHERE receiver_type_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt
            .query_map([receiver_type_id], row_to_function)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_type_fields(store: &Store, type_id: &str) -> Result<Vec<TypeFieldRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, type_id, name, field_type, position, is_method, is_exported, param_count, return_count
             FROM type_fields WHERE type_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map([type_id], |row| {
                Ok(TypeFieldRecord {
                    id: row.get(0)?,
                    type_id: row.get(1)?,
                    name: row.get(2)?,
                    field_type: row.get(3)?,
                    position: row.get(4)?,
                    is_method: row.get::<_, i64>(5)? != 0,
                    is_exported: row.get::<_, i64>(6)? != 0,
                    param_count: row.get(7)?,
                    return_count: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_function_parameters(store: &Store, function_id: &str) -> Result<Vec<FunctionParameterRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT function_id, position, name, type_name, is_return, is_variadic
             FROM function_parameters WHERE function_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map([function_id], |row| {
                Ok(FunctionParameterRecord {
                    function_id: row.get(0)?,
                    position: row.get(1)?,
                    name: row.get(2)?,
                    type_name: row.get(3)?,
                    is_return: row.get::<_, i64>(4)? != 0,
                    is_variadic: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_imports_by_file(store: &Store, file_path: &str) -> Result<Vec<ImportRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT file_path, path, is_std, is_external, is_relative, decl_line
             FROM imports WHERE file_path = ?1 ORDER BY decl_line",
        )?;
        let rows = stmt
            .query_map([file_path], |row| {
                Ok(ImportRecord {
                    file_path: row.get(0)?,
                    path: row.get(1)?,
                    is_std: row.get::<_, i64>(2)? != 0,
                    is_external: row.get::<_, i64>(3)? != 0,
                    is_relative: row.get::<_, i64>(4)? != 0,
                    decl_line: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_relationships_from(store: &Store, from_type_id: &str) -> Result<Vec<TypeRelationshipRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT from_type_id, to_type_id, kind, source_file, source_line
             FROM type_relationships WHERE from_type_id = ?1",
        )?;
        let rows = stmt
            .query_map([from_type_id], row_to_relationship)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_relationships_to(store: &Store, to_type_id: &str) -> Result<Vec<TypeRelationshipRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT from_type_id, to_type_id, kind, source_file, source_line
             FROM type_relationships WHERE to_type_id = ?1",
        )?;
        let rows = stmt
            .query_map([to_type_id], row_to_relationship)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<TypeRelationshipRecord> {
    let kind_str: String = row.get(2)?;
    let kind = RelationshipKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(crate::error::StoreError::InvalidEnumValue {
                entity: "RelationshipKind",
                value: kind_str.clone(),
            }),
        )
    })?;
    Ok(TypeRelationshipRecord {
        from_type_id: row.get(0)?,
        to_type_id: row.get(1)?,
        kind,
        source_file: row.get(3)?,
        source_line: row.get(4)?,
    })
}

pub fn get_calls_from(store: &Store, caller_id: &str) -> Result<Vec<FunctionCallRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT caller_id, callee_id, callee_name, file_path, line, column
             FROM function_calls WHERE caller_id = ?1",
        )?;
        let rows = stmt
            .query_map([caller_id], row_to_call)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_all_calls(store: &Store) -> Result<Vec<FunctionCallRecord>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT caller_id, callee_id, callee_name, file_path, line, column FROM function_calls",
        )?;
        let rows = stmt
            .query_map([], row_to_call)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn row_to_call(row: &rusqlite::Row) -> rusqlite::Result<FunctionCallRecord> {
    Ok(FunctionCallRecord {
        caller_id: row.get(0)?,
        callee_id: row.get(1)?,
        callee_name: row.get(2)?,
        file_path: row.get(3)?,
        line: row.get(4)?,
        column: row.get(5)?,
    })
}
