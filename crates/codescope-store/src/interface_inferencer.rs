//! Whole-store structural typing pass: matches interface method sets
//! against struct method sets to derive `implements` edges, and resolves
//! embedded (anonymous) fields to derive `embeds` edges.
//!
//! Three phases, as the design mandates: Load (read every interface/struct
//! and their members in bulk), Match (pure in-memory signature comparison),
//! Write (one transaction, delete-then-bulk-insert).

use crate::coordinator::Store;
use crate::error::Result;
use crate::graph_store::insert_relationship;
use crate::model::{RelationshipKind, TypeKind, TypeRelationshipRecord};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceReport {
    pub implements_written: usize,
    pub embeds_written: usize,
    pub edges_filtered: usize,
}

/// Method signature reduced to the coarse shape the store compares:
/// parameter count and return count. Intentionally ignores parameter and
/// return types.
type Signature = (i64, i64);

struct LoadedType {
    module_path: String,
}

fn load_types_by_kind(store: &Store, kind: TypeKind) -> Result<HashMap<String, LoadedType>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT id, module_path FROM types WHERE kind = ?1")?;
        let rows = stmt
            .query_map([kind.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    LoadedType {
                        module_path: row.get(1)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().collect())
    })
}

fn load_interface_method_signatures(store: &Store) -> Result<HashMap<String, HashMap<String, Signature>>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tf.type_id, tf.name, COALESCE(tf.param_count, 0), COALESCE(tf.return_count, 0)
             FROM type_fields tf
             JOIN types t ON t.id = tf.type_id
             WHERE t.kind = 'interface' AND tf.is_method = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut map: HashMap<String, HashMap<String, Signature>> = HashMap::new();
        for row in rows {
            let (type_id, name, param_count, return_count) = row?;
            map.entry(type_id).or_default().insert(name, (param_count, return_count));
        }
        Ok(map)
    })
}

fn load_struct_method_signatures(store: &Store) -> Result<HashMap<String, HashMap<String, Signature>>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT receiver_type_id, name, param_count, return_count
             FROM functions
             WHERE is_method = 1 AND receiver_type_id IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut map: HashMap<String, HashMap<String, Signature>> = HashMap::new();
        for row in rows {
            let (receiver_type_id, name, param_count, return_count) = row?;
            map.entry(receiver_type_id).or_default().insert(name, (param_count, return_count));
        }
        Ok(map)
    })
}

struct EmbeddedField {
    owning_type_id: String,
    owning_module: String,
    field_type: String,
}

fn load_embedded_fields(store: &Store) -> Result<Vec<EmbeddedField>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tf.type_id, t.module_path, tf.field_type
             FROM type_fields tf
             JOIN types t ON t.id = tf.type_id
             WHERE tf.name = '' AND tf.is_method = 0",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EmbeddedField {
                    owning_type_id: row.get(0)?,
                    owning_module: row.get(1)?,
                    field_type: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Resolves an embedded field's bare type name to a full type id, following
/// the producer's `{module}::{name}` identifier convention: an already
/// qualified name (contains `::`) is used as-is, otherwise it's scoped to
/// the embedding type's own module.
fn resolve_embedded_type_id(owning_module: &str, field_type: &str) -> String {
    if field_type.contains("::") {
        field_type.to_string()
    } else {
        format!("{owning_module}::{field_type}")
    }
}

/// Runs the full Load/Match/Write pipeline, overwriting every existing
/// `implements`/`embeds` relationship with the freshly computed set.
/// Whole-store and idempotent: re-running with no intervening writes
/// produces the identical edge set.
pub fn infer_implementations(store: &Store) -> Result<InferenceReport> {
    let interfaces = load_types_by_kind(store, TypeKind::Interface)?;
    let structs = load_types_by_kind(store, TypeKind::Struct)?;
    let interface_sigs = load_interface_method_signatures(store)?;
    let struct_sigs = load_struct_method_signatures(store)?;
    let embedded_fields = load_embedded_fields(store)?;

    let mut edges = Vec::new();

    for (interface_id, _) in &interfaces {
        let required = interface_sigs.get(interface_id).cloned().unwrap_or_default();
        for (struct_id, _) in &structs {
            let provided = struct_sigs.get(struct_id);
            let satisfies = required.iter().all(|(name, sig)| {
                provided.and_then(|m| m.get(name)).is_some_and(|found| found == sig)
            });
            if satisfies {
                edges.push(TypeRelationshipRecord {
                    from_type_id: struct_id.clone(),
                    to_type_id: interface_id.clone(),
                    kind: RelationshipKind::Implements,
                    source_file: None,
                    source_line: None,
                });
            }
        }
    }

    let all_type_ids: std::collections::HashSet<&String> =
        interfaces.keys().chain(structs.keys()).collect();

    for field in &embedded_fields {
        let target = resolve_embedded_type_id(&field.owning_module, &field.field_type);
        if all_type_ids.contains(&target) {
            edges.push(TypeRelationshipRecord {
                from_type_id: field.owning_type_id.clone(),
                to_type_id: target,
                kind: RelationshipKind::Embeds,
                source_file: None,
                source_line: None,
            });
        }
    }

    store.with_txn(|conn| {
        conn.execute_batch(
            "DELETE FROM type_relationships WHERE kind = 'implements' OR kind = 'embeds';",
        )?;

        let mut implements_written = 0;
        let mut embeds_written = 0;
        let mut edges_filtered = 0;

        for edge in &edges {
            let written = insert_relationship(conn, edge)?;
            match (written, edge.kind) {
                (true, RelationshipKind::Implements) => implements_written += 1,
                (true, RelationshipKind::Embeds) => embeds_written += 1,
                (false, _) => edges_filtered += 1,
                _ => {}
            }
        }

        tracing::info!(implements_written, embeds_written, edges_filtered, "inferred interface implementations");

        Ok(InferenceReport {
            implements_written,
            embeds_written,
            edges_filtered,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::write_file;
    use crate::graph_store::{get_relationships_from, write_graph_data};
    use crate::model::{FileRecord, FunctionRecord, TypeFieldRecord, TypeRecord};
    use crate::time::now_iso8601;

    fn file(store: &Store, path: &str) {
        write_file(
            store,
            &FileRecord {
                path: path.to_string(),
                language: Some("go".to_string()),
                module_path: "pkg".to_string(),
                is_test: false,
                line_count: 10,
                code_line_count: 8,
                comment_line_count: 1,
                blank_line_count: 1,
                size_bytes: 10,
                content_hash: "h".to_string(),
                last_modified: now_iso8601(),
                indexed_at: now_iso8601(),
                content: None,
            },
        )
        .unwrap();
    }

    fn typ(id: &str, kind: TypeKind) -> TypeRecord {
        TypeRecord {
            id: id.to_string(),
            file_path: "a.rs".to_string(),
            module_path: "pkg".to_string(),
            name: id.to_string(),
            kind,
            start_line: 1,
            end_line: 5,
            start_pos: 0,
            end_pos: 10,
            is_exported: true,
            field_count: 0,
            method_count: 0,
        }
    }

    fn method(id: &str, receiver: &str, params: i64, returns: i64) -> FunctionRecord {
        FunctionRecord {
            id: id.to_string(),
            file_path: "a.rs".to_string(),
            module_path: "pkg".to_string(),
            name: id.rsplit('.').next().unwrap().to_string(),
            start_line: 1,
            end_line: 2,
            start_pos: 0,
            end_pos: 10,
            line_count: 2,
            is_exported: true,
            is_method: true,
            receiver_type_id: Some(receiver.to_string()),
            receiver_type_name: Some(receiver.to_string()),
            param_count: params,
            return_count: returns,
            cyclomatic_complexity: Some(1),
        }
    }

    fn interface_method(type_id: &str, name: &str, params: i64, returns: i64) -> TypeFieldRecord {
        TypeFieldRecord {
            id: format!("{type_id}.{name}"),
            type_id: type_id.to_string(),
            name: name.to_string(),
            field_type: String::new(),
            position: 0,
            is_method: true,
            is_exported: true,
            param_count: Some(params),
            return_count: Some(returns),
        }
    }

    #[test]
    fn struct_implementing_interface_is_detected() {
        let store = Store::open_in_memory().unwrap();
        file(&store, "a.rs");
        let types = vec![typ("pkg::Reader", TypeKind::Interface), typ("pkg::File", TypeKind::Struct)];
        let fields = vec![interface_method("pkg::Reader", "Read", 1, 2)];
        let functions = vec![method("pkg::File.Read", "pkg::File", 1, 2)];
        write_graph_data(&store, &types, &fields, &functions, &[], &[], &[]).unwrap();

        let report = infer_implementations(&store).unwrap();
        assert_eq!(report.implements_written, 1);
        let rels = get_relationships_from(&store, "pkg::File").unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].to_type_id, "pkg::Reader");
    }

    #[test]
    fn struct_with_mismatched_signature_does_not_implement() {
        let store = Store::open_in_memory().unwrap();
        file(&store, "a.rs");
        let types = vec![typ("pkg::Reader", TypeKind::Interface), typ("pkg::Bad", TypeKind::Struct)];
        let fields = vec![interface_method("pkg::Reader", "Read", 1, 2)];
        let functions = vec![method("pkg::Bad.Read", "pkg::Bad", 0, 2)];
        write_graph_data(&store, &types, &fields, &functions, &[], &[], &[]).unwrap();

        let report = infer_implementations(&store).unwrap();
        assert_eq!(report.implements_written, 0);
        assert!(get_relationships_from(&store, "pkg::Bad").unwrap().is_empty());
    }

    #[test]
    fn empty_interface_matches_every_struct() {
        let store = Store::open_in_memory().unwrap();
        file(&store, "a.rs");
        let types = vec![typ("pkg::Any", TypeKind::Interface), typ("pkg::Thing", TypeKind::Struct)];
        write_graph_data(&store, &types, &[], &[], &[], &[], &[]).unwrap();

        let report = infer_implementations(&store).unwrap();
        assert_eq!(report.implements_written, 1);
    }

    #[test]
    fn inference_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        file(&store, "a.rs");
        let types = vec![typ("pkg::Reader", TypeKind::Interface), typ("pkg::File", TypeKind::Struct)];
        let fields = vec![interface_method("pkg::Reader", "Read", 1, 2)];
        let functions = vec![method("pkg::File.Read", "pkg::File", 1, 2)];
        write_graph_data(&store, &types, &fields, &functions, &[], &[], &[]).unwrap();

        infer_implementations(&store).unwrap();
        let first = get_relationships_from(&store, "pkg::File").unwrap();
        infer_implementations(&store).unwrap();
        let second = get_relationships_from(&store, "pkg::File").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn embedded_field_resolves_to_embeds_edge() {
        let store = Store::open_in_memory().unwrap();
        file(&store, "a.rs");
        let types = vec![typ("pkg::Base", TypeKind::Struct), typ("pkg::Derived", TypeKind::Struct)];
        let fields = vec![TypeFieldRecord {
            id: "pkg::Derived.0".to_string(),
            type_id: "pkg::Derived".to_string(),
            name: String::new(),
            field_type: "Base".to_string(),
            position: 0,
            is_method: false,
            is_exported: true,
            param_count: None,
            return_count: None,
        }];
        write_graph_data(&store, &types, &fields, &[], &[], &[], &[]).unwrap();

        infer_implementations(&store).unwrap();
        let rels = get_relationships_from(&store, "pkg::Derived").unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].kind, RelationshipKind::Embeds);
        assert_eq!(rels[0].to_type_id, "pkg::Base");
    }
}
