//! Row shapes shared by writers and readers, plus the plain producer-input
//! structs that the parser/embedder boundary hands to this crate. The
//! producers themselves (parsing, embedding) are out of scope here; only the
//! shape of what they write is.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: Option<String>,
    pub module_path: String,
    pub is_test: bool,
    pub line_count: i64,
    pub code_line_count: i64,
    pub comment_line_count: i64,
    pub blank_line_count: i64,
    pub size_bytes: i64,
    pub content_hash: String,
    pub last_modified: String,
    pub indexed_at: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeKind {
    Interface,
    Struct,
    Class,
    Enum,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Interface => "interface",
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
            TypeKind::Enum => "enum",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "interface" => Some(TypeKind::Interface),
            "struct" => Some(TypeKind::Struct),
            "class" => Some(TypeKind::Class),
            "enum" => Some(TypeKind::Enum),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub id: String,
    pub file_path: String,
    pub module_path: String,
    pub name: String,
    pub kind: TypeKind,
    pub start_line: i64,
    pub end_line: i64,
    pub start_pos: i64,
    pub end_pos: i64,
    pub is_exported: bool,
    pub field_count: i64,
    pub method_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeFieldRecord {
    pub id: String,
    pub type_id: String,
    /// Empty for embedded fields.
    pub name: String,
    pub field_type: String,
    pub position: i64,
    pub is_method: bool,
    pub is_exported: bool,
    pub param_count: Option<i64>,
    pub return_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub file_path: String,
    pub module_path: String,
    pub name: String,
    pub start_line: i64,
    pub end_line: i64,
    pub start_pos: i64,
    pub end_pos: i64,
    pub line_count: i64,
    pub is_exported: bool,
    pub is_method: bool,
    pub receiver_type_id: Option<String>,
    pub receiver_type_name: Option<String>,
    pub param_count: i64,
    pub return_count: i64,
    pub cyclomatic_complexity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameterRecord {
    pub function_id: String,
    pub position: i64,
    pub name: Option<String>,
    pub type_name: String,
    pub is_return: bool,
    pub is_variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub file_path: String,
    pub path: String,
    pub is_std: bool,
    pub is_external: bool,
    pub is_relative: bool,
    pub decl_line: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    Implements,
    Embeds,
    Extends,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Implements => "implements",
            RelationshipKind::Embeds => "embeds",
            RelationshipKind::Extends => "extends",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "implements" => Some(RelationshipKind::Implements),
            "embeds" => Some(RelationshipKind::Embeds),
            "extends" => Some(RelationshipKind::Extends),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRelationshipRecord {
    pub from_type_id: String,
    pub to_type_id: String,
    pub kind: RelationshipKind,
    pub source_file: Option<String>,
    pub source_line: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRecord {
    pub caller_id: String,
    pub callee_id: Option<String>,
    pub callee_name: String,
    pub file_path: String,
    pub line: i64,
    pub column: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: i64,
    pub file_path: String,
    pub chunk_type: String,
    pub title: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input shape for a new chunk; the id is assigned by the store on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub file_path: String,
    pub chunk_type: String,
    pub title: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRollup {
    pub module_path: String,
    pub file_count: i64,
    pub test_file_count: i64,
    pub line_count: i64,
    pub type_count: i64,
    pub exported_type_count: i64,
    pub function_count: i64,
    pub exported_function_count: i64,
    pub import_count: i64,
    pub external_import_count: i64,
    pub depth: i64,
    pub updated_at: String,
}

/// A KNN match: chunk id plus ascending cosine distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunkId {
    pub chunk_id: i64,
    pub distance: f32,
}

/// A lexical match: chunk row plus BM25 score (higher is better) and snippet.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalChunkMatch {
    pub chunk: ChunkRecord,
    pub bm25_score: f64,
    pub snippet: String,
}

/// A lexical match over file content.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalFileMatch {
    pub file: FileRecord,
    pub bm25_score: f64,
    pub snippet: String,
}
