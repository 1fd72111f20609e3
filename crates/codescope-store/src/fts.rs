//! Lexical query dialect helpers shared by the file and chunk FTS indices.
//!
//! The dialect is FTS5's own: implicit AND between bare terms, double-quoted
//! phrases, explicit `AND`/`OR`/`NOT`, and a trailing `*` for prefix matches.

/// Wraps `input` for use as an FTS5 `MATCH` argument.
///
/// When `is_phrase` is true, the whole input is treated as one literal phrase
/// (internal `"` doubled, then the result quoted). When false, the input is
/// passed through as-is so callers can use the full query dialect (bare
/// terms, `AND`/`OR`/`NOT`, prefix `*`) directly.
pub fn build_fts_query(input: &str, is_phrase: bool) -> String {
    if is_phrase {
        format!("\"{}\"", input.replace('"', "\"\""))
    } else {
        input.to_string()
    }
}

pub(crate) const DEFAULT_SNIPPET_ELLIPSIS_TOKENS: i32 = 32;

/// Builds a `snippet()` SQL expression for an FTS5 match, highlighting hits
/// with `<mark>...</mark>` and truncating to `ellipsis_tokens` tokens around
/// the match, column `col`.
pub(crate) fn snippet_expr(table: &str, col: i32, ellipsis_tokens: i32) -> String {
    format!("snippet({table}, {col}, '<mark>', '</mark>', '...', {ellipsis_tokens})")
}
