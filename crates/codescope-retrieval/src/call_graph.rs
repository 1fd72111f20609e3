//! In-memory call graph, rebuilt from the `function_calls` table on demand.
//! Calls whose callee could not be resolved to a known function (`callee_id
//! IS NULL`) carry no edge here — they're still visible via the raw
//! `function_calls` rows in the storage crate, just not traversable.

use anyhow::Result;
use codescope_store::graph_store::get_all_calls;
use codescope_store::Store;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// One function's position in the call graph: which functions it calls, and
/// which functions call it. Both lists hold function ids, not indices —
/// the graph is small enough per repository that a hash-map arena keyed by
/// id is simpler than an index-based one and avoids a separate id table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallGraphNode {
    pub callees: Vec<String>,
    pub callers: Vec<String>,
}

/// Builds the full call graph from storage. Unresolved calls (no
/// `callee_id`) are dropped; every function that appears as either a caller
/// or a resolved callee gets a node, even if one of its two adjacency lists
/// is empty.
pub fn build_call_graph(store: &Store) -> Result<HashMap<String, CallGraphNode>> {
    let calls = get_all_calls(store)?;
    let mut graph: HashMap<String, CallGraphNode> = HashMap::new();

    for call in calls {
        let Some(callee_id) = call.callee_id else {
            continue;
        };
        graph.entry(call.caller_id.clone()).or_default().callees.push(callee_id.clone());
        graph.entry(callee_id).or_default().callers.push(call.caller_id);
    }

    Ok(graph)
}

fn bounded_traverse(
    graph: &HashMap<String, CallGraphNode>,
    start: &str,
    max_depth: usize,
    neighbors: impl Fn(&CallGraphNode) -> &[String],
) -> Vec<String> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());
    let mut frontier: VecDeque<(String, usize)> = VecDeque::new();
    frontier.push_back((start.to_string(), 0));
    let mut found = Vec::new();

    while let Some((current, depth)) = frontier.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(node) = graph.get(&current) else {
            continue;
        };
        for next in neighbors(node) {
            if visited.insert(next.clone()) {
                found.push(next.clone());
                frontier.push_back((next.clone(), depth + 1));
            }
        }
    }

    found
}

/// Every function that calls `target`, directly or transitively, up to
/// `max_depth` hops, excluding `target` itself.
pub fn find_all_callers(store: &Store, target: &str, max_depth: usize) -> Result<Vec<String>> {
    let graph = build_call_graph(store)?;
    Ok(bounded_traverse(&graph, target, max_depth, |n| &n.callers))
}

/// Every function reachable from `target` by following calls, up to
/// `max_depth` hops, excluding `target` itself.
pub fn find_all_callees(store: &Store, target: &str, max_depth: usize) -> Result<Vec<String>> {
    let graph = build_call_graph(store)?;
    Ok(bounded_traverse(&graph, target, max_depth, |n| &n.callees))
}
