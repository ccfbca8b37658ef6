//! Dependency resolution via Kahn's topological sort.
//!
//! Discovery step 7: order modules so every dependency registers before
//! its dependents. The zero-in-degree frontier is kept in a min-heap so
//! the resulting order is deterministic regardless of input order.

use apcore_module::DependencyInfo;
use apcore_types::{ErrorKind, ModuleError};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::warn;

/// Resolves module load order.
///
/// # Errors
///
/// - `MODULE_LOAD_ERROR` when a *required* dependency is not among the
///   known ids (missing optional dependencies are skipped with a
///   warning and contribute no edge);
/// - `CIRCULAR_DEPENDENCY` with an extracted cycle path when the graph
///   has a cycle.
pub fn resolve_dependencies(
    modules: &[(String, Vec<DependencyInfo>)],
    known_ids: &HashSet<String>,
) -> Result<Vec<String>, ModuleError> {
    if modules.is_empty() {
        return Ok(Vec::new());
    }

    // dep -> dependents, plus in-degree per module.
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> =
        modules.iter().map(|(id, _)| (id.as_str(), 0)).collect();

    for (module_id, deps) in modules {
        for dep in deps {
            if !known_ids.contains(&dep.module_id) {
                if dep.optional {
                    warn!(
                        %module_id,
                        dependency = %dep.module_id,
                        "optional dependency not found, skipping"
                    );
                    continue;
                }
                return Err(ErrorKind::ModuleLoad {
                    module_id: module_id.clone(),
                    reason: format!("required dependency '{}' not found", dep.module_id),
                }
                .into());
            }
            dependents
                .entry(dep.module_id.as_str())
                .or_default()
                .push(module_id.as_str());
            *in_degree.entry(module_id.as_str()).or_insert(0) += 1;
        }
    }

    // Min-heap keeps the emission order deterministic.
    let mut ready: BinaryHeap<Reverse<&str>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut load_order = Vec::with_capacity(modules.len());
    while let Some(Reverse(module_id)) = ready.pop() {
        load_order.push(module_id.to_string());
        if let Some(children) = dependents.get(module_id) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*child));
                    }
                }
            }
        }
    }

    if load_order.len() < modules.len() {
        let emitted: HashSet<&str> = load_order.iter().map(String::as_str).collect();
        let remaining: HashSet<&str> = modules
            .iter()
            .map(|(id, _)| id.as_str())
            .filter(|id| !emitted.contains(id))
            .collect();
        let cycle = extract_cycle(modules, &remaining);
        return Err(ErrorKind::CircularDependency { cycle }.into());
    }

    Ok(load_order)
}

/// Walks the residual sub-graph from an arbitrary node until a repeat,
/// producing a concrete cycle path for the error message.
fn extract_cycle(
    modules: &[(String, Vec<DependencyInfo>)],
    remaining: &HashSet<&str>,
) -> Vec<String> {
    let dep_map: HashMap<&str, Vec<&str>> = modules
        .iter()
        .filter(|(id, _)| remaining.contains(id.as_str()))
        .map(|(id, deps)| {
            let next: Vec<&str> = deps
                .iter()
                .map(|d| d.module_id.as_str())
                .filter(|dep| remaining.contains(dep))
                .collect();
            (id.as_str(), next)
        })
        .collect();

    let mut sorted_remaining: Vec<&str> = remaining.iter().copied().collect();
    sorted_remaining.sort_unstable();
    let Some(start) = sorted_remaining.first().copied() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut visited: HashSet<&str> = HashSet::from([start]);
    let mut current = start;

    loop {
        let Some(next) = dep_map.get(current).and_then(|nexts| nexts.first()) else {
            break;
        };
        if visited.contains(next) {
            let idx = path
                .iter()
                .position(|id| id == next)
                .unwrap_or_default();
            let mut cycle: Vec<String> = path[idx..].iter().map(|s| s.to_string()).collect();
            cycle.push((*next).to_string());
            return cycle;
        }
        path.push(next);
        visited.insert(next);
        current = next;
    }

    // Fallback: report every remaining node.
    let mut cycle: Vec<String> = sorted_remaining.iter().map(|s| s.to_string()).collect();
    cycle.push(start.to_string());
    cycle
}
