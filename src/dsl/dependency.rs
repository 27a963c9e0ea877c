//! Test case ordering with `dependsOn`
//!
//! Kahn's algorithm, always taking the earliest ready case so suites
//! without dependencies keep their file order.

use std::collections::{BTreeSet, HashMap};

use super::case::DslTestCase;
use crate::errors::{FlowpulseError, Result};

/// Indices into the case list in execution order.
///
/// Fails when a case depends on a name that does not exist, on itself, or
/// when the dependencies form a cycle.
pub fn execution_order(cases: &[DslTestCase]) -> Result<Vec<usize>> {
    let name_to_idx: HashMap<&str, usize> = cases
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    if name_to_idx.len() != cases.len() {
        let mut seen = BTreeSet::new();
        for case in cases {
            if !seen.insert(case.name.as_str()) {
                return Err(FlowpulseError::Configuration(format!(
                    "Duplicate test case name: {}",
                    case.name
                )));
            }
        }
    }

    // dependents[i] = cases waiting on case i
    let mut in_degree = vec![0usize; cases.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); cases.len()];
    for (i, case) in cases.iter().enumerate() {
        for dep in &case.depends_on {
            let Some(&dep_idx) = name_to_idx.get(dep.as_str()) else {
                return Err(FlowpulseError::Configuration(format!(
                    "Test case '{}' depends on unknown case '{}'",
                    case.name, dep
                )));
            };
            dependents[dep_idx].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(cases.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != cases.len() {
        let in_cycle: Vec<&str> = cases
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, c)| c.name.as_str())
            .collect();
        return Err(FlowpulseError::Configuration(format!(
            "Dependency cycle detected involving test cases: {}",
            in_cycle.join(", ")
        )));
    }

    Ok(order)
}
