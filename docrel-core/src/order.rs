//! Dependency ordering for sync units.
//!
//! Units are sorted with Kahn's algorithm. Ready units are queued FIFO in
//! declaration order, so independent units keep the order they were
//! declared in.

use std::collections::{HashMap, VecDeque};

use crate::error::ConfigurationError;

/// A named unit that must run after the units it depends on.
pub trait DependencyUnit {
    /// Unique name of the unit (matched case-insensitively).
    fn unit_name(&self) -> &str;

    /// Names of the units this one depends on.
    fn dependencies(&self) -> &[String];
}

/// Orders `units` so that every unit appears after all of its dependencies.
///
/// Dependencies naming units outside the input are ignored.
pub fn order_units<T: DependencyUnit>(units: &[T]) -> Result<Vec<&T>, ConfigurationError> {
    let index: HashMap<String, usize> = units
        .iter()
        .enumerate()
        .map(|(i, unit)| (unit.unit_name().to_lowercase(), i))
        .collect();

    let mut in_degree = vec![0usize; units.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];

    for (i, unit) in units.iter().enumerate() {
        let mut seen = Vec::new();
        for dependency in unit.dependencies() {
            let Some(&dep) = index.get(&dependency.trim().to_lowercase()) else {
                continue;
            };
            if seen.contains(&dep) {
                continue;
            }
            seen.push(dep);
            in_degree[i] += 1;
            dependents[dep].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..units.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut ordered = Vec::with_capacity(units.len());

    while let Some(i) = ready.pop_front() {
        ordered.push(&units[i]);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if ordered.len() < units.len() {
        let remaining = units
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, unit)| unit.unit_name().to_string())
            .collect();
        return Err(ConfigurationError::CyclicDependency(remaining));
    }

    Ok(ordered)
}
