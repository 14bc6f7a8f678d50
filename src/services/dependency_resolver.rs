use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{StepReference, StepsSequence, WorkflowDefinition};

/// Resolves step dependencies into execution waves and detects cycles
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util(
    node: &StepReference,
    graph: &BTreeMap<StepReference, BTreeSet<StepReference>>,
    visited: &mut HashSet<StepReference>,
    rec_stack: &mut HashSet<StepReference>,
    path: &mut Vec<StepReference>,
) -> bool {
    visited.insert(node.clone());
    rec_stack.insert(node.clone());
    path.push(node.clone());

    if let Some(neighbors) = graph.get(node) {
        for neighbor in neighbors {
            if !visited.contains(neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                // Cycle detected, close the loop for display
                if let Some(cycle_start) = path.iter().position(|id| id == neighbor) {
                    path.drain(0..cycle_start);
                    path.push(neighbor.clone());
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Check that every step appears once and every dependency names a step
    /// of the same workflow
    pub fn validate_dependencies(
        &self,
        workflow: &str,
        definition: &WorkflowDefinition,
    ) -> DomainResult<()> {
        let mut known = HashSet::new();
        for reference in definition.step_references() {
            if !known.insert(reference.clone()) {
                return Err(DomainError::DuplicateStepInWorkflow {
                    workflow: workflow.to_string(),
                    step: reference,
                });
            }
        }

        for entry in &definition.steps {
            for dependency in &entry.requires {
                if !known.contains(dependency) {
                    return Err(DomainError::UnknownDependency {
                        workflow: workflow.to_string(),
                        step: entry.reference(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Detect a dependency cycle, returning its path (first node repeated
    /// at the end)
    pub fn detect_cycle(&self, definition: &WorkflowDefinition) -> Option<Vec<StepReference>> {
        let graph = dependency_graph(definition);

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for step in graph.keys() {
            if !visited.contains(step)
                && detect_cycle_util(step, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }

        None
    }

    /// Layer the workflow into waves with Kahn's algorithm.
    ///
    /// Wave 0 holds the steps without dependencies, wave `i` the steps whose
    /// dependencies were all resolved by waves `< i`. An empty workflow
    /// yields an empty sequence.
    pub fn step_sequence(
        &self,
        workflow: &str,
        definition: &WorkflowDefinition,
    ) -> DomainResult<StepsSequence> {
        self.validate_dependencies(workflow, definition)?;

        let graph = dependency_graph(definition);
        let mut in_degree: BTreeMap<&StepReference, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&StepReference, Vec<&StepReference>> = BTreeMap::new();

        for (step, dependencies) in &graph {
            in_degree.insert(step, dependencies.len());
            for dependency in dependencies {
                dependents.entry(dependency).or_default().push(step);
            }
        }

        let mut ready: BTreeSet<StepReference> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&step, _)| step.clone())
            .collect();

        let mut sequence = StepsSequence::new();
        let mut resolved = 0;

        while !ready.is_empty() {
            let wave = std::mem::take(&mut ready);
            for step in &wave {
                if let Some(neighbors) = dependents.get(step) {
                    for &neighbor in neighbors {
                        if let Some(degree) = in_degree.get_mut(neighbor) {
                            *degree -= 1;
                            if *degree == 0 {
                                ready.insert(neighbor.clone());
                            }
                        }
                    }
                }
            }
            resolved += wave.len();
            sequence.push(wave);
        }

        if resolved != graph.len() {
            let cycle = self.detect_cycle(definition).unwrap_or_else(|| {
                in_degree
                    .into_iter()
                    .filter(|&(_, degree)| degree > 0)
                    .map(|(step, _)| step.clone())
                    .collect()
            });
            return Err(DomainError::NotADag {
                workflow: workflow.to_string(),
                cycle,
            });
        }

        Ok(sequence)
    }
}

/// Adjacency from each step to the set of steps it depends on
fn dependency_graph(
    definition: &WorkflowDefinition,
) -> BTreeMap<StepReference, BTreeSet<StepReference>> {
    let mut graph: BTreeMap<StepReference, BTreeSet<StepReference>> = BTreeMap::new();
    for entry in &definition.steps {
        graph
            .entry(entry.reference())
            .or_default()
            .extend(entry.requires.iter().cloned());
    }
    graph
}
