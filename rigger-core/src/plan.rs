//! Validated step graphs.
//!
//! A [`Plan`] is built once from a list of steps. Construction checks:
//! - step names are unique and usable inside `${step.path}` references
//! - every dependency names another step of the plan
//! - every output an action reads is a declared dependency
//! - the graph has no cycles
//!
//! The execution order is a topological sort with ties broken by declaration
//! order, so a linear chain runs exactly as declared.

use std::collections::{BTreeSet, HashMap};

use crate::error::PlanError;
use crate::step::Step;

#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<Step>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if !valid_name(step.name()) {
                return Err(PlanError::InvalidStepName(step.name().to_string()));
            }
            if index.insert(step.name(), i).is_some() {
                return Err(PlanError::DuplicateStep(step.name().to_string()));
            }
        }

        let mut dependencies = Vec::with_capacity(steps.len());
        let mut dependents = vec![Vec::new(); steps.len()];
        for (i, step) in steps.iter().enumerate() {
            let mut deps = Vec::with_capacity(step.dependencies().len());
            for dependency in step.dependencies() {
                if dependency == step.name() {
                    return Err(PlanError::SelfDependency(step.name().to_string()));
                }
                let d = *index
                    .get(dependency.as_str())
                    .ok_or_else(|| PlanError::UnknownDependency {
                        step: step.name().to_string(),
                        dependency: dependency.clone(),
                    })?;
                deps.push(d);
                dependents[d].push(i);
            }

            let referenced = step.action().referenced_steps().map_err(|e| {
                PlanError::MalformedReference {
                    step: step.name().to_string(),
                    reference: e.0,
                }
            })?;
            for reference in referenced {
                if !step.dependencies().contains(&reference) {
                    return Err(PlanError::UndeclaredReference {
                        step: step.name().to_string(),
                        reference,
                    });
                }
            }

            dependencies.push(deps);
        }

        let order = topological_order(&dependencies, &dependents).ok_or_else(|| {
            PlanError::Cycle(
                find_cycle(&dependencies)
                    .into_iter()
                    .map(|i| steps[i].name().to_string())
                    .collect(),
            )
        })?;

        Ok(Self {
            steps,
            dependencies,
            dependents,
            order,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Indices of the steps `index` depends on.
    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Indices of the steps that depend on `index`.
    pub fn dependents_of(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Steps in sequential execution order.
    pub fn execution_order(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().map(|&i| &self.steps[i])
    }
}

/// Kahn's algorithm picking the lowest ready index first.
fn topological_order(
    dependencies: &[Vec<usize>],
    dependents: &[Vec<usize>],
) -> Option<Vec<usize>> {
    let mut pending: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = (0..pending.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(pending.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    (order.len() == pending.len()).then_some(order)
}

/// Return one cycle as a closed path (first node repeated at the end).
fn find_cycle(dependencies: &[Vec<usize>]) -> Vec<usize> {
    // Colour-based DFS: 0 = unvisited, 1 = on stack, 2 = done.
    fn visit(
        node: usize,
        deps: &[Vec<usize>],
        colour: &mut [u8],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        colour[node] = 1;
        stack.push(node);
        for &next in &deps[node] {
            match colour[next] {
                0 => {
                    if let Some(cycle) = visit(next, deps, colour, stack) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].to_vec();
                    cycle.push(next);
                    // Present in execution direction: dependency before dependent.
                    cycle.reverse();
                    return Some(cycle);
                }
                _ => {}
            }
        }
        stack.pop();
        colour[node] = 2;
        None
    }

    let mut colour = vec![0u8; dependencies.len()];
    for node in 0..dependencies.len() {
        if colour[node] == 0 {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(node, dependencies, &mut colour, &mut stack) {
                return cycle;
            }
        }
    }
    Vec::new()
}
