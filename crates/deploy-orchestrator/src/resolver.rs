//! # Dependency Resolver
//!
//! Turns a [`ComponentSet`] into an execution order using Kahn's algorithm.
//! Among components whose dependencies are all placed, the one declared first
//! goes next, so an unchanged set always yields the identical order.
//!
//! Validation happens here, before anything touches the network:
//!
//! - duplicate names, unknown `depends_on` entries, self references
//! - `AddressOf` / `ClassHashOf` arguments whose target is not in `depends_on`
//! - `AddressOf` pointing at a declare-only component (it never gets an address)
//! - cycles, reported with the members of one concrete cycle
//!
//! ```
//! use deploy_orchestrator::model::{ComponentSet, ComponentSpec};
//! use deploy_orchestrator::resolver::resolve;
//!
//! let set = ComponentSet::new()
//!     .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", "RoleStore"))
//!     .with(ComponentSpec::deploy("RoleStore"));
//!
//! assert_eq!(resolve(&set).unwrap(), vec!["RoleStore", "DataStore"]);
//! ```

use crate::error::ResolveError;
use crate::model::{ComponentKind, ComponentSet, ConstructorArg};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Validated dependency graph over a component set. Rebuilt each run.
#[derive(Debug, Clone)]
pub struct Resolver {
    names: Vec<String>,
    /// `deps[i]` holds the indices component `i` depends on.
    deps: Vec<Vec<usize>>,
    /// `dependents[i]` holds the indices that depend on component `i`.
    dependents: Vec<Vec<usize>>,
}

impl Resolver {
    /// Validates `set` and builds its graph. Cycles are detected by [`resolve`](Self::resolve).
    pub fn new(set: &ComponentSet) -> Result<Self, ResolveError> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, spec) in set.iter().enumerate() {
            if index.insert(spec.name.as_str(), i).is_some() {
                return Err(ResolveError::DuplicateComponent(spec.name.clone()));
            }
        }

        let mut deps = vec![Vec::new(); set.len()];
        let mut dependents = vec![Vec::new(); set.len()];
        for (i, spec) in set.iter().enumerate() {
            for dependency in &spec.depends_on {
                let Some(&j) = index.get(dependency.as_str()) else {
                    return Err(ResolveError::MissingDependency {
                        component: spec.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if i == j {
                    return Err(ResolveError::CyclicDependency {
                        members: vec![spec.name.clone()],
                    });
                }
                if !deps[i].contains(&j) {
                    deps[i].push(j);
                    dependents[j].push(i);
                }
            }

            for param in &spec.constructor {
                let Some(target) = param.value.reference() else {
                    continue;
                };
                if !spec.depends_on.iter().any(|d| d == target) {
                    return Err(ResolveError::UndeclaredReference {
                        component: spec.name.clone(),
                        param: param.name.clone(),
                        target: target.to_string(),
                    });
                }
                let declare_only = set
                    .get(target)
                    .is_some_and(|t| t.kind == ComponentKind::DeclareOnly);
                if declare_only && matches!(param.value, ConstructorArg::AddressOf(_)) {
                    return Err(ResolveError::AddressOfDeclareOnly {
                        component: spec.name.clone(),
                        param: param.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            names: set.iter().map(|s| s.name.clone()).collect(),
            deps,
            dependents,
        })
    }

    /// Total order in which every dependency precedes its dependents.
    pub fn resolve(&self) -> Result<Vec<String>, ResolveError> {
        let mut indegree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.names.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(self.names[i].clone());
            for &dependent in &self.dependents[i] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < self.names.len() {
            return Err(self.cycle_error(&indegree));
        }
        Ok(order)
    }

    /// Groups components into waves: every member of wave `n` depends only on
    /// members of earlier waves. Members of a wave are in declaration order.
    pub fn waves(&self) -> Result<Vec<Vec<String>>, ResolveError> {
        let mut indegree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut current: Vec<usize> = (0..self.names.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut placed = 0;
        let mut waves = Vec::new();

        while !current.is_empty() {
            placed += current.len();
            let mut next = Vec::new();
            for &i in &current {
                for &dependent in &self.dependents[i] {
                    indegree[dependent] -= 1;
                    if indegree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            waves.push(current.iter().map(|&i| self.names[i].clone()).collect());
            current = next;
        }

        if placed < self.names.len() {
            return Err(self.cycle_error(&indegree));
        }
        Ok(waves)
    }

    /// Walks dependency edges among the unplaced nodes until one repeats.
    fn cycle_error(&self, indegree: &[usize]) -> ResolveError {
        let remaining = |i: usize| indegree[i] > 0;
        let Some(start) = (0..self.names.len()).find(|&i| remaining(i)) else {
            return ResolveError::CyclicDependency {
                members: Vec::new(),
            };
        };

        let mut path = vec![start];
        let mut node = start;
        loop {
            // Every unplaced node has at least one unplaced dependency.
            let Some(&next) = self.deps[node].iter().find(|&&j| remaining(j)) else {
                break;
            };
            if let Some(pos) = path.iter().position(|&p| p == next) {
                path.drain(..pos);
                break;
            }
            path.push(next);
            node = next;
        }

        // Report in dependency order: each member is needed by the one after it.
        path.reverse();
        ResolveError::CyclicDependency {
            members: path.into_iter().map(|i| self.names[i].clone()).collect(),
        }
    }
}

/// Validates `set` and returns its execution order.
pub fn resolve(set: &ComponentSet) -> Result<Vec<String>, ResolveError> {
    Resolver::new(set)?.resolve()
}
