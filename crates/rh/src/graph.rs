//! Forward and reverse dependency meshes.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// A strongly connected group of derived variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    /// Indices into the forward mesh, in declaration order.
    pub members: Vec<usize>,
    /// More than one member, or a single member that depends on itself.
    pub cyclic: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    forward: IndexMap<String, Vec<String>>,
    reverse: IndexMap<String, Vec<String>>,
    /// Components in dependencies-first order.
    components: Vec<Component>,
    /// Component id for every derived variable, by forward-mesh index.
    component_of: Vec<usize>,
}

impl DependencyGraph {
    pub fn new(forward: IndexMap<String, Vec<String>>) -> Self {
        let mut reverse: IndexMap<String, Vec<String>> = IndexMap::new();
        for (function, dependencies) in &forward {
            for dependency in dependencies {
                let dependents = reverse.entry(dependency.clone()).or_default();
                if !dependents.contains(function) {
                    dependents.push(function.clone());
                }
            }
        }
        let components = strongly_connected_components(&forward);
        let mut component_of = vec![0; forward.len()];
        for (id, component) in components.iter().enumerate() {
            for member in &component.members {
                component_of[*member] = id;
            }
        }
        Self {
            forward,
            reverse,
            components,
            component_of,
        }
    }

    pub fn forward(&self) -> &IndexMap<String, Vec<String>> {
        &self.forward
    }

    pub fn reverse(&self) -> &IndexMap<String, Vec<String>> {
        &self.reverse
    }

    /// Declared dependencies of a derived variable, empty for inputs.
    pub fn dependencies(&self, variable: &str) -> &[String] {
        self.forward.get(variable).map(Vec::as_slice).unwrap_or_default()
    }

    /// Derived variables that must be recomputed when `variable` changes.
    pub fn dependents(&self, variable: &str) -> &[String] {
        self.reverse.get(variable).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_derived(&self, variable: &str) -> bool {
        self.forward.contains_key(variable)
    }

    pub fn derived(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }

    pub fn derived_at(&self, index: usize) -> Option<&str> {
        self.forward.get_index(index).map(|(name, _)| name.as_str())
    }

    /// Mesh keys followed by their dependencies, each once, in first-seen order.
    pub fn variables(&self) -> IndexSet<&str> {
        let mut variables: IndexSet<&str> = self.derived().collect();
        for dependencies in self.forward.values() {
            variables.extend(dependencies.iter().map(String::as_str));
        }
        variables
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component_of(&self, variable: &str) -> Option<&Component> {
        let index = self.forward.get_index_of(variable)?;
        self.components.get(self.component_of[index])
    }

    /// Cyclic components as variable names.
    pub fn cycles(&self) -> Vec<Vec<&str>> {
        self.components
            .iter()
            .filter(|component| component.cyclic)
            .map(|component| self.names(&component.members))
            .collect()
    }

    pub fn names(&self, members: &[usize]) -> Vec<&str> {
        members
            .iter()
            .filter_map(|member| self.derived_at(*member))
            .collect()
    }

    /// Derived variables grouped so that every variable only depends on
    /// inputs or on variables of earlier levels. Variables on or behind a
    /// cycle never become ready and are left out.
    pub fn execution_levels(&self) -> Vec<Vec<&str>> {
        let mut pending: Vec<usize> = self
            .forward
            .values()
            .map(|dependencies| {
                dependencies
                    .iter()
                    .filter(|dependency| self.is_derived(dependency))
                    .count()
            })
            .collect();
        let mut level: Vec<usize> = (0..self.forward.len())
            .filter(|index| pending[*index] == 0)
            .collect();
        let mut levels = Vec::new();
        while !level.is_empty() {
            let mut next = Vec::new();
            for index in &level {
                let Some(variable) = self.derived_at(*index) else {
                    continue;
                };
                for dependent in self.dependents(variable) {
                    let Some(dependent_index) = self.forward.get_index_of(dependent) else {
                        continue;
                    };
                    let count = self.forward[dependent_index]
                        .iter()
                        .filter(|dependency| *dependency == variable)
                        .count();
                    pending[dependent_index] -= count;
                    if pending[dependent_index] == 0 {
                        next.push(dependent_index);
                    }
                }
            }
            next.sort_unstable();
            levels.push(self.names(&level));
            level = next;
        }
        levels
    }
}

/// Iterative Tarjan over derived variables, edges pointing from a variable
/// to the derived variables it depends on. Tarjan completes a component only
/// after every component it reaches, so the output is dependencies-first.
fn strongly_connected_components(forward: &IndexMap<String, Vec<String>>) -> Vec<Component> {
    let successors: Vec<Vec<usize>> = forward
        .values()
        .map(|dependencies| {
            dependencies
                .iter()
                .filter_map(|dependency| forward.get_index_of(dependency))
                .collect()
        })
        .collect();
    let count = successors.len();
    let mut index: Vec<Option<usize>> = vec![None; count];
    let mut lowlink = vec![0; count];
    let mut on_stack = vec![false; count];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut next_index = 0;

    for root in 0..count {
        if index[root].is_some() {
            continue;
        }
        index[root] = Some(next_index);
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut call_stack = vec![(root, 0)];

        while let Some(&(node, edge)) = call_stack.last() {
            if let Some(&next) = successors[node].get(edge) {
                if let Some(frame) = call_stack.last_mut() {
                    frame.1 += 1;
                }
                match index[next] {
                    None => {
                        index[next] = Some(next_index);
                        lowlink[next] = next_index;
                        next_index += 1;
                        stack.push(next);
                        on_stack[next] = true;
                        call_stack.push((next, 0));
                    }
                    Some(next_order) if on_stack[next] => {
                        lowlink[node] = lowlink[node].min(next_order);
                    }
                    Some(_) => {}
                }
                continue;
            }
            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if index[node] == Some(lowlink[node]) {
                let mut members = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    members.push(member);
                    if member == node {
                        break;
                    }
                }
                members.sort_unstable();
                let cyclic = members.len() > 1 || successors[node].contains(&node);
                components.push(Component { members, cyclic });
            }
        }
    }
    components
}
