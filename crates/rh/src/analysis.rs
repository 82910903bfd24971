//! Text summaries, metrics and Graphviz output for a dependency mesh.

use crate::graph::DependencyGraph;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::fmt::Write;

const RULE: &str = "============================================================";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Complexity {
    pub total_functions: usize,
    pub total_dependencies: usize,
    pub max_dependencies: usize,
    pub average_dependencies: f64,
    pub functions_without_dependencies: usize,
    /// Longest chain of derived variables, counting every member of a cycle
    /// once.
    pub deepest_chain: usize,
    pub cycles: usize,
}

/// Inputs are variables that are not derived: dependencies that no mesh
/// entry computes and variables that only have an initial value.
fn input_variables<'a>(
    graph: &'a DependencyGraph,
    initial_values: &'a IndexMap<String, Value>,
) -> IndexSet<&'a str> {
    graph
        .variables()
        .into_iter()
        .chain(initial_values.keys().map(String::as_str))
        .filter(|variable| !graph.is_derived(variable))
        .collect()
}

pub fn complexity(graph: &DependencyGraph) -> Complexity {
    let forward = graph.forward();
    let total_functions = forward.len();
    let total_dependencies = forward.values().map(Vec::len).sum();
    let max_dependencies = forward.values().map(Vec::len).max().unwrap_or(0);
    let average_dependencies = if total_functions == 0 {
        0.0
    } else {
        total_dependencies as f64 / total_functions as f64
    };

    // Components come dependencies-first, so every dependency's depth is
    // known before it is needed.
    let components = graph.components();
    let mut depth = vec![0; components.len()];
    let mut component_index = vec![0; total_functions];
    for (index, component) in components.iter().enumerate() {
        for member in &component.members {
            component_index[*member] = index;
        }
    }
    for (index, component) in components.iter().enumerate() {
        let weight = if component.cyclic {
            component.members.len()
        } else {
            1
        };
        let deepest_dependency = component
            .members
            .iter()
            .flat_map(|member| &forward[*member])
            .filter_map(|dependency| forward.get_index_of(dependency))
            .map(|dependency| component_index[dependency])
            .filter(|dependency| *dependency != index)
            .map(|dependency| depth[dependency])
            .max()
            .unwrap_or(0);
        depth[index] = weight + deepest_dependency;
    }

    Complexity {
        total_functions,
        total_dependencies,
        max_dependencies,
        average_dependencies,
        functions_without_dependencies: forward.values().filter(|dependencies| dependencies.is_empty()).count(),
        deepest_chain: depth.into_iter().max().unwrap_or(0),
        cycles: graph.cycles().len(),
    }
}

/// Plain-text overview: inputs with their initial values, computed variables
/// with their dependencies, and what each variable affects.
pub fn visualize_mesh(graph: &DependencyGraph, initial_values: &IndexMap<String, Value>) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{RULE}\nMESH STRUCTURE\n{RULE}");

    let inputs = input_variables(graph, initial_values);
    if !inputs.is_empty() {
        let _ = writeln!(text, "\nINPUT VARIABLES:");
        for input in &inputs {
            match initial_values.get(*input) {
                Some(value) => {
                    let _ = writeln!(text, "  * {input} = {value}");
                }
                None => {
                    let _ = writeln!(text, "  * {input} = ?");
                }
            }
        }
    }

    if !graph.forward().is_empty() {
        let _ = writeln!(text, "\nCOMPUTED VARIABLES:");
        for (variable, dependencies) in graph.forward() {
            let dependencies = if dependencies.is_empty() {
                "(no deps)".to_string()
            } else {
                dependencies.join(", ")
            };
            let _ = writeln!(text, "  * {variable} <- [{dependencies}]");
        }
    }

    let _ = writeln!(text, "\nPROPAGATION CHAINS:");
    for variable in inputs.iter().copied().chain(graph.derived()) {
        let dependents = graph.dependents(variable);
        if !dependents.is_empty() {
            let _ = writeln!(text, "  * {variable} -> affects: {}", dependents.join(", "));
        }
    }

    let cycles = graph.cycles();
    if !cycles.is_empty() {
        let _ = writeln!(text, "\nCYCLES:");
        for members in cycles {
            let _ = writeln!(text, "  * {}", members.join(" <-> "));
        }
    }

    text.push('\n');
    text.push_str(RULE);
    text
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Graphviz DOT with inputs and computed variables styled apart and edges
/// pointing from a dependency to the variable computed from it.
pub fn to_dot(graph: &DependencyGraph, initial_values: &IndexMap<String, Value>) -> String {
    let mut dot = String::from("digraph Mesh {\n  rankdir=LR;\n  node [shape=box, style=filled];\n");
    for input in input_variables(graph, initial_values) {
        let _ = writeln!(
            dot,
            "  {} [fillcolor=lightblue, label=\"{input}\\n(input)\"];",
            quoted(input)
        );
    }
    for variable in graph.derived() {
        let _ = writeln!(
            dot,
            "  {} [fillcolor=lightgreen, label=\"{variable}\\n(computed)\"];",
            quoted(variable)
        );
    }
    for (variable, dependencies) in graph.forward() {
        for dependency in dependencies {
            let _ = writeln!(dot, "  {} -> {};", quoted(dependency), quoted(variable));
        }
    }
    dot.push('}');
    dot
}
