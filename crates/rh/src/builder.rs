//! Turns a [`MeshSpec`] into an immutable [`Configuration`].

use crate::conditions::FieldCondition;
use crate::conventions::{Membership, UiHints};
use crate::definition::MeshSpec;
use crate::evaluator::EvalError;
use crate::graph::DependencyGraph;
use crate::propagation::{DEFAULT_MAX_ROUNDS, Propagator, Strategy};
use crate::registry::{CompileError, Computation, FunctionRegistry};
use crate::schema::TypeDescriptor;
use crate::state::FormState;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    pub max_rounds: usize,
    pub strategy: Strategy,
    /// Where an external packaging step should write its output. Only
    /// carried, never used by the core.
    pub output_dir: Option<PathBuf>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            strategy: Strategy::FullSweep,
            output_dir: None,
        }
    }
}

pub struct MeshBuilder {
    spec: MeshSpec,
    options: BuilderOptions,
    natives: IndexMap<String, Computation>,
}

impl MeshBuilder {
    pub fn new(spec: MeshSpec) -> Self {
        Self {
            spec,
            options: BuilderOptions::default(),
            natives: IndexMap::new(),
        }
    }

    pub fn with_options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    /// Binds a Rust closure as the computation of `variable`, taking
    /// precedence over any textual source for it.
    pub fn native<F>(mut self, variable: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Option<Value>, EvalError> + Send + Sync + 'static,
    {
        self.natives
            .insert(variable.into(), Computation::native(function));
        self
    }

    /// Never fails: computations that do not compile are left unbound and
    /// reported through [`Configuration::compile_errors`].
    pub fn build(self) -> Configuration {
        let MeshSpec {
            mesh,
            functions,
            initial_values,
            field_overrides,
            conditional_fields,
            ui_config,
            meta,
        } = self.spec;

        let graph = DependencyGraph::new(mesh);
        let (registry, compile_errors) = FunctionRegistry::compile(&graph, &functions, &self.natives);

        let mut variables: IndexSet<String> = graph.variables().into_iter().map(str::to_string).collect();
        variables.extend(initial_values.keys().cloned());
        variables.extend(field_overrides.keys().cloned());

        let mut schema = IndexMap::new();
        let mut ui_hints = IndexMap::new();
        for variable in &variables {
            let overrides = field_overrides.get(variable);
            schema.insert(
                variable.clone(),
                TypeDescriptor::describe(initial_values.get(variable), overrides),
            );
            let membership = Membership {
                derived: graph.is_derived(variable),
                has_initial_value: initial_values.contains_key(variable),
            };
            let hints = UiHints::resolve(variable, membership, overrides);
            if !hints.is_empty() {
                ui_hints.insert(variable.clone(), hints);
            }
        }

        log::debug!(
            "built configuration: {} variable(s), {} computation(s), {} cycle(s), {} compile error(s)",
            variables.len(),
            registry.len(),
            graph.cycles().len(),
            compile_errors.len()
        );

        Configuration {
            options: self.options,
            graph,
            registry,
            compile_errors,
            functions,
            variables,
            schema,
            ui_hints,
            initial_values,
            conditional_fields,
            ui_config,
            meta,
        }
    }
}

/// Everything the renderer and the propagation engine need. Immutable once
/// built and safe to share between sessions.
#[derive(Debug, Clone)]
pub struct Configuration {
    options: BuilderOptions,
    graph: DependencyGraph,
    registry: FunctionRegistry,
    compile_errors: Vec<CompileError>,
    functions: IndexMap<String, String>,
    variables: IndexSet<String>,
    schema: IndexMap<String, TypeDescriptor>,
    ui_hints: IndexMap<String, UiHints>,
    initial_values: IndexMap<String, Value>,
    conditional_fields: IndexMap<String, FieldCondition>,
    ui_config: serde_json::Map<String, serde_json::Value>,
    meta: Option<serde_json::Value>,
}

impl Configuration {
    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Sources that failed to compile. Their variables have no computation.
    pub fn compile_errors(&self) -> &[CompileError] {
        &self.compile_errors
    }

    /// The textual source of `variable`, as given in the mesh definition.
    pub fn source(&self, variable: &str) -> Option<&str> {
        self.functions.get(variable).map(String::as_str)
    }

    /// All variables: mesh keys, their dependencies, then variables known
    /// only from initial values or overrides.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    pub fn schema(&self, variable: &str) -> Option<&TypeDescriptor> {
        self.schema.get(variable)
    }

    pub fn ui_hints(&self, variable: &str) -> Option<&UiHints> {
        self.ui_hints.get(variable)
    }

    pub fn initial_values(&self) -> &IndexMap<String, Value> {
        &self.initial_values
    }

    pub fn conditional_fields(&self) -> &IndexMap<String, FieldCondition> {
        &self.conditional_fields
    }

    pub fn meta(&self) -> Option<&serde_json::Value> {
        self.meta.as_ref()
    }

    pub fn propagator(&self) -> Propagator<'_> {
        Propagator::new(&self.graph, &self.registry)
            .with_max_rounds(self.options.max_rounds)
            .with_strategy(self.options.strategy)
    }

    /// The state a form starts from: the initial values as given.
    pub fn initial_state(&self) -> FormState {
        self.initial_values
            .iter()
            .map(|(variable, value)| (variable.as_str(), value.clone()))
            .collect()
    }

    /// Whether each conditional field is currently shown.
    pub fn visibility(&self, state: &FormState) -> IndexMap<&str, bool> {
        self.conditional_fields
            .iter()
            .map(|(field, condition)| (field.as_str(), condition.is_met(state)))
            .collect()
    }
}

struct Properties<'a>(&'a IndexMap<String, TypeDescriptor>);

impl Serialize for Properties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "object")?;
        map.serialize_entry("properties", self.0)?;
        map.end()
    }
}

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("schema", &Properties(&self.schema))?;
        map.serialize_entry("uiHints", &self.ui_hints)?;
        map.serialize_entry("mesh", self.graph.forward())?;
        map.serialize_entry("reverseMesh", self.graph.reverse())?;
        map.serialize_entry("functions", &self.functions)?;
        map.serialize_entry("initialValues", &self.initial_values)?;
        if !self.conditional_fields.is_empty() {
            map.serialize_entry("conditionalFields", &self.conditional_fields)?;
        }
        if !self.ui_config.is_empty() {
            map.serialize_entry("uiConfig", &self.ui_config)?;
        }
        if let Some(meta) = &self.meta {
            map.serialize_entry("meta", meta)?;
        }
        map.end()
    }
}
