//! Computations bound to derived variables.

use crate::evaluator::{EvalError, evaluate};
use crate::graph::DependencyGraph;
use crate::parser::{ResolvedFunction, SourceError, UndeclaredRead, parse, resolve_function};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

pub type NativeFunction = dyn Fn(&[Value]) -> Result<Option<Value>, EvalError> + Send + Sync;

/// A callable computation. Arguments arrive in the declared dependency
/// order; `Ok(None)` means "leave the variable unchanged".
#[derive(Clone)]
pub enum Computation {
    Native(Arc<NativeFunction>),
    Compiled {
        source: Arc<str>,
        function: Arc<ResolvedFunction>,
    },
}

impl Computation {
    pub fn native<F>(function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Option<Value>, EvalError> + Send + Sync + 'static,
    {
        Computation::Native(Arc::new(function))
    }

    /// Parses and resolves `source` against the dependency names.
    pub fn compile(source: &str, dependencies: &[String]) -> Result<Self, CompileErrorKind> {
        if source.trim().is_empty() {
            return Err(CompileErrorKind::Empty);
        }
        let parsed = parse(source).map_err(CompileErrorKind::Syntax)?;
        if let Some(parameters) = &parsed.parameters {
            let declared: Vec<&str> = parameters.iter().map(|parameter| parameter.node.as_str()).collect();
            if declared != dependencies {
                return Err(CompileErrorKind::ParameterMismatch {
                    declared: declared.into_iter().map(str::to_string).collect(),
                    expected: dependencies.to_vec(),
                });
            }
        }
        let function = resolve_function(&parsed, dependencies).map_err(CompileErrorKind::Syntax)?;
        Ok(Computation::Compiled {
            source: source.into(),
            function: Arc::new(function),
        })
    }

    pub fn call(&self, arguments: &[Value]) -> Result<Option<Value>, EvalError> {
        let result = match self {
            Computation::Native(function) => function(arguments)?,
            Computation::Compiled { function, .. } => Some(evaluate(function, arguments)?),
        };
        Ok(result.filter(|value| !value.is_undefined()))
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Computation::Native(_) => None,
            Computation::Compiled { source, .. } => Some(&**source),
        }
    }

    pub fn undeclared_reads(&self) -> &[UndeclaredRead] {
        match self {
            Computation::Native(_) => &[],
            Computation::Compiled { function, .. } => &function.undeclared_reads[..],
        }
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Computation::Native(_) => write!(f, "Computation::Native(..)"),
            Computation::Compiled { source, .. } => {
                f.debug_tuple("Computation::Compiled").field(source).finish()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    Empty,
    Syntax(Vec<SourceError>),
    ParameterMismatch {
        declared: Vec<String>,
        expected: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub variable: String,
    pub kind: CompileErrorKind,
}

impl CompileError {
    /// Human readable report, with ariadne snippets for syntax errors.
    pub fn render(&self, source_code: &str) -> String {
        match &self.kind {
            CompileErrorKind::Syntax(errors) => errors
                .iter()
                .map(|error| error.report(&self.variable, source_code))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variable = &self.variable;
        match &self.kind {
            CompileErrorKind::Empty => write!(f, "Function '{variable}' is empty"),
            CompileErrorKind::Syntax(errors) => {
                write!(f, "Syntax error in function '{variable}'")?;
                for error in errors {
                    write!(f, "; {error}")?;
                }
                Ok(())
            }
            CompileErrorKind::ParameterMismatch { declared, expected } => write!(
                f,
                "Function '{variable}' declares parameters ({}) but its mesh dependencies are ({})",
                declared.join(", "),
                expected.join(", ")
            ),
        }
    }
}

impl std::error::Error for CompileError {}

/// One computation per derived variable, in mesh declaration order.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    computations: IndexMap<String, Computation>,
}

impl FunctionRegistry {
    /// Compiles the textual source of every derived variable that has one.
    /// Variables already bound natively in `natives` take precedence.
    ///
    /// A source that fails to compile leaves its variable unbound, so the
    /// variable keeps whatever value it has. The errors are returned next to
    /// the registry instead of failing the whole mesh.
    pub fn compile(
        graph: &DependencyGraph,
        sources: &IndexMap<String, String>,
        natives: &IndexMap<String, Computation>,
    ) -> (Self, Vec<CompileError>) {
        let mut registry = FunctionRegistry::default();
        let mut errors = Vec::new();
        for (variable, dependencies) in graph.forward() {
            if let Some(native) = natives.get(variable) {
                registry.bind(variable, native.clone());
                continue;
            }
            let Some(source) = sources.get(variable) else {
                log::debug!("derived variable '{variable}' has no computation");
                continue;
            };
            match Computation::compile(source, dependencies) {
                Ok(computation) => registry.bind(variable, computation),
                Err(kind) => {
                    let error = CompileError {
                        variable: variable.clone(),
                        kind,
                    };
                    log::warn!("{error}, '{variable}' stays unbound");
                    errors.push(error);
                }
            }
        }
        (registry, errors)
    }

    pub fn bind(&mut self, variable: impl Into<String>, computation: Computation) {
        self.computations.insert(variable.into(), computation);
    }

    pub fn get(&self, variable: &str) -> Option<&Computation> {
        self.computations.get(variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Computation)> {
        self.computations
            .iter()
            .map(|(variable, computation)| (variable.as_str(), computation))
    }

    pub fn len(&self) -> usize {
        self.computations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dependencies(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_undefined_result_means_no_value() {
        let computation = Computation::compile("undefined", &[]).unwrap();
        assert_eq!(computation.call(&[]), Ok(None));
        let computation = Computation::native(|_| Ok(Some(Value::Undefined)));
        assert_eq!(computation.call(&[]), Ok(None));
    }

    #[test]
    fn test_function_parameters_must_match_dependencies() {
        let expected = dependencies(&["a", "b"]);
        assert!(Computation::compile("function(a, b) { return a + b; }", &expected).is_ok());
        assert_eq!(
            Computation::compile("function(b, a) { return a + b; }", &expected).unwrap_err(),
            CompileErrorKind::ParameterMismatch {
                declared: dependencies(&["b", "a"]),
                expected,
            }
        );
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(
            Computation::compile("   ", &[]).unwrap_err(),
            CompileErrorKind::Empty
        );
    }

    #[test]
    fn test_compile_keeps_going_past_errors() {
        let graph = DependencyGraph::new(IndexMap::from([
            ("a".to_string(), dependencies(&["x"])),
            ("b".to_string(), dependencies(&["x"])),
            ("c".to_string(), dependencies(&["x"])),
        ]));
        let sources = IndexMap::from([
            ("a".to_string(), "x +".to_string()),
            ("b".to_string(), "x * 2".to_string()),
            ("c".to_string(), "".to_string()),
        ]);
        let (registry, errors) = FunctionRegistry::compile(&graph, &sources, &IndexMap::new());
        let variables: Vec<_> = errors.iter().map(|error| error.variable.as_str()).collect();
        assert_eq!(variables, ["a", "c"]);
        assert!(errors[0].to_string().starts_with("Syntax error in function 'a'"));
        let bound: Vec<_> = registry.iter().map(|(variable, _)| variable).collect();
        assert_eq!(bound, ["b"]);
    }

    #[test]
    fn test_native_binding_wins_over_source() {
        let graph = DependencyGraph::new(IndexMap::from([("a".to_string(), dependencies(&["x"]))]));
        let sources = IndexMap::from([("a".to_string(), "x +".to_string())]);
        let natives = IndexMap::from([(
            "a".to_string(),
            Computation::native(|arguments| Ok(Some(arguments[0].clone()))),
        )]);
        let (registry, errors) = FunctionRegistry::compile(&graph, &sources, &natives);
        assert!(errors.is_empty());
        assert_eq!(
            registry.get("a").unwrap().call(&[Value::Integer(3)]),
            Ok(Some(Value::Integer(3)))
        );
    }
}
