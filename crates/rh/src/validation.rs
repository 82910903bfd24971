//! Structural checks over a mesh definition. Never blocks a build.

use crate::definition::MeshSpec;
use crate::graph::DependencyGraph;
use crate::registry::{CompileError, CompileErrorKind, Computation};
use indexmap::IndexSet;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingComputation,
    UndeclaredDependency { dependency: String },
    UnusedComputation,
    EmptyComputation,
    Syntax,
    ParameterMismatch,
    UndeclaredRead { name: String },
    Cycle { members: Vec<String> },
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::MissingComputation
            | DiagnosticKind::UndeclaredDependency { .. }
            | DiagnosticKind::EmptyComputation
            | DiagnosticKind::Syntax
            | DiagnosticKind::ParameterMismatch => Severity::Error,
            DiagnosticKind::UnusedComputation
            | DiagnosticKind::UndeclaredRead { .. }
            | DiagnosticKind::Cycle { .. } => Severity::Warning,
        }
    }

    /// A short hint on how to resolve this kind of problem.
    pub fn suggestion(&self) -> &'static str {
        match self {
            DiagnosticKind::MissingComputation => "Add the function implementation to functions_spec",
            DiagnosticKind::UndeclaredDependency { .. } => {
                "Add the variable to initial_values or define it as a computed variable in mesh_spec"
            }
            DiagnosticKind::UnusedComputation => {
                "Remove unused function or add it to mesh_spec if it should be computed"
            }
            DiagnosticKind::EmptyComputation => "Write an expression or a return statement",
            DiagnosticKind::Syntax => "Check for missing or extra brackets/braces/parentheses",
            DiagnosticKind::ParameterMismatch => {
                "Make the function parameters match the mesh_spec dependency list"
            }
            DiagnosticKind::UndeclaredRead { .. } => {
                "Add the variable to the mesh_spec dependency list so edits to it recompute this function"
            }
            DiagnosticKind::Cycle { .. } => {
                "Make sure the cycle has a fixed point, or edits will stop at the round limit"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub variable: String,
    pub message: String,
    /// Source snippet report for syntax errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, variable: &str, message: String) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            variable: variable.to_string(),
            message,
            rendered: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.message),
            Severity::Warning => write!(f, "warning: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Warning)
    }

    /// One hint per distinct kind of problem, in order of first appearance.
    pub fn suggest_fixes(&self) -> Vec<&'static str> {
        let suggestions: IndexSet<&'static str> = self
            .diagnostics
            .iter()
            .map(|diagnostic| diagnostic.kind.suggestion())
            .collect();
        suggestions.into_iter().collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
            if let Some(rendered) = &diagnostic.rendered {
                writeln!(f, "{rendered}")?;
            }
        }
        let suggestions = self.suggest_fixes();
        if !suggestions.is_empty() {
            writeln!(f, "\nSuggested fixes:")?;
            for suggestion in suggestions {
                writeln!(f, "  - {suggestion}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshValidator {
    native_functions: IndexSet<String>,
}

impl MeshValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables that will get a Rust closure instead of a textual source.
    pub fn with_native_functions<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.native_functions
            .extend(variables.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self, spec: &MeshSpec) -> ValidationReport {
        let mut diagnostics = Vec::new();
        let declared: IndexSet<&str> = spec
            .mesh
            .keys()
            .chain(spec.initial_values.keys())
            .chain(spec.field_overrides.keys())
            .map(String::as_str)
            .collect();

        for (function, dependencies) in &spec.mesh {
            if !spec.functions.contains_key(function) && !self.native_functions.contains(function) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MissingComputation,
                    function,
                    format!("Function '{function}' in mesh_spec has no implementation in functions_spec"),
                ));
            }
            for dependency in dependencies {
                if !declared.contains(dependency.as_str()) {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::UndeclaredDependency {
                            dependency: dependency.clone(),
                        },
                        function,
                        format!("Function '{function}' depends on undefined variable '{dependency}'"),
                    ));
                }
            }
        }

        for (function, source) in &spec.functions {
            let used = spec.mesh.contains_key(function) || spec.initial_values.contains_key(function);
            if !used {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnusedComputation,
                    function,
                    format!("Function '{function}' defined but never used in mesh or initial values"),
                ));
            }
            if self.native_functions.contains(function) {
                continue;
            }
            let dependencies = spec.mesh.get(function).map(Vec::as_slice).unwrap_or_default();
            match Computation::compile(source, dependencies) {
                Ok(computation) if spec.mesh.contains_key(function) => {
                    for read in computation.undeclared_reads() {
                        diagnostics.push(Diagnostic::new(
                            DiagnosticKind::UndeclaredRead {
                                name: read.name.clone(),
                            },
                            function,
                            format!(
                                "Function '{function}' reads '{}' which is not in its dependency list",
                                read.name
                            ),
                        ));
                    }
                }
                Ok(_) => {}
                Err(kind) => diagnostics.push(compile_diagnostic(function, source, kind)),
            }
        }

        let graph = DependencyGraph::new(spec.mesh.clone());
        for members in graph.cycles() {
            let description = members
                .iter()
                .map(|member| format!("'{member}'"))
                .collect::<Vec<_>>()
                .join(", ");
            let Some(first) = members.first() else {
                continue;
            };
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::Cycle {
                    members: members.iter().map(|member| member.to_string()).collect(),
                },
                first,
                format!("Circular dependency among {description}"),
            ));
        }

        for diagnostic in &diagnostics {
            log::debug!("{diagnostic}");
        }
        ValidationReport { diagnostics }
    }
}

fn compile_diagnostic(function: &str, source: &str, kind: CompileErrorKind) -> Diagnostic {
    let error = CompileError {
        variable: function.to_string(),
        kind,
    };
    let diagnostic_kind = match &error.kind {
        CompileErrorKind::Empty => DiagnosticKind::EmptyComputation,
        CompileErrorKind::Syntax(_) => DiagnosticKind::Syntax,
        CompileErrorKind::ParameterMismatch { .. } => DiagnosticKind::ParameterMismatch,
    };
    let mut diagnostic = Diagnostic::new(diagnostic_kind, function, error.to_string());
    if let CompileErrorKind::Syntax(_) = error.kind {
        diagnostic.rendered = Some(error.render(source));
    }
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(json: &str) -> MeshSpec {
        MeshSpec::from_json(json).unwrap()
    }

    fn kinds(report: &ValidationReport) -> Vec<&DiagnosticKind> {
        report.diagnostics.iter().map(|diagnostic| &diagnostic.kind).collect()
    }

    #[test]
    fn test_valid_mesh() {
        let report = MeshValidator::new().validate(&MeshSpec::template());
        assert!(report.is_valid());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_structural_problems() {
        let report = MeshValidator::new().validate(&spec(
            r#"{
                "mesh_spec": {"total": ["price", "tax"], "tax": ["price"]},
                "functions_spec": {"total": "price + tax", "stray": "1"},
                "initial_values": {"price": 10}
            }"#,
        ));
        assert!(!report.is_valid());
        assert_eq!(
            kinds(&report),
            [&DiagnosticKind::MissingComputation, &DiagnosticKind::UnusedComputation]
        );
        assert_eq!(
            report.diagnostics[0].message,
            "Function 'tax' in mesh_spec has no implementation in functions_spec"
        );
        assert_eq!(
            report.suggest_fixes(),
            [
                "Add the function implementation to functions_spec",
                "Remove unused function or add it to mesh_spec if it should be computed",
            ]
        );
    }

    #[test]
    fn test_undeclared_dependency() {
        let report = MeshValidator::new().validate(&spec(
            r#"{"mesh_spec": {"b": ["a"]}, "functions_spec": {"b": "a"}}"#,
        ));
        assert_eq!(
            report.diagnostics[0].message,
            "Function 'b' depends on undefined variable 'a'"
        );
    }

    #[test]
    fn test_source_problems() {
        let report = MeshValidator::new().validate(&spec(
            r#"{
                "mesh_spec": {"a": ["x"], "b": ["x"], "c": ["x"], "d": ["x"]},
                "functions_spec": {
                    "a": "return (x + 1;",
                    "b": "function(y) { return y; }",
                    "c": "",
                    "d": "x * rate"
                },
                "initial_values": {"x": 1}
            }"#,
        ));
        assert_eq!(
            kinds(&report),
            [
                &DiagnosticKind::Syntax,
                &DiagnosticKind::ParameterMismatch,
                &DiagnosticKind::EmptyComputation,
                &DiagnosticKind::UndeclaredRead {
                    name: "rate".to_string()
                },
            ]
        );
        assert!(report.diagnostics[0].rendered.as_deref().unwrap().contains("a"));
        assert_eq!(report.errors().count(), 3);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_cycles_are_warnings() {
        let report = MeshValidator::new().validate(&spec(
            r#"{
                "mesh_spec": {"a": ["b"], "b": ["a"]},
                "functions_spec": {"a": "b * 0.85", "b": "a / 0.85"},
                "initial_values": {"a": 85}
            }"#,
        ));
        assert!(report.is_valid());
        assert_eq!(
            kinds(&report),
            [&DiagnosticKind::Cycle {
                members: vec!["a".to_string(), "b".to_string()]
            }]
        );
        assert_eq!(report.diagnostics[0].message, "Circular dependency among 'a', 'b'");
    }

    #[test]
    fn test_native_functions_count_as_implementations() {
        let spec = spec(r#"{"mesh_spec": {"b": ["a"]}, "functions_spec": {}, "initial_values": {"a": 1}}"#);
        assert!(!MeshValidator::new().validate(&spec).is_valid());
        assert!(MeshValidator::new().with_native_functions(["b"]).validate(&spec).is_valid());
    }
}
