use super::{
    ArithmeticOperator, Comparator, Expression, FunctionSource, Literal, LogicalOperator,
    SourceError, Spanned, TemplatePart, UnaryOperator,
};
use crate::evaluator::{Builtin, Method};
use crate::value::Value;
use std::ops::Range;

/// Expression with every name bound to a parameter slot, a local slot or a
/// builtin. Produced once per computation at configuration build time.
#[derive(Debug, Clone)]
pub enum Resolved {
    Literal(Value),
    Array(Vec<Resolved>),
    Parameter(usize),
    Local(usize),
    /// A name that is neither a parameter nor a local. Reads as `undefined`.
    Undeclared(String),
    Length(Box<Resolved>),
    Index {
        target: Box<Resolved>,
        index: Box<Resolved>,
    },
    Call {
        builtin: Builtin,
        arguments: Vec<Resolved>,
    },
    Method {
        method: Method,
        receiver: Box<Resolved>,
        arguments: Vec<Resolved>,
    },
    /// Template literal: parts are converted to text and concatenated.
    Template(Vec<Resolved>),
    UnaryOperator {
        operator: UnaryOperator,
        operand: Box<Resolved>,
    },
    ArithmeticOperator {
        operator: ArithmeticOperator,
        operand_a: Box<Resolved>,
        operand_b: Box<Resolved>,
    },
    Comparator {
        comparator: Comparator,
        operand_a: Box<Resolved>,
        operand_b: Box<Resolved>,
    },
    LogicalOperator {
        operator: LogicalOperator,
        operand_a: Box<Resolved>,
        operand_b: Box<Resolved>,
    },
    Conditional {
        condition: Box<Resolved>,
        then: Box<Resolved>,
        otherwise: Box<Resolved>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UndeclaredRead {
    pub name: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedFunction {
    /// Local binding initializers, evaluated in order into local slots.
    pub locals: Vec<Resolved>,
    pub output: Resolved,
    pub undeclared_reads: Vec<UndeclaredRead>,
}

/// Binds names in `source` against `parameters` (the mesh dependency list).
///
/// Locals shadow parameters, and a later `const` with the same name shadows
/// an earlier one. Unknown names are not errors; they become
/// [`Resolved::Undeclared`] and are listed in `undeclared_reads`.
pub fn resolve_function(
    source: &FunctionSource,
    parameters: &[String],
) -> Result<ResolvedFunction, Vec<SourceError>> {
    let mut resolver = ScopeResolver {
        parameters,
        locals: Vec::new(),
        errors: Vec::new(),
        undeclared_reads: Vec::new(),
    };
    let mut locals = Vec::with_capacity(source.body.bindings.len());
    for binding in &source.body.bindings {
        // The initializer cannot see its own binding.
        locals.push(resolver.resolve(&binding.node.value));
        resolver.locals.push(binding.node.name.clone());
    }
    let output = resolver.resolve(&source.body.output);
    if !resolver.errors.is_empty() {
        return Err(resolver.errors);
    }
    Ok(ResolvedFunction {
        locals,
        output,
        undeclared_reads: resolver.undeclared_reads,
    })
}

struct ScopeResolver<'a> {
    parameters: &'a [String],
    locals: Vec<String>,
    errors: Vec<SourceError>,
    undeclared_reads: Vec<UndeclaredRead>,
}

impl ScopeResolver<'_> {
    fn lookup(&self, name: &str) -> Option<Resolved> {
        if let Some(slot) = self.locals.iter().rposition(|local| local == name) {
            return Some(Resolved::Local(slot));
        }
        self.parameters
            .iter()
            .position(|parameter| parameter == name)
            .map(Resolved::Parameter)
    }

    fn is_math_namespace(&self, expression: &Spanned<Expression>) -> bool {
        matches!(&expression.node, Expression::Alias(name) if name == "Math")
            && self.lookup("Math").is_none()
    }

    fn error(&mut self, span: Range<usize>, message: String) -> Resolved {
        self.errors.push(SourceError::new(span, message));
        Resolved::Literal(Value::Undefined)
    }

    fn resolve_all(&mut self, expressions: &[Spanned<Expression>]) -> Vec<Resolved> {
        expressions
            .iter()
            .map(|expression| self.resolve(expression))
            .collect()
    }

    fn resolve_method(
        &mut self,
        span: Range<usize>,
        receiver: &Spanned<Expression>,
        name: &str,
        arguments: &[Spanned<Expression>],
    ) -> Resolved {
        let Some(method) = Method::named(name) else {
            return self.error(span, format!("Unknown method `{name}`"));
        };
        if !method.accepts(arguments.len()) {
            return self.error(
                span,
                format!(
                    "`{name}` expects {} argument(s), found {}",
                    method.arity_description(),
                    arguments.len()
                ),
            );
        }
        Resolved::Method {
            method,
            receiver: Box::new(self.resolve(receiver)),
            arguments: self.resolve_all(arguments),
        }
    }

    fn resolve(&mut self, expression: &Spanned<Expression>) -> Resolved {
        let span = expression.span.into_range();
        match &expression.node {
            Expression::Literal(literal) => Resolved::Literal(match literal {
                Literal::Integer(integer) => Value::Integer(*integer),
                Literal::Number(number) => Value::Number(*number),
                Literal::Text(text) => Value::text(text.as_str()),
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Null | Literal::Undefined => Value::Undefined,
            }),
            Expression::Array { items } => Resolved::Array(self.resolve_all(items)),
            Expression::Alias(name) => {
                if let Some(resolved) = self.lookup(name) {
                    return resolved;
                }
                if name == "Math" {
                    return self.error(span, "`Math` is a namespace, not a value".to_string());
                }
                if Builtin::global(name).is_some() {
                    return self.error(span, format!("`{name}` can only be called"));
                }
                self.undeclared_reads.push(UndeclaredRead {
                    name: name.clone(),
                    span,
                });
                Resolved::Undeclared(name.clone())
            }
            Expression::Property { target, name } => {
                if self.is_math_namespace(target) {
                    if let Some(constant) = math_constant(name) {
                        return Resolved::Literal(Value::Number(constant));
                    }
                    if Builtin::math(name).is_some() {
                        return self.error(span, format!("`Math.{name}` can only be called"));
                    }
                    return self.error(span, format!("Unknown property `Math.{name}`"));
                }
                match name.as_str() {
                    "length" => Resolved::Length(Box::new(self.resolve(target))),
                    _ if Method::named(name).is_some() => {
                        self.error(span, format!("`{name}` can only be called"))
                    }
                    _ => self.error(span, format!("Unknown property `{name}`")),
                }
            }
            Expression::Index { target, index } => Resolved::Index {
                target: Box::new(self.resolve(target)),
                index: Box::new(self.resolve(index)),
            },
            Expression::Call { callee, arguments } => {
                match &callee.node {
                    Expression::Property { target, name } if !self.is_math_namespace(target) => {
                        return self.resolve_method(span, target, name, arguments);
                    }
                    _ => {}
                }
                let builtin = match &callee.node {
                    Expression::Alias(name) if self.lookup(name).is_none() => {
                        Builtin::global(name).ok_or_else(|| format!("Unknown function `{name}`"))
                    }
                    Expression::Property { target, name } if self.is_math_namespace(target) => {
                        Builtin::math(name).ok_or_else(|| format!("Unknown function `Math.{name}`"))
                    }
                    _ => Err("Only builtin functions and methods can be called".to_string()),
                };
                let builtin = match builtin {
                    Ok(builtin) => builtin,
                    Err(message) => return self.error(span, message),
                };
                if !builtin.accepts(arguments.len()) {
                    return self.error(
                        span,
                        format!(
                            "`{}` expects {} argument(s), found {}",
                            builtin.name(),
                            builtin.arity_description(),
                            arguments.len()
                        ),
                    );
                }
                Resolved::Call {
                    builtin,
                    arguments: self.resolve_all(arguments),
                }
            }
            Expression::Template { parts } => Resolved::Template(
                parts
                    .iter()
                    .map(|part| match part {
                        TemplatePart::Text(text) => Resolved::Literal(Value::text(text.as_str())),
                        TemplatePart::Expression(expression) => self.resolve(expression),
                    })
                    .collect(),
            ),
            Expression::UnaryOperator { operator, operand } => Resolved::UnaryOperator {
                operator: *operator,
                operand: Box::new(self.resolve(operand)),
            },
            Expression::ArithmeticOperator {
                operator,
                operand_a,
                operand_b,
            } => Resolved::ArithmeticOperator {
                operator: *operator,
                operand_a: Box::new(self.resolve(operand_a)),
                operand_b: Box::new(self.resolve(operand_b)),
            },
            Expression::Comparator {
                comparator,
                operand_a,
                operand_b,
            } => Resolved::Comparator {
                comparator: *comparator,
                operand_a: Box::new(self.resolve(operand_a)),
                operand_b: Box::new(self.resolve(operand_b)),
            },
            Expression::LogicalOperator {
                operator,
                operand_a,
                operand_b,
            } => Resolved::LogicalOperator {
                operator: *operator,
                operand_a: Box::new(self.resolve(operand_a)),
                operand_b: Box::new(self.resolve(operand_b)),
            },
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => Resolved::Conditional {
                condition: Box::new(self.resolve(condition)),
                then: Box::new(self.resolve(then)),
                otherwise: Box::new(self.resolve(otherwise)),
            },
        }
    }
}

fn math_constant(name: &str) -> Option<f64> {
    use std::f64::consts;
    Some(match name {
        "PI" => consts::PI,
        "E" => consts::E,
        "LN2" => consts::LN_2,
        "LN10" => consts::LN_10,
        "LOG2E" => consts::LOG2_E,
        "LOG10E" => consts::LOG10_E,
        "SQRT2" => consts::SQRT_2,
        "SQRT1_2" => consts::FRAC_1_SQRT_2,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn resolve(code: &str, parameters: &[&str]) -> Result<ResolvedFunction, Vec<SourceError>> {
        let parameters: Vec<String> = parameters.iter().map(|name| name.to_string()).collect();
        resolve_function(&parse(code).unwrap(), &parameters)
    }

    #[test]
    fn test_parameters_resolve_by_position() {
        let function = resolve("b - a", &["a", "b"]).unwrap();
        let Resolved::ArithmeticOperator {
            operand_a,
            operand_b,
            ..
        } = function.output
        else {
            panic!("expected arithmetic");
        };
        assert!(matches!(*operand_a, Resolved::Parameter(1)));
        assert!(matches!(*operand_b, Resolved::Parameter(0)));
    }

    #[test]
    fn test_local_shadows_parameter() {
        let function = resolve("const a = a * 2; return a;", &["a"]).unwrap();
        assert!(matches!(function.locals[0], Resolved::ArithmeticOperator { .. }));
        assert!(matches!(function.output, Resolved::Local(0)));
    }

    #[test]
    fn test_undeclared_reads_are_recorded() {
        let function = resolve("a + other", &["a"]).unwrap();
        assert_eq!(function.undeclared_reads.len(), 1);
        assert_eq!(function.undeclared_reads[0].name, "other");
    }

    #[test]
    fn test_math_builtins_and_constants() {
        let function = resolve("Math.round(r * r * Math.PI)", &["r"]).unwrap();
        assert!(matches!(
            function.output,
            Resolved::Call {
                builtin: Builtin::Round,
                ..
            }
        ));
        let function = resolve("sqrt(x)", &["x"]).unwrap();
        assert!(matches!(
            function.output,
            Resolved::Call {
                builtin: Builtin::Sqrt,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_function_and_arity_are_errors() {
        let errors = resolve("Math.nope(x) + pow(x)", &["x"]).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("Math.nope"));
        assert!(errors[1].message.contains("pow"));
    }

    #[test]
    fn test_methods_resolve_on_their_receiver() {
        let function = resolve("name.trim().toUpperCase()", &["name"]).unwrap();
        let Resolved::Method {
            method, receiver, ..
        } = function.output
        else {
            panic!("expected method");
        };
        assert_eq!(method, Method::ToUpperCase);
        assert!(matches!(
            *receiver,
            Resolved::Method {
                method: Method::Trim,
                ..
            }
        ));

        let errors = resolve("name.shout() + name.includes()", &["name"]).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("Unknown method `shout`"));
        assert!(errors[1].message.contains("`includes` expects 1 argument(s), found 0"));
        assert!(resolve("name.trim", &["name"]).is_err());
    }

    #[test]
    fn test_template_parts_resolve() {
        let function = resolve("`${a} and ${other}`", &["a"]).unwrap();
        let Resolved::Template(parts) = function.output else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[0], Resolved::Parameter(0)));
        assert_eq!(function.undeclared_reads[0].name, "other");
    }

    #[test]
    fn test_length_property() {
        let function = resolve("items.length", &["items"]).unwrap();
        assert!(matches!(function.output, Resolved::Length(_)));
        assert!(resolve("items.size", &["items"]).is_err());
    }
}
