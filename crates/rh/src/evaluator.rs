//! Evaluation of resolved computations against dependency values.

use crate::parser::{
    ArithmeticOperator, Comparator, LogicalOperator, Resolved, ResolvedFunction, UnaryOperator,
};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Type {
        operation: &'static str,
        found: &'static str,
    },
    IndexOutOfRange {
        index: i64,
        length: usize,
    },
    /// Raised by native computations.
    Failed(String),
}

impl EvalError {
    pub fn failed(message: impl Into<String>) -> Self {
        EvalError::Failed(message.into())
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Type { operation, found } => {
                write!(f, "cannot apply {operation} to {found}")
            }
            EvalError::IndexOutOfRange { index, length } => {
                write!(f, "index {index} out of range for length {length}")
            }
            EvalError::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for EvalError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Ceil,
    Floor,
    Round,
    Trunc,
    Sign,
    Sqrt,
    Cbrt,
    Exp,
    Log,
    Log10,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Pow,
    Min,
    Max,
    Hypot,
    Number,
    String,
    Boolean,
    IsNaN,
    IsFinite,
    ParseFloat,
    ParseInt,
}

impl Builtin {
    /// Functions reachable as `Math.name(...)`.
    pub fn math(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "ceil" => Self::Ceil,
            "floor" => Self::Floor,
            "round" => Self::Round,
            "trunc" => Self::Trunc,
            "sign" => Self::Sign,
            "sqrt" => Self::Sqrt,
            "cbrt" => Self::Cbrt,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "log10" => Self::Log10,
            "log2" => Self::Log2,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "pow" => Self::Pow,
            "min" => Self::Min,
            "max" => Self::Max,
            "hypot" => Self::Hypot,
            _ => return None,
        })
    }

    /// Functions callable by bare name: the math functions plus conversions.
    pub fn global(name: &str) -> Option<Self> {
        Self::math(name).or(match name {
            "Number" => Some(Self::Number),
            "String" => Some(Self::String),
            "Boolean" => Some(Self::Boolean),
            "isNaN" => Some(Self::IsNaN),
            "isFinite" => Some(Self::IsFinite),
            "parseFloat" => Some(Self::ParseFloat),
            "parseInt" => Some(Self::ParseInt),
            _ => None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Ceil => "ceil",
            Self::Floor => "floor",
            Self::Round => "round",
            Self::Trunc => "trunc",
            Self::Sign => "sign",
            Self::Sqrt => "sqrt",
            Self::Cbrt => "cbrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Log2 => "log2",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
            Self::Hypot => "hypot",
            Self::Number => "Number",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::IsNaN => "isNaN",
            Self::IsFinite => "isFinite",
            Self::ParseFloat => "parseFloat",
            Self::ParseInt => "parseInt",
        }
    }

    fn is_variadic(self) -> bool {
        matches!(self, Self::Min | Self::Max | Self::Hypot)
    }

    fn arity(self) -> usize {
        match self {
            Self::Atan2 | Self::Pow => 2,
            Self::Min | Self::Max | Self::Hypot => 0,
            _ => 1,
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        self.is_variadic() || count == self.arity()
    }

    pub fn arity_description(self) -> String {
        if self.is_variadic() {
            "any number of".to_string()
        } else {
            self.arity().to_string()
        }
    }

    pub fn apply(self, arguments: &[Value]) -> Result<Value, EvalError> {
        let operation = self.name();
        const UNDEFINED: &Value = &Value::Undefined;
        let argument = |index: usize| arguments.get(index).unwrap_or(UNDEFINED);
        let unary = |function: fn(f64) -> f64| -> Result<Value, EvalError> {
            Ok(Value::Number(function(number(operation, argument(0))?)))
        };
        match self {
            Self::Abs => match argument(0) {
                Value::Integer(integer) => Ok(integer
                    .checked_abs()
                    .map(Value::Integer)
                    .unwrap_or(Value::Number((*integer as f64).abs()))),
                other => Ok(Value::Number(number(operation, other)?.abs())),
            },
            Self::Ceil | Self::Floor | Self::Round | Self::Trunc
                if matches!(argument(0), Value::Integer(_)) =>
            {
                Ok(argument(0).clone())
            }
            Self::Ceil => unary(f64::ceil),
            Self::Floor => unary(f64::floor),
            // Halves round towards positive infinity.
            Self::Round => unary(|x| (x + 0.5).floor()),
            Self::Trunc => unary(f64::trunc),
            Self::Sign => unary(|x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
            Self::Sqrt => unary(f64::sqrt),
            Self::Cbrt => unary(f64::cbrt),
            Self::Exp => unary(f64::exp),
            Self::Log => unary(f64::ln),
            Self::Log10 => unary(f64::log10),
            Self::Log2 => unary(f64::log2),
            Self::Sin => unary(f64::sin),
            Self::Cos => unary(f64::cos),
            Self::Tan => unary(f64::tan),
            Self::Asin => unary(f64::asin),
            Self::Acos => unary(f64::acos),
            Self::Atan => unary(f64::atan),
            Self::Atan2 => Ok(Value::Number(f64::atan2(
                number(operation, argument(0))?,
                number(operation, argument(1))?,
            ))),
            Self::Pow => Ok(Value::Number(f64::powf(
                number(operation, argument(0))?,
                number(operation, argument(1))?,
            ))),
            Self::Min | Self::Max => extremum(self == Self::Min, operation, arguments),
            Self::Hypot => {
                let mut sum = 0.0;
                for argument in arguments {
                    sum += number(operation, argument)?.powi(2);
                }
                Ok(Value::Number(sum.sqrt()))
            }
            Self::Number => Ok(to_number(argument(0))),
            Self::String => Ok(Value::text(argument(0).to_string())),
            Self::Boolean => Ok(Value::Bool(argument(0).is_truthy())),
            Self::IsNaN => Ok(Value::Bool(
                to_number(argument(0)).as_f64().is_none_or(f64::is_nan),
            )),
            Self::IsFinite => Ok(Value::Bool(
                to_number(argument(0)).as_f64().is_some_and(f64::is_finite),
            )),
            Self::ParseFloat => Ok(match argument(0) {
                Value::Integer(_) | Value::Number(_) => argument(0).clone(),
                other => parse_number_prefix(&other.to_string()),
            }),
            Self::ParseInt => Ok(match argument(0) {
                Value::Integer(_) => argument(0).clone(),
                Value::Number(number) if number.is_finite() => Value::Integer(number.trunc() as i64),
                other => parse_integer_prefix(&other.to_string()),
            }),
        }
    }
}

/// Methods called on a value, as in `name.toUpperCase()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ToUpperCase,
    ToLowerCase,
    Trim,
    ToFixed,
    ToString,
    Includes,
    StartsWith,
    EndsWith,
    Join,
}

impl Method {
    pub fn named(name: &str) -> Option<Self> {
        Some(match name {
            "toUpperCase" => Self::ToUpperCase,
            "toLowerCase" => Self::ToLowerCase,
            "trim" => Self::Trim,
            "toFixed" => Self::ToFixed,
            "toString" => Self::ToString,
            "includes" => Self::Includes,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "join" => Self::Join,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ToUpperCase => "toUpperCase",
            Self::ToLowerCase => "toLowerCase",
            Self::Trim => "trim",
            Self::ToFixed => "toFixed",
            Self::ToString => "toString",
            Self::Includes => "includes",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Join => "join",
        }
    }

    /// Accepted argument counts, inclusive.
    fn arity(self) -> (usize, usize) {
        match self {
            Self::ToUpperCase | Self::ToLowerCase | Self::Trim | Self::ToString => (0, 0),
            Self::ToFixed | Self::Join => (0, 1),
            Self::Includes | Self::StartsWith | Self::EndsWith => (1, 1),
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        let (minimum, maximum) = self.arity();
        (minimum..=maximum).contains(&count)
    }

    pub fn arity_description(self) -> String {
        match self.arity() {
            (minimum, maximum) if minimum == maximum => minimum.to_string(),
            (minimum, maximum) => format!("{minimum} to {maximum}"),
        }
    }

    pub fn apply(self, receiver: &Value, arguments: &[Value]) -> Result<Value, EvalError> {
        let operation = self.name();
        let mismatch = |value: &Value| EvalError::Type {
            operation,
            found: value.type_name(),
        };
        let text = |value: &Value| value.as_str().map(str::to_owned).ok_or_else(|| mismatch(value));
        let argument = arguments.first();
        match self {
            Self::ToUpperCase => Ok(Value::text(text(receiver)?.to_uppercase())),
            Self::ToLowerCase => Ok(Value::text(text(receiver)?.to_lowercase())),
            Self::Trim => Ok(Value::text(text(receiver)?.trim())),
            Self::ToString => match receiver {
                Value::Undefined => Err(mismatch(receiver)),
                other => Ok(Value::text(other.to_string())),
            },
            Self::ToFixed => {
                let number = number(operation, receiver)?;
                let digits = match argument.map(|digits| (digits, digits.as_f64())) {
                    None => 0,
                    Some((_, Some(digits))) if digits.fract() == 0.0 && (0.0..=100.0).contains(&digits) => {
                        digits as usize
                    }
                    Some((other, _)) => {
                        return Err(EvalError::failed(format!(
                            "toFixed() digits must be an integer between 0 and 100, got {other}"
                        )));
                    }
                };
                Ok(Value::text(to_fixed(number, digits)))
            }
            Self::Includes => match receiver {
                Value::Array(items) => Ok(Value::Bool(
                    argument.is_some_and(|argument| items.contains(argument)),
                )),
                Value::Text(haystack) => {
                    let needle = argument.map(Value::to_string).unwrap_or_default();
                    Ok(Value::Bool(haystack.contains(needle.as_str())))
                }
                other => Err(mismatch(other)),
            },
            Self::StartsWith | Self::EndsWith => {
                let haystack = text(receiver)?;
                let needle = argument.map(Value::to_string).unwrap_or_default();
                Ok(Value::Bool(if self == Self::StartsWith {
                    haystack.starts_with(&needle)
                } else {
                    haystack.ends_with(&needle)
                }))
            }
            Self::Join => {
                let Value::Array(items) = receiver else {
                    return Err(mismatch(receiver));
                };
                let separator = match argument {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(separator) => separator.to_string(),
                };
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::Undefined => String::new(),
                        item => item.to_string(),
                    })
                    .collect();
                Ok(Value::text(parts.join(&separator)))
            }
        }
    }
}

/// Fixed-point notation where ties round away from zero.
fn to_fixed(number: f64, digits: usize) -> String {
    if !number.is_finite() {
        return Value::Number(number).to_string();
    }
    // `{:.N}` alone would round ties to even.
    let scaled = number.abs() * 10f64.powi(digits as i32);
    if scaled.fract() == 0.5 {
        let rounded = scaled.ceil() / 10f64.powi(digits as i32);
        let sign = if number < 0.0 { "-" } else { "" };
        return format!("{sign}{rounded:.digits$}");
    }
    format!("{number:.digits$}")
}

fn number(operation: &'static str, value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or(EvalError::Type {
        operation,
        found: value.type_name(),
    })
}

fn extremum(minimum: bool, operation: &'static str, arguments: &[Value]) -> Result<Value, EvalError> {
    if arguments.iter().all(|argument| matches!(argument, Value::Integer(_))) && !arguments.is_empty() {
        let integers = arguments.iter().filter_map(|argument| match argument {
            Value::Integer(integer) => Some(*integer),
            _ => None,
        });
        let result = if minimum { integers.min() } else { integers.max() };
        return Ok(result.map(Value::Integer).unwrap_or_default());
    }
    let mut result = if minimum { f64::INFINITY } else { f64::NEG_INFINITY };
    for argument in arguments {
        let value = number(operation, argument)?;
        if value.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        result = if minimum { result.min(value) } else { result.max(value) };
    }
    Ok(Value::Number(result))
}

/// Script-style numeric conversion. Non-numeric text becomes `NaN`.
pub fn to_number(value: &Value) -> Value {
    match value {
        Value::Integer(_) | Value::Number(_) => value.clone(),
        Value::Bool(value) => Value::Integer(i64::from(*value)),
        Value::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Value::Integer(0);
            }
            text.parse::<i64>()
                .map(Value::Integer)
                .or_else(|_| text.parse::<f64>().map(Value::Number))
                .unwrap_or(Value::Number(f64::NAN))
        }
        Value::Undefined | Value::Array(_) => Value::Number(f64::NAN),
    }
}

fn parse_number_prefix(text: &str) -> Value {
    let text = text.trim_start();
    (1..=text.len())
        .rev()
        .filter(|end| text.is_char_boundary(*end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .map(Value::Number)
        .unwrap_or(Value::Number(f64::NAN))
}

fn parse_integer_prefix(text: &str) -> Value {
    let text = text.trim_start();
    let sign_length = usize::from(text.starts_with(['-', '+']));
    let digit_count = text[sign_length..]
        .chars()
        .take_while(char::is_ascii_digit)
        .count();
    text[..sign_length + digit_count]
        .parse::<i64>()
        .map(Value::Integer)
        .unwrap_or(Value::Number(f64::NAN))
}

/// Runs `function` with `arguments` bound to its parameter slots in order.
/// Missing arguments read as `undefined`.
pub fn evaluate(function: &ResolvedFunction, arguments: &[Value]) -> Result<Value, EvalError> {
    let mut frame = Frame {
        arguments,
        locals: Vec::with_capacity(function.locals.len()),
    };
    for local in &function.locals {
        let value = frame.evaluate(local)?;
        frame.locals.push(value);
    }
    frame.evaluate(&function.output)
}

struct Frame<'a> {
    arguments: &'a [Value],
    locals: Vec<Value>,
}

impl Frame<'_> {
    fn evaluate(&self, expression: &Resolved) -> Result<Value, EvalError> {
        match expression {
            Resolved::Literal(value) => Ok(value.clone()),
            Resolved::Array(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::array),
            Resolved::Parameter(slot) => Ok(self.arguments.get(*slot).cloned().unwrap_or_default()),
            Resolved::Local(slot) => Ok(self.locals.get(*slot).cloned().unwrap_or_default()),
            Resolved::Undeclared(_) => Ok(Value::Undefined),
            Resolved::Length(target) => match self.evaluate(target)? {
                Value::Array(items) => Ok(Value::Integer(items.len() as i64)),
                Value::Text(text) => Ok(Value::Integer(text.chars().count() as i64)),
                other => Err(EvalError::Type {
                    operation: "length",
                    found: other.type_name(),
                }),
            },
            Resolved::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                index_into(&target, &index)
            }
            Resolved::Call { builtin, arguments } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.evaluate(argument))
                    .collect::<Result<Vec<_>, _>>()?;
                builtin.apply(&arguments)
            }
            Resolved::Method {
                method,
                receiver,
                arguments,
            } => {
                let receiver = self.evaluate(receiver)?;
                let arguments = arguments
                    .iter()
                    .map(|argument| self.evaluate(argument))
                    .collect::<Result<Vec<_>, _>>()?;
                method.apply(&receiver, &arguments)
            }
            Resolved::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&self.evaluate(part)?.to_string());
                }
                Ok(Value::text(text))
            }
            Resolved::UnaryOperator { operator, operand } => {
                unary(*operator, self.evaluate(operand)?)
            }
            Resolved::ArithmeticOperator {
                operator,
                operand_a,
                operand_b,
            } => arithmetic(*operator, &self.evaluate(operand_a)?, &self.evaluate(operand_b)?),
            Resolved::Comparator {
                comparator,
                operand_a,
                operand_b,
            } => compare(*comparator, &self.evaluate(operand_a)?, &self.evaluate(operand_b)?),
            Resolved::LogicalOperator {
                operator,
                operand_a,
                operand_b,
            } => {
                let a = self.evaluate(operand_a)?;
                let short_circuits = match operator {
                    LogicalOperator::And => !a.is_truthy(),
                    LogicalOperator::Or => a.is_truthy(),
                };
                if short_circuits {
                    Ok(a)
                } else {
                    self.evaluate(operand_b)
                }
            }
            Resolved::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then)
                } else {
                    self.evaluate(otherwise)
                }
            }
        }
    }
}

fn index_into(target: &Value, index: &Value) -> Result<Value, EvalError> {
    let position = match index {
        Value::Integer(integer) => *integer,
        Value::Number(number) if number.fract() == 0.0 => *number as i64,
        other => {
            return Err(EvalError::Type {
                operation: "index",
                found: other.type_name(),
            });
        }
    };
    let out_of_range = |length| EvalError::IndexOutOfRange {
        index: position,
        length,
    };
    let slot = usize::try_from(position);
    match target {
        Value::Array(items) => slot
            .ok()
            .and_then(|slot| items.get(slot))
            .cloned()
            .ok_or_else(|| out_of_range(items.len())),
        Value::Text(text) => slot
            .ok()
            .and_then(|slot| text.chars().nth(slot))
            .map(|character| Value::text(character.to_string()))
            .ok_or_else(|| out_of_range(text.chars().count())),
        other => Err(EvalError::Type {
            operation: "index",
            found: other.type_name(),
        }),
    }
}

fn unary(operator: UnaryOperator, operand: Value) -> Result<Value, EvalError> {
    match (operator, operand) {
        (UnaryOperator::Not, operand) => Ok(Value::Bool(!operand.is_truthy())),
        (UnaryOperator::Negate, Value::Integer(integer)) => Ok(integer
            .checked_neg()
            .map(Value::Integer)
            .unwrap_or(Value::Number(-(integer as f64)))),
        (UnaryOperator::Negate, Value::Number(number)) => Ok(Value::Number(-number)),
        (UnaryOperator::Plus, operand @ (Value::Integer(_) | Value::Number(_) | Value::Text(_))) => {
            Ok(to_number(&operand))
        }
        (operator, operand) => Err(EvalError::Type {
            operation: match operator {
                UnaryOperator::Negate => "unary -",
                _ => "unary +",
            },
            found: operand.type_name(),
        }),
    }
}

fn operator_symbol(operator: ArithmeticOperator) -> &'static str {
    match operator {
        ArithmeticOperator::Add => "+",
        ArithmeticOperator::Subtract => "-",
        ArithmeticOperator::Multiply => "*",
        ArithmeticOperator::Divide => "/",
        ArithmeticOperator::Remainder => "%",
        ArithmeticOperator::Power => "**",
    }
}

fn arithmetic(operator: ArithmeticOperator, a: &Value, b: &Value) -> Result<Value, EvalError> {
    if operator == ArithmeticOperator::Add
        && (matches!(a, Value::Text(_)) || matches!(b, Value::Text(_)))
        && !a.is_undefined()
        && !b.is_undefined()
    {
        return Ok(Value::text(format!("{a}{b}")));
    }
    let operation = operator_symbol(operator);
    if let (Value::Integer(a), Value::Integer(b)) = (a, b) {
        let exact = match operator {
            ArithmeticOperator::Add => a.checked_add(*b),
            ArithmeticOperator::Subtract => a.checked_sub(*b),
            ArithmeticOperator::Multiply => a.checked_mul(*b),
            ArithmeticOperator::Remainder => a.checked_rem(*b),
            ArithmeticOperator::Divide | ArithmeticOperator::Power => None,
        };
        if let Some(exact) = exact {
            return Ok(Value::Integer(exact));
        }
    }
    let a = number(operation, a)?;
    let b = number(operation, b)?;
    Ok(Value::Number(match operator {
        ArithmeticOperator::Add => a + b,
        ArithmeticOperator::Subtract => a - b,
        ArithmeticOperator::Multiply => a * b,
        ArithmeticOperator::Divide => a / b,
        ArithmeticOperator::Remainder => a % b,
        ArithmeticOperator::Power => a.powf(b),
    }))
}

fn compare(comparator: Comparator, a: &Value, b: &Value) -> Result<Value, EvalError> {
    let ordering = match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (a, b) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    let result = match comparator {
        // NaN is never equal to itself here, unlike change detection.
        Comparator::Equal => ordering.map_or_else(|| a.as_f64().is_none() && a == b, Ordering::is_eq),
        Comparator::NotEqual => {
            !ordering.map_or_else(|| a.as_f64().is_none() && a == b, Ordering::is_eq)
        }
        relational => {
            let comparable = (a.as_f64().is_some() && b.as_f64().is_some())
                || (matches!(a, Value::Text(_)) && matches!(b, Value::Text(_)));
            if !comparable {
                return Err(EvalError::Type {
                    operation: "comparison",
                    found: if a.as_f64().is_some() || matches!(a, Value::Text(_)) {
                        b.type_name()
                    } else {
                        a.type_name()
                    },
                });
            }
            match (relational, ordering) {
                (_, None) => false,
                (Comparator::Greater, Some(ordering)) => ordering.is_gt(),
                (Comparator::GreaterOrEqual, Some(ordering)) => ordering.is_ge(),
                (Comparator::Less, Some(ordering)) => ordering.is_lt(),
                (Comparator::LessOrEqual, Some(ordering)) => ordering.is_le(),
                (Comparator::Equal | Comparator::NotEqual, Some(_)) => false,
            }
        }
    };
    Ok(Value::Bool(result))
}
