//! Computation source language.
//!
//! A computation is written as a single expression (`celsius * 9 / 5 + 32`),
//! as a body with optional local bindings and a `return`
//! (`const f = celsius * 9 / 5; return f + 32;`), or as a full
//! `function(celsius) { ... }` whose parameters must match the mesh entry.
//! Sources are lexed and parsed once when the configuration is built.

use ariadne::{Config, Label, Report, ReportKind, Source as ReportSource};
use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::fmt;
use std::io::Cursor;
use std::ops::Range;

mod lexer;
pub use lexer::{Token, lexer};

mod scope_resolver;
pub use scope_resolver::{Resolved, ResolvedFunction, UndeclaredRead, resolve_function};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// A lexing, parsing or resolution problem located in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceError {
    pub span: Range<usize>,
    pub message: String,
    pub label: String,
}

impl SourceError {
    pub fn new(span: Range<usize>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            span,
            label: message.clone(),
            message,
        }
    }

    fn from_rich<T: fmt::Display>(error: ParseError<'_, T>) -> Self {
        Self {
            span: error.span().into_range(),
            message: error.to_string(),
            label: error.reason().to_string(),
        }
    }

    /// Renders the error as a plain-text ariadne report over `source_code`.
    pub fn report(&self, filename: &str, source_code: &str) -> String {
        let mut report_bytes = Cursor::new(Vec::new());
        let written = Report::build(ReportKind::Error, (filename, self.span.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(&self.message)
            .with_label(Label::new((filename, self.span.clone())).with_message(&self.label))
            .finish()
            .write((filename, ReportSource::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => String::from_utf8_lossy(report_bytes.get_ref()).into_owned(),
            Err(_) => format!("{filename}:{}..{}: {}", self.span.start, self.span.end, self.message),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Array {
        items: Vec<Spanned<Self>>,
    },
    Alias(String),
    Property {
        target: Box<Spanned<Self>>,
        name: String,
    },
    Index {
        target: Box<Spanned<Self>>,
        index: Box<Spanned<Self>>,
    },
    Call {
        callee: Box<Spanned<Self>>,
        arguments: Vec<Spanned<Self>>,
    },
    UnaryOperator {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    ArithmeticOperator {
        operator: ArithmeticOperator,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    Comparator {
        comparator: Comparator,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    LogicalOperator {
        operator: LogicalOperator,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    Conditional {
        condition: Box<Spanned<Self>>,
        then: Box<Spanned<Self>>,
        otherwise: Box<Spanned<Self>>,
    },
    Template {
        parts: Vec<TemplatePart>,
    },
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Text(String),
    Expression(Spanned<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub value: Spanned<Expression>,
}

#[derive(Debug, Clone)]
pub struct Body {
    pub bindings: Vec<Spanned<Binding>>,
    pub output: Spanned<Expression>,
}

/// A parsed computation source.
#[derive(Debug, Clone)]
pub struct FunctionSource {
    /// Present only for the `function(a, b) { ... }` form.
    pub parameters: Option<Vec<Spanned<String>>>,
    pub body: Body,
}

enum Postfix {
    Property(String),
    Index(Spanned<Expression>),
    Call(Vec<Spanned<Expression>>),
}

fn binary(node: Expression, span: Span) -> Spanned<Expression> {
    Spanned { span, node }
}

fn expression_parser<'code, I>()
-> impl Parser<'code, I, Spanned<Expression>, extra::Err<ParseError<'code, Token<'code>>>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let identifier = select! { Token::Identifier(identifier) => identifier.to_string() };
    let bracket_round_open = just(Token::BracketRoundOpen);
    let bracket_round_close = just(Token::BracketRoundClose);
    let bracket_square_open = just(Token::BracketSquareOpen);
    let bracket_square_close = just(Token::BracketSquareClose);
    let comma = just(Token::Comma);

    recursive(|expression| {
        let literal = select! {
            Token::Integer(integer) => Literal::Integer(integer),
            Token::Number(number) => Literal::Number(number),
            Token::Text(text) => Literal::Text(text.to_string()),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            Token::Undefined => Literal::Undefined,
        };

        let array = expression
            .clone()
            .separated_by(comma.clone())
            .allow_trailing()
            .collect()
            .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
            .map(|items| Expression::Array { items });

        let nested = expression
            .clone()
            .delimited_by(bracket_round_open.clone(), bracket_round_close.clone());

        let template = select! { Token::Template(raw) => raw }.try_map(|raw: &str, span: Span| {
            // Contents start after the opening backtick.
            template_parts(raw, span.start + 1)
                .map(|parts| Expression::Template { parts })
                .map_err(|error| ParseError::custom(Span::from(error.span), error.message))
        });

        let atom = choice((
            literal.map(Expression::Literal),
            identifier.clone().map(Expression::Alias),
            array,
            template,
        ))
        .map_with(|node, extra| Spanned {
            node,
            span: extra.span(),
        })
        .or(nested);

        let arguments = expression
            .clone()
            .separated_by(comma.clone())
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(bracket_round_open.clone(), bracket_round_close.clone());

        let postfix = choice((
            just(Token::Dot)
                .ignore_then(identifier.clone())
                .map(Postfix::Property),
            expression
                .clone()
                .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
                .map(Postfix::Index),
            arguments.map(Postfix::Call),
        ));

        let access = atom.foldl_with(postfix.repeated(), |target, postfix, extra| {
            let target = Box::new(target);
            let node = match postfix {
                Postfix::Property(name) => Expression::Property { target, name },
                Postfix::Index(index) => Expression::Index {
                    target,
                    index: Box::new(index),
                },
                Postfix::Call(arguments) => Expression::Call {
                    callee: target,
                    arguments,
                },
            };
            Spanned {
                node,
                span: extra.span(),
            }
        });

        let equality = select! {
            Token::StrictEqual => Comparator::Equal,
            Token::Equal => Comparator::Equal,
            Token::StrictNotEqual => Comparator::NotEqual,
            Token::NotEqual => Comparator::NotEqual,
        };
        let relational = select! {
            Token::Greater => Comparator::Greater,
            Token::GreaterOrEqual => Comparator::GreaterOrEqual,
            Token::Less => Comparator::Less,
            Token::LessOrEqual => Comparator::LessOrEqual,
        };
        let additive = select! {
            Token::Plus => ArithmeticOperator::Add,
            Token::Minus => ArithmeticOperator::Subtract,
        };
        let multiplicative = select! {
            Token::Asterisk => ArithmeticOperator::Multiply,
            Token::Slash => ArithmeticOperator::Divide,
            Token::Percent => ArithmeticOperator::Remainder,
        };
        let unary = select! {
            Token::Minus => UnaryOperator::Negate,
            Token::Plus => UnaryOperator::Plus,
            Token::Bang => UnaryOperator::Not,
        };

        let operation = access.pratt((
            // Precedence 1 (lowest): logical or
            infix(left(1), just(Token::Or), |l, _, r, extra| {
                binary(
                    Expression::LogicalOperator {
                        operator: LogicalOperator::Or,
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    },
                    extra.span(),
                )
            }),
            infix(left(2), just(Token::And), |l, _, r, extra| {
                binary(
                    Expression::LogicalOperator {
                        operator: LogicalOperator::And,
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    },
                    extra.span(),
                )
            }),
            infix(left(3), equality, |l, comparator, r, extra| {
                binary(
                    Expression::Comparator {
                        comparator,
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    },
                    extra.span(),
                )
            }),
            infix(left(4), relational, |l, comparator, r, extra| {
                binary(
                    Expression::Comparator {
                        comparator,
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    },
                    extra.span(),
                )
            }),
            infix(left(5), additive, |l, operator, r, extra| {
                binary(
                    Expression::ArithmeticOperator {
                        operator,
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    },
                    extra.span(),
                )
            }),
            infix(left(6), multiplicative, |l, operator, r, extra| {
                binary(
                    Expression::ArithmeticOperator {
                        operator,
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    },
                    extra.span(),
                )
            }),
            prefix(7, unary, |operator, operand, extra| {
                binary(
                    Expression::UnaryOperator {
                        operator,
                        operand: Box::new(operand),
                    },
                    extra.span(),
                )
            }),
            // `**` binds tighter than unary minus and is right associative
            infix(right(8), just(Token::DoubleAsterisk), |l, _, r, extra| {
                binary(
                    Expression::ArithmeticOperator {
                        operator: ArithmeticOperator::Power,
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    },
                    extra.span(),
                )
            }),
        ));

        operation
            .then(
                just(Token::Question)
                    .ignore_then(expression.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expression.clone())
                    .or_not(),
            )
            .map_with(|(condition, branches), extra| match branches {
                None => condition,
                Some((then, otherwise)) => Spanned {
                    span: extra.span(),
                    node: Expression::Conditional {
                        condition: Box::new(condition),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                },
            })
    })
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, FunctionSource, extra::Err<ParseError<'code, Token<'code>>>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let identifier = select! { Token::Identifier(identifier) => identifier.to_string() };
    let bracket_round_open = just(Token::BracketRoundOpen);
    let bracket_round_close = just(Token::BracketRoundClose);
    let bracket_curly_open = just(Token::BracketCurlyOpen);
    let bracket_curly_close = just(Token::BracketCurlyClose);
    let comma = just(Token::Comma);
    let semicolon = just(Token::Semicolon);

    let expression = expression_parser();

    let binding = choice((just(Token::Const), just(Token::Let), just(Token::Var)))
        .ignore_then(identifier.clone())
        .then_ignore(just(Token::Assign))
        .then(expression.clone())
        .then_ignore(semicolon.clone().repeated().at_least(1))
        .map_with(|(name, value), extra| Spanned {
            node: Binding { name, value },
            span: extra.span(),
        });

    let output = just(Token::Return)
        .or_not()
        .ignore_then(expression)
        .then_ignore(semicolon.repeated());

    let body = binding
        .repeated()
        .collect::<Vec<_>>()
        .then(output)
        .map(|(bindings, output)| Body { bindings, output });

    let parameters = identifier
        .clone()
        .map_with(|name, extra| Spanned {
            node: name,
            span: extra.span(),
        })
        .separated_by(comma)
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(bracket_round_open, bracket_round_close);

    let function = just(Token::Function)
        .ignore_then(identifier.or_not())
        .ignore_then(parameters)
        .then(body.clone().delimited_by(bracket_curly_open, bracket_curly_close))
        .map(|(parameters, body)| FunctionSource {
            parameters: Some(parameters),
            body,
        });

    choice((
        function,
        body.map(|body| FunctionSource {
            parameters: None,
            body,
        }),
    ))
}

/// Lexes `code` whose first character sits at `offset` in the full source,
/// dropping comments. Spans are absolute.
fn lex(code: &str, offset: usize) -> Result<Vec<Spanned<Token<'_>>>, Vec<SourceError>> {
    let shift = |span: Range<usize>| span.start + offset..span.end + offset;
    let (tokens, lex_errors) = lexer().parse(code).into_output_errors();
    if !lex_errors.is_empty() {
        return Err(lex_errors
            .into_iter()
            .map(|error| {
                let error = SourceError::from_rich(error);
                let span = shift(error.span.clone());
                SourceError { span, ..error }
            })
            .collect());
    }
    let Some(mut tokens) = tokens else {
        return Err(vec![SourceError::new(shift(0..code.len()), "No tokens from lexer")]);
    };
    tokens.retain(|token| !matches!(token.node, Token::Comment(_)));
    if offset > 0 {
        for token in &mut tokens {
            token.span = Span::from(shift(token.span.into_range()));
        }
    }
    Ok(tokens)
}

/// Lexes and parses a computation source, collecting every error.
pub fn parse(code: &str) -> Result<FunctionSource, Vec<SourceError>> {
    let tokens = lex(code, 0)?;
    let end = code.len();
    let input = tokens
        .as_slice()
        .map(Span::from(end..end), |Spanned { node, span }| (node, span));

    let (source, parse_errors) = parser().parse(input).into_output_errors();
    if !parse_errors.is_empty() {
        return Err(parse_errors.into_iter().map(SourceError::from_rich).collect());
    }
    source.ok_or_else(|| vec![SourceError::new(0..end, "No expression from parser")])
}

/// Parses a single expression embedded at `offset`, e.g. inside `${...}`.
fn parse_expression_at(code: &str, offset: usize) -> Result<Spanned<Expression>, Vec<SourceError>> {
    let tokens = lex(code, offset)?;
    let end = offset + code.len();
    let input = tokens
        .as_slice()
        .map(Span::from(end..end), |Spanned { node, span }| (node, span));

    let (expression, parse_errors) = expression_parser().parse(input).into_output_errors();
    if !parse_errors.is_empty() {
        return Err(parse_errors.into_iter().map(SourceError::from_rich).collect());
    }
    expression.ok_or_else(|| vec![SourceError::new(offset..end, "No expression from parser")])
}

/// Splits raw template contents into text and `${...}` expressions.
/// `offset` is the position of the first content character in the source.
fn template_parts(raw: &str, offset: usize) -> Result<Vec<TemplatePart>, SourceError> {
    let mut parts = Vec::new();
    let mut rest = raw;
    let mut position = offset;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            parts.push(TemplatePart::Text(rest[..start].to_string()));
        }
        let code_start = start + 2;
        let mut depth = 0usize;
        let close = rest[code_start..]
            .char_indices()
            .find_map(|(index, character)| match character {
                '{' => {
                    depth += 1;
                    None
                }
                '}' if depth == 0 => Some(index),
                '}' => {
                    depth -= 1;
                    None
                }
                _ => None,
            });
        let Some(close) = close else {
            return Err(SourceError::new(
                position + start..offset + raw.len(),
                "Unterminated `${` in template literal",
            ));
        };
        let code = &rest[code_start..code_start + close];
        let expression = parse_expression_at(code, position + code_start).map_err(|errors| {
            errors.into_iter().next().unwrap_or_else(|| {
                SourceError::new(position + start..position + code_start + close + 1, "Invalid template expression")
            })
        })?;
        parts.push(TemplatePart::Expression(expression));
        let consumed = code_start + close + 1;
        rest = &rest[consumed..];
        position += consumed;
    }
    if !rest.is_empty() {
        parts.push(TemplatePart::Text(rest.to_string()));
    }
    Ok(parts)
}
