use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Integer(i64),
    Number(f64),
    Text(&'code str),
    /// Raw contents of a backtick template literal, `${...}` included.
    Template(&'code str),
    Identifier(&'code str),
    Comma,
    Dot,
    Semicolon,
    Question,
    Colon,
    Assign,
    StrictEqual,
    StrictNotEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    And,
    Or,
    Bang,
    Minus,
    Plus,
    DoubleAsterisk,
    Asterisk,
    Slash,
    Percent,
    Function,
    Return,
    Const,
    Let,
    Var,
    True,
    False,
    Null,
    Undefined,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Integer(integer) => integer.to_string().into(),
            Self::Number(number) => number.to_string().into(),
            Self::Text(text) => format!("'{text}'").into(),
            Self::Template(template) => format!("`{template}`").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Comma => ",".into(),
            Self::Dot => ".".into(),
            Self::Semicolon => ";".into(),
            Self::Question => "?".into(),
            Self::Colon => ":".into(),
            Self::Assign => "=".into(),
            Self::StrictEqual => "===".into(),
            Self::StrictNotEqual => "!==".into(),
            Self::Equal => "==".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::And => "&&".into(),
            Self::Or => "||".into(),
            Self::Bang => "!".into(),
            Self::Minus => "-".into(),
            Self::Plus => "+".into(),
            Self::DoubleAsterisk => "**".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
            Self::Function => "function".into(),
            Self::Return => "return".into(),
            Self::Const => "const".into(),
            Self::Let => "let".into(),
            Self::Var => "var".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Null => "null".into(),
            Self::Undefined => "undefined".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    // Longest operators first so `===` is never read as `==` `=`.
    let comparator = choice((
        just("===").to(Token::StrictEqual),
        just("!==").to(Token::StrictNotEqual),
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
    ));

    let logical = choice((
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('!').to(Token::Bang),
    ));

    let arithmetic_operator = choice((
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just("**").to(Token::DoubleAsterisk),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let punctuation = choice((
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(';').to(Token::Semicolon),
        just('?').to(Token::Question),
        just(':').to(Token::Colon),
        just('=').to(Token::Assign),
    ));

    let comment = just("//")
        .ignore_then(any().and_is(text::newline().not()).repeated())
        .to_slice()
        .map(Token::Comment);

    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .then(
            one_of("eE")
                .then(one_of("+-").or_not())
                .then(text::digits(10))
                .or_not(),
        )
        .to_slice()
        .try_map(|literal: &str, span| {
            let is_integer = !literal.contains(['.', 'e', 'E']);
            if is_integer {
                if let Ok(integer) = literal.parse::<i64>() {
                    return Ok(Token::Integer(integer));
                }
            }
            literal
                .parse::<f64>()
                .map(Token::Number)
                .map_err(|error| ParseError::custom(span, format!("Invalid number '{literal}': {error}")))
        });

    let single_quoted = just('\'')
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''));
    let double_quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'));
    let text = single_quoted.or(double_quoted).map(Token::Text);

    let template = just('`')
        .ignore_then(none_of('`').repeated().to_slice())
        .then_ignore(just('`'))
        .map(Token::Template);

    let identifier_or_keyword = text::ascii::ident().map(|identifier: &str| match identifier {
        "function" => Token::Function,
        "return" => Token::Return,
        "const" => Token::Const,
        "let" => Token::Let,
        "var" => Token::Var,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        "undefined" => Token::Undefined,
        _ => Token::Identifier(identifier),
    });

    let token = choice((
        comment,
        number,
        bracket,
        comparator,
        logical,
        arithmetic_operator,
        punctuation,
        text,
        template,
        identifier_or_keyword,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded()
        .repeated()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::prelude::Parser;

    fn tokens(code: &str) -> Vec<Token<'_>> {
        lexer()
            .parse(code)
            .into_result()
            .unwrap()
            .into_iter()
            .map(|token| token.node)
            .collect()
    }

    #[test]
    fn test_return_statement() {
        assert_eq!(
            tokens("return celsius * 9/5 + 32;"),
            vec![
                Token::Return,
                Token::Identifier("celsius"),
                Token::Asterisk,
                Token::Integer(9),
                Token::Slash,
                Token::Integer(5),
                Token::Plus,
                Token::Integer(32),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(
            tokens("a === b ** 2 != c"),
            vec![
                Token::Identifier("a"),
                Token::StrictEqual,
                Token::Identifier("b"),
                Token::DoubleAsterisk,
                Token::Integer(2),
                Token::NotEqual,
                Token::Identifier("c"),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 2.75 1e3 273.15"),
            vec![
                Token::Integer(42),
                Token::Number(2.75),
                Token::Number(1000.0),
                Token::Number(273.15),
            ]
        );
    }

    #[test]
    fn test_texts_and_keywords() {
        assert_eq!(
            tokens("'a' \"b\" true null undefined Math.PI"),
            vec![
                Token::Text("a"),
                Token::Text("b"),
                Token::True,
                Token::Null,
                Token::Undefined,
                Token::Identifier("Math"),
                Token::Dot,
                Token::Identifier("PI"),
            ]
        );
    }

    #[test]
    fn test_template_is_one_token() {
        assert_eq!(
            tokens("`Area: ${area.toFixed(2)}` + x"),
            vec![
                Token::Template("Area: ${area.toFixed(2)}"),
                Token::Plus,
                Token::Identifier("x"),
            ]
        );
    }

    #[test]
    fn test_comment_runs_to_end_of_line() {
        assert_eq!(
            tokens("x // double it\n* 2"),
            vec![
                Token::Identifier("x"),
                Token::Comment("// double it"),
                Token::Asterisk,
                Token::Integer(2),
            ]
        );
    }

    #[test]
    fn test_unknown_character_is_an_error() {
        assert!(lexer().parse("a # b").has_errors());
    }
}
