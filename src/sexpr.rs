//! # S-expression reader
//!
//! The character-level lexer/parser is an external
//! collaborator to the evaluation core: it is specified only by the data it
//! hands to the [`crate::build`] module. This module supplies a small,
//! complete nom-based reader so the crate runs end to end; it is
//! deliberately unambitious compared to the rest of the crate.
//!
//! Literals recognized: signed/unsigned numbers with an optional decimal
//! part, double-quoted strings with `\`-escapes, `#t`/`#f` booleans, `#\c`
//! character literals, symbols, and parenthesized lists (the empty list is
//! [`SExpr::Nil`]). A leading `'` is sugar for `(quote ...)`.

use nom::{
    branch::alt,
    bytes::complete::{escaped, tag, take_while, take_while1},
    character::complete::{anychar, char, digit1, multispace1, none_of, one_of},
    combinator::{map, not, opt, peek, recognize, value},
    multi::many0,
    IResult, Parser,
};

use crate::span::{Position, SourceRange};
use std::fmt;

/// The output of the reader: a literal S-expression together with the
/// source range it was read from. [`crate::ir::IrNode::Constant`] holds one
/// of these directly; [`crate::build`] pattern-matches on `kind` to
/// recognize special forms.
#[derive(Debug, Clone, PartialEq)]
pub struct SExpr {
    pub kind: SExprKind,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExprKind {
    Number(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Symbol(String),
    Nil,
    List(Vec<SExpr>),
}

impl SExpr {
    pub fn synthetic(kind: SExprKind) -> Self {
        SExpr {
            kind,
            range: SourceRange::synthetic(),
        }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        SExpr::synthetic(SExprKind::Symbol(name.into()))
    }

    pub fn list(items: Vec<SExpr>) -> Self {
        if items.is_empty() {
            SExpr::synthetic(SExprKind::Nil)
        } else {
            SExpr::synthetic(SExprKind::List(items))
        }
    }

    /// The symbol naming the list head, if this is a non-empty list whose
    /// first element is a plain symbol. Used throughout the special-form
    /// classifier.
    pub fn head_symbol(&self) -> Option<&str> {
        match &self.kind {
            SExprKind::List(items) => match items.first().map(|i| &i.kind) {
                Some(SExprKind::Symbol(s)) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExpr]> {
        match &self.kind {
            SExprKind::List(items) => Some(items.as_slice()),
            SExprKind::Nil => Some(&[]),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            SExprKind::Symbol(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SExprKind::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            SExprKind::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            SExprKind::Char(c) => write!(f, "#\\{}", c),
            SExprKind::Str(s) => write!(f, "\"{}\"", s),
            SExprKind::Symbol(s) => write!(f, "{}", s),
            SExprKind::Nil => write!(f, "()"),
            SExprKind::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parse error, as a formatted description rather than a structured type:
/// the reader is out of the evaluation core's scope, so a simple string is
/// enough for the CLI's top-level error path.
pub type ReadError = String;

struct Input<'a> {
    text: &'a str,
    // Byte offset of `text` within the original source, used to compute
    // line/column positions for ranges.
    offset: usize,
}

fn position_at(original: &str, byte_offset: usize) -> Position {
    let mut line = 1;
    let mut col = 1;
    for ch in original[..byte_offset.min(original.len())].chars() {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    Position::new(line, col)
}

fn ws_and_comments(input: &str) -> IResult<&str, ()> {
    many0(alt((
        value((), multispace1),
        value((), (char(';'), take_while(|c| c != '\n'))),
    )))
    .map(|_| ())
    .parse(input)
}

fn parse_number(input: &str) -> IResult<&str, f64> {
    map(
        recognize((
            opt(char('-')),
            alt((
                recognize((digit1, opt((char('.'), opt(digit1))))),
                recognize((char('.'), digit1)),
            )),
        )),
        |s: &str| s.parse().expect("number recognized by parser is parseable"),
    )
    .parse(input)
}

fn parse_bool(input: &str) -> IResult<&str, bool> {
    alt((value(true, tag("#t")), value(false, tag("#f")))).parse(input)
}

fn parse_char_literal(input: &str) -> IResult<&str, char> {
    let (input, _) = tag("#\\")(input)?;
    let (input, c) = anychar(input)?;
    Ok((input, c))
}

const SYMBOL_LEAD: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ+-*/%<>=!?";
const SYMBOL_REST_EXTRA: &str = "-_?!<>=+*/%";

fn parse_symbol(input: &str) -> IResult<&str, String> {
    let (input, first) = one_of(SYMBOL_LEAD)(input)?;
    let (input, rest) =
        take_while1::<_, _, nom::error::Error<_>>(|c: char| {
            c.is_alphanumeric() || SYMBOL_REST_EXTRA.contains(c)
        })(input)
        .unwrap_or((input, ""));
    let mut symbol = String::new();
    symbol.push(first);
    symbol.push_str(rest);
    Ok((input, symbol))
}

fn parse_string_literal(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    if let Ok((input, _)) = char::<_, nom::error::Error<_>>('"')(input) {
        return Ok((input, String::new()));
    }
    let (input, content) = escaped(none_of("\"\\"), '\\', one_of("\"\\nt"))(input)?;
    let (input, _) = char('"')(input)?;

    let mut result = String::new();
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    Ok((input, result))
}

fn with_range<'a>(
    original: &'a str,
    mut inner: impl FnMut(&'a str) -> IResult<&'a str, SExprKind>,
) -> impl FnMut(&'a str) -> IResult<&'a str, SExpr> {
    move |input: &'a str| {
        let start_offset = original.len() - input.len();
        let (rest, kind) = inner(input)?;
        let end_offset = original.len() - rest.len();
        Ok((
            rest,
            SExpr {
                kind,
                range: SourceRange::new(
                    position_at(original, start_offset),
                    position_at(original, end_offset),
                ),
            },
        ))
    }
}

fn parse_quote_like<'a>(
    original: &'a str,
    marker: char,
    wrapper: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, SExpr> {
    move |input: &'a str| {
        let (input, _) = char(marker)(input)?;
        let (input, inner) = parse_expr(original, input)?;
        Ok((
            input,
            SExpr::synthetic(SExprKind::List(vec![
                SExpr::symbol(wrapper.to_string()),
                inner,
            ])),
        ))
    }
}

fn parse_list<'a>(original: &'a str, input: &'a str) -> IResult<&'a str, SExpr> {
    with_range(original, move |input| {
        let (input, _) = char('(')(input)?;
        let (mut input, _) = ws_and_comments(input)?;
        let mut items = Vec::new();
        loop {
            if let Ok((rest, _)) = char::<_, nom::error::Error<_>>(')')(input) {
                input = rest;
                break;
            }
            let (rest, expr) = parse_expr(original, input)?;
            items.push(expr);
            let (rest, _) = ws_and_comments(rest)?;
            input = rest;
        }
        Ok((
            input,
            if items.is_empty() {
                SExprKind::Nil
            } else {
                SExprKind::List(items)
            },
        ))
    })(input)
}

fn parse_expr<'a>(original: &'a str, input: &'a str) -> IResult<&'a str, SExpr> {
    let (input, _) = ws_and_comments(input)?;
    alt((
        |i| parse_quote_like(original, '\'', "quote")(i),
        |i| parse_list(original, i),
        with_range(original, map(parse_char_literal, SExprKind::Char)),
        with_range(original, map(parse_bool, SExprKind::Bool)),
        with_range(original, map(parse_number, SExprKind::Number)),
        with_range(original, map(parse_string_literal, SExprKind::Str)),
        with_range(original, map(parse_symbol, SExprKind::Symbol)),
    ))
    .parse(input)
}

/// Parse exactly one expression, returning the unconsumed remainder so
/// callers can read a sequence of top-level forms from one source file.
pub fn read_one(input: &str) -> Result<(SExpr, &str), ReadError> {
    let (after_ws, _) = ws_and_comments(input).unwrap_or((input, ()));
    match parse_expr(input, after_ws) {
        Ok((rest, expr)) => Ok((expr, rest)),
        Err(e) => Err(format!("parse error: {:?}", e)),
    }
}

/// Parse a whole source file as a sequence of top-level forms.
pub fn read_all(input: &str) -> Result<Vec<SExpr>, ReadError> {
    let mut forms = Vec::new();
    let mut remaining = input;
    loop {
        let (after_ws, _) = ws_and_comments(remaining).unwrap_or((remaining, ()));
        if after_ws.trim().is_empty() {
            break;
        }
        let (expr, rest) = read_one(remaining)?;
        forms.push(expr);
        remaining = rest;
    }
    Ok(forms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_numbers() {
        let (e, _) = read_one("42").unwrap();
        assert_eq!(e.kind, SExprKind::Number(42.0));
        let (e, _) = read_one("-3.5").unwrap();
        assert_eq!(e.kind, SExprKind::Number(-3.5));
    }

    #[test]
    fn reads_bool_and_char() {
        let (e, _) = read_one("#t").unwrap();
        assert_eq!(e.kind, SExprKind::Bool(true));
        let (e, _) = read_one("#\\a").unwrap();
        assert_eq!(e.kind, SExprKind::Char('a'));
    }

    #[test]
    fn reads_nested_list() {
        let (e, _) = read_one("(+ 1 (* 2 3))").unwrap();
        match e.kind {
            SExprKind::List(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].as_symbol(), Some("+"));
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn empty_list_is_nil() {
        let (e, _) = read_one("()").unwrap();
        assert_eq!(e.kind, SExprKind::Nil);
    }

    #[test]
    fn quote_sugar_expands() {
        let (e, _) = read_one("'(1 2)").unwrap();
        assert_eq!(e.head_symbol(), Some("quote"));
    }

    #[test]
    fn reads_several_top_level_forms() {
        let forms = read_all("(+ 1 2)\n(* 3 4) ; trailing comment\n").unwrap();
        assert_eq!(forms.len(), 2);
    }

    #[test]
    fn reports_unresolved_trailing_garbage_as_two_forms() {
        // Not an error at the reader level -- two sibling top-level forms.
        let forms = read_all("1 2").unwrap();
        assert_eq!(forms.len(), 2);
    }
}
