//! Textual predicate grammar.
//!
//! ```text
//! Expr        := Primary (Connector Expr)?
//! Primary     := '(' Expr ')' | Comparison
//! Comparison  := Identifier ComparisonOp Literal
//! Connector   := '&' | '&&' | '|' | '||'
//! ComparisonOp:= '==' | '!=' | '<' | '<=' | '>' | '>='
//! ```
//!
//! The identifier must be the left operand. Literals may be bare tokens or
//! quoted with `"` or `'` (backslash escapes the next character); a literal
//! containing whitespace must be quoted.
//!
//! Connectors have no precedence over each other: a chain groups strictly
//! from the right, so `a & b | c` reads as `a & (b | c)`. Brackets are the
//! only way to group differently.
//!
//! Expressions are bounded: at most [`MAX_NESTING`] bracket levels and
//! [`MAX_COMPARISONS`] comparisons.
//!
//! [`parse`] reports every failure as `None`; [`try_parse`] keeps the reason.

use crate::ast::{Comparison, ComparisonOperator, ConnectiveKind, Node, Predicate};
use crate::schema::{Entity, EntitySchema};
use crate::value::coerce_literal;

/// Maximum bracket nesting accepted by the parser.
pub const MAX_NESTING: usize = 64;

/// Maximum number of comparisons in one expression.
///
/// Connector chains fold into a tree one level deeper per connector, so this
/// also bounds the depth of every later walk over the tree.
pub const MAX_COMPARISONS: usize = 256;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("unterminated literal starting at {pos}")]
    UnterminatedLiteral { pos: usize },

    #[error("expected {expected} at {pos}, found '{found}'")]
    Unexpected {
        pos: usize,
        expected: &'static str,
        found: String,
    },

    #[error("expected {expected} but the expression ended")]
    UnexpectedEnd { expected: &'static str },

    #[error("brackets nested deeper than {MAX_NESTING}")]
    TooDeep,

    #[error("more than {MAX_COMPARISONS} comparisons")]
    TooManyComparisons,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("literal '{literal}' does not fit field '{field}'")]
    Literal { field: String, literal: String },
}

/// Parse `text` into a predicate over `T`, or `None` when it is rejected.
#[must_use]
pub fn parse<T: Entity>(text: &str) -> Option<Predicate<T>> {
    match try_parse::<T>(text) {
        Ok(predicate) => Some(predicate),
        Err(err) => {
            tracing::debug!(entity = T::schema().name(), text, error = %err, "predicate text rejected");
            None
        }
    }
}

/// Parse `text` into a predicate over `T`.
///
/// # Errors
/// Returns the first [`ParseError`] encountered.
pub fn try_parse<T: Entity>(text: &str) -> Result<Predicate<T>, ParseError> {
    let tokens = Lexer::new(text).tokenize()?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser {
        schema: T::schema(),
        tokens,
        cursor: 0,
        depth: 0,
        comparisons: 0,
    };
    let root = parser.expr()?;
    if let Some((pos, token)) = parser.tokens.get(parser.cursor) {
        return Err(ParseError::Unexpected {
            pos: *pos,
            expected: "connector or end of expression",
            found: token.to_string(),
        });
    }
    Ok(Predicate::from_root(root))
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Op(ComparisonOperator),
    Connector(ConnectiveKind),
    Word(String),
    Quoted(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
            Token::Op(op) => write!(f, "{op}"),
            Token::Connector(kind) => write!(f, "{kind}"),
            Token::Word(w) => f.write_str(w),
            Token::Quoted(q) => write!(f, "\"{q}\""),
        }
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek().is_some_and(|&(_, c)| c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, ParseError> {
        let mut out = Vec::new();
        while let Some((pos, ch)) = self.chars.next() {
            let token = match ch {
                c if c.is_whitespace() => continue,
                '(' => Token::Open,
                ')' => Token::Close,
                '&' => Token::Connector(if self.eat('&') {
                    ConnectiveKind::AndStrict
                } else {
                    ConnectiveKind::And
                }),
                '|' => Token::Connector(if self.eat('|') {
                    ConnectiveKind::OrStrict
                } else {
                    ConnectiveKind::Or
                }),
                '=' if self.eat('=') => Token::Op(ComparisonOperator::EqualTo),
                '!' if self.eat('=') => Token::Op(ComparisonOperator::NotEqualTo),
                '<' => Token::Op(if self.eat('=') {
                    ComparisonOperator::LessThanOrEqualTo
                } else {
                    ComparisonOperator::LessThan
                }),
                '>' => Token::Op(if self.eat('=') {
                    ComparisonOperator::GreaterThanOrEqualTo
                } else {
                    ComparisonOperator::GreaterThan
                }),
                '"' | '\'' => Token::Quoted(self.quoted(pos, ch)?),
                '=' | '!' => return Err(ParseError::UnexpectedChar { pos, ch }),
                _ => Token::Word(self.word(ch)),
            };
            out.push((pos, token));
        }
        Ok(out)
    }

    fn quoted(&mut self, start: usize, quote: char) -> Result<String, ParseError> {
        let mut text = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                '\\' => match self.chars.next() {
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                },
                c if c == quote => return Ok(text),
                c => text.push(c),
            }
        }
        Err(ParseError::UnterminatedLiteral { pos: start })
    }

    fn word(&mut self, first: char) -> String {
        let mut text = String::from(first);
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() || "()&|=!<>\"'".contains(ch) {
                break;
            }
            text.push(ch);
            self.chars.next();
        }
        text
    }
}

fn is_identifier(word: &str) -> bool {
    word.split('.').all(|segment| {
        let mut chars = segment.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

struct Parser<T: 'static> {
    schema: &'static EntitySchema<T>,
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    depth: usize,
    comparisons: usize,
}

impl<T: Entity> Parser<T> {
    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn peek_connector(&self) -> Option<ConnectiveKind> {
        match self.tokens.get(self.cursor) {
            Some((_, Token::Connector(kind))) => Some(*kind),
            _ => None,
        }
    }

    fn expect_next(&mut self, expected: &'static str) -> Result<(usize, Token), ParseError> {
        self.next().ok_or(ParseError::UnexpectedEnd { expected })
    }

    /// `Primary (Connector Primary)*`, folded from the right.
    fn expr(&mut self) -> Result<Node, ParseError> {
        let mut operands = vec![self.primary()?];
        let mut connectors = Vec::new();
        while let Some(kind) = self.peek_connector() {
            self.cursor += 1;
            connectors.push(kind);
            operands.push(self.primary()?);
        }

        let mut acc = operands.pop().ok_or(ParseError::Empty)?;
        while let (Some(kind), Some(left)) = (connectors.pop(), operands.pop()) {
            acc = Node::connective(kind, left, acc);
        }
        Ok(acc)
    }

    fn primary(&mut self) -> Result<Node, ParseError> {
        let (pos, token) = self.expect_next("'(' or field name")?;
        match token {
            Token::Open => {
                self.depth += 1;
                if self.depth > MAX_NESTING {
                    return Err(ParseError::TooDeep);
                }
                let inner = self.expr()?;
                match self.expect_next("')'")? {
                    (_, Token::Close) => {
                        self.depth -= 1;
                        Ok(inner)
                    }
                    (pos, other) => Err(ParseError::Unexpected {
                        pos,
                        expected: "')'",
                        found: other.to_string(),
                    }),
                }
            }
            Token::Word(word) if is_identifier(&word) => self.comparison(&word),
            other => Err(ParseError::Unexpected {
                pos,
                expected: "'(' or field name",
                found: other.to_string(),
            }),
        }
    }

    fn comparison(&mut self, ident: &str) -> Result<Node, ParseError> {
        self.comparisons += 1;
        if self.comparisons > MAX_COMPARISONS {
            return Err(ParseError::TooManyComparisons);
        }
        let op = match self.expect_next("comparison operator")? {
            (_, Token::Op(op)) => op,
            (pos, other) => {
                return Err(ParseError::Unexpected {
                    pos,
                    expected: "comparison operator",
                    found: other.to_string(),
                });
            }
        };
        let (raw, quoted) = match self.expect_next("literal")? {
            (_, Token::Word(w)) => (w, false),
            (_, Token::Quoted(q)) => (q, true),
            (pos, other) => {
                return Err(ParseError::Unexpected {
                    pos,
                    expected: "literal",
                    found: other.to_string(),
                });
            }
        };

        let accessor = self
            .schema
            .find(ident)
            .ok_or_else(|| ParseError::UnknownField(ident.to_owned()))?;
        let literal = coerce_literal(
            accessor.path().as_str(),
            &raw,
            quoted,
            accessor.kind(),
            accessor.is_nullable(),
        )
        .map_err(|_| ParseError::Literal {
            field: accessor.path().to_string(),
            literal: raw.clone(),
        })?;

        Ok(Node::Comparison(Comparison::new(
            accessor.path().clone(),
            op,
            literal,
        )))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    #[derive(Clone, Default)]
    struct Row {
        id: i64,
        value1: i64,
        name: String,
        active: bool,
    }

    impl Entity for Row {
        fn schema() -> &'static EntitySchema<Self> {
            static SCHEMA: OnceLock<EntitySchema<Row>> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                EntitySchema::builder("Row")
                    .field("id", |r: &Row| &r.id, |r: &mut Row| &mut r.id)
                    .field("value1", |r: &Row| &r.value1, |r: &mut Row| &mut r.value1)
                    .field("Name", |r: &Row| &r.name, |r: &mut Row| &mut r.name)
                    .field("Active", |r: &Row| &r.active, |r: &mut Row| &mut r.active)
                    .build()
            })
        }
    }

    fn row(id: i64, value1: i64, name: &str) -> Row {
        Row {
            id,
            value1,
            name: name.to_owned(),
            active: true,
        }
    }

    #[test]
    fn parses_single_comparison() {
        let p = parse::<Row>("id == 2").unwrap();
        assert_eq!(p.to_text(), "(id == 2)");
        assert!(p.evaluate(&row(2, 0, "")));
        assert!(!p.evaluate(&row(3, 0, "")));
    }

    #[test]
    fn every_operator_matches_direct_comparison() {
        for op in ComparisonOperator::ALL {
            let text = format!("id {} 5", op.symbol());
            let p = parse::<Row>(&text).unwrap();
            for id in [4, 5, 6] {
                let expected = match op {
                    ComparisonOperator::EqualTo => id == 5,
                    ComparisonOperator::NotEqualTo => id != 5,
                    ComparisonOperator::GreaterThan => id > 5,
                    ComparisonOperator::GreaterThanOrEqualTo => id >= 5,
                    ComparisonOperator::LessThan => id < 5,
                    ComparisonOperator::LessThanOrEqualTo => id <= 5,
                };
                assert_eq!(p.evaluate(&row(id, 0, "")), expected, "{text} for id={id}");
            }
        }
    }

    #[test]
    fn whitespace_is_insignificant() {
        let a = parse::<Row>("id==2&&value1>=3").unwrap();
        let b = parse::<Row>("  id == 2   &&  value1 >= 3 ").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn quoted_literals_keep_spaces() {
        let p = parse::<Row>("Name == \"John Smith\"").unwrap();
        assert!(p.evaluate(&row(1, 0, "John Smith")));
        let p = parse::<Row>("Name == 'it\\'s'").unwrap();
        assert!(p.evaluate(&row(1, 0, "it's")));
    }

    #[test]
    fn chains_group_from_the_right() {
        let p = parse::<Row>("id == 1 & value1 == 2 | Name == x").unwrap();
        assert_eq!(
            p.to_text(),
            "((id == 1) & ((value1 == 2) | (Name == \"x\")))"
        );
        // Right-grouped: id == 1 AND (value1 == 2 OR Name == x)
        assert!(p.evaluate(&row(1, 0, "x")));
        assert!(!p.evaluate(&row(2, 0, "x")));
    }

    #[test]
    fn brackets_override_grouping() {
        let p = parse::<Row>("(id == 1 & value1 == 2) | Name == x").unwrap();
        assert!(p.evaluate(&row(2, 0, "x")));
        assert_eq!(
            p.to_text(),
            "(((id == 1) & (value1 == 2)) | (Name == \"x\"))"
        );
    }

    #[test]
    fn bracket_in_the_middle() {
        let p = parse::<Row>("id == 1 && (value1 == 2 || value1 == 3) && Name == a").unwrap();
        assert!(p.evaluate(&row(1, 3, "a")));
        assert!(!p.evaluate(&row(1, 4, "a")));
    }

    #[test]
    fn canonical_text_round_trips() {
        let p = parse::<Row>("(id > 1 || Name == 'a b') && Active == true").unwrap();
        let again = parse::<Row>(&p.to_text()).unwrap();
        assert_eq!(p.to_text(), again.to_text());
        assert_eq!(p, again);
    }

    #[test]
    fn redundant_outer_brackets_are_stripped() {
        let p = parse::<Row>("((id == 2))").unwrap();
        assert_eq!(p.to_text(), "(id == 2)");
    }

    #[test]
    fn malformed_texts_are_rejected() {
        for text in [
            "id 2",
            "id == == 2",
            "(id == 2  value1 ==32)",
            "\"x\" == id",
            "2 == id",
            "id == 2 &",
            "id == 2 && && value1 == 3",
            "(id == 2",
            "id == 2)",
            "id = 2",
            "id == \"2",
            "",
            "   ",
            "Name == John Smith",
            "unknown == 1",
            "id == abc",
            "id ==",
        ] {
            assert!(parse::<Row>(text).is_none(), "{text:?} should be rejected");
        }
    }

    #[test]
    fn reports_reasons() {
        assert_eq!(
            try_parse::<Row>("missing == 1").unwrap_err(),
            ParseError::UnknownField("missing".to_owned())
        );
        assert!(matches!(
            try_parse::<Row>("id == == 2").unwrap_err(),
            ParseError::Unexpected {
                expected: "literal",
                ..
            }
        ));
        assert_eq!(
            try_parse::<Row>("id == 'open").unwrap_err(),
            ParseError::UnterminatedLiteral { pos: 6 }
        );
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let text = format!("{}id == 1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(try_parse::<Row>(&text).unwrap_err(), ParseError::TooDeep);
    }

    #[test]
    fn long_chains_are_bounded() {
        let at_limit = vec!["id == 1"; MAX_COMPARISONS].join(" & ");
        let p = parse::<Row>(&at_limit).unwrap();
        assert_eq!(p.root().node_count(), 2 * MAX_COMPARISONS - 1);
        assert!(p.evaluate(&row(1, 0, "")));

        for n in [MAX_COMPARISONS + 1, 5_000, 50_000] {
            let text = vec!["id == 1"; n].join(" & ");
            assert_eq!(
                try_parse::<Row>(&text).unwrap_err(),
                ParseError::TooManyComparisons
            );
        }
    }
}
