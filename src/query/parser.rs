//! Parser for Scopus-style boolean search strings.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and ( "OR" and )*
//! and     := unary ( ( "AND" | "AND NOT" ) unary )*
//! unary   := "NOT" unary | primary
//! primary := "(" or ")" | FIELD "(" text ")" | "PUBYEAR" op YYYY
//! ```
//!
//! Keywords are case-insensitive. A field argument is taken verbatim up to its closing
//! parenthesis; it may not itself contain parentheses.

use thiserror::Error;
use tracing::trace;

use super::ast::{Field, Query, YearOp};

/// What went wrong while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    UnknownField,
    UnmatchedParen,
    EmptyArgument,
    MalformedYear,
    TrailingTokens,
    UnexpectedToken,
    UnexpectedEnd,
}

impl SyntaxErrorKind {
    fn describe(&self) -> &'static str {
        match self {
            SyntaxErrorKind::UnknownField => "unknown field",
            SyntaxErrorKind::UnmatchedParen => "unmatched parenthesis",
            SyntaxErrorKind::EmptyArgument => "empty field argument",
            SyntaxErrorKind::MalformedYear => "malformed year comparison",
            SyntaxErrorKind::TrailingTokens => "unexpected trailing input",
            SyntaxErrorKind::UnexpectedToken => "unexpected token",
            SyntaxErrorKind::UnexpectedEnd => "unexpected end of query",
        }
    }
}

/// A malformed query string. Raised before any provider is contacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} at position {position}: '{token}'", .kind.describe())]
pub struct QuerySyntaxError {
    /// Byte offset of the offending token
    pub position: usize,
    /// The offending token text (empty at end of input)
    pub token: String,
    pub kind: SyntaxErrorKind,
}

impl QuerySyntaxError {
    pub(super) fn new(kind: SyntaxErrorKind, position: usize, token: impl Into<String>) -> Self {
        Self {
            position,
            token: token.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    AndNot,
    Or,
    Not,
    Field(Field, String),
    Year(YearOp, i32),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
    text: String,
}

/// Parse a query string into a [`Query`]
pub fn parse(input: &str) -> Result<Query, QuerySyntaxError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        index: 0,
        end: input.len(),
    };
    let query = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        let kind = if token.kind == TokenKind::RParen {
            SyntaxErrorKind::UnmatchedParen
        } else {
            SyntaxErrorKind::TrailingTokens
        };
        return Err(QuerySyntaxError::new(kind, token.pos, token.text.clone()));
    }
    trace!(query = %query, "parsed query");
    Ok(query)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, QuerySyntaxError> {
    let bytes = input.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        match b {
            b'(' => {
                tokens.push(Token { kind: TokenKind::LParen, pos: i, text: "(".into() });
                i += 1;
            }
            b')' => {
                tokens.push(Token { kind: TokenKind::RParen, pos: i, text: ")".into() });
                i += 1;
            }
            _ if is_word_byte(b) => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                let word = &input[start..i];
                match word.to_ascii_uppercase().as_str() {
                    "AND" => {
                        // "AND NOT" is one operator
                        let mut j = i;
                        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                            j += 1;
                        }
                        let mut k = j;
                        while k < bytes.len() && is_word_byte(bytes[k]) {
                            k += 1;
                        }
                        if k > j && input[j..k].eq_ignore_ascii_case("NOT") {
                            tokens.push(Token {
                                kind: TokenKind::AndNot,
                                pos: start,
                                text: input[start..k].to_string(),
                            });
                            i = k;
                        } else {
                            tokens.push(Token { kind: TokenKind::And, pos: start, text: word.into() });
                        }
                    }
                    "OR" => tokens.push(Token { kind: TokenKind::Or, pos: start, text: word.into() }),
                    "NOT" => tokens.push(Token { kind: TokenKind::Not, pos: start, text: word.into() }),
                    "PUBYEAR" => {
                        let (op, year, next) = lex_year(input, i, start)?;
                        tokens.push(Token {
                            kind: TokenKind::Year(op, year),
                            pos: start,
                            text: input[start..next].to_string(),
                        });
                        i = next;
                    }
                    _ => {
                        let field = Field::from_keyword(word).ok_or_else(|| {
                            QuerySyntaxError::new(SyntaxErrorKind::UnknownField, start, word)
                        })?;
                        let (text, next) = lex_argument(input, i, start, word)?;
                        tokens.push(Token {
                            kind: TokenKind::Field(field, text),
                            pos: start,
                            text: input[start..next].to_string(),
                        });
                        i = next;
                    }
                }
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or_default();
                return Err(QuerySyntaxError::new(SyntaxErrorKind::UnexpectedToken, i, ch.to_string()));
            }
        }
    }
    Ok(tokens)
}

/// Lex `( text )` after a field keyword, returning the verbatim text and the offset after `)`
fn lex_argument(input: &str, mut i: usize, start: usize, word: &str) -> Result<(String, usize), QuerySyntaxError> {
    let bytes = input.as_bytes();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return Err(QuerySyntaxError::new(SyntaxErrorKind::UnexpectedEnd, input.len(), ""));
    }
    if bytes[i] != b'(' {
        let token: String = input[i..].chars().take_while(|c| !c.is_whitespace()).collect();
        return Err(QuerySyntaxError::new(SyntaxErrorKind::UnexpectedToken, i, token));
    }
    let open = i;
    let body_start = i + 1;
    let mut j = body_start;
    while j < bytes.len() {
        match bytes[j] {
            b')' => {
                let text = input[body_start..j].trim();
                if text.is_empty() {
                    return Err(QuerySyntaxError::new(
                        SyntaxErrorKind::EmptyArgument,
                        start,
                        input[start..=j].to_string(),
                    ));
                }
                return Ok((text.to_string(), j + 1));
            }
            b'(' => {
                return Err(QuerySyntaxError::new(SyntaxErrorKind::UnmatchedParen, j, "("));
            }
            _ => j += 1,
        }
    }
    Err(QuerySyntaxError::new(
        SyntaxErrorKind::UnmatchedParen,
        open,
        format!("{}(", word),
    ))
}

/// Lex `op YYYY` after `PUBYEAR`
fn lex_year(input: &str, mut i: usize, start: usize) -> Result<(YearOp, i32, usize), QuerySyntaxError> {
    let bytes = input.as_bytes();
    let malformed = |end: usize| {
        let mut end = end.min(input.len());
        while !input.is_char_boundary(end) {
            end += 1;
        }
        QuerySyntaxError::new(SyntaxErrorKind::MalformedYear, start, input[start..end].to_string())
    };

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let op_start = i;
    while i < bytes.len() && matches!(bytes[i], b'<' | b'>' | b'=') {
        i += 1;
    }
    let op = YearOp::from_symbol(&input[op_start..i]).ok_or_else(|| malformed(i.max(op_start + 1)))?;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && is_word_byte(bytes[i]) {
        i += 1;
    }
    let literal = &input[digits_start..i];
    if literal.len() != 4 || !literal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(i.max(digits_start + 1)));
    }
    let year = literal.parse::<i32>().map_err(|_| malformed(i))?;
    Ok((op, year, i))
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.index);
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Query, QuerySyntaxError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Or)) {
            self.index += 1;
            let right = self.parse_and()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Query, QuerySyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::And) => {
                    self.index += 1;
                    let right = self.parse_unary()?;
                    left = left.and(right);
                }
                Some(TokenKind::AndNot) => {
                    self.index += 1;
                    let right = self.parse_unary()?;
                    left = left.and_not(right);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Query, QuerySyntaxError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Not)) {
            self.index += 1;
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Query, QuerySyntaxError> {
        let Some(token) = self.next() else {
            return Err(QuerySyntaxError::new(SyntaxErrorKind::UnexpectedEnd, self.end, ""));
        };
        match &token.kind {
            TokenKind::Field(field, text) => Ok(Query::field(*field, text.clone())),
            TokenKind::Year(op, year) => Ok(Query::year(*op, *year)),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
                    Some(other) => Err(QuerySyntaxError::new(
                        SyntaxErrorKind::UnexpectedToken,
                        other.pos,
                        other.text.clone(),
                    )),
                    None => Err(QuerySyntaxError::new(SyntaxErrorKind::UnmatchedParen, token.pos, "(")),
                }
            }
            TokenKind::RParen => Err(QuerySyntaxError::new(SyntaxErrorKind::UnmatchedParen, token.pos, ")")),
            _ => Err(QuerySyntaxError::new(
                SyntaxErrorKind::UnexpectedToken,
                token.pos,
                token.text.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(field: Field, text: &str) -> Query {
        Query::field(field, text)
    }

    #[test]
    fn test_parse_simple_field() {
        assert_eq!(parse("TITLE(transformer)").unwrap(), field(Field::Title, "transformer"));
        assert_eq!(parse("author(Bengio)").unwrap(), field(Field::Author, "Bengio"));
        assert_eq!(
            parse("ALL(attention mechanism)").unwrap(),
            field(Field::Fulltext, "attention mechanism")
        );
    }

    #[test]
    fn test_combined_fields_are_first_class() {
        assert_eq!(
            parse("TITLE-ABS-KEY(machine learning)").unwrap(),
            field(Field::TitleAbsKey, "machine learning")
        );
        assert_eq!(parse("title-abs(x)").unwrap(), field(Field::TitleAbs, "x"));
    }

    #[test]
    fn test_parse_and() {
        assert_eq!(
            parse("TITLE(a) AND AUTHOR(b)").unwrap(),
            field(Field::Title, "a").and(field(Field::Author, "b"))
        );
    }

    #[test]
    fn test_parse_and_not() {
        assert_eq!(
            parse("TITLE(x) AND NOT AUTHOR(y)").unwrap(),
            Query::And {
                left: Box::new(field(Field::Title, "x")),
                right: Box::new(Query::Not {
                    operand: Box::new(field(Field::Author, "y"))
                }),
            }
        );
        assert_eq!(
            parse("TITLE(x) and   not AUTHOR(y)").unwrap(),
            parse("TITLE(x) AND NOT AUTHOR(y)").unwrap()
        );
    }

    #[test]
    fn test_group_binds_before_and() {
        let q = parse("(TITLE(a) OR TITLE(b)) AND PUBYEAR >= 2020").unwrap();
        assert_eq!(
            q,
            field(Field::Title, "a")
                .or(field(Field::Title, "b"))
                .and(Query::year(YearOp::Gte, 2020))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let q = parse("TITLE(a) OR TITLE(b) AND TITLE(c)").unwrap();
        assert_eq!(
            q,
            field(Field::Title, "a").or(field(Field::Title, "b").and(field(Field::Title, "c")))
        );
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        let q = parse("NOT TITLE(a) AND TITLE(b)").unwrap();
        assert_eq!(q, field(Field::Title, "a").negate().and(field(Field::Title, "b")));
    }

    #[test]
    fn test_and_is_left_associative() {
        let q = parse("TITLE(a) AND TITLE(b) AND TITLE(c)").unwrap();
        assert_eq!(
            q,
            field(Field::Title, "a").and(field(Field::Title, "b")).and(field(Field::Title, "c"))
        );
    }

    #[test]
    fn test_pubyear_operators_are_distinct() {
        assert_eq!(parse("PUBYEAR = 2020").unwrap(), Query::year(YearOp::Eq, 2020));
        assert_eq!(parse("PUBYEAR > 2020").unwrap(), Query::year(YearOp::Gt, 2020));
        assert_eq!(parse("PUBYEAR<2020").unwrap(), Query::year(YearOp::Lt, 2020));
        assert_eq!(parse("pubyear <= 2020").unwrap(), Query::year(YearOp::Lte, 2020));

        let range = parse("PUBYEAR >= 2020 AND PUBYEAR <= 2020").unwrap();
        assert_eq!(
            range,
            Query::year(YearOp::Gte, 2020).and(Query::year(YearOp::Lte, 2020))
        );
        assert_ne!(range, parse("PUBYEAR = 2020").unwrap());
    }

    #[test]
    fn test_argument_is_verbatim() {
        assert_eq!(
            parse("TITLE(\"graph neural\" networks, GNN-based)").unwrap(),
            field(Field::Title, "\"graph neural\" networks, GNN-based")
        );
        // keywords inside an argument are text, not operators
        assert_eq!(parse("TITLE(this AND that)").unwrap(), field(Field::Title, "this AND that"));
    }

    #[test]
    fn test_unbalanced_parens() {
        let err = parse("TITLE(a AND AUTHOR(b)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnmatchedParen);
        assert_eq!(err.position, 18);

        let err = parse("(TITLE(a) OR TITLE(b)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnmatchedParen);
        assert_eq!(err.position, 0);

        let err = parse("TITLE(a))").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnmatchedParen);
        assert_eq!(err.position, 8);

        let err = parse("TITLE(abc").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnmatchedParen);
    }

    #[test]
    fn test_unknown_field() {
        let err = parse("TITLE(a) AND SRCTITLE(b)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnknownField);
        assert_eq!(err.position, 13);
        assert_eq!(err.token, "SRCTITLE");
    }

    #[test]
    fn test_empty_argument() {
        let err = parse("TITLE(   )").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::EmptyArgument);
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_malformed_year() {
        for input in ["PUBYEAR > 20", "PUBYEAR >> 2020", "PUBYEAR 2020", "PUBYEAR = 2020a", "PUBYEAR >"] {
            let err = parse(input).unwrap_err();
            assert_eq!(err.kind, SyntaxErrorKind::MalformedYear, "input: {}", input);
        }
    }

    #[test]
    fn test_malformed_year_with_multibyte_text() {
        for input in ["PUBYEAR é2020", "PUBYEAR >= é", "PUBYEAR ≥ 2020", "PUBYEAR = 20é"] {
            let err = parse(input).unwrap_err();
            assert_eq!(err.kind, SyntaxErrorKind::MalformedYear, "input: {}", input);
            assert!(err.token.starts_with("PUBYEAR"), "input: {}", input);
        }
    }

    #[test]
    fn test_trailing_tokens() {
        let err = parse("TITLE(a) AUTHOR(b)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::TrailingTokens);
        assert_eq!(err.position, 9);
    }

    #[test]
    fn test_dangling_operator() {
        let err = parse("TITLE(a) AND").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedEnd);
        assert_eq!(err.position, 12);

        let err = parse("").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedEnd);

        let err = parse("OR TITLE(a)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_error_message_carries_position() {
        let err = parse("TITLE(a) % AUTHOR(b)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedToken);
        assert_eq!(err.to_string(), "unexpected token at position 9: '%'");
    }
}
