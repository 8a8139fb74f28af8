use std::fmt::Display;

use crate::{template::Template, value::Value};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Position {
    /// Text fragment `i` is segment `2i`, interpolation slot `i` is segment `2i + 1`.
    pub segment: u32,
    /// Byte offset into the fragment, always 0 for slots.
    pub offset: u32,
    /// Bytes of fragment text covered by the token, slots contribute 0.
    pub length: u32,
}

impl Position {
    pub fn new(segment: u32, offset: u32, length: u32) -> Position {
        Position {
            segment,
            offset,
            length,
        }
    }
    pub fn fragment(fragment: usize, offset: usize) -> Position {
        Position::new(fragment as u32 * 2, offset as u32, 0)
    }
    pub fn slot(slot: usize) -> Position {
        Position::new(slot as u32 * 2 + 1, 0, 0)
    }
    pub fn is_slot(self) -> bool {
        self.segment % 2 == 1
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_slot() {
            write!(f, "slot {}", self.segment / 2)
        } else {
            write!(f, "{}:{}", self.segment / 2, self.offset)
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Number,
    Identifier,
    Operator,
    String,
    Value,
}

/// Token types that a grammar can match without naming the exact text.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TokenClass {
    Identifier,
    Number,
    String,
    Value,
}

impl TokenClass {
    pub fn name(self) -> &'static str {
        match self {
            TokenClass::Identifier => "identifier",
            TokenClass::Number => "number",
            TokenClass::String => "string",
            TokenClass::Value => "value",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub payload: Value,
    pub position: Position,
}

impl Token {
    /// The exact text of identifiers and operators, the only tokens matched by literals.
    pub fn text(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Identifier | TokenKind::Operator => self.payload.as_str(),
            TokenKind::Number | TokenKind::String | TokenKind::Value => None,
        }
    }
    pub fn class(&self) -> Option<TokenClass> {
        match self.kind {
            TokenKind::Identifier => Some(TokenClass::Identifier),
            TokenKind::Number => Some(TokenClass::Number),
            TokenKind::String => Some(TokenClass::String),
            TokenKind::Value => Some(TokenClass::Value),
            TokenKind::Operator => None,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Identifier | TokenKind::Operator => write!(f, "'{}'", self.payload),
            TokenKind::Number => write!(f, "number {}", self.payload),
            TokenKind::String => write!(f, "string {:?}", self.payload.to_string()),
            TokenKind::Value => write!(f, "interpolated {}", self.payload.kind_name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LexErrorKind {
    #[error("illegal newline in string")]
    IllegalString,
    #[error("string left open")]
    UnclosedString,
    #[error("block comment left open")]
    UnclosedComment,
    #[error("unexpected character {0:?}")]
    UnexpectedCharacter(char),
    #[error("malformed number literal {0:?}")]
    MalformedNumber(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {position}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: Position,
}

const SEPARATORS: &[char] = &['(', ')', '[', ']', '{', '}', ',', ';'];

pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '\u{200C}' | '\u{200D}')
}

fn is_operator_char(c: char) -> bool {
    c.is_ascii_punctuation() && !matches!(c, '"' | '\'' | '_' | '$') && !SEPARATORS.contains(&c)
}

/// Whether `text` would lex as a single identifier.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_continue),
        _ => false,
    }
}

struct OpenString {
    quote: char,
    body: String,
    start: Position,
    length: usize,
    /// A backslash ended the previous fragment, the next character is taken literally.
    escaped: bool,
}

enum Carry {
    None,
    String(OpenString),
    Comment(Position),
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    fragment: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, fragment: usize) -> Lexer<'a> {
        Lexer {
            src,
            pos: 0,
            fragment,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn consume_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn is_empty(&self) -> bool {
        self.pos == self.src.len()
    }

    fn position(&self, start: usize) -> Position {
        Position::new(
            self.fragment as u32 * 2,
            start as u32,
            (self.pos - start) as u32,
        )
    }

    fn error(&self, kind: LexErrorKind, start: usize) -> LexError {
        LexError {
            kind,
            position: self.position(start),
        }
    }

    /// Continues a block comment, returns false if the fragment ended first.
    fn block_comment(&mut self) -> bool {
        while !self.is_empty() {
            if self.starts_with("*/") {
                self.pos += 2;
                return true;
            }
            self.next();
        }
        false
    }

    /// Continues a quoted string, returns false if the fragment ended first.
    fn string(&mut self, open: &mut OpenString) -> Result<bool, LexError> {
        let start = self.pos;
        let done = loop {
            let before = self.pos;
            let Some(c) = self.next() else {
                break false;
            };
            if c == '\n' {
                return Err(self.error(LexErrorKind::IllegalString, before));
            }
            if std::mem::take(&mut open.escaped) {
                open.body.push(c);
                continue;
            }
            match c {
                '\\' => open.escaped = true,
                c if c == open.quote => break true,
                c => open.body.push(c),
            }
        };
        open.length += self.pos - start;
        Ok(done)
    }

    fn number(&mut self, start: usize) -> Result<Token, LexError> {
        let radix = match (self.peek(), self.peek_nth(1)) {
            (Some('0'), Some('x' | 'X')) => 16,
            (Some('0'), Some('o' | 'O')) => 8,
            (Some('0'), Some('b' | 'B')) => 2,
            _ => 10,
        };

        let value = if radix != 10 {
            self.pos += 2;
            let digits = self.consume_while(|c| c.is_digit(radix) || c == '_');
            // `0o19` or `0b2` would otherwise lex as two numbers
            let trailing = self.consume_while(is_identifier_continue);
            let value = digits
                .chars()
                .filter(|&c| c != '_')
                .try_fold(None, |acc: Option<f64>, c| {
                    let digit = c.to_digit(radix)?;
                    Some(Some(acc.unwrap_or(0.0) * f64::from(radix) + f64::from(digit)))
                })
                .flatten();
            match value {
                Some(value) if trailing.is_empty() => value,
                _ => {
                    let text = self.src[start..self.pos].to_owned();
                    return Err(self.error(LexErrorKind::MalformedNumber(text), start));
                }
            }
        } else {
            let digit = |c: char| c.is_ascii_digit() || c == '_';
            self.consume_while(digit);
            if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                self.next();
                self.consume_while(digit);
            }
            if let Some('e' | 'E') = self.peek() {
                let exponent_digit = match self.peek_nth(1) {
                    Some('+' | '-') => self.peek_nth(2),
                    other => other,
                };
                if exponent_digit.is_some_and(|c| c.is_ascii_digit()) {
                    self.next();
                    if !self.consume('+') {
                        self.consume('-');
                    }
                    self.consume_while(digit);
                }
            }
            let cleaned = self.src[start..self.pos].replace('_', "");
            cleaned.parse::<f64>().map_err(|_| {
                let text = self.src[start..self.pos].to_owned();
                self.error(LexErrorKind::MalformedNumber(text), start)
            })?
        };

        Ok(Token {
            kind: TokenKind::Number,
            payload: Value::Number(value),
            position: self.position(start),
        })
    }

    fn operator(&mut self) {
        while let Some(c) = self.peek() {
            if !is_operator_char(c) || self.starts_with("//") || self.starts_with("/*") {
                break;
            }
            self.next();
        }
    }

    /// Lexes one fragment, starting in the state carried over from the previous one.
    fn run(&mut self, carry: Carry, tokens: &mut Vec<Token>) -> Result<Carry, LexError> {
        match carry {
            Carry::None => {}
            Carry::Comment(start) => {
                if !self.block_comment() {
                    return Ok(Carry::Comment(start));
                }
            }
            Carry::String(mut open) => {
                if !self.string(&mut open)? {
                    return Ok(Carry::String(open));
                }
                tokens.push(finish_string(open));
            }
        }

        while let Some(c) = self.peek() {
            let start = self.pos;
            if c.is_whitespace() {
                self.consume_while(char::is_whitespace);
                continue;
            }
            if self.starts_with("//") {
                self.consume_while(|c| c != '\n');
                continue;
            }
            if self.starts_with("/*") {
                self.pos += 2;
                if !self.block_comment() {
                    return Ok(Carry::Comment(self.position(start)));
                }
                continue;
            }

            let token = match c {
                '"' | '\'' => {
                    self.next();
                    let mut open = OpenString {
                        quote: c,
                        body: String::new(),
                        start: self.position(start),
                        length: 1,
                        escaped: false,
                    };
                    if !self.string(&mut open)? {
                        return Ok(Carry::String(open));
                    }
                    finish_string(open)
                }
                '0'..='9' => self.number(start)?,
                c if is_identifier_start(c) => {
                    let text = self.consume_while(is_identifier_continue);
                    Token {
                        kind: TokenKind::Identifier,
                        payload: Value::Str(text.into()),
                        position: self.position(start),
                    }
                }
                c if SEPARATORS.contains(&c) => {
                    self.next();
                    self.operator_token(start)
                }
                c if is_operator_char(c) => {
                    self.operator();
                    self.operator_token(start)
                }
                other => {
                    self.next();
                    return Err(self.error(LexErrorKind::UnexpectedCharacter(other), start));
                }
            };
            tokens.push(token);
        }

        Ok(Carry::None)
    }

    fn operator_token(&self, start: usize) -> Token {
        Token {
            kind: TokenKind::Operator,
            payload: Value::Str(self.src[start..self.pos].into()),
            position: self.position(start),
        }
    }
}

fn finish_string(open: OpenString) -> Token {
    Token {
        kind: TokenKind::String,
        payload: Value::Str(open.body.into()),
        position: Position {
            length: open.length as u32,
            ..open.start
        },
    }
}

/// Tokenizes a template, interpolation slots become `Value` tokens unless they
/// fall inside a quoted literal (spliced as text) or a block comment (skipped).
pub fn lex(template: &Template) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut carry = Carry::None;

    let values = template.values();
    for (i, fragment) in template.fragments().iter().enumerate() {
        let mut lexer = Lexer::new(fragment, i);
        carry = lexer.run(carry, &mut tokens)?;

        let Some(value) = values.get(i) else {
            continue;
        };
        match &mut carry {
            Carry::None => tokens.push(Token {
                kind: TokenKind::Value,
                payload: value.clone(),
                position: Position::slot(i),
            }),
            Carry::String(open) => {
                let text = value.to_string();
                // a dangling backslash escapes the first spliced character
                if !text.is_empty() {
                    open.escaped = false;
                }
                open.body.push_str(&text);
            }
            Carry::Comment(_) => {}
        }
    }

    match carry {
        Carry::None => {}
        Carry::String(open) => {
            return Err(LexError {
                kind: LexErrorKind::UnclosedString,
                position: open.start,
            })
        }
        Carry::Comment(position) => {
            return Err(LexError {
                kind: LexErrorKind::UnclosedComment,
                position,
            })
        }
    }

    log::trace!("lexed {} tokens", tokens.len());
    Ok(tokens)
}

pub fn lex_str(src: &str) -> Result<Vec<Token>, LexError> {
    lex(&Template::from(src))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template;
    use proptest::prelude::*;

    fn payloads(src: &str) -> Vec<Value> {
        lex_str(src)
            .unwrap()
            .into_iter()
            .map(|t| t.payload)
            .collect()
    }

    #[test]
    fn skips_whitespace_and_comments() {
        let tokens = lex_str("a // line\n /* block \n */ b").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].text(), Some("b"));
    }

    #[test]
    fn separators_split_operator_runs() {
        let tokens = lex_str("((1)) ** -(2), x;").unwrap();
        let texts: Vec<_> = tokens.iter().filter_map(Token::text).collect();
        assert_eq!(
            texts,
            ["(", "(", ")", ")", "**", "-", "(", ")", ",", "x", ";"]
        );
    }

    #[test]
    fn operator_run_stops_at_comment() {
        let tokens = lex_str("+// trailing").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text(), Some("+"));
    }

    #[test]
    fn numbers() {
        assert_eq!(
            payloads("0x1F 0o17 0b101 1_000 2.5 1e3 3.5E-1"),
            [31.0, 15.0, 5.0, 1000.0, 2.5, 1000.0, 0.35].map(Value::Number)
        );
    }

    #[test]
    fn number_followed_by_dot_operator() {
        let tokens = lex_str("1.").unwrap();
        assert_eq!(tokens[0].payload, Value::Number(1.0));
        assert_eq!(tokens[1].text(), Some("."));
    }

    #[test]
    fn malformed_radix() {
        let err = lex_str("0x").unwrap_err();
        assert!(matches!(err.kind, LexErrorKind::MalformedNumber(_)));
    }

    #[test]
    fn wide_and_invalid_radix_literals() {
        assert_eq!(
            payloads("0x1_0000_0000_0000_0000"),
            [Value::Number(2f64.powi(64))]
        );
        for src in ["0o19", "0b102", "0b1e1", "0xfg"] {
            let err = lex_str(src).unwrap_err();
            assert_eq!(err.kind, LexErrorKind::MalformedNumber(src.to_owned()), "{src}");
        }
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            payloads(r#" "a\"b" 'c\\d' "#),
            [Value::from("a\"b"), Value::from("c\\d")]
        );
    }

    #[test]
    fn newline_in_string_is_illegal() {
        let err = lex_str("\"abc\ndef\"").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::IllegalString);
    }

    #[test]
    fn open_string_at_end() {
        let err = lex(&template!("\"abc" {1} "def")).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnclosedString);
        assert_eq!(err.position.segment, 0);
    }

    #[test]
    fn unexpected_character() {
        let err = lex_str("a € b").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnexpectedCharacter('€'));
        assert_eq!(err.position.offset, 2);
    }

    #[test]
    fn unicode_identifiers() {
        let tokens = lex_str("ünïcode $dollar _under").unwrap();
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Identifier));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn slots_become_value_tokens() {
        let tokens = lex(&template!("a " {42} " b")).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::Value);
        assert_eq!(tokens[1].payload, Value::Number(42.0));
        assert_eq!(tokens[1].position, Position::new(1, 0, 0));
        assert_eq!(tokens[2].position, Position::new(2, 1, 1));
    }

    #[test]
    fn slots_splice_into_strings() {
        let tokens = lex(&template!("x \"a" {42} "b\" y")).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].payload, Value::from("a42b"));
        // `"a` and `b"`, the slot itself adds nothing
        assert_eq!(tokens[1].position, Position::new(0, 2, 4));
    }

    #[test]
    fn backslash_before_a_slot_escapes_the_spliced_text() {
        let tokens = lex(&template!("\"a\\" {"x"} "\"")).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].payload, Value::from("ax"));

        // an empty slot leaves the escape for the next fragment
        let tokens = lex(&template!("\"a\\" {""} "\"b\"")).unwrap();
        assert_eq!(tokens[0].payload, Value::from("a\"b"));

        let err = lex(&template!("\"a\\" {""} "")).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnclosedString);
    }

    #[test]
    fn slots_inside_block_comments_are_skipped() {
        let tokens = lex(&template!("a /* " {1} " */ b")).unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Identifier));
    }

    #[test]
    fn open_comment_at_end() {
        let err = lex_str("a /* b").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnclosedComment);
    }

    proptest! {
        #[test]
        fn integers_round_trip(n in 0u32..u32::MAX) {
            let tokens = lex_str(&n.to_string()).unwrap();
            prop_assert_eq!(tokens.len(), 1);
            prop_assert_eq!(&tokens[0].payload, &Value::Number(n as f64));
        }

        #[test]
        fn identifiers_lex_whole(s in "[a-zA-Z_$][a-zA-Z0-9_$]{0,12}") {
            let tokens = lex_str(&s).unwrap();
            prop_assert_eq!(tokens.len(), 1);
            prop_assert_eq!(tokens[0].text(), Some(s.as_str()));
        }
    }
}
