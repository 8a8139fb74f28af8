use std::fmt::Display;

use crate::{
    lexer::{LexError, Token, TokenClass},
    value::ArcStr,
};

/// A named classification of a single token, or the end of input.
///
/// Inside a first-set, `End` marks an expression that can match the empty sequence.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Terminal {
    Literal(ArcStr),
    Class(TokenClass),
    End,
}

impl Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminal::Literal(text) => write!(f, "'{text}'"),
            Terminal::Class(class) => write!(f, "%{}", class.name()),
            Terminal::End => f.write_str("end of input"),
        }
    }
}

/// The token found where something else was expected.
#[derive(Clone, Debug, PartialEq)]
pub enum Received {
    Token(Token),
    End,
}

impl Received {
    pub fn from_token(token: Option<&Token>) -> Received {
        match token {
            Some(t) => Received::Token(t.clone()),
            None => Received::End,
        }
    }
}

impl Display for Received {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Received::Token(token) => write!(f, "{token} at {}", token.position),
            Received::End => f.write_str("end of input"),
        }
    }
}

pub struct ExpectedList<'a>(pub &'a [Terminal]);

impl Display for ExpectedList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            [] => f.write_str("nothing"),
            [one] => write!(f, "{one}"),
            [init @ .., last] => {
                for (i, t) in init.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, " or {last}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("expected {}, received {received}", ExpectedList(.expected))]
    Mismatch {
        expected: Vec<Terminal>,
        received: Received,
    },
    #[error("expected anything but this, received {received}")]
    ForbiddenLookahead { received: Received },
    #[error("expected end of input, received {received}")]
    TrailingInput { received: Received },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TraceFrame {
    Token(Token),
    Rule(ArcStr),
}

impl Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceFrame::Token(token) => write!(f, "at {token} ({})", token.position),
            TraceFrame::Rule(name) => write!(f, "in rule {name}"),
        }
    }
}

/// A failed parse, the trace is ordered innermost frame first.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub trace: Vec<TraceFrame>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            trace: Vec::new(),
        }
    }
    pub fn mismatch(expected: Vec<Terminal>, token: Option<&Token>) -> ParseError {
        let mut err = ParseError::new(ParseErrorKind::Mismatch {
            expected,
            received: Received::from_token(token),
        });
        if let Some(token) = token {
            err.trace.push(TraceFrame::Token(token.clone()));
        }
        err
    }
    pub fn with_frame(mut self, frame: TraceFrame) -> ParseError {
        self.trace.push(frame);
        self
    }
    /// Names of the rules the error unwound through, innermost first.
    pub fn rules(&self) -> impl Iterator<Item = &str> + '_ {
        self.trace.iter().filter_map(|frame| match frame {
            TraceFrame::Rule(name) => Some(&**name),
            TraceFrame::Token(_) => None,
        })
    }
}

impl From<LexError> for ParseError {
    fn from(value: LexError) -> Self {
        ParseError::new(ParseErrorKind::Lex(value))
    }
}
