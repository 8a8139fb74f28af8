pub mod lexer;
pub mod parser;
pub mod template;
pub mod trace;
pub mod value;

pub use lexer::{lex, lex_str, LexError, Position, Token, TokenClass, TokenKind};
pub use parser::{Matcher, Parser, Program, RuleId, RuleMatcher};
pub use template::Template;
pub use trace::{ParseError, ParseErrorKind, Received, Terminal, TraceFrame};
pub use value::{ArcStr, Reducer, Value};
