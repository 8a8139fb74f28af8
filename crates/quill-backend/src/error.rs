use quill_runtime::{LexError, Position, Terminal};

fn join_path(names: &[String]) -> String {
    names.join(" -> ")
}

/// Everything that can make a grammar template fail to compile.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GrammarError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("syntax error at {position}: expected {expected}, received {received}")]
    Syntax {
        position: Position,
        expected: String,
        received: String,
    },
    #[error("unknown rule `{name}` at {position}")]
    UnknownRule { name: String, position: Position },
    #[error("rule `{name}` is defined more than once")]
    DuplicateRule { name: String },
    #[error("unknown terminal `%{name}`")]
    UnknownTerminal { name: String },
    #[error("left recursion: {}", join_path(.path))]
    LeftRecursion { path: Vec<String> },
    #[error("{terminal} starts more than one alternative in `{rule}`")]
    FirstFirst { terminal: Terminal, rule: String },
    #[error("{terminal} can both follow an optional part and start the next item in `{rule}`")]
    FirstFollow { terminal: Terminal, rule: String },
    #[error("repetition of something that can match nothing in `{rule}`")]
    EmptyRepeat { rule: String },
    #[error("literal '{literal}' is used both as {first} and as {second}")]
    LiteralRole {
        literal: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("left and right operator chains in the same alternation")]
    MixedChains,
    #[error("operator chains need an alternative without a chain")]
    MissingBase,
    #[error("a {kind} cannot be interpolated as {usage}")]
    BadInterpolation { kind: &'static str, usage: &'static str },
    #[error("grammar has neither an entry expression nor rules")]
    EmptyGrammar,
}
