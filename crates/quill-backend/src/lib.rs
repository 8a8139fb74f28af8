//! Compiles grammar templates into one-token-lookahead parsers.
//!
//! ```ignore
//! let add = Reducer::new(|args| ...);
//! let parser = compile(&template!("Sum = < . ~\"+\" %number > " {add} " | %number"))?;
//! assert_eq!(parser.parse_str("1 + 2")?, Value::Number(3.0));
//! ```

pub mod ast;
pub mod backend;
pub mod error;
pub mod seed;

use quill_runtime::{lex, Parser, Template};

use backend::{check::FirstSets, grammar::Grammar};

pub use error::GrammarError;

/// Every intermediate form of one compilation, kept for inspection.
pub struct Compilation {
    pub tokens: Vec<quill_runtime::Token>,
    pub program: ast::Program,
    pub grammar: Grammar,
}

/// Reads and lowers a grammar without checking or compiling it.
pub fn analyze(template: &Template) -> Result<Compilation, GrammarError> {
    let tokens = lex(template)?;
    log::debug!("Lexed {} grammar tokens", tokens.len());

    let program = ast::build::parse_program(&tokens)?;
    log::debug!("Parsed {} top level rules", program.rules.len());

    let grammar = Grammar::new(&program)?;
    log::debug!(
        "Lowered into {} rules and {} nodes",
        grammar.rules.len(),
        grammar.nodes.len()
    );

    Ok(Compilation {
        tokens,
        program,
        grammar,
    })
}

/// Checks and compiles a lowered grammar.
pub fn finish(grammar: &Grammar) -> Result<Parser, GrammarError> {
    let mut first = FirstSets::new(grammar);
    first.check_all()?;
    log::debug!("Grammar is LL(1)");

    let parser = backend::compile::compile(grammar, &mut first)?;
    log::debug!("Compiled {} rules", parser.rule_names().count());
    Ok(parser)
}

pub fn compile(template: &Template) -> Result<Parser, GrammarError> {
    let compilation = analyze(template)?;
    finish(&compilation.grammar)
}

pub fn compile_str(src: &str) -> Result<Parser, GrammarError> {
    compile(&Template::from(src))
}
