use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::{
    lexer::{lex, Token, TokenClass},
    template::Template,
    trace::{ParseError, ParseErrorKind, Received, Terminal, TraceFrame},
    value::{ArcStr, Reducer, Value},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleId(u32);

entity_impl! { RuleId }

/// One node of a compiled rule body.
#[derive(Clone, Debug)]
pub enum Matcher {
    Literal(ArcStr),
    Class(TokenClass),
    Rule(RuleId),
    Seq(Box<[Matcher]>),
    Alt {
        branches: Box<[Matcher]>,
        dispatch: HashMap<Terminal, usize>,
        /// Sorted keys of `dispatch`, for error messages.
        expected: Box<[Terminal]>,
    },
    Repeat {
        body: Box<Matcher>,
        first: HashSet<Terminal>,
    },
    Reduce {
        arity: usize,
        reducer: Option<Reducer>,
    },
    Peek(Box<Matcher>),
    Not(Box<Matcher>),
    Drop(Box<Matcher>),
    Embedded(Parser),
}

#[derive(Clone, Debug)]
pub struct RuleMatcher {
    pub name: ArcStr,
    /// Whether failures inside this rule leave a `TraceFrame::Rule` behind.
    pub traced: bool,
    pub body: Matcher,
}

#[derive(Debug)]
pub struct Program {
    pub rules: PrimaryMap<RuleId, RuleMatcher>,
    pub root: RuleId,
    /// First-set of the root rule, used when this program is embedded in another grammar.
    pub first: BTreeSet<Terminal>,
}

/// A compiled grammar, cheap to clone and safe to share between threads.
#[derive(Clone, Debug)]
pub struct Parser {
    program: Arc<Program>,
}

/// Per-invocation parse state: the token cursor and the value stack.
pub struct State<'a> {
    tokens: &'a [Token],
    position: usize,
    stack: Vec<Value>,
}

impl<'a> State<'a> {
    pub fn new(tokens: &'a [Token]) -> State<'a> {
        State {
            tokens,
            position: 0,
            stack: Vec::new(),
        }
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) {
        debug_assert!(self.position < self.tokens.len());
        self.position += 1;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }
}

/// Finds the entry a token selects in a terminal keyed table: its exact text,
/// then its class, then the `End` fallback.
pub fn select<'t, T>(table: &'t HashMap<Terminal, T>, token: Option<&Token>) -> Option<&'t T> {
    if let Some(token) = token {
        if let Some(text) = token.text() {
            if let Some(found) = table.get(&Terminal::Literal(text.into())) {
                return Some(found);
            }
        }
        if let Some(class) = token.class() {
            if let Some(found) = table.get(&Terminal::Class(class)) {
                return Some(found);
            }
        }
    }
    table.get(&Terminal::End)
}

/// Whether a token (never end of input) can start something with this first-set.
pub fn starts(first: &HashSet<Terminal>, token: Option<&Token>) -> bool {
    let Some(token) = token else {
        return false;
    };
    if let Some(text) = token.text() {
        if first.contains(&Terminal::Literal(text.into())) {
            return true;
        }
    }
    match token.class() {
        Some(class) => first.contains(&Terminal::Class(class)),
        None => false,
    }
}

impl Matcher {
    pub fn run(&self, program: &Program, state: &mut State) -> Result<(), ParseError> {
        match self {
            Matcher::Literal(text) => {
                let token = state.peek();
                match token {
                    Some(t) if t.text() == Some(&**text) => {
                        state.advance();
                        state.stack.push(Value::Str(text.clone()));
                        Ok(())
                    }
                    _ => Err(ParseError::mismatch(
                        vec![Terminal::Literal(text.clone())],
                        token,
                    )),
                }
            }
            Matcher::Class(class) => {
                let token = state.peek();
                match token {
                    Some(t) if t.class() == Some(*class) => {
                        state.advance();
                        state.stack.push(t.payload.clone());
                        Ok(())
                    }
                    _ => Err(ParseError::mismatch(vec![Terminal::Class(*class)], token)),
                }
            }
            Matcher::Rule(id) => program.run_rule(*id, state),
            Matcher::Seq(children) => {
                for child in children.iter() {
                    child.run(program, state)?;
                }
                Ok(())
            }
            Matcher::Alt {
                branches,
                dispatch,
                expected,
            } => {
                let token = state.peek();
                match select(dispatch, token) {
                    Some(&index) => branches[index].run(program, state),
                    None => Err(ParseError::mismatch(expected.to_vec(), token)),
                }
            }
            Matcher::Repeat { body, first } => {
                let mut items = Vec::new();
                while starts(first, state.peek()) {
                    let depth = state.stack.len();
                    body.run(program, state)?;
                    let produced = state.stack.split_off(depth);
                    items.push(identity(produced));
                }
                state.stack.push(Value::List(items));
                Ok(())
            }
            Matcher::Reduce { arity, reducer } => {
                let split = state.stack.len().saturating_sub(*arity);
                let args = state.stack.split_off(split);
                let value = match reducer {
                    Some(reducer) => reducer.call(args),
                    None => identity(args),
                };
                state.stack.push(value);
                Ok(())
            }
            Matcher::Peek(inner) => {
                let position = state.position;
                let depth = state.stack.len();
                inner.run(program, state)?;
                state.position = position;
                state.stack.truncate(depth);
                Ok(())
            }
            Matcher::Not(inner) => {
                let position = state.position;
                let depth = state.stack.len();
                let result = inner.run(program, state);
                state.position = position;
                state.stack.truncate(depth);
                match result {
                    Ok(()) => Err(ParseError::new(ParseErrorKind::ForbiddenLookahead {
                        received: Received::from_token(state.peek()),
                    })),
                    Err(_) => Ok(()),
                }
            }
            Matcher::Drop(inner) => {
                let depth = state.stack.len();
                inner.run(program, state)?;
                state.stack.truncate(depth);
                Ok(())
            }
            Matcher::Embedded(parser) => {
                let inner = &parser.program;
                inner.run_rule(inner.root, state)
            }
        }
    }

    /// Collects the dispatch coverage of every alternation, in traversal order.
    fn collect_dispatch(&self, out: &mut Vec<Vec<Terminal>>) {
        match self {
            Matcher::Alt {
                branches, expected, ..
            } => {
                out.push(expected.to_vec());
                for branch in branches.iter() {
                    branch.collect_dispatch(out);
                }
            }
            Matcher::Seq(children) => {
                for child in children.iter() {
                    child.collect_dispatch(out);
                }
            }
            Matcher::Repeat { body: inner, .. }
            | Matcher::Peek(inner)
            | Matcher::Not(inner)
            | Matcher::Drop(inner) => inner.collect_dispatch(out),
            Matcher::Literal(_)
            | Matcher::Class(_)
            | Matcher::Rule(_)
            | Matcher::Reduce { .. }
            | Matcher::Embedded(_) => {}
        }
    }
}

/// The reducer used when a grammar gives none: nothing, the value itself, or a list.
pub fn identity(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => Value::Null,
        1 => args.pop().unwrap_or_default(),
        _ => Value::List(args),
    }
}

impl Program {
    pub fn run_rule(&self, id: RuleId, state: &mut State) -> Result<(), ParseError> {
        let rule = &self.rules[id];
        rule.body.run(self, state).map_err(|err| match rule.traced {
            true => err.with_frame(TraceFrame::Rule(rule.name.clone())),
            false => err,
        })
    }
}

impl PartialEq for Parser {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Parser {
    pub fn new(program: Program) -> Parser {
        Parser {
            program: Arc::new(program),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn ptr_eq(&self, other: &Parser) -> bool {
        Arc::ptr_eq(&self.program, &other.program)
    }

    pub fn first_set(&self) -> &BTreeSet<Terminal> {
        &self.program.first
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.program.rules.values().map(|rule| &*rule.name)
    }

    pub fn parse(&self, template: &Template) -> Result<Value, ParseError> {
        let tokens = lex(template)?;
        self.parse_tokens(&tokens)
    }

    pub fn parse_str(&self, src: &str) -> Result<Value, ParseError> {
        self.parse(&Template::from(src))
    }

    pub fn parse_tokens(&self, tokens: &[Token]) -> Result<Value, ParseError> {
        let mut state = State::new(tokens);
        self.program.run_rule(self.program.root, &mut state)?;

        if let Some(token) = state.peek() {
            let err = ParseError::new(ParseErrorKind::TrailingInput {
                received: Received::Token(token.clone()),
            });
            return Err(err.with_frame(TraceFrame::Token(token.clone())));
        }

        debug_assert_eq!(state.stack.len(), 1, "root rule must push exactly one value");
        Ok(state.stack.pop().unwrap_or_default())
    }

    /// Sorted terminal coverage of every alternation, rule by rule.
    pub fn dispatch_tables(&self) -> Vec<Vec<Terminal>> {
        let mut out = Vec::new();
        for rule in self.program.rules.values() {
            rule.body.collect_dispatch(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex_str;

    fn lit(text: &str) -> Matcher {
        Matcher::Literal(text.into())
    }

    fn number() -> Matcher {
        Matcher::Class(TokenClass::Number)
    }

    fn program(rules: Vec<(&str, Matcher)>) -> Parser {
        let mut map = PrimaryMap::new();
        for (name, body) in rules {
            map.push(RuleMatcher {
                name: name.into(),
                traced: true,
                body,
            });
        }
        Parser::new(Program {
            rules: map,
            root: RuleId::from_u32(0),
            first: BTreeSet::new(),
        })
    }

    fn alt(branches: Vec<(Vec<Terminal>, Matcher)>) -> Matcher {
        let mut dispatch = HashMap::new();
        let mut ms = Vec::new();
        for (i, (keys, m)) in branches.into_iter().enumerate() {
            for key in keys {
                dispatch.insert(key, i);
            }
            ms.push(m);
        }
        let mut expected: Vec<_> = dispatch.keys().cloned().collect();
        expected.sort();
        Matcher::Alt {
            branches: ms.into(),
            dispatch,
            expected: expected.into(),
        }
    }

    /// Expr = "(" Expr ")" => second | %number
    fn nested() -> Parser {
        let second = Reducer::new(|mut args| args.swap_remove(1));
        let paren = Matcher::Seq(
            vec![
                lit("("),
                Matcher::Rule(RuleId::from_u32(0)),
                lit(")"),
                Matcher::Reduce {
                    arity: 3,
                    reducer: Some(second),
                },
            ]
            .into(),
        );
        let body = alt(vec![
            (vec![Terminal::Literal("(".into())], paren),
            (vec![Terminal::Class(TokenClass::Number)], number()),
        ]);
        program(vec![("Expr", body)])
    }

    #[test]
    fn recursive_rule() {
        let parser = nested();
        assert_eq!(parser.parse_str("((((1))))").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn unbalanced_input_fails_at_end() {
        let parser = nested();
        let err = parser.parse_str("(((1))").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::Mismatch {
                received: Received::End,
                ..
            }
        ));
        assert_eq!(err.rules().collect::<Vec<_>>(), ["Expr"]);
    }

    #[test]
    fn trailing_input() {
        let parser = nested();
        let err = parser.parse_str("(1))").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::TrailingInput { .. }));
    }

    #[test]
    fn repeat_collects_in_order() {
        let mut first = HashSet::new();
        first.insert(Terminal::Class(TokenClass::Number));
        let parser = program(vec![(
            "Numbers",
            Matcher::Repeat {
                body: Box::new(number()),
                first,
            },
        )]);
        let value = parser.parse_str("1 2 3").unwrap();
        assert_eq!(value, Value::List(vec![1.into(), 2.into(), 3.into()]));
    }

    #[test]
    fn lookahead_is_zero_width() {
        let body = Matcher::Seq(
            vec![
                Matcher::Peek(Box::new(lit("a"))),
                Matcher::Not(Box::new(lit("b"))),
                Matcher::Drop(Box::new(lit("a"))),
                number(),
                Matcher::Reduce {
                    arity: 1,
                    reducer: None,
                },
            ]
            .into(),
        );
        let parser = program(vec![("Start", body)]);
        assert_eq!(parser.parse_str("a 7").unwrap(), Value::Number(7.0));
        let err = parser.parse_str("b 7").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Mismatch { .. }));
    }

    #[test]
    fn negative_lookahead_rejects() {
        let body = Matcher::Seq(vec![Matcher::Not(Box::new(lit("x"))), number()].into());
        let parser = program(vec![("Start", body)]);
        let err = parser.parse_str("x").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::ForbiddenLookahead { .. }
        ));
    }

    #[test]
    fn identity_shapes() {
        assert_eq!(identity(vec![]), Value::Null);
        assert_eq!(identity(vec![1.into()]), Value::Number(1.0));
        assert_eq!(
            identity(vec![1.into(), 2.into()]),
            Value::List(vec![1.into(), 2.into()])
        );
    }

    #[test]
    fn literal_keys_win_over_classes() {
        let tokens = lex_str("if x").unwrap();
        let mut table = HashMap::new();
        table.insert(Terminal::Literal("if".into()), 0);
        table.insert(Terminal::Class(TokenClass::Identifier), 1);
        assert_eq!(select(&table, tokens.first()), Some(&0));
        assert_eq!(select(&table, tokens.get(1)), Some(&1));
        assert_eq!(select(&table, None), None);
    }

    #[test]
    fn parsers_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Parser>();
        assert_send_sync::<Value>();
    }
}
