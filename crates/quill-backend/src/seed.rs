//! A small backtracking combinator engine, used to read the grammar language itself.
//!
//! Unlike the compiled runtime it may try several alternatives at the same
//! position, which lets the grammar language use guards such as "an item is
//! anything that does not start the next rule".

use std::{collections::BTreeSet, rc::Rc};

use quill_runtime::{Position, Token, TokenClass};

use crate::error::GrammarError;

pub type Action<T> = Rc<dyn Fn(Vec<T>) -> Result<T, GrammarError>>;

pub trait SeedValue: Sized {
    fn from_token(token: &Token) -> Self;
    fn from_list(list: Vec<Self>) -> Self;
}

/// A combinator. Values pushed by each form:
/// - `Literal`, `Class`: the token
/// - `Seq`: whatever its children push, or exactly one value when it has an action
/// - `Repeat`, `Maybe`, `SepBy`: one list
/// - `Empty`, `End`, `Peek`, `Not`, `Drop`: nothing
pub enum Seed<T> {
    Empty,
    End,
    Literal(&'static str),
    Class(TokenClass),
    Rule(usize),
    Seq(Vec<Seed<T>>, Option<Action<T>>),
    Alt(Vec<Seed<T>>),
    Repeat { inner: Box<Seed<T>>, at_least_one: bool },
    Maybe(Box<Seed<T>>),
    Peek(Box<Seed<T>>),
    Not(Box<Seed<T>>),
    Drop(Box<Seed<T>>),
    SepBy { item: Box<Seed<T>>, separator: Box<Seed<T>> },
}

impl<T> Seed<T> {
    pub fn seq(items: impl IntoIterator<Item = Seed<T>>) -> Seed<T> {
        Seed::Seq(items.into_iter().collect(), None)
    }
    pub fn action(
        items: impl IntoIterator<Item = Seed<T>>,
        fun: impl Fn(Vec<T>) -> Result<T, GrammarError> + 'static,
    ) -> Seed<T> {
        Seed::Seq(items.into_iter().collect(), Some(Rc::new(fun)))
    }
    pub fn many(self) -> Seed<T> {
        Seed::Repeat {
            inner: Box::new(self),
            at_least_one: false,
        }
    }
    pub fn some(self) -> Seed<T> {
        Seed::Repeat {
            inner: Box::new(self),
            at_least_one: true,
        }
    }
    pub fn maybe(self) -> Seed<T> {
        Seed::Maybe(Box::new(self))
    }
    pub fn peek(self) -> Seed<T> {
        Seed::Peek(Box::new(self))
    }
    pub fn not(self) -> Seed<T> {
        Seed::Not(Box::new(self))
    }
    pub fn drop(self) -> Seed<T> {
        Seed::Drop(Box::new(self))
    }
    pub fn sep_by(self, separator: Seed<T>) -> Seed<T> {
        Seed::SepBy {
            item: Box::new(self),
            separator: Box::new(separator),
        }
    }
}

struct Saved {
    position: usize,
    depth: usize,
}

pub struct Engine<'a, T> {
    rules: &'a [Seed<T>],
    tokens: &'a [Token],
    position: usize,
    stack: Vec<T>,
    /// Furthest position any terminal failed at, and what was expected there.
    furthest: usize,
    expected: BTreeSet<String>,
    /// Lookahead failures are expected and must not shape the syntax error.
    quiet: u32,
}

impl<'a, T: SeedValue> Engine<'a, T> {
    pub fn new(rules: &'a [Seed<T>], tokens: &'a [Token]) -> Engine<'a, T> {
        Engine {
            rules,
            tokens,
            position: 0,
            stack: Vec::new(),
            furthest: 0,
            expected: BTreeSet::new(),
            quiet: 0,
        }
    }

    /// Runs `rule` against the whole token stream, returning the values it pushed.
    pub fn parse(mut self, rule: usize) -> Result<Vec<T>, GrammarError> {
        let rules = self.rules;
        match self.run(&rules[rule])? {
            true => Ok(self.stack),
            false => Err(self.syntax_error()),
        }
    }

    fn save(&self) -> Saved {
        Saved {
            position: self.position,
            depth: self.stack.len(),
        }
    }

    fn restore(&mut self, saved: &Saved) {
        self.position = saved.position;
        self.stack.truncate(saved.depth);
    }

    fn fail(&mut self, expected: impl FnOnce() -> String) -> bool {
        if self.quiet > 0 {
            return false;
        }
        if self.position > self.furthest {
            self.furthest = self.position;
            self.expected.clear();
        }
        if self.position == self.furthest {
            self.expected.insert(expected());
        }
        false
    }

    fn syntax_error(&self) -> GrammarError {
        let (position, received) = match self.tokens.get(self.furthest) {
            Some(token) => (token.position, token.to_string()),
            None => (
                self.tokens
                    .last()
                    .map_or(Position::new(0, 0, 0), |t| t.position),
                "end of input".to_owned(),
            ),
        };
        let expected = match self.expected.len() {
            0 => "nothing".to_owned(),
            _ => {
                let list: Vec<&str> = self.expected.iter().map(String::as_str).collect();
                list.join(", ")
            }
        };
        GrammarError::Syntax {
            position,
            expected,
            received,
        }
    }

    pub fn run(&mut self, seed: &Seed<T>) -> Result<bool, GrammarError> {
        let matched = match seed {
            Seed::Empty => true,
            Seed::End => match self.position == self.tokens.len() {
                true => true,
                false => self.fail(|| "end of input".to_owned()),
            },
            Seed::Literal(text) => match self.tokens.get(self.position) {
                Some(token) if token.text() == Some(*text) => {
                    self.stack.push(T::from_token(token));
                    self.position += 1;
                    true
                }
                _ => self.fail(|| format!("'{text}'")),
            },
            Seed::Class(class) => match self.tokens.get(self.position) {
                Some(token) if token.class() == Some(*class) => {
                    self.stack.push(T::from_token(token));
                    self.position += 1;
                    true
                }
                _ => self.fail(|| format!("%{}", class.name())),
            },
            Seed::Rule(index) => {
                let rules = self.rules;
                self.run(&rules[*index])?
            }
            Seed::Seq(items, action) => {
                let saved = self.save();
                for item in items {
                    if !self.run(item)? {
                        self.restore(&saved);
                        return Ok(false);
                    }
                }
                if let Some(action) = action {
                    let values = self.stack.split_off(saved.depth);
                    self.stack.push(action(values)?);
                }
                true
            }
            Seed::Alt(branches) => {
                let saved = self.save();
                let mut matched = false;
                for branch in branches {
                    if self.run(branch)? {
                        matched = true;
                        break;
                    }
                    self.restore(&saved);
                }
                matched
            }
            Seed::Repeat {
                inner,
                at_least_one,
            } => {
                let depth = self.stack.len();
                let mut count = 0;
                loop {
                    let saved = self.save();
                    if !self.run(inner)? {
                        self.restore(&saved);
                        break;
                    }
                    count += 1;
                    if self.position == saved.position {
                        break;
                    }
                }
                if *at_least_one && count == 0 {
                    false
                } else {
                    let list = self.stack.split_off(depth);
                    self.stack.push(T::from_list(list));
                    true
                }
            }
            Seed::Maybe(inner) => {
                let saved = self.save();
                if !self.run(inner)? {
                    self.restore(&saved);
                }
                let list = self.stack.split_off(saved.depth);
                self.stack.push(T::from_list(list));
                true
            }
            Seed::Peek(inner) => {
                let saved = self.save();
                let matched = self.run(inner)?;
                self.restore(&saved);
                matched
            }
            Seed::Not(inner) => {
                let saved = self.save();
                self.quiet += 1;
                let matched = self.run(inner);
                self.quiet -= 1;
                self.restore(&saved);
                !matched?
            }
            Seed::Drop(inner) => {
                let depth = self.stack.len();
                let matched = self.run(inner)?;
                self.stack.truncate(depth);
                matched
            }
            Seed::SepBy { item, separator } => {
                let depth = self.stack.len();
                if !self.run(item)? {
                    return Ok(false);
                }
                loop {
                    let saved = self.save();
                    if !self.run(separator)? {
                        self.restore(&saved);
                        break;
                    }
                    self.stack.truncate(saved.depth);
                    if !self.run(item)? {
                        self.restore(&saved);
                        break;
                    }
                }
                let list = self.stack.split_off(depth);
                self.stack.push(T::from_list(list));
                true
            }
        };
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use quill_runtime::lex_str;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Tree {
        Leaf(String),
        List(Vec<Tree>),
    }

    impl SeedValue for Tree {
        fn from_token(token: &Token) -> Self {
            Tree::Leaf(token.payload.to_string())
        }
        fn from_list(list: Vec<Self>) -> Self {
            Tree::List(list)
        }
    }

    fn leaf(s: &str) -> Tree {
        Tree::Leaf(s.to_owned())
    }

    fn parse(rules: &[Seed<Tree>], src: &str) -> Result<Vec<Tree>, GrammarError> {
        let tokens = lex_str(src).unwrap();
        Engine::new(rules, &tokens).parse(0)
    }

    #[test]
    fn ordered_choice_backtracks() {
        // start = "a" "b" | "a" "c"
        let rules = [Seed::seq([
            Seed::Alt(vec![
                Seed::seq([Seed::Literal("a"), Seed::Literal("b")]),
                Seed::seq([Seed::Literal("a"), Seed::Literal("c")]),
            ]),
            Seed::End,
        ])];
        assert_eq!(parse(&rules, "a c").unwrap(), vec![leaf("a"), leaf("c")]);
    }

    #[test]
    fn separated_list_drops_separators() {
        let rules = [Seed::seq([
            Seed::Class(TokenClass::Number).sep_by(Seed::Literal("|")),
            Seed::End,
        ])];
        assert_eq!(
            parse(&rules, "1 | 2 | 3").unwrap(),
            vec![Tree::List(vec![leaf("1"), leaf("2"), leaf("3")])]
        );
    }

    #[test]
    fn guards_stop_repetition() {
        // start = (!(%identifier "=") %identifier)* ...
        let rules = [Seed::seq([
            Seed::seq([
                Seed::seq([Seed::Class(TokenClass::Identifier), Seed::Literal("=")]).not(),
                Seed::Class(TokenClass::Identifier),
            ])
            .many(),
            Seed::Class(TokenClass::Identifier),
            Seed::Literal("=").drop(),
            Seed::Class(TokenClass::Identifier),
        ])];
        assert_eq!(
            parse(&rules, "a b c = d").unwrap(),
            vec![
                Tree::List(vec![leaf("a"), leaf("b")]),
                leaf("c"),
                leaf("d")
            ]
        );
    }

    #[test]
    fn actions_replace_values() {
        let rules = [Seed::action(
            [Seed::Class(TokenClass::Number), Seed::Class(TokenClass::Number)],
            |values| Ok(Tree::Leaf(format!("{}", values.len()))),
        )];
        assert_eq!(parse(&rules, "1 2").unwrap(), vec![leaf("2")]);
    }

    #[test]
    fn reports_furthest_failure() {
        let rules = [Seed::seq([
            Seed::Alt(vec![
                Seed::seq([Seed::Literal("a"), Seed::Literal("b"), Seed::Literal("c")]),
                Seed::seq([Seed::Literal("a"), Seed::Literal("x")]),
            ]),
            Seed::End,
        ])];
        let err = parse(&rules, "a b d").unwrap_err();
        let GrammarError::Syntax {
            expected, received, ..
        } = err
        else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(expected, "'c'");
        assert_eq!(received, "'d'");
    }
}
