use std::collections::{hash_map::Entry, HashMap};

use quill_runtime::{lex_str, lexer::is_identifier, ArcStr, TokenKind};

use crate::error::GrammarError;

/// How a literal is used. A literal keeps the role it was first registered with.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Plain,
    Open,
    Close,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Plain => "a plain token",
            Role::Open => "a structure opener",
            Role::Close => "a structure closer",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Shape {
    Keyword,
    Operator,
    /// Does not lex as a single identifier or operator, so no token will ever match it.
    Unmatchable,
}

fn classify(text: &str) -> Shape {
    if is_identifier(text) {
        return Shape::Keyword;
    }
    match lex_str(text).as_deref() {
        Ok([token]) if token.kind == TokenKind::Operator && token.text() == Some(text) => {
            Shape::Operator
        }
        _ => {
            log::warn!("Literal {text:?} is not a single token and will never match");
            Shape::Unmatchable
        }
    }
}

struct LiteralEntry {
    text: ArcStr,
    role: Role,
    shape: Shape,
}

/// Every literal of a grammar in order of first use.
#[derive(Default)]
pub struct LiteralTable {
    entries: Vec<LiteralEntry>,
    index: HashMap<ArcStr, usize>,
}

impl LiteralTable {
    pub fn register(&mut self, text: &ArcStr, role: Role) -> Result<(), GrammarError> {
        match self.index.entry(text.clone()) {
            Entry::Occupied(o) => {
                let existing = self.entries[*o.get()].role;
                if existing != role {
                    return Err(GrammarError::LiteralRole {
                        literal: text.to_string(),
                        first: existing.name(),
                        second: role.name(),
                    });
                }
            }
            Entry::Vacant(v) => {
                v.insert(self.entries.len());
                self.entries.push(LiteralEntry {
                    text: text.clone(),
                    role,
                    shape: classify(text),
                });
            }
        }
        Ok(())
    }

    pub fn with_shape(&self, shape: Shape) -> impl Iterator<Item = &ArcStr> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.shape == shape)
            .map(|e| &e.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes() {
        assert_eq!(classify("if"), Shape::Keyword);
        assert_eq!(classify("**"), Shape::Operator);
        assert_eq!(classify("("), Shape::Operator);
        assert_eq!(classify("a b"), Shape::Unmatchable);
        assert_eq!(classify("12"), Shape::Unmatchable);
    }

    #[test]
    fn roles_are_exclusive() {
        let mut table = LiteralTable::default();
        let paren: ArcStr = "(".into();
        table.register(&paren, Role::Open).unwrap();
        table.register(&paren, Role::Open).unwrap();
        let err = table.register(&paren, Role::Plain).unwrap_err();
        assert_eq!(
            err,
            GrammarError::LiteralRole {
                literal: "(".into(),
                first: "a structure opener",
                second: "a plain token",
            }
        );
    }

    #[test]
    fn keeps_first_use_order() {
        let mut table = LiteralTable::default();
        for text in ["then", "+", "if", "-", "then"] {
            table.register(&text.into(), Role::Plain).unwrap();
        }
        let keywords: Vec<_> = table.with_shape(Shape::Keyword).map(|t| &**t).collect();
        let operators: Vec<_> = table.with_shape(Shape::Operator).map(|t| &**t).collect();
        assert_eq!(keywords, ["then", "if"]);
        assert_eq!(operators, ["+", "-"]);
    }
}
