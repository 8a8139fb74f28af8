//! Name resolution. Every program and nested block opens a scope, lookups walk
//! outward so inner rules shadow outer ones.

use std::collections::{hash_map::Entry, HashMap};

use quill_runtime::{ArcStr, RuleId};

use crate::{ast::Ident, error::GrammarError};

#[derive(Default)]
pub struct Scope {
    names: HashMap<ArcStr, RuleId>,
}

impl Scope {
    pub fn insert(&mut self, name: &ArcStr, rule: RuleId) -> Result<(), GrammarError> {
        match self.names.entry(name.clone()) {
            Entry::Occupied(_) => Err(GrammarError::DuplicateRule {
                name: name.to_string(),
            }),
            Entry::Vacant(v) => {
                v.insert(rule);
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct Scopes {
    stack: Vec<Scope>,
}

impl Scopes {
    pub fn push(&mut self, scope: Scope) {
        self.stack.push(scope);
    }
    pub fn pop(&mut self) {
        self.stack.pop();
    }
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
    pub fn lookup(&self, name: &str) -> Option<RuleId> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.names.get(name).copied())
    }
    pub fn resolve(&self, ident: &Ident) -> Result<RuleId, GrammarError> {
        self.lookup(&ident.name)
            .ok_or_else(|| GrammarError::UnknownRule {
                name: ident.name.to_string(),
                position: ident.position,
            })
    }
}
