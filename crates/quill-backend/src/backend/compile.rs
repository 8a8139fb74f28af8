use std::collections::HashMap;

use cranelift_entity::PrimaryMap;
use quill_runtime::{Matcher, Parser, Program, RuleMatcher, Terminal};

use crate::error::GrammarError;

use super::{
    check::FirstSets,
    grammar::{Grammar, NodeId, NodeKind},
};

struct CompileCx<'a, 'g> {
    grammar: &'g Grammar,
    first: &'a mut FirstSets<'g>,
}

impl CompileCx<'_, '_> {
    fn matcher(&mut self, node: NodeId) -> Result<Matcher, GrammarError> {
        let matcher = match self.grammar.kind(node) {
            NodeKind::Literal(text) => Matcher::Literal(text.clone()),
            NodeKind::MatchType(class) => Matcher::Class(*class),
            NodeKind::Nonterminal(rule) => Matcher::Rule(*rule),
            NodeKind::Seq(children) => Matcher::Seq(self.matchers(children)?),
            NodeKind::Alt(children) => {
                let mut dispatch = HashMap::new();
                for (index, &child) in children.iter().enumerate() {
                    for terminal in self.first.node(child)? {
                        dispatch.insert(terminal, index);
                    }
                }
                let mut expected: Vec<Terminal> = dispatch.keys().cloned().collect();
                expected.sort();
                log::trace!(
                    "Dispatch in {}: {}",
                    self.grammar.owner(node),
                    quill_runtime::trace::ExpectedList(&expected)
                );
                Matcher::Alt {
                    branches: self.matchers(children)?,
                    dispatch,
                    expected: expected.into(),
                }
            }
            NodeKind::Repeat0(child) => {
                let first = self
                    .first
                    .node(*child)?
                    .into_iter()
                    .filter(|t| *t != Terminal::End)
                    .collect();
                Matcher::Repeat {
                    body: Box::new(self.matcher(*child)?),
                    first,
                }
            }
            NodeKind::Reduce { arity, reducer } => Matcher::Reduce {
                arity: *arity,
                reducer: reducer.clone(),
            },
            NodeKind::Peek(child) => Matcher::Peek(Box::new(self.matcher(*child)?)),
            NodeKind::Not(child) => Matcher::Not(Box::new(self.matcher(*child)?)),
            NodeKind::Drop(child) => Matcher::Drop(Box::new(self.matcher(*child)?)),
            NodeKind::Embedded(parser) => Matcher::Embedded(parser.clone()),
        };
        Ok(matcher)
    }

    fn matchers(&mut self, nodes: &[NodeId]) -> Result<Box<[Matcher]>, GrammarError> {
        nodes.iter().map(|&node| self.matcher(node)).collect()
    }
}

/// Turns a checked grammar into an executable parser.
pub fn compile<'g>(grammar: &'g Grammar, first: &mut FirstSets<'g>) -> Result<Parser, GrammarError> {
    let mut cx = CompileCx { grammar, first };

    let mut rules = PrimaryMap::with_capacity(grammar.rules.len());
    for (handle, rule, body) in grammar.iter() {
        let pushed = rules.push(RuleMatcher {
            name: rule.name.clone(),
            traced: rule.traced,
            body: cx.matcher(body)?,
        });
        debug_assert_eq!(pushed, handle);
    }

    let root_first = cx.first.rule(grammar.root)?;
    Ok(Parser::new(Program {
        rules,
        root: grammar.root,
        first: root_first,
    }))
}
