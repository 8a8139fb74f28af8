use std::fmt::{Display, Write};

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use quill_runtime::{ArcStr, Parser, Reducer, RuleId, TokenClass};

use crate::{ast::display::display_literal, error::GrammarError};

use super::lower::LowerCx;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(u32);

entity_impl! { NodeId }

/// The primitive instruction set every surface construct is lowered into.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Literal(ArcStr),
    MatchType(TokenClass),
    Nonterminal(RuleId),
    Seq(Vec<NodeId>),
    Alt(Vec<NodeId>),
    Repeat0(NodeId),
    Reduce {
        arity: usize,
        reducer: Option<Reducer>,
    },
    Peek(NodeId),
    Not(NodeId),
    Drop(NodeId),
    Embedded(Parser),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// The rule this node was lowered for, used to name it in errors.
    pub rule: RuleId,
}

#[derive(Clone, Debug)]
pub struct RuleDef {
    pub name: ArcStr,
    pub traced: bool,
}

#[derive(Debug)]
pub struct Grammar {
    pub rules: PrimaryMap<RuleId, RuleDef>,
    pub bodies: SecondaryMap<RuleId, Option<NodeId>>,
    pub nodes: PrimaryMap<NodeId, Node>,
    pub root: RuleId,
}

impl Grammar {
    pub fn new(program: &crate::ast::Program) -> Result<Grammar, GrammarError> {
        LowerCx::new().lower(program)
    }

    pub fn rule_name(&self, rule: RuleId) -> &str {
        &self.rules[rule].name
    }

    /// Name of the rule owning `node`.
    pub fn owner(&self, node: NodeId) -> &str {
        self.rule_name(self.nodes[node].rule)
    }

    pub fn body(&self, rule: RuleId) -> NodeId {
        self.bodies[rule].unwrap_or_else(|| {
            unreachable!("rule {} was declared but never lowered", self.rule_name(rule))
        })
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node].kind
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &RuleDef, NodeId)> + '_ {
        self.rules
            .iter()
            .map(|(handle, rule)| (handle, rule, self.body(handle)))
    }

    pub fn display_node(&self, node: NodeId, buf: &mut dyn Write) -> std::fmt::Result {
        let list = |buf: &mut dyn Write, children: &[NodeId], sep: &str| {
            buf.write_str("(")?;
            for (i, &child) in children.iter().enumerate() {
                if i > 0 {
                    buf.write_str(sep)?;
                }
                self.display_node(child, buf)?;
            }
            buf.write_str(")")
        };

        match self.kind(node) {
            NodeKind::Literal(text) => {
                struct Lit<'a>(&'a str);
                impl Display for Lit<'_> {
                    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                        display_literal(f, self.0)
                    }
                }
                write!(buf, "{}", Lit(text))
            }
            NodeKind::MatchType(class) => write!(buf, "%{}", class.name()),
            NodeKind::Nonterminal(rule) => buf.write_str(self.rule_name(*rule)),
            NodeKind::Seq(children) => list(buf, children, " "),
            NodeKind::Alt(children) => list(buf, children, " | "),
            NodeKind::Repeat0(child) => {
                self.display_node(*child, buf)?;
                buf.write_str("*")
            }
            NodeKind::Reduce { arity, reducer } => match reducer {
                Some(reducer) => write!(buf, "reduce/{arity}({})", reducer.name()),
                None => write!(buf, "reduce/{arity}"),
            },
            NodeKind::Peek(child) => {
                buf.write_str("&")?;
                self.display_node(*child, buf)
            }
            NodeKind::Not(child) => {
                buf.write_str("!")?;
                self.display_node(*child, buf)
            }
            NodeKind::Drop(child) => {
                buf.write_str("~")?;
                self.display_node(*child, buf)
            }
            NodeKind::Embedded(_) => buf.write_str("${parser}"),
        }
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (handle, rule, body) in self.iter() {
            let marker = match handle == self.root {
                true => " (root)",
                false => "",
            };
            write!(f, "{}{marker} = ", rule.name)?;
            self.display_node(body, f)?;
            f.write_str("\n")?;
        }
        Ok(())
    }
}
