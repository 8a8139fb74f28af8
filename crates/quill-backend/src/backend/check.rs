//! First-set computation and the checks which keep a grammar deterministic
//! with one token of lookahead.

use std::collections::BTreeSet;

use cranelift_entity::SecondaryMap;
use quill_runtime::{lexer::is_identifier, RuleId, Terminal, TokenClass};

use crate::error::GrammarError;

use super::grammar::{Grammar, NodeId, NodeKind};

pub type FirstSet = BTreeSet<Terminal>;

fn nullable(set: &FirstSet) -> bool {
    set.contains(&Terminal::End)
}

/// Whether a token starting `later` would be taken by something that can
/// start with `earlier`. An identifier class takes keyword-shaped literals,
/// since loops and options continue on the class alone.
fn shadows(earlier: &Terminal, later: &Terminal) -> bool {
    match (earlier, later) {
        (Terminal::Class(TokenClass::Identifier), Terminal::Literal(text)) => is_identifier(text),
        _ => earlier == later,
    }
}

pub struct FirstSets<'a> {
    grammar: &'a Grammar,
    nodes: SecondaryMap<NodeId, Option<FirstSet>>,
    rules: SecondaryMap<RuleId, Option<FirstSet>>,
    /// Rules whose first-set is being computed, to detect left recursion.
    expanding: Vec<RuleId>,
}

impl<'a> FirstSets<'a> {
    pub fn new(grammar: &'a Grammar) -> FirstSets<'a> {
        FirstSets {
            grammar,
            nodes: SecondaryMap::new(),
            rules: SecondaryMap::new(),
            expanding: Vec::new(),
        }
    }

    pub fn rule(&mut self, rule: RuleId) -> Result<FirstSet, GrammarError> {
        if let Some(set) = &self.rules[rule] {
            return Ok(set.clone());
        }

        if let Some(start) = self.expanding.iter().position(|&r| r == rule) {
            //      /start
            // A -> B -> C -> B
            let path = self.expanding[start..]
                .iter()
                .chain(std::iter::once(&rule))
                .map(|&r| self.grammar.rule_name(r).to_owned())
                .collect();
            return Err(GrammarError::LeftRecursion { path });
        }

        self.expanding.push(rule);
        let set = self.node(self.grammar.body(rule));
        self.expanding.pop();

        let set = set?;
        self.rules[rule] = Some(set.clone());
        Ok(set)
    }

    pub fn node(&mut self, node: NodeId) -> Result<FirstSet, GrammarError> {
        if let Some(set) = &self.nodes[node] {
            return Ok(set.clone());
        }

        let set = match self.grammar.kind(node) {
            NodeKind::Literal(text) => FirstSet::from([Terminal::Literal(text.clone())]),
            NodeKind::MatchType(class) => FirstSet::from([Terminal::Class(*class)]),
            NodeKind::Nonterminal(rule) => self.rule(*rule)?,
            NodeKind::Seq(children) => {
                let mut set = FirstSet::new();
                let mut all_nullable = true;
                for &child in children {
                    let first = self.node(child)?;
                    let child_nullable = nullable(&first);
                    set.extend(first.into_iter().filter(|t| *t != Terminal::End));
                    if !child_nullable {
                        all_nullable = false;
                        break;
                    }
                }
                if all_nullable {
                    set.insert(Terminal::End);
                }
                set
            }
            NodeKind::Alt(children) => {
                let mut set = FirstSet::new();
                for &child in children {
                    set.extend(self.node(child)?);
                }
                set
            }
            NodeKind::Repeat0(child) => {
                let mut set = self.node(*child)?;
                set.insert(Terminal::End);
                set
            }
            NodeKind::Reduce { .. } | NodeKind::Peek(_) | NodeKind::Not(_) => {
                FirstSet::from([Terminal::End])
            }
            NodeKind::Drop(child) => self.node(*child)?,
            NodeKind::Embedded(parser) => parser.first_set().clone(),
        };

        self.nodes[node] = Some(set.clone());
        Ok(set)
    }

    /// Computes every first-set and rejects grammars that are not LL(1).
    pub fn check_all(&mut self) -> Result<(), GrammarError> {
        let grammar = self.grammar;
        for rule in grammar.rules.keys() {
            self.rule(rule)?;
        }
        for node in grammar.nodes.keys() {
            self.check_node(node)?;
        }
        Ok(())
    }

    fn check_node(&mut self, node: NodeId) -> Result<(), GrammarError> {
        let grammar = self.grammar;
        let rule = || grammar.owner(node).to_owned();

        match grammar.kind(node) {
            NodeKind::Seq(children) => {
                // terminals of the optional items directly before the current one
                let mut pending = FirstSet::new();
                for &child in children {
                    let first = self.node(child)?;
                    if let Some(terminal) = first.iter().find(|t| {
                        **t != Terminal::End && pending.iter().any(|p| shadows(p, t))
                    }) {
                        return Err(GrammarError::FirstFollow {
                            terminal: terminal.clone(),
                            rule: rule(),
                        });
                    }
                    match nullable(&first) {
                        true => pending.extend(first.into_iter().filter(|t| *t != Terminal::End)),
                        false => pending.clear(),
                    }
                }
            }
            NodeKind::Alt(children) => {
                let mut seen = FirstSet::new();
                for &child in children {
                    for terminal in self.node(child)? {
                        if seen.contains(&terminal) {
                            return Err(GrammarError::FirstFirst {
                                terminal,
                                rule: rule(),
                            });
                        }
                        seen.insert(terminal);
                    }
                }
            }
            NodeKind::Repeat0(child) => {
                if nullable(&self.node(*child)?) {
                    return Err(GrammarError::EmptyRepeat { rule: rule() });
                }
            }
            NodeKind::Literal(_)
            | NodeKind::MatchType(_)
            | NodeKind::Nonterminal(_)
            | NodeKind::Reduce { .. }
            | NodeKind::Peek(_)
            | NodeKind::Not(_)
            | NodeKind::Drop(_)
            | NodeKind::Embedded(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use quill_runtime::lex_str;

    use super::*;
    use crate::ast::build::parse_program;

    fn check(src: &str) -> Result<(), GrammarError> {
        let grammar = Grammar::new(&parse_program(&lex_str(src).unwrap())?)?;
        FirstSets::new(&grammar).check_all()
    }

    fn first_of_root(src: &str) -> Vec<String> {
        let grammar = Grammar::new(&parse_program(&lex_str(src).unwrap()).unwrap()).unwrap();
        let mut sets = FirstSets::new(&grammar);
        sets.rule(grammar.root)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn sequences_skip_nullable_prefixes() {
        assert_eq!(
            first_of_root(r#"Start = "a"? "b"* %number"#),
            ["'a'", "'b'", "%number"]
        );
        assert_eq!(
            first_of_root(r#"Start = "a"? &"b""#),
            ["'a'", "end of input"]
        );
    }

    #[test]
    fn first_first() {
        let err = check(r#"Start = "x" "y" | "x" "z""#).unwrap_err();
        assert_eq!(
            err,
            GrammarError::FirstFirst {
                terminal: Terminal::Literal("x".into()),
                rule: "Start".into(),
            }
        );
    }

    #[test]
    fn first_follow() {
        let err = check(r#"Start = "x"* "x""#).unwrap_err();
        assert_eq!(
            err,
            GrammarError::FirstFollow {
                terminal: Terminal::Literal("x".into()),
                rule: "Start".into(),
            }
        );
    }

    #[test]
    fn identifier_loops_swallow_keywords() {
        let err = check(r#"Start = %identifier* "end""#).unwrap_err();
        assert_eq!(
            err,
            GrammarError::FirstFollow {
                terminal: Terminal::Literal("end".into()),
                rule: "Start".into(),
            }
        );
        assert!(matches!(
            check(r#"Start = %identifier? "end""#),
            Err(GrammarError::FirstFollow { .. })
        ));
        // operators never lex as identifiers
        check(r#"Start = %identifier* ";""#).unwrap();
        // a keyword before the class is decided by the literal first
        check(r#"Start = "let"? %identifier"#).unwrap();
    }

    #[test]
    fn left_recursion() {
        let err = check(r#"A = A "x" | "y""#).unwrap_err();
        assert_eq!(
            err,
            GrammarError::LeftRecursion {
                path: vec!["A".into(), "A".into()]
            }
        );

        let err = check(r#"A = B "x" | "y"  B = "z"? A"#).unwrap_err();
        assert_eq!(
            err,
            GrammarError::LeftRecursion {
                path: vec!["A".into(), "B".into(), "A".into()]
            }
        );
    }

    #[test]
    fn right_recursion_is_fine() {
        check(r#"A = "(" A ")" | "y""#).unwrap();
    }

    #[test]
    fn empty_repeat() {
        let err = check(r#"Start = ("x"?)*"#).unwrap_err();
        assert_eq!(
            err,
            GrammarError::EmptyRepeat {
                rule: "Start".into()
            }
        );
    }

    #[test]
    fn keywords_and_identifiers_are_distinct() {
        check(r#"Start = "if" %number | %identifier"#).unwrap();
    }
}
