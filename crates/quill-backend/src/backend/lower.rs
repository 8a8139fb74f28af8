//! Lowers the surface AST into primitive nodes.
//!
//! Every node pushes exactly one value onto the runtime stack, except `Peek`,
//! `Not` and `Drop` which push nothing. Positions which need a value use
//! [`LowerCx::valued`] to pad those with a `null`.

use cranelift_entity::{PrimaryMap, SecondaryMap};
use quill_runtime::{ArcStr, Reducer, RuleId, TokenClass};

use crate::{
    ast::{Expr, Program, TerminalKind},
    error::GrammarError,
};

use super::{
    grammar::{Grammar, Node, NodeId, NodeKind, RuleDef},
    literal::{LiteralTable, Role, Shape},
    resolve::{Scope, Scopes},
};

pub struct LowerCx {
    pub rules: PrimaryMap<RuleId, RuleDef>,
    pub bodies: SecondaryMap<RuleId, Option<NodeId>>,
    pub nodes: PrimaryMap<NodeId, Node>,
    pub scopes: Scopes,
    pub literals: LiteralTable,
    /// The rule new nodes are attributed to.
    pub current: RuleId,
    keyword: RuleId,
    operator: RuleId,
}

impl LowerCx {
    pub fn new() -> LowerCx {
        let mut rules = PrimaryMap::new();
        let keyword = rules.push(RuleDef {
            name: "%keyword".into(),
            traced: false,
        });
        let operator = rules.push(RuleDef {
            name: "%operator".into(),
            traced: false,
        });
        LowerCx {
            rules,
            bodies: SecondaryMap::new(),
            nodes: PrimaryMap::new(),
            scopes: Scopes::default(),
            literals: LiteralTable::default(),
            current: keyword,
            keyword,
            operator,
        }
    }

    pub fn lower(mut self, program: &Program) -> Result<Grammar, GrammarError> {
        let root = self.lower_program(program)?;
        self.finish_synthetic(self.keyword, Shape::Keyword);
        self.finish_synthetic(self.operator, Shape::Operator);

        Ok(Grammar {
            rules: self.rules,
            bodies: self.bodies,
            nodes: self.nodes,
            root,
        })
    }

    /// `%keyword` and `%operator` match any literal of their shape used in the grammar.
    fn finish_synthetic(&mut self, rule: RuleId, shape: Shape) {
        self.current = rule;
        let literals: Vec<ArcStr> = self.literals.with_shape(shape).cloned().collect();
        let branches = literals
            .into_iter()
            .map(|text| self.node(NodeKind::Literal(text)))
            .collect();
        let body = self.node(NodeKind::Alt(branches));
        self.bodies[rule] = Some(body);
    }

    pub fn declare(&mut self, name: impl Into<ArcStr>, traced: bool) -> RuleId {
        self.rules.push(RuleDef {
            name: name.into(),
            traced,
        })
    }

    /// Name for an auxiliary rule generated while lowering the current one.
    pub fn auxiliary_name(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.rules[self.current].name)
    }

    pub fn node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            rule: self.current,
        })
    }

    pub fn reduce(&mut self, arity: usize, reducer: Option<Reducer>) -> NodeId {
        self.node(NodeKind::Reduce { arity, reducer })
    }

    /// Lowers `body` as the definition of `rule`.
    pub fn define(&mut self, rule: RuleId, body: &Expr) -> Result<(), GrammarError> {
        let prev = std::mem::replace(&mut self.current, rule);
        let node = self.valued(body);
        self.current = prev;
        self.bodies[rule] = Some(node?);
        Ok(())
    }

    /// Lowers a program or nested block, returning its entry rule.
    fn lower_program(&mut self, program: &Program) -> Result<RuleId, GrammarError> {
        let mut scope = Scope::default();
        let mut handles = Vec::with_capacity(program.rules.len());
        for rule in &program.rules {
            let handle = self.declare(rule.name.name.clone(), true);
            scope.insert(&rule.name.name, handle)?;
            handles.push(handle);
        }

        self.scopes.push(scope);
        let entry = match (&program.leading, handles.first()) {
            (Some(leading), _) => {
                // a nested block is named after the rule containing it
                let name = match self.scopes.depth() {
                    1 => "<entry>".to_owned(),
                    _ => self.auxiliary_name("block"),
                };
                let entry = self.declare(name, false);
                self.define(entry, leading)?;
                entry
            }
            (None, Some(&first)) => first,
            (None, None) => return Err(GrammarError::EmptyGrammar),
        };
        for (rule, &handle) in program.rules.iter().zip(&handles) {
            self.define(handle, &rule.body)?;
        }
        self.scopes.pop();

        Ok(entry)
    }

    /// Lowers `expr` so that it leaves exactly one value.
    pub fn valued(&mut self, expr: &Expr) -> Result<NodeId, GrammarError> {
        let node = self.lower_expr(expr)?;
        match expr.contributes() {
            true => Ok(node),
            false => {
                let null = self.reduce(0, None);
                Ok(self.node(NodeKind::Seq(vec![node, null])))
            }
        }
    }

    pub fn lower_expr(&mut self, expr: &Expr) -> Result<NodeId, GrammarError> {
        let kind = match expr {
            Expr::Literal(text) => {
                self.literals.register(text, Role::Plain)?;
                NodeKind::Literal(text.clone())
            }
            Expr::Terminal(kind) => match kind {
                TerminalKind::Identifier => NodeKind::MatchType(TokenClass::Identifier),
                TerminalKind::Number => NodeKind::MatchType(TokenClass::Number),
                TerminalKind::String => NodeKind::MatchType(TokenClass::String),
                TerminalKind::Value => NodeKind::MatchType(TokenClass::Value),
                TerminalKind::Keyword => NodeKind::Nonterminal(self.keyword),
                TerminalKind::Operator => NodeKind::Nonterminal(self.operator),
            },
            Expr::Ident(ident) => NodeKind::Nonterminal(self.scopes.resolve(ident)?),
            Expr::Embedded(parser) => NodeKind::Embedded(parser.clone()),
            Expr::Structure {
                open,
                content,
                close,
                reducer,
            } => {
                self.literals.register(open, Role::Open)?;
                self.literals.register(close, Role::Close)?;
                let open = self.node(NodeKind::Literal(open.clone()));
                let content = self.valued(content)?;
                let close = self.node(NodeKind::Literal(close.clone()));
                let reduce = self.reduce(3, Some(reducers::inner(reducer.clone())));
                NodeKind::Seq(vec![open, content, close, reduce])
            }
            Expr::Seq { items, reducer } => {
                // without a reducer, literals next to other values are punctuation
                let punctuation = reducer.is_none()
                    && items
                        .iter()
                        .any(|item| item.contributes() && !matches!(item, Expr::Literal(_)));
                let mut children = Vec::with_capacity(items.len() + 1);
                let mut arity = 0;
                for item in items {
                    let node = self.lower_expr(item)?;
                    match punctuation && matches!(item, Expr::Literal(_)) {
                        true => children.push(self.node(NodeKind::Drop(node))),
                        false => {
                            children.push(node);
                            arity += usize::from(item.contributes());
                        }
                    }
                }
                children.push(self.reduce(arity, reducer.clone()));
                NodeKind::Seq(children)
            }
            Expr::Alt(branches) => {
                let children = branches
                    .iter()
                    .map(|branch| self.valued(branch))
                    .collect::<Result<_, _>>()?;
                NodeKind::Alt(children)
            }
            Expr::SepBy {
                item,
                separator,
                non_empty,
            } => {
                let list = self.separated_list(item, separator)?;
                let list = self.node(NodeKind::Nonterminal(list));
                match non_empty {
                    true => return Ok(list),
                    false => {
                        let empty = self.reduce(0, Some(reducers::empty_list()));
                        NodeKind::Alt(vec![list, empty])
                    }
                }
            }
            Expr::Peek(inner) => NodeKind::Peek(self.lower_expr(inner)?),
            Expr::Not(inner) => NodeKind::Not(self.lower_expr(inner)?),
            Expr::Drop(inner) => NodeKind::Drop(self.lower_expr(inner)?),
            Expr::Repeat0(inner) => NodeKind::Repeat0(self.valued(inner)?),
            Expr::Repeat1(inner) => {
                // the first iteration and the loop share one child node
                let child = self.valued(inner)?;
                let rest = self.node(NodeKind::Repeat0(child));
                let cons = self.reduce(2, Some(reducers::cons()));
                NodeKind::Seq(vec![child, rest, cons])
            }
            Expr::Maybe(inner) => {
                let child = self.valued(inner)?;
                let none = self.reduce(0, None);
                NodeKind::Alt(vec![child, none])
            }
            Expr::LeftInfix { chains, base } => return self.left_infix(chains, base),
            Expr::RightInfix { chains, base } => {
                let rule = self.right_infix(chains, base)?;
                NodeKind::Nonterminal(rule)
            }
            Expr::Block(program) => NodeKind::Nonterminal(self.lower_program(program)?),
        };
        Ok(self.node(kind))
    }

    /// `R = item (sep R?)?`, collecting the items into a list.
    fn separated_list(&mut self, item: &Expr, separator: &Expr) -> Result<RuleId, GrammarError> {
        let rule = self.declare(self.auxiliary_name("list"), false);
        let prev = std::mem::replace(&mut self.current, rule);

        let item = self.valued(item)?;
        let separator = self.lower_expr(separator)?;
        let separator = self.node(NodeKind::Drop(separator));

        let recurse = self.node(NodeKind::Nonterminal(rule));
        let empty = self.reduce(0, Some(reducers::empty_list()));
        let rest = self.node(NodeKind::Alt(vec![recurse, empty]));
        let tail = self.node(NodeKind::Seq(vec![separator, rest]));
        let empty = self.reduce(0, Some(reducers::empty_list()));
        let tail = self.node(NodeKind::Alt(vec![tail, empty]));
        let cons = self.reduce(2, Some(reducers::cons()));
        let body = self.node(NodeKind::Seq(vec![item, tail, cons]));

        self.bodies[rule] = Some(body);
        self.current = prev;
        Ok(rule)
    }
}

/// Reducers the lowering inserts on its own.
pub(super) mod reducers {
    use quill_runtime::{Reducer, Value};

    /// `[open, content, close]` to the content, passed through `user` when there is one.
    pub fn inner(user: Option<Reducer>) -> Reducer {
        Reducer::named("inner", move |mut args| {
            let content = match args.len() {
                3 => args.swap_remove(1),
                _ => Value::Null,
            };
            match &user {
                Some(user) => user.call(vec![content]),
                None => content,
            }
        })
    }

    pub fn cons() -> Reducer {
        Reducer::named("cons", |mut args| {
            let tail = args.pop().and_then(Value::into_list).unwrap_or_default();
            let mut list = Vec::with_capacity(tail.len() + 1);
            list.extend(args.pop());
            list.extend(tail);
            Value::List(list)
        })
    }

    pub fn empty_list() -> Reducer {
        Reducer::named("empty", |_| Value::List(Vec::new()))
    }

    /// Captures the operands of one chain step, waiting for the left hand side.
    pub fn partial(user: Reducer) -> Reducer {
        let name = user.name().to_owned();
        Reducer::named(&name.clone(), move |operands| {
            let user = user.clone();
            Value::Func(Reducer::named(&name, move |mut lhs| {
                lhs.extend(operands.iter().cloned());
                user.call(lhs)
            }))
        })
    }

    /// `[base, [step...]]`, applying each step to the accumulated value.
    pub fn fold_left() -> Reducer {
        Reducer::named("fold_left", |mut args| {
            let steps = args.pop().and_then(Value::into_list).unwrap_or_default();
            let base = args.pop().unwrap_or_default();
            steps.into_iter().fold(base, |acc, step| match step {
                Value::Func(f) => f.call(vec![acc]),
                _ => acc,
            })
        })
    }

    /// `[base, tail]`, where the tail is either a pending step or null.
    pub fn apply_tail() -> Reducer {
        Reducer::named("apply_tail", |mut args| {
            let tail = args.pop().unwrap_or_default();
            let base = args.pop().unwrap_or_default();
            match tail {
                Value::Func(f) => f.call(vec![base]),
                _ => base,
            }
        })
    }
}

impl Default for LowerCx {
    fn default() -> Self {
        LowerCx::new()
    }
}
