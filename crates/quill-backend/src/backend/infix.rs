//! Lowering of operator chains.
//!
//! A left chain `< . ops >` becomes `base (ops)*`, each iteration producing a
//! pending step applied to the accumulated value. A right chain `< ops . >`
//! becomes a rule `R = ops R | base`. Right chains whose first operand is the
//! base, or one alternative of it, are left factored into that alternative
//! followed by `(ops[1..] R)?`, otherwise it would start two alternatives.

use quill_runtime::RuleId;

use crate::{
    ast::{Chain, Expr},
    error::GrammarError,
};

use super::{
    grammar::{NodeId, NodeKind},
    lower::{reducers, LowerCx},
};

impl LowerCx {
    /// Lowers `operands` in order, returning the nodes and how many of them leave a value.
    fn operands(&mut self, operands: &[Expr]) -> Result<(Vec<NodeId>, usize), GrammarError> {
        let mut nodes = Vec::with_capacity(operands.len() + 2);
        let mut arity = 0;
        for operand in operands {
            nodes.push(self.lower_expr(operand)?);
            arity += usize::from(operand.contributes());
        }
        Ok((nodes, arity))
    }

    pub fn left_infix(&mut self, chains: &[Chain], base: &Expr) -> Result<NodeId, GrammarError> {
        let base = self.valued(base)?;

        let mut steps = Vec::with_capacity(chains.len());
        for chain in chains {
            let (mut children, arity) = self.operands(&chain.operands)?;
            let partial = reducers::partial(chain.reducer.clone());
            children.push(self.reduce(arity, Some(partial)));
            steps.push(self.node(NodeKind::Seq(children)));
        }

        let steps = self.node(NodeKind::Alt(steps));
        let steps = self.node(NodeKind::Repeat0(steps));
        let fold = self.reduce(2, Some(reducers::fold_left()));
        Ok(self.node(NodeKind::Seq(vec![base, steps, fold])))
    }

    pub fn right_infix(&mut self, chains: &[Chain], base: &Expr) -> Result<RuleId, GrammarError> {
        let rule = self.declare(self.auxiliary_name("chain"), false);
        let prev = std::mem::replace(&mut self.current, rule);

        let bases = match base {
            Expr::Alt(branches) => &branches[..],
            other => std::slice::from_ref(other),
        };
        // pending steps of the chains which begin with each base branch
        let mut tails = vec![Vec::new(); bases.len()];

        let mut branches = Vec::new();
        for chain in chains {
            let factored = chain
                .operands
                .first()
                .and_then(|first| bases.iter().position(|base| base == first));
            let operands = match factored {
                Some(_) => &chain.operands[1..],
                None => &chain.operands[..],
            };
            let (mut children, arity) = self.operands(operands)?;
            children.push(self.node(NodeKind::Nonterminal(rule)));
            match factored {
                Some(index) => {
                    let partial = reducers::partial(chain.reducer.clone());
                    children.push(self.reduce(arity + 1, Some(partial)));
                    tails[index].push(self.node(NodeKind::Seq(children)));
                }
                None => {
                    children.push(self.reduce(arity + 1, Some(chain.reducer.clone())));
                    branches.push(self.node(NodeKind::Seq(children)));
                }
            }
        }

        for (base, mut tails) in bases.iter().zip(tails) {
            let base = self.valued(base)?;
            let base = match tails.is_empty() {
                true => base,
                false => {
                    tails.push(self.reduce(0, None));
                    let tail = self.node(NodeKind::Alt(tails));
                    let apply = self.reduce(2, Some(reducers::apply_tail()));
                    self.node(NodeKind::Seq(vec![base, tail, apply]))
                }
            };
            branches.push(base);
        }

        let body = self.node(NodeKind::Alt(branches));
        self.bodies[rule] = Some(body);
        self.current = prev;
        Ok(rule)
    }
}
