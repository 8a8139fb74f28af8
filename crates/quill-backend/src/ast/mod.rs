pub mod build;
pub mod display;

use quill_runtime::{ArcStr, Parser, Position, Reducer};

/// A named rule reference. Two idents are equal when their names are, wherever they appear.
#[derive(Clone, Debug)]
pub struct Ident {
    pub name: ArcStr,
    pub position: Position,
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TerminalKind {
    Identifier,
    Number,
    String,
    Value,
    Keyword,
    Operator,
}

impl TerminalKind {
    pub fn from_name(name: &str) -> Option<TerminalKind> {
        let kind = match name {
            "identifier" => TerminalKind::Identifier,
            "number" => TerminalKind::Number,
            "string" => TerminalKind::String,
            "value" => TerminalKind::Value,
            "keyword" => TerminalKind::Keyword,
            "operator" => TerminalKind::Operator,
            _ => return None,
        };
        Some(kind)
    }
    pub fn name(self) -> &'static str {
        match self {
            TerminalKind::Identifier => "identifier",
            TerminalKind::Number => "number",
            TerminalKind::String => "string",
            TerminalKind::Value => "value",
            TerminalKind::Keyword => "keyword",
            TerminalKind::Operator => "operator",
        }
    }
}

/// The operands of one `< . ops >` or `< ops . >` branch and the function folding them.
#[derive(Clone, PartialEq, Debug)]
pub struct Chain {
    pub operands: Vec<Expr>,
    pub reducer: Reducer,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Literal(ArcStr),
    Terminal(TerminalKind),
    Ident(Ident),
    Embedded(Parser),
    Structure {
        open: ArcStr,
        content: Box<Expr>,
        close: ArcStr,
        reducer: Option<Reducer>,
    },
    Seq {
        items: Vec<Expr>,
        reducer: Option<Reducer>,
    },
    Alt(Vec<Expr>),
    SepBy {
        item: Box<Expr>,
        separator: Box<Expr>,
        non_empty: bool,
    },
    Peek(Box<Expr>),
    Not(Box<Expr>),
    Drop(Box<Expr>),
    Repeat0(Box<Expr>),
    Repeat1(Box<Expr>),
    Maybe(Box<Expr>),
    LeftInfix {
        chains: Vec<Chain>,
        base: Box<Expr>,
    },
    RightInfix {
        chains: Vec<Chain>,
        base: Box<Expr>,
    },
    Block(Program),
}

impl Expr {
    /// Whether the expression leaves a value behind. Lookaheads and dropped items do not.
    pub fn contributes(&self) -> bool {
        match self {
            Expr::Peek(_) | Expr::Not(_) | Expr::Drop(_) => false,
            Expr::Literal(_)
            | Expr::Terminal(_)
            | Expr::Ident(_)
            | Expr::Embedded(_)
            | Expr::Structure { .. }
            | Expr::Seq { .. }
            | Expr::Alt(_)
            | Expr::SepBy { .. }
            | Expr::Repeat0(_)
            | Expr::Repeat1(_)
            | Expr::Maybe(_)
            | Expr::LeftInfix { .. }
            | Expr::RightInfix { .. }
            | Expr::Block(_) => true,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Rule {
    pub name: Ident,
    pub body: Expr,
}

/// A grammar, or a nested `( ... )` block with its own rules.
#[derive(Clone, PartialEq, Debug)]
pub struct Program {
    pub leading: Option<Box<Expr>>,
    pub rules: Vec<Rule>,
}
