use std::fmt::{Display, Formatter, Result};

use super::{Chain, Expr, Program};

/// Writes `text` as a double quoted grammar literal.
pub fn display_literal(f: &mut Formatter<'_>, text: &str) -> Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' | '\\' => write!(f, "\\{c}")?,
            _ => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

fn display_chain(f: &mut Formatter<'_>, chain: &Chain, left: bool) -> Result {
    f.write_str("<")?;
    if left {
        f.write_str(" .")?;
    }
    for operand in &chain.operands {
        write!(f, " {operand}")?;
    }
    if !left {
        f.write_str(" .")?;
    }
    write!(f, " > => ${{{}}}", chain.reducer.name())
}

fn display_infix(f: &mut Formatter<'_>, chains: &[Chain], base: &Expr, left: bool) -> Result {
    f.write_str("(")?;
    for chain in chains {
        display_chain(f, chain, left)?;
        f.write_str(" | ")?;
    }
    write!(f, "{base})")
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Expr::Literal(text) => display_literal(f, text),
            Expr::Terminal(kind) => write!(f, "%{}", kind.name()),
            Expr::Ident(ident) => f.write_str(&ident.name),
            Expr::Embedded(_) => f.write_str("${parser}"),
            Expr::Structure {
                open,
                content,
                close,
                reducer,
            } => {
                f.write_str("[")?;
                display_literal(f, open)?;
                write!(f, " {content} ")?;
                display_literal(f, close)?;
                f.write_str("]")?;
                if let Some(reducer) = reducer {
                    write!(f, " => ${{{}}}", reducer.name())?;
                }
                Ok(())
            }
            Expr::Seq { items, reducer } => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                if let Some(reducer) = reducer {
                    write!(f, " => ${{{}}}", reducer.name())?;
                }
                f.write_str(")")
            }
            Expr::Alt(branches) => {
                f.write_str("(")?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{branch}")?;
                }
                f.write_str(")")
            }
            Expr::SepBy {
                item,
                separator,
                non_empty,
            } => {
                let op = match non_empty {
                    true => "/+",
                    false => "/",
                };
                write!(f, "{item} {op} {separator}")
            }
            Expr::Peek(inner) => write!(f, "&{inner}"),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::Drop(inner) => write!(f, "~{inner}"),
            Expr::Repeat0(inner) => write!(f, "{inner}*"),
            Expr::Repeat1(inner) => write!(f, "{inner}+"),
            Expr::Maybe(inner) => write!(f, "{inner}?"),
            Expr::LeftInfix { chains, base } => display_infix(f, chains, base, true),
            Expr::RightInfix { chains, base } => display_infix(f, chains, base, false),
            Expr::Block(program) => write!(f, "({program})"),
        }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let mut first = true;
        if let Some(leading) = &self.leading {
            write!(f, "{leading}")?;
            first = false;
        }
        for rule in &self.rules {
            if !first {
                f.write_str("\n")?;
            }
            first = false;
            write!(f, "{} = {}", rule.name.name, rule.body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use quill_runtime::lex_str;

    use crate::ast::build::parse_program;

    #[test]
    fn displays_like_the_source() {
        let src = r#"Start = ~"(" Item / "," ")"  Item = %number | "\"" Item+"#;
        let program = parse_program(&lex_str(src).unwrap()).unwrap();
        assert_eq!(
            program.to_string(),
            "Start = (~\"(\" Item / \",\" \")\")\nItem = (%number | (\"\\\"\" Item+))"
        );
    }
}
