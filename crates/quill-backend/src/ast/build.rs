//! Reads the grammar language into [`Program`] using the seed engine.

use quill_runtime::{Position, Token, TokenClass, TokenKind, Value};

use crate::{
    error::GrammarError,
    seed::{
        Engine, Seed,
        Seed::{Class, Literal},
        SeedValue,
    },
};

use super::{Chain, Expr, Ident, Program, Rule, TerminalKind};

/// A branch of an alternation before chains are separated from the base.
enum Branch {
    Seq(Expr),
    Chain { left: bool, chain: Chain },
}

enum Suffix {
    Repeat0,
    Repeat1,
    Maybe,
    SepBy { separator: Expr, non_empty: bool },
}

enum Syntax {
    Token(Token),
    List(Vec<Syntax>),
    Expr(Expr),
    Branch(Branch),
    Suffix(Suffix),
    Rule(Rule),
    Program(Program),
}

impl SeedValue for Syntax {
    fn from_token(token: &Token) -> Self {
        Syntax::Token(token.clone())
    }
    fn from_list(list: Vec<Self>) -> Self {
        Syntax::List(list)
    }
}

// Every seed action is handed exactly the values its sequence produces, so a
// shape mismatch is a bug in the tables below, not in the grammar being read.
impl Syntax {
    fn token(self) -> Token {
        match self {
            Syntax::Token(t) => t,
            _ => unreachable!("expected a token"),
        }
    }
    fn list(self) -> Vec<Syntax> {
        match self {
            Syntax::List(l) => l,
            _ => unreachable!("expected a list"),
        }
    }
    fn expr(self) -> Expr {
        match self {
            Syntax::Expr(e) => e,
            _ => unreachable!("expected an expression"),
        }
    }
    fn branch(self) -> Branch {
        match self {
            Syntax::Branch(b) => b,
            _ => unreachable!("expected a branch"),
        }
    }
    fn suffix(self) -> Suffix {
        match self {
            Syntax::Suffix(s) => s,
            _ => unreachable!("expected a suffix"),
        }
    }
    fn rule(self) -> Rule {
        match self {
            Syntax::Rule(r) => r,
            _ => unreachable!("expected a rule"),
        }
    }
}

fn pop(values: &mut Vec<Syntax>) -> Syntax {
    values
        .pop()
        .unwrap_or_else(|| unreachable!("seed action received too few values"))
}

const PROGRAM: usize = 0;
const RULE: usize = 1;
const RULE_HEAD: usize = 2;
const ALT: usize = 3;
const BRANCH: usize = 4;
const ITEM: usize = 5;
const PREFIXED: usize = 6;
const POSTFIXED: usize = 7;
const SUFFIX: usize = 8;
const PRIMARY: usize = 9;

fn rule(index: usize) -> Seed<Syntax> {
    Seed::Rule(index)
}

fn grammar_rules() -> Vec<Seed<Syntax>> {
    vec![
        // PROGRAM
        Seed::action(
            [
                Seed::seq([rule(RULE_HEAD).not(), rule(ALT)]).maybe(),
                rule(RULE).many(),
                Seed::End,
            ],
            build_program,
        ),
        // RULE
        Seed::action(
            [Class(TokenClass::Identifier), Literal("=").drop(), rule(ALT)],
            |mut v| {
                let body = pop(&mut v).expr();
                let name = pop(&mut v).token();
                Ok(Syntax::Rule(Rule {
                    name: ident(&name),
                    body,
                }))
            },
        ),
        // RULE_HEAD
        Seed::seq([Class(TokenClass::Identifier), Literal("=")]),
        // ALT
        Seed::action([rule(BRANCH).sep_by(Literal("|"))], build_alt),
        // BRANCH
        Seed::Alt(vec![
            Seed::action(
                [
                    Literal("<").drop(),
                    Seed::Alt(vec![
                        Seed::seq([Literal("."), rule(ITEM).some()]),
                        Seed::seq([rule(ITEM).some(), Literal(".")]),
                    ]),
                    Literal(">").drop(),
                    Literal("=>").maybe().drop(),
                    Class(TokenClass::Value),
                ],
                build_chain,
            ),
            Seed::action(
                [
                    rule(ITEM).some(),
                    Seed::seq([Literal("=>").drop(), Class(TokenClass::Value)]).maybe(),
                ],
                build_sequence,
            ),
        ]),
        // ITEM
        Seed::seq([
            rule(RULE_HEAD).not(),
            Seed::seq([Class(TokenClass::String), Literal("]")]).not(),
            rule(PREFIXED),
        ]),
        // PREFIXED
        Seed::Alt(vec![
            Seed::action(
                [
                    Seed::Alt(vec![Literal("&"), Literal("!"), Literal("~")]),
                    rule(PREFIXED),
                ],
                build_prefix,
            ),
            rule(POSTFIXED),
        ]),
        // POSTFIXED
        Seed::action([rule(PRIMARY), rule(SUFFIX).many()], build_postfix),
        // SUFFIX
        Seed::Alt(vec![
            Seed::action([Literal("*")], |_| Ok(Syntax::Suffix(Suffix::Repeat0))),
            Seed::action([Literal("+")], |_| Ok(Syntax::Suffix(Suffix::Repeat1))),
            Seed::action([Literal("?")], |_| Ok(Syntax::Suffix(Suffix::Maybe))),
            Seed::action([Literal("/").drop(), rule(PRIMARY)], |v| {
                sep_by(v, false)
            }),
            Seed::action([Literal("/+").drop(), rule(PRIMARY)], |v| {
                sep_by(v, true)
            }),
        ]),
        // PRIMARY
        Seed::Alt(vec![
            Seed::action([Class(TokenClass::String)], |mut v| {
                let token = pop(&mut v).token();
                Ok(Syntax::Expr(Expr::Literal(string(&token))))
            }),
            Seed::action(
                [Literal("%").drop(), Class(TokenClass::Identifier)],
                build_terminal,
            ),
            Seed::action([Class(TokenClass::Identifier)], |mut v| {
                let token = pop(&mut v).token();
                Ok(Syntax::Expr(Expr::Ident(ident(&token))))
            }),
            Seed::action([Class(TokenClass::Value)], build_interpolation),
            Seed::action(
                [
                    Literal("(").drop(),
                    rule(ALT),
                    rule(RULE).many(),
                    Literal(")").drop(),
                ],
                build_group,
            ),
            Seed::action(
                [
                    Literal("[").drop(),
                    Class(TokenClass::String),
                    rule(ALT),
                    Class(TokenClass::String),
                    Literal("]").drop(),
                ],
                build_structure,
            ),
        ]),
    ]
}

fn ident(token: &Token) -> Ident {
    Ident {
        name: string(token),
        position: token.position,
    }
}

fn string(token: &Token) -> quill_runtime::ArcStr {
    match &token.payload {
        Value::Str(s) => s.clone(),
        other => other.to_string().into(),
    }
}

fn build_program(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let rules: Vec<Rule> = pop(&mut v)
        .list()
        .into_iter()
        .map(Syntax::rule)
        .collect();
    let leading = pop(&mut v)
        .list()
        .pop()
        .map(|s| Box::new(s.expr()));
    if leading.is_none() && rules.is_empty() {
        return Err(GrammarError::EmptyGrammar);
    }
    Ok(Syntax::Program(Program { leading, rules }))
}

fn build_alt(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let branches = pop(&mut v).list();

    let mut bases = Vec::new();
    let mut chains = Vec::new();
    let mut direction = None;
    for branch in branches {
        match branch.branch() {
            Branch::Seq(expr) => bases.push(expr),
            Branch::Chain { left, chain } => {
                if *direction.get_or_insert(left) != left {
                    return Err(GrammarError::MixedChains);
                }
                chains.push(chain);
            }
        }
    }

    let alternation = |mut exprs: Vec<Expr>| match exprs.len() {
        1 => exprs.pop().unwrap_or_else(|| unreachable!("one branch")),
        _ => Expr::Alt(exprs),
    };

    let expr = match direction {
        None => alternation(bases),
        Some(_) if bases.is_empty() => return Err(GrammarError::MissingBase),
        Some(true) => Expr::LeftInfix {
            chains,
            base: Box::new(alternation(bases)),
        },
        Some(false) => Expr::RightInfix {
            chains,
            base: Box::new(alternation(bases)),
        },
    };
    Ok(Syntax::Expr(expr))
}

fn reducer(token: Token, usage: &'static str) -> Result<quill_runtime::Reducer, GrammarError> {
    match token.payload {
        Value::Func(f) => Ok(f),
        other => Err(GrammarError::BadInterpolation {
            kind: other.kind_name(),
            usage,
        }),
    }
}

fn build_chain(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let reducer = reducer(pop(&mut v).token(), "a chain reducer")?;
    let second = pop(&mut v);
    let first = pop(&mut v);
    // `< . ops >` has the dot token first, `< ops . >` last
    let (left, operands) = match first {
        Syntax::Token(_) => (true, second.list()),
        _ => (false, first.list()),
    };
    let operands = operands.into_iter().map(Syntax::expr).collect();
    Ok(Syntax::Branch(Branch::Chain {
        left,
        chain: Chain { operands, reducer },
    }))
}

fn build_sequence(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let reducer = match pop(&mut v).list().pop() {
        Some(token) => Some(reducer(token.token(), "a reducer")?),
        None => None,
    };
    let mut items: Vec<Expr> = pop(&mut v)
        .list()
        .into_iter()
        .map(Syntax::expr)
        .collect();

    let expr = match (items.len(), reducer) {
        (1, None) => items.pop().unwrap_or_else(|| unreachable!("one item")),
        (1, Some(f)) if matches!(items[0], Expr::Structure { reducer: None, .. }) => {
            match items.pop() {
                Some(Expr::Structure {
                    open,
                    content,
                    close,
                    ..
                }) => Expr::Structure {
                    open,
                    content,
                    close,
                    reducer: Some(f),
                },
                _ => unreachable!(),
            }
        }
        (_, reducer) => Expr::Seq { items, reducer },
    };
    Ok(Syntax::Branch(Branch::Seq(expr)))
}

fn build_prefix(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let inner = Box::new(pop(&mut v).expr());
    let op = pop(&mut v).token();
    let expr = match op.text() {
        Some("&") => Expr::Peek(inner),
        Some("!") => Expr::Not(inner),
        _ => Expr::Drop(inner),
    };
    Ok(Syntax::Expr(expr))
}

fn build_postfix(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let suffixes = pop(&mut v).list();
    let mut expr = pop(&mut v).expr();
    for suffix in suffixes {
        let inner = Box::new(expr);
        expr = match suffix.suffix() {
            Suffix::Repeat0 => Expr::Repeat0(inner),
            Suffix::Repeat1 => Expr::Repeat1(inner),
            Suffix::Maybe => Expr::Maybe(inner),
            Suffix::SepBy {
                separator,
                non_empty,
            } => Expr::SepBy {
                item: inner,
                separator: Box::new(separator),
                non_empty,
            },
        };
    }
    Ok(Syntax::Expr(expr))
}

fn sep_by(mut v: Vec<Syntax>, non_empty: bool) -> Result<Syntax, GrammarError> {
    let separator = pop(&mut v).expr();
    Ok(Syntax::Suffix(Suffix::SepBy {
        separator,
        non_empty,
    }))
}

fn build_terminal(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let token = pop(&mut v).token();
    let name = string(&token);
    match TerminalKind::from_name(&name) {
        Some(kind) => Ok(Syntax::Expr(Expr::Terminal(kind))),
        None => Err(GrammarError::UnknownTerminal {
            name: name.to_string(),
        }),
    }
}

fn build_interpolation(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let token = pop(&mut v).token();
    let expr = match token.payload {
        Value::Parser(parser) => Expr::Embedded(parser),
        Value::Str(text) => Expr::Literal(text),
        other => {
            return Err(GrammarError::BadInterpolation {
                kind: other.kind_name(),
                usage: "a grammar expression",
            })
        }
    };
    Ok(Syntax::Expr(expr))
}

fn build_group(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let rules: Vec<Rule> = pop(&mut v)
        .list()
        .into_iter()
        .map(Syntax::rule)
        .collect();
    let inner = pop(&mut v).expr();
    let expr = match rules.is_empty() {
        true => inner,
        false => Expr::Block(Program {
            leading: Some(Box::new(inner)),
            rules,
        }),
    };
    Ok(Syntax::Expr(expr))
}

fn build_structure(mut v: Vec<Syntax>) -> Result<Syntax, GrammarError> {
    let close = string(&pop(&mut v).token());
    let content = Box::new(pop(&mut v).expr());
    let open = string(&pop(&mut v).token());
    Ok(Syntax::Expr(Expr::Structure {
        open,
        content,
        close,
        reducer: None,
    }))
}

/// Punctuation of the grammar language, longest first.
const PUNCTUATION: &[&str] = &[
    "=>", "/+", "=", "|", "<", ">", ".", "&", "!", "~", "%", "*", "+", "?", "/",
];

/// Splits operator runs such as `&%` or `?|` into grammar punctuation.
///
/// The tokenizer keeps a run of operator characters together, which is what
/// subject text wants, but in a grammar the modifiers are written against
/// each other. Characters the grammar does not use are split off one by one.
fn split_punctuation(tokens: &[Token]) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        let (TokenKind::Operator, Some(text)) = (token.kind, token.text()) else {
            out.push(token.clone());
            continue;
        };
        let mut rest = text;
        let mut offset = token.position.offset;
        while !rest.is_empty() {
            let piece = PUNCTUATION
                .iter()
                .find(|p| rest.starts_with(**p))
                .map_or_else(|| first_char(rest), |p| &rest[..p.len()]);
            out.push(Token {
                kind: TokenKind::Operator,
                payload: Value::Str(piece.into()),
                position: Position::new(token.position.segment, offset, piece.len() as u32),
            });
            offset += piece.len() as u32;
            rest = &rest[piece.len()..];
        }
    }
    out
}

fn first_char(text: &str) -> &str {
    let end = text.chars().next().map_or(0, char::len_utf8);
    &text[..end]
}

/// Parses the tokens of a whole grammar template.
pub fn parse_program(tokens: &[Token]) -> Result<Program, GrammarError> {
    let tokens = split_punctuation(tokens);
    let rules = grammar_rules();
    let mut values = Engine::new(&rules, &tokens).parse(PROGRAM)?;
    match values.pop() {
        Some(Syntax::Program(program)) => Ok(program),
        _ => unreachable!("the program rule always produces a program"),
    }
}

#[cfg(test)]
mod tests {
    use quill_runtime::{lex, lex_str, template, Reducer};

    use super::*;

    fn parse(src: &str) -> Result<Program, GrammarError> {
        parse_program(&lex_str(src).unwrap())
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident(Ident {
            name: name.into(),
            position: quill_runtime::Position::new(0, 0, 0),
        })
    }

    #[test]
    fn adjacent_punctuation_is_split() {
        let tokens = split_punctuation(&lex_str("&%number ?|=>/+ -+").unwrap());
        let texts: Vec<_> = tokens.iter().filter_map(Token::text).collect();
        assert_eq!(texts, ["&", "%", "number", "?", "|", "=>", "/+", "-", "+"]);
        assert_eq!(tokens[1].position, Position::new(0, 1, 1));

        let program = parse(r#"Start = !%identifier "a"?|~%number*"#).unwrap();
        assert_eq!(
            program.rules[0].body,
            Expr::Alt(vec![
                Expr::Seq {
                    items: vec![
                        Expr::Not(Box::new(Expr::Terminal(TerminalKind::Identifier))),
                        Expr::Maybe(Box::new(Expr::Literal("a".into()))),
                    ],
                    reducer: None,
                },
                Expr::Drop(Box::new(Expr::Repeat0(Box::new(Expr::Terminal(
                    TerminalKind::Number
                ))))),
            ])
        );
    }

    #[test]
    fn rules_and_entry() {
        let program = parse(r#"Start = "a" B | B  B = %number*"#).unwrap();
        assert!(program.leading.is_none());
        assert_eq!(program.rules.len(), 2);
        assert_eq!(&*program.rules[0].name.name, "Start");
        assert_eq!(
            program.rules[0].body,
            Expr::Alt(vec![
                Expr::Seq {
                    items: vec![Expr::Literal("a".into()), ident("B")],
                    reducer: None,
                },
                ident("B"),
            ])
        );
        assert_eq!(
            program.rules[1].body,
            Expr::Repeat0(Box::new(Expr::Terminal(TerminalKind::Number)))
        );
    }

    #[test]
    fn leading_expression_and_prefixes() {
        let program = parse(r#"~"(" &A !B C? A = "a" B = "b" C = "c""#).unwrap();
        let Some(leading) = program.leading else {
            panic!("missing leading expression");
        };
        assert_eq!(
            *leading,
            Expr::Seq {
                items: vec![
                    Expr::Drop(Box::new(Expr::Literal("(".into()))),
                    Expr::Peek(Box::new(ident("A"))),
                    Expr::Not(Box::new(ident("B"))),
                    Expr::Maybe(Box::new(ident("C"))),
                ],
                reducer: None,
            }
        );
        assert_eq!(program.rules.len(), 3);
    }

    #[test]
    fn structures_and_separated_lists() {
        let program = parse(r#"List = ["[" %number / "," "]"]"#).unwrap();
        assert_eq!(
            program.rules[0].body,
            Expr::Structure {
                open: "[".into(),
                content: Box::new(Expr::SepBy {
                    item: Box::new(Expr::Terminal(TerminalKind::Number)),
                    separator: Box::new(Expr::Literal(",".into())),
                    non_empty: false,
                }),
                close: "]".into(),
                reducer: None,
            }
        );
    }

    #[test]
    fn chains_need_one_direction() {
        let f = Reducer::new(|_| Value::Null);
        let t = template!("E = < . \"+\" A > " {f.clone()} " | < A \"-\" . > " {f} " | A A = %number");
        let err = parse_program(&lex(&t).unwrap()).unwrap_err();
        assert_eq!(err, GrammarError::MixedChains);
    }

    #[test]
    fn chains_need_a_base() {
        let f = Reducer::new(|_| Value::Null);
        let t = template!("E = < . \"+\" %number > => " {f});
        let err = parse_program(&lex(&t).unwrap()).unwrap_err();
        assert_eq!(err, GrammarError::MissingBase);
    }

    #[test]
    fn reducer_folds_into_structure() {
        let f = Reducer::new(|_| Value::Null);
        let t = template!("[\"(\" %number \")\"] => " {f.clone()});
        let program = parse_program(&lex(&t).unwrap()).unwrap();
        let Some(Expr::Structure { reducer, .. }) = program.leading.map(|e| *e) else {
            panic!("expected a structure");
        };
        assert_eq!(reducer, Some(f));
    }

    #[test]
    fn nested_blocks() {
        let program = parse(r#"Start = (A A = "a") "b""#).unwrap();
        let Expr::Seq { items, .. } = &program.rules[0].body else {
            panic!("expected a sequence");
        };
        let Expr::Block(block) = &items[0] else {
            panic!("expected a block");
        };
        assert_eq!(block.rules.len(), 1);
        assert_eq!(block.leading.as_deref(), Some(&ident("A")));
    }

    #[test]
    fn bad_interpolations() {
        let t = template!("Start = " {1.5});
        let err = parse_program(&lex(&t).unwrap()).unwrap_err();
        assert_eq!(
            err,
            GrammarError::BadInterpolation {
                kind: "number",
                usage: "a grammar expression"
            }
        );

        let t = template!("Start = %number => " {"x"});
        let err = parse_program(&lex(&t).unwrap()).unwrap_err();
        assert_eq!(
            err,
            GrammarError::BadInterpolation {
                kind: "string",
                usage: "a reducer"
            }
        );
    }

    #[test]
    fn unknown_terminal() {
        let err = parse("Start = %float").unwrap_err();
        assert_eq!(
            err,
            GrammarError::UnknownTerminal {
                name: "float".into()
            }
        );
    }

    #[test]
    fn empty_grammar() {
        assert_eq!(parse("  // nothing\n").unwrap_err(), GrammarError::EmptyGrammar);
    }

    #[test]
    fn syntax_error_points_at_furthest_token() {
        let err = parse("Start = \"a\" )").unwrap_err();
        let GrammarError::Syntax { received, .. } = err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(received, "')'");
    }
}
