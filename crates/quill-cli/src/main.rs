use std::{
    fmt::Write as _,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use clap::Parser as _;
use quill_backend::{backend::check::FirstSets, Compilation};
use quill_runtime::{ParseError, Template, Value};
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// Compile a grammar file and parse some input with it.
#[derive(clap::Parser)]
#[command(name = "quill", version)]
struct Args {
    /// The grammar to compile.
    grammar: PathBuf,
    /// The input to parse, standard input when missing.
    input: Option<PathBuf>,
    /// Print the grammar's tokens.
    #[arg(long)]
    tokens: bool,
    /// Print the grammar as it was read.
    #[arg(long)]
    ast: bool,
    /// Print the lowered rule table.
    #[arg(long)]
    rules: bool,
    /// Print the first-set of every rule.
    #[arg(long)]
    first: bool,
    /// Stop after compiling the grammar.
    #[arg(long)]
    check: bool,
}

struct StdoutSink;

impl std::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        use std::io::Write as _;
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| std::fmt::Error)
    }
}

/// Serializes values the way a JSON reader would expect them.
struct Json<'a>(&'a Value);

impl Serialize for Json<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Json(item))?;
                }
                seq.end()
            }
            Value::Func(reducer) => {
                serializer.collect_str(&format_args!("<function {}>", reducer.name()))
            }
            Value::Parser(_) => serializer.serialize_str("<parser>"),
        }
    }
}

fn init_logging() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "WARN".to_owned());
    let level = log::LevelFilter::from_str(&level).unwrap_or(log::LevelFilter::Warn);
    // a logger may already be installed, that is fine
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    );
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read `{}`", path.display()))
}

fn report_parse(file: &str, err: &ParseError) -> anyhow::Error {
    let mut message = format!("{file}: {err}");
    for frame in &err.trace {
        let _ = write!(message, "\n  {frame}");
    }
    anyhow::anyhow!(message)
}

fn dump(args: &Args, compilation: &Compilation) -> anyhow::Result<()> {
    let mut out = StdoutSink;
    if args.tokens {
        for token in &compilation.tokens {
            writeln!(out, "{} {token}", token.position)?;
        }
    }
    if args.ast {
        writeln!(out, "{}", compilation.program)?;
    }
    if args.rules {
        write!(out, "{}", compilation.grammar)?;
    }
    if args.first {
        let grammar = &compilation.grammar;
        let mut sets = FirstSets::new(grammar);
        for rule in grammar.rules.keys() {
            let set = sets.rule(rule)?;
            let set = set.iter().map(ToString::to_string).collect::<Vec<_>>();
            writeln!(out, "{}: {}", grammar.rule_name(rule), set.join(", "))?;
        }
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let file = args.grammar.display().to_string();
    let src = read(&args.grammar)?;

    let compilation = quill_backend::analyze(&Template::from(src))
        .map_err(|e| anyhow::anyhow!("{file}: {e}"))?;
    dump(&args, &compilation).map_err(|e| anyhow::anyhow!("{file}: {e}"))?;

    let parser =
        quill_backend::finish(&compilation.grammar).map_err(|e| anyhow::anyhow!("{file}: {e}"))?;
    if args.check {
        return Ok(());
    }

    let (input_name, input) = match &args.input {
        Some(path) => (path.display().to_string(), read(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read standard input")?;
            ("<stdin>".to_owned(), buf)
        }
    };

    let value = parser
        .parse_str(&input)
        .map_err(|e| report_parse(&input_name, &e))?;
    let json = serde_json::to_string_pretty(&Json(&value))?;
    println!("{json}");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;

    #[test]
    fn values_serialize_as_json() {
        let value = Value::List(vec![
            Value::Number(1.0),
            Value::Number(0.5),
            Value::Null,
            "x".into(),
            Value::Bool(false),
        ]);
        assert_eq!(
            serde_json::to_string(&Json(&value)).unwrap(),
            r#"[1,0.5,null,"x",false]"#
        );
    }

    #[test]
    fn parse_errors_list_their_frames() {
        let parser = quill_backend::compile_str(r#"Expr = ~"(" Expr ~")" | %number"#).unwrap();
        let err = parser.parse_str("((1)").unwrap_err();
        let message = report_parse("in.txt", &err).to_string();
        assert!(message.starts_with("in.txt: expected"), "{message}");
        assert!(message.contains("in rule Expr"), "{message}");
    }

    #[test]
    fn arguments_parse() {
        let args = Args::try_parse_from(["quill", "g.quill", "--rules", "--first"]).unwrap();
        assert!(args.rules && args.first && !args.tokens);
        assert!(args.input.is_none());
    }
}
