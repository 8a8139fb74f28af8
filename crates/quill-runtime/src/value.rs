use std::{fmt::Display, sync::Arc};

use crate::parser::Parser;

pub type ArcStr = Arc<str>;

type ReduceFn = dyn Fn(Vec<Value>) -> Value + Send + Sync;

/// An opaque callable applied by `reduce` nodes to the values they pop.
#[derive(Clone)]
pub struct Reducer {
    name: ArcStr,
    fun: Arc<ReduceFn>,
}

impl Reducer {
    pub fn new(fun: impl Fn(Vec<Value>) -> Value + Send + Sync + 'static) -> Reducer {
        Reducer::named("function", fun)
    }
    pub fn named(
        name: &str,
        fun: impl Fn(Vec<Value>) -> Value + Send + Sync + 'static,
    ) -> Reducer {
        Reducer {
            name: name.into(),
            fun: Arc::new(fun),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn call(&self, args: Vec<Value>) -> Value {
        (self.fun)(args)
    }
    pub fn ptr_eq(&self, other: &Reducer) -> bool {
        Arc::ptr_eq(&self.fun, &other.fun)
    }
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reducer({})", self.name)
    }
}

impl PartialEq for Reducer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(ArcStr),
    List(Vec<Value>),
    Func(Reducer),
    Parser(Parser),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Func(_) => "function",
            Value::Parser(_) => "parser",
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
    pub fn as_func(&self) -> Option<&Reducer> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }
    pub fn as_parser(&self) -> Option<&Parser> {
        match self {
            Value::Parser(p) => Some(p),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            (Value::Parser(a), Value::Parser(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Formats numbers the way they were most likely written, `3` rather than `3.0`.
struct NumberDisplay(f64);

impl Display for NumberDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.0;
        if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
            write!(f, "{}", n as i64)
        } else {
            write!(f, "{n}")
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", NumberDisplay(*n)),
            Value::Str(s) => f.write_str(s),
            Value::List(list) => {
                for (i, value) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            Value::Func(fun) => write!(f, "<function {}>", fun.name()),
            Value::Parser(_) => f.write_str("<parser>"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Reducer> for Value {
    fn from(value: Reducer) -> Self {
        Value::Func(value)
    }
}

impl From<Parser> for Value {
    fn from(value: Parser) -> Self {
        Value::Parser(value)
    }
}

impl From<&Parser> for Value {
    fn from(value: &Parser) -> Self {
        Value::Parser(value.clone())
    }
}
