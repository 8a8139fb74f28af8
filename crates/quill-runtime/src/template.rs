use crate::value::Value;

/// Literal text interleaved with interpolated values.
///
/// Always holds exactly one more fragment than values: `fragment0, value0,
/// fragment1, ... fragmentN`.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    fragments: Vec<String>,
    values: Vec<Value>,
}

impl Default for Template {
    fn default() -> Self {
        Template::new()
    }
}

impl Template {
    pub fn new() -> Template {
        Template {
            fragments: vec![String::new()],
            values: Vec::new(),
        }
    }
    pub fn push_text(&mut self, text: &str) -> &mut Template {
        // the invariant guarantees at least one fragment
        if let Some(last) = self.fragments.last_mut() {
            last.push_str(text);
        }
        self
    }
    pub fn push_value(&mut self, value: impl Into<Value>) -> &mut Template {
        self.values.push(value.into());
        self.fragments.push(String::new());
        self
    }
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Template {
            fragments: vec![value.to_owned()],
            values: Vec::new(),
        }
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Template {
            fragments: vec![value],
            values: Vec::new(),
        }
    }
}

/// Builds a [`Template`] from string literals and `{expr}` interpolations.
///
/// ```ignore
/// let t = template!("Sum = < . ~\"+\" Prod > => " {add} " | Prod");
/// ```
#[macro_export]
macro_rules! template {
    (@push $t:ident) => {};
    (@push $t:ident $text:literal $($rest:tt)*) => {
        $t.push_text($text);
        $crate::template!(@push $t $($rest)*);
    };
    (@push $t:ident { $value:expr } $($rest:tt)*) => {
        $t.push_value($crate::Value::from($value));
        $crate::template!(@push $t $($rest)*);
    };
    ($($rest:tt)*) => {{
        let mut template = $crate::Template::new();
        $crate::template!(@push template $($rest)*);
        template
    }};
}

#[cfg(test)]
mod tests {
    use crate::Value;

    #[test]
    fn macro_keeps_fragments_aligned() {
        let t = crate::template!("a " {1.5} {"x"} " b");
        assert_eq!(t.fragments(), &["a ", "", " b"]);
        assert_eq!(t.values(), &[Value::Number(1.5), Value::from("x")]);
    }

    #[test]
    fn adjacent_text_is_joined() {
        let t = crate::template!("a" "b");
        assert_eq!(t.fragments(), &["ab"]);
        assert!(t.values().is_empty());
    }
}
