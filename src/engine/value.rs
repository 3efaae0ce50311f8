//! Runtime values of the scripting form.
use std::collections::BTreeMap;
use std::fmt;

/// DSL attributes after translation: attribute name to value.
pub type Attributes = BTreeMap<String, Value>;

/// A value produced by evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Absence of a value (an unset variable, a missing argument).
    #[default]
    Nil,
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal; a leading `0` in source means octal.
    Int(i64),
    /// Text.
    Str(String),
    /// Ordered list.
    List(Vec<Self>),
    /// Attribute map, keyed by string.
    Map(BTreeMap<String, Self>),
    /// Handle to a file editor owned by the running unit.
    Editor(usize),
}

impl Value {
    /// Only `nil` and `false` are falsy.
    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Whether this is [`Value::Nil`].
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Borrow the text of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a permission mode.
    ///
    /// Integers are taken as-is; strings are parsed as octal.
    #[must_use]
    pub fn as_mode(&self) -> Option<u32> {
        match self {
            Self::Int(n) => u32::try_from(*n).ok(),
            Self::Str(s) => u32::from_str_radix(s.trim(), 8).ok(),
            _ => None,
        }
    }

    /// Flatten nested lists into their textual leaves.
    #[must_use]
    pub fn flatten_strings(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().flat_map(Self::flatten_strings).collect(),
            Self::Nil => Vec::new(),
            other => vec![other.to_string()],
        }
    }

    /// Short type name used in diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Editor(_) => "editor",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(", "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}=>{v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Editor(id) => write!(f, "#<EditFile {id}>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}
