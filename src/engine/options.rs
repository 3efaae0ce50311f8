//! Mapping of DSL attributes onto filesystem options.
//!
//! Each filesystem action has an ordered table of option specs. A spec either
//! passes an attribute through to a semantic option (with an optional
//! default), or computes options from the attribute value. Computed specs
//! always run, even when the attribute is absent, so `tidy` without `rmdirs`
//! still yields `filesonly`.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::value::{Attributes, Value};
use crate::error::ScriptError;

/// Seconds in one day, used by the `age` attribute.
pub const SECONDS_PER_DAY: i64 = 86_400;

const SYNONYMS: &[(&str, &str)] = &[
    ("a", "action"),
    ("act", "action"),
    ("b", "backup"),
    ("m", "mode"),
    ("d", "dest"),
    ("o", "owner"),
    ("g", "group"),
    ("r", "recurse"),
    ("rec", "recurse"),
    ("p", "pattern"),
    ("inf", "infinite"),
];

/// Resolve a short attribute name (or value) to its long form.
#[must_use]
pub fn synonym(name: &str) -> &str {
    SYNONYMS
        .iter()
        .find(|(short, _)| *short == name)
        .map_or(name, |(_, long)| long)
}

/// Copy `attrs` with synonyms expanded in keys and in string values.
#[must_use]
pub fn expand_synonyms(attrs: &Attributes) -> Attributes {
    attrs
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Str(s) => Value::Str(synonym(s).to_string()),
                other => other.clone(),
            };
            (synonym(key).to_string(), value)
        })
        .collect()
}

/// Semantic option understood by the filesystem collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FsOption {
    /// Permission bits.
    Mode,
    /// Owning user name.
    Owner,
    /// Owning group name.
    Group,
    /// Descend without limit.
    Recursive,
    /// Descend at most this many levels.
    Depth,
    /// Only touch regular files.
    FilesOnly,
    /// Only touch directories.
    DirectoriesOnly,
    /// Only touch entries modified before this unix timestamp.
    OlderThan,
    /// Remove directories too / overwrite read-only targets.
    Force,
    /// Only touch entries whose name matches this glob.
    Glob,
    /// Create missing parent directories.
    MakeParent,
    /// Save the previous destination before overwriting.
    Backup,
    /// Skip copies whose content is unchanged.
    OnlyOnChange,
    /// Descend through symlinked directories.
    FollowSymlinks,
}

impl fmt::Display for FsOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mode => "mode",
            Self::Owner => "owner",
            Self::Group => "group",
            Self::Recursive => "recursive",
            Self::Depth => "depth",
            Self::FilesOnly => "filesonly",
            Self::DirectoriesOnly => "directoriesonly",
            Self::OlderThan => "olderthan",
            Self::Force => "force",
            Self::Glob => "glob",
            Self::MakeParent => "makeparent",
            Self::Backup => "backup",
            Self::OnlyOnChange => "onlyonchange",
            Self::FollowSymlinks => "followsymlinks",
        };
        f.write_str(name)
    }
}

/// How far a filesystem operation descends below its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recursion {
    /// Only the target itself.
    None,
    /// Entries at most this many levels below the target.
    Depth(usize),
    /// The whole tree.
    Unbounded,
}

/// The semantic option set handed to [`FilesystemOps`](crate::resources::fileops::FilesystemOps).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsOptions(BTreeMap<FsOption, Value>);

impl FsOptions {
    /// Empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, option: FsOption, value: impl Into<Value>) -> Self {
        self.0.insert(option, value.into());
        self
    }

    /// Set an option.
    pub fn insert(&mut self, option: FsOption, value: Value) {
        self.0.insert(option, value);
    }

    /// Look up an option.
    #[must_use]
    pub fn get(&self, option: FsOption) -> Option<&Value> {
        self.0.get(&option)
    }

    /// Whether a boolean option is set and truthy.
    #[must_use]
    pub fn flag(&self, option: FsOption) -> bool {
        self.get(option).is_some_and(Value::is_truthy)
    }

    /// Mode bits, if set.
    #[must_use]
    pub fn mode(&self) -> Option<u32> {
        self.get(FsOption::Mode).and_then(Value::as_mode)
    }

    /// Name glob, if set.
    #[must_use]
    pub fn glob(&self) -> Option<&str> {
        self.get(FsOption::Glob).and_then(Value::as_str)
    }

    /// Age cut-off as a unix timestamp, if set.
    #[must_use]
    pub fn older_than(&self) -> Option<i64> {
        match self.get(FsOption::OlderThan) {
            Some(Value::Int(ts)) => Some(*ts),
            _ => None,
        }
    }

    /// Recursion requested by `recursive` / `depth`.
    #[must_use]
    pub fn recursion(&self) -> Recursion {
        if self.flag(FsOption::Recursive) {
            return Recursion::Unbounded;
        }
        match self.get(FsOption::Depth) {
            Some(Value::Int(n)) => usize::try_from(*n).map_or(Recursion::None, Recursion::Depth),
            _ => Recursion::None,
        }
    }

    /// Remove the named options and return their values in the same order.
    pub fn pop(&mut self, names: &[FsOption]) -> Vec<Option<Value>> {
        names.iter().map(|name| self.0.remove(name)).collect()
    }

    /// Iterate over the options in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&FsOption, &Value)> {
        self.0.iter()
    }

    /// Number of options set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&parts.join(" "))
    }
}

/// Actions that own an option table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionTable {
    /// `directories:` / `directories(...)`.
    Directories,
    /// `files:` / `files(...)`.
    Files,
    /// `copy:` / `copy(...)`.
    Copy,
    /// `tidy:` / `tidy(...)`.
    Tidy,
}

impl OptionTable {
    const fn specs(self) -> &'static [Spec] {
        match self {
            Self::Directories => DIRECTORIES,
            Self::Files => FILES,
            Self::Copy => COPY,
            Self::Tidy => TIDY,
        }
    }
}

impl fmt::Display for OptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Directories => "directories",
            Self::Files => "files",
            Self::Copy => "copy",
            Self::Tidy => "tidy",
        })
    }
}

impl FromStr for OptionTable {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directories" => Ok(Self::Directories),
            "files" => Ok(Self::Files),
            "copy" => Ok(Self::Copy),
            "tidy" => Ok(Self::Tidy),
            other => Err(ScriptError::unknown_parameter(format!(
                "No option table for action '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Fallback {
    Int(i64),
    Bool(bool),
}

impl Fallback {
    const fn value(self) -> Value {
        match self {
            Self::Int(n) => Value::Int(n),
            Self::Bool(b) => Value::Bool(b),
        }
    }
}

type Computed = Vec<(FsOption, Value)>;
type Compute = fn(&str, Option<&Value>) -> Result<Computed, ScriptError>;

#[derive(Clone, Copy)]
enum Spec {
    Pass {
        key: &'static str,
        target: FsOption,
        fallback: Option<Fallback>,
    },
    Computed {
        key: &'static str,
        compute: Compute,
    },
}

const fn pass(key: &'static str, target: FsOption) -> Spec {
    Spec::Pass {
        key,
        target,
        fallback: None,
    }
}

const fn pass_or(key: &'static str, target: FsOption, fallback: Fallback) -> Spec {
    Spec::Pass {
        key,
        target,
        fallback: Some(fallback),
    }
}

const fn computed(key: &'static str, compute: Compute) -> Spec {
    Spec::Computed { key, compute }
}

const DIRECTORIES: &[Spec] = &[
    pass_or("mode", FsOption::Mode, Fallback::Int(0o775)),
    pass_or("makeparent", FsOption::MakeParent, Fallback::Bool(true)),
    pass("mode", FsOption::Mode),
    pass("owner", FsOption::Owner),
    pass("group", FsOption::Group),
];

const FILES: &[Spec] = &[
    computed("recurse", recurse),
    pass("mode", FsOption::Mode),
    pass("owner", FsOption::Owner),
    pass("group", FsOption::Group),
    pass("pattern", FsOption::Glob),
    computed("action", fix_action),
];

const COPY: &[Spec] = &[
    pass_or("mode", FsOption::Mode, Fallback::Int(0o400)),
    pass_or("backup", FsOption::Backup, Fallback::Bool(true)),
    pass_or("onlyonchange", FsOption::OnlyOnChange, Fallback::Bool(true)),
    pass_or("force", FsOption::Force, Fallback::Bool(true)),
    pass("mode", FsOption::Mode),
    pass("owner", FsOption::Owner),
    pass("group", FsOption::Group),
];

const TIDY: &[Spec] = &[
    computed("recurse", recurse),
    computed("rmdirs", rmdirs),
    pass("pattern", FsOption::Glob),
    computed("age", age),
    pass_or("links", FsOption::FollowSymlinks, Fallback::Bool(false)),
];

fn unknown_value(key: &str, value: &Value) -> ScriptError {
    ScriptError::unknown_parameter(format!("Unknown value '{value}' for '{key}'"))
}

/// Integer prefix of `text`, zero when there is none.
fn leading_int(text: &str) -> i64 {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_nil())
}

fn recurse(key: &str, value: Option<&Value>) -> Result<Computed, ScriptError> {
    let Some(value) = present(value) else {
        return Ok(Vec::new());
    };
    let text = value.to_string().to_lowercase();
    match text.as_str() {
        "infinite" | "true" => Ok(vec![(FsOption::Recursive, Value::Bool(true))]),
        "false" => Ok(Vec::new()),
        t if t.chars().any(|c| c.is_ascii_digit()) => {
            Ok(vec![(FsOption::Depth, Value::Int(leading_int(t)))])
        }
        _ => Err(unknown_value(key, value)),
    }
}

fn fix_action(key: &str, value: Option<&Value>) -> Result<Computed, ScriptError> {
    let Some(value) = present(value) else {
        return Ok(Vec::new());
    };
    match value.to_string().as_str() {
        "fixall" => Ok(Vec::new()),
        "fixplain" => Ok(vec![(FsOption::FilesOnly, Value::Bool(true))]),
        "fixdirs" => Ok(vec![(FsOption::DirectoriesOnly, Value::Bool(true))]),
        _ => Err(unknown_value(key, value)),
    }
}

fn rmdirs(_key: &str, value: Option<&Value>) -> Result<Computed, ScriptError> {
    let text = present(value).map(ToString::to_string).unwrap_or_default();
    if text.to_lowercase().starts_with('t') {
        Ok(vec![(FsOption::Force, Value::Bool(true))])
    } else {
        Ok(vec![(FsOption::FilesOnly, Value::Bool(true))])
    }
}

fn age(key: &str, value: Option<&Value>) -> Result<Computed, ScriptError> {
    let Some(value) = present(value) else {
        return Ok(Vec::new());
    };
    let days = match value {
        Value::Int(n) => *n,
        other => leading_int(&other.to_string()),
    };
    if days < 1 {
        return Err(unknown_value(key, value));
    }
    let cutoff = chrono::Utc::now().timestamp() - days * SECONDS_PER_DAY;
    Ok(vec![(FsOption::OlderThan, Value::Int(cutoff))])
}

/// Map DSL attributes onto the option set for `table`.
///
/// # Errors
///
/// Returns [`ScriptError::UnknownParameter`] when a computed attribute has a
/// value it does not understand, or when attributes are left over after
/// every spec of the table has run.
pub fn map(table: OptionTable, attrs: &Attributes) -> Result<FsOptions, ScriptError> {
    let mut remaining = expand_synonyms(attrs);
    let mut options = FsOptions::new();

    for spec in table.specs() {
        match *spec {
            Spec::Computed { key, compute } => {
                let value = remaining.remove(key);
                for (option, v) in compute(key, value.as_ref())? {
                    options.insert(option, v);
                }
            }
            Spec::Pass {
                key,
                target,
                fallback,
            } => {
                let value = remaining.remove(key).filter(|v| !v.is_nil());
                if let Some(v) = value.or_else(|| fallback.map(Fallback::value)) {
                    options.insert(target, v);
                }
            }
        }
    }

    if !remaining.is_empty() {
        let keys: Vec<&str> = remaining.keys().map(String::as_str).collect();
        return Err(ScriptError::unknown_parameter(format!(
            "Unresolved options for action '{table}': {}",
            keys.join(", ")
        )));
    }
    Ok(options)
}

/// Force one level of recursion when a pattern targets a directory.
///
/// Returns the attributes with synonyms expanded and, if `target_is_dir`,
/// a `pattern` is present and no `recurse` is set, `recurse` set to `1`.
#[must_use]
pub fn check_pattern(attrs: &Attributes, target_is_dir: bool) -> Attributes {
    let mut attrs = expand_synonyms(attrs);
    if target_is_dir && attrs.contains_key("pattern") && !attrs.contains_key("recurse") {
        attrs.insert("recurse".to_string(), Value::from("1"));
    }
    attrs
}
