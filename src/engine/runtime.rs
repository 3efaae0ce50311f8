//! Interpreter for compiled methods and the builtins they call.
//!
//! Each script file becomes one [`UnitInstance`]: its `@variables` and open
//! file editors live there for the whole run, shared by every block of the
//! file.
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::builtins::{Builtin, EditorMethod};
use super::codetree::CompiledUnit;
use super::options::{self, FsOption, FsOptions, OptionTable};
use super::state::{EngineState, parse_release};
use super::syntax::{self, BinOp, Call, Callee, Expr, Instruction, StrPart, Target};
use super::translate;
use super::value::{Attributes, Value};
use crate::error::ScriptError;
use crate::monitor::MessageKind;
use crate::platform;
use crate::resources::ResourceChange;
use crate::resources::editor::CachedFileEditor;
use crate::resources::error::ResourceError;
use crate::resources::fileops::Ownership;

/// Runtime instance of one script file.
pub struct UnitInstance {
    name: String,
    vars: BTreeMap<String, Value>,
    editors: Vec<CachedFileEditor>,
    line: usize,
}

impl fmt::Debug for UnitInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitInstance")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field("editors", &self.editors.len())
            .field("line", &self.line)
            .finish()
    }
}

impl UnitInstance {
    /// Fresh instance with no variables.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: BTreeMap::new(),
            editors: Vec::new(),
            line: 0,
        }
    }

    /// Unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of `@name`.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Source line of the instruction that ran last.
    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    /// Run `unit`'s method, binding its parameters to `args` by position.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an instruction.
    pub fn invoke(&mut self, state: &mut EngineState, unit: &CompiledUnit, args: Vec<Value>) -> Result<(), ScriptError> {
        let mut args = args.into_iter();
        let locals = unit
            .block
            .params
            .iter()
            .map(|param| (param.clone(), args.next().unwrap_or_default()))
            .collect();
        tracing::trace!("running {}.{}", unit.unit_name, unit.method_name);
        let mut frame = Frame {
            state,
            unit: self,
            file: &unit.block.file,
            locals,
        };
        frame.run(&unit.body)
    }
}

struct Frame<'a> {
    state: &'a mut EngineState,
    unit: &'a mut UnitInstance,
    file: &'a Path,
    locals: BTreeMap<String, Value>,
}

fn text_arg(args: &[Value], index: usize, function: Builtin, what: &str) -> Result<String, ScriptError> {
    match args.get(index) {
        Some(value) if !value.is_nil() => Ok(value.to_string()),
        _ => Err(ScriptError::Type(format!("{function} needs a {what}"))),
    }
}

fn path_arg(args: &[Value], index: usize, function: Builtin) -> Result<PathBuf, ScriptError> {
    text_arg(args, index, function, "path").map(PathBuf::from)
}

fn attrs_arg(args: &[Value], index: usize, function: Builtin) -> Result<Attributes, ScriptError> {
    match args.get(index) {
        None | Some(Value::Nil) => Ok(Attributes::new()),
        Some(Value::Map(map)) => Ok(map.clone()),
        Some(other) => Err(ScriptError::Type(format!(
            "{function} expects attributes, got {}",
            other.type_name()
        ))),
    }
}

fn words(args: &[Value]) -> Vec<String> {
    args.iter().flat_map(Value::flatten_strings).collect()
}

fn changed(change: &ResourceChange) -> Value {
    Value::Bool(change.changed())
}

fn message_kind(level: &str) -> (MessageKind, &'static [&'static str]) {
    match level {
        "verbose" => (MessageKind::Verbose, &[]),
        "debug" => (MessageKind::Debug, &[]),
        "warning" | "warn" => (MessageKind::Verbose, &["warning"]),
        "error" | "exception" => (MessageKind::Exception, &[]),
        _ => (MessageKind::Info, &[]),
    }
}

impl Frame<'_> {
    fn run(&mut self, body: &[Instruction]) -> Result<(), ScriptError> {
        for instruction in body {
            self.unit.line = instruction.line();
            match instruction {
                Instruction::Assign { target, value, .. } => {
                    let value = self.eval(value)?;
                    match target {
                        Target::Ivar(name) => self.unit.vars.insert(name.clone(), value),
                        Target::Local(name) => self.locals.insert(name.clone(), value),
                        Target::Site(name) => self.state.site.insert(name.clone(), value),
                    };
                }
                Instruction::Call { call, .. } => {
                    self.call(call)?;
                }
                Instruction::If {
                    cond,
                    then,
                    otherwise,
                    ..
                } => {
                    let branch = if self.eval(cond)?.is_truthy() {
                        then
                    } else {
                        otherwise
                    };
                    self.run(branch)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        let value = match expr {
            Expr::Nil => Value::Nil,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(n) => Value::Int(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Interp(parts) => Value::Str(self.interpolate(parts)?),
            Expr::Shell(parts) => {
                let command = self.interpolate(parts)?;
                self.shell(&command)?
            }
            Expr::Ivar(name) => self.unit.vars.get(name).cloned().unwrap_or_default(),
            Expr::Global(name) | Expr::Site(name) => self.state.site.get(name).cloned().unwrap_or_default(),
            Expr::Word(word) => self
                .locals
                .get(word)
                .cloned()
                .unwrap_or_else(|| Value::Str(word.clone())),
            Expr::List(items) => Value::List(self.eval_all(items)?),
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = self.eval(key)?.to_string();
                    map.insert(key, self.eval(value)?);
                }
                Value::Map(map)
            }
            Expr::Not(inner) => Value::Bool(!self.eval(inner)?.is_truthy()),
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs)?,
            Expr::Call(call) => self.call(call)?,
        };
        Ok(value)
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn interpolate(&mut self, parts: &[StrPart]) -> Result<String, ScriptError> {
        let mut out = String::new();
        for part in parts {
            match part {
                StrPart::Lit(text) => out.push_str(text),
                StrPart::Expr(expr) => out.push_str(&self.eval(expr)?.to_string()),
            }
        }
        Ok(out)
    }

    fn binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, ScriptError> {
        let left = self.eval(lhs)?;
        match op {
            BinOp::And if !left.is_truthy() => return Ok(left),
            BinOp::Or if left.is_truthy() => return Ok(left),
            BinOp::And | BinOp::Or => return self.eval(rhs),
            _ => {}
        }
        let right = self.eval(rhs)?;
        match (op, left, right) {
            (BinOp::Eq, l, r) => Ok(Value::Bool(l == r)),
            (BinOp::Ne, l, r) => Ok(Value::Bool(l != r)),
            (BinOp::Add, Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| ScriptError::Type("integer overflow".to_string())),
            (BinOp::Add, Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (BinOp::Add, Value::Str(a), r) => Ok(Value::Str(a + &r.to_string())),
            (_, l, r) => Err(ScriptError::Type(format!(
                "cannot combine {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        }
    }

    fn shell(&self, command: &str) -> Result<Value, ScriptError> {
        let executor = Arc::clone(&self.state.executor);
        let outcome = self
            .state
            .monitor
            .attempt(format!("shell {command}"), &["shell"], || executor.shell(command))
            .map_err(|e| ResourceError::ExecutionFailed {
                program: command.to_string(),
                exit_code: -1,
                stderr: e.to_string(),
            })?;
        let Some(result) = outcome else {
            return Ok(Value::Str(String::new()));
        };
        if !result.success {
            self.state.monitor.inform(
                MessageKind::Verbose,
                format!(
                    "Shell command {command} exited with {}",
                    result.code.unwrap_or(-1)
                ),
                &["warning"],
            );
        }
        Ok(Value::Str(result.stdout))
    }

    fn call(&mut self, call: &Call) -> Result<Value, ScriptError> {
        match &call.callee {
            Callee::Builtin(builtin) => {
                let args = self.eval_all(&call.args)?;
                self.builtin(*builtin, &args)
            }
            Callee::Method { receiver, method } => {
                let target = self.eval(receiver)?;
                let args = self.eval_all(&call.args)?;
                self.editor_method(&target, *method, &args)
            }
        }
    }

    fn inform(&self, kind: MessageKind, text: String, tags: &[&str]) {
        self.state.monitor.inform(kind, text, tags);
    }

    fn builtin(&mut self, builtin: Builtin, args: &[Value]) -> Result<Value, ScriptError> {
        match builtin {
            Builtin::Files => self.files(args),
            Builtin::Copy => self.copy(args),
            Builtin::Directories => self.directories(args),
            Builtin::Tidy => self.tidy(args),
            Builtin::Link => self.link(args),
            Builtin::Delete => self.delete(args),
            Builtin::Assign => {
                let words = words(args);
                let Some((class, members)) = words.split_first() else {
                    return Err(ScriptError::Type("assign needs a class name".to_string()));
                };
                self.state.classes.add(class, members.iter().cloned());
                Ok(Value::Nil)
            }
            Builtin::Isa => {
                for class in words(args) {
                    self.state.classes.isa_add(&class);
                }
                Ok(Value::Nil)
            }
            Builtin::Package => self.package(args),
            Builtin::ExitScript => Err(ScriptError::ExitRequested {
                message: words(args).join(" "),
            }),
            Builtin::EngineVersion => self.engine_version(args),
            Builtin::Inform => {
                let level = args.first().map(ToString::to_string).unwrap_or_default();
                let text: Vec<String> = args.iter().skip(1).map(ToString::to_string).collect();
                let (kind, tags) = message_kind(&level);
                self.inform(kind, text.concat(), tags);
                Ok(Value::Nil)
            }
            Builtin::Puts => {
                for line in words(args) {
                    tracing::info!(target: "cfenjin::script", "{line}");
                }
                Ok(Value::Nil)
            }
            Builtin::Raise => Err(ScriptError::Raised(words(args).join(" "))),
            Builtin::IsaQuery => {
                let class = text_arg(args, 0, builtin, "class")?;
                Ok(Value::Bool(self.state.classes.isa(&class)))
            }
            Builtin::HasPackage => {
                let name = text_arg(args, 0, builtin, "package name")?;
                Ok(Value::Bool(self.state.packages.has_package(&name)))
            }
            Builtin::HasUser => {
                let name = text_arg(args, 0, builtin, "user name")?;
                Ok(Value::Bool(platform::user_exists(&name)))
            }
            Builtin::FileExists => {
                let path = path_arg(args, 0, builtin)?;
                Ok(Value::Bool(self.state.fs.exists(&path)))
            }
            Builtin::IsDirectory => {
                let path = path_arg(args, 0, builtin)?;
                Ok(Value::Bool(self.state.fs.is_dir(&path)))
            }
            Builtin::IsFile => {
                let path = path_arg(args, 0, builtin)?;
                Ok(Value::Bool(
                    self.state.fs.exists(&path) && !self.state.fs.is_dir(&path),
                ))
            }
            Builtin::IsSymlink => {
                let path = path_arg(args, 0, builtin)?;
                Ok(Value::Bool(self.state.fs.read_link(&path).is_some()))
            }
            Builtin::EditFile => {
                let path = path_arg(args, 0, builtin)?;
                let editor = CachedFileEditor::open(path, Arc::clone(&self.state.monitor))?;
                self.unit.editors.push(editor);
                Ok(Value::Editor(self.unit.editors.len() - 1))
            }
        }
    }

    /// Re-read a single string argument holding a whole attribute line, as
    /// in `files "/etc/motd mode=644"`.
    fn attribute_form(&mut self, function: Builtin, args: &[Value]) -> Result<Option<Value>, ScriptError> {
        let [Value::Str(line)] = args else {
            return Ok(None);
        };
        let line = line.trim();
        if !line.contains(char::is_whitespace) {
            return Ok(None);
        }
        let text = translate::attribute_line(function.name(), line);
        let expr = syntax::parse_expression(&text)
            .map_err(|message| ScriptError::syntax(self.file, self.unit.line, message))?;
        self.eval(&expr).map(Some)
    }

    fn files(&mut self, args: &[Value]) -> Result<Value, ScriptError> {
        if let Some(value) = self.attribute_form(Builtin::Files, args)? {
            return Ok(value);
        }
        let path = path_arg(args, 0, Builtin::Files)?;
        let fs = Arc::clone(&self.state.fs);
        let attrs = options::check_pattern(&attrs_arg(args, 1, Builtin::Files)?, fs.is_dir(&path));
        let mut options = options::map(OptionTable::Files, &attrs)?;
        let ownership = Ownership::take(&mut options);
        match fs.chown_mod(&path, &ownership, &options) {
            Ok(change) => Ok(changed(&change)),
            Err(e) if e.is_not_found() => {
                self.inform(
                    MessageKind::Verbose,
                    format!("Can not chmod on non-existing file {}", path.display()),
                    &[],
                );
                Ok(Value::Bool(false))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn copy(&mut self, args: &[Value]) -> Result<Value, ScriptError> {
        if let Some(value) = self.attribute_form(Builtin::Copy, args)? {
            return Ok(value);
        }
        let src = path_arg(args, 0, Builtin::Copy)?;
        let (dest, attrs) = match args.get(1) {
            Some(Value::Map(map)) => {
                let mut attrs = options::expand_synonyms(map);
                (attrs.remove("dest"), attrs)
            }
            Some(dest) => (Some(dest.clone()), attrs_arg(args, 2, Builtin::Copy)?),
            None => (None, Attributes::new()),
        };
        let dest = dest
            .filter(|d| !d.is_nil())
            .map(|d| PathBuf::from(d.to_string()))
            .ok_or_else(|| {
                ScriptError::unknown_parameter(format!("copy of {} has no dest", src.display()))
            })?;

        let fs = Arc::clone(&self.state.fs);
        if !fs.exists(&src) {
            self.inform(
                MessageKind::Info,
                format!("Failed to copy non-existing file {}", src.display()),
                &[],
            );
            if self.state.strict {
                return Err(ScriptError::Raised(format!("Failed to copy {}", src.display())));
            }
            return Ok(Value::Bool(false));
        }
        if let Some(mode) = fs.mode(&dest).filter(|mode| mode & 0o200 == 0) {
            let writable = Ownership {
                mode: Some(mode | 0o200),
                ..Ownership::default()
            };
            fs.chown_mod(&dest, &writable, &FsOptions::new())?;
        }
        let mut options = options::map(OptionTable::Copy, &attrs)?;
        let ownership = Ownership::take(&mut options);
        Ok(changed(&fs.copy(&src, &dest, &ownership, &options)?))
    }

    fn directories(&mut self, args: &[Value]) -> Result<Value, ScriptError> {
        if let Some(value) = self.attribute_form(Builtin::Directories, args)? {
            return Ok(value);
        }
        let path = path_arg(args, 0, Builtin::Directories)?;
        let attrs = attrs_arg(args, 1, Builtin::Directories)?;
        let mut options = options::map(OptionTable::Directories, &attrs)?;
        let ownership = Ownership::take(&mut options);
        Ok(changed(&self.state.fs.mkdir(&path, &ownership, &options)?))
    }

    fn tidy(&mut self, args: &[Value]) -> Result<Value, ScriptError> {
        if let Some(value) = self.attribute_form(Builtin::Tidy, args)? {
            return Ok(value);
        }
        let target = path_arg(args, 0, Builtin::Tidy)?;
        let fs = Arc::clone(&self.state.fs);
        let attrs = options::check_pattern(&attrs_arg(args, 1, Builtin::Tidy)?, fs.is_dir(&target));
        let options = options::map(OptionTable::Tidy, &attrs)?;
        match fs.delete(&target, &options) {
            Ok(change) => Ok(changed(&change)),
            Err(e) if e.is_not_found() => {
                self.inform(
                    MessageKind::Verbose,
                    format!("Nothing to tidy at {}", target.display()),
                    &[],
                );
                Ok(Value::Bool(false))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, args: &[Value]) -> Result<Value, ScriptError> {
        let target = path_arg(args, 0, Builtin::Delete)?;
        let options = FsOptions::new().with(FsOption::Force, true);
        match self.state.fs.delete(&target, &options) {
            Ok(change) => Ok(changed(&change)),
            Err(e) if e.is_not_found() => Ok(Value::Bool(false)),
            Err(e) => Err(e.into()),
        }
    }

    fn link(&self, args: &[Value]) -> Result<Value, ScriptError> {
        let target = path_arg(args, 0, Builtin::Link)?;
        let linkname = path_arg(args, 1, Builtin::Link)?;
        match self.replace_link(&target, &linkname) {
            Ok(change) => Ok(changed(&change)),
            Err(e) if self.state.strict => Err(e.into()),
            Err(e) => {
                tracing::debug!("link {} failed: {e}", linkname.display());
                self.inform(
                    MessageKind::Verbose,
                    format!(
                        "Problem linking {} -> {}",
                        linkname.display(),
                        target.display()
                    ),
                    &[],
                );
                Ok(Value::Bool(false))
            }
        }
    }

    fn replace_link(&self, target: &Path, linkname: &Path) -> Result<ResourceChange, ResourceError> {
        let fs = &self.state.fs;
        if fs.read_link(linkname).is_some_and(|current| current != target) {
            self.inform(
                MessageKind::Verbose,
                format!(
                    "Existing {} is not pointing to {}",
                    linkname.display(),
                    target.display()
                ),
                &[],
            );
            fs.delete(linkname, &FsOptions::new())?;
        }
        fs.link(target, linkname, false)
    }

    fn package(&self, args: &[Value]) -> Result<Value, ScriptError> {
        let names = words(args);
        if names.iter().any(|name| self.state.packages.has_package(name)) {
            return Ok(Value::Nil);
        }
        let packages = names.join(",");
        self.inform(
            MessageKind::Verbose,
            format!("Skipping - package {packages} not installed"),
            &[],
        );
        Err(ScriptError::PackageNotInstalled { packages })
    }

    fn engine_version(&self, args: &[Value]) -> Result<Value, ScriptError> {
        let required = text_arg(args, 0, Builtin::EngineVersion, "version")?;
        let dev = match args.get(1) {
            Some(Value::Int(n)) => *n,
            Some(Value::Str(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let running = &self.state.version;
        if running.older_than(&parse_release(&required), dev) {
            return Err(ScriptError::Version {
                required: format!("{required}-dev{dev}"),
                running: running.to_string(),
            });
        }
        Ok(Value::Nil)
    }

    fn editor_method(&mut self, target: &Value, method: EditorMethod, args: &[Value]) -> Result<Value, ScriptError> {
        let Value::Editor(id) = target else {
            return Err(ScriptError::Type(format!(
                "{method} called on {}",
                target.type_name()
            )));
        };
        let user = self.state.user.clone();
        let editor = self
            .unit
            .editors
            .get_mut(*id)
            .ok_or_else(|| ScriptError::Type(format!("no editor with handle {id}")))?;
        let text = |index: usize| args.get(index).map(ToString::to_string).unwrap_or_default();

        let value = match method {
            EditorMethod::AutoCreate => {
                editor.auto_create();
                Value::Nil
            }
            EditorMethod::Empty => {
                editor.empty();
                Value::Nil
            }
            EditorMethod::Warning => {
                editor.warning(&user, &text(0));
                Value::Nil
            }
            EditorMethod::PrependIfAbsent => {
                editor.prepend_if_absent(&text(0));
                Value::Nil
            }
            EditorMethod::AppendIfAbsent => {
                editor.append_if_absent(&text(0));
                Value::Nil
            }
            EditorMethod::NoSuchLine => Value::Bool(editor.no_such_line(&text(0))?),
            EditorMethod::ReplaceAll => {
                editor.replace_all(&text(0), &text(1))?;
                Value::Nil
            }
            EditorMethod::ReplaceAllAppend => {
                editor.replace_all_append(&text(0), &text(1))?;
                Value::Nil
            }
            EditorMethod::ReplaceSection => {
                let include = args.get(3).is_some_and(Value::is_truthy);
                Value::Bool(editor.replace_section(&text(0), &text(1), &text(2), include)?)
            }
            EditorMethod::HashCommentLinesContaining => {
                editor.hash_comment_lines_containing(&text(0))?;
                Value::Nil
            }
            EditorMethod::Write => changed(&editor.write()?),
            EditorMethod::Changed => Value::Bool(editor.changed()),
        };
        Ok(value)
    }
}
