//! Rewrites DSL lines into the general scripting form.
//!
//! Each action has its own line grammar. Guard lines are turned into `if`
//! scopes first, then every line goes through its action's rewrite and a
//! final site-variable substitution.
use std::fmt;
use std::sync::Arc;

use super::codetree::ScriptBlock;
use super::conditional;
use super::options::synonym;
use super::syntax::SourceLine;
use crate::error::ScriptError;
use crate::monitor::{FlowMonitor, MessageKind};

/// The line grammar a block is written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// `A -> B` symlinks.
    Links,
    /// `src dest=… m=…`.
    Copy,
    /// `target rec=… age=…`.
    Tidy,
    /// `path m=…`.
    Directories,
    /// `path m=… o=… g=…`.
    Files,
    /// Class assignments, site variables and free-form statements.
    Control,
    /// Class assignments only.
    Groups,
    /// Free-form editor statements.
    Editfiles,
    /// Backtick commands.
    Shellcommands,
    /// The synthetic setup block; never rewritten.
    Initialize,
    /// Anything else; lines are commented out.
    Unknown(String),
}

impl ActionKind {
    /// Classify an action name.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "links" => Self::Links,
            "copy" => Self::Copy,
            "tidy" => Self::Tidy,
            "directories" => Self::Directories,
            "files" => Self::Files,
            "control" => Self::Control,
            "groups" | "classes" => Self::Groups,
            "editfiles" => Self::Editfiles,
            "shellcommands" => Self::Shellcommands,
            "initialize" => Self::Initialize,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The builtin an attribute-line action calls.
    const fn attribute_function(&self) -> Option<&'static str> {
        match self {
            Self::Copy => Some("copy"),
            Self::Tidy => Some("tidy"),
            Self::Directories => Some("directories"),
            Self::Files => Some("files"),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Links => "links",
            Self::Copy => "copy",
            Self::Tidy => "tidy",
            Self::Directories => "directories",
            Self::Files => "files",
            Self::Control => "control",
            Self::Groups => "groups",
            Self::Editfiles => "editfiles",
            Self::Shellcommands => "shellcommands",
            Self::Initialize => "initialize",
            Self::Unknown(name) => name,
        };
        f.write_str(name)
    }
}

/// Names declared with `$name = …`, in registration order.
#[derive(Debug, Clone, Default)]
pub struct SiteVariables {
    names: Vec<String>,
}

impl SiteVariables {
    /// Register `name`; later lines will have `$name` substituted.
    pub fn register(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    /// Whether `name` was registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Replace every registered `$name` in `line` with `site['name']`.
    ///
    /// Names are tried longest-sorting first and only replaced where the
    /// name ends, so `$hostname` never matches a registered `$host`.
    #[must_use]
    pub fn substitute(&self, line: &str) -> String {
        if is_remark(line) {
            return line.to_string();
        }
        let mut sorted: Vec<&String> = self.names.iter().collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.into_iter().fold(line.to_string(), |acc, name| {
            replace_variable(&acc, name, &format!("site['{name}']"))
        })
    }
}

fn replace_variable(line: &str, name: &str, replacement: &str) -> String {
    let needle = format!("${name}");
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find(&needle) {
        let (before, found) = rest.split_at(pos);
        let after = found.get(needle.len()..).unwrap_or_default();
        out.push_str(before);
        if after.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            out.push_str(&needle);
        } else {
            out.push_str(replacement);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

fn is_remark(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn is_block_keyword(line: &str) -> bool {
    let trimmed = line.trim();
    ["if ", "if\t", "unless ", "elsif ", "else"]
        .iter()
        .any(|k| trimmed.starts_with(k))
        || trimmed == "end"
        || trimmed.starts_with("end ")
        || trimmed.starts_with("end#")
}

/// Double-quote a token that looks like a path or URL.
fn quote_path(token: &str) -> String {
    let token = token.trim();
    let is_path = token.starts_with(['/', '*', '.'])
        || ["http:", "https:", "ftp:"].iter().any(|s| token.contains(s));
    if is_path {
        format!("\"{token}\"")
    } else {
        token.to_string()
    }
}

fn is_class_assignment(trimmed: &str) -> bool {
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let [name, "=", "(", .., ")"] = words.as_slice() else {
        return false;
    };
    name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// `name = ( a b )` becomes `assign %w{ name a b }`.
fn class_assignment(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if !is_class_assignment(trimmed) {
        return None;
    }
    let words: Vec<&str> = trimmed
        .split_whitespace()
        .filter(|w| !matches!(*w, "(" | ")" | "="))
        .collect();
    Some(format!("assign %w{{ {} }}", words.join(" ")))
}

/// `$name = value` becomes `site['name'] = value`.
fn global_assignment(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix('$')?;
    let name_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let (name, tail) = rest.split_at(name_len);
    let value = tail.trim_start().strip_prefix('=')?;
    if name.is_empty() || value.starts_with(['=', '~']) {
        return None;
    }
    Some((
        name.to_string(),
        format!("site['{name}'] = {}", value.trim_start()),
    ))
}

fn attribute(parameter: &str, value: &str) -> String {
    let parameter = synonym(parameter);
    match parameter {
        "dest" => format!("'dest'=>{}", quote_path(value)),
        "pattern" => format!("'pattern'=>'{value}'"),
        _ if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") => {
            format!("'{parameter}'=>{}", value.to_ascii_lowercase())
        }
        _ => {
            let all_digits = value.chars().all(|c| c.is_ascii_digit());
            let wordlike = !value.is_empty()
                && value
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/'));
            let mut value = if !all_digits && wordlike {
                format!("'{value}'")
            } else {
                value.to_string()
            };
            if parameter == "mode" && value.starts_with(|c: char| matches!(c, '1'..='9')) {
                value.insert(0, '0');
            }
            format!("'{parameter}'=>{value}")
        }
    }
}

/// Rewrite an attribute line (`target k=v …`) into a call of `function`.
#[must_use]
pub fn attribute_line(function: &str, line: &str) -> String {
    if is_remark(line) || is_block_keyword(line) {
        return line.to_string();
    }
    let trimmed = line.trim();
    let already_call = trimmed
        .strip_prefix(function)
        .is_some_and(|rest| rest.starts_with([' ', '\t', '(']));
    if already_call {
        return line.to_string();
    }

    let mut tokens = trimmed.split_whitespace();
    let target = quote_path(tokens.next().unwrap_or_default());
    let attributes: Vec<String> = tokens
        .filter_map(|token| token.split_once('='))
        .map(|(parameter, value)| attribute(parameter, value))
        .collect();
    if attributes.is_empty() {
        format!("{function} {target}")
    } else {
        format!("{function} {target},{{{}}}", attributes.join(","))
    }
}

/// Rewrites lines of each block, tracking site variables across blocks.
#[derive(Debug)]
pub struct Translator {
    site: SiteVariables,
    monitor: Arc<FlowMonitor>,
}

impl Translator {
    /// Translator reporting through `monitor`.
    #[must_use]
    pub fn new(monitor: Arc<FlowMonitor>) -> Self {
        Self {
            site: SiteVariables::default(),
            monitor,
        }
    }

    /// Pre-register site variables, e.g. from the settings file.
    #[must_use]
    pub fn with_site_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.site.register(name);
        }
        self
    }

    /// Site variables registered so far.
    #[must_use]
    pub const fn site(&self) -> &SiteVariables {
        &self.site
    }

    /// Open an `if` scope at every guard line and close it before the next
    /// guard and at the end of the block.
    #[must_use]
    pub fn conditionals(lines: &[SourceLine]) -> Vec<SourceLine> {
        let mut out = Vec::with_capacity(lines.len());
        let mut open: Option<String> = None;
        for line in lines {
            if conditional::is_conditional(&line.text) {
                let guard = line.text.trim().to_string();
                if let Some(previous) = open.replace(guard) {
                    out.push(SourceLine::new(line.number, format!("  end # ---- {previous}")));
                }
                out.push(SourceLine::new(line.number, conditional::translate(&line.text)));
            } else {
                out.push(line.clone());
            }
        }
        if let Some(last) = open {
            let number = lines.last().map_or(0, |l| l.number);
            out.push(SourceLine::new(number, format!("end # ---- {last}")));
        }
        out
    }

    /// Translate one line written in `action`'s grammar.
    ///
    /// # Errors
    ///
    /// Returns the diagnostic for lines the action forbids: anything but a
    /// class assignment in `groups`, and quoted shell commands.
    pub fn translate(&mut self, action: &ActionKind, line: &str) -> Result<String, String> {
        let translated = match action {
            ActionKind::Initialize => return Ok(line.to_string()),
            ActionKind::Links => self.links(line),
            ActionKind::Copy | ActionKind::Tidy | ActionKind::Directories | ActionKind::Files => {
                let function = action.attribute_function().unwrap_or_default();
                attribute_line(function, line)
            }
            ActionKind::Control => self.control(line),
            ActionKind::Groups => Self::groups(line)?,
            ActionKind::Editfiles => line.to_string(),
            ActionKind::Shellcommands => Self::shellcommands(line)?,
            ActionKind::Unknown(name) => {
                if !line.trim().is_empty() {
                    self.monitor.inform(
                        MessageKind::Verbose,
                        format!("Warning: undefined user action {name} - {line}"),
                        &["warning"],
                    );
                }
                return Ok(format!("# Not recognised: {line}"));
            }
        };
        Ok(self.site.substitute(&translated))
    }

    /// Expand guards and translate every line of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Syntax`] naming the file and line of the first
    /// line that cannot be translated.
    pub fn translate_block(&mut self, block: &ScriptBlock) -> Result<Vec<SourceLine>, ScriptError> {
        let action = ActionKind::parse(&block.action);
        let lines = if action == ActionKind::Initialize {
            block.numbered_lines()
        } else {
            Self::conditionals(&block.numbered_lines())
        };
        lines
            .into_iter()
            .map(|line| {
                self.translate(&action, &line.text)
                    .map(|text| SourceLine::new(line.number, text))
                    .map_err(|message| ScriptError::syntax(&block.file, line.number, message))
            })
            .collect()
    }

    fn links(&self, line: &str) -> String {
        if is_remark(line) {
            return line.to_string();
        }
        match line.split_once("->") {
            Some((from, to)) => format!("link {},{}", quote_path(to), quote_path(from)),
            None => line.to_string(),
        }
    }

    fn control(&mut self, line: &str) -> String {
        if let Some(assignment) = class_assignment(line) {
            return assignment;
        }
        if is_remark(line) {
            return line.to_string();
        }
        match global_assignment(line) {
            Some((name, assignment)) => {
                tracing::debug!("registering site variable {name}");
                self.site.register(name);
                assignment
            }
            None => line.to_string(),
        }
    }

    fn groups(line: &str) -> Result<String, String> {
        if is_remark(line) || is_block_keyword(line) {
            return Ok(line.to_string());
        }
        class_assignment(line).ok_or_else(|| format!("Illegal groups command: \"{line}\""))
    }

    fn shellcommands(line: &str) -> Result<String, String> {
        let trimmed = line.trim();
        let quoted = trimmed.len() >= 2
            && trimmed.starts_with(['\'', '"'])
            && trimmed.ends_with(['\'', '"']);
        if quoted {
            return Err("Cannot execute quoted shellcommand (yet)".to_string());
        }
        if trimmed.starts_with('`') {
            let escaped = trimmed.replace('\\', "\\\\").replace('"', "\\\"").replace('#', "\\#");
            return Ok(format!("inform 'verbose', \"Shell: {escaped}\\n\" + {trimmed}"));
        }
        Ok(line.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::monitor::test_helpers::RecordingObserver;
    use std::path::PathBuf;

    fn translator() -> Translator {
        Translator::new(Arc::new(FlowMonitor::new()))
    }

    fn form(action: &str, line: &str) -> String {
        translator()
            .translate(&ActionKind::parse(action), line)
            .unwrap()
    }

    #[test]
    fn control_class_assignments() {
        assert_eq!(form("control", "sshd = (any )"), "sshd = (any )");
        assert_eq!(form("control", "sshd =( any )"), "sshd =( any )");
        assert_eq!(form("control", "sshd = ( any )"), "assign %w{ sshd any }");
        assert_eq!(
            form("control", "sshd = ( any test )"),
            "assign %w{ sshd any test }"
        );
    }

    #[test]
    fn links() {
        assert_eq!(form("links", "link testfn,testln"), "link testfn,testln");
        assert_eq!(form("links", "testln->testfn"), "link testfn,testln");
        assert_eq!(form("links", "@testln -> testfn"), "link testfn,@testln");
        assert_eq!(form("links", "testln -> $testfn"), "link $testfn,testln");
        assert_eq!(
            form("links", "\"testln\" -> \"testfn\""),
            "link \"testfn\",\"testln\""
        );
        assert_eq!(form("links", "./testln->/testfn"), "link \"/testfn\",\"./testln\"");
        assert_eq!(
            form("links", "/usr/archive -> /mnt/archive"),
            "link \"/mnt/archive\",\"/usr/archive\""
        );
    }

    #[test]
    fn copy_lines() {
        assert_eq!(
            form("copy", "copy dest,src,{\"m\"=>0444}"),
            "copy dest,src,{\"m\"=>0444}"
        );
        assert_eq!(form("copy", "src dest=dest"), "copy src,{'dest'=>dest}");
        assert_eq!(
            form("copy", " @masterfiles+'cftest.txt' dest=\"cftest.txt\" m=444"),
            "copy @masterfiles+'cftest.txt',{'dest'=>\"cftest.txt\",'mode'=>0444}"
        );
        assert_eq!(
            form("copy", "src dest=dest m=0444"),
            "copy src,{'dest'=>dest,'mode'=>0444}"
        );
        assert_eq!(
            form("copy", "src dest=dest m=664 owner=www-data g=www-data"),
            "copy src,{'dest'=>dest,'mode'=>0664,'owner'=>'www-data','group'=>'www-data'}"
        );
        assert_eq!(
            form("copy", "src dest=dest m=664 owner='www-data' g='www-data'"),
            "copy src,{'dest'=>dest,'mode'=>0664,'owner'=>'www-data','group'=>'www-data'}"
        );
    }

    #[test]
    fn tidy_directories_files() {
        assert_eq!(form("tidy", "testtidy"), "tidy testtidy");
        assert_eq!(
            form("tidy", "testtidy rec=inf"),
            "tidy testtidy,{'recurse'=>'inf'}"
        );
        assert_eq!(form("directories", "/mnt/export"), "directories \"/mnt/export\"");
        assert_eq!(
            form("directories", "/mnt/export m=666"),
            "directories \"/mnt/export\",{'mode'=>0666}"
        );
        assert_eq!(
            form("files", "/etc/resolv.conf m=644"),
            "files \"/etc/resolv.conf\",{'mode'=>0644}"
        );
    }

    #[test]
    fn booleans_and_patterns() {
        assert_eq!(
            form("tidy", "/tmp p=*.o rmdirs=True"),
            "tidy \"/tmp\",{'pattern'=>'*.o','rmdirs'=>true}"
        );
    }

    #[test]
    fn attribute_lines_keep_block_keywords() {
        assert_eq!(form("files", "if isa?('a')"), "if isa?('a')");
        assert_eq!(form("files", "end # ---- a::"), "end # ---- a::");
        assert_eq!(form("files", "# comment"), "# comment");
    }

    #[test]
    fn shellcommands() {
        assert_eq!(
            form("shellcommands", "`grep root /etc/passwd`"),
            "inform 'verbose', \"Shell: `grep root /etc/passwd`\\n\" + `grep root /etc/passwd`"
        );
        assert_eq!(
            form("shellcommands", "`grep \"root\" /etc/passwd`"),
            "inform 'verbose', \"Shell: `grep \\\"root\\\" /etc/passwd`\\n\" + `grep \"root\" /etc/passwd`"
        );
        let err = translator()
            .translate(&ActionKind::Shellcommands, "\"ls -l\"")
            .unwrap_err();
        assert_eq!(err, "Cannot execute quoted shellcommand (yet)");
    }

    #[test]
    fn groups_only_accept_assignments() {
        assert_eq!(form("groups", "web = ( a b )"), "assign %w{ web a b }");
        assert_eq!(form("groups", ""), "");
        let err = translator()
            .translate(&ActionKind::Groups, "puts 'x'")
            .unwrap_err();
        assert_eq!(err, "Illegal groups command: \"puts 'x'\"");
    }

    #[test]
    fn site_variables_register_and_substitute() {
        let mut t = translator();
        assert_eq!(
            t.translate(&ActionKind::Control, "$timeserver = 'ntp.example.org'")
                .unwrap(),
            "site['timeserver'] = 'ntp.example.org'"
        );
        assert_eq!(
            t.translate(&ActionKind::Editfiles, "@ef.AppendIfNoSuchLine \"server #{$timeserver}\"")
                .unwrap(),
            "@ef.AppendIfNoSuchLine \"server #{site['timeserver']}\""
        );
        assert_eq!(
            t.translate(&ActionKind::Editfiles, "puts $timeservers").unwrap(),
            "puts $timeservers"
        );
    }

    #[test]
    fn longer_names_are_substituted_first() {
        let mut site = SiteVariables::default();
        site.register("host");
        site.register("hostname");
        assert_eq!(
            site.substitute("puts $hostname + $host"),
            "puts site['hostname'] + site['host']"
        );
        assert_eq!(site.substitute("# $host"), "# $host");
    }

    #[test]
    fn use_before_registration_is_not_substituted() {
        let mut t = translator();
        assert_eq!(
            t.translate(&ActionKind::Editfiles, "puts $late").unwrap(),
            "puts $late"
        );
        t.translate(&ActionKind::Control, "$late = 1").unwrap();
        assert_eq!(
            t.translate(&ActionKind::Editfiles, "puts $late").unwrap(),
            "puts site['late']"
        );
    }

    #[test]
    fn unknown_actions_are_commented_with_warning() {
        let monitor = Arc::new(FlowMonitor::new());
        let recorder = Arc::new(RecordingObserver::default());
        monitor.register(recorder.clone());
        let mut t = Translator::new(monitor);
        let action = ActionKind::parse("myshellcommands");
        assert_eq!(
            t.translate(&action, "ls -l").unwrap(),
            "# Not recognised: ls -l"
        );
        assert_eq!(t.translate(&action, "").unwrap(), "# Not recognised: ");
        let messages = recorder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Verbose);
        assert!(messages[0].tags.iter().any(|t| t == "warning"));
    }

    #[test]
    fn conditionals_insert_closers() {
        let lines: Vec<SourceLine> = ["a::", "/x", "b.c::", "/y"]
            .iter()
            .enumerate()
            .map(|(i, l)| SourceLine::new(i + 1, *l))
            .collect();
        let out: Vec<String> = Translator::conditionals(&lines)
            .into_iter()
            .map(|l| l.text)
            .collect();
        assert_eq!(
            out,
            vec![
                "if isa?('a')",
                "/x",
                "  end # ---- a::",
                "if isa?('b') and isa?('c')",
                "/y",
                "end # ---- b.c::",
            ]
        );
    }

    #[test]
    fn translate_block_reports_file_and_line() {
        let block = ScriptBlock {
            file: PathBuf::from("site.cf"),
            index: Some(1),
            action: "groups".to_string(),
            params: Vec::new(),
            start_line: 10,
            lines: vec!["web = ( a )".to_string(), "bogus".to_string()],
        };
        let err = translator().translate_block(&block).unwrap_err();
        assert_eq!(
            err.to_string(),
            "site.cf line 12: Illegal groups command: \"bogus\""
        );
    }
}
