//! Line-oriented editor for configuration files.
//!
//! The file is read once, edited in memory and written back only when its
//! content changed. The change check ignores the "maintained by" banner so a
//! refreshed date stamp alone never causes a rewrite.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::{NoExpand, Regex};
use sha2::{Digest, Sha256};

use super::ResourceChange;
use super::error::ResourceError;
use crate::monitor::{FlowMonitor, MessageKind};

/// Prefix of the banner written by [`CachedFileEditor::warning`].
pub const BANNER: &str = "# WARNING: DO NOT CHANGE THIS FILE";

/// Suffix of the copy kept before a file is overwritten.
pub const BACKUP_SUFFIX: &str = ".cfsaved";

fn compile(pattern: &str) -> Result<Regex, ResourceError> {
    Regex::new(pattern).map_err(|e| ResourceError::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn anchored(pattern: &str) -> Result<Regex, ResourceError> {
    compile(&format!("^(?:{pattern})$"))
}

/// SHA-256 of `lines` joined by newlines, skipping banner lines.
#[must_use]
pub fn checksum(lines: &[String]) -> String {
    let kept: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .filter(|line| !line.contains(BANNER))
        .collect();
    Sha256::digest(kept.join("\n").as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// An in-memory copy of a text file with cfengine-style edit operations.
pub struct CachedFileEditor {
    path: PathBuf,
    lines: Vec<String>,
    original: String,
    create: bool,
    monitor: Arc<FlowMonitor>,
}

impl fmt::Debug for CachedFileEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFileEditor")
            .field("path", &self.path)
            .field("lines", &self.lines.len())
            .field("create", &self.create)
            .finish_non_exhaustive()
    }
}

impl CachedFileEditor {
    /// Load `path`. A missing file starts out empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>, monitor: Arc<FlowMonitor>) -> Result<Self, ResourceError> {
        let path = path.into();
        let lines: Vec<String> = match std::fs::read_to_string(&path) {
            Ok(text) => text.lines().map(String::from).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ResourceError::io("reading", &path, e)),
        };
        tracing::debug!("editing {} ({} lines)", path.display(), lines.len());
        let original = checksum(&lines);
        Ok(Self {
            path,
            lines,
            original,
            create: false,
            monitor,
        })
    }

    /// The file being edited.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content, one entry per line without terminators.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the content differs from what was loaded (banner excluded).
    #[must_use]
    pub fn changed(&self) -> bool {
        checksum(&self.lines) != self.original
    }

    /// Create the file on [`write`](Self::write) even if it does not exist.
    pub const fn auto_create(&mut self) {
        self.create = true;
    }

    /// Drop every line.
    pub fn empty(&mut self) {
        self.lines.clear();
    }

    /// Insert the "maintained by" banner, or refresh it when the first line
    /// already carries one.
    pub fn warning(&mut self, user: &str, message: &str) {
        let stamp = chrono::Local::now().format("%a %b %e %H:%M:%S %Y");
        let banner = format!("{BANNER} - it is maintained by {user} {message} {stamp}");
        match self.lines.first_mut() {
            Some(first) if first.starts_with(BANNER) => *first = banner,
            _ => self.lines.insert(0, banner),
        }
    }

    fn contains_line(&self, line: &str) -> bool {
        let wanted = line.trim();
        self.lines.iter().any(|l| l.trim() == wanted)
    }

    /// Put `line` first unless a line equal to it (ignoring surrounding
    /// whitespace) already exists.
    pub fn prepend_if_absent(&mut self, line: &str) {
        if !self.contains_line(line) {
            self.lines.insert(0, line.trim_end().to_string());
        }
    }

    /// Put `line` last unless a line equal to it (ignoring surrounding
    /// whitespace) already exists.
    pub fn append_if_absent(&mut self, line: &str) {
        if !self.contains_line(line) {
            self.lines.push(line.trim_end().to_string());
        }
    }

    /// True when no whole line matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Pattern`] for an invalid regular expression.
    pub fn no_such_line(&self, pattern: &str) -> Result<bool, ResourceError> {
        let re = anchored(pattern)?;
        Ok(!self.lines.iter().any(|l| re.is_match(l)))
    }

    /// Replace every match of `pattern` with the literal text `with`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Pattern`] for an invalid regular expression.
    pub fn replace_all(&mut self, pattern: &str, with: &str) -> Result<(), ResourceError> {
        let re = compile(pattern)?;
        for line in &mut self.lines {
            if re.is_match(line) {
                *line = re.replace_all(line, NoExpand(with)).into_owned();
            }
        }
        Ok(())
    }

    /// [`replace_all`](Self::replace_all), then append `with` if no line
    /// equals it.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Pattern`] for an invalid regular expression.
    pub fn replace_all_append(&mut self, pattern: &str, with: &str) -> Result<(), ResourceError> {
        self.replace_all(pattern, with)?;
        self.append_if_absent(with);
        Ok(())
    }

    /// Replace the lines between a line matching `first` and the next line
    /// ending in `last` with `with`. The marker lines are kept unless
    /// `include_markers` is set.
    ///
    /// Returns whether anything was replaced; a missing section is left
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Pattern`] for an invalid regular expression.
    pub fn replace_section(
        &mut self,
        first: &str,
        last: &str,
        with: &str,
        include_markers: bool,
    ) -> Result<bool, ResourceError> {
        let first_re = anchored(first)?;
        let last_re = compile(&format!("(?:{last})$"))?;

        let Some(open) = self.lines.iter().position(|l| first_re.is_match(l)) else {
            tracing::debug!("section {first} not found in {}", self.path.display());
            return Ok(false);
        };
        let Some(close) = self
            .lines
            .iter()
            .skip(open + 1)
            .position(|l| last_re.is_match(l))
            .map(|offset| open + 1 + offset)
        else {
            tracing::debug!("section {first} in {} is not closed", self.path.display());
            return Ok(false);
        };

        let (start, end) = if include_markers {
            (open, close + 1)
        } else {
            (open + 1, close)
        };
        let replacement: Vec<String> = with.lines().map(String::from).collect();
        if self.lines.get(start..end) == Some(replacement.as_slice()) {
            return Ok(false);
        }
        self.lines.splice(start..end, replacement);
        Ok(true)
    }

    /// Prefix `#` to every uncommented line matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Pattern`] for an invalid regular expression.
    pub fn hash_comment_lines_containing(&mut self, pattern: &str) -> Result<(), ResourceError> {
        let re = compile(pattern)?;
        for line in &mut self.lines {
            if !line.starts_with('#') && re.is_match(line) {
                line.insert(0, '#');
            }
        }
        Ok(())
    }

    /// Write the content back if it changed.
    ///
    /// A missing file is only created after [`auto_create`](Self::auto_create).
    /// The previous content is saved to `<path>.cfsaved`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup or the write fails.
    pub fn write(&mut self) -> Result<ResourceChange, ResourceError> {
        let exists = self.path.exists();
        if !exists && !self.create {
            self.monitor.inform(
                MessageKind::Verbose,
                format!("Not creating non-existent file {}", self.path.display()),
                &["editfile"],
            );
            return Ok(ResourceChange::Skipped {
                reason: "file does not exist".to_string(),
            });
        }
        if !self.changed() {
            tracing::debug!("{} unchanged", self.path.display());
            return Ok(ResourceChange::AlreadyCorrect);
        }

        let path = self.path.clone();
        let mut content = self.lines.join("\n");
        content.push('\n');
        let outcome = self
            .monitor
            .attempt(format!("edit {}", path.display()), &["editfile"], || {
                if exists {
                    let mut backup = path.clone().into_os_string();
                    backup.push(BACKUP_SUFFIX);
                    std::fs::copy(&path, &backup)
                        .map_err(|e| ResourceError::io("backing up", &path, e))?;
                }
                std::fs::write(&path, &content).map_err(|e| ResourceError::io("writing", &path, e))
            })?;
        if outcome.is_none() {
            return Ok(ResourceChange::from_attempt(None));
        }
        self.original = checksum(&self.lines);
        Ok(ResourceChange::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::monitor::test_helpers::RecordingObserver;

    fn editor_with(content: &str) -> (CachedFileEditor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, content).unwrap();
        let editor = CachedFileEditor::open(&path, Arc::new(FlowMonitor::new())).unwrap();
        (editor, dir)
    }

    #[test]
    fn append_is_idempotent() {
        let (mut editor, _dir) = editor_with("a\nb\n");
        editor.append_if_absent("c");
        editor.append_if_absent("c  ");
        editor.append_if_absent(" b");
        assert_eq!(editor.lines(), ["a", "b", "c"]);
        assert!(editor.changed());
    }

    #[test]
    fn prepend_puts_line_first() {
        let (mut editor, _dir) = editor_with("a\n");
        editor.prepend_if_absent("z");
        editor.prepend_if_absent("z");
        assert_eq!(editor.lines(), ["z", "a"]);
    }

    #[test]
    fn no_such_line_matches_whole_lines() {
        let (editor, _dir) = editor_with("nameserver 10.0.0.1\n");
        assert!(!editor.no_such_line("nameserver .*").unwrap());
        assert!(editor.no_such_line("nameserver").unwrap());
        assert!(editor.no_such_line("(").is_err());
    }

    #[test]
    fn replace_all_uses_literal_replacement() {
        let (mut editor, _dir) = editor_with("port 22\nport 2222\n");
        editor.replace_all("^port 22$", "port $1").unwrap();
        assert_eq!(editor.lines(), ["port $1", "port 2222"]);
    }

    #[test]
    fn replace_all_append_adds_missing_line() {
        let (mut editor, _dir) = editor_with("a\n");
        editor.replace_all_append("^x=.*", "x=1").unwrap();
        assert_eq!(editor.lines(), ["a", "x=1"]);
        editor.replace_all_append("^x=.*", "x=1").unwrap();
        assert_eq!(editor.lines(), ["a", "x=1"]);
    }

    #[test]
    fn replace_section_keeps_markers() {
        let (mut editor, _dir) = editor_with("head\n# BEGIN\nold\n# END\ntail\n");
        assert!(editor.replace_section("# BEGIN", "# END", "new1\nnew2", false).unwrap());
        assert_eq!(editor.lines(), ["head", "# BEGIN", "new1", "new2", "# END", "tail"]);
        assert!(!editor.replace_section("# BEGIN", "# END", "new1\nnew2", false).unwrap());
    }

    #[test]
    fn replace_section_including_markers() {
        let (mut editor, _dir) = editor_with("# BEGIN\nold\n# END\ntail\n");
        assert!(editor.replace_section("# BEGIN", "# END", "x", true).unwrap());
        assert_eq!(editor.lines(), ["x", "tail"]);
    }

    #[test]
    fn unclosed_section_is_untouched() {
        let (mut editor, _dir) = editor_with("# BEGIN\nold\n");
        assert!(!editor.replace_section("# BEGIN", "# END", "x", false).unwrap());
        assert!(!editor.changed());
    }

    #[test]
    fn hash_comment_skips_commented_lines() {
        let (mut editor, _dir) = editor_with("PermitRootLogin yes\n#PermitRootLogin no\n");
        editor.hash_comment_lines_containing("PermitRootLogin").unwrap();
        assert_eq!(editor.lines(), ["#PermitRootLogin yes", "#PermitRootLogin no"]);
    }

    #[test]
    fn banner_does_not_count_as_change() {
        let (mut editor, _dir) = editor_with("a\n");
        editor.warning("root", "");
        assert!(editor.lines()[0].starts_with(BANNER));
        assert!(!editor.changed());
        editor.warning("root", "again");
        assert_eq!(editor.lines().len(), 2);
    }

    #[test]
    fn write_saves_backup_and_content() {
        let (mut editor, dir) = editor_with("a\n");
        editor.append_if_absent("b");
        assert_eq!(editor.write().unwrap(), ResourceChange::Applied);
        let path = dir.path().join("hosts");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("hosts.cfsaved")).unwrap(),
            "a\n"
        );
        assert!(!editor.changed());
        assert_eq!(editor.write().unwrap(), ResourceChange::AlreadyCorrect);
    }

    #[test]
    fn missing_file_needs_auto_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.conf");
        let mut editor = CachedFileEditor::open(&path, Arc::new(FlowMonitor::new())).unwrap();
        editor.append_if_absent("x");
        assert!(matches!(editor.write().unwrap(), ResourceChange::Skipped { .. }));
        assert!(!path.exists());
        editor.auto_create();
        assert_eq!(editor.write().unwrap(), ResourceChange::Applied);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\n");
    }

    #[test]
    fn vetoed_write_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "a\n").unwrap();
        let monitor = Arc::new(FlowMonitor::new());
        let recorder = Arc::new(RecordingObserver::vetoing());
        monitor.register(recorder.clone());
        let mut editor = CachedFileEditor::open(&path, monitor).unwrap();
        editor.empty();
        assert!(matches!(editor.write().unwrap(), ResourceChange::Skipped { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\n");
        assert!(editor.changed());
        assert_eq!(
            recorder.texts(MessageKind::Intention),
            vec![format!("edit {}", path.display())]
        );
    }
}
