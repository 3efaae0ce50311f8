//! Names callable from the scripting form.
//!
//! Resolution happens at compile time, so a misspelt function fails the
//! syntax check instead of surfacing halfway through a run.
use std::fmt;

/// A function or predicate provided by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `link(target, linkname)`.
    Link,
    /// `copy(src, attrs)` or `copy(src, dest, attrs)`.
    Copy,
    /// `files(path, attrs)`.
    Files,
    /// `directories(path, attrs)`.
    Directories,
    /// `tidy(target, attrs)`.
    Tidy,
    /// `delete(target)`.
    Delete,
    /// `assign(class, members...)`.
    Assign,
    /// `isa(class)`: put the host into a class.
    Isa,
    /// `package(names...)` / `needpackage(names...)`.
    Package,
    /// `exit_script(message)`.
    ExitScript,
    /// `cfenjin_version(version, dev)`.
    EngineVersion,
    /// `inform(level, message...)`.
    Inform,
    /// `puts(message...)`.
    Puts,
    /// `raise(message)`.
    Raise,
    /// `isa?(class)`.
    IsaQuery,
    /// `haspackage?(name)`.
    HasPackage,
    /// `hasuser?(name)`.
    HasUser,
    /// `File.exist?(path)`.
    FileExists,
    /// `File.directory?(path)`.
    IsDirectory,
    /// `File.file?(path)`.
    IsFile,
    /// `File.symlink?(path)`.
    IsSymlink,
    /// `EditFile.new(path)` / `editfile(path)`.
    EditFile,
}

impl Builtin {
    /// Resolve `name`, optionally qualified by a constant receiver such as
    /// `File` or `EditFile`.
    #[must_use]
    pub fn resolve(receiver: Option<&str>, name: &str) -> Option<Self> {
        let builtin = match (receiver, name) {
            (None | Some("FileOps"), "link") => Self::Link,
            (None | Some("FileOps"), "copy") => Self::Copy,
            (None | Some("FileOps"), "delete") => Self::Delete,
            (None, "files") => Self::Files,
            (None, "directories") => Self::Directories,
            (None, "tidy") => Self::Tidy,
            (None, "assign" | "cfgroup") => Self::Assign,
            (None, "isa") => Self::Isa,
            (None, "package" | "needpackage") => Self::Package,
            (None, "exit_script") => Self::ExitScript,
            (None, "cfenjin_version") => Self::EngineVersion,
            (None, "inform") => Self::Inform,
            (None, "puts" | "print") => Self::Puts,
            (None, "raise") => Self::Raise,
            (None, "isa?") => Self::IsaQuery,
            (None, "haspackage?") => Self::HasPackage,
            (None, "hasuser?") => Self::HasUser,
            (None | Some("File"), "exist?" | "exists?") => Self::FileExists,
            (Some("File"), "directory?") => Self::IsDirectory,
            (Some("File"), "file?") => Self::IsFile,
            (Some("File"), "symlink?") => Self::IsSymlink,
            (None, "editfile") | (Some("EditFile"), "new") => Self::EditFile,
            _ => return None,
        };
        Some(builtin)
    }

    /// Canonical spelling, used when dumping compiled units.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Copy => "copy",
            Self::Files => "files",
            Self::Directories => "directories",
            Self::Tidy => "tidy",
            Self::Delete => "delete",
            Self::Assign => "assign",
            Self::Isa => "isa",
            Self::Package => "package",
            Self::ExitScript => "exit_script",
            Self::EngineVersion => "cfenjin_version",
            Self::Inform => "inform",
            Self::Puts => "puts",
            Self::Raise => "raise",
            Self::IsaQuery => "isa?",
            Self::HasPackage => "haspackage?",
            Self::HasUser => "hasuser?",
            Self::FileExists => "File.exist?",
            Self::IsDirectory => "File.directory?",
            Self::IsFile => "File.file?",
            Self::IsSymlink => "File.symlink?",
            Self::EditFile => "EditFile.new",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A method callable on a file editor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMethod {
    /// Create the file on write even if it did not exist.
    AutoCreate,
    /// Drop every line.
    Empty,
    /// Insert or refresh the "maintained by" banner.
    Warning,
    /// Prepend a line unless an identical one exists.
    PrependIfAbsent,
    /// Append a line unless an identical one exists.
    AppendIfAbsent,
    /// True when no line matches the pattern.
    NoSuchLine,
    /// Regex substitution on every line.
    ReplaceAll,
    /// Substitute, or append the replacement when nothing matched.
    ReplaceAllAppend,
    /// Replace the lines between two marker lines.
    ReplaceSection,
    /// Comment out lines matching a pattern.
    HashCommentLinesContaining,
    /// Persist changes.
    Write,
    /// Whether the content differs from what was loaded.
    Changed,
}

impl EditorMethod {
    /// Resolve a method name; both the CamelCase and snake_case spellings
    /// are accepted.
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        let method = match name {
            "AutoCreate" | "auto_create" => Self::AutoCreate,
            "EmptyEntireFilePlease" | "empty" => Self::Empty,
            "Warning" | "warning" => Self::Warning,
            "PrependIfNoSuchLine" | "prepend_if_absent" => Self::PrependIfAbsent,
            "AppendIfNoSuchLine" | "append_if_absent" => Self::AppendIfAbsent,
            "NoSuchLine" | "no_such_line?" => Self::NoSuchLine,
            "ReplaceAll" | "replace_all" => Self::ReplaceAll,
            "ReplaceAllAppend" | "replace_all_append" => Self::ReplaceAllAppend,
            "ReplaceSection" | "replace_section" => Self::ReplaceSection,
            "HashCommentLinesContaining" | "hash_comment_lines_containing" => {
                Self::HashCommentLinesContaining
            }
            "write" => Self::Write,
            "changed?" => Self::Changed,
            _ => return None,
        };
        Some(method)
    }

    /// Canonical spelling.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AutoCreate => "AutoCreate",
            Self::Empty => "EmptyEntireFilePlease",
            Self::Warning => "Warning",
            Self::PrependIfAbsent => "PrependIfNoSuchLine",
            Self::AppendIfAbsent => "AppendIfNoSuchLine",
            Self::NoSuchLine => "NoSuchLine",
            Self::ReplaceAll => "ReplaceAll",
            Self::ReplaceAllAppend => "ReplaceAllAppend",
            Self::ReplaceSection => "ReplaceSection",
            Self::HashCommentLinesContaining => "HashCommentLinesContaining",
            Self::Write => "write",
            Self::Changed => "changed?",
        }
    }
}

impl fmt::Display for EditorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_same_builtin() {
        assert_eq!(Builtin::resolve(None, "cfgroup"), Some(Builtin::Assign));
        assert_eq!(Builtin::resolve(None, "needpackage"), Some(Builtin::Package));
        assert_eq!(
            Builtin::resolve(Some("FileOps"), "delete"),
            Some(Builtin::Delete)
        );
        assert_eq!(
            Builtin::resolve(Some("EditFile"), "new"),
            Some(Builtin::EditFile)
        );
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        assert_eq!(Builtin::resolve(None, "format_disk"), None);
        assert_eq!(Builtin::resolve(Some("File"), "link"), None);
        assert_eq!(EditorMethod::resolve("Truncate"), None);
    }

    #[test]
    fn editor_method_spellings() {
        assert_eq!(
            EditorMethod::resolve("append_if_absent"),
            EditorMethod::resolve("AppendIfNoSuchLine")
        );
        assert_eq!(
            EditorMethod::resolve("changed?"),
            Some(EditorMethod::Changed)
        );
    }
}
