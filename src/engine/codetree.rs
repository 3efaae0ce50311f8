//! Script blocks in file order, and their compiled form.
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::syntax::{Instruction, SourceLine};

/// Method name of the synthetic per-file setup block.
pub const INITIALIZE: &str = "initialize";

/// One action block of a script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    /// File the block was read from (or the label of in-memory source).
    pub file: PathBuf,
    /// Position among the file's headers; `None` for `initialize`.
    pub index: Option<usize>,
    /// Action name, e.g. `files`.
    pub action: String,
    /// Parameter names bound as locals when the block runs.
    pub params: Vec<String>,
    /// Line number of the block header (0 before the first header).
    pub start_line: usize,
    /// Raw lines following the header.
    pub lines: Vec<String>,
}

impl ScriptBlock {
    /// Whether this is the synthetic `initialize` block.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        self.index.is_none() && self.action == INITIALIZE
    }

    /// Lines paired with their line numbers in the source file.
    #[must_use]
    pub fn numbered_lines(&self) -> Vec<SourceLine> {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| SourceLine::new(self.start_line + i + 1, line.clone()))
            .collect()
    }

    /// Name of the runtime unit this block belongs to; one per file.
    #[must_use]
    pub fn unit_name(&self) -> String {
        unit_name(&self.file)
    }

    /// Name of the method this block compiles to.
    #[must_use]
    pub fn method_name(&self) -> String {
        match self.index {
            Some(index) => format!("{}{index}", self.action),
            None => self.action.clone(),
        }
    }

    /// Source listing used in diagnostics.
    #[must_use]
    pub fn dump(&self) -> String {
        let index = self.index.map(|i| i.to_string()).unwrap_or_default();
        let mut out = format!(
            "==== Snippet {}-{}-{index}({}) ====\n",
            self.file.display(),
            self.action,
            self.params.join(",")
        );
        for line in self.numbered_lines() {
            let _ = writeln!(out, "{:>3}: {}", line.number, line.text);
        }
        out
    }
}

/// Deterministic unit name for a script path.
///
/// The capitalised file stem keeps names readable; the digest of the
/// normalised path keeps two `site.cf` files in different directories
/// apart.
#[must_use]
pub fn unit_name(path: &Path) -> String {
    let normalized = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let digest = Sha256::digest(normalized.to_string_lossy().as_bytes());
    let hex: String = digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let mut chars = sanitized.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => "Script".to_string(),
    };
    format!("{capitalized}_{hex}")
}

/// Ordered, append-only collection of script blocks.
#[derive(Debug, Default, Clone)]
pub struct CodeTree {
    blocks: Vec<ScriptBlock>,
}

impl CodeTree {
    /// Empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block.
    pub fn add(&mut self, block: ScriptBlock) {
        tracing::trace!(
            "adding {} action {}",
            block.file.display(),
            block.action
        );
        self.blocks.push(block);
    }

    /// Blocks in the order they were added.
    pub fn iter(&self) -> std::slice::Iter<'_, ScriptBlock> {
        self.blocks.iter()
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Source listing of every block.
    #[must_use]
    pub fn dump(&self) -> String {
        self.blocks.iter().map(ScriptBlock::dump).collect()
    }
}

impl<'a> IntoIterator for &'a CodeTree {
    type Item = &'a ScriptBlock;
    type IntoIter = std::slice::Iter<'a, ScriptBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A block after translation and parsing, ready to run.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// The block this unit was compiled from.
    pub block: ScriptBlock,
    /// Runtime unit (one per file).
    pub unit_name: String,
    /// Method within the unit.
    pub method_name: String,
    /// Lines in the general scripting form, before parsing.
    pub translated: Vec<SourceLine>,
    /// Parsed instructions.
    pub body: Vec<Instruction>,
}

impl CompiledUnit {
    /// Whether this is the unit's setup method.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        self.block.is_initializer()
    }

    /// The translated method wrapped in its unit, as printed by
    /// `dump --compiled`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("unit {}\n", self.unit_name);
        let _ = writeln!(
            out,
            "  def {}({})",
            self.method_name,
            self.block.params.join(", ")
        );
        for line in &self.translated {
            let _ = writeln!(out, "    {}", line.text);
        }
        out.push_str("  end\nend\n");
        out
    }
}
