//! Splits a script into action blocks.
//!
//! A header is a line of the form `name:`. Everything up to the first header
//! belongs to an implicit `control` block. Guards (`name::`) are not headers.
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::codetree::{CodeTree, INITIALIZE, ScriptBlock};
use crate::error::ResourceError;

/// Action of the lines before the first header.
pub const DEFAULT_ACTION: &str = "control";

/// Parameters of the synthetic `initialize` block.
pub const INITIALIZE_PARAMS: [&str; 4] = ["hostname", "sourcepath", "homepath", "user"];

#[allow(clippy::expect_used)]
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+[^:]):$").expect("header pattern is valid"));

/// The action named by a header line, if `line` is one.
#[must_use]
pub fn header(line: &str) -> Option<&str> {
    HEADER
        .captures(line.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end())
}

fn initializer(file: &Path) -> ScriptBlock {
    ScriptBlock {
        file: file.to_path_buf(),
        index: None,
        action: INITIALIZE.to_string(),
        params: INITIALIZE_PARAMS.iter().map(ToString::to_string).collect(),
        start_line: 0,
        lines: vec![
            "@hostname = hostname".to_string(),
            "@sourcepath = sourcepath".to_string(),
            "@home = homepath".to_string(),
            "@user = user".to_string(),
        ],
    }
}

/// Segment `text` from `file` into blocks, `initialize` first.
#[must_use]
pub fn segment(file: &Path, text: &str) -> Vec<ScriptBlock> {
    let mut blocks = vec![initializer(file)];
    let mut current = ScriptBlock {
        file: file.to_path_buf(),
        index: Some(0),
        action: DEFAULT_ACTION.to_string(),
        params: Vec::new(),
        start_line: 0,
        lines: Vec::new(),
    };

    for (i, line) in text.lines().enumerate() {
        let number = i + 1;
        let Some(action) = header(line) else {
            current.lines.push(line.to_string());
            continue;
        };
        let next = ScriptBlock {
            file: file.to_path_buf(),
            index: current.index.map(|n| n + 1),
            action: action.to_string(),
            params: Vec::new(),
            start_line: number,
            lines: Vec::new(),
        };
        let finished = std::mem::replace(&mut current, next);
        if finished.index != Some(0) || !finished.lines.is_empty() {
            blocks.push(finished);
        }
    }
    if current.index != Some(0) || !current.lines.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Read `file` and append its blocks to `tree`.
///
/// # Errors
///
/// Returns [`ResourceError::NotFound`] or an I/O error when the file cannot
/// be read.
pub fn parse(tree: &mut CodeTree, file: &Path) -> Result<(), ResourceError> {
    tracing::debug!("parsing {}", file.display());
    let text = std::fs::read_to_string(file).map_err(|e| ResourceError::io("read", file, e))?;
    parse_source(tree, file, &text);
    Ok(())
}

/// Append the blocks of in-memory `text`, labelled `label`, to `tree`.
pub fn parse_source(tree: &mut CodeTree, label: &Path, text: &str) {
    for block in segment(label, text) {
        tree.add(block);
    }
}
