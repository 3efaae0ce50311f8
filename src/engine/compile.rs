//! Turns script blocks into runnable units.
use super::codetree::{CodeTree, CompiledUnit, ScriptBlock};
use super::syntax;
use super::translate::Translator;
use crate::error::ScriptError;

/// Log a failure in `block` together with its source listing.
pub fn report_failure(block: &ScriptBlock, line: usize, err: &ScriptError) {
    tracing::error!(
        "ERROR cfscript {} line {line} - {err}\n{}",
        block.file.display(),
        block.dump()
    );
}

fn error_line(block: &ScriptBlock, err: &ScriptError) -> usize {
    match err {
        ScriptError::Syntax { line, .. } => *line,
        _ => block.start_line,
    }
}

/// Translate and parse one block.
///
/// Site variables registered by earlier blocks are substituted, so blocks
/// must be compiled in file order.
///
/// # Errors
///
/// Returns [`ScriptError::Syntax`] for a line that cannot be translated or
/// parsed. The failure is logged with the block listing before returning.
pub fn compile(translator: &mut Translator, block: &ScriptBlock) -> Result<CompiledUnit, ScriptError> {
    let result = translator
        .translate_block(block)
        .and_then(|translated| {
            let body = syntax::parse_body(&block.file, &translated)?;
            Ok((translated, body))
        });
    match result {
        Ok((translated, body)) => {
            tracing::debug!(
                "compiled {}.{} ({} instructions)",
                block.unit_name(),
                block.method_name(),
                body.len()
            );
            Ok(CompiledUnit {
                block: block.clone(),
                unit_name: block.unit_name(),
                method_name: block.method_name(),
                translated,
                body,
            })
        }
        Err(err) => {
            report_failure(block, error_line(block, &err), &err);
            Err(err)
        }
    }
}

/// Compile every block of `tree` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first compile error.
pub fn compile_tree(translator: &mut Translator, tree: &CodeTree) -> Result<Vec<CompiledUnit>, ScriptError> {
    tree.iter().map(|block| compile(translator, block)).collect()
}

/// Listing of every compiled unit, as printed by `dump --compiled`.
#[must_use]
pub fn dump_compiled(units: &[CompiledUnit]) -> String {
    units.iter().map(CompiledUnit::render).collect()
}
