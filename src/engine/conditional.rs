//! Class guards such as `debian.webserver|mailer::`.
//!
//! A guard line opens a scope that lasts until the next guard or the end of
//! the block. `.` means and, `|` means or, `!` means not, and parentheses
//! group. Operators apply left to right as written.
use super::builtins::Builtin;
use super::classes::ClassSet;
use super::syntax::{BinOp, Callee, Expr, parse_expression};

const OPERATOR_CHARS: &[char] = &['.', '|', '(', ')', '!', ' '];

/// Whether `line` is a guard: it ends in `::` right after a class name or a
/// closing parenthesis.
#[must_use]
pub fn is_conditional(line: &str) -> bool {
    line.trim()
        .strip_suffix("::")
        .and_then(|rest| rest.chars().last())
        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '|' | '(' | ')'))
}

/// The guard expression of `line` without the trailing `::`.
fn guard_text(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let end = trimmed.find("::")?;
    let before = trimmed.get(..end)?;
    before.split_whitespace().last()
}

fn operators(run: &str) -> String {
    run.chars()
        .filter_map(|c| match c {
            '.' => Some(" and"),
            '|' => Some(" or"),
            '!' => Some(" not"),
            '(' => Some(" ("),
            ')' => Some(" )"),
            _ => None,
        })
        .collect()
}

/// Translate a guard line into an `if` over `isa?` calls.
///
/// ```
/// use cfenjin::engine::conditional::translate;
/// assert_eq!(
///     translate("(a|b).c::"),
///     "if ( isa?('a') or isa?('b') ) and isa?('c')"
/// );
/// ```
///
/// Lines that are not guards are returned unchanged.
#[must_use]
pub fn translate(line: &str) -> String {
    if !is_conditional(line) {
        return line.to_string();
    }
    let Some(guard) = guard_text(line) else {
        return line.to_string();
    };

    let mut out = String::from("if");
    let mut rest = guard;
    while !rest.is_empty() {
        let is_op = rest.starts_with(OPERATOR_CHARS);
        let split = rest
            .find(|c: char| OPERATOR_CHARS.contains(&c) != is_op)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(split);
        if is_op {
            out.push_str(&operators(run));
        } else {
            out.push_str(" isa?('");
            out.push_str(run);
            out.push_str("')");
        }
        rest = tail;
    }
    out
}

/// Translate and evaluate a guard directly against `classes`.
///
/// # Errors
///
/// Returns a diagnostic when the guard does not form a valid expression,
/// such as unbalanced parentheses or two classes without an operator.
pub fn evaluate(line: &str, classes: &ClassSet) -> Result<bool, String> {
    let translated = translate(line);
    let Some(condition) = translated.strip_prefix("if") else {
        return Err(format!("not a guard: {line}"));
    };
    let expr = parse_expression(condition)?;
    eval_guard(&expr, classes)
}

fn eval_guard(expr: &Expr, classes: &ClassSet) -> Result<bool, String> {
    match expr {
        Expr::Bool(b) => Ok(*b),
        Expr::Not(inner) => Ok(!eval_guard(inner, classes)?),
        Expr::Binary {
            op: BinOp::And,
            lhs,
            rhs,
        } => Ok(eval_guard(lhs, classes)? && eval_guard(rhs, classes)?),
        Expr::Binary {
            op: BinOp::Or,
            lhs,
            rhs,
        } => Ok(eval_guard(lhs, classes)? || eval_guard(rhs, classes)?),
        Expr::Call(call) if call.callee == Callee::Builtin(Builtin::IsaQuery) => {
            match call.args.as_slice() {
                [Expr::Str(class)] => Ok(classes.isa(class)),
                _ => Err("isa? takes one class name".to_string()),
            }
        }
        other => Err(format!("unsupported guard expression {other:?}")),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn recognises_guards() {
        assert!(is_conditional("debianlinux::"));
        assert!(is_conditional("  a.b|c::  "));
        assert!(is_conditional("(a|b)::"));
        assert!(!is_conditional("files:"));
        assert!(!is_conditional("/etc/passwd m=644"));
        assert!(!is_conditional("a!::"));
    }

    #[test]
    fn translates_simple_and() {
        assert_eq!(
            translate("hostname.any::"),
            "if isa?('hostname') and isa?('any')"
        );
    }

    #[test]
    fn translates_not_and_or() {
        assert_eq!(
            translate("linux.!debian::"),
            "if isa?('linux') and not isa?('debian')"
        );
        assert_eq!(translate("!a|b::"), "if not isa?('a') or isa?('b')");
    }

    #[test]
    fn translates_groups() {
        assert_eq!(
            translate("(a|b).c::"),
            "if ( isa?('a') or isa?('b') ) and isa?('c')"
        );
        assert_eq!(
            translate("a.(b|c)::"),
            "if isa?('a') and ( isa?('b') or isa?('c') )"
        );
    }

    #[test]
    fn non_guards_pass_through() {
        assert_eq!(translate("files:"), "files:");
        assert_eq!(translate("puts 'x'"), "puts 'x'");
    }

    #[test]
    fn evaluates_against_classes() {
        let mut classes = ClassSet::empty("h");
        classes.add("linux", ["h"]);
        classes.add("debian", ["other"]);
        assert!(evaluate("linux.!debian::", &classes).unwrap());
        assert!(!evaluate("linux.debian::", &classes).unwrap());
        assert!(evaluate("debian|linux::", &classes).unwrap());
        assert!(evaluate("h::", &classes).unwrap());
    }

    #[test]
    fn left_to_right_without_precedence() {
        let mut classes = ClassSet::empty("h");
        classes.add("a", ["h"]);
        // (a or b) and c, not a or (b and c)
        assert!(!evaluate("a|b.c::", &classes).unwrap());
    }

    #[test]
    fn unbalanced_guard_is_an_error() {
        let classes = ClassSet::empty("h");
        assert!(evaluate("(a|b::", &classes).is_err());
    }
}
