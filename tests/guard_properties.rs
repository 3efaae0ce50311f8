#![allow(clippy::expect_used, clippy::unwrap_used, clippy::wildcard_imports, clippy::indexing_slicing)]

//! Property tests for class guards and attribute synonyms.

use cfenjin::engine::classes::ClassSet;
use cfenjin::engine::conditional::{evaluate, is_conditional, translate};
use cfenjin::engine::options::{OptionTable, map};
use cfenjin::engine::value::{Attributes, Value};
use proptest::prelude::*;

const CLASSES: [&str; 3] = ["alpha", "beta", "gamma"];

/// One guard term: optional negation and a class index.
type Term = (bool, usize);

fn term() -> impl Strategy<Value = Term> {
    (any::<bool>(), 0..CLASSES.len())
}

/// A guard `t0 op t1 op t2 …` with `.` and `|` operators.
fn guard() -> impl Strategy<Value = (Term, Vec<(bool, Term)>)> {
    (term(), prop::collection::vec((any::<bool>(), term()), 0..6))
}

fn render((first, rest): &(Term, Vec<(bool, Term)>)) -> String {
    let text = |(negated, class): &Term| {
        format!("{}{}", if *negated { "!" } else { "" }, CLASSES[*class])
    };
    let mut out = text(first);
    for (is_and, t) in rest {
        out.push(if *is_and { '.' } else { '|' });
        out.push_str(&text(t));
    }
    out.push_str("::");
    out
}

/// Operators applied strictly left to right, `!` binding to its term.
fn reference((first, rest): &(Term, Vec<(bool, Term)>), members: &[bool; 3]) -> bool {
    let value = |(negated, class): &Term| members[*class] != *negated;
    rest.iter().fold(value(first), |acc, (is_and, t)| {
        if *is_and { acc && value(t) } else { acc || value(t) }
    })
}

fn classes(members: &[bool; 3]) -> ClassSet {
    let mut set = ClassSet::empty("node");
    for (name, member) in CLASSES.iter().zip(members) {
        if *member {
            set.add(name, ["node"]);
        }
    }
    set
}

proptest! {
    #[test]
    fn guards_evaluate_left_to_right(g in guard(), members in any::<[bool; 3]>()) {
        let line = render(&g);
        prop_assert!(is_conditional(&line));
        prop_assert_eq!(evaluate(&line, &classes(&members)), Ok(reference(&g, &members)));
    }

    #[test]
    fn every_term_becomes_one_query(g in guard()) {
        let line = render(&g);
        let translated = translate(&format!("  {line}"));
        prop_assert!(translated.starts_with("if "));
        prop_assert_eq!(translated.matches("isa?(").count(), g.1.len() + 1);
    }

    #[test]
    fn synonyms_map_like_long_names(
        mode in 0u32..0o7777,
        owner in "[a-z]{2,8}",
        depth in 1u32..50,
        group in "[a-z]{2,8}",
    ) {
        let attrs = |pairs: [(&str, Value); 4]| -> Attributes {
            pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
        };
        let short = attrs([
            ("m", Value::Int(i64::from(mode))),
            ("o", Value::from(owner.as_str())),
            ("r", Value::from(depth.to_string())),
            ("g", Value::from(group.as_str())),
        ]);
        let long = attrs([
            ("mode", Value::Int(i64::from(mode))),
            ("owner", Value::from(owner.as_str())),
            ("recurse", Value::from(depth.to_string())),
            ("group", Value::from(group.as_str())),
        ]);
        let short = map(OptionTable::Files, &short).unwrap();
        let long = map(OptionTable::Files, &long).unwrap();
        prop_assert_eq!(short, long);
    }
}
