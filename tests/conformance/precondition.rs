use cybersim::precondition::{Expr, Precondition, Truth};
use std::collections::HashMap;

fn resolver(facts: &[(&str, bool)]) -> impl Fn(&str) -> Truth {
    let facts: HashMap<String, bool> = facts.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    move |symbol: &str| match facts.get(symbol) {
        Some(b) => (*b).into(),
        None => Truth::Unknown,
    }
}

fn eval(expr: &str, facts: &[(&str, bool)]) -> bool {
    Precondition::parse(expr)
        .expect("expression should parse")
        .evaluate(&resolver(facts))
}

#[test]
fn default_precondition_is_true() {
    let p = Precondition::default();
    assert_eq!(p.as_str(), "true");
    assert!(p.evaluate(&resolver(&[])));
}

#[test]
fn single_symbol() {
    assert!(eval("script_block", &[("script_block", true)]));
    assert!(!eval("script_block", &[("script_block", false)]));
}

#[test]
fn unknown_symbols_are_false() {
    assert!(!eval("never_declared", &[]));
    assert!(eval("~never_declared", &[]));
}

#[test]
fn conjunction_and_disjunction() {
    let facts = [("a", true), ("b", false)];
    assert!(!eval("a & b", &facts));
    assert!(eval("a | b", &facts));
    assert!(eval("a AND NOT b", &facts));
    assert!(eval("b or a", &facts));
}

#[test]
fn and_binds_tighter_than_or() {
    let facts = [("a", true), ("b", false), ("c", false)];
    // a | (b & c)
    assert!(eval("a | b & c", &facts));
    assert!(!eval("(a | b) & c", &facts));
}

#[test]
fn negation_forms_are_equivalent() {
    for expr in ["~x", "!x", "not x", "NOT x"] {
        assert!(eval(expr, &[("x", false)]), "{} should hold", expr);
        assert!(!eval(expr, &[("x", true)]), "{} should not hold", expr);
    }
}

#[test]
fn profile_dotted_symbols_are_plain_symbols() {
    let p = Precondition::parse("username.NoAuth & username_password_restrictions").unwrap();
    let symbols: Vec<&str> = p.symbols().into_iter().collect();
    assert_eq!(symbols, vec!["username.NoAuth", "username_password_restrictions"]);
    assert!(matches!(p.expr(), Expr::And(terms) if terms.len() == 2));
}

#[test]
fn source_text_is_kept_for_display() {
    let p = Precondition::parse("  ~username.NoAuth&ip.local ").unwrap();
    assert_eq!(p.to_string(), "~username.NoAuth&ip.local");
}

#[test]
fn malformed_expressions_report_offsets() {
    let cases = [
        ("a &", 3),
        ("(a | b", 6),
        ("a b", 2),
        ("a # b", 2),
        ("& a", 0),
    ];
    for (input, position) in cases {
        let err = Precondition::parse(input).expect_err(input);
        assert_eq!(err.position, position, "offset for {:?}: {}", input, err);
        assert!(err.to_string().contains("at offset"));
    }
}

#[test]
fn empty_expression_is_an_error() {
    assert!(Precondition::parse("").is_err());
    assert!(Precondition::parse("   ").is_err());
}

#[test]
fn constants_are_case_insensitive() {
    assert!(eval("TRUE", &[]));
    assert!(!eval("False", &[]));
    assert!(eval("true & ~false", &[]));
}
