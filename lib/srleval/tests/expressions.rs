//! Expression and built-in function behavior, exercised through BIND and
//! FILTER so errors resolve exactly where the engine resolves them.

use oxsdatatypes::DateTime;
use srleval::RuleEngine;
use srlgebra::{BodyElement, Expression, Function, Rule, RuleSet, TriplePattern};
use srlrdf::{vocab::xsd, Graph, Literal, NamedNode, Term, Triple, Variable};

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn call(function: Function, args: Vec<Expression>) -> Expression {
    Expression::FunctionCall(function, args)
}

/// Binds `expression` on a single-solution body and returns the object of the
/// derived `ex:result` triple, or `None` if the BIND erred and the head was
/// skipped.
fn eval_bind(expression: Expression) -> Option<Term> {
    eval_bind_with_engine(expression, |engine| engine)
}

fn eval_bind_with_engine(
    expression: Expression,
    configure: impl FnOnce(RuleEngine) -> RuleEngine,
) -> Option<Term> {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("s"), ex("seed"), ex("s")));
    let engine = configure(
        RuleEngine::new(&RuleSet::from(vec![Rule {
            head: vec![TriplePattern::new(ex("s"), ex("result"), var("r"))],
            body: vec![
                BodyElement::TriplePattern(TriplePattern::new(var("x"), ex("seed"), var("x"))),
                BodyElement::Bind {
                    expression,
                    variable: var("r"),
                },
            ],
        }]))
        .unwrap(),
    );
    engine.evaluate(&mut graph).unwrap();
    let result = graph
        .triples_for_predicate(&ex("result"))
        .next()
        .map(|t| t.object.clone());
    result
}

fn int(value: i64) -> Expression {
    Literal::from(value).into()
}

fn string(value: &str) -> Expression {
    Literal::from(value).into()
}

#[test]
fn arithmetic_promotes_along_the_numeric_lattice() {
    assert_eq!(
        eval_bind(Expression::Add(
            Box::new(int(1)),
            Box::new(Literal::new_typed_literal("0.5", xsd::DECIMAL).into()),
        )),
        Some(Literal::new_typed_literal("1.5", xsd::DECIMAL).into())
    );
    // Integer division produces a decimal
    assert_eq!(
        eval_bind(Expression::Divide(Box::new(int(1)), Box::new(int(2)))),
        Some(Literal::new_typed_literal("0.5", xsd::DECIMAL).into())
    );
    // Division by integer zero is an error, not a crash
    assert_eq!(
        eval_bind(Expression::Divide(Box::new(int(1)), Box::new(int(0)))),
        None
    );
}

#[test]
fn logical_operators_are_three_valued() {
    let type_error = || call(Function::StrLen, vec![int(1)]);
    let t = || Expression::Equal(Box::new(int(1)), Box::new(int(1)));
    let f = || Expression::Equal(Box::new(int(1)), Box::new(int(2)));

    // true || error = true, false && error = false
    assert_eq!(
        eval_bind(Expression::Or(Box::new(t()), Box::new(type_error()))),
        Some(Literal::from(true).into())
    );
    assert_eq!(
        eval_bind(Expression::And(Box::new(f()), Box::new(type_error()))),
        Some(Literal::from(false).into())
    );
    // false || error and true && error propagate the error
    assert_eq!(
        eval_bind(Expression::Or(Box::new(f()), Box::new(type_error()))),
        None
    );
    assert_eq!(
        eval_bind(Expression::And(Box::new(t()), Box::new(type_error()))),
        None
    );
}

#[test]
fn str_of_iri_round_trips() {
    assert_eq!(
        eval_bind(call(
            Function::Str,
            vec![call(Function::Iri, vec![string("http://example.com/x")])],
        )),
        Some(Literal::from("http://example.com/x").into())
    );
}

#[test]
fn datatype_of_strdt_round_trips() {
    assert_eq!(
        eval_bind(call(
            Function::Datatype,
            vec![call(
                Function::StrDt,
                vec![string("5"), Expression::NamedNode(xsd::INTEGER.into())],
            )],
        )),
        Some(Term::from(NamedNode::from(xsd::INTEGER)))
    );
    // Datatypes the engine does not compute with are kept verbatim
    assert_eq!(
        eval_bind(call(
            Function::Datatype,
            vec![call(
                Function::StrDt,
                vec![string("foo"), Expression::NamedNode(ex("custom"))],
            )],
        )),
        Some(Term::from(ex("custom")))
    );
}

#[test]
fn lang_of_strlang_round_trips_lowercased() {
    assert_eq!(
        eval_bind(call(
            Function::Lang,
            vec![call(Function::StrLang, vec![string("foo"), string("EN-US")])],
        )),
        Some(Literal::from("en-us").into())
    );
}

#[test]
fn string_builtins() {
    assert_eq!(
        eval_bind(call(Function::UCase, vec![string("foo")])),
        Some(Literal::from("FOO").into())
    );
    assert_eq!(
        eval_bind(call(Function::StrLen, vec![string("foobar")])),
        Some(Literal::from(6_i64).into())
    );
    // SUBSTR is 1-based and counts characters
    assert_eq!(
        eval_bind(call(Function::SubStr, vec![string("foobar"), int(4)])),
        Some(Literal::from("bar").into())
    );
    assert_eq!(
        eval_bind(call(
            Function::SubStr,
            vec![string("foobar"), int(1), int(3)],
        )),
        Some(Literal::from("foo").into())
    );
    assert_eq!(
        eval_bind(call(
            Function::Replace,
            vec![string("abcd"), string("b"), string("Z")],
        )),
        Some(Literal::from("aZcd").into())
    );
    assert_eq!(
        eval_bind(call(
            Function::StrStarts,
            vec![string("foobar"), string("foo")],
        )),
        Some(Literal::from(true).into())
    );
    assert_eq!(
        eval_bind(call(
            Function::StrAfter,
            vec![string("foo-bar"), string("-")],
        )),
        Some(Literal::from("bar").into())
    );
}

#[test]
fn concat_keeps_a_common_language_tag() {
    let en = |value: &str| {
        Expression::Literal(Literal::new_language_tagged_literal(value, "en").unwrap())
    };
    assert_eq!(
        eval_bind(call(Function::Concat, vec![en("foo"), en("bar")])),
        Some(Literal::new_language_tagged_literal("foobar", "en").unwrap().into())
    );
    // Mixed languages drop the tag
    assert_eq!(
        eval_bind(call(Function::Concat, vec![en("foo"), string("bar")])),
        Some(Literal::from("foobar").into())
    );
}

#[test]
fn hash_builtins_match_known_digests() {
    assert_eq!(
        eval_bind(call(Function::Md5, vec![string("abc")])),
        Some(Literal::from("900150983cd24fb0d6963f7d28e17f72").into())
    );
    assert_eq!(
        eval_bind(call(Function::Sha1, vec![string("abc")])),
        Some(Literal::from("a9993e364706816aba3e25717850c26c9cd0d89d").into())
    );
    assert_eq!(
        eval_bind(call(Function::Sha256, vec![string("abc")])),
        Some(
            Literal::from("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .into()
        )
    );
}

#[test]
fn now_is_the_injected_clock() {
    let now = "2024-05-02T10:30:00Z".parse::<DateTime>().unwrap();
    assert_eq!(
        eval_bind_with_engine(
            call(Function::Year, vec![call(Function::Now, vec![])]),
            |engine| engine.with_fixed_now(now),
        ),
        Some(Literal::from(2024_i64).into())
    );
}

#[test]
fn type_errors_drop_the_binding_not_the_solution() {
    // STRLEN(1) errors: the solution survives with ?u unbound
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("s"), ex("seed"), ex("s")));
    let engine = RuleEngine::new(&RuleSet::from(vec![Rule {
        head: vec![TriplePattern::new(ex("s"), ex("checked"), Literal::from(true))],
        body: vec![
            BodyElement::TriplePattern(TriplePattern::new(var("x"), ex("seed"), var("x"))),
            BodyElement::Bind {
                expression: call(Function::StrLen, vec![int(1)]),
                variable: var("u"),
            },
            BodyElement::Filter(Expression::Not(Box::new(Expression::Bound(var("u"))))),
        ],
    }]))
    .unwrap();
    engine.evaluate(&mut graph).unwrap();
    assert!(graph.contains(&Triple::new(ex("s"), ex("checked"), Literal::from(true))));
}

#[test]
fn filter_drops_solutions_on_error() {
    // EBV of an IRI is an error: every solution is dropped
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("s"), ex("seed"), ex("s")));
    let engine = RuleEngine::new(&RuleSet::from(vec![Rule {
        head: vec![TriplePattern::new(ex("s"), ex("marked"), Literal::from(true))],
        body: vec![
            BodyElement::TriplePattern(TriplePattern::new(var("x"), ex("seed"), var("x"))),
            BodyElement::Filter(Expression::Variable(var("x"))),
        ],
    }]))
    .unwrap();
    engine.evaluate(&mut graph).unwrap();
    assert!(graph.triples_for_predicate(&ex("marked")).next().is_none());
}

#[test]
fn comparisons_are_value_based() {
    // "10"^^xsd:integer > "9.5"^^xsd:decimal
    assert_eq!(
        eval_bind(Expression::Greater(
            Box::new(int(10)),
            Box::new(Literal::new_typed_literal("9.5", xsd::DECIMAL).into()),
        )),
        Some(Literal::from(true).into())
    );
    // Comparing a number to a string is a type error
    assert_eq!(
        eval_bind(Expression::Less(Box::new(int(1)), Box::new(string("2")))),
        None
    );
    // dateTime ordering
    assert_eq!(
        eval_bind(Expression::Less(
            Box::new(Literal::new_typed_literal("2024-01-01T00:00:00Z", xsd::DATE_TIME).into()),
            Box::new(Literal::new_typed_literal("2024-01-02T00:00:00Z", xsd::DATE_TIME).into()),
        )),
        Some(Literal::from(true).into())
    );
}
