//! End-to-end inference scenarios over the in-memory graph.

use srleval::{RuleEngine, RuleSetError};
use srlgebra::{BodyElement, Expression, Function, Rule, RuleSet, TriplePattern};
use srlrdf::{Graph, Literal, NamedNode, Term, Triple, Variable};

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn engine(rules: Vec<Rule>) -> RuleEngine {
    RuleEngine::new(&RuleSet::from(rules)).unwrap()
}

#[test]
fn simple_inference() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("Alice"), ex("parent"), ex("Bob")));
    graph.insert(Triple::new(ex("Bob"), ex("parent"), ex("Charlie")));

    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(var("x"), ex("ancestor"), var("y"))],
        body: vec![BodyElement::TriplePattern(TriplePattern::new(
            var("x"),
            ex("parent"),
            var("y"),
        ))],
    }]);
    let report = engine.evaluate(&mut graph).unwrap();

    assert!(graph.contains(&Triple::new(ex("Alice"), ex("ancestor"), ex("Bob"))));
    assert!(graph.contains(&Triple::new(ex("Bob"), ex("ancestor"), ex("Charlie"))));
    assert_eq!(report.derived_triples, 2);
}

#[test]
fn transitive_closure() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("A"), ex("parent"), ex("B")));
    graph.insert(Triple::new(ex("B"), ex("parent"), ex("C")));
    graph.insert(Triple::new(ex("C"), ex("parent"), ex("D")));

    let engine = engine(vec![
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("anc"), var("y"))],
            body: vec![BodyElement::TriplePattern(TriplePattern::new(
                var("x"),
                ex("parent"),
                var("y"),
            ))],
        },
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("anc"), var("z"))],
            body: vec![
                BodyElement::TriplePattern(TriplePattern::new(var("x"), ex("anc"), var("y"))),
                BodyElement::TriplePattern(TriplePattern::new(var("y"), ex("anc"), var("z"))),
            ],
        },
    ]);
    let report = engine.evaluate(&mut graph).unwrap();

    assert_eq!(graph.triples_for_predicate(&ex("anc")).count(), 6);
    assert_eq!(report.derived_triples, 6);
    assert_eq!(report.strata.len(), 1);
    assert!(report.strata[0].iterations <= 3);
}

#[test]
fn filter_keeps_adults_only() {
    let mut graph = Graph::new();
    for (person, age) in [("P1", 25_i64), ("P2", 16), ("P3", 30), ("P4", 12)] {
        graph.insert(Triple::new(ex(person), ex("age"), Literal::from(age)));
    }

    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(
            var("p"),
            ex("isAdult"),
            Literal::from(true),
        )],
        body: vec![
            BodyElement::TriplePattern(TriplePattern::new(var("p"), ex("age"), var("a"))),
            BodyElement::Filter(Expression::GreaterOrEqual(
                Box::new(var("a").into()),
                Box::new(Literal::from(18_i64).into()),
            )),
        ],
    }]);
    engine.evaluate(&mut graph).unwrap();

    assert_eq!(graph.triples_for_predicate(&ex("isAdult")).count(), 2);
    assert!(graph.contains(&Triple::new(ex("P1"), ex("isAdult"), Literal::from(true))));
    assert!(graph.contains(&Triple::new(ex("P3"), ex("isAdult"), Literal::from(true))));
}

#[test]
fn bind_concat_builds_full_name() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("P1"), ex("first"), Literal::from("John")));
    graph.insert(Triple::new(ex("P1"), ex("last"), Literal::from("Doe")));

    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(var("p"), ex("fullName"), var("n"))],
        body: vec![
            BodyElement::TriplePattern(TriplePattern::new(var("p"), ex("first"), var("f"))),
            BodyElement::TriplePattern(TriplePattern::new(var("p"), ex("last"), var("l"))),
            BodyElement::Bind {
                expression: Expression::FunctionCall(
                    Function::Concat,
                    vec![
                        var("f").into(),
                        Literal::from(" ").into(),
                        var("l").into(),
                    ],
                ),
                variable: var("n"),
            },
        ],
    }]);
    engine.evaluate(&mut graph).unwrap();

    assert!(graph.contains(&Triple::new(
        ex("P1"),
        ex("fullName"),
        Literal::from("John Doe")
    )));
}

#[test]
fn stratified_negation_finds_childless() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("P1"), ex("type"), ex("Person")));
    graph.insert(Triple::new(ex("P2"), ex("type"), ex("Person")));
    graph.insert(Triple::new(ex("P1"), ex("hasChild"), ex("K")));

    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(
            var("p"),
            ex("childless"),
            Literal::from(true),
        )],
        body: vec![
            BodyElement::TriplePattern(TriplePattern::new(var("p"), ex("type"), ex("Person"))),
            BodyElement::Not(vec![BodyElement::TriplePattern(TriplePattern::new(
                var("p"),
                ex("hasChild"),
                var("c"),
            ))]),
        ],
    }]);
    engine.evaluate(&mut graph).unwrap();

    assert!(graph.contains(&Triple::new(
        ex("P2"),
        ex("childless"),
        Literal::from(true)
    )));
    assert_eq!(graph.triples_for_predicate(&ex("childless")).count(), 1);
}

#[test]
fn not_without_shared_variables_keeps_solutions() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("P1"), ex("type"), ex("Person")));
    graph.insert(Triple::new(ex("X"), ex("flag"), ex("Y")));

    // The sub-pattern binds no variable of the outer solution, so the
    // anti-join removes nothing even though the sub-pattern matches
    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(var("p"), ex("kept"), Literal::from(true))],
        body: vec![
            BodyElement::TriplePattern(TriplePattern::new(var("p"), ex("type"), ex("Person"))),
            BodyElement::Not(vec![BodyElement::TriplePattern(TriplePattern::new(
                var("a"),
                ex("flag"),
                var("b"),
            ))]),
        ],
    }]);
    engine.evaluate(&mut graph).unwrap();

    assert!(graph.contains(&Triple::new(ex("P1"), ex("kept"), Literal::from(true))));
}

#[test]
fn negation_builds_two_strata() {
    // The derived predicate feeds a negation, so it has to be final first
    let engine = engine(vec![
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("anc"), var("y"))],
            body: vec![BodyElement::TriplePattern(TriplePattern::new(
                var("x"),
                ex("parent"),
                var("y"),
            ))],
        },
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("leaf"), Literal::from(true))],
            body: vec![
                BodyElement::TriplePattern(TriplePattern::new(var("y"), ex("anc"), var("x"))),
                BodyElement::Not(vec![BodyElement::TriplePattern(TriplePattern::new(
                    var("x"),
                    ex("anc"),
                    var("z"),
                ))]),
            ],
        },
    ]);
    assert_eq!(engine.stratum_count(), 2);
}

#[test]
fn unsafe_negation_is_rejected_before_evaluation() {
    let result = RuleEngine::new(&RuleSet::from(vec![
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("a"), var("x"))],
            body: vec![
                BodyElement::TriplePattern(TriplePattern::new(var("x"), ex("seed"), var("x"))),
                BodyElement::Not(vec![BodyElement::TriplePattern(TriplePattern::new(
                    var("x"),
                    ex("b"),
                    var("x"),
                ))]),
            ],
        },
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("b"), var("x"))],
            body: vec![
                BodyElement::TriplePattern(TriplePattern::new(var("x"), ex("seed"), var("x"))),
                BodyElement::Not(vec![BodyElement::TriplePattern(TriplePattern::new(
                    var("x"),
                    ex("a"),
                    var("x"),
                ))]),
            ],
        },
    ]));
    assert!(matches!(result, Err(RuleSetError::UnsafeNegation)));
}

#[test]
fn empty_rule_set_returns_input_unchanged() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("s"), ex("p"), ex("o")));
    let before = graph.clone();

    let engine = RuleEngine::new(&RuleSet::default()).unwrap();
    let report = engine.evaluate(&mut graph).unwrap();

    assert_eq!(graph, before);
    assert_eq!(report.derived_triples, 0);
}

#[test]
fn evaluation_is_idempotent() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("A"), ex("parent"), ex("B")));
    graph.insert(Triple::new(ex("B"), ex("parent"), ex("C")));

    let engine = engine(vec![
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("anc"), var("y"))],
            body: vec![BodyElement::TriplePattern(TriplePattern::new(
                var("x"),
                ex("parent"),
                var("y"),
            ))],
        },
        Rule {
            head: vec![TriplePattern::new(var("x"), ex("anc"), var("z"))],
            body: vec![
                BodyElement::TriplePattern(TriplePattern::new(var("x"), ex("anc"), var("y"))),
                BodyElement::TriplePattern(TriplePattern::new(var("y"), ex("anc"), var("z"))),
            ],
        },
    ]);
    engine.evaluate(&mut graph).unwrap();
    let after_first = graph.clone();
    let report = engine.evaluate(&mut graph).unwrap();

    assert_eq!(graph, after_first);
    assert_eq!(report.derived_triples, 0);
}

#[test]
fn rule_order_within_a_stratum_does_not_matter() {
    let base = {
        let mut graph = Graph::new();
        graph.insert(Triple::new(ex("A"), ex("p"), ex("B")));
        graph.insert(Triple::new(ex("B"), ex("q"), ex("C")));
        graph
    };
    let rule_from_p = Rule {
        head: vec![TriplePattern::new(var("x"), ex("r"), var("y"))],
        body: vec![BodyElement::TriplePattern(TriplePattern::new(
            var("x"),
            ex("p"),
            var("y"),
        ))],
    };
    let rule_from_q = Rule {
        head: vec![TriplePattern::new(var("x"), ex("r"), var("y"))],
        body: vec![BodyElement::TriplePattern(TriplePattern::new(
            var("x"),
            ex("q"),
            var("y"),
        ))],
    };

    let mut forward = base.clone();
    engine(vec![rule_from_p.clone(), rule_from_q.clone()])
        .evaluate(&mut forward)
        .unwrap();
    let mut backward = base;
    engine(vec![rule_from_q, rule_from_p])
        .evaluate(&mut backward)
        .unwrap();
    assert_eq!(forward, backward);
}

#[test]
fn evaluate_into_new_keeps_the_input_untouched() {
    let mut input = Graph::new();
    input.insert(Triple::new(ex("Alice"), ex("parent"), ex("Bob")));

    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(var("x"), ex("ancestor"), var("y"))],
        body: vec![BodyElement::TriplePattern(TriplePattern::new(
            var("x"),
            ex("parent"),
            var("y"),
        ))],
    }]);
    let (output, result) = engine.evaluate_into_new(&input);
    result.unwrap();

    assert_eq!(input.len(), 1);
    assert_eq!(output.len(), 2);
    assert!(output.contains(&Triple::new(ex("Alice"), ex("ancestor"), ex("Bob"))));
}

#[test]
fn head_blank_nodes_are_stable_across_iterations() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("A"), ex("knows"), ex("B")));
    graph.insert(Triple::new(ex("B"), ex("knows"), ex("C")));

    // Both templates must reuse the same fresh node for a given solution
    let engine = engine(vec![Rule {
        head: vec![
            TriplePattern::new(var("x"), ex("link"), srlrdf::BlankNode::new_unchecked("n")),
            TriplePattern::new(
                srlrdf::BlankNode::new_unchecked("n"),
                ex("target"),
                var("y"),
            ),
        ],
        body: vec![BodyElement::TriplePattern(TriplePattern::new(
            var("x"),
            ex("knows"),
            var("y"),
        ))],
    }]);
    engine.evaluate(&mut graph).unwrap();
    let after_first = graph.clone();

    // Two solutions, two fresh nodes, two triples each
    assert_eq!(graph.triples_for_predicate(&ex("link")).count(), 2);
    assert_eq!(graph.triples_for_predicate(&ex("target")).count(), 2);
    let link_object = match &graph
        .triples_matching(Some(&ex("A").into()), Some(&ex("link")), None)
        .next()
        .unwrap()
        .object
    {
        Term::BlankNode(node) => node.clone(),
        object => panic!("expected a blank node, got {object}"),
    };
    assert!(graph.contains(&Triple::new(link_object, ex("target"), ex("B"))));

    // Skolemization keeps re-derivations from minting new nodes
    engine.evaluate(&mut graph).unwrap();
    assert_eq!(graph, after_first);
}

#[test]
fn invalid_head_triples_are_reported_not_fatal() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("A"), ex("p"), Literal::from("not an IRI")));
    graph.insert(Triple::new(ex("A"), ex("p"), ex("q")));

    // ?v ranges over a literal and an IRI; only the IRI yields a triple
    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(var("x"), var("v"), var("x"))],
        body: vec![BodyElement::TriplePattern(TriplePattern::new(
            var("x"),
            ex("p"),
            var("v"),
        ))],
    }]);
    let report = engine.evaluate(&mut graph).unwrap();

    assert!(graph.contains(&Triple::new(ex("A"), ex("q"), ex("A"))));
    assert_eq!(report.derived_triples, 1);
    // One diagnostic per round that re-derived the ill-formed triple
    assert_eq!(report.diagnostics.len(), 2);
}

#[test]
fn multiple_head_templates_derive_together() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("A"), ex("parent"), ex("B")));

    let engine = engine(vec![Rule {
        head: vec![
            TriplePattern::new(var("x"), ex("ancestor"), var("y")),
            TriplePattern::new(var("y"), ex("descendant"), var("x")),
        ],
        body: vec![BodyElement::TriplePattern(TriplePattern::new(
            var("x"),
            ex("parent"),
            var("y"),
        ))],
    }]);
    let report = engine.evaluate(&mut graph).unwrap();

    assert!(graph.contains(&Triple::new(ex("A"), ex("ancestor"), ex("B"))));
    assert!(graph.contains(&Triple::new(ex("B"), ex("descendant"), ex("A"))));
    assert_eq!(report.derived_triples, 2);
}

#[test]
fn body_blank_node_is_a_scoped_variable() {
    let mut graph = Graph::new();
    graph.insert(Triple::new(ex("A"), ex("p"), ex("B")));
    graph.insert(Triple::new(ex("B"), ex("q"), ex("C")));

    // _:m joins the two patterns like a variable would
    let engine = engine(vec![Rule {
        head: vec![TriplePattern::new(var("x"), ex("pq"), var("y"))],
        body: vec![
            BodyElement::TriplePattern(TriplePattern::new(
                var("x"),
                ex("p"),
                srlrdf::BlankNode::new_unchecked("m"),
            )),
            BodyElement::TriplePattern(TriplePattern::new(
                srlrdf::BlankNode::new_unchecked("m"),
                ex("q"),
                var("y"),
            )),
        ],
    }]);
    engine.evaluate(&mut graph).unwrap();

    assert!(graph.contains(&Triple::new(ex("A"), ex("pq"), ex("C"))));
}
