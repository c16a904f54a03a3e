//! Budget enforcement: evaluation stops with an error but keeps the partial
//! derivations and the statistics.

use srleval::{EvaluationError, EvaluationLimits, RuleEngine};
use srlgebra::{BodyElement, Rule, RuleSet, TriplePattern};
use srlrdf::{Graph, NamedNode, Triple, Variable};

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn closure_rules() -> RuleSet {
    RuleSet::from(vec![
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
    ])
}

fn chain(len: usize) -> Graph {
    let mut graph = Graph::new();
    for i in 0..len {
        graph.insert(Triple::new(
            ex(&format!("n{i}")),
            ex("parent"),
            ex(&format!("n{}", i + 1)),
        ));
    }
    graph
}

#[test]
fn iteration_budget_aborts_a_slow_stratum() {
    let mut graph = chain(8);
    let engine = RuleEngine::new(&closure_rules())
        .unwrap()
        .with_limits(EvaluationLimits {
            max_iterations_per_stratum: Some(1),
            max_derived_triples: None,
        });
    let error = engine.evaluate(&mut graph).unwrap_err();

    assert!(matches!(
        &error,
        EvaluationError::IterationBudgetExhausted {
            stratum: 0,
            max: 1,
            ..
        }
    ));
    // The first round's derivations are kept
    assert_eq!(error.report().derived_triples, 8);
    assert_eq!(graph.triples_for_predicate(&ex("anc")).count(), 8);
}

#[test]
fn derived_triple_budget_aborts_mid_round() {
    let mut graph = chain(8);
    let engine = RuleEngine::new(&closure_rules())
        .unwrap()
        .with_limits(EvaluationLimits {
            max_iterations_per_stratum: None,
            max_derived_triples: Some(3),
        });
    let error = engine.evaluate(&mut graph).unwrap_err();

    assert!(matches!(
        &error,
        EvaluationError::DerivedTripleBudgetExhausted { max: 3, .. }
    ));
    assert_eq!(error.report().derived_triples, 4);
    assert_eq!(graph.triples_for_predicate(&ex("anc")).count(), 4);
}

#[test]
fn unlimited_by_default() {
    let mut graph = chain(8);
    let report = RuleEngine::new(&closure_rules())
        .unwrap()
        .evaluate(&mut graph)
        .unwrap();
    // n(n+1)/2 ancestor pairs over a chain of 9 nodes
    assert_eq!(report.derived_triples, 36);
}
