//! Rule set analysis: safety checking, predicate dependency graph,
//! strongly connected components and layering.
//!
//! The dependency graph is built once per rule set, only for this analysis,
//! and discarded afterwards. A variable in predicate position is modeled as a
//! wildcard node that conservatively stands for every predicate.

use crate::error::RuleSetError;
use rustc_hash::{FxHashMap, FxHashSet};
use srlgebra::{BodyElement, NamedNodePattern, Rule, TermPattern};
use srlrdf::NamedNode;

/// The strata of a rule set, as rule indices in evaluation order.
#[derive(Debug, Clone)]
pub(crate) struct Stratification {
    pub strata: Vec<Vec<usize>>,
}

pub(crate) fn stratify(rules: &[Rule]) -> Result<Stratification, RuleSetError> {
    for (index, rule) in rules.iter().enumerate() {
        validate_rule(index, rule)?;
    }

    let graph = DependencyGraph::new(rules);
    let components = graph.strongly_connected_components();

    // A cycle through negation cannot be layered
    for (from, edges) in graph.edges.iter().enumerate() {
        for &(to, negative) in edges {
            if negative && components[from] == components[to] {
                return Err(RuleSetError::UnsafeNegation);
            }
        }
    }

    // Tarjan numbers components in reverse topological order, so walking them
    // from the highest id propagates levels from dependencies to dependents.
    let component_count = components.iter().copied().max().map_or(0, |c| c + 1);
    let mut levels = vec![0_usize; component_count];
    let mut component_order: Vec<usize> = (0..graph.edges.len()).collect();
    component_order.sort_unstable_by(|a, b| components[*b].cmp(&components[*a]));
    for from in component_order {
        for &(to, negative) in &graph.edges[from] {
            if components[from] != components[to] {
                levels[components[to]] =
                    levels[components[to]].max(levels[components[from]] + usize::from(negative));
            }
        }
    }

    let mut strata = vec![Vec::new(); levels.iter().copied().max().unwrap_or(0) + 1];
    for (index, rule) in rules.iter().enumerate() {
        let head_node = graph.head_node(rule);
        strata[levels[components[head_node]]].push(index);
    }
    strata.retain(|stratum| !stratum.is_empty());
    Ok(Stratification { strata })
}

fn validate_rule(index: usize, rule: &Rule) -> Result<(), RuleSetError> {
    if rule.head.is_empty() {
        return Err(RuleSetError::EmptyHead { rule: index });
    }
    if rule.body.is_empty() {
        return Err(RuleSetError::EmptyBody { rule: index });
    }
    check_bind_targets(index, &rule.body, &mut FxHashSet::default())?;

    let mut positive = FxHashSet::default();
    collect_positive_binders(&rule.body, &mut positive);
    for template in &rule.head {
        for slot in [&template.subject, &template.object] {
            if let TermPattern::Variable(variable) = slot {
                if !positive.contains(variable.as_str()) {
                    return Err(RuleSetError::UnsafeRule {
                        rule: index,
                        variable: variable.clone(),
                    });
                }
            }
        }
        if let NamedNodePattern::Variable(variable) = &template.predicate {
            if !positive.contains(variable.as_str()) {
                return Err(RuleSetError::UnsafeRule {
                    rule: index,
                    variable: variable.clone(),
                });
            }
        }
    }
    Ok(())
}

/// BIND may only introduce a variable that no earlier element binds.
/// This is statically decidable because bodies are evaluated left to right.
fn check_bind_targets<'a>(
    rule: usize,
    elements: &'a [BodyElement],
    bound: &mut FxHashSet<&'a str>,
) -> Result<(), RuleSetError> {
    for element in elements {
        match element {
            BodyElement::TriplePattern(pattern) => {
                collect_pattern_variables(pattern, bound);
            }
            BodyElement::Filter(_) => (),
            BodyElement::Bind { variable, .. } => {
                if !bound.insert(variable.as_str()) {
                    return Err(RuleSetError::BindToBoundVariable {
                        rule,
                        variable: variable.clone(),
                    });
                }
            }
            BodyElement::Not(inner) => {
                // The sub-pattern sees the outer bindings but its own do not
                // escape
                check_bind_targets(rule, inner, &mut bound.clone())?;
            }
        }
    }
    Ok(())
}

fn collect_positive_binders<'a>(elements: &'a [BodyElement], binders: &mut FxHashSet<&'a str>) {
    for element in elements {
        match element {
            BodyElement::TriplePattern(pattern) => collect_pattern_variables(pattern, binders),
            BodyElement::Bind { variable, .. } => {
                binders.insert(variable.as_str());
            }
            BodyElement::Filter(_) | BodyElement::Not(_) => (),
        }
    }
}

fn collect_pattern_variables<'a>(
    pattern: &'a srlgebra::TriplePattern,
    variables: &mut FxHashSet<&'a str>,
) {
    for slot in [&pattern.subject, &pattern.object] {
        if let TermPattern::Variable(variable) = slot {
            variables.insert(variable.as_str());
        }
    }
    if let NamedNodePattern::Variable(variable) = &pattern.predicate {
        variables.insert(variable.as_str());
    }
}

/// Node ids: one per concrete predicate IRI, plus one wildcard node standing
/// for a variable in predicate position.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum PredicateNode<'a> {
    Named(&'a NamedNode),
    Any,
}

struct DependencyGraph {
    node_count: usize,
    any_node: Option<usize>,
    node_of_predicate: FxHashMap<String, usize>,
    /// Out edges: `edges[p]` contains `(q, negative)` when q depends on p.
    edges: Vec<Vec<(usize, bool)>>,
}

impl DependencyGraph {
    fn new(rules: &[Rule]) -> Self {
        let mut graph = Self {
            node_count: 0,
            any_node: None,
            node_of_predicate: FxHashMap::default(),
            edges: Vec::new(),
        };
        // Register every node first so wildcard expansion sees them all
        for rule in rules {
            for template in &rule.head {
                graph.node(predicate_node(&template.predicate));
            }
            register_body_nodes(&rule.body, &mut graph);
        }
        for rule in rules {
            let heads: Vec<usize> = rule
                .head
                .iter()
                .map(|template| graph.node(predicate_node(&template.predicate)))
                .collect();
            // Head templates of one rule derive together, which forces their
            // predicates into the same stratum
            for &a in &heads {
                for &b in &heads {
                    if a != b {
                        graph.add_edge(a, b, false);
                    }
                }
            }
            let mut references = Vec::new();
            collect_body_references(&rule.body, false, &mut references);
            for (reference, negative) in references {
                let from = graph.node(reference);
                for &head in &heads {
                    graph.add_edge(from, head, negative);
                }
            }
        }
        graph
    }

    fn node(&mut self, node: PredicateNode<'_>) -> usize {
        match node {
            PredicateNode::Named(predicate) => {
                if let Some(&id) = self.node_of_predicate.get(predicate.as_str()) {
                    return id;
                }
                let id = self.node_count;
                self.node_count += 1;
                self.edges.push(Vec::new());
                self.node_of_predicate.insert(predicate.as_str().into(), id);
                id
            }
            PredicateNode::Any => {
                if let Some(id) = self.any_node {
                    return id;
                }
                let id = self.node_count;
                self.node_count += 1;
                self.edges.push(Vec::new());
                self.any_node = Some(id);
                id
            }
        }
    }

    /// Adds an edge, expanding the wildcard node to every node on the side it
    /// appears on.
    fn add_edge(&mut self, from: usize, to: usize, negative: bool) {
        let froms = if Some(from) == self.any_node {
            (0..self.node_count).collect()
        } else {
            vec![from]
        };
        let tos = if Some(to) == self.any_node {
            (0..self.node_count).collect()
        } else {
            vec![to]
        };
        for &f in &froms {
            for &t in &tos {
                if !self.edges[f].contains(&(t, negative)) {
                    self.edges[f].push((t, negative));
                }
            }
        }
    }

    fn head_node(&self, rule: &Rule) -> usize {
        match predicate_node(&rule.head[0].predicate) {
            PredicateNode::Named(predicate) => self.node_of_predicate[predicate.as_str()],
            PredicateNode::Any => self.any_node.unwrap_or(0),
        }
    }

    /// Tarjan's algorithm; returns the component id of every node.
    fn strongly_connected_components(&self) -> Vec<usize> {
        let mut state = TarjanState {
            index: vec![None; self.node_count],
            lowlink: vec![0; self.node_count],
            on_stack: vec![false; self.node_count],
            stack: Vec::new(),
            components: vec![0; self.node_count],
            next_index: 0,
            next_component: 0,
        };
        for node in 0..self.node_count {
            if state.index[node].is_none() {
                self.visit(node, &mut state);
            }
        }
        state.components
    }

    fn visit(&self, node: usize, state: &mut TarjanState) {
        state.index[node] = Some(state.next_index);
        state.lowlink[node] = state.next_index;
        state.next_index += 1;
        state.stack.push(node);
        state.on_stack[node] = true;
        for &(successor, _) in &self.edges[node] {
            if state.index[successor].is_none() {
                self.visit(successor, state);
                state.lowlink[node] = state.lowlink[node].min(state.lowlink[successor]);
            } else if state.on_stack[successor] {
                state.lowlink[node] =
                    state.lowlink[node].min(state.index[successor].unwrap_or_default());
            }
        }
        if state.lowlink[node] == state.index[node].unwrap_or_default() {
            while let Some(member) = state.stack.pop() {
                state.on_stack[member] = false;
                state.components[member] = state.next_component;
                if member == node {
                    break;
                }
            }
            state.next_component += 1;
        }
    }
}

struct TarjanState {
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<usize>,
    next_index: usize,
    next_component: usize,
}

fn predicate_node(pattern: &NamedNodePattern) -> PredicateNode<'_> {
    match pattern {
        NamedNodePattern::NamedNode(predicate) => PredicateNode::Named(predicate),
        NamedNodePattern::Variable(_) => PredicateNode::Any,
    }
}

fn register_body_nodes(elements: &[BodyElement], graph: &mut DependencyGraph) {
    for element in elements {
        match element {
            BodyElement::TriplePattern(pattern) => {
                graph.node(predicate_node(&pattern.predicate));
            }
            BodyElement::Not(inner) => register_body_nodes(inner, graph),
            BodyElement::Filter(_) | BodyElement::Bind { .. } => (),
        }
    }
}

fn collect_body_references<'a>(
    elements: &'a [BodyElement],
    negated: bool,
    references: &mut Vec<(PredicateNode<'a>, bool)>,
) {
    for element in elements {
        match element {
            BodyElement::TriplePattern(pattern) => {
                references.push((predicate_node(&pattern.predicate), negated));
            }
            BodyElement::Not(inner) => collect_body_references(inner, true, references),
            BodyElement::Filter(_) | BodyElement::Bind { .. } => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srlgebra::{Expression, TriplePattern};
    use srlrdf::Variable;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn pattern(s: &str, p: &str, o: &str) -> TriplePattern {
        TriplePattern::new(var(s), ex(p), var(o))
    }

    #[test]
    fn positive_recursion_is_one_stratum() {
        let rules = vec![
            Rule {
                head: vec![pattern("x", "anc", "y")],
                body: vec![BodyElement::TriplePattern(pattern("x", "parent", "y"))],
            },
            Rule {
                head: vec![pattern("x", "anc", "z")],
                body: vec![
                    BodyElement::TriplePattern(pattern("x", "anc", "y")),
                    BodyElement::TriplePattern(pattern("y", "anc", "z")),
                ],
            },
        ];
        let stratification = stratify(&rules).unwrap();
        assert_eq!(stratification.strata, vec![vec![0, 1]]);
    }

    #[test]
    fn negation_pushes_to_later_stratum() {
        let rules = vec![
            Rule {
                head: vec![pattern("x", "anc", "y")],
                body: vec![BodyElement::TriplePattern(pattern("x", "parent", "y"))],
            },
            Rule {
                head: vec![pattern("x", "root", "x")],
                body: vec![
                    BodyElement::TriplePattern(pattern("x", "anc", "y")),
                    BodyElement::Not(vec![BodyElement::TriplePattern(pattern(
                        "z", "anc", "x",
                    ))]),
                ],
            },
        ];
        let stratification = stratify(&rules).unwrap();
        assert_eq!(stratification.strata, vec![vec![0], vec![1]]);
    }

    #[test]
    fn negative_cycle_is_rejected() {
        let rules = vec![
            Rule {
                head: vec![pattern("x", "a", "x")],
                body: vec![
                    BodyElement::TriplePattern(pattern("x", "seed", "x")),
                    BodyElement::Not(vec![BodyElement::TriplePattern(pattern("x", "b", "x"))]),
                ],
            },
            Rule {
                head: vec![pattern("x", "b", "x")],
                body: vec![
                    BodyElement::TriplePattern(pattern("x", "seed", "x")),
                    BodyElement::Not(vec![BodyElement::TriplePattern(pattern("x", "a", "x"))]),
                ],
            },
        ];
        assert!(matches!(
            stratify(&rules),
            Err(RuleSetError::UnsafeNegation)
        ));
    }

    #[test]
    fn unsafe_head_variable_is_rejected() {
        let rules = vec![Rule {
            head: vec![pattern("x", "a", "y")],
            body: vec![BodyElement::TriplePattern(pattern("x", "seed", "x"))],
        }];
        assert!(matches!(
            stratify(&rules),
            Err(RuleSetError::UnsafeRule { rule: 0, .. })
        ));
    }

    #[test]
    fn bind_to_bound_variable_is_rejected() {
        let rules = vec![Rule {
            head: vec![pattern("x", "a", "y")],
            body: vec![
                BodyElement::TriplePattern(pattern("x", "seed", "y")),
                BodyElement::Bind {
                    expression: Expression::Variable(var("x")),
                    variable: var("y"),
                },
            ],
        }];
        assert!(matches!(
            stratify(&rules),
            Err(RuleSetError::BindToBoundVariable { rule: 0, .. })
        ));
    }
}
