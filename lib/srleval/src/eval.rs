//! The pattern engine and the fixpoint driver.
//!
//! Rules are compiled once: variables (and pattern blank node labels, which
//! are variables scoped to their rule) are interned into positions of a
//! [`BindingTuple`], triple pattern slots become [`TupleSelector`]s and
//! expressions become closures. Evaluation then walks the body left to right,
//! one multiset of tuples at a time.

use crate::error::{Diagnostic, EvaluationError, RuleSetError};
use crate::expression::{build_expression_evaluator, EvalContext, ExpressionEvaluator};
use crate::graph::GraphAdapter;
use crate::{EvaluationLimits, EvaluationReport, StratumStats};
use oxsdatatypes::{DateTime, DayTimeDuration};
use rustc_hash::FxHashMap;
use siphasher::sip128::{Hasher128, SipHasher24};
use srlgebra::{BodyElement, Expression, NamedNodePattern, Rule, TermPattern, TriplePattern};
use srlrdf::{BlankNode, NamedNode, NamedOrBlankNode, Term, Triple};
use std::hash::Hasher;

/// A solution mapping as a partial assignment of interned variables.
///
/// "Unbound" is "not in the domain": a tuple never stores an error marker.
/// Tuples are value types, cloned on extension and never mutated once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BindingTuple {
    inner: Vec<Option<Term>>,
}

impl BindingTuple {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    pub fn contains(&self, position: usize) -> bool {
        self.inner.get(position).is_some_and(Option::is_some)
    }

    pub fn get(&self, position: usize) -> Option<&Term> {
        self.inner.get(position).unwrap_or(&None).as_ref()
    }

    pub fn set(&mut self, position: usize, value: Term) {
        if self.inner.len() <= position {
            self.inner.resize(position + 1, None);
        }
        self.inner[position] = Some(value);
    }

    pub fn iter_bound(&self) -> impl Iterator<Item = (usize, &Term)> {
        self.inner
            .iter()
            .enumerate()
            .filter_map(|(position, term)| Some((position, term.as_ref()?)))
    }
}

/// Interns the variables of one rule into tuple positions.
///
/// Blank node labels appearing in body patterns live in a separate namespace:
/// `?x` and `_:x` in the same rule are different positions.
#[derive(Debug, Default)]
pub(crate) struct VariableTable {
    positions: FxHashMap<VariableKey, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum VariableKey {
    Variable(String),
    BlankLabel(String),
}

impl VariableTable {
    pub fn encode_variable(&mut self, variable: &srlrdf::Variable) -> usize {
        let next = self.positions.len();
        *self
            .positions
            .entry(VariableKey::Variable(variable.as_str().into()))
            .or_insert(next)
    }

    pub fn encode_blank_label(&mut self, label: &str) -> usize {
        let next = self.positions.len();
        *self
            .positions
            .entry(VariableKey::BlankLabel(label.into()))
            .or_insert(next)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

/// A triple pattern slot: either a constant term or a tuple position.
pub(crate) enum TupleSelector {
    Constant(Term),
    Variable(usize),
}

impl TupleSelector {
    fn from_term_pattern(pattern: &TermPattern, variables: &mut VariableTable) -> Self {
        match pattern {
            TermPattern::NamedNode(node) => Self::Constant(node.clone().into()),
            TermPattern::BlankNode(node) => {
                Self::Variable(variables.encode_blank_label(node.as_str()))
            }
            TermPattern::Literal(literal) => Self::Constant(literal.clone().into()),
            TermPattern::Variable(variable) => {
                Self::Variable(variables.encode_variable(variable))
            }
        }
    }

    fn from_named_node_pattern(pattern: &NamedNodePattern, variables: &mut VariableTable) -> Self {
        match pattern {
            NamedNodePattern::NamedNode(node) => Self::Constant(node.clone().into()),
            NamedNodePattern::Variable(variable) => {
                Self::Variable(variables.encode_variable(variable))
            }
        }
    }

    fn get_pattern_value(&self, tuple: &BindingTuple) -> Option<Term> {
        match self {
            Self::Constant(term) => Some(term.clone()),
            Self::Variable(position) => tuple.get(*position).cloned(),
        }
    }

    /// Writes a matched value back into the tuple, checking conflicts raised
    /// by a variable repeated inside a single pattern.
    fn put(&self, tuple: &mut BindingTuple, value: Term) -> bool {
        match self {
            Self::Constant(_) => true,
            Self::Variable(position) => match tuple.get(*position) {
                Some(existing) => *existing == value,
                None => {
                    tuple.set(*position, value);
                    true
                }
            },
        }
    }
}

pub(crate) enum CompiledBodyElement {
    Pattern {
        subject: TupleSelector,
        predicate: TupleSelector,
        object: TupleSelector,
    },
    Filter(ExpressionEvaluator),
    Bind {
        expression: ExpressionEvaluator,
        variable: usize,
    },
    Not {
        elements: Vec<CompiledBodyElement>,
        /// Positions of every variable occurring in the sub-pattern, for the
        /// anti-join variable-sharing test.
        variables: Vec<usize>,
    },
}

pub(crate) enum TripleTemplateValue {
    Constant(Term),
    Variable(usize),
    BlankNode(usize),
}

pub(crate) struct TripleTemplate {
    pub subject: TripleTemplateValue,
    pub predicate: TripleTemplateValue,
    pub object: TripleTemplateValue,
}

pub(crate) struct CompiledRule {
    pub index: usize,
    pub body: Vec<CompiledBodyElement>,
    pub head: Vec<TripleTemplate>,
    pub width: usize,
    pub head_label_count: usize,
}

pub(crate) fn compile_rule(rule: &Rule, index: usize) -> Result<CompiledRule, RuleSetError> {
    let mut variables = VariableTable::default();
    let body = compile_elements(&rule.body, &mut variables)?;
    let mut head_labels = FxHashMap::default();
    let head = rule
        .head
        .iter()
        .map(|template| compile_template(template, &mut variables, &mut head_labels))
        .collect();
    Ok(CompiledRule {
        index,
        body,
        head,
        width: variables.len(),
        head_label_count: head_labels.len(),
    })
}

fn compile_elements(
    elements: &[BodyElement],
    variables: &mut VariableTable,
) -> Result<Vec<CompiledBodyElement>, RuleSetError> {
    elements
        .iter()
        .map(|element| {
            Ok(match element {
                BodyElement::TriplePattern(pattern) => CompiledBodyElement::Pattern {
                    subject: TupleSelector::from_term_pattern(&pattern.subject, variables),
                    predicate: TupleSelector::from_named_node_pattern(
                        &pattern.predicate,
                        variables,
                    ),
                    object: TupleSelector::from_term_pattern(&pattern.object, variables),
                },
                BodyElement::Filter(expression) => CompiledBodyElement::Filter(
                    build_expression_evaluator(expression, variables)?,
                ),
                BodyElement::Bind {
                    expression,
                    variable,
                } => CompiledBodyElement::Bind {
                    expression: build_expression_evaluator(expression, variables)?,
                    variable: variables.encode_variable(variable),
                },
                BodyElement::Not(inner) => CompiledBodyElement::Not {
                    elements: compile_elements(inner, variables)?,
                    variables: encode_element_variables(inner, variables),
                },
            })
        })
        .collect()
}

fn compile_template(
    template: &TriplePattern,
    variables: &mut VariableTable,
    head_labels: &mut FxHashMap<String, usize>,
) -> TripleTemplate {
    let subject = compile_template_slot(&template.subject, variables, head_labels);
    let predicate = match &template.predicate {
        NamedNodePattern::NamedNode(node) => TripleTemplateValue::Constant(node.clone().into()),
        NamedNodePattern::Variable(variable) => {
            TripleTemplateValue::Variable(variables.encode_variable(variable))
        }
    };
    let object = compile_template_slot(&template.object, variables, head_labels);
    TripleTemplate {
        subject,
        predicate,
        object,
    }
}

fn compile_template_slot(
    pattern: &TermPattern,
    variables: &mut VariableTable,
    head_labels: &mut FxHashMap<String, usize>,
) -> TripleTemplateValue {
    match pattern {
        TermPattern::NamedNode(node) => TripleTemplateValue::Constant(node.clone().into()),
        TermPattern::BlankNode(node) => {
            let next = head_labels.len();
            TripleTemplateValue::BlankNode(*head_labels.entry(node.as_str().into()).or_insert(next))
        }
        TermPattern::Literal(literal) => TripleTemplateValue::Constant(literal.clone().into()),
        TermPattern::Variable(variable) => {
            TripleTemplateValue::Variable(variables.encode_variable(variable))
        }
    }
}

fn encode_element_variables(
    elements: &[BodyElement],
    variables: &mut VariableTable,
) -> Vec<usize> {
    let mut positions = Vec::new();
    collect_element_variables(elements, variables, &mut positions);
    positions.sort_unstable();
    positions.dedup();
    positions
}

fn collect_element_variables(
    elements: &[BodyElement],
    variables: &mut VariableTable,
    positions: &mut Vec<usize>,
) {
    for element in elements {
        match element {
            BodyElement::TriplePattern(pattern) => {
                collect_term_pattern_variables(&pattern.subject, variables, positions);
                if let NamedNodePattern::Variable(variable) = &pattern.predicate {
                    positions.push(variables.encode_variable(variable));
                }
                collect_term_pattern_variables(&pattern.object, variables, positions);
            }
            BodyElement::Filter(expression) => {
                collect_expression_variables(expression, variables, positions);
            }
            BodyElement::Bind {
                expression,
                variable,
            } => {
                collect_expression_variables(expression, variables, positions);
                positions.push(variables.encode_variable(variable));
            }
            BodyElement::Not(inner) => collect_element_variables(inner, variables, positions),
        }
    }
}

fn collect_term_pattern_variables(
    pattern: &TermPattern,
    variables: &mut VariableTable,
    positions: &mut Vec<usize>,
) {
    match pattern {
        TermPattern::Variable(variable) => positions.push(variables.encode_variable(variable)),
        TermPattern::BlankNode(node) => {
            positions.push(variables.encode_blank_label(node.as_str()))
        }
        TermPattern::NamedNode(_) | TermPattern::Literal(_) => (),
    }
}

fn collect_expression_variables(
    expression: &Expression,
    variables: &mut VariableTable,
    positions: &mut Vec<usize>,
) {
    match expression {
        Expression::NamedNode(_) | Expression::Literal(_) => (),
        Expression::Variable(variable) | Expression::Bound(variable) => {
            positions.push(variables.encode_variable(variable))
        }
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::SameTerm(a, b)
        | Expression::Greater(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Less(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => {
            collect_expression_variables(a, variables, positions);
            collect_expression_variables(b, variables, positions);
        }
        Expression::In(a, list) => {
            collect_expression_variables(a, variables, positions);
            for e in list {
                collect_expression_variables(e, variables, positions);
            }
        }
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) | Expression::Not(e) => {
            collect_expression_variables(e, variables, positions)
        }
        Expression::If(a, b, c) => {
            collect_expression_variables(a, variables, positions);
            collect_expression_variables(b, variables, positions);
            collect_expression_variables(c, variables, positions);
        }
        Expression::Coalesce(list) => {
            for e in list {
                collect_expression_variables(e, variables, positions);
            }
        }
        Expression::FunctionCall(_, parameters) => {
            for e in parameters {
                collect_expression_variables(e, variables, positions);
            }
        }
    }
}

/// Evaluates a body element sequence left to right against a frozen graph.
pub(crate) fn evaluate_body<G: GraphAdapter>(
    elements: &[CompiledBodyElement],
    graph: &G,
    context: &EvalContext,
    seeds: Vec<BindingTuple>,
) -> Vec<BindingTuple> {
    let mut solutions = seeds;
    for element in elements {
        match element {
            CompiledBodyElement::Pattern {
                subject,
                predicate,
                object,
            } => {
                let mut next = Vec::new();
                for tuple in &solutions {
                    // A slot bound to a term kind the position cannot carry
                    // never matches.
                    let subject_filter = match subject.get_pattern_value(tuple) {
                        None => None,
                        Some(Term::NamedNode(node)) => Some(NamedOrBlankNode::from(node)),
                        Some(Term::BlankNode(node)) => Some(NamedOrBlankNode::from(node)),
                        Some(Term::Literal(_)) => continue,
                    };
                    let predicate_filter = match predicate.get_pattern_value(tuple) {
                        None => None,
                        Some(Term::NamedNode(node)) => Some(node),
                        Some(_) => continue,
                    };
                    let object_filter = object.get_pattern_value(tuple);
                    for triple in graph.triples_matching(
                        subject_filter.as_ref(),
                        predicate_filter.as_ref(),
                        object_filter.as_ref(),
                    ) {
                        let mut new_tuple = tuple.clone();
                        if subject.put(&mut new_tuple, triple.subject.into())
                            && predicate.put(&mut new_tuple, triple.predicate.into())
                            && object.put(&mut new_tuple, triple.object)
                        {
                            next.push(new_tuple);
                        }
                    }
                }
                solutions = next;
            }
            CompiledBodyElement::Filter(expression) => solutions.retain(|tuple| {
                expression(tuple, context).and_then(|value| value.effective_boolean_value())
                    == Some(true)
            }),
            CompiledBodyElement::Bind {
                expression,
                variable,
            } => {
                // An erroring or unbound right-hand side leaves the solution
                // unchanged, with the variable not in the domain.
                for tuple in &mut solutions {
                    if let Some(value) = expression(tuple, context) {
                        tuple.set(*variable, value.into());
                    }
                }
            }
            CompiledBodyElement::Not {
                elements,
                variables,
            } => solutions.retain(|tuple| {
                if !variables.iter().any(|&position| tuple.contains(position)) {
                    // No shared variable: the anti-join keeps the solution.
                    return true;
                }
                evaluate_body(elements, graph, context, vec![tuple.clone()]).is_empty()
            }),
        }
    }
    solutions
}

/// Instantiates the head templates of a rule for one solution.
///
/// Head blank node labels are Skolemized: the fresh node is a deterministic
/// function of (rule, label, solution), so re-deriving the same solution in a
/// later iteration yields the same node and the fixpoint stays finite.
pub(crate) fn instantiate_head(
    rule: &CompiledRule,
    tuple: &BindingTuple,
    candidates: &mut Vec<Triple>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut fresh_nodes: Vec<Option<BlankNode>> = vec![None; rule.head_label_count];
    'template: for template in &rule.head {
        let mut resolve = |value: &TripleTemplateValue| -> Option<Term> {
            Some(match value {
                TripleTemplateValue::Constant(term) => term.clone(),
                TripleTemplateValue::Variable(position) => tuple.get(*position)?.clone(),
                TripleTemplateValue::BlankNode(label) => fresh_nodes[*label]
                    .get_or_insert_with(|| skolem_blank_node(rule.index, *label, tuple))
                    .clone()
                    .into(),
            })
        };
        // An unbound variable skips this template but not its siblings
        let Some(subject) = resolve(&template.subject) else {
            continue 'template;
        };
        let Some(predicate) = resolve(&template.predicate) else {
            continue 'template;
        };
        let Some(object) = resolve(&template.object) else {
            continue 'template;
        };
        let subject = match NamedOrBlankNode::try_from(subject) {
            Ok(subject) => subject,
            Err(error) => {
                diagnostics.push(Diagnostic::InvalidSubject {
                    rule: rule.index,
                    term: error.into(),
                });
                continue 'template;
            }
        };
        let predicate = match NamedNode::try_from(predicate) {
            Ok(predicate) => predicate,
            Err(error) => {
                diagnostics.push(Diagnostic::InvalidPredicate {
                    rule: rule.index,
                    term: error.into(),
                });
                continue 'template;
            }
        };
        candidates.push(Triple {
            subject,
            predicate,
            object,
        });
    }
}

fn skolem_blank_node(rule_index: usize, label: usize, tuple: &BindingTuple) -> BlankNode {
    let mut hasher = SipHasher24::new();
    hasher.write_usize(rule_index);
    hasher.write_usize(label);
    for (position, term) in tuple.iter_bound() {
        hasher.write_usize(position);
        hasher.write(term.to_string().as_bytes());
    }
    BlankNode::new_from_unique_id(hasher.finish128().as_u128())
}

/// Runs the per-stratum fixpoint: within a round every rule sees the same
/// frozen snapshot, the new triples become visible in the next round.
pub(crate) fn run_fixpoint<G: GraphAdapter>(
    strata: &[Vec<CompiledRule>],
    graph: &mut G,
    limits: &EvaluationLimits,
    fixed_now: Option<DateTime>,
) -> Result<EvaluationReport, EvaluationError> {
    let timer = Timer::now();
    let mut report = EvaluationReport::default();
    for (stratum, rules) in strata.iter().enumerate() {
        let mut stats = StratumStats {
            rules: rules.len(),
            iterations: 0,
            derived_triples: 0,
        };
        loop {
            if let Some(max) = limits.max_iterations_per_stratum {
                if stats.iterations >= max {
                    report.strata.push(stats);
                    report.duration = timer.elapsed();
                    return Err(EvaluationError::IterationBudgetExhausted {
                        stratum,
                        max,
                        report,
                    });
                }
            }
            let context = EvalContext {
                now: fixed_now.unwrap_or_else(DateTime::now),
            };
            let mut candidates = Vec::new();
            for rule in rules {
                let solutions = evaluate_body(
                    &rule.body,
                    graph,
                    &context,
                    vec![BindingTuple::with_capacity(rule.width)],
                );
                for solution in &solutions {
                    instantiate_head(rule, solution, &mut candidates, &mut report.diagnostics);
                }
            }
            let mut newly_added = 0_usize;
            for triple in candidates {
                if graph.insert(triple) {
                    newly_added += 1;
                    report.derived_triples += 1;
                    if let Some(max) = limits.max_derived_triples {
                        if report.derived_triples > max {
                            stats.derived_triples += newly_added;
                            report.strata.push(stats);
                            report.duration = timer.elapsed();
                            return Err(EvaluationError::DerivedTripleBudgetExhausted {
                                max,
                                report,
                            });
                        }
                    }
                }
            }
            stats.derived_triples += newly_added;
            if newly_added == 0 {
                break;
            }
            stats.iterations += 1;
        }
        report.strata.push(stats);
    }
    report.duration = timer.elapsed();
    Ok(report)
}

pub(crate) struct Timer {
    start: DateTime,
}

impl Timer {
    pub fn now() -> Self {
        Self {
            start: DateTime::now(),
        }
    }

    pub fn elapsed(&self) -> Option<DayTimeDuration> {
        DateTime::now().checked_sub(self.start)
    }
}
