#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]

mod error;
mod eval;
mod expression;
mod graph;
mod stratify;
mod term;

pub use crate::error::{Diagnostic, EvaluationError, RuleSetError};
use crate::eval::{compile_rule, run_fixpoint, CompiledRule};
pub use crate::graph::GraphAdapter;
use crate::stratify::stratify;
use oxsdatatypes::{DateTime, DayTimeDuration};
use srlgebra::RuleSet;
use srlrdf::Graph;

/// A rule set compiled and stratified, ready to be evaluated.
///
/// The analysis runs once in [`RuleEngine::new`]: unsafe rules and recursion
/// through negation are rejected there, before anything touches a graph.
///
/// ```
/// use srleval::RuleEngine;
/// use srlgebra::{BodyElement, Rule, RuleSet, TriplePattern};
/// use srlrdf::{Graph, NamedNode, Triple, Variable};
///
/// let parent = NamedNode::new("http://example.com/parent")?;
/// let ancestor = NamedNode::new("http://example.com/ancestor")?;
/// let alice = NamedNode::new("http://example.com/Alice")?;
/// let bob = NamedNode::new("http://example.com/Bob")?;
/// let (x, y) = (Variable::new("x")?, Variable::new("y")?);
///
/// let rules = RuleSet::from(vec![Rule {
///     head: vec![TriplePattern::new(x.clone(), ancestor.clone(), y.clone())],
///     body: vec![BodyElement::TriplePattern(TriplePattern::new(
///         x, parent.clone(), y,
///     ))],
/// }]);
///
/// let mut graph = Graph::new();
/// graph.insert(Triple::new(alice.clone(), parent, bob.clone()));
///
/// let engine = RuleEngine::new(&rules)?;
/// engine.evaluate(&mut graph)?;
/// assert!(graph.contains(&Triple::new(alice, ancestor, bob)));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct RuleEngine {
    strata: Vec<Vec<CompiledRule>>,
    limits: EvaluationLimits,
    fixed_now: Option<DateTime>,
}

impl RuleEngine {
    /// Analyzes and compiles a rule set.
    pub fn new(rules: &RuleSet) -> Result<Self, RuleSetError> {
        let stratification = stratify(&rules.rules)?;
        let strata = stratification
            .strata
            .iter()
            .map(|stratum| {
                stratum
                    .iter()
                    .map(|&index| compile_rule(&rules.rules[index], index))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            strata,
            limits: EvaluationLimits::default(),
            fixed_now: None,
        })
    }

    /// Applies resource limits to every following evaluation.
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: EvaluationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Pins the value returned by `NOW()`.
    ///
    /// Without this the clock is read once per fixpoint iteration.
    #[inline]
    #[must_use]
    pub fn with_fixed_now(mut self, now: DateTime) -> Self {
        self.fixed_now = Some(now);
        self
    }

    /// The number of strata the rule set was layered into.
    pub fn stratum_count(&self) -> usize {
        self.strata.len()
    }

    /// Derives triples in place until every stratum reaches its fixpoint.
    ///
    /// On a budget error the derivations computed so far are left in the
    /// graph and the error carries the statistics.
    pub fn evaluate<G: GraphAdapter>(
        &self,
        graph: &mut G,
    ) -> Result<EvaluationReport, EvaluationError> {
        run_fixpoint(&self.strata, graph, &self.limits, self.fixed_now)
    }

    /// Evaluates against a copy of the input graph, leaving the input
    /// untouched, and returns the copy together with the outcome.
    pub fn evaluate_into_new(
        &self,
        graph: &Graph,
    ) -> (Graph, Result<EvaluationReport, EvaluationError>) {
        let mut output = graph.clone();
        let result = self.evaluate(&mut output);
        (output, result)
    }
}

/// Optional budgets bounding an evaluation.
///
/// The default is no limit: a stratified rule set terminates on its own.
/// Budgets are for callers evaluating untrusted rule sets or graphs.
///
/// ```
/// use srleval::EvaluationLimits;
///
/// let _limits = EvaluationLimits {
///     max_iterations_per_stratum: Some(100),
///     ..EvaluationLimits::default()
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationLimits {
    /// Maximum number of productive fixpoint iterations for a single stratum
    pub max_iterations_per_stratum: Option<usize>,
    /// Maximum number of derived triples over the whole evaluation
    pub max_derived_triples: Option<usize>,
}

impl EvaluationLimits {
    /// Creates a new instance without any limit.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// What an evaluation did: per-stratum counters, the wall time and the
/// non-fatal [`Diagnostic`]s.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    /// One entry per evaluated stratum, in evaluation order
    pub strata: Vec<StratumStats>,
    /// Total number of triples added to the graph
    pub derived_triples: usize,
    /// Wall clock time of the evaluation
    pub duration: Option<DayTimeDuration>,
    /// Non-fatal issues, e.g. discarded ill-formed head triples
    pub diagnostics: Vec<Diagnostic>,
}

/// Counters for one stratum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratumStats {
    /// Number of rules assigned to this stratum
    pub rules: usize,
    /// Number of fixpoint iterations that derived at least one new triple
    pub iterations: usize,
    /// Number of triples this stratum added to the graph
    pub derived_triples: usize,
}
