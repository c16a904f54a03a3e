use crate::EvaluationReport;
use srlgebra::Function;
use srlrdf::{Term, Variable};
use std::ops::RangeInclusive;

/// An error raised while analyzing a rule set, before any evaluation occurs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuleSetError {
    /// The head of a rule must contain at least one triple template
    #[error("The head of rule {rule} is empty")]
    EmptyHead { rule: usize },
    /// The body of a rule must contain at least one element
    #[error("The body of rule {rule} is empty")]
    EmptyBody { rule: usize },
    /// The rule set contains recursion through negation and cannot be stratified
    #[error("The rule set contains recursion through negation")]
    UnsafeNegation,
    /// A head variable is not bound by any positive body element
    #[error("The variable {variable} of the head of rule {rule} is not bound by a positive body element")]
    UnsafeRule { rule: usize, variable: Variable },
    /// BIND may only introduce a fresh variable
    #[error("BIND assigns the variable {variable} which is already bound at this point of rule {rule}")]
    BindToBoundVariable { rule: usize, variable: Variable },
    /// A built-in function call with the wrong number of arguments
    #[error("The function {name} requires between {} and {} arguments, but {actual} were given", .expected.start(), .expected.end())]
    InvalidFunctionArity {
        name: Function,
        expected: RangeInclusive<usize>,
        actual: usize,
    },
}

/// An error raised during rule evaluation.
///
/// Budget errors are fatal but leave the derivations computed so far in the
/// working graph; the attached [`EvaluationReport`] describes them.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EvaluationError {
    /// A stratum did not converge within the configured iteration budget
    #[error("Stratum {stratum} did not converge within {max} fixpoint iterations")]
    IterationBudgetExhausted {
        stratum: usize,
        max: usize,
        report: EvaluationReport,
    },
    /// More triples were derived than the configured budget allows
    #[error("Evaluation derived more than {max} triples")]
    DerivedTripleBudgetExhausted { max: usize, report: EvaluationReport },
}

impl EvaluationError {
    /// The statistics gathered up to the point the error was raised.
    pub fn report(&self) -> &EvaluationReport {
        match self {
            Self::IterationBudgetExhausted { report, .. }
            | Self::DerivedTripleBudgetExhausted { report, .. } => report,
        }
    }
}

/// A non-fatal issue encountered during evaluation.
///
/// Diagnostics are collected in the [`EvaluationReport`] instead of aborting
/// the evaluation: the offending triple is discarded and derivation goes on.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Diagnostic {
    /// A head template instantiated its subject slot with a literal
    #[error("Rule {rule} built a triple whose subject {term} is not an IRI or a blank node")]
    InvalidSubject { rule: usize, term: Term },
    /// A head template instantiated its predicate slot with a non-IRI term
    #[error("Rule {rule} built a triple whose predicate {term} is not an IRI")]
    InvalidPredicate { rule: usize, term: Term },
}
