//! Compilation of expressions into evaluators over solution mappings.
//!
//! An expression is compiled once per rule into a tree of closures; the
//! closures are then run for every candidate solution. `None` is the error
//! value: a type error or an unbound variable makes the evaluator return
//! `None` and the decision is taken at the nearest FILTER or BIND boundary.

use crate::error::RuleSetError;
use crate::eval::{BindingTuple, VariableTable};
use crate::term::ExpressionTerm;
use digest::Digest;
use md5::Md5;
use oxiri::Iri;
use oxsdatatypes::{DateTime, Decimal, Double, Float, Integer};
use rand::random;
use regex::{Regex, RegexBuilder};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use srlgebra::{Expression, Function};
use srlrdf::{BlankNode, Literal, NamedNode, Term};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::ops::RangeInclusive;
use std::rc::Rc;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

/// Ambient state captured once per fixpoint iteration.
///
/// Keeping `NOW()` stable across a whole derivation round makes dateTime
/// comparisons reproducible within it, and lets tests inject a fixed clock.
#[derive(Clone, Copy)]
pub(crate) struct EvalContext {
    pub now: DateTime,
}

pub(crate) type ExpressionEvaluator =
    Rc<dyn Fn(&BindingTuple, &EvalContext) -> Option<ExpressionTerm>>;

pub(crate) fn build_expression_evaluator(
    expression: &Expression,
    variables: &mut VariableTable,
) -> Result<ExpressionEvaluator, RuleSetError> {
    Ok(match expression {
        Expression::NamedNode(t) => {
            let t = ExpressionTerm::from(t.clone());
            Rc::new(move |_, _| Some(t.clone()))
        }
        Expression::Literal(t) => {
            let t = ExpressionTerm::from(Term::from(t.clone()));
            Rc::new(move |_, _| Some(t.clone()))
        }
        Expression::Variable(v) => {
            let position = variables.encode_variable(v);
            Rc::new(move |tuple, _| Some(tuple.get(position)?.clone().into()))
        }
        Expression::Bound(v) => {
            let position = variables.encode_variable(v);
            Rc::new(move |tuple, _| Some(tuple.contains(position).into()))
        }
        Expression::Or(a, b) => {
            let children = [
                build_expression_evaluator(a, variables)?,
                build_expression_evaluator(b, variables)?,
            ];
            Rc::new(move |tuple, ctx| {
                let mut error = false;
                for child in &children {
                    match child(tuple, ctx).and_then(|e| e.effective_boolean_value()) {
                        Some(true) => return Some(true.into()),
                        Some(false) => (),
                        None => error = true,
                    }
                }
                if error {
                    None
                } else {
                    Some(false.into())
                }
            })
        }
        Expression::And(a, b) => {
            let children = [
                build_expression_evaluator(a, variables)?,
                build_expression_evaluator(b, variables)?,
            ];
            Rc::new(move |tuple, ctx| {
                let mut error = false;
                for child in &children {
                    match child(tuple, ctx).and_then(|e| e.effective_boolean_value()) {
                        Some(false) => return Some(false.into()),
                        Some(true) => (),
                        None => error = true,
                    }
                }
                if error {
                    None
                } else {
                    Some(true.into())
                }
            })
        }
        Expression::Equal(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| equals(&a(tuple, ctx)?, &b(tuple, ctx)?).map(Into::into))
        }
        Expression::SameTerm(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| Some((a(tuple, ctx)? == b(tuple, ctx)?).into()))
        }
        Expression::Greater(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some((partial_cmp(&a(tuple, ctx)?, &b(tuple, ctx)?)? == Ordering::Greater).into())
            })
        }
        Expression::GreaterOrEqual(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some(
                    match partial_cmp(&a(tuple, ctx)?, &b(tuple, ctx)?)? {
                        Ordering::Greater | Ordering::Equal => true,
                        Ordering::Less => false,
                    }
                    .into(),
                )
            })
        }
        Expression::Less(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some((partial_cmp(&a(tuple, ctx)?, &b(tuple, ctx)?)? == Ordering::Less).into())
            })
        }
        Expression::LessOrEqual(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some(
                    match partial_cmp(&a(tuple, ctx)?, &b(tuple, ctx)?)? {
                        Ordering::Less | Ordering::Equal => true,
                        Ordering::Greater => false,
                    }
                    .into(),
                )
            })
        }
        Expression::In(e, candidates) => {
            let e = build_expression_evaluator(e, variables)?;
            let candidates = candidates
                .iter()
                .map(|c| build_expression_evaluator(c, variables))
                .collect::<Result<Vec<_>, _>>()?;
            Rc::new(move |tuple, ctx| {
                let needle = e(tuple, ctx)?;
                let mut error = false;
                for candidate in &candidates {
                    match candidate(tuple, ctx).and_then(|c| equals(&needle, &c)) {
                        Some(true) => return Some(true.into()),
                        Some(false) => (),
                        None => error = true,
                    }
                }
                if error {
                    None
                } else {
                    Some(false.into())
                }
            })
        }
        Expression::Add(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some(
                    match NumericBinaryOperands::new(a(tuple, ctx)?, b(tuple, ctx)?)? {
                        NumericBinaryOperands::Float(v1, v2) => {
                            ExpressionTerm::FloatLiteral(v1 + v2)
                        }
                        NumericBinaryOperands::Double(v1, v2) => {
                            ExpressionTerm::DoubleLiteral(v1 + v2)
                        }
                        NumericBinaryOperands::Integer(v1, v2) => {
                            ExpressionTerm::IntegerLiteral(v1.checked_add(v2)?)
                        }
                        NumericBinaryOperands::Decimal(v1, v2) => {
                            ExpressionTerm::DecimalLiteral(v1.checked_add(v2)?)
                        }
                    },
                )
            })
        }
        Expression::Subtract(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some(
                    match NumericBinaryOperands::new(a(tuple, ctx)?, b(tuple, ctx)?)? {
                        NumericBinaryOperands::Float(v1, v2) => {
                            ExpressionTerm::FloatLiteral(v1 - v2)
                        }
                        NumericBinaryOperands::Double(v1, v2) => {
                            ExpressionTerm::DoubleLiteral(v1 - v2)
                        }
                        NumericBinaryOperands::Integer(v1, v2) => {
                            ExpressionTerm::IntegerLiteral(v1.checked_sub(v2)?)
                        }
                        NumericBinaryOperands::Decimal(v1, v2) => {
                            ExpressionTerm::DecimalLiteral(v1.checked_sub(v2)?)
                        }
                    },
                )
            })
        }
        Expression::Multiply(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some(
                    match NumericBinaryOperands::new(a(tuple, ctx)?, b(tuple, ctx)?)? {
                        NumericBinaryOperands::Float(v1, v2) => {
                            ExpressionTerm::FloatLiteral(v1 * v2)
                        }
                        NumericBinaryOperands::Double(v1, v2) => {
                            ExpressionTerm::DoubleLiteral(v1 * v2)
                        }
                        NumericBinaryOperands::Integer(v1, v2) => {
                            ExpressionTerm::IntegerLiteral(v1.checked_mul(v2)?)
                        }
                        NumericBinaryOperands::Decimal(v1, v2) => {
                            ExpressionTerm::DecimalLiteral(v1.checked_mul(v2)?)
                        }
                    },
                )
            })
        }
        Expression::Divide(a, b) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            Rc::new(move |tuple, ctx| {
                Some(
                    match NumericBinaryOperands::new(a(tuple, ctx)?, b(tuple, ctx)?)? {
                        NumericBinaryOperands::Float(v1, v2) => {
                            ExpressionTerm::FloatLiteral(v1 / v2)
                        }
                        NumericBinaryOperands::Double(v1, v2) => {
                            ExpressionTerm::DoubleLiteral(v1 / v2)
                        }
                        NumericBinaryOperands::Integer(v1, v2) => {
                            ExpressionTerm::DecimalLiteral(Decimal::from(v1).checked_div(v2)?)
                        }
                        NumericBinaryOperands::Decimal(v1, v2) => {
                            ExpressionTerm::DecimalLiteral(v1.checked_div(v2)?)
                        }
                    },
                )
            })
        }
        Expression::UnaryPlus(e) => {
            let e = build_expression_evaluator(e, variables)?;
            Rc::new(move |tuple, ctx| {
                let value = e(tuple, ctx)?;
                value.is_numeric().then_some(value)
            })
        }
        Expression::UnaryMinus(e) => {
            let e = build_expression_evaluator(e, variables)?;
            Rc::new(move |tuple, ctx| {
                Some(match e(tuple, ctx)? {
                    ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(-value),
                    ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(-value),
                    ExpressionTerm::IntegerLiteral(value) => {
                        ExpressionTerm::IntegerLiteral(value.checked_neg()?)
                    }
                    ExpressionTerm::DecimalLiteral(value) => {
                        ExpressionTerm::DecimalLiteral(value.checked_neg()?)
                    }
                    _ => return None,
                })
            })
        }
        Expression::Not(e) => {
            let e = build_expression_evaluator(e, variables)?;
            Rc::new(move |tuple, ctx| {
                Some((!e(tuple, ctx)?.effective_boolean_value()?).into())
            })
        }
        Expression::If(a, b, c) => {
            let a = build_expression_evaluator(a, variables)?;
            let b = build_expression_evaluator(b, variables)?;
            let c = build_expression_evaluator(c, variables)?;
            Rc::new(move |tuple, ctx| {
                if a(tuple, ctx)?.effective_boolean_value()? {
                    b(tuple, ctx)
                } else {
                    c(tuple, ctx)
                }
            })
        }
        Expression::Coalesce(l) => {
            let l = l
                .iter()
                .map(|e| build_expression_evaluator(e, variables))
                .collect::<Result<Vec<_>, _>>()?;
            Rc::new(move |tuple, ctx| {
                for e in &l {
                    if let Some(result) = e(tuple, ctx) {
                        return Some(result);
                    }
                }
                None
            })
        }
        Expression::FunctionCall(function, parameters) => {
            build_function_evaluator(function, parameters, variables)?
        }
    })
}

fn build_function_evaluator(
    function: &Function,
    parameters: &[Expression],
    variables: &mut VariableTable,
) -> Result<ExpressionEvaluator, RuleSetError> {
    Ok(match function {
        Function::Str => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                Some(ExpressionTerm::StringLiteral(match e(tuple, ctx)?.into() {
                    Term::NamedNode(term) => term.into_string(),
                    Term::BlankNode(_) => return None,
                    Term::Literal(term) => term.destruct().0,
                }))
            })
        }
        Function::Lang => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                Some(ExpressionTerm::StringLiteral(match e(tuple, ctx)? {
                    ExpressionTerm::LangStringLiteral { language, .. } => language,
                    ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => return None,
                    _ => String::new(),
                }))
            })
        }
        Function::LangMatches => {
            check_arity(function, parameters, 2..=2)?;
            let language_tag = build_expression_evaluator(&parameters[0], variables)?;
            let language_range = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::StringLiteral(mut language_tag) = language_tag(tuple, ctx)?
                else {
                    return None;
                };
                language_tag.make_ascii_lowercase();
                let ExpressionTerm::StringLiteral(mut language_range) = language_range(tuple, ctx)?
                else {
                    return None;
                };
                language_range.make_ascii_lowercase();
                Some(
                    if &*language_range == "*" {
                        !language_tag.is_empty()
                    } else {
                        language_tag == language_range
                            || language_tag
                                .strip_prefix(language_range.as_str())
                                .is_some_and(|tail| tail.starts_with('-'))
                    }
                    .into(),
                )
            })
        }
        Function::Datatype => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let value = e(tuple, ctx)?;
                if matches!(
                    value,
                    ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_)
                ) {
                    return None;
                }
                let Term::Literal(literal) = Term::from(value) else {
                    return None;
                };
                Some(ExpressionTerm::NamedNode(literal.datatype().into_owned()))
            })
        }
        Function::Iri => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                Some(ExpressionTerm::NamedNode(match e(tuple, ctx)? {
                    ExpressionTerm::NamedNode(iri) => iri,
                    ExpressionTerm::StringLiteral(iri) => {
                        NamedNode::new_unchecked(Iri::parse(iri).ok()?.into_inner())
                    }
                    _ => return None,
                }))
            })
        }
        Function::BNode => {
            check_arity(function, parameters, 0..=1)?;
            match parameters.first() {
                Some(id) => {
                    let id = build_expression_evaluator(id, variables)?;
                    Rc::new(move |tuple, ctx| {
                        let ExpressionTerm::StringLiteral(id) = id(tuple, ctx)? else {
                            return None;
                        };
                        Some(ExpressionTerm::BlankNode(BlankNode::new(id).ok()?))
                    })
                }
                None => Rc::new(|_, _| Some(ExpressionTerm::BlankNode(BlankNode::default()))),
            }
        }
        Function::Rand => {
            check_arity(function, parameters, 0..=0)?;
            Rc::new(|_, _| Some(ExpressionTerm::DoubleLiteral(random::<f64>().into())))
        }
        Function::Abs => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| match e(tuple, ctx)? {
                ExpressionTerm::IntegerLiteral(value) => {
                    Some(ExpressionTerm::IntegerLiteral(value.checked_abs()?))
                }
                ExpressionTerm::DecimalLiteral(value) => {
                    Some(ExpressionTerm::DecimalLiteral(value.checked_abs()?))
                }
                ExpressionTerm::FloatLiteral(value) => {
                    Some(ExpressionTerm::FloatLiteral(value.abs()))
                }
                ExpressionTerm::DoubleLiteral(value) => {
                    Some(ExpressionTerm::DoubleLiteral(value.abs()))
                }
                _ => None,
            })
        }
        Function::Ceil => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| match e(tuple, ctx)? {
                ExpressionTerm::IntegerLiteral(value) => {
                    Some(ExpressionTerm::IntegerLiteral(value))
                }
                ExpressionTerm::DecimalLiteral(value) => {
                    Some(ExpressionTerm::DecimalLiteral(value.checked_ceil()?))
                }
                ExpressionTerm::FloatLiteral(value) => {
                    Some(ExpressionTerm::FloatLiteral(value.ceil()))
                }
                ExpressionTerm::DoubleLiteral(value) => {
                    Some(ExpressionTerm::DoubleLiteral(value.ceil()))
                }
                _ => None,
            })
        }
        Function::Floor => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| match e(tuple, ctx)? {
                ExpressionTerm::IntegerLiteral(value) => {
                    Some(ExpressionTerm::IntegerLiteral(value))
                }
                ExpressionTerm::DecimalLiteral(value) => {
                    Some(ExpressionTerm::DecimalLiteral(value.checked_floor()?))
                }
                ExpressionTerm::FloatLiteral(value) => {
                    Some(ExpressionTerm::FloatLiteral(value.floor()))
                }
                ExpressionTerm::DoubleLiteral(value) => {
                    Some(ExpressionTerm::DoubleLiteral(value.floor()))
                }
                _ => None,
            })
        }
        Function::Round => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| match e(tuple, ctx)? {
                ExpressionTerm::IntegerLiteral(value) => {
                    Some(ExpressionTerm::IntegerLiteral(value))
                }
                ExpressionTerm::DecimalLiteral(value) => {
                    Some(ExpressionTerm::DecimalLiteral(value.checked_round()?))
                }
                ExpressionTerm::FloatLiteral(value) => {
                    Some(ExpressionTerm::FloatLiteral(value.round()))
                }
                ExpressionTerm::DoubleLiteral(value) => {
                    Some(ExpressionTerm::DoubleLiteral(value.round()))
                }
                _ => None,
            })
        }
        Function::Concat => {
            let l = parameters
                .iter()
                .map(|e| build_expression_evaluator(e, variables))
                .collect::<Result<Vec<_>, _>>()?;
            Rc::new(move |tuple, ctx| {
                let mut result = String::default();
                let mut language = None;
                for e in &l {
                    let (value, e_language) = to_string_and_language(e(tuple, ctx)?)?;
                    if let Some(lang) = &language {
                        if *lang != e_language {
                            language = Some(None)
                        }
                    } else {
                        language = Some(e_language)
                    }
                    result += &value
                }
                Some(build_plain_literal(result, language.flatten()))
            })
        }
        Function::SubStr => {
            check_arity(function, parameters, 2..=3)?;
            let source = build_expression_evaluator(&parameters[0], variables)?;
            let starting_loc = build_expression_evaluator(&parameters[1], variables)?;
            let length = parameters
                .get(2)
                .map(|l| build_expression_evaluator(l, variables))
                .transpose()?;
            Rc::new(move |tuple, ctx| {
                let (source, language) = to_string_and_language(source(tuple, ctx)?)?;
                let ExpressionTerm::IntegerLiteral(starting_location) = starting_loc(tuple, ctx)?
                else {
                    return None;
                };
                let starting_location = usize::try_from(i64::from(starting_location)).ok()?;
                let length = if let Some(length) = &length {
                    let ExpressionTerm::IntegerLiteral(length) = length(tuple, ctx)? else {
                        return None;
                    };
                    Some(usize::try_from(i64::from(length)).ok()?)
                } else {
                    None
                };

                // We want to slice on char indices, not byte indices
                let mut start_iter = source
                    .char_indices()
                    .skip(starting_location.checked_sub(1)?)
                    .peekable();
                let result = if let Some((start_position, _)) = start_iter.peek().copied() {
                    if let Some(length) = length {
                        let mut end_iter = start_iter.skip(length).peekable();
                        if let Some((end_position, _)) = end_iter.peek() {
                            &source[start_position..*end_position]
                        } else {
                            &source[start_position..]
                        }
                    } else {
                        &source[start_position..]
                    }
                } else {
                    ""
                };
                Some(build_plain_literal(result.into(), language))
            })
        }
        Function::StrLen => {
            check_arity(function, parameters, 1..=1)?;
            let arg = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let (string, _) = to_string_and_language(arg(tuple, ctx)?)?;
                Some(ExpressionTerm::IntegerLiteral(
                    i64::try_from(string.chars().count()).ok()?.into(),
                ))
            })
        }
        Function::Replace => {
            check_arity(function, parameters, 3..=4)?;
            let arg = build_expression_evaluator(&parameters[0], variables)?;
            let replacement = build_expression_evaluator(&parameters[2], variables)?;
            if let Some(regex) = compile_static_pattern_if_exists(&parameters[1], parameters.get(3))
            {
                Rc::new(move |tuple, ctx| {
                    let (text, language) = to_string_and_language(arg(tuple, ctx)?)?;
                    let ExpressionTerm::StringLiteral(replacement) = replacement(tuple, ctx)?
                    else {
                        return None;
                    };
                    Some(build_plain_literal(
                        match regex.replace_all(&text, replacement.as_str()) {
                            Cow::Owned(replaced) => replaced,
                            Cow::Borrowed(_) => text,
                        },
                        language,
                    ))
                })
            } else {
                let pattern = build_expression_evaluator(&parameters[1], variables)?;
                let flags = parameters
                    .get(3)
                    .map(|flags| build_expression_evaluator(flags, variables))
                    .transpose()?;
                Rc::new(move |tuple, ctx| {
                    let ExpressionTerm::StringLiteral(pattern) = pattern(tuple, ctx)? else {
                        return None;
                    };
                    let options = if let Some(flags) = &flags {
                        let ExpressionTerm::StringLiteral(options) = flags(tuple, ctx)? else {
                            return None;
                        };
                        Some(options)
                    } else {
                        None
                    };
                    let regex = compile_pattern(&pattern, options.as_deref())?;
                    let (text, language) = to_string_and_language(arg(tuple, ctx)?)?;
                    let ExpressionTerm::StringLiteral(replacement) = replacement(tuple, ctx)?
                    else {
                        return None;
                    };
                    Some(build_plain_literal(
                        match regex.replace_all(&text, replacement.as_str()) {
                            Cow::Owned(replaced) => replaced,
                            Cow::Borrowed(_) => text,
                        },
                        language,
                    ))
                })
            }
        }
        Function::UCase => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let (value, language) = to_string_and_language(e(tuple, ctx)?)?;
                Some(build_plain_literal(value.to_uppercase(), language))
            })
        }
        Function::LCase => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let (value, language) = to_string_and_language(e(tuple, ctx)?)?;
                Some(build_plain_literal(value.to_lowercase(), language))
            })
        }
        Function::Contains => {
            check_arity(function, parameters, 2..=2)?;
            let arg1 = build_expression_evaluator(&parameters[0], variables)?;
            let arg2 = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let (arg1, arg2, _) =
                    to_argument_compatible_strings(arg1(tuple, ctx)?, arg2(tuple, ctx)?)?;
                Some(arg1.contains(arg2.as_str()).into())
            })
        }
        Function::StrStarts => {
            check_arity(function, parameters, 2..=2)?;
            let arg1 = build_expression_evaluator(&parameters[0], variables)?;
            let arg2 = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let (arg1, arg2, _) =
                    to_argument_compatible_strings(arg1(tuple, ctx)?, arg2(tuple, ctx)?)?;
                Some(arg1.starts_with(arg2.as_str()).into())
            })
        }
        Function::StrEnds => {
            check_arity(function, parameters, 2..=2)?;
            let arg1 = build_expression_evaluator(&parameters[0], variables)?;
            let arg2 = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let (arg1, arg2, _) =
                    to_argument_compatible_strings(arg1(tuple, ctx)?, arg2(tuple, ctx)?)?;
                Some(arg1.ends_with(arg2.as_str()).into())
            })
        }
        Function::StrBefore => {
            check_arity(function, parameters, 2..=2)?;
            let arg1 = build_expression_evaluator(&parameters[0], variables)?;
            let arg2 = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let (arg1, arg2, language) =
                    to_argument_compatible_strings(arg1(tuple, ctx)?, arg2(tuple, ctx)?)?;
                Some(if let Some(position) = arg1.find(arg2.as_str()) {
                    build_plain_literal(arg1[..position].into(), language)
                } else {
                    ExpressionTerm::StringLiteral(String::new())
                })
            })
        }
        Function::StrAfter => {
            check_arity(function, parameters, 2..=2)?;
            let arg1 = build_expression_evaluator(&parameters[0], variables)?;
            let arg2 = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let (arg1, arg2, language) =
                    to_argument_compatible_strings(arg1(tuple, ctx)?, arg2(tuple, ctx)?)?;
                Some(if let Some(position) = arg1.find(arg2.as_str()) {
                    build_plain_literal(arg1[position + arg2.len()..].into(), language)
                } else {
                    ExpressionTerm::StringLiteral(String::new())
                })
            })
        }
        Function::Year => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::DateTimeLiteral(date_time) = e(tuple, ctx)? else {
                    return None;
                };
                Some(ExpressionTerm::IntegerLiteral(date_time.year().into()))
            })
        }
        Function::Month => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::DateTimeLiteral(date_time) = e(tuple, ctx)? else {
                    return None;
                };
                Some(ExpressionTerm::IntegerLiteral(
                    i64::from(date_time.month()).into(),
                ))
            })
        }
        Function::Day => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::DateTimeLiteral(date_time) = e(tuple, ctx)? else {
                    return None;
                };
                Some(ExpressionTerm::IntegerLiteral(
                    i64::from(date_time.day()).into(),
                ))
            })
        }
        Function::Hours => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::DateTimeLiteral(date_time) = e(tuple, ctx)? else {
                    return None;
                };
                Some(ExpressionTerm::IntegerLiteral(
                    i64::from(date_time.hour()).into(),
                ))
            })
        }
        Function::Minutes => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::DateTimeLiteral(date_time) = e(tuple, ctx)? else {
                    return None;
                };
                Some(ExpressionTerm::IntegerLiteral(
                    i64::from(date_time.minute()).into(),
                ))
            })
        }
        Function::Seconds => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::DateTimeLiteral(date_time) = e(tuple, ctx)? else {
                    return None;
                };
                Some(ExpressionTerm::DecimalLiteral(date_time.second()))
            })
        }
        Function::Now => {
            check_arity(function, parameters, 0..=0)?;
            Rc::new(|_, ctx| Some(ExpressionTerm::DateTimeLiteral(ctx.now)))
        }
        Function::Md5 => build_hash_expression_evaluator::<Md5>(function, parameters, variables)?,
        Function::Sha1 => build_hash_expression_evaluator::<Sha1>(function, parameters, variables)?,
        Function::Sha256 => {
            build_hash_expression_evaluator::<Sha256>(function, parameters, variables)?
        }
        Function::Sha384 => {
            build_hash_expression_evaluator::<Sha384>(function, parameters, variables)?
        }
        Function::Sha512 => {
            build_hash_expression_evaluator::<Sha512>(function, parameters, variables)?
        }
        Function::StrLang => {
            check_arity(function, parameters, 2..=2)?;
            let lexical_form = build_expression_evaluator(&parameters[0], variables)?;
            let lang_tag = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::StringLiteral(value) = lexical_form(tuple, ctx)? else {
                    return None;
                };
                let ExpressionTerm::StringLiteral(language) = lang_tag(tuple, ctx)? else {
                    return None;
                };
                Some(
                    Term::from(Literal::new_language_tagged_literal(value, language).ok()?).into(),
                )
            })
        }
        Function::StrDt => {
            check_arity(function, parameters, 2..=2)?;
            let lexical_form = build_expression_evaluator(&parameters[0], variables)?;
            let datatype = build_expression_evaluator(&parameters[1], variables)?;
            Rc::new(move |tuple, ctx| {
                let ExpressionTerm::StringLiteral(value) = lexical_form(tuple, ctx)? else {
                    return None;
                };
                let ExpressionTerm::NamedNode(datatype) = datatype(tuple, ctx)? else {
                    return None;
                };
                Some(Term::from(Literal::new_typed_literal(value, datatype)).into())
            })
        }
        Function::IsIri => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                Some(matches!(e(tuple, ctx)?, ExpressionTerm::NamedNode(_)).into())
            })
        }
        Function::IsBlank => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                Some(matches!(e(tuple, ctx)?, ExpressionTerm::BlankNode(_)).into())
            })
        }
        Function::IsLiteral => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| {
                Some(
                    (!matches!(
                        e(tuple, ctx)?,
                        ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_)
                    ))
                    .into(),
                )
            })
        }
        Function::IsNumeric => {
            check_arity(function, parameters, 1..=1)?;
            let e = build_expression_evaluator(&parameters[0], variables)?;
            Rc::new(move |tuple, ctx| Some(e(tuple, ctx)?.is_numeric().into()))
        }
        Function::Regex => {
            check_arity(function, parameters, 2..=3)?;
            let text = build_expression_evaluator(&parameters[0], variables)?;
            if let Some(regex) = compile_static_pattern_if_exists(&parameters[1], parameters.get(2))
            {
                Rc::new(move |tuple, ctx| {
                    let (text, _) = to_string_and_language(text(tuple, ctx)?)?;
                    Some(regex.is_match(&text).into())
                })
            } else {
                let pattern = build_expression_evaluator(&parameters[1], variables)?;
                let flags = parameters
                    .get(2)
                    .map(|flags| build_expression_evaluator(flags, variables))
                    .transpose()?;
                Rc::new(move |tuple, ctx| {
                    let ExpressionTerm::StringLiteral(pattern) = pattern(tuple, ctx)? else {
                        return None;
                    };
                    let options = if let Some(flags) = &flags {
                        let ExpressionTerm::StringLiteral(options) = flags(tuple, ctx)? else {
                            return None;
                        };
                        Some(options)
                    } else {
                        None
                    };
                    let regex = compile_pattern(&pattern, options.as_deref())?;
                    let (text, _) = to_string_and_language(text(tuple, ctx)?)?;
                    Some(regex.is_match(&text).into())
                })
            }
        }
    })
}

fn build_hash_expression_evaluator<H: Digest>(
    function: &Function,
    parameters: &[Expression],
    variables: &mut VariableTable,
) -> Result<ExpressionEvaluator, RuleSetError> {
    check_arity(function, parameters, 1..=1)?;
    let arg = build_expression_evaluator(&parameters[0], variables)?;
    Ok(Rc::new(move |tuple, ctx| {
        let ExpressionTerm::StringLiteral(input) = arg(tuple, ctx)? else {
            return None;
        };
        let hash = hex::encode(H::new().chain_update(input.as_str()).finalize());
        Some(ExpressionTerm::StringLiteral(hash))
    }))
}

fn check_arity(
    function: &Function,
    parameters: &[Expression],
    expected: RangeInclusive<usize>,
) -> Result<(), RuleSetError> {
    if expected.contains(&parameters.len()) {
        Ok(())
    } else {
        Err(RuleSetError::InvalidFunctionArity {
            name: function.clone(),
            expected,
            actual: parameters.len(),
        })
    }
}

fn to_string_and_language(term: ExpressionTerm) -> Option<(String, Option<String>)> {
    match term {
        ExpressionTerm::StringLiteral(value) => Some((value, None)),
        ExpressionTerm::LangStringLiteral { value, language } => Some((value, Some(language))),
        _ => None,
    }
}

fn build_plain_literal(value: String, language: Option<String>) -> ExpressionTerm {
    if let Some(language) = language {
        ExpressionTerm::LangStringLiteral { value, language }
    } else {
        ExpressionTerm::StringLiteral(value)
    }
}

fn to_argument_compatible_strings(
    arg1: ExpressionTerm,
    arg2: ExpressionTerm,
) -> Option<(String, String, Option<String>)> {
    let (value1, language1) = to_string_and_language(arg1)?;
    let (value2, language2) = to_string_and_language(arg2)?;
    (language2.is_none() || language1 == language2).then_some((value1, value2, language1))
}

fn compile_static_pattern_if_exists(
    pattern: &Expression,
    options: Option<&Expression>,
) -> Option<Regex> {
    let static_pattern = if let Expression::Literal(pattern) = pattern {
        (pattern.datatype() == srlrdf::vocab::xsd::STRING).then(|| pattern.value())
    } else {
        None
    };
    let static_options = if let Some(options) = options {
        if let Expression::Literal(options) = options {
            (options.datatype() == srlrdf::vocab::xsd::STRING).then(|| Some(options.value()))
        } else {
            None
        }
    } else {
        Some(None)
    };
    if let (Some(static_pattern), Some(static_options)) = (static_pattern, static_options) {
        compile_pattern(static_pattern, static_options)
    } else {
        None
    }
}

fn compile_pattern(pattern: &str, flags: Option<&str>) -> Option<Regex> {
    let mut pattern = Cow::Borrowed(pattern);
    let flags = flags.unwrap_or_default();
    if flags.contains('q') {
        pattern = regex::escape(&pattern).into();
    }
    let mut regex_builder = RegexBuilder::new(&pattern);
    regex_builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            's' => {
                regex_builder.dot_matches_new_line(true);
            }
            'm' => {
                regex_builder.multi_line(true);
            }
            'i' => {
                regex_builder.case_insensitive(true);
            }
            'x' => {
                regex_builder.ignore_whitespace(true);
            }
            'q' => (),        // Already handled above
            _ => return None, // invalid option
        }
    }
    regex_builder.build().ok()
}

/// Equality operator (=)
fn equals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<bool> {
    match a {
        ExpressionTerm::NamedNode(_)
        | ExpressionTerm::BlankNode(_)
        | ExpressionTerm::LangStringLiteral { .. } => Some(a == b),
        ExpressionTerm::StringLiteral(a) => match b {
            ExpressionTerm::StringLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::OtherTypedLiteral { .. } => match b {
            ExpressionTerm::OtherTypedLiteral { .. } if a == b => Some(true),
            ExpressionTerm::NamedNode(_)
            | ExpressionTerm::BlankNode(_)
            | ExpressionTerm::LangStringLiteral { .. } => Some(false),
            _ => None,
        },
        ExpressionTerm::BooleanLiteral(a) => match b {
            ExpressionTerm::BooleanLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::IntegerLiteral(a) => match b {
            ExpressionTerm::IntegerLiteral(b) => Some(a == b),
            ExpressionTerm::DecimalLiteral(b) => Some(Decimal::from(*a) == *b),
            ExpressionTerm::FloatLiteral(b) => Some(Float::from(*a) == *b),
            ExpressionTerm::DoubleLiteral(b) => Some(Double::from(*a) == *b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::DecimalLiteral(a) => match b {
            ExpressionTerm::IntegerLiteral(b) => Some(*a == Decimal::from(*b)),
            ExpressionTerm::DecimalLiteral(b) => Some(a == b),
            ExpressionTerm::FloatLiteral(b) => Some(Float::from(*a) == *b),
            ExpressionTerm::DoubleLiteral(b) => Some(Double::from(*a) == *b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::FloatLiteral(a) => match b {
            ExpressionTerm::IntegerLiteral(b) => Some(*a == Float::from(*b)),
            ExpressionTerm::DecimalLiteral(b) => Some(*a == Float::from(*b)),
            ExpressionTerm::FloatLiteral(b) => Some(a == b),
            ExpressionTerm::DoubleLiteral(b) => Some(Double::from(*a) == *b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::DoubleLiteral(a) => match b {
            ExpressionTerm::IntegerLiteral(b) => Some(*a == Double::from(*b)),
            ExpressionTerm::DecimalLiteral(b) => Some(*a == Double::from(*b)),
            ExpressionTerm::FloatLiteral(b) => Some(*a == Double::from(*b)),
            ExpressionTerm::DoubleLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::DateTimeLiteral(a) => match b {
            ExpressionTerm::DateTimeLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
    }
}

/// Comparison for <, >, <= and >= operators
fn partial_cmp(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    match (a, b) {
        (ExpressionTerm::StringLiteral(a), ExpressionTerm::StringLiteral(b)) => Some(a.cmp(b)),
        (ExpressionTerm::BooleanLiteral(a), ExpressionTerm::BooleanLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::DateTimeLiteral(a), ExpressionTerm::DateTimeLiteral(b)) => {
            a.partial_cmp(b)
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            match NumericBinaryOperands::new(a.clone(), b.clone())? {
                NumericBinaryOperands::Float(v1, v2) => v1.partial_cmp(&v2),
                NumericBinaryOperands::Double(v1, v2) => v1.partial_cmp(&v2),
                NumericBinaryOperands::Integer(v1, v2) => v1.partial_cmp(&v2),
                NumericBinaryOperands::Decimal(v1, v2) => v1.partial_cmp(&v2),
            }
        }
        _ => None,
    }
}

/// Numeric operands promoted to their least common type.
///
/// The promotion lattice is integer ⊂ decimal ⊂ float ⊂ double.
enum NumericBinaryOperands {
    Float(Float, Float),
    Double(Double, Double),
    Integer(Integer, Integer),
    Decimal(Decimal, Decimal),
}

impl NumericBinaryOperands {
    fn new(a: ExpressionTerm, b: ExpressionTerm) -> Option<Self> {
        match (a, b) {
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Float(v1, v2))
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1.into(), v2))
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Float(v1, v2.into()))
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Float(v1, v2.into()))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Double(v1, v2.into()))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1, v2))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Double(v1, v2.into()))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Double(v1, v2.into()))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Float(v1.into(), v2))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1.into(), v2))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Integer(v1, v2))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Decimal(v1.into(), v2))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Float(v1.into(), v2))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1.into(), v2))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Decimal(v1, v2.into()))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Decimal(v1, v2))
            }
            _ => None,
        }
    }
}
