//! Typed internal representation of RDF terms used by the expression evaluator.
//!
//! Literals of the XSD datatypes the engine computes with are parsed into
//! their value space once, when a term enters the evaluator. A literal whose
//! lexical form is invalid for its datatype stays an
//! [`ExpressionTerm::OtherTypedLiteral`] and only supports term-level
//! operations.

use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer};
use srlrdf::{BlankNode, Literal, NamedNode, Term};

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionTerm {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    StringLiteral(String),
    LangStringLiteral { value: String, language: String },
    BooleanLiteral(Boolean),
    IntegerLiteral(Integer),
    DecimalLiteral(Decimal),
    FloatLiteral(Float),
    DoubleLiteral(Double),
    DateTimeLiteral(DateTime),
    OtherTypedLiteral { value: String, datatype: NamedNode },
}

impl From<Term> for ExpressionTerm {
    #[inline]
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(t) => Self::NamedNode(t),
            Term::BlankNode(t) => Self::BlankNode(t),
            Term::Literal(t) => {
                let (value, datatype, language) = t.destruct();
                if let Some(language) = language {
                    Self::LangStringLiteral { value, language }
                } else if let Some(datatype) = datatype {
                    parse_typed_literal(&value, datatype.as_str())
                        .unwrap_or(Self::OtherTypedLiteral { value, datatype })
                } else {
                    Self::StringLiteral(value)
                }
            }
        }
    }
}

impl From<ExpressionTerm> for Term {
    #[inline]
    fn from(term: ExpressionTerm) -> Self {
        match term {
            ExpressionTerm::NamedNode(t) => t.into(),
            ExpressionTerm::BlankNode(t) => t.into(),
            ExpressionTerm::StringLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::LangStringLiteral { value, language } => {
                Literal::new_language_tagged_literal_unchecked(value, language).into()
            }
            ExpressionTerm::BooleanLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::IntegerLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DecimalLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::FloatLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DoubleLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DateTimeLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::OtherTypedLiteral { value, datatype } => {
                Literal::new_typed_literal(value, datatype).into()
            }
        }
    }
}

impl From<NamedNode> for ExpressionTerm {
    #[inline]
    fn from(term: NamedNode) -> Self {
        Self::NamedNode(term)
    }
}

impl From<bool> for ExpressionTerm {
    #[inline]
    fn from(value: bool) -> Self {
        Self::BooleanLiteral(value.into())
    }
}

impl ExpressionTerm {
    /// Computes the term [effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv).
    ///
    /// `None` is the error value: IRIs, blank nodes and unparseable literals
    /// have no effective boolean value.
    pub(crate) fn effective_boolean_value(&self) -> Option<bool> {
        match self {
            Self::BooleanLiteral(value) => Some((*value).into()),
            Self::StringLiteral(value) => Some(!value.is_empty()),
            Self::IntegerLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DecimalLiteral(value) => Some(Boolean::from(*value).into()),
            Self::FloatLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DoubleLiteral(value) => Some(Boolean::from(*value).into()),
            Self::NamedNode(_)
            | Self::BlankNode(_)
            | Self::LangStringLiteral { .. }
            | Self::DateTimeLiteral(_)
            | Self::OtherTypedLiteral { .. } => None,
        }
    }

    pub(crate) fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::IntegerLiteral(_)
                | Self::DecimalLiteral(_)
                | Self::FloatLiteral(_)
                | Self::DoubleLiteral(_)
        )
    }
}

fn parse_typed_literal(value: &str, datatype: &str) -> Option<ExpressionTerm> {
    Some(match datatype {
        "http://www.w3.org/2001/XMLSchema#boolean" => {
            ExpressionTerm::BooleanLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#string" => ExpressionTerm::StringLiteral(value.into()),
        "http://www.w3.org/2001/XMLSchema#float" => {
            ExpressionTerm::FloatLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#double" => {
            ExpressionTerm::DoubleLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#decimal" => {
            ExpressionTerm::DecimalLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#integer"
        | "http://www.w3.org/2001/XMLSchema#byte"
        | "http://www.w3.org/2001/XMLSchema#short"
        | "http://www.w3.org/2001/XMLSchema#int"
        | "http://www.w3.org/2001/XMLSchema#long"
        | "http://www.w3.org/2001/XMLSchema#unsignedByte"
        | "http://www.w3.org/2001/XMLSchema#unsignedShort"
        | "http://www.w3.org/2001/XMLSchema#unsignedInt"
        | "http://www.w3.org/2001/XMLSchema#unsignedLong"
        | "http://www.w3.org/2001/XMLSchema#positiveInteger"
        | "http://www.w3.org/2001/XMLSchema#negativeInteger"
        | "http://www.w3.org/2001/XMLSchema#nonPositiveInteger"
        | "http://www.w3.org/2001/XMLSchema#nonNegativeInteger" => {
            ExpressionTerm::IntegerLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#dateTime"
        | "http://www.w3.org/2001/XMLSchema#dateTimeStamp" => {
            ExpressionTerm::DateTimeLiteral(value.parse().ok()?)
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use srlrdf::vocab::xsd;

    #[test]
    fn typed_literals_are_parsed() {
        let term = Term::from(Literal::new_typed_literal("042", xsd::INTEGER));
        assert_eq!(
            ExpressionTerm::from(term),
            ExpressionTerm::IntegerLiteral(42_i64.into())
        );
    }

    #[test]
    fn invalid_lexical_forms_are_kept_opaque() {
        let term = Term::from(Literal::new_typed_literal("forty-two", xsd::INTEGER));
        assert!(matches!(
            ExpressionTerm::from(term),
            ExpressionTerm::OtherTypedLiteral { .. }
        ));
    }

    #[test]
    fn ebv() {
        assert_eq!(
            ExpressionTerm::StringLiteral(String::new()).effective_boolean_value(),
            Some(false)
        );
        assert_eq!(
            ExpressionTerm::IntegerLiteral(0_i64.into()).effective_boolean_value(),
            Some(false)
        );
        assert_eq!(
            ExpressionTerm::DoubleLiteral(f64::NAN.into()).effective_boolean_value(),
            Some(false)
        );
        assert_eq!(
            ExpressionTerm::from(true).effective_boolean_value(),
            Some(true)
        );
        assert_eq!(
            ExpressionTerm::NamedNode(NamedNode::new_unchecked("http://example.com"))
                .effective_boolean_value(),
            None
        );
    }
}
