use crate::algebra::BodyElement;
use crate::term::TriplePattern;
use srlrdf::NamedNode;
use std::fmt;

/// A set of if/then rules, the unit consumed by the engine.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct RuleSet {
    /// Prefix label to IRI bindings, kept for information only: the AST uses
    /// resolved IRIs everywhere.
    pub prefixes: Vec<(String, NamedNode)>,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Formats using the [SPARQL S-Expression syntax](https://jena.apache.org/documentation/notes/sse.html).
    pub fn to_sse(&self) -> String {
        let mut buffer = String::new();
        self.fmt_sse(&mut buffer)
            .expect("Unexpected error during SSE formatting");
        buffer
    }

    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(")?;
        for (i, r) in self.rules.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            r.fmt_sse(f)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (prefix, iri) in &self.prefixes {
            writeln!(f, "PREFIX {prefix}: {iri}")?;
        }
        for r in &self.rules {
            writeln!(f, "{r}")?;
        }
        Ok(())
    }
}

impl From<Vec<Rule>> for RuleSet {
    #[inline]
    fn from(rules: Vec<Rule>) -> Self {
        Self {
            prefixes: Vec::new(),
            rules,
        }
    }
}

/// An if/then rule.
///
/// The head is a non-empty list of triple templates emitted for every solution
/// of the body pattern.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Rule {
    /// The construction template.
    pub head: Vec<TriplePattern>,
    /// The rule body pattern, evaluated left to right.
    pub body: Vec<BodyElement>,
}

impl Rule {
    /// Formats using the [SPARQL S-Expression syntax](https://jena.apache.org/documentation/notes/sse.html).
    pub fn to_sse(&self) -> String {
        let mut buffer = String::new();
        self.fmt_sse(&mut buffer)
            .expect("Unexpected error during SSE formatting");
        buffer
    }

    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(rule (")?;
        for (i, t) in self.head.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            t.fmt_sse(f)?;
        }
        write!(f, ") (")?;
        for (i, e) in self.body.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            e.fmt_sse(f)?;
        }
        write!(f, "))")
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RULE {{")?;
        for triple in &self.head {
            write!(f, " {triple} .")?;
        }
        write!(f, " }} WHERE {{")?;
        for element in &self.body {
            write!(f, " {element}")?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srlrdf::Variable;

    #[test]
    fn rule_display_round_shape() {
        let parent = NamedNode::new_unchecked("http://example.com/parent");
        let ancestor = NamedNode::new_unchecked("http://example.com/ancestor");
        let x = Variable::new_unchecked("x");
        let y = Variable::new_unchecked("y");
        let rule = Rule {
            head: vec![TriplePattern::new(x.clone(), ancestor, y.clone())],
            body: vec![BodyElement::TriplePattern(TriplePattern::new(
                x, parent, y,
            ))],
        };
        assert_eq!(
            rule.to_string(),
            "RULE { ?x <http://example.com/ancestor> ?y . } WHERE { ?x <http://example.com/parent> ?y . }"
        );
        assert_eq!(
            rule.to_sse(),
            "(rule ((triple ?x <http://example.com/ancestor> ?y)) ((triple ?x <http://example.com/parent> ?y)))"
        );
    }
}
