//! In-memory implementation of [RDF graphs](https://www.w3.org/TR/rdf11-concepts/#dfn-graph).

use crate::named_node::NamedNode;
use crate::triple::{NamedOrBlankNode, Term, Triple};
use std::collections::HashMap;
use std::fmt;

/// An in-memory [RDF graph](https://www.w3.org/TR/rdf11-concepts/#dfn-graph).
///
/// It is a set of triples: inserting an already present triple is a no-op.
/// Iteration order is the insertion order, which keeps evaluation results stable.
/// Lookups by subject and by predicate are backed by hash indexes.
///
/// Usage example:
/// ```
/// use srlrdf::*;
///
/// let mut graph = Graph::new();
///
/// // insertion
/// let ex = NamedNode::new("http://example.com")?;
/// let triple = Triple::new(ex.clone(), ex.clone(), ex.clone());
/// graph.insert(triple.clone());
///
/// // simple filter
/// let results: Vec<_> = graph.triples_for_subject(&ex.into()).collect();
/// assert_eq!(vec![&triple], results);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct Graph {
    slots: Vec<Option<Triple>>,
    positions: HashMap<Triple, usize>,
    by_subject: HashMap<NamedOrBlankNode, Vec<usize>>,
    by_predicate: HashMap<NamedNode, Vec<usize>>,
}

impl Graph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all the triples contained by the graph, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Returns all the triples with the given subject.
    pub fn triples_for_subject<'a>(
        &'a self,
        subject: &NamedOrBlankNode,
    ) -> impl Iterator<Item = &'a Triple> + 'a {
        self.by_subject
            .get(subject)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.slots[i].as_ref())
    }

    /// Returns all the triples with the given predicate.
    pub fn triples_for_predicate<'a>(
        &'a self,
        predicate: &NamedNode,
    ) -> impl Iterator<Item = &'a Triple> + 'a {
        self.by_predicate
            .get(predicate)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.slots[i].as_ref())
    }

    /// Returns all the triples matching the given pattern, `None` being a wildcard.
    ///
    /// The scan is driven by the predicate index when the predicate is given,
    /// else by the subject index when the subject is given, else it is a full scan.
    pub fn triples_matching<'a>(
        &'a self,
        subject: Option<&'a NamedOrBlankNode>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = &'a Triple> + 'a> {
        let candidates: Box<dyn Iterator<Item = &'a Triple> + 'a> = if let Some(predicate) =
            predicate
        {
            Box::new(self.triples_for_predicate(predicate))
        } else if let Some(subject) = subject {
            Box::new(self.triples_for_subject(subject))
        } else {
            Box::new(self.iter())
        };
        Box::new(candidates.filter(move |t| {
            subject.map_or(true, |s| t.subject == *s)
                && predicate.map_or(true, |p| t.predicate == *p)
                && object.map_or(true, |o| t.object == *o)
        }))
    }

    /// Checks if the graph contains the given triple.
    pub fn contains(&self, triple: &Triple) -> bool {
        self.positions.contains_key(triple)
    }

    /// Returns the number of triples in this graph.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Checks if this graph contains no triple.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Adds a triple to the graph, returning whether it was newly added.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.positions.contains_key(&triple) {
            return false;
        }
        let position = self.slots.len();
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(position);
        self.by_predicate
            .entry(triple.predicate.clone())
            .or_default()
            .push(position);
        self.positions.insert(triple.clone(), position);
        self.slots.push(Some(triple));
        true
    }

    /// Removes a concrete triple from the graph, returning whether it was present.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        let Some(position) = self.positions.remove(triple) else {
            return false;
        };
        if let Some(positions) = self.by_subject.get_mut(&triple.subject) {
            positions.retain(|&i| i != position);
        }
        if let Some(positions) = self.by_predicate.get_mut(&triple.predicate) {
            positions.retain(|&i| i != position);
        }
        self.slots[position] = None;
        true
    }

    /// Clears the graph.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.positions.clear();
        self.by_subject.clear();
        self.by_predicate.clear();
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|t| other.contains(t))
    }
}

impl Eq for Graph {}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = Box<dyn Iterator<Item = &'a Triple> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut g = Self::new();
        g.extend(iter);
        g
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        for triple in iter {
            self.insert(triple);
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for triple in self.iter() {
            writeln!(f, "{triple} .")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Literal;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    #[test]
    fn insert_is_set_semantics() {
        let mut graph = Graph::new();
        let t = Triple::new(ex("s"), ex("p"), ex("o"));
        assert!(graph.insert(t.clone()));
        assert!(!graph.insert(t));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn matching_uses_wildcards() {
        let mut graph = Graph::new();
        graph.insert(Triple::new(ex("a"), ex("p"), ex("b")));
        graph.insert(Triple::new(ex("a"), ex("q"), Literal::from("v")));
        graph.insert(Triple::new(ex("b"), ex("p"), ex("c")));

        assert_eq!(
            graph
                .triples_matching(None, Some(&ex("p")), None)
                .count(),
            2
        );
        let a = NamedOrBlankNode::from(ex("a"));
        assert_eq!(graph.triples_matching(Some(&a), None, None).count(), 2);
        assert_eq!(
            graph
                .triples_matching(Some(&a), Some(&ex("p")), Some(&ex("b").into()))
                .count(),
            1
        );
        assert_eq!(graph.triples_matching(None, None, None).count(), 3);
    }

    #[test]
    fn remove_keeps_indexes_consistent() {
        let mut graph = Graph::new();
        let t1 = Triple::new(ex("a"), ex("p"), ex("b"));
        let t2 = Triple::new(ex("a"), ex("p"), ex("c"));
        graph.insert(t1.clone());
        graph.insert(t2.clone());
        assert!(graph.remove(&t1));
        assert!(!graph.remove(&t1));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.triples_for_predicate(&ex("p")).count(), 1);
        assert_eq!(graph.iter().collect::<Vec<_>>(), vec![&t2]);
    }

    #[test]
    fn set_equality_ignores_insertion_order() {
        let t1 = Triple::new(ex("a"), ex("p"), ex("b"));
        let t2 = Triple::new(ex("b"), ex("p"), ex("c"));
        let g1: Graph = [t1.clone(), t2.clone()].into_iter().collect();
        let g2: Graph = [t2, t1].into_iter().collect();
        assert_eq!(g1, g2);
    }
}
