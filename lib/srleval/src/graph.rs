//! The graph abstraction the engine evaluates against.

use srlrdf::{Graph, NamedNode, NamedOrBlankNode, Term, Triple};

/// A mutable set of triples with pattern-indexed lookup.
///
/// The engine owns the adapter exclusively for the duration of an evaluation:
/// it reads a frozen snapshot while computing a derivation round and inserts
/// the new triples only between rounds.
///
/// [`srlrdf::Graph`] is the natural in-memory implementation, but any adapter
/// honoring the set semantics of [`insert`](GraphAdapter::insert) works.
pub trait GraphAdapter {
    /// Checks if the graph contains the given triple.
    fn contains(&self, triple: &Triple) -> bool;

    /// Adds a triple, returning whether it was newly added.
    fn insert(&mut self, triple: Triple) -> bool;

    /// Number of triples in the graph.
    fn len(&self) -> usize;

    /// Checks if the graph contains no triple.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All the triples of the graph, in a stable order.
    fn triples(&self) -> Box<dyn Iterator<Item = Triple> + '_>;

    /// All the triples matching the given pattern, `None` being a wildcard.
    fn triples_matching<'a>(
        &'a self,
        subject: Option<&'a NamedOrBlankNode>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Triple> + 'a>;
}

impl GraphAdapter for Graph {
    fn contains(&self, triple: &Triple) -> bool {
        self.contains(triple)
    }

    fn insert(&mut self, triple: Triple) -> bool {
        self.insert(triple)
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }

    fn triples(&self) -> Box<dyn Iterator<Item = Triple> + '_> {
        Box::new(self.iter().cloned())
    }

    fn triples_matching<'a>(
        &'a self,
        subject: Option<&'a NamedOrBlankNode>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Triple> + 'a> {
        Box::new(Graph::triples_matching(self, subject, predicate, object).cloned())
    }
}
