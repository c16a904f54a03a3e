#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]

mod blank_node;
pub mod graph;
mod literal;
mod named_node;
mod triple;
mod variable;
pub mod vocab;

pub use crate::blank_node::{BlankNode, BlankNodeIdParseError};
pub use crate::graph::Graph;
pub use crate::literal::Literal;
pub use crate::named_node::{NamedNode, NamedNodeRef};
pub use crate::triple::{NamedOrBlankNode, Term, Triple, TryFromTermError};
pub use crate::variable::{Variable, VariableNameParseError};
pub use oxilangtag::LanguageTagParseError;
pub use oxiri::IriParseError;
