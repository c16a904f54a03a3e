#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]

pub mod algebra;
mod rule;
pub mod term;

pub use crate::algebra::{BodyElement, Expression, Function};
pub use crate::rule::{Rule, RuleSet};
pub use crate::term::{NamedNodePattern, TermPattern, TriplePattern};
