//! The Clingo-backed calculation engine: assembles facts from the card
//! tree and resources into a labelled, hot-swappable program, solves
//! parameterised queries, and renders graph views through Graphviz.

pub mod builder;
pub mod engine;
pub mod graph;
pub mod parser;

pub use engine::CalculationEngine;
