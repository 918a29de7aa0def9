//! Foundational, side-effect-light primitives shared by every other layer:
//! paths, file I/O, lexorank, timestamps, the error type, and output
//! rendering. Nothing in `core` knows about cards, resources, or the
//! calculation engine.

pub mod error;
pub mod fsutil;
pub mod lexorank;
pub mod output;
pub mod paths;
pub mod time;
