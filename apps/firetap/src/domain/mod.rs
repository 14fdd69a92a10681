//! Domain Layer - Core matching types and business logic.
//!
//! This layer contains the pure logic of the stream tap with no I/O
//! dependencies: the watch-term set and its matching rules.

/// Watch terms and term matching.
pub mod terms;
