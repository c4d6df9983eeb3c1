//! Circuit graph representation.
//!
//! A circuit graph is the structured output of evaluating a template: an
//! ordered array of typed elements (`pcb_board`, `pcb_smtpad`, `source_trace`,
//! `pcb_trace`, ...). Only the `type` discriminant is interpreted here; every
//! other field is carried through untouched.

pub mod graph;

pub use graph::{CircuitElement, CircuitGraph, ROUTING_ELEMENT_TYPE};
