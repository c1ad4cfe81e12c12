//! Observation graph between stores.
//!
//! Records which store observes which, and refuses any new edge that would
//! close a cycle and make updates bounce between stores forever.

mod graph;

pub use graph::ObservationGraph;
