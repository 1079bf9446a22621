//! Local collector used by the end-to-end tests.

pub mod collector;

pub use collector::LocalCollector;
