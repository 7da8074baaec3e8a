//! Deterministic, pure logic shared by the mutation workflow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod machine;
pub mod target;
pub mod types;
