//! I/O adapters for the mutation workflow.

pub mod applicator;
pub mod config;
pub mod generator;
pub mod git;
pub mod lock;
pub mod process;
pub mod record;
pub mod verifier;
